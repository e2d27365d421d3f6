use super::structs::ConnectionState;
use crate::config::RainforestConfig;
use log::{debug, error, info};
use serialport::{DataBits, FlowControl, Parity, StopBits};
use std::io::{Read, Write};
use std::thread;
use std::time::Duration;

/// Delay between open attempts. Retries are unbounded.
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// The I/O surface the poll loop runs against. `SerialConnection` is the
/// real implementation, tests drive the loop with an in-memory fake.
pub trait GatewayIo {
    /// Bytes the driver currently has buffered, without blocking.
    fn bytes_available(&mut self) -> usize;
    /// Drain whatever is currently buffered as one raw fragment.
    fn read_available(&mut self) -> Vec<u8>;
    /// Best effort write. Failures are logged and never surfaced.
    fn write(&mut self, bytes: &[u8]);
    /// Idempotent release of the device handle.
    fn close(&mut self);
}

/// Owns the serial handle to the gateway and the connection state machine.
pub struct SerialConnection {
    device: String,
    baud: u32,
    timeout: Duration,
    port: Option<Box<dyn serialport::SerialPort>>,
    state: ConnectionState,
}

impl SerialConnection {
    pub fn new(conf: &RainforestConfig) -> Self {
        return SerialConnection {
            device: conf.port.clone(),
            baud: conf.baud,
            timeout: Duration::from_millis(conf.read_timeout_ms),
            port: None,
            state: ConnectionState::Disconnected,
        };
    }

    /// Block until the device opens, retrying forever at a fixed delay.
    /// The retry loop does not observe the session stop flag: a stop
    /// requested while connecting takes effect on the first poll iteration
    /// after the open succeeds.
    pub fn open_with_retry(&mut self) {
        loop {
            self.state = ConnectionState::Connecting;
            let result = serialport::new(&self.device, self.baud)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .timeout(self.timeout)
                .open();

            match result {
                Ok(port) => {
                    info!("Connected to {} at {} baud", self.device, self.baud);
                    self.port = Some(port);
                    self.state = ConnectionState::Streaming;
                    return;
                }
                Err(e) => {
                    error!("Failed to open {}: {e}. Retrying in 5s...", self.device);
                    self.state = ConnectionState::Disconnected;
                    thread::sleep(RETRY_DELAY);
                }
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        return self.state;
    }
}

impl GatewayIo for SerialConnection {
    fn bytes_available(&mut self) -> usize {
        match &self.port {
            Some(port) => port.bytes_to_read().unwrap_or(0) as usize,
            None => 0,
        }
    }

    fn read_available(&mut self) -> Vec<u8> {
        let port = match self.port.as_mut() {
            Some(port) => port,
            None => return Vec::new(),
        };

        let pending = port.bytes_to_read().unwrap_or(0) as usize;
        if pending == 0 {
            return Vec::new();
        }

        let mut buffer = vec![0u8; pending];
        match port.read(&mut buffer) {
            Ok(n) => {
                buffer.truncate(n);
                return buffer;
            }
            Err(e) => {
                debug!("Serial read from {} failed: {e}", self.device);
                return Vec::new();
            }
        }
    }

    fn write(&mut self, bytes: &[u8]) {
        let port = match self.port.as_mut() {
            Some(port) => port,
            None => return,
        };

        if let Err(e) = port.write_all(bytes) {
            debug!("Command write to {} failed: {e}", self.device);
        }
    }

    fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }

        self.state = ConnectionState::Stopping;
        if let Some(port) = self.port.take() {
            drop(port);
        }
        self.state = ConnectionState::Closed;
        info!("Closed {}", self.device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RainforestConfig;

    fn test_config() -> RainforestConfig {
        return RainforestConfig {
            name: "test".to_string(),
            port: "/dev/ttyACM0".to_string(),
            baud: 115200,
            read_timeout_ms: 1000,
            enabled: true,
        };
    }

    #[test]
    fn test_starts_disconnected() {
        let connection = SerialConnection::new(&test_config());
        assert_eq!(connection.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_close_is_idempotent_and_terminal() {
        let mut connection = SerialConnection::new(&test_config());
        connection.close();
        assert_eq!(connection.state(), ConnectionState::Closed);
        connection.close();
        assert_eq!(connection.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_io_on_unopened_port_is_inert() {
        let mut connection = SerialConnection::new(&test_config());
        assert_eq!(connection.bytes_available(), 0);
        assert!(connection.read_available().is_empty());
        connection.write(b"<Command></Command>");
    }
}

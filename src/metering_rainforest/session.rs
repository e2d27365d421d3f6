use super::decoder;
use super::fragment::Fragment;
use super::port::{GatewayIo, SerialConnection};
use super::structs::{DecodedMessage, MeterReading};
use crate::config::RainforestConfig;
use crate::models::{Device, DeviceProtocol, DeviceStatus, DeviceType};
use crate::mqtt::{MeteringData, Transmission};
use crate::{get_id, get_unix_ts};
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;

/// Idle delay between polls when the gateway has nothing buffered.
const POLL_IDLE: Duration = Duration::from_millis(500);

/// The externally published override value, written by the MQTT
/// subscription task and read by the poll thread.
pub type OverrideCell = Arc<RwLock<Option<f64>>>;

/// One gateway session: open the port (forever, if need be), run the poll
/// loop until the stop flag is set, close exactly once. Runs on a dedicated
/// blocking thread owned by the manager.
pub fn run(
    conf: RainforestConfig,
    override_cell: OverrideCell,
    sender: tokio::sync::mpsc::Sender<Transmission>,
    stop: Arc<AtomicBool>,
) {
    let mut device = Device::new(
        conf.name.clone(),
        DeviceType::Gateway,
        DeviceProtocol::Rainforest.to_string(),
    );

    let mut port = SerialConnection::new(&conf);
    port.open_with_retry();
    device.update_status(DeviceStatus::Online);

    let mut reading = MeterReading::new();
    /* Seed the override once at session start */
    if let Some(price) = *override_cell.read().unwrap() {
        reading.set_custom_price(price);
    }

    poll_loop(&mut port, &conf, &mut reading, &mut device, &override_cell, &sender, &stop, POLL_IDLE);

    device.update_status(DeviceStatus::Offline);
    info!("Session for {} ended", conf.name);
}

/// While the stop flag is clear: read one fragment if bytes are pending,
/// otherwise idle. Fragment failures never leave this loop; the connection
/// is closed exactly once on the way out.
#[allow(clippy::too_many_arguments)]
pub(crate) fn poll_loop<P: GatewayIo>(
    port: &mut P,
    conf: &RainforestConfig,
    reading: &mut MeterReading,
    device: &mut Device,
    override_cell: &RwLock<Option<f64>>,
    sender: &tokio::sync::mpsc::Sender<Transmission>,
    stop: &AtomicBool,
    idle: Duration,
) {
    while !stop.load(Ordering::SeqCst) {
        if port.bytes_available() > 0 {
            let raw = port.read_available();
            handle_fragment(&raw, port, conf, reading, device, override_cell, sender);
        } else {
            thread::sleep(idle);
        }
    }

    port.close();
}

/// One poll cycle's bytes, attempted as exactly one message. Anything that
/// does not decode is dropped here, there is no retry or recombination.
fn handle_fragment<P: GatewayIo>(
    raw: &[u8],
    port: &mut P,
    conf: &RainforestConfig,
    reading: &mut MeterReading,
    device: &mut Device,
    override_cell: &RwLock<Option<f64>>,
    sender: &tokio::sync::mpsc::Sender<Transmission>,
) {
    let text = match std::str::from_utf8(raw) {
        Ok(text) => text,
        Err(_) => {
            debug!("Discarding {} bytes of non UTF-8 noise", raw.len());
            return;
        }
    };

    /* Partial reads and binary noise never start with an opening tag */
    if !text.starts_with('<') {
        debug!("Discarding non-fragment data: {text:?}");
        return;
    }

    let fragment = match Fragment::parse(text) {
        Ok(fragment) => fragment,
        Err(e) => {
            debug!("Discarding unparsable fragment: {e}");
            return;
        }
    };

    let message = match decoder::decode(&fragment) {
        Ok(Some(message)) => message,
        Ok(None) => return,
        Err(e) => {
            debug!("Discarding fragment with tag {}: {e}", fragment.tag());
            return;
        }
    };

    reading.apply(&message);

    if let DecodedMessage::InstantaneousDemand { device_mac_id, .. } = &message {
        debug!("InstantaneousDemand: {:?}", reading.demand);

        if device.get_parameter("device_mac_id").is_none() {
            device.set_parameter("device_mac_id".to_string(), device_mac_id.clone());
        }

        /* Re-read the override after every successful demand decode. When
           present it overrides the displayed price and is written back to
           the gateway, rounded to the nearest integer. */
        if let Some(price) = *override_cell.read().unwrap() {
            reading.set_custom_price(price);
            let command = decoder::set_price_command(price);
            debug!("setPriceCommand: {command}");
            port.write(command.as_bytes());
        }

        publish_reading(sender, conf, reading);
    }
}

/// Snapshot the reading onto the metering channel. The host only ever sees
/// these immutable copies.
fn publish_reading(
    sender: &tokio::sync::mpsc::Sender<Transmission>,
    conf: &RainforestConfig,
    reading: &MeterReading,
) {
    let mut data = MeteringData::new().unwrap();
    data.id = get_id("rainforest".to_string(), &conf.name);
    data.meter_name = conf.name.clone();
    data.protocol = DeviceProtocol::Rainforest;
    data.transmission_time = get_unix_ts();
    data.metered_time = data.transmission_time;
    data.metered_values = reading.to_metered_values();

    if sender.blocking_send(Transmission::Metering(data)).is_err() {
        debug!("Metering channel closed, dropping snapshot");
    }
}

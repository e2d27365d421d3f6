//! Bridge library for the Rainforest EMU-2 energy gateway
//!
//! This library decodes the gateway's serial protocol and publishes the
//! resulting meter readings to MQTT with Home Assistant discovery.

pub mod models;
pub mod mqtt;
pub mod config;
pub mod metering_rainforest;

// Re-export common types for easier access
pub use models::{Device, DeviceType, DeviceStatus};
pub use mqtt::{CALLBACKS, MeteringData};
pub use config::CONFIG;
pub use metering_rainforest::RainforestManager;

pub fn get_unix_ts() -> u64 {
    return std::time::SystemTime::now().duration_since(std::time::SystemTime::UNIX_EPOCH).unwrap().as_secs();
}

pub fn get_id(protocol: String, meter_name: &String) -> String {
    return format!("{}-{}-{:?}", protocol, meter_name, get_unix_ts());
}

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use chrono::{DateTime, Utc};
use uuid::Uuid;


/// Represents a device type in the system
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeviceType {
    Sensor,
    Actuator,
    Gateway,
    Controller,
}

impl DeviceType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Sensor" => Some(DeviceType::Sensor),
            "Actuator" => Some(DeviceType::Actuator),
            "Gateway" => Some(DeviceType::Gateway),
            "Controller" => Some(DeviceType::Controller),
            _ => None,
        }
    }

    pub fn to_string(&self) -> String {
        match self {
            DeviceType::Sensor => "Sensor".to_string(),
            DeviceType::Actuator => "Actuator".to_string(),
            DeviceType::Gateway => "Gateway".to_string(),
            DeviceType::Controller => "Controller".to_string(),
        }
    }
}

/// Represents the status of a device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeviceStatus {
    Online,
    Offline,
    Maintenance,
    Unknown,
}

impl DeviceStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Online" => Some(DeviceStatus::Online),
            "Offline" => Some(DeviceStatus::Offline),
            "Maintenance" => Some(DeviceStatus::Maintenance),
            "Unknown" => Some(DeviceStatus::Unknown),
            _ => None,
        }
    }

    pub fn to_string(&self) -> String {
        match self {
            DeviceStatus::Online => "Online".to_string(),
            DeviceStatus::Offline => "Offline".to_string(),
            DeviceStatus::Maintenance => "Maintenance".to_string(),
            DeviceStatus::Unknown => "Unknown".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeviceProtocol {
    Unknown,
    Rainforest,
}

impl DeviceProtocol {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Rainforest" => Some(DeviceProtocol::Rainforest),
            _ => Some(DeviceProtocol::Unknown),
        }
    }

    pub fn to_string(&self) -> String {
        match self {
            DeviceProtocol::Unknown => "Unknown".to_string(),
            DeviceProtocol::Rainforest => "Rainforest".to_string(),
        }
    }
}

/// Represents a device in the system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Unique identifier for the device
    pub id: String,
    /// Human-readable name of the device
    pub name: String,
    /// Type of device
    pub device_type: DeviceType,
    /// Current status of the device
    pub status: DeviceStatus,
    /// Protocol the device speaks
    pub device_protocol: String,
    /// Last time the device was seen online
    pub last_seen: DateTime<Utc>,
    /// Additional device-specific parameters
    pub parameters: HashMap<String, String>,
}


impl Device {
    /// Create a new device with default parameters
    pub fn new(name: String, device_type: DeviceType, protcol: String) -> Self {
        Device {
            id: Uuid::new_v4().to_string(),
            name,
            device_type,
            status: DeviceStatus::Offline,
            device_protocol: protcol,
            last_seen: Utc::now(),
            parameters: HashMap::new(),
        }
    }

    /// Update the device status
    pub fn update_status(&mut self, status: DeviceStatus) {
        self.status = status.clone();
        if self.status == DeviceStatus::Online {
            self.last_seen = Utc::now();
        }
    }

    /// Set a device parameter
    pub fn set_parameter(&mut self, key: String, value: String) {
        self.parameters.insert(key, value);
    }

    /// Get a device parameter
    pub fn get_parameter(&self, key: &str) -> Option<&String> {
        self.parameters.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_device_goes_online() {
        let mut device = Device::new(
            "Rainforest Energy Monitoring Unit".to_string(),
            DeviceType::Gateway,
            DeviceProtocol::Rainforest.to_string(),
        );
        assert_eq!(device.status, DeviceStatus::Offline);

        device.update_status(DeviceStatus::Online);
        assert_eq!(device.status, DeviceStatus::Online);
    }

    #[test]
    fn test_device_parameters() {
        let mut device = Device::new("emu".to_string(), DeviceType::Gateway, "Rainforest".to_string());
        assert!(device.get_parameter("device_mac_id").is_none());
        device.set_parameter("device_mac_id".to_string(), "0xd8d5b90000001234".to_string());
        assert_eq!(device.get_parameter("device_mac_id").map(|s| s.as_str()), Some("0xd8d5b90000001234"));
    }
}

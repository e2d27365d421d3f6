use serde::Serialize;



#[derive(Serialize)]
pub struct HaDevice {
    ids: String,
    name: String,
    manufacturer: String,
    model: String,
}
#[derive(Serialize)]
pub struct HaOrigin {
    pub name: String,
    pub sw_version: String,
    pub support_url: String,
}

fn is_none_str(value: &String) -> bool {
    if value.is_empty() || value == "NONE" {
        return true;
    }
    return false;
}

#[derive(Serialize)]
pub struct HaComponent {
    pub p: String,
    pub name: String,
    #[serde(skip_serializing_if = "is_none_str")]
    pub device_class: String,
    #[serde(skip_serializing_if = "is_none_str")]
    pub unit_of_measurement: String,
    pub value_template: String,
    pub unique_id: String,
    pub object_id: String,
    pub via_device: String,
    #[serde(skip_serializing_if = "is_none_str")]
    pub state_class: String,
}

impl HaComponent {
    pub fn new_energy(device: String, uof: String, proto: String, name: String, json_key: String) -> Self {
        let safe_name= name.clone().replace(" ", "_");
        return HaComponent {
            p: "sensor".to_string(),
            name: name,
            device_class: "energy".to_string(),
            unit_of_measurement: uof,
            value_template: format!("{{{{ value_json.{json_key} }}}}"),
            unique_id: format!("emu2mqtt_{proto}_{device}_{safe_name}").to_lowercase(),
            object_id: format!("{device}_{safe_name}").to_lowercase(),
            state_class: "total_increasing".to_string(),
            via_device: "emu2mqtt_management".to_string(),
         }
    }

    /// The gateway reports demand in kW, not W.
    pub fn new_power(device: String, proto: String, name: String, json_key: String) -> Self {
        let safe_name= name.clone().replace(" ", "_");
        return HaComponent {
            p: "sensor".to_string(),
            name: name,
            device_class: "power".to_string(),
            unit_of_measurement: "kW".to_string(),
            value_template: format!("{{{{ value_json.{json_key} }}}}"),
            unique_id: format!("emu2mqtt_{proto}_{device}_{safe_name}").to_lowercase(),
            object_id: format!("{device}_{safe_name}").to_lowercase(),
            state_class: "measurement".to_string(),
            via_device: "emu2mqtt_management".to_string(),
         }
    }

    pub fn new_monetary(device: String, proto: String, name: String, json_key: String) -> Self {
        let safe_name= name.clone().replace(" ", "_");
        return HaComponent {
            p: "sensor".to_string(),
            name: name,
            device_class: "monetary".to_string(),
            unit_of_measurement: "NONE".to_string(),
            value_template: format!("{{{{ value_json.{json_key} }}}}"),
            unique_id: format!("emu2mqtt_{proto}_{device}_{safe_name}").to_lowercase(),
            object_id: format!("{device}_{safe_name}").to_lowercase(),
            state_class: "total".to_string(),
            via_device: "emu2mqtt_management".to_string(),
         }
    }

    /// Plain text component, used for the opaque MAC id attributes.
    pub fn new_text(device: String, proto: String, name: String, json_key: String) -> Self {
        let safe_name= name.clone().replace(" ", "_");
        return HaComponent {
            p: "sensor".to_string(),
            name: name,
            device_class: "NONE".to_string(),
            unit_of_measurement: "NONE".to_string(),
            value_template: format!("{{{{ value_json.{json_key} }}}}"),
            unique_id: format!("emu2mqtt_{proto}_{device}_{safe_name}").to_lowercase(),
            object_id: format!("{device}_{safe_name}").to_lowercase(),
            state_class: "NONE".to_string(),
            via_device: "emu2mqtt_management".to_string(),
         }
    }

    pub fn new_full_sensor(name: String, device_class: String, unit: String, json_key: String, object_id: String, unique_id: String) -> Self {
        return HaComponent {
            p: "sensor".to_string(),
            name: name,
            device_class: device_class,
            unit_of_measurement: unit,
            value_template: format!("{{{{ value_json.{json_key} }}}}"),
            unique_id: unique_id,
            object_id: object_id,
            state_class: "measurement".to_string(),
            via_device: "emu2mqtt_management".to_string(),
         }
    }
}

#[derive(Serialize)]
pub struct HaDiscover {
    pub dev: HaDevice,
    pub o: HaOrigin,
    pub cmps: serde_json::Map<String, serde_json::Value>,
    pub state_topic: String,
    pub qos: u32,
    #[serde(skip_serializing)]
    pub discover_topic: String,
}

impl HaDiscover {
    pub fn new(name: String, manu: String, model: String, proto: String) -> Self {
        return HaDiscover {
            discover_topic: format!("homeassistant/device/emu2mqtt_{}-{}/config", proto.clone(), name.clone()),
            dev: HaDevice {
                ids: format!("emu2mqtt_{}_{}", proto.clone(), name.clone()),
                name: name.clone(),
                manufacturer: manu,
                model: model,
            },
            o: HaOrigin {
                name: "emu2mqtt".to_string(),
                sw_version: "0.1.0".to_string(),
                support_url: "https://emu2mqtt.org".to_string()
            },
            cmps: serde_json::Map::new(),
            state_topic: format!("emu2mqtt/devs/{}/{}", proto, name),
            qos: 2
        }
    }

    pub fn get_dev_id(&self) -> String {
        return self.dev.ids.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_component_uses_kilowatts() {
        let c = HaComponent::new_power(
            "emu".to_string(),
            "Rainforest".to_string(),
            "Demand".to_string(),
            "demand".to_string(),
        );
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["unit_of_measurement"], "kW");
        assert_eq!(json["device_class"], "power");
        assert_eq!(json["value_template"], "{{ value_json.demand }}");
        assert_eq!(json["unique_id"], "emu2mqtt_rainforest_emu_demand");
    }

    #[test]
    fn test_text_component_skips_empty_classes() {
        let c = HaComponent::new_text(
            "emu".to_string(),
            "Rainforest".to_string(),
            "Device MAC ID".to_string(),
            "device_mac_id".to_string(),
        );
        let json = serde_json::to_value(&c).unwrap();
        assert!(json.get("device_class").is_none());
        assert!(json.get("unit_of_measurement").is_none());
        assert!(json.get("state_class").is_none());
        assert_eq!(json["object_id"], "emu_device_mac_id");
    }

    #[test]
    fn test_discover_topic_and_state_topic() {
        let disc = HaDiscover::new(
            "emu".to_string(),
            "Rainforest Automation".to_string(),
            "EMU-2".to_string(),
            "Rainforest".to_string(),
        );
        assert_eq!(disc.discover_topic, "homeassistant/device/emu2mqtt_Rainforest-emu/config");
        assert_eq!(disc.state_topic, "emu2mqtt/devs/Rainforest/emu");
        assert_eq!(disc.get_dev_id(), "emu2mqtt_Rainforest_emu");
    }
}

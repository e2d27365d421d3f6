use lazy_static::lazy_static;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use serde_yml;
use std::error::Error;
use std::fs::{self, File};
use std::io::prelude::*;
use std::sync::RwLock;

fn mqtt_client_name_default() -> String { return "emu2mqtt".to_string() }

#[derive(Deserialize, Serialize, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    pub ha_enabled: bool,
    #[serde(default="mqtt_client_name_default")]
    pub client_name: String,
}

fn rainforest_name_default() -> String { return "Rainforest Energy Monitoring Unit".to_string() }
fn rainforest_baud_default() -> u32 { return 115200 }
fn rainforest_read_timeout_default() -> u64 { return 1000 }
fn rainforest_enabled_default() -> bool { return true }

#[derive(Deserialize, Serialize, Clone)]
pub struct RainforestConfig {
    #[serde(default="rainforest_name_default")]
    pub name: String,
    /* Serial device path of the gateway, like /dev/ttyACM0 */
    pub port: String,
    #[serde(default="rainforest_baud_default")]
    pub baud: u32,
    #[serde(default="rainforest_read_timeout_default")]
    pub read_timeout_ms: u64,
    #[serde(default="rainforest_enabled_default")]
    pub enabled: bool,
}

#[derive(Deserialize, Serialize, Clone, PartialEq)]
pub enum ConfigOperation {
    ADD,
    DELETE,
    CHANGE
}

#[derive(Deserialize, Serialize, Clone)]
pub struct ConfigChange {
    pub operation: ConfigOperation,
    pub base: String, /* This is like mqtt, rainforest and so on */
}

#[derive(Clone)]
pub struct Callbacks {
    sender: tokio::sync::broadcast::Sender<ConfigChange>,
}

fn rainforest_default() -> Vec<RainforestConfig> { return Vec::new() }

#[derive(Deserialize, Serialize, Clone)]
pub struct Config {
    pub mqtt: MqttConfig,
    #[serde(default="rainforest_default")]
    pub rainforest: Vec<RainforestConfig>,
}

pub struct ConfigHolder {
    pub config: Config,
    pub callbacks: Callbacks,
    pub dirty: bool,
    pub lock: RwLock<bool>,
    pub base_path: String,
}

pub enum ConfigBases {
    Mqtt(MqttConfig),
    Rainforest(Vec<RainforestConfig>),
}

impl ConfigHolder {
    pub fn load() -> Self {

        let mut bpath = "config/".to_string();
        /* Check for the two paths of the config file */
        let mut file = File::open("config/emu2mqtt.yaml");
        if file.is_err() {
            file = Ok(File::open("emu2mqtt.yaml").expect("Unable to read the config on config/emu2mqtt.yaml or emu2mqtt.yaml"));
            bpath = "".to_string();
        }

        let mut file = file.unwrap();

        let mut contents = String::new();
        file.read_to_string(&mut contents).expect("Unable to read config file");
        let c: Config =  serde_yml::from_str(&contents).expect("Unable to parse config file");
        let (s, _) = tokio::sync::broadcast::channel(100);
        return ConfigHolder {
            config: c,
            callbacks: Callbacks { sender: s },
            dirty: false,
            lock: RwLock::new(true),
            base_path: bpath,
        }
    }

    pub fn save(&mut self) {
        /* No need to write config if it's not dirty */
        if !self.dirty {
            debug!("Who ever called me, the config is not dirty");
            return;
        }

        let config_path = format!("{}emu2mqtt.yaml", self.base_path);
        let backup_path = format!("{}backup.yaml", self.base_path);

        if fs::copy(config_path.clone(), backup_path).is_err() {
            error!("Backing up config failed, not replacing it");
        } else {
            let x = serde_yml::to_string(&self.config).unwrap();
            match fs::write(config_path, x.as_bytes()) {
                Ok(_) => { info!("New Config written"); self.dirty = false; }
                Err(e) => { error!("Error writing config {e:?}"); }
            }
        }
    }

    pub fn get_change_receiver(&self) -> tokio::sync::broadcast::Receiver<ConfigChange> {
        return self.callbacks.sender.subscribe();
    }

    pub fn is_dirty(&self) -> bool {
        return self.dirty;
    }

    pub fn update_config(&mut self, operation: ConfigOperation, new_data: ConfigBases) {
        let base: &str;

        match new_data {
            ConfigBases::Mqtt(mqtt_config) => {
                self.config.mqtt = mqtt_config;
                base = "mqtt";
            },
            ConfigBases::Rainforest(rainforest_configs) => {
                self.config.rainforest = rainforest_configs;
                base = "rainforest";
            },
        }

        self.dirty = true;

        let _ = self.callbacks.sender.send(ConfigChange { operation: operation, base: base.to_string()});
    }

    pub fn get_copy(&self, base: &str) -> Result<ConfigBases, Box<dyn Error>> {
        /* Lock against modifications during copy */
        let _lock = self.lock.read().unwrap();

        match base {
            "mqtt" => { return Ok(ConfigBases::Mqtt(self.config.mqtt.clone())) },
            "rainforest" => { return Ok(ConfigBases::Rainforest(self.config.rainforest.clone())) },
            _ => { Err("Type not known")? }
        }
    }

    pub fn get_complete_config(&self) -> Config {
        return self.config.clone();
    }
}

lazy_static! {
    pub static ref CONFIG: RwLock<ConfigHolder> = RwLock::new(ConfigHolder::load());
}

#[macro_export]
macro_rules! get_config_or_panic {
    ($base: expr, $pat: path) => {
        {
            let c = CONFIG.read().unwrap().get_copy($base).unwrap();
            if let $pat(a) = c { // #1
                a
            } else {
                panic!(
                    "mismatch variant when cast to {}",
                    stringify!($pat)); // #2
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_rainforest_defaults() {
        let yaml = r#"
mqtt:
  host: localhost
  port: 1883
  user: mqtt
  pass: mqtt
  ha_enabled: true
rainforest:
  - port: /dev/ttyACM0
"#;
        let config: Config = serde_yml::from_str(yaml).unwrap();
        assert_eq!(config.mqtt.client_name, "emu2mqtt");
        assert_eq!(config.rainforest.len(), 1);

        let gateway = &config.rainforest[0];
        assert_eq!(gateway.name, "Rainforest Energy Monitoring Unit");
        assert_eq!(gateway.port, "/dev/ttyACM0");
        assert_eq!(gateway.baud, 115200);
        assert_eq!(gateway.read_timeout_ms, 1000);
        assert!(gateway.enabled);
    }

    #[test]
    fn test_config_without_gateways_parses() {
        let yaml = r#"
mqtt:
  host: localhost
  port: 1883
  user: mqtt
  pass: mqtt
  ha_enabled: false
"#;
        let config: Config = serde_yml::from_str(yaml).unwrap();
        assert!(config.rainforest.is_empty());
    }

    #[test]
    fn test_saved_config_round_trips_through_a_file() {
        let yaml = r#"
mqtt:
  host: broker.local
  port: 1883
  user: mqtt
  pass: secret
  ha_enabled: true
rainforest:
  - name: Garage EMU-2
    port: /dev/ttyACM1
    baud: 115200
"#;
        let config: Config = serde_yml::from_str(yaml).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emu2mqtt.yaml");
        let mut file = File::create(&path).unwrap();
        file.write_all(serde_yml::to_string(&config).unwrap().as_bytes()).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let reloaded: Config = serde_yml::from_str(&contents).unwrap();
        assert_eq!(reloaded.mqtt.host, "broker.local");
        assert_eq!(reloaded.rainforest[0].name, "Garage EMU-2");
        assert_eq!(reloaded.rainforest[0].read_timeout_ms, 1000);
    }
}

use crate::config::{ConfigBases, ConfigChange, ConfigOperation, RainforestConfig};
use crate::models::DeviceProtocol;
use crate::mqtt::ha_interface::{HaComponent, HaDiscover};
use crate::mqtt::{publish_protocol_count, SubscribeData, Transmission};
use crate::{get_config_or_panic, CONFIG};
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;

pub mod decoder;
pub mod fragment;
pub mod port;
pub mod session;
pub mod structs;

use session::OverrideCell;

/// MQTT key (below the bridge prefix) carrying the external price override.
pub const CUSTOM_PRICE_TOPIC: &str = "rainforest/custom_price";

#[derive(Error, Debug)]
pub enum RainforestParseError {
    #[error("Data does not start with an opening tag")]
    NotAFragment,
    #[error("Malformed fragment markup")]
    InvalidFormat,
    #[error("Missing field {0}")]
    MissingField(&'static str),
    #[error("Field {0} is not a hexadecimal integer")]
    InvalidHexField(&'static str),
    #[error("Zero divisor in summation message")]
    ZeroDivisor,
}

/// One running gateway: the blocking poll thread, the override
/// subscription task, and the stop flag the poll thread watches.
struct SessionHandle {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
    subscription: JoinHandle<()>,
}

pub struct RainforestManager {
    sender: Sender<Transmission>,
    config_change: tokio::sync::broadcast::Receiver<ConfigChange>,
    sessions: Vec<SessionHandle>,
    config: Vec<RainforestConfig>,
}

impl RainforestManager {
    pub fn new(sender: Sender<Transmission>) -> Self {
        let config: Vec<RainforestConfig> = get_config_or_panic!("rainforest", ConfigBases::Rainforest);

        return RainforestManager {
            sender,
            config_change: CONFIG.read().unwrap().get_change_receiver(),
            sessions: Vec::new(),
            config,
        };
    }

    pub async fn start_thread(&mut self) -> ! {
        /* There may be no config to start with, so sleep until there is */
        if self.config.len() == 0 {
            info!("No Rainforest gateways found, waiting for a config change to wake me up");
            loop {
                let change = self.config_change.recv().await.unwrap();
                if change.operation != ConfigOperation::ADD || change.base != "rainforest" {
                    continue;
                }

                self.config = get_config_or_panic!("rainforest", ConfigBases::Rainforest);
                break;
            }
        }

        info!("Started Rainforest configuration");
        loop {
            let mut device_count = 0;

            let ha_enabled = {
                let mqtt = get_config_or_panic!("mqtt", ConfigBases::Mqtt);
                mqtt.ha_enabled
            };

            for conf in self.config.iter() {
                if !conf.enabled {
                    info!("Rainforest gateway {} on {} is disabled", conf.name, conf.port);
                    continue;
                }

                device_count += 1;
                info!("Starting Rainforest gateway {} on {}", conf.name, conf.port);

                if ha_enabled {
                    let disc = build_discovery(conf);
                    let _ = self.sender.send(Transmission::AutoDiscovery(disc)).await;
                }

                /* The price override arrives over MQTT on a fixed key. The
                   subscription task feeds the cell the poll thread reads. */
                let override_cell: OverrideCell = Arc::new(RwLock::new(None));
                let (sub_sender, mut sub_receiver) = tokio::sync::mpsc::channel(10);
                let register = Transmission::Subscribe(SubscribeData {
                    topic: CUSTOM_PRICE_TOPIC.to_string(),
                    sender: sub_sender,
                });
                let _ = self.sender.send(register).await;

                let cell = override_cell.clone();
                let subscription = tokio::spawn(async move {
                    while let Some(payload) = sub_receiver.recv().await {
                        if payload == "" {
                            continue;
                        }
                        match payload.trim().parse::<f64>() {
                            Ok(value) => {
                                info!("Custom price override is now {value}");
                                *cell.write().unwrap() = Some(value);
                            }
                            Err(_) => {
                                warn!("Ignoring non numeric custom price {payload:?}");
                            }
                        }
                    }
                });

                let stop = Arc::new(AtomicBool::new(false));
                let stop_clone = stop.clone();
                let conf_clone = conf.clone();
                let sender = self.sender.clone();
                let cell = override_cell.clone();
                let thread = tokio::task::spawn_blocking(move || {
                    session::run(conf_clone, cell, sender, stop_clone);
                });

                self.sessions.push(SessionHandle {
                    stop,
                    thread,
                    subscription,
                });
            }

            publish_protocol_count(&self.sender, "rainforest", device_count).await;

            info!("All Rainforest {device_count} gateways setup, waiting for config changes");

            loop {
                let change = self.config_change.recv().await.unwrap();
                if change.base == "rainforest" {
                    break;
                }
            }

            /* Some of our config changed, stop the sessions and start over.
               Each poll loop sees its flag within one idle interval. */
            info!("Rainforest is stopping sessions");
            for session in self.sessions.iter() {
                session.stop.store(true, Ordering::SeqCst);
                session.subscription.abort();
            }
            for session in self.sessions.drain(..) {
                let _ = session.thread.await;
            }

            self.config = get_config_or_panic!("rainforest", ConfigBases::Rainforest);
        }
    }
}

/// The gateway's Home Assistant registration: the demand sensor carries the
/// state, everything else rides along as further components of the device.
fn build_discovery(conf: &RainforestConfig) -> HaDiscover {
    let proto = DeviceProtocol::Rainforest.to_string();
    let device = conf.name.clone();

    let mut disc = HaDiscover::new(
        device.clone(),
        "Rainforest Automation".to_string(),
        "EMU-2".to_string(),
        proto.clone(),
    );

    let c = HaComponent::new_power(device.clone(), proto.clone(), "Demand".to_string(), "demand".to_string());
    disc.cmps.insert("demand".to_string(), serde_json::to_value(c).unwrap());

    let c = HaComponent::new_text(device.clone(), proto.clone(), "Device MAC ID".to_string(), "device_mac_id".to_string());
    disc.cmps.insert("device_mac_id".to_string(), serde_json::to_value(c).unwrap());

    let c = HaComponent::new_text(device.clone(), proto.clone(), "Meter MAC ID".to_string(), "meter_mac_id".to_string());
    disc.cmps.insert("meter_mac_id".to_string(), serde_json::to_value(c).unwrap());

    let c = HaComponent::new_full_sensor(
        "Price Tier".to_string(),
        "NONE".to_string(),
        "NONE".to_string(),
        "price_tier".to_string(),
        format!("{device}_price_tier").to_lowercase(),
        format!("emu2mqtt_{proto}_{device}_price_tier").to_lowercase(),
    );
    disc.cmps.insert("price_tier".to_string(), serde_json::to_value(c).unwrap());

    let c = HaComponent::new_monetary(device.clone(), proto.clone(), "Price".to_string(), "price".to_string());
    disc.cmps.insert("price".to_string(), serde_json::to_value(c).unwrap());

    let c = HaComponent::new_full_sensor(
        "Net kWh".to_string(),
        "energy".to_string(),
        "kWh".to_string(),
        "net_kwh".to_string(),
        format!("{device}_net_kwh").to_lowercase(),
        format!("emu2mqtt_{proto}_{device}_net_kwh").to_lowercase(),
    );
    disc.cmps.insert("net_kwh".to_string(), serde_json::to_value(c).unwrap());

    let c = HaComponent::new_energy(device.clone(), "kWh".to_string(), proto.clone(), "Delivered kWh".to_string(), "delivered_kwh".to_string());
    disc.cmps.insert("delivered_kwh".to_string(), serde_json::to_value(c).unwrap());

    let c = HaComponent::new_energy(device.clone(), "kWh".to_string(), proto.clone(), "Received kWh".to_string(), "received_kwh".to_string());
    disc.cmps.insert("received_kwh".to_string(), serde_json::to_value(c).unwrap());

    let c = HaComponent::new_monetary(device.clone(), proto.clone(), "Custom Price".to_string(), "custom_price".to_string());
    disc.cmps.insert("custom_price".to_string(), serde_json::to_value(c).unwrap());

    return disc;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_carries_the_full_attribute_set() {
        let conf = RainforestConfig {
            name: "Rainforest Energy Monitoring Unit".to_string(),
            port: "/dev/ttyACM0".to_string(),
            baud: 115200,
            read_timeout_ms: 1000,
            enabled: true,
        };

        let disc = build_discovery(&conf);
        for key in [
            "demand",
            "device_mac_id",
            "meter_mac_id",
            "price_tier",
            "price",
            "net_kwh",
            "delivered_kwh",
            "received_kwh",
            "custom_price",
        ] {
            assert!(disc.cmps.contains_key(key), "missing component {key}");
        }

        let demand = &disc.cmps["demand"];
        assert_eq!(demand["unit_of_measurement"], "kW");
        assert_eq!(demand["name"], "Demand");
    }
}

use serde_json::Value;

/// Aggregate view of the meter as reported by the gateway. Every field stays
/// `None` until the first message carrying it arrives; fields update
/// independently per message type, so a snapshot may mix values from
/// different messages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeterReading {
    pub demand: Option<f64>,
    pub device_mac_id: Option<String>,
    pub meter_mac_id: Option<String>,
    pub price_tier: Option<i64>,
    pub price: Option<f64>,
    pub custom_price: Option<f64>,
    pub summation_delivered: Option<f64>,
    pub summation_received: Option<f64>,
    pub net_summation: Option<f64>,
}

/// One decoded gateway message. Arithmetic happens at decode time, so
/// applying a message is a plain field update.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedMessage {
    InstantaneousDemand {
        /// `None` when the message carried a zero divisor, which skips the
        /// demand update while the MAC ids still apply.
        demand: Option<f64>,
        device_mac_id: String,
        meter_mac_id: String,
    },
    PriceCluster {
        price: f64,
        tier: i64,
    },
    CurrentSummationDelivered {
        delivered: f64,
        received: f64,
        net: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Streaming,
    Stopping,
    /// Terminal, a closed connection is never reopened.
    Closed,
}

impl MeterReading {
    pub fn new() -> Self {
        return MeterReading::default();
    }

    pub fn apply(&mut self, message: &DecodedMessage) {
        match message {
            DecodedMessage::InstantaneousDemand { demand, device_mac_id, meter_mac_id } => {
                if let Some(value) = demand {
                    self.demand = Some(*value);
                }
                self.device_mac_id = Some(device_mac_id.clone());
                self.meter_mac_id = Some(meter_mac_id.clone());
            }
            DecodedMessage::PriceCluster { price, tier } => {
                self.price_tier = Some(*tier);
                /* A custom price always wins over the device reported one */
                if self.custom_price.is_none() {
                    self.price = Some(*price);
                }
            }
            DecodedMessage::CurrentSummationDelivered { delivered, received, net } => {
                self.summation_delivered = Some(*delivered);
                self.summation_received = Some(*received);
                self.net_summation = Some(*net);
            }
        }
    }

    /// Apply the externally sourced price override. It becomes the visible
    /// price until the override goes away.
    pub fn set_custom_price(&mut self, value: f64) {
        self.custom_price = Some(value);
        self.price = Some(value);
    }

    /// Snapshot for the state topic. Unset fields publish as JSON null.
    pub fn to_metered_values(&self) -> serde_json::Map<String, Value> {
        let mut values = serde_json::Map::new();
        values.insert("demand".to_string(), self.demand.into());
        values.insert("device_mac_id".to_string(), self.device_mac_id.clone().into());
        values.insert("meter_mac_id".to_string(), self.meter_mac_id.clone().into());
        values.insert("price_tier".to_string(), self.price_tier.into());
        values.insert("price".to_string(), self.price.into());
        values.insert("net_kwh".to_string(), self.net_summation.into());
        values.insert("delivered_kwh".to_string(), self.summation_delivered.into());
        values.insert("received_kwh".to_string(), self.summation_received.into());
        values.insert("custom_price".to_string(), self.custom_price.into());
        return values;
    }
}

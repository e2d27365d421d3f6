use super::fragment::Fragment;
use super::structs::DecodedMessage;
use super::RainforestParseError;
use log::debug;

/// Dispatch a parsed fragment by its root tag. Exactly three tags are
/// supported; everything else decodes to `None` and is ignored upstream.
pub fn decode(fragment: &Fragment) -> Result<Option<DecodedMessage>, RainforestParseError> {
    match fragment.tag() {
        "InstantaneousDemand" => decode_demand(fragment).map(Some),
        "PriceCluster" => decode_price_cluster(fragment).map(Some),
        "CurrentSummationDelivered" => decode_summation(fragment).map(Some),
        other => {
            debug!("Ignoring unsupported message tag {other}");
            Ok(None)
        }
    }
}

fn decode_demand(fragment: &Fragment) -> Result<DecodedMessage, RainforestParseError> {
    let raw = hex_field(fragment, "Demand")? as u32;
    let multiplier = hex_field(fragment, "Multiplier")?;
    let divisor = hex_field(fragment, "Divisor")?;
    let digits_right = hex_field(fragment, "DigitsRight")? as u32;
    let device_mac_id = text_field(fragment, "DeviceMacId")?.to_string();
    let meter_mac_id = text_field(fragment, "MeterMacId")?.to_string();

    let signed = signed_demand(raw);
    let demand = if divisor != 0 {
        Some(round_to_digits(
            signed as f64 * multiplier as f64 / divisor as f64,
            digits_right,
        ))
    } else {
        /* Only this message type guards the zero divisor by skipping the
           value while the rest of the message still applies */
        debug!("InstantaneousDemand with zero divisor, keeping previous demand");
        None
    };

    return Ok(DecodedMessage::InstantaneousDemand {
        demand,
        device_mac_id,
        meter_mac_id,
    });
}

fn decode_price_cluster(fragment: &Fragment) -> Result<DecodedMessage, RainforestParseError> {
    let raw = hex_field(fragment, "Price")?;
    let trailing_digits = hex_field(fragment, "TrailingDigits")? as u32;
    let tier = hex_field(fragment, "Tier")? as i64;

    /* The decimal scale is dynamic per message, not fixed */
    let price = raw as f64 / 10f64.powi(trailing_digits as i32);

    return Ok(DecodedMessage::PriceCluster { price, tier });
}

fn decode_summation(fragment: &Fragment) -> Result<DecodedMessage, RainforestParseError> {
    let delivered_raw = hex_field(fragment, "SummationDelivered")?;
    let received_raw = hex_field(fragment, "SummationReceived")?;
    let multiplier = hex_field(fragment, "Multiplier")?;
    let divisor = hex_field(fragment, "Divisor")?;
    let digits_right = hex_field(fragment, "DigitsRight")? as u32;

    if divisor == 0 {
        return Err(RainforestParseError::ZeroDivisor);
    }

    let delivered = delivered_raw as f64 * multiplier as f64 / divisor as f64;
    let received = received_raw as f64 * multiplier as f64 / divisor as f64;

    /* Only the net value is rounded, delivered and received stay raw */
    let net = round_to_digits(
        (delivered_raw as f64 - received_raw as f64) * multiplier as f64 / divisor as f64,
        digits_right,
    );

    return Ok(DecodedMessage::CurrentSummationDelivered {
        delivered,
        received,
        net,
    });
}

/// The write-back command for the price override. The price is rounded to
/// the nearest integer before hex encoding, so the command is coarser than
/// the displayed value.
pub fn set_price_command(custom_price: f64) -> String {
    let price = custom_price.round() as i64;
    return format!("<Command><Name>set_current_price</Name><Price>{price:#x}</Price><TrailingDigits>0x05</TrailingDigits></Command>");
}

fn text_field<'a>(fragment: &'a Fragment, name: &'static str) -> Result<&'a str, RainforestParseError> {
    return fragment
        .field(name)
        .ok_or(RainforestParseError::MissingField(name));
}

/// Gateway numerics are base-16 with an optional 0x prefix.
fn hex_field(fragment: &Fragment, name: &'static str) -> Result<u64, RainforestParseError> {
    let text = text_field(fragment, name)?.trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    return u64::from_str_radix(digits, 16)
        .map_err(|_| RainforestParseError::InvalidHexField(name));
}

/// 32 bit two's complement interpretation of the raw demand word.
fn signed_demand(raw: u32) -> i64 {
    if raw & 0x8000_0000 != 0 {
        return (raw & 0x7fff_ffff) as i64 - 0x8000_0000;
    }
    return raw as i64;
}

fn round_to_digits(value: f64, digits: u32) -> f64 {
    let scale = 10f64.powi(digits as i32);
    return (value * scale).round() / scale;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demand_fragment(demand: &str, divisor: &str) -> Fragment {
        let raw = format!(
            "<InstantaneousDemand>\
             <DeviceMacId>0xd8d5b90000001234</DeviceMacId>\
             <MeterMacId>0x00135003001234ab</MeterMacId>\
             <Demand>{demand}</Demand>\
             <Multiplier>0x00000001</Multiplier>\
             <Divisor>{divisor}</Divisor>\
             <DigitsRight>0x03</DigitsRight>\
             </InstantaneousDemand>"
        );
        return Fragment::parse(&raw).unwrap();
    }

    #[test]
    fn test_sign_extension() {
        assert_eq!(signed_demand(0xFFFFFFFF), -1);
        assert_eq!(signed_demand(0x00000005), 5);
        assert_eq!(signed_demand(0x80000000), -2147483648);
        assert_eq!(signed_demand(0x7FFFFFFF), 2147483647);
    }

    #[test]
    fn test_negative_demand_is_scaled_and_rounded() {
        let fragment = demand_fragment("0xFFFFFFFF", "0x000003e8");
        let message = decode(&fragment).unwrap().unwrap();
        match message {
            DecodedMessage::InstantaneousDemand { demand, device_mac_id, .. } => {
                assert_eq!(demand, Some(-0.001));
                assert_eq!(device_mac_id, "0xd8d5b90000001234");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_demand_zero_divisor_skips_value() {
        let fragment = demand_fragment("0x001738", "0x00000000");
        let message = decode(&fragment).unwrap().unwrap();
        match message {
            DecodedMessage::InstantaneousDemand { demand, meter_mac_id, .. } => {
                assert_eq!(demand, None);
                assert_eq!(meter_mac_id, "0x00135003001234ab");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_price_cluster_dynamic_scale() {
        let raw = "<PriceCluster>\
                   <Price>0x64</Price>\
                   <TrailingDigits>0x02</TrailingDigits>\
                   <Tier>0x01</Tier>\
                   </PriceCluster>";
        let fragment = Fragment::parse(raw).unwrap();
        let message = decode(&fragment).unwrap().unwrap();
        assert_eq!(message, DecodedMessage::PriceCluster { price: 1.0, tier: 1 });
    }

    #[test]
    fn test_summation_rounds_net_only() {
        /* delivered = 10 / 3, received = 3 / 3, net = round(7 / 3, 1) */
        let raw = "<CurrentSummationDelivered>\
                   <SummationDelivered>0x0a</SummationDelivered>\
                   <SummationReceived>0x03</SummationReceived>\
                   <Multiplier>0x01</Multiplier>\
                   <Divisor>0x03</Divisor>\
                   <DigitsRight>0x01</DigitsRight>\
                   </CurrentSummationDelivered>";
        let fragment = Fragment::parse(raw).unwrap();
        match decode(&fragment).unwrap().unwrap() {
            DecodedMessage::CurrentSummationDelivered { delivered, received, net } => {
                assert_eq!(delivered, 10.0 / 3.0);
                assert_eq!(received, 1.0);
                assert_eq!(net, 2.3);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_summation_zero_divisor_fails_whole_fragment() {
        let raw = "<CurrentSummationDelivered>\
                   <SummationDelivered>0x0a</SummationDelivered>\
                   <SummationReceived>0x03</SummationReceived>\
                   <Multiplier>0x01</Multiplier>\
                   <Divisor>0x00</Divisor>\
                   <DigitsRight>0x01</DigitsRight>\
                   </CurrentSummationDelivered>";
        let fragment = Fragment::parse(raw).unwrap();
        let result = decode(&fragment);
        assert!(matches!(result, Err(RainforestParseError::ZeroDivisor)));
    }

    #[test]
    fn test_unsupported_tag_is_ignored() {
        let fragment = Fragment::parse("<TimeCluster><UTCTime>0x1fc60017</UTCTime></TimeCluster>").unwrap();
        assert_eq!(decode(&fragment).unwrap(), None);
    }

    #[test]
    fn test_missing_field_is_an_error() {
        let fragment = Fragment::parse("<PriceCluster><Price>0x64</Price></PriceCluster>").unwrap();
        let result = decode(&fragment);
        assert!(matches!(result, Err(RainforestParseError::MissingField("TrailingDigits"))));
    }

    #[test]
    fn test_set_price_command_is_bit_exact() {
        assert_eq!(
            set_price_command(26.4),
            "<Command><Name>set_current_price</Name><Price>0x1a</Price><TrailingDigits>0x05</TrailingDigits></Command>"
        );
        /* fractional precision is lost in the command, not in the display */
        assert_eq!(
            set_price_command(0.35),
            "<Command><Name>set_current_price</Name><Price>0x0</Price><TrailingDigits>0x05</TrailingDigits></Command>"
        );
    }
}

use super::RainforestParseError;
use std::collections::HashMap;

/// One self-contained markup fragment from the gateway, framed as a root tag
/// with flat child elements:
///
/// `<PriceCluster><Price>0x64</Price><TrailingDigits>0x02</TrailingDigits>...</PriceCluster>`
///
/// The gateway writes each message as a single burst, so whatever one poll
/// cycle reads is attempted as exactly one fragment. There is no
/// recombination: a message split across two reads fails to parse and is
/// dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    tag: String,
    fields: HashMap<String, String>,
}

impl Fragment {
    pub fn parse(input: &str) -> Result<Self, RainforestParseError> {
        let text = input.trim();

        if !text.starts_with('<') {
            return Err(RainforestParseError::NotAFragment);
        }

        /* Root tag */
        let open_end = text.find('>').ok_or(RainforestParseError::InvalidFormat)?;
        let tag = &text[1..open_end];
        if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(RainforestParseError::InvalidFormat);
        }

        /* The fragment must end with the matching close tag */
        let closing = format!("</{}>", tag);
        let body_end = text.rfind(&closing).ok_or(RainforestParseError::InvalidFormat)?;
        if !text[body_end + closing.len()..].trim().is_empty() {
            return Err(RainforestParseError::InvalidFormat);
        }

        let mut fields = HashMap::new();
        let mut rest = &text[open_end + 1..body_end];

        while !rest.trim_start().is_empty() {
            rest = rest.trim_start();
            if !rest.starts_with('<') {
                return Err(RainforestParseError::InvalidFormat);
            }

            let name_end = rest.find('>').ok_or(RainforestParseError::InvalidFormat)?;
            let name = &rest[1..name_end];
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(RainforestParseError::InvalidFormat);
            }

            let close = format!("</{}>", name);
            let after = &rest[name_end + 1..];
            let value_end = after.find(&close).ok_or(RainforestParseError::InvalidFormat)?;

            fields.insert(name.to_string(), after[..value_end].trim().to_string());
            rest = &after[value_end + close.len()..];
        }

        return Ok(Fragment {
            tag: tag.to_string(),
            fields,
        });
    }

    pub fn tag(&self) -> &str {
        return &self.tag;
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        return self.fields.get(name).map(|value| value.as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_demand_fragment() {
        let raw = "<InstantaneousDemand>\
                   <Demand>0x001738</Demand>\
                   <Multiplier>0x00000001</Multiplier>\
                   <Divisor>0x000003e8</Divisor>\
                   <DigitsRight>0x03</DigitsRight>\
                   </InstantaneousDemand>";
        let fragment = Fragment::parse(raw).unwrap();
        assert_eq!(fragment.tag(), "InstantaneousDemand");
        assert_eq!(fragment.field("Demand"), Some("0x001738"));
        assert_eq!(fragment.field("Divisor"), Some("0x000003e8"));
        assert_eq!(fragment.field("Missing"), None);
    }

    #[test]
    fn test_parse_tolerates_whitespace_between_elements() {
        let raw = "<PriceCluster>\n  <Price>0x64</Price>\n  <Tier>0x01</Tier>\n</PriceCluster>\r\n";
        let fragment = Fragment::parse(raw).unwrap();
        assert_eq!(fragment.tag(), "PriceCluster");
        assert_eq!(fragment.field("Price"), Some("0x64"));
    }

    #[test]
    fn test_noise_is_not_a_fragment() {
        let result = Fragment::parse("ERR no such command");
        assert!(matches!(result, Err(RainforestParseError::NotAFragment)));
    }

    #[test]
    fn test_truncated_fragment_is_rejected() {
        let result = Fragment::parse("<InstantaneousDemand><Demand>0x17");
        assert!(matches!(result, Err(RainforestParseError::InvalidFormat)));
    }

    #[test]
    fn test_missing_close_tag_is_rejected() {
        let result = Fragment::parse("<PriceCluster><Price>0x64</Price>");
        assert!(matches!(result, Err(RainforestParseError::InvalidFormat)));
    }

    #[test]
    fn test_two_concatenated_messages_are_rejected() {
        let raw = "<PriceCluster><Price>0x64</Price></PriceCluster><PriceCluster><Price>0x65</Price></PriceCluster>";
        let result = Fragment::parse(raw);
        assert!(matches!(result, Err(RainforestParseError::InvalidFormat)));
    }
}

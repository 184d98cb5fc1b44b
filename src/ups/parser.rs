//! apcupsd status text parser.
//! Turns `KEY      : value` lines into a key/value map and pulls numbers out of
//! unit-suffixed values such as `100.0 Percent`.

use std::collections::BTreeMap;

use crate::error::SampleError;

/// Parse raw status lines. Lines without a `:` separator are ignored.
/// Input: "STATUS   : ONLINE \nBCHARGE  : 100.0 Percent\n..."
pub fn parse_status(raw: &str) -> BTreeMap<String, String> {
    raw.lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Read a numeric field, ignoring any trailing unit word.
pub fn parse_number(fields: &BTreeMap<String, String>, key: &'static str) -> Result<f64, SampleError> {
    let value = fields.get(key).ok_or(SampleError::MissingField(key))?;
    value
        .split_whitespace()
        .next()
        .and_then(|token| token.parse::<f64>().ok())
        .filter(|n| n.is_finite())
        .ok_or_else(|| SampleError::InvalidField { field: key, value: value.clone() })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = "APC      : 001,036,0857\n\
                       DATE     : 2026-10-19 09:12:44 +0000  \n\
                       STATUS   : ONBATT \n\
                       LINEV    : 0.0 Volts\n\
                       LOADPCT  : 18.0 Percent\n\
                       BCHARGE  : 15.0 Percent\n\
                       TIMELEFT : 6.2 Minutes\n\
                       BATTV    : 12.1 Volts\n\
                       END APC  : 2026-10-19 09:12:50 +0000  \n";

    #[test]
    fn parses_key_value_lines() {
        let fields = parse_status(RAW);
        assert_eq!(fields.get("STATUS").map(String::as_str), Some("ONBATT"));
        // Only the first ':' separates key from value.
        assert_eq!(fields.get("DATE").map(String::as_str), Some("2026-10-19 09:12:44 +0000"));
        assert_eq!(fields.get("END APC").map(String::as_str), Some("2026-10-19 09:12:50 +0000"));
    }

    #[test]
    fn skips_lines_without_separator() {
        let fields = parse_status("garbage\n : orphan\nSTATUS : ONLINE\n");
        assert_eq!(fields.len(), 1);
    }

    #[test]
    fn numbers_drop_units() {
        let fields = parse_status(RAW);
        assert_eq!(parse_number(&fields, "BCHARGE").unwrap(), 15.0);
        assert_eq!(parse_number(&fields, "TIMELEFT").unwrap(), 6.2);
    }

    #[test]
    fn non_numeric_value_is_rejected() {
        let fields = parse_status("BCHARGE : N/A\nLOADPCT :\n");
        assert!(matches!(
            parse_number(&fields, "BCHARGE"),
            Err(SampleError::InvalidField { field: "BCHARGE", .. })
        ));
        assert!(matches!(
            parse_number(&fields, "LOADPCT"),
            Err(SampleError::InvalidField { field: "LOADPCT", .. })
        ));
        assert!(matches!(parse_number(&fields, "LINEV"), Err(SampleError::MissingField("LINEV"))));
    }
}

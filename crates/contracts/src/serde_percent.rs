//! Percentages rendered with two decimals, the precision shown to participants.

use serde::de::Error;
use serde::{Deserialize, Deserializer, Serializer};

pub fn round_two_decimals(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn serialize<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(round_two_decimals(*value))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PercentInput {
        Number(f64),
        String(String),
    }

    let value = match PercentInput::deserialize(deserializer)? {
        PercentInput::Number(value) => value,
        PercentInput::String(raw) => raw
            .trim()
            .trim_end_matches('%')
            .parse::<f64>()
            .map_err(D::Error::custom)?,
    };

    if !value.is_finite() {
        return Err(D::Error::custom("percentage must be finite"));
    }
    Ok(value)
}

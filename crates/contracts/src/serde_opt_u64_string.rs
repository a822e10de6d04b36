//! Optional `u64` carried as a JSON string so browser clients keep full precision.

use serde::de::Error;
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(value) => serializer.serialize_str(&value.to_string()),
        None => serializer.serialize_none(),
    }
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OptU64Input {
        String(String),
        Number(u64),
    }

    match Option::<OptU64Input>::deserialize(deserializer)? {
        Some(OptU64Input::String(raw)) if raw.trim().is_empty() => Ok(None),
        Some(OptU64Input::String(raw)) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(D::Error::custom),
        Some(OptU64Input::Number(value)) => Ok(Some(value)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
    struct Wrapper {
        #[serde(with = "super")]
        seed: Option<u64>,
    }

    #[test]
    fn accepts_string_number_and_null() {
        let parsed: Wrapper = serde_json::from_str(r#"{"seed":"1337"}"#).expect("string seed");
        assert_eq!(parsed.seed, Some(1337));

        let parsed: Wrapper = serde_json::from_str(r#"{"seed":1337}"#).expect("numeric seed");
        assert_eq!(parsed.seed, Some(1337));

        let parsed: Wrapper = serde_json::from_str(r#"{"seed":null}"#).expect("null seed");
        assert_eq!(parsed.seed, None);
    }

    #[test]
    fn serializes_as_string() {
        let raw = serde_json::to_string(&Wrapper { seed: Some(u64::MAX) }).expect("serialize");
        assert_eq!(raw, format!(r#"{{"seed":"{}"}}"#, u64::MAX));
    }
}

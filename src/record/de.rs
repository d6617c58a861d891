// src/record/de.rs

//! Lenient field deserializers
//!
//! Hand-written records spell ports both as `"8080"` and `8080`.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Number(u64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Number(n) => n.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Bool(b) => b.to_string(),
            Scalar::Text(s) => s,
        }
    }
}

pub(crate) fn default_true() -> bool {
    true
}

pub(crate) fn opt_port<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u16>, D::Error> {
    match Option::<Scalar>::deserialize(d)? {
        None => Ok(None),
        Some(Scalar::Number(n)) => u16::try_from(n)
            .map(Some)
            .map_err(|_| D::Error::custom(format!("port out of range: {n}"))),
        Some(Scalar::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Scalar::Text(s)) => s
            .trim()
            .parse::<u16>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("invalid port: {s}"))),
        Some(other) => Err(D::Error::custom(format!(
            "invalid port: {}",
            other.into_string()
        ))),
    }
}

pub(crate) fn stringly<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Scalar::deserialize(d).map(Scalar::into_string)
}

pub(crate) fn opt_stringly<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Scalar>::deserialize(d)?.map(Scalar::into_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct PortHolder {
        #[serde(default, deserialize_with = "opt_port")]
        port: Option<u16>,
        #[serde(default, deserialize_with = "opt_stringly")]
        default: Option<String>,
    }

    #[test]
    fn test_port_accepts_string_and_number() {
        let a: PortHolder = serde_json::from_str(r#"{"port": "8080"}"#).unwrap();
        let b: PortHolder = serde_json::from_str(r#"{"port": 8080}"#).unwrap();
        let c: PortHolder = serde_json::from_str(r#"{"port": ""}"#).unwrap();
        let d: PortHolder = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(a.port, Some(8080));
        assert_eq!(b.port, Some(8080));
        assert_eq!(c.port, None);
        assert_eq!(d.port, None);
    }

    #[test]
    fn test_port_rejects_garbage() {
        assert!(serde_json::from_str::<PortHolder>(r#"{"port": "http"}"#).is_err());
        assert!(serde_json::from_str::<PortHolder>(r#"{"port": 70000}"#).is_err());
    }

    #[test]
    fn test_stringly_defaults() {
        let p: PortHolder = serde_json::from_str(r#"{"default": 1000}"#).unwrap();
        assert_eq!(p.default.as_deref(), Some("1000"));
        let p: PortHolder = serde_json::from_str(r#"{"default": true}"#).unwrap();
        assert_eq!(p.default.as_deref(), Some("true"));
    }
}

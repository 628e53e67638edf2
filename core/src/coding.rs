//! JSON encode/decode configuration shared by every endpoint.
//!
//! The engine only asks a `CodingStrategy` to decode a success body into the
//! requested type and to encode JSON request bodies. Dates use the types'
//! own serde representation (ISO-8601 for `chrono` and `time`); non-finite
//! floats can opt into the `"inf"`/`"-inf"`/`"nan"` strings through
//! [`non_finite`].

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Key naming convention on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyCasing {
    /// Keys are passed through unchanged.
    #[default]
    Preserve,
    /// The server speaks snake_case: keys are converted to camelCase when
    /// decoding and back to snake_case when encoding.
    SnakeCase,
}

/// Decode/encode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodingStrategy {
    pub key_casing: KeyCasing,
}

impl CodingStrategy {
    pub fn snake_case() -> Self {
        Self {
            key_casing: KeyCasing::SnakeCase,
        }
    }

    /// Decode `bytes` into `T`. An empty body decodes as `{}`, so endpoints
    /// without content still produce a value for types that accept an empty
    /// object.
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, serde_json::Error> {
        let bytes = if bytes.is_empty() { &b"{}"[..] } else { bytes };
        match self.key_casing {
            KeyCasing::Preserve => serde_json::from_slice(bytes),
            KeyCasing::SnakeCase => {
                let value: Value = serde_json::from_slice(bytes)?;
                serde_json::from_value(rename_keys(value, &snake_to_camel))
            }
        }
    }

    /// Encode a JSON request body.
    pub fn encode_value(&self, value: &Value) -> Vec<u8> {
        let bytes = match self.key_casing {
            KeyCasing::Preserve => serde_json::to_vec(value),
            KeyCasing::SnakeCase => serde_json::to_vec(&rename_keys(value.clone(), &camel_to_snake)),
        };
        // Serializing a `Value` cannot fail: every map key is already a string.
        bytes.unwrap_or_default()
    }
}

fn rename_keys(value: Value, rename: &dyn Fn(&str) -> String) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (rename(&k), rename_keys(v, rename)))
                .collect::<Map<_, _>>(),
        ),
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|v| rename_keys(v, rename)).collect())
        }
        other => other,
    }
}

/// `user_id` -> `userId`. Leading underscores are kept.
pub fn snake_to_camel(key: &str) -> String {
    let trimmed = key.trim_start_matches('_');
    let mut out = String::with_capacity(key.len());
    out.push_str(&key[..key.len() - trimmed.len()]);
    let mut upper = false;
    for ch in trimmed.chars() {
        if ch == '_' {
            upper = true;
        } else if upper {
            out.extend(ch.to_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// `userId` -> `user_id`. A run of capitals is one word: `userID` ->
/// `user_id`, `HTTPStatus` -> `http_status`.
pub fn camel_to_snake(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut out = String::with_capacity(key.len() + 4);
    for (i, &ch) in chars.iter().enumerate() {
        if ch.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1);
            let word_start = match prev {
                None | Some('_') => false,
                Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
                Some(_) => true,
            };
            if word_start {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Serde `with` module for `f64` fields that may be non-finite.
///
/// ```
/// #[derive(serde::Serialize, serde::Deserialize)]
/// struct Reading {
///     #[serde(with = "wirecall_core::coding::non_finite")]
///     value: f64,
/// }
/// ```
pub mod non_finite {
    use serde::{Deserialize, Deserializer, Serializer};

    const INF: &str = "inf";
    const NEG_INF: &str = "-inf";
    const NAN: &str = "nan";

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_str(NAN)
        } else if *value == f64::INFINITY {
            serializer.serialize_str(INF)
        } else if *value == f64::NEG_INFINITY {
            serializer.serialize_str(NEG_INF)
        } else {
            serializer.serialize_f64(*value)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(n),
            Repr::Text(s) => match s.as_str() {
                INF => Ok(f64::INFINITY),
                NEG_INF => Ok(f64::NEG_INFINITY),
                NAN => Ok(f64::NAN),
                other => Err(serde::de::Error::custom(format!(
                    "expected a number or one of \"inf\", \"-inf\", \"nan\", got {other:?}"
                ))),
            },
        }
    }
}

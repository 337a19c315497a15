//! Payload schema for indexed message points

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Payload stored with each indexed message
///
/// Written by the external indexer; every field is optional on read so a
/// partially populated point degrades instead of failing the request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    #[serde(default)]
    pub channel: Option<String>,

    /// Lowercased channel, the key channel filters match on
    #[serde(default)]
    pub channel_lower: Option<String>,

    /// Calendar date, `YYYY-MM-DD`
    #[serde(default)]
    pub date: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub ts: Option<String>,

    /// Epoch seconds used for range filters and thread ordering
    #[serde(default)]
    pub ts_float: Option<f64>,

    /// Thread root identifier, compared as a string
    #[serde(default, deserialize_with = "lenient_string")]
    pub thread_ts: Option<String>,

    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub user_name: Option<String>,

    #[serde(default)]
    pub user_name_lower: Option<String>,

    #[serde(default)]
    pub text: Option<String>,

    /// Archive file the message came from; orders context windows
    #[serde(default)]
    pub source_file: Option<String>,

    /// Position within `source_file`
    #[serde(default)]
    pub message_index: Option<i64>,

    #[serde(default)]
    pub permalink: Option<String>,

    #[serde(default)]
    pub is_reply: Option<bool>,
}

impl MessagePayload {
    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    pub fn date_or_empty(&self) -> &str {
        self.date.as_deref().unwrap_or("")
    }
}

/// Fields are read one at a time; a mistyped value drops only that field
impl From<Map<String, Value>> for MessagePayload {
    fn from(map: Map<String, Value>) -> Self {
        Self {
            channel: payload_str(&map, "channel"),
            channel_lower: payload_str(&map, "channel_lower"),
            date: payload_str(&map, "date"),
            ts: payload_str(&map, "ts"),
            ts_float: payload_f64(&map, "ts_float"),
            thread_ts: payload_str(&map, "thread_ts"),
            user_id: payload_str(&map, "user_id"),
            user_name: payload_str(&map, "user_name"),
            user_name_lower: payload_str(&map, "user_name_lower"),
            text: payload_str(&map, "text"),
            source_file: payload_str(&map, "source_file"),
            message_index: payload_i64(&map, "message_index"),
            permalink: payload_str(&map, "permalink"),
            is_reply: match map.get("is_reply") {
                Some(Value::Bool(b)) => Some(*b),
                _ => None,
            },
        }
    }
}

/// Accept strings or numbers for identifiers the indexer may store either way
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        Some(other) => Some(other.to_string()),
    })
}

/// Look up a payload field as a string for filter evaluation
pub fn payload_str(payload: &Map<String, Value>, key: &str) -> Option<String> {
    match payload.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn payload_f64(payload: &Map<String, Value>, key: &str) -> Option<f64> {
    match payload.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Integers may arrive as doubles from Qdrant or as numeric strings
fn payload_i64(payload: &Map<String, Value>, key: &str) -> Option<i64> {
    match payload.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Convert Qdrant value to serde_json Value
pub fn json_from_qdrant_value(v: qdrant_client::qdrant::Value) -> Value {
    use qdrant_client::qdrant::value::Kind;

    match v.kind {
        Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => Value::Array(
            list.values
                .into_iter()
                .map(json_from_qdrant_value)
                .collect(),
        ),
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, json_from_qdrant_value(v)))
                .collect(),
        ),
        None => Value::Null,
    }
}

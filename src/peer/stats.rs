//! Перевод `webrtc::stats` в нейтральные [`StatsReport`].
//!
//! Каждый отчёт сериализуется serde и разбирается как объект: ключи
//! приводятся к camelCase, `null` остаётся "поле есть, значения нет".
//! Все отметки времени приводятся к миллисекундам: `Instant` webrtc-rs
//! пишет числом в секундах эпохи, `SystemTime` объектом.

use crate::engine::{AttributeValue, StatsReport};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

pub fn convert_report(report: webrtc::stats::StatsReport) -> Vec<StatsReport> {
    report
        .reports
        .into_iter()
        .filter_map(|(id, entry)| match serde_json::to_value(&entry) {
            Ok(value) => from_json(id, value),
            Err(e) => {
                debug!(report = %id, "skipping stats entry: {}", e);
                None
            }
        })
        .collect()
}

pub fn from_json(id: String, value: Value) -> Option<StatsReport> {
    let Value::Object(map) = value else {
        return None;
    };
    let stats_type = map
        .get("type")
        .or_else(|| map.get("stats_type"))
        .and_then(Value::as_str)
        .map(normalize_type)?;

    let mut attributes = HashMap::new();
    for (key, value) in &map {
        if matches!(key.as_str(), "type" | "stats_type" | "id") {
            continue;
        }
        let key = camel_case(key);
        let attribute = match value {
            Value::Number(n) if is_timestamp_key(&key) => {
                n.as_f64().map(|secs| Some(AttributeValue::Float(secs * 1000.0)))
            }
            _ => to_attribute(value),
        };
        if let Some(attribute) = attribute {
            attributes.insert(key, attribute);
        }
    }

    Some(StatsReport {
        id,
        stats_type,
        attributes,
    })
}

/// Имена вариантов webrtc-rs в строки типов W3C
fn normalize_type(raw: &str) -> String {
    let known = match raw {
        "InboundRTP" => "inbound-rtp",
        "OutboundRTP" => "outbound-rtp",
        "RemoteInboundRTP" => "remote-inbound-rtp",
        "RemoteOutboundRTP" => "remote-outbound-rtp",
        "CandidatePair" => "candidate-pair",
        other => other,
    };
    known.to_string()
}

fn is_timestamp_key(key: &str) -> bool {
    key == "timestamp" || key.ends_with("Timestamp")
}

fn camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for ch in key.chars() {
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

fn to_attribute(value: &Value) -> Option<Option<AttributeValue>> {
    match value {
        Value::Null => Some(None),
        Value::Bool(b) => Some(Some(AttributeValue::Flag(*b))),
        Value::Number(n) => {
            let attribute = if let Some(u) = n.as_u64() {
                AttributeValue::Integer(u)
            } else if let Some(i) = n.as_i64() {
                AttributeValue::Signed(i)
            } else {
                AttributeValue::Float(n.as_f64()?)
            };
            Some(Some(attribute))
        }
        Value::String(s) => Some(Some(AttributeValue::Text(s.clone()))),
        Value::Object(map) => system_time_ms(map).map(|ms| Some(AttributeValue::Float(ms))),
        Value::Array(_) => None,
    }
}

fn system_time_ms(map: &Map<String, Value>) -> Option<f64> {
    let secs = map.get("secs_since_epoch")?.as_f64()?;
    let nanos = map.get("nanos_since_epoch")?.as_f64()?;
    Some(secs * 1000.0 + nanos / 1e6)
}

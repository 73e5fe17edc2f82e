// src/session/classify.rs

//! Output classifier for the tagged record protocol.
//!
//! A primary-output record may carry a `Type` discriminator:
//!
//! ```text
//! { Type = "StatusUpdate", PercentComplete = 50, StatusMessage = "..." }
//! { Type = "Result", Success = true, Message = "..." }
//! ```
//!
//! Each record is decoded exactly once here into a [`Classified`] variant.
//! Field names are matched case-insensitively. Records without a
//! discriminator, with an unknown one, or that are not objects at all are
//! plain output.

use serde_json::{Map, Value};

use super::result::{ResultRecord, StatusUpdate};

pub const DISCRIMINATOR: &str = "Type";
pub const STATUS_UPDATE: &str = "StatusUpdate";
pub const RESULT: &str = "Result";

#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    Plain(Value),
    Status(StatusUpdate),
    Result(ResultRecord),
}

pub fn classify(record: Value) -> Classified {
    let Value::Object(map) = &record else {
        return Classified::Plain(record);
    };

    let tag = match field(map, DISCRIMINATOR) {
        Some(Value::String(tag)) => tag.as_str(),
        _ => return Classified::Plain(record),
    };

    if tag.eq_ignore_ascii_case(STATUS_UPDATE) {
        Classified::Status(StatusUpdate {
            percent_complete: field(map, "PercentComplete").map(percent).unwrap_or(0),
            message: field(map, "StatusMessage").map(text).unwrap_or_default(),
        })
    } else if tag.eq_ignore_ascii_case(RESULT) {
        Classified::Result(ResultRecord {
            success: field(map, "Success").and_then(boolean).unwrap_or(false),
            message: field(map, "Message").map(text).unwrap_or_default(),
        })
    } else {
        Classified::Plain(record)
    }
}

fn field<'a>(map: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    map.get(name).or_else(|| {
        map.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    })
}

/// Integer, float (truncated) or numeric string, clamped to 0..=100.
/// Anything else reads as 0.
fn percent(value: &Value) -> u8 {
    let raw = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
        }
        _ => None,
    };
    raw.map(|n| n.clamp(0, 100) as u8).unwrap_or(0)
}

fn boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

//! Turning assistant replies into typed intents.
//!
//! Replies are untrusted: they may arrive wrapped in Markdown fences, with
//! numbers as strings, or with fields missing. Numeric fields never cause a
//! rejection on their own; they coerce to zero.

use serde_json::{Map, Value};

use crate::models::{Ingredient, MacroBreakdown};

#[derive(Debug, thiserror::Error)]
pub enum IntentError {
    #[error("no API key configured")]
    MissingApiKey,

    #[error("assistant request failed: {0}")]
    Service(String),

    #[error("malformed assistant reply: {0}")]
    Malformed(String),
}

/// What the user asked for, as understood by the assistant.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Meal(MacroBreakdown),
    SaveFavourite { name: String },
    LogFavourite { name: String },
    Weight { kg: f64 },
    Height { cm: f64 },
    Age { years: i64 },
    Recipe { name: String, grams: f64 },
    Chat { message: String },
}

/// The JSON value inside a model reply: from the first `{` or `[` to the last
/// matching closer. Code fences, language tags and surrounding prose fall away.
#[must_use]
pub fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(start) = trimmed.find(['{', '[']) else {
        return trimmed;
    };
    let closer = if trimmed[start..].starts_with('{') { '}' } else { ']' };
    match trimmed.rfind(closer) {
        Some(end) if end > start => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// Integer from a JSON number or numeric string. Floats round to nearest;
/// anything else is 0.
#[must_use]
pub fn coerce_int(value: Option<&Value>) -> i64 {
    if let Some(i) = value.and_then(Value::as_i64) {
        return i;
    }
    coerce_float(value).round() as i64
}

/// Float from a JSON number or numeric string; anything else is 0.
#[must_use]
pub fn coerce_float(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite()).unwrap_or(0.0)
}

fn text_field(obj: &Map<String, Value>, key: &str) -> String {
    match obj.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        _ => String::new(),
    }
}

fn required_text(obj: &Map<String, Value>, key: &str, kind: &str) -> Result<String, IntentError> {
    let value = text_field(obj, key);
    if value.is_empty() {
        return Err(IntentError::Malformed(format!("{kind} reply without a {key}")));
    }
    Ok(value)
}

fn parse_object(raw: &str) -> Result<Map<String, Value>, IntentError> {
    let value: Value = serde_json::from_str(extract_json(raw))
        .map_err(|e| IntentError::Malformed(format!("invalid JSON: {e}")))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(IntentError::Malformed("expected a JSON object".to_string())),
    }
}

/// Parse one assistant reply into an [`Intent`].
pub fn parse_intent(raw: &str) -> Result<Intent, IntentError> {
    let obj = parse_object(raw)?;
    let kind = text_field(&obj, "type");

    let intent = match kind.as_str() {
        "meal" => Intent::Meal(MacroBreakdown {
            food: text_field(&obj, "food"),
            calories: coerce_int(obj.get("calories")),
            protein: coerce_int(obj.get("protein")),
            fat: coerce_int(obj.get("fat")),
            carbs: coerce_int(obj.get("carbs")),
            fiber: coerce_int(obj.get("fiber")),
        }),
        "save_favourite" => Intent::SaveFavourite {
            name: required_text(&obj, "name", &kind)?,
        },
        "log_favourite" => Intent::LogFavourite {
            name: required_text(&obj, "name", &kind)?,
        },
        "weight" => Intent::Weight {
            kg: coerce_float(obj.get("kg")),
        },
        "height" => Intent::Height {
            cm: coerce_float(obj.get("cm")),
        },
        "age" => Intent::Age {
            years: coerce_int(obj.get("years")),
        },
        "recipe" => Intent::Recipe {
            name: required_text(&obj, "name", &kind)?,
            grams: coerce_float(obj.get("grams")),
        },
        "chat" => Intent::Chat {
            message: text_field(&obj, "message"),
        },
        other => {
            return Err(IntentError::Malformed(format!("unknown intent type '{other}'")));
        }
    };
    Ok(intent)
}

/// Parse an ingredient list reply. Any problem yields `None`, never a partial
/// list.
#[must_use]
pub fn parse_ingredients(raw: &str) -> Option<Vec<Ingredient>> {
    let value: Value = serde_json::from_str(extract_json(raw)).ok()?;
    let items = value.as_array()?;

    items
        .iter()
        .map(|item| {
            let obj = item.as_object()?;
            let name = text_field(obj, "name");
            if name.is_empty() {
                return None;
            }
            Some(Ingredient {
                name,
                weight_g: coerce_float(obj.get("weight_g")),
                calories: coerce_float(obj.get("calories")),
                protein: coerce_float(obj.get("protein")),
                fat: coerce_float(obj.get("fat")),
                carbs: coerce_float(obj.get("carbs")),
                fiber: coerce_float(obj.get("fiber")),
            })
        })
        .collect()
}

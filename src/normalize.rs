//! Mapping of a loosely-typed model reply onto the fixed result schema.

use serde::Serialize;
use serde_json::{Map, Value};

/// Fallback used when a field is absent or falsy in the model reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDefault {
    Literal(&'static str),
    /// `Коротко: <title>`, or a fixed placeholder when the title is empty.
    TitleSummary,
}

pub const SUMMARY_PREFIX: &str = "Коротко: ";
pub const SUMMARY_NO_TITLE: &str = "Коротко: без заголовка";

/// Output fields in wire order, paired with their defaults.
pub const FIELD_DEFAULTS: [(&str, FieldDefault); 9] = [
    ("direction", FieldDefault::Literal("прочее")),
    ("type", FieldDefault::Literal("новостная заметка")),
    ("entities", FieldDefault::Literal("")),
    ("roles", FieldDefault::Literal("")),
    ("potentialClients", FieldDefault::Literal("")),
    ("potential", FieldDefault::Literal("низкий")),
    ("trigger", FieldDefault::Literal("информационный фон")),
    ("summary", FieldDefault::TitleSummary),
    ("mediaIndex", FieldDefault::Literal("низкий")),
];

#[derive(Debug, Serialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub direction: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub entities: String,
    pub roles: String,
    pub potential_clients: String,
    pub potential: String,
    pub trigger: String,
    pub summary: String,
    pub media_index: String,
}

impl AnalysisResult {
    fn slot(&mut self, field: &str) -> Option<&mut String> {
        match field {
            "direction" => Some(&mut self.direction),
            "type" => Some(&mut self.kind),
            "entities" => Some(&mut self.entities),
            "roles" => Some(&mut self.roles),
            "potentialClients" => Some(&mut self.potential_clients),
            "potential" => Some(&mut self.potential),
            "trigger" => Some(&mut self.trigger),
            "summary" => Some(&mut self.summary),
            "mediaIndex" => Some(&mut self.media_index),
            _ => None,
        }
    }
}

/// Build the result from a recovered reply.  Non-object replies contribute
/// nothing, so every field falls back to its default.
pub fn normalize(reply: &Value, title: &str) -> AnalysisResult {
    let empty = Map::new();
    let obj = reply.as_object().unwrap_or(&empty);
    let mut result = AnalysisResult::default();
    for (field, default) in FIELD_DEFAULTS {
        let value = obj
            .get(field)
            .and_then(truthy_text)
            .unwrap_or_else(|| default_for(default, title));
        if let Some(slot) = result.slot(field) {
            *slot = value;
        }
    }
    result
}

fn default_for(default: FieldDefault, title: &str) -> String {
    match default {
        FieldDefault::Literal(text) => text.to_string(),
        FieldDefault::TitleSummary if title.is_empty() => SUMMARY_NO_TITLE.to_string(),
        FieldDefault::TitleSummary => format!("{SUMMARY_PREFIX}{title}"),
    }
}

/// Text form of a value if it is truthy: non-empty strings, non-zero
/// numbers, `true`, non-empty arrays and objects.
fn truthy_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::Bool(true) => Some("true".to_string()),
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) if items.is_empty() => None,
        Value::Array(items) => Some(
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(", "),
        ),
        Value::Object(map) if map.is_empty() => None,
        Value::Object(_) => Some(value.to_string()),
    }
}

//! Backend payload construction.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::request::{ExtensionParams, Message};

/// The JSON object sent to the backend.
///
/// Built from the extension parameters first, then the core fields are
/// written on top, so an extension can never replace `model`, `messages` or
/// `stream`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct BackendPayload(Map<String, Value>);

impl BackendPayload {
    /// Translate an inbound request into the backend's schema.
    #[must_use]
    pub fn translate(
        deployment: &str,
        messages: Vec<Message>,
        stream: bool,
        extensions: ExtensionParams,
    ) -> Self {
        let mut body = extensions.into_inner();
        body.insert("model".into(), Value::String(deployment.to_string()));
        body.insert(
            "messages".into(),
            Value::Array(messages.into_iter().map(Value::Object).collect()),
        );
        body.insert("stream".into(), Value::Bool(stream));
        Self(body)
    }

    /// Deployment identifier the payload targets.
    pub fn model(&self) -> Option<&str> {
        self.0.get("model").and_then(Value::as_str)
    }

    pub fn stream(&self) -> bool {
        self.0.get("stream").and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn as_object(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Serialize to the wire format.
    pub fn to_vec(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn messages() -> Vec<Message> {
        vec![
            json!({"role": "system", "content": "be brief"}),
            json!({"role": "user", "content": "hi"}),
        ]
        .into_iter()
        .map(|v| match v {
            Value::Object(map) => map,
            _ => unreachable!(),
        })
        .collect()
    }

    fn extensions(value: Value) -> ExtensionParams {
        match value {
            Value::Object(map) => ExtensionParams::from_object(map),
            _ => unreachable!(),
        }
    }

    #[test]
    fn merges_extensions_with_core_fields() {
        let payload = BackendPayload::translate(
            "ep-1",
            messages(),
            true,
            extensions(json!({"temperature": 0.7, "tools": [{"type": "function"}]})),
        );

        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "model": "ep-1",
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "hi"}
                ],
                "stream": true,
                "temperature": 0.7,
                "tools": [{"type": "function"}]
            })
        );
        assert_eq!(payload.model(), Some("ep-1"));
        assert!(payload.stream());
    }

    #[test]
    fn extensions_cannot_override_core_fields() {
        let mut raw = Map::new();
        raw.insert("model".into(), json!("attacker"));
        raw.insert("messages".into(), json!([]));
        raw.insert("stream".into(), json!(true));
        raw.insert("top_p".into(), json!(0.9));

        let payload =
            BackendPayload::translate("ep-real", messages(), false, ExtensionParams::from_object(raw));

        assert_eq!(payload.model(), Some("ep-real"));
        assert!(!payload.stream());
        assert_eq!(payload.as_object()["messages"].as_array().unwrap().len(), 2);
        assert_eq!(payload.as_object()["top_p"], json!(0.9));
    }

    #[test]
    fn serializes_as_a_flat_object() {
        let payload = BackendPayload::translate("ep", messages(), false, ExtensionParams::default());
        let bytes = payload.to_vec().unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["model"], "ep");
        assert_eq!(value["stream"], false);
        assert_eq!(value.as_object().unwrap().len(), 3);
    }
}

//! Chat completion client.  Sends one classification prompt per news item
//! and returns the model's raw text reply.

use serde_json::{json, Value};

use crate::error::{truncate_body, RelayError};
use crate::AnalyzeRequest;

pub const MODEL: &str = "GigaChat";
pub const TEMPERATURE: f64 = 0.2;
pub const MAX_TOKENS: u32 = 700;

const SYSTEM_PROMPT: &str = concat!(
    "Ты аналитик B2B IT-рынка (ITSM/ITAM/CMDB/SAM). ",
    "Верни ТОЛЬКО валидный JSON без markdown и пояснений. ",
    "JSON строго с полями: direction,type,entities,roles,potentialClients,potential,trigger,summary,mediaIndex. ",
    "Если не уверен — пустая строка или 'низкий'."
);

const USER_PROMPT_HEADER: &str = concat!(
    "Заполни поля по новости.\n",
    "direction: продукт|партнёрство|рынок|конкуренты|прочее.\n",
    "type: маркетинговая|пресс-релиз|публичный кейс|аналитический обзор|новостная заметка.\n",
    "potential/mediaIndex: низкий|средний|высокий.\n\n"
);

pub struct ChatClient {
    client: reqwest::Client,
    url: String,
}

impl ChatClient {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }

    /// Completion request body for one news item.
    pub fn request_body(req: &AnalyzeRequest) -> Value {
        let user = format!(
            "{USER_PROMPT_HEADER}Заголовок: {}\nСниппет: {}\nURL: {}",
            req.title, req.snippet, req.url
        );
        json!({
            "model": MODEL,
            "temperature": TEMPERATURE,
            "max_tokens": MAX_TOKENS,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": user }
            ]
        })
    }

    /// Run the completion and return the trimmed `choices[0].message.content`.
    pub async fn complete(&self, token: &str, req: &AnalyzeRequest) -> Result<String, RelayError> {
        let resp = self
            .client
            .post(&self.url)
            .header("accept", "application/json")
            .bearer_auth(token)
            .json(&Self::request_body(req))
            .send()
            .await
            .map_err(|e| RelayError::UpstreamChat(format!("Chat request failed: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| RelayError::UpstreamChat(format!("Chat read failed: {e}")))?;
        if !status.is_success() {
            return Err(RelayError::UpstreamChat(format!(
                "Chat {}: {}",
                status.as_u16(),
                truncate_body(&text)
            )));
        }

        let envelope: Value = serde_json::from_str(&text)
            .map_err(|e| RelayError::UpstreamChat(format!("Chat response is not JSON: {e}")))?;
        message_content(&envelope)
            .map(str::to_string)
            .ok_or_else(|| RelayError::UpstreamChat("Empty model reply (no content)".to_string()))
    }
}

fn message_content(envelope: &Value) -> Option<&str> {
    envelope
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

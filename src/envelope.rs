/*!
 * @file envelope.rs
 * @brief Message envelope carried over the bus transport
 */

use std::collections::HashMap;

use bson::{Bson, Document};
use serde_json::{json, Value};

use crate::error::{PersistorError, Result};

/// Metadata key naming the operation a request targets.
pub const ACTION_HEADER: &str = "action";

/// Generic failure code carried by every failure reply.
pub const FAILURE_CODE: i32 = -1;

/// One inbound request: string metadata headers plus a document payload.
/// On the wire this is a single JSON object,
/// `{"headers": {"action": ...}, "body": {...}}`, with the body read as
/// relaxed extended JSON so values like `{"$date": ...}` survive.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub headers: HashMap<String, String>,
    pub body: Document,
}

impl Request {
    pub fn new(action: impl Into<String>, body: Document) -> Self {
        let mut headers = HashMap::new();
        headers.insert(ACTION_HEADER.to_string(), action.into());
        Self { headers, body }
    }

    pub fn action(&self) -> Option<&str> {
        self.headers.get(ACTION_HEADER).map(String::as_str)
    }

    pub fn from_json(line: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(line)?;
        let obj = value
            .as_object()
            .ok_or_else(|| PersistorError::Envelope("request must be a JSON object".to_string()))?;

        let mut headers = HashMap::new();
        if let Some(raw) = obj.get("headers") {
            let header_obj = raw.as_object().ok_or_else(|| {
                PersistorError::Envelope("request headers must be an object".to_string())
            })?;
            for (key, val) in header_obj {
                let text = val.as_str().ok_or_else(|| {
                    PersistorError::Envelope(format!("header '{}' must be a string", key))
                })?;
                headers.insert(key.clone(), text.to_string());
            }
        }

        let body = match obj.get("body") {
            None | Some(Value::Null) => Document::new(),
            Some(raw) => document_from_json(raw.clone())?,
        };

        Ok(Self { headers, body })
    }

    pub fn to_json(&self) -> Result<String> {
        let body = Bson::Document(self.body.clone()).into_relaxed_extjson();
        let frame = json!({ "headers": self.headers, "body": body });
        Ok(serde_json::to_string(&frame)?)
    }
}

/// One outbound reply. Success carries the operation's result value
/// (`Bson::Null` when the operation returns nothing); failure carries the
/// generic code and the underlying message text, nothing more.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Success(Bson),
    Failure { code: i32, message: String },
}

impl Reply {
    pub fn success(value: impl Into<Bson>) -> Self {
        Reply::Success(value.into())
    }

    pub fn empty() -> Self {
        Reply::Success(Bson::Null)
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Reply::Failure {
            code: FAILURE_CODE,
            message: message.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Reply::Failure { .. })
    }

    pub fn to_json(&self) -> Result<String> {
        let frame = match self {
            Reply::Success(value) => {
                json!({ "body": value.clone().into_relaxed_extjson() })
            }
            Reply::Failure { code, message } => {
                json!({ "failureCode": code, "message": message })
            }
        };
        Ok(serde_json::to_string(&frame)?)
    }

    pub fn from_json(line: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(line)?;
        let obj = value
            .as_object()
            .ok_or_else(|| PersistorError::Envelope("reply must be a JSON object".to_string()))?;

        if let Some(code) = obj.get("failureCode") {
            let code = code.as_i64().ok_or_else(|| {
                PersistorError::Envelope("failureCode must be an integer".to_string())
            })? as i32;
            let message = obj
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return Ok(Reply::Failure { code, message });
        }

        let body = match obj.get("body") {
            None | Some(Value::Null) => Bson::Null,
            Some(raw) => bson_from_json(raw.clone())?,
        };
        Ok(Reply::Success(body))
    }
}

/// Converts a JSON value into BSON, honoring extended-JSON encodings.
pub fn bson_from_json(value: Value) -> Result<Bson> {
    Bson::try_from(value)
        .map_err(|err| PersistorError::Envelope(format!("invalid body value: {}", err)))
}

/// Converts a JSON object into a BSON document, honoring extended JSON.
pub fn document_from_json(value: Value) -> Result<Document> {
    match bson_from_json(value)? {
        Bson::Document(doc) => Ok(doc),
        _ => Err(PersistorError::Envelope(
            "body must be a JSON object".to_string(),
        )),
    }
}

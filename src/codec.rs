//! Line-delimited JSON codec.
//!
//! Every message occupies exactly one line terminated by `\n`. There is no
//! length header, so an encoded message must never contain a raw line break.
//! Responses are decoded once, here, into a [`Reply`]; callers never probe
//! the raw JSON for `result` or `error` themselves.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{FuzzError, ProtocolError};
use crate::types::{ContentBlock, RequestId, Response};

/// Longest slice of an offending line kept in a decode error
const MAX_ECHOED_LINE: usize = 200;

/// Successful result of a call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    /// The standard `content` blocks
    pub content: Vec<ContentBlock>,
    /// Every other member of the result object (side-channel data)
    pub extras: Map<String, Value>,
}

impl Payload {
    pub fn first_text(&self) -> Option<&str> {
        self.content.first().and_then(|block| block.text.as_deref())
    }

    /// First line of the first content block, or `""`
    pub fn summary(&self) -> &str {
        self.first_text()
            .and_then(|text| text.lines().next())
            .unwrap_or_default()
    }

    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extras.get(key)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Success(Payload),
    Failure { code: i32, message: String },
}

impl Reply {
    pub fn is_success(&self) -> bool {
        matches!(self, Reply::Success(_))
    }

    /// Turn a server-reported failure into [`FuzzError::Rpc`].
    pub fn into_payload(self) -> Result<Payload, FuzzError> {
        match self {
            Reply::Success(payload) => Ok(payload),
            Reply::Failure { code, message } => Err(FuzzError::Rpc { code, message }),
        }
    }
}

/// A decoded response together with the id it was correlated to.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub id: Option<RequestId>,
    pub reply: Reply,
}

/// Serialize `message` to one newline-terminated line.
pub fn encode<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    let text = serde_json::to_string(message).map_err(ProtocolError::Encode)?;
    frame(text)
}

/// Terminate an already-serialized message, rejecting embedded line breaks.
pub fn frame(mut text: String) -> Result<String, ProtocolError> {
    if text.contains(['\n', '\r']) {
        return Err(ProtocolError::EmbeddedNewline);
    }
    text.push('\n');
    Ok(text)
}

/// Decode one raw line as read from the pipe, terminator included.
///
/// An empty or whitespace-only line is a decode failure like any other.
pub fn decode_line(raw: &[u8]) -> Result<Decoded, ProtocolError> {
    let text = std::str::from_utf8(raw).map_err(|source| ProtocolError::InvalidUtf8 {
        line: String::from_utf8_lossy(raw)
            .chars()
            .take(MAX_ECHOED_LINE)
            .collect(),
        source,
    })?;
    decode(text.trim_end_matches(['\n', '\r']))
}

/// Decode one response line.
pub fn decode(line: &str) -> Result<Decoded, ProtocolError> {
    let response: Response =
        serde_json::from_str(line).map_err(|source| decode_error(line, source))?;

    let reply = match (response.error, response.result) {
        (Some(error), _) => Reply::Failure {
            code: error.code,
            message: error.message,
        },
        (None, Some(Value::Object(mut result))) => {
            let content = match result.remove("content") {
                None | Some(Value::Null) => Vec::new(),
                Some(raw) => serde_json::from_value::<Vec<ContentBlock>>(raw)
                    .map_err(|source| decode_error(line, source))?,
            };
            let payload = Payload {
                content,
                extras: result,
            };

            // Tool-level errors arrive as a result flagged with `isError`.
            if matches!(payload.extra("isError"), Some(Value::Bool(true))) {
                Reply::Failure {
                    code: 0,
                    message: payload
                        .first_text()
                        .unwrap_or("tool reported an error")
                        .to_string(),
                }
            } else {
                Reply::Success(payload)
            }
        }
        (None, Some(_)) => Reply::Success(Payload::default()),
        (None, None) => return Err(ProtocolError::MissingOutcome),
    };

    Ok(Decoded {
        id: response.id,
        reply,
    })
}

fn decode_error(line: &str, source: serde_json::Error) -> ProtocolError {
    ProtocolError::Decode {
        line: line.chars().take(MAX_ECHOED_LINE).collect(),
        source,
    }
}

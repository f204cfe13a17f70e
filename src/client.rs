//! Half-duplex JSON-RPC client over a child's stdio pipes.
//!
//! One request is outstanding at a time: `call` writes a line and then reads
//! exactly one response line before returning. Responses are not matched
//! against a table of pending ids; ordering is assumed strict. A line that
//! does not decode, blank ones included, fails the call.

use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::codec::{self, Decoded, Reply};
use crate::error::ProtocolError;
use crate::types::{Notification, Request, ToolCall};

pub struct ProtocolClient<W, R> {
    writer: W,
    reader: R,
    timeout: Option<Duration>,
    line: Vec<u8>,
}

impl<W, R> ProtocolClient<W, R>
where
    W: AsyncWrite + Unpin,
    R: AsyncBufRead + Unpin,
{
    pub fn new(writer: W, reader: R) -> Self {
        Self {
            writer,
            reader,
            timeout: None,
            line: Vec::new(),
        }
    }

    /// Bound every round trip. `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn call(
        &mut self,
        method: &str,
        params: Value,
        id: u64,
    ) -> Result<Reply, ProtocolError> {
        let request = Request::new(method, id).with_params(params);
        tracing::debug!(method, id, "sending request");
        self.write_line(&codec::encode(&request)?).await?;

        let timeout = self.timeout;
        let decoded = match timeout {
            Some(limit) => tokio::time::timeout(limit, self.read_reply())
                .await
                .map_err(|_| ProtocolError::Timeout(limit))??,
            None => self.read_reply().await?,
        };

        if decoded.id.as_ref() != Some(&Value::from(id)) {
            tracing::debug!(expected = id, received = ?decoded.id, "response id mismatch");
        }
        tracing::debug!(method, id, success = decoded.reply.is_success(), "received response");
        Ok(decoded.reply)
    }

    /// `tools/call` with `{name, arguments}` params.
    pub async fn call_tool(
        &mut self,
        name: &str,
        arguments: Value,
        id: u64,
    ) -> Result<Reply, ProtocolError> {
        let params =
            serde_json::to_value(ToolCall { name, arguments }).map_err(ProtocolError::Encode)?;
        self.call("tools/call", params, id).await
    }

    /// Write a notification; nothing is read back.
    pub async fn notify(
        &mut self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), ProtocolError> {
        let mut notification = Notification::new(method);
        if let Some(params) = params {
            notification = notification.with_params(params);
        }
        tracing::debug!(method, "sending notification");
        self.write_line(&codec::encode(&notification)?).await
    }

    async fn write_line(&mut self, line: &str) -> Result<(), ProtocolError> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Read exactly one line and decode it.
    async fn read_reply(&mut self) -> Result<Decoded, ProtocolError> {
        self.line.clear();
        if self.reader.read_until(b'\n', &mut self.line).await? == 0 {
            return Err(ProtocolError::Closed);
        }
        codec::decode_line(&self.line)
    }
}

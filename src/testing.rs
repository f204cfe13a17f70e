//! In-memory stand-ins for a server child process.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, duplex};

use crate::process::{ChildHandle, PipeReader, PipeWriter};

/// What the scripted server does with one incoming message.
pub enum Step {
    /// Write this JSON value as a response line
    Reply(Value),
    /// Write these bytes verbatim, followed by a newline
    Raw(String),
    /// Write nothing; used for notifications
    Silent,
    /// Stop answering but keep the pipes open
    Hang,
    /// Close the server's stdout
    Close,
}

impl Step {
    pub fn reply(id: Value, result: Value) -> Self {
        Step::Reply(json!({"jsonrpc": "2.0", "id": id, "result": result}))
    }

    /// A tool result whose first content block is `text`
    pub fn ok(id: &Value, text: &str) -> Self {
        Self::reply(id.clone(), json!({"content": [{"type": "text", "text": text}]}))
    }

    pub fn error(id: &Value, code: i32, message: &str) -> Self {
        Step::Reply(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": code, "message": message},
        }))
    }
}

/// Counts calls to [`ChildHandle::terminate`].
#[derive(Clone, Default)]
pub struct Terminations(Arc<AtomicUsize>);

impl Terminations {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct FakeChild {
    stdin: Option<DuplexStream>,
    stdout: BufReader<DuplexStream>,
    terminations: Terminations,
}

impl FakeChild {
    /// Start a server task that answers each incoming line with `script`.
    pub fn spawn<F>(mut script: F) -> (Self, Terminations)
    where
        F: FnMut(Value) -> Step + Send + 'static,
    {
        let (client_out, server_in) = duplex(64 * 1024);
        let (server_out, client_in) = duplex(64 * 1024);

        tokio::spawn(async move {
            let mut lines = BufReader::new(server_in).lines();
            let mut output = Some(server_out);
            let mut answering = true;

            while let Ok(Some(line)) = lines.next_line().await {
                if !answering {
                    continue;
                }
                let Ok(message) = serde_json::from_str::<Value>(&line) else {
                    continue;
                };
                let Some(out) = output.as_mut() else {
                    continue;
                };
                match script(message) {
                    Step::Reply(value) => {
                        let text = format!("{value}\n");
                        if out.write_all(text.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                    Step::Raw(text) => {
                        if out.write_all(format!("{text}\n").as_bytes()).await.is_err() {
                            break;
                        }
                    }
                    Step::Silent => {}
                    Step::Hang => answering = false,
                    Step::Close => output = None,
                }
            }
        });

        let terminations = Terminations::default();
        let child = Self {
            stdin: Some(client_out),
            stdout: BufReader::new(client_in),
            terminations: terminations.clone(),
        };
        (child, terminations)
    }
}

#[async_trait]
impl ChildHandle for FakeChild {
    fn pipes(&mut self) -> Option<(&mut PipeWriter, &mut PipeReader)> {
        let writer: &mut PipeWriter = self.stdin.as_mut()?;
        let reader: &mut PipeReader = &mut self.stdout;
        Some((writer, reader))
    }

    async fn terminate(&mut self) {
        self.terminations.0.fetch_add(1, Ordering::SeqCst);
        self.stdin = None;
    }
}

/// A well-behaved MySQL MCP server advertising `schemas`.
///
/// `on_query` decides the answer to each `query` tool call, given the
/// request id and the SQL text.
pub fn mysql_server<Q>(
    schemas: Value,
    mut on_query: Q,
) -> impl FnMut(Value) -> Step + Send + 'static
where
    Q: FnMut(&Value, &str) -> Step + Send + 'static,
{
    move |message: Value| {
        let id = message["id"].clone();
        match message["method"].as_str() {
            Some("initialize") => Step::reply(
                id,
                json!({
                    "protocolVersion": "2025-03-26",
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "mysql-mcp-server", "version": "1.0.0"},
                }),
            ),
            Some("tools/list") => Step::reply(
                id,
                json!({"tools": [
                    {"name": "mysql", "description": "Get MySQL database schema"},
                    {"name": "query", "description": "Execute a read-only query"},
                ]}),
            ),
            Some("tools/call") => match message["params"]["name"].as_str() {
                Some("mysql") => {
                    let count = schemas.as_array().map_or(0, Vec::len);
                    let text = format!("Retrieved schemas for {count} tables.");
                    Step::reply(
                        id,
                        json!({
                            "content": [{"type": "text", "text": text}],
                            "schemas": schemas.clone(),
                        }),
                    )
                }
                Some("query") => {
                    let sql = message["params"]["arguments"]["query"]
                        .as_str()
                        .unwrap_or_default();
                    on_query(&id, sql)
                }
                _ => Step::error(&id, -32601, "Unknown tool"),
            },
            Some(_) if id.is_null() => Step::Silent,
            _ => Step::error(&id, -32601, "Method not found"),
        }
    }
}

//! Session state machine.
//!
//! A session walks `Uninitialized → Initializing → FetchingSchema →
//! Iterating(i) → Done`, or drops into `Aborted` from any of the non-terminal
//! states. Whatever the ending, the child is terminated exactly once, after
//! the state machine has settled.

use std::future::Future;
use std::time::{Duration, Instant};

use rand::Rng;
use serde_json::json;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::Instrument;

use crate::client::ProtocolClient;
use crate::codec::Reply;
use crate::config::FuzzConfig;
use crate::error::{AbortReason, FuzzError, ProtocolError};
use crate::process::{ChildHandle, ServerProcess};
use crate::report::Reporter;
use crate::schema::{SCHEMA_TOOL, SchemaCache};
use crate::synth::{QueryShape, QuerySynthesizer};
use crate::types::ToolDescriptor;

/// Tool that executes a query
pub const QUERY_TOOL: &str = "query";

pub const CLIENT_NAME: &str = "mcp-sql-fuzz";
pub const PROTOCOL_VERSION: &str = "2025-03-26";

const INITIALIZE_ID: u64 = 1;
const TOOLS_LIST_ID: u64 = 3;
const QUERY_ID_BASE: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    FetchingSchema,
    /// Running the zero-based iteration
    Iterating(u64),
    Done,
    Aborted,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Done | SessionState::Aborted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    /// First line of the server's textual summary
    Success { summary: String },
    /// Server-reported failure; an expected fuzzing result
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryRecord {
    /// 1-based
    pub iteration: u64,
    pub shape: QueryShape,
    pub query: String,
    pub elapsed: Duration,
    pub outcome: QueryOutcome,
}

impl QueryRecord {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, QueryOutcome::Success { .. })
    }
}

#[derive(Debug)]
pub struct SessionReport {
    pub state: SessionState,
    pub abort: Option<AbortReason>,
    pub tables: usize,
    pub planned: u64,
    pub seed: Option<u64>,
    /// Iterations that completed, including those before an abort
    pub records: Vec<QueryRecord>,
}

impl SessionReport {
    pub fn is_done(&self) -> bool {
        self.state == SessionState::Done
    }

    pub fn successes(&self) -> usize {
        self.records.iter().filter(|r| r.is_success()).count()
    }

    pub fn failures(&self) -> usize {
        self.records.len() - self.successes()
    }
}

#[derive(Default)]
struct Progress {
    tables: usize,
    records: Vec<QueryRecord>,
}

pub struct FuzzRunner {
    iterations: u64,
    timeout: Option<Duration>,
    list_tools: bool,
    seed: Option<u64>,
    synthesizer: QuerySynthesizer,
    reporter: Box<dyn Reporter>,
    state: SessionState,
}

impl FuzzRunner {
    pub fn new(config: &FuzzConfig) -> Self {
        Self {
            iterations: config.iterations,
            timeout: config.timeout,
            list_tools: config.list_tools,
            seed: config.seed,
            synthesizer: QuerySynthesizer::default(),
            reporter: Box::new(crate::report::NoopReporter),
            state: SessionState::Uninitialized,
        }
    }

    pub fn with_reporter(mut self, reporter: impl Reporter + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    pub fn with_synthesizer(mut self, synthesizer: QuerySynthesizer) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run one session against `child`, then terminate it.
    ///
    /// `interrupt` is raced against the whole session; when it completes
    /// first the session is abandoned mid-flight and reported as
    /// [`AbortReason::Interrupted`].
    pub async fn run<C, R, I>(&mut self, child: &mut C, rng: &mut R, interrupt: I) -> SessionReport
    where
        C: ChildHandle,
        R: Rng,
        I: Future<Output = ()>,
    {
        let span = tracing::info_span!("session", session_id = %uuid::Uuid::new_v4());
        self.execute(child, rng, interrupt).instrument(span).await
    }

    async fn execute<C, R, I>(&mut self, child: &mut C, rng: &mut R, interrupt: I) -> SessionReport
    where
        C: ChildHandle,
        R: Rng,
        I: Future<Output = ()>,
    {
        let mut progress = Progress::default();

        let outcome = tokio::select! {
            result = self.drive(child, rng, &mut progress) => result,
            () = interrupt => Err(AbortReason::Interrupted),
        };
        if matches!(outcome, Err(AbortReason::Interrupted)) {
            tracing::warn!(state = ?self.state, "interrupt received, aborting session");
        }

        child.terminate().await;

        let abort = match outcome {
            Ok(()) => {
                self.transition(SessionState::Done);
                None
            }
            Err(reason) => {
                tracing::error!(error = %reason, "session aborted");
                self.transition(SessionState::Aborted);
                Some(reason)
            }
        };

        let report = SessionReport {
            state: self.state,
            abort,
            tables: progress.tables,
            planned: self.iterations,
            seed: self.seed,
            records: progress.records,
        };
        self.reporter.session_finished(&report);
        report
    }

    async fn drive<C, R>(
        &mut self,
        child: &mut C,
        rng: &mut R,
        progress: &mut Progress,
    ) -> Result<(), AbortReason>
    where
        C: ChildHandle,
        R: Rng,
    {
        let (writer, reader) = child
            .pipes()
            .ok_or(AbortReason::InitializationFailed(ProtocolError::Closed.into()))?;
        let mut client = ProtocolClient::new(writer, reader).with_timeout(self.timeout);

        self.transition(SessionState::Initializing);
        self.reporter.stage("\n[1] Initializing...");
        initialize(&mut client)
            .await
            .map_err(AbortReason::InitializationFailed)?;
        self.reporter.stage("Initialized successfully.");

        self.transition(SessionState::FetchingSchema);
        client
            .notify("initialized", None)
            .await
            .map_err(|e| AbortReason::SchemaFetchFailed(e.into()))?;

        if self.list_tools {
            list_tools(&mut client)
                .await
                .map_err(AbortReason::SchemaFetchFailed)?;
        }

        self.reporter.stage("\n[2] Fetching Schema...");
        let schema = SchemaCache::fetch(&mut client)
            .await
            .map_err(AbortReason::SchemaFetchFailed)?;
        progress.tables = schema.len();
        if schema.is_empty() {
            self.reporter
                .stage("No schemas returned (or empty database). Using generic queries only.");
        } else {
            self.reporter
                .stage(&format!("Found {} tables.", schema.len()));
        }

        self.reporter.stage(&format!(
            "\n[3] Running {} random queries...",
            self.iterations
        ));
        for index in 0..self.iterations {
            self.transition(SessionState::Iterating(index));
            let iteration = index + 1;

            let query = self.synthesizer.synthesize(schema.tables(), rng);
            self.reporter.query_started(iteration, &query.sql);

            let started = Instant::now();
            let reply = client
                .call_tool(
                    QUERY_TOOL,
                    json!({ "query": query.sql }),
                    QUERY_ID_BASE + index,
                )
                .await
                .map_err(|e| AbortReason::IterationFailed {
                    iteration,
                    error: e.into(),
                })?;
            let elapsed = started.elapsed();

            let outcome = match reply {
                Reply::Success(payload) => QueryOutcome::Success {
                    summary: payload.summary().to_string(),
                },
                Reply::Failure { code, message } => {
                    tracing::debug!(iteration, code, error = %message, "server rejected query");
                    QueryOutcome::Error { message }
                }
            };

            let record = QueryRecord {
                iteration,
                shape: query.shape,
                query: query.sql,
                elapsed,
                outcome,
            };
            self.reporter.query_finished(&record);
            progress.records.push(record);
        }

        Ok(())
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(from = ?self.state, to = ?next, "session state change");
        self.state = next;
    }
}

async fn initialize<W, R>(client: &mut ProtocolClient<W, R>) -> Result<(), FuzzError>
where
    W: AsyncWrite + Unpin,
    R: AsyncBufRead + Unpin,
{
    let params = json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": CLIENT_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        },
    });
    let payload = client
        .call("initialize", params, INITIALIZE_ID)
        .await?
        .into_payload()?;

    tracing::info!(
        server = ?payload.extra("serverInfo"),
        protocol_version = ?payload.extra("protocolVersion"),
        "handshake complete"
    );
    Ok(())
}

/// Log what the server advertises. Only protocol failures are fatal here.
async fn list_tools<W, R>(client: &mut ProtocolClient<W, R>) -> Result<(), FuzzError>
where
    W: AsyncWrite + Unpin,
    R: AsyncBufRead + Unpin,
{
    let payload = match client.call("tools/list", json!({}), TOOLS_LIST_ID).await? {
        Reply::Success(payload) => payload,
        Reply::Failure { code, message } => {
            tracing::warn!(code, error = %message, "tools/list rejected");
            return Ok(());
        }
    };

    let tools: Vec<ToolDescriptor> = payload
        .extra("tools")
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "unreadable tools/list result");
            None
        })
        .unwrap_or_default();

    let names: Vec<&str> = tools.iter().map(|tool| tool.name.as_str()).collect();
    tracing::info!(tools = ?names, "server tools");
    for required in [SCHEMA_TOOL, QUERY_TOOL] {
        if !names.contains(&required) {
            tracing::warn!(tool = required, "required tool not advertised");
        }
    }
    Ok(())
}

/// Spawn the configured server and run one session against it.
///
/// Spawn failures are returned before any message is exchanged.
pub async fn run_session<R, I>(
    config: &FuzzConfig,
    reporter: impl Reporter + 'static,
    rng: &mut R,
    interrupt: I,
) -> Result<SessionReport, FuzzError>
where
    R: Rng,
    I: Future<Output = ()>,
{
    let mut runner = FuzzRunner::new(config).with_reporter(reporter);
    runner
        .reporter
        .stage(&format!("Starting server: {}", config.display_command()));

    let mut child = ServerProcess::spawn(&config.server, config.server_args())?
        .with_grace_period(config.grace_period);
    Ok(runner.run(&mut child, rng, interrupt).await)
}

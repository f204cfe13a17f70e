//! Command-line surface and the session configuration derived from it.

use std::time::Duration;

use clap::Parser;

use crate::process::DEFAULT_GRACE_PERIOD;

pub const DEFAULT_SERVER: &str = "mcp-server-mysql";

const MASKED_PASSWORD: &str = "****";

/// Drive a MySQL MCP server over stdio with randomized queries
#[derive(Parser, Debug, Clone)]
#[command(name = "mcp-sql-fuzz", version, about)]
pub struct Args {
    /// Database host handed to the server
    #[arg(long, default_value = "localhost")]
    pub host: String,

    #[arg(long, default_value_t = 3306)]
    pub port: u16,

    #[arg(long)]
    pub username: String,

    #[arg(long, env = "MYSQL_PASSWORD", default_value = "", hide_env_values = true)]
    pub password: String,

    #[arg(long)]
    pub database: String,

    /// Number of random queries to run
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    pub count: u64,

    /// Server executable
    #[arg(long, default_value = DEFAULT_SERVER)]
    pub server: String,

    /// Extra argument appended to the server command line (repeatable)
    #[arg(long = "server-arg", allow_hyphen_values = true)]
    pub server_args: Vec<String>,

    /// Seed for query generation; random when omitted
    #[arg(long)]
    pub seed: Option<u64>,

    /// Per-call response timeout in milliseconds; unbounded when omitted
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Time the server gets to exit after its stdin closes
    #[arg(long, default_value_t = 2000)]
    pub grace_ms: u64,

    /// Log the server's advertised tools before fetching the schema
    #[arg(long)]
    pub list_tools: bool,

    /// Emit the per-query transcript as log events instead of stdout lines
    #[arg(long)]
    pub log_transcript: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            username: String::new(),
            password: String::new(),
            database: String::new(),
        }
    }
}

/// Everything a session needs. Immutable once the session starts.
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzConfig {
    pub connection: ConnectionParams,
    pub iterations: u64,
    pub server: String,
    pub extra_args: Vec<String>,
    pub seed: Option<u64>,
    pub timeout: Option<Duration>,
    pub grace_period: Duration,
    pub list_tools: bool,
    pub log_transcript: bool,
}

impl Default for FuzzConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionParams::default(),
            iterations: 5,
            server: DEFAULT_SERVER.to_string(),
            extra_args: Vec::new(),
            seed: None,
            timeout: None,
            grace_period: DEFAULT_GRACE_PERIOD,
            list_tools: false,
            log_transcript: false,
        }
    }
}

impl From<Args> for FuzzConfig {
    fn from(args: Args) -> Self {
        Self {
            connection: ConnectionParams {
                host: args.host,
                port: args.port,
                username: args.username,
                password: args.password,
                database: args.database,
            },
            iterations: args.count,
            server: args.server,
            extra_args: args.server_args,
            seed: args.seed,
            timeout: args.timeout_ms.map(Duration::from_millis),
            grace_period: Duration::from_millis(args.grace_ms),
            list_tools: args.list_tools,
            log_transcript: args.log_transcript,
        }
    }
}

impl FuzzConfig {
    /// Arguments for the server executable: connection flags first, then
    /// the extra arguments in order.
    pub fn server_args(&self) -> Vec<String> {
        let c = &self.connection;
        let mut args = vec![
            "--host".to_string(),
            c.host.clone(),
            "--port".to_string(),
            c.port.to_string(),
            "--username".to_string(),
            c.username.clone(),
            "--database".to_string(),
            c.database.clone(),
            "--password".to_string(),
            c.password.clone(),
        ];
        args.extend(self.extra_args.iter().cloned());
        args
    }

    /// The server command line with the password masked, for display.
    pub fn display_command(&self) -> String {
        let mut args = self.server_args();
        if !self.connection.password.is_empty()
            && let Some(index) = args.iter().position(|arg| arg == "--password")
            && let Some(value) = args.get_mut(index + 1)
        {
            *value = MASKED_PASSWORD.to_string();
        }
        std::iter::once(self.server.as_str())
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

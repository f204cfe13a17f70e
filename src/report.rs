//! Operator-facing progress output.
//!
//! Diagnostics go through `tracing`; the per-query transcript goes through
//! a [`Reporter`] so tests can silence it and the binary can print it.

use crate::runner::{QueryOutcome, QueryRecord, SessionReport};

pub trait Reporter: Send + Sync {
    /// A session milestone ("Initializing...", "Found 3 tables.")
    fn stage(&self, message: &str);

    /// About to submit query number `iteration` (1-based)
    fn query_started(&self, iteration: u64, sql: &str);

    fn query_finished(&self, record: &QueryRecord);

    fn session_finished(&self, report: &SessionReport);
}

impl<R: Reporter + ?Sized> Reporter for Box<R> {
    fn stage(&self, message: &str) {
        (**self).stage(message)
    }

    fn query_started(&self, iteration: u64, sql: &str) {
        (**self).query_started(iteration, sql)
    }

    fn query_finished(&self, record: &QueryRecord) {
        (**self).query_finished(record)
    }

    fn session_finished(&self, report: &SessionReport) {
        (**self).session_finished(report)
    }
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl Reporter for NoopReporter {
    fn stage(&self, _message: &str) {}
    fn query_started(&self, _iteration: u64, _sql: &str) {}
    fn query_finished(&self, _record: &QueryRecord) {}
    fn session_finished(&self, _report: &SessionReport) {}
}

/// Plain transcript on stdout
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutReporter;

impl Reporter for StdoutReporter {
    fn stage(&self, message: &str) {
        println!("{message}");
    }

    fn query_started(&self, iteration: u64, sql: &str) {
        println!("\nQuery {iteration}: {sql}");
    }

    fn query_finished(&self, record: &QueryRecord) {
        println!("{}", describe(record));
    }

    fn session_finished(&self, report: &SessionReport) {
        println!("\n{}", summarize(report));
        if let Some(seed) = report.seed {
            println!("Seed: {seed}");
        }
    }
}

/// Routes the transcript into `tracing` events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn stage(&self, message: &str) {
        tracing::info!("{}", message);
    }

    fn query_started(&self, iteration: u64, sql: &str) {
        tracing::info!(iteration, sql, "submitting query");
    }

    fn query_finished(&self, record: &QueryRecord) {
        let elapsed_ms = record.elapsed.as_secs_f64() * 1000.0;
        match &record.outcome {
            QueryOutcome::Success { summary } => tracing::info!(
                iteration = record.iteration,
                shape = %record.shape,
                elapsed_ms,
                summary = %summary,
                "query succeeded"
            ),
            QueryOutcome::Error { message } => tracing::warn!(
                iteration = record.iteration,
                shape = %record.shape,
                elapsed_ms,
                error = %message,
                "query failed"
            ),
        }
    }

    fn session_finished(&self, report: &SessionReport) {
        tracing::info!(seed = ?report.seed, "{}", summarize(report));
    }
}

pub fn describe(record: &QueryRecord) -> String {
    match &record.outcome {
        QueryOutcome::Success { summary } => {
            format!("Success ({:.3}s): {summary}", record.elapsed.as_secs_f64())
        }
        QueryOutcome::Error { message } => {
            format!("Error ({:.3}s): {message}", record.elapsed.as_secs_f64())
        }
    }
}

pub fn summarize(report: &SessionReport) -> String {
    let tally = format!(
        "{} of {} queries completed: {} ok, {} error",
        report.records.len(),
        report.planned,
        report.successes(),
        report.failures()
    );
    match &report.abort {
        None => format!("Done. {tally}"),
        Some(reason) => format!("Aborted: {reason}. {tally}"),
    }
}

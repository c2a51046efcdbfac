use metrics::{counter, gauge, histogram};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::models::{FallbackReason, GenerationResult};

/// Point-in-time totals kept in process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Requests that reached the pipeline
    pub requests: u64,
    /// Requests answered with SQL
    pub sql: u64,
    /// Fallbacks with no matching context
    pub no_context: u64,
    /// Fallbacks where the model refused or failed
    pub model_refused: u64,
    /// Fallbacks where the response was unusable
    pub unparsable: u64,
    /// Questions rejected by validation
    pub validation_errors: u64,
    /// Completion calls issued
    pub completions: u64,
}

/// Metrics collection and management
///
/// Every recording goes to the `metrics` facade (a no-op until the binary
/// installs a recorder) and to the in-process counters behind [`snapshot`].
///
/// [`snapshot`]: MetricsCollector::snapshot
#[derive(Debug)]
pub struct MetricsCollector {
    // Request metrics
    pub requests_total: &'static str,
    pub fallbacks_total: &'static str,
    pub validation_errors_total: &'static str,
    pub request_duration: &'static str,

    // Pipeline stage metrics
    pub ranked_items: &'static str,
    pub prompt_chars: &'static str,
    pub completion_duration: &'static str,
    pub catalog_tables: &'static str,

    requests: AtomicU64,
    sql: AtomicU64,
    no_context: AtomicU64,
    model_refused: AtomicU64,
    unparsable: AtomicU64,
    validation_errors: AtomicU64,
    completions: AtomicU64,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            requests_total: "nl2sql_requests_total",
            fallbacks_total: "nl2sql_fallbacks_total",
            validation_errors_total: "nl2sql_validation_errors_total",
            request_duration: "nl2sql_request_duration_seconds",

            ranked_items: "nl2sql_ranked_items",
            prompt_chars: "nl2sql_prompt_chars",
            completion_duration: "nl2sql_completion_duration_seconds",
            catalog_tables: "nl2sql_catalog_tables",

            requests: AtomicU64::new(0),
            sql: AtomicU64::new(0),
            no_context: AtomicU64::new(0),
            model_refused: AtomicU64::new(0),
            unparsable: AtomicU64::new(0),
            validation_errors: AtomicU64::new(0),
            completions: AtomicU64::new(0),
        }
    }
}

impl MetricsCollector {
    /// Record the outcome of one request
    pub fn record_request(&self, result: &GenerationResult, duration: Duration) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        histogram!(self.request_duration).record(duration.as_secs_f64());

        match result {
            GenerationResult::Sql(_) => {
                self.sql.fetch_add(1, Ordering::Relaxed);
                counter!(self.requests_total, "outcome" => "sql").increment(1);
            }
            GenerationResult::Fallback(reason) => {
                let total = match reason {
                    FallbackReason::NoContext => &self.no_context,
                    FallbackReason::ModelRefused(_) => &self.model_refused,
                    FallbackReason::UnparsableResponse(_) => &self.unparsable,
                };
                total.fetch_add(1, Ordering::Relaxed);
                counter!(self.requests_total, "outcome" => "fallback").increment(1);
                counter!(self.fallbacks_total, "reason" => reason.code()).increment(1);
            }
        }
    }

    /// Record a question rejected before ranking
    pub fn record_validation_error(&self) {
        self.validation_errors.fetch_add(1, Ordering::Relaxed);
        counter!(self.validation_errors_total).increment(1);
    }

    /// Record how many context items the ranker selected
    #[allow(clippy::cast_precision_loss)]
    pub fn record_ranking(&self, selected: usize, strategy: &'static str) {
        histogram!(self.ranked_items, "strategy" => strategy).record(selected as f64);
    }

    /// Record the length of an assembled prompt
    #[allow(clippy::cast_precision_loss)]
    pub fn record_prompt(&self, chars: usize, fallback: bool) {
        let kind = if fallback { "fallback" } else { "context" };
        histogram!(self.prompt_chars, "kind" => kind).record(chars as f64);
    }

    /// Record one completion call
    pub fn record_completion(&self, duration: Duration, provider: &'static str) {
        self.completions.fetch_add(1, Ordering::Relaxed);
        histogram!(self.completion_duration, "provider" => provider).record(duration.as_secs_f64());
    }

    /// Update the catalog size gauge
    #[allow(clippy::cast_precision_loss)]
    pub fn set_catalog_size(&self, tables: usize) {
        gauge!(self.catalog_tables).set(tables as f64);
    }

    /// Current in-process totals
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            sql: self.sql.load(Ordering::Relaxed),
            no_context: self.no_context.load(Ordering::Relaxed),
            model_refused: self.model_refused.load(Ordering::Relaxed),
            unparsable: self.unparsable.load(Ordering::Relaxed),
            validation_errors: self.validation_errors.load(Ordering::Relaxed),
            completions: self.completions.load(Ordering::Relaxed),
        }
    }
}

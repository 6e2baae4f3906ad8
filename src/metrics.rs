// SPDX-License-Identifier: Apache-2.0

//! Lightweight in-memory query metrics, served on `GET /metrics`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use serde::Serialize;

use crate::engine::error::EngineError;

/// Which execution path served a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPath {
    Compiled,
    Raw,
}

#[derive(Default)]
struct QueryMetrics {
    total: AtomicU64,
    raw: AtomicU64,
    compile_failures: AtomicU64,
    execution_failures: AtomicU64,
    other_failures: AtomicU64,
    cancelled: AtomicU64,
    duration_total_ms: AtomicU64,
    duration_max_ms: AtomicU64,
}

static QUERY_METRICS: OnceLock<QueryMetrics> = OnceLock::new();

fn metrics() -> &'static QueryMetrics {
    QUERY_METRICS.get_or_init(QueryMetrics::default)
}

pub fn record_query(path: QueryPath, duration_ms: u64, error: Option<&EngineError>) {
    let metrics = metrics();
    metrics.total.fetch_add(1, Ordering::Relaxed);
    if path == QueryPath::Raw {
        metrics.raw.fetch_add(1, Ordering::Relaxed);
    }

    match error {
        None => {}
        Some(EngineError::CompileFailure { .. }) => {
            metrics.compile_failures.fetch_add(1, Ordering::Relaxed);
        }
        Some(EngineError::ExecutionFailure { .. }) => {
            metrics.execution_failures.fetch_add(1, Ordering::Relaxed);
        }
        Some(EngineError::Cancelled) => {
            metrics.cancelled.fetch_add(1, Ordering::Relaxed);
        }
        Some(_) => {
            metrics.other_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    metrics
        .duration_total_ms
        .fetch_add(duration_ms, Ordering::Relaxed);

    let mut current = metrics.duration_max_ms.load(Ordering::Relaxed);
    while duration_ms > current {
        match metrics.duration_max_ms.compare_exchange(
            current,
            duration_ms,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(next) => current = next,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryMetricsSnapshot {
    pub total: u64,
    pub raw: u64,
    pub compile_failures: u64,
    pub execution_failures: u64,
    pub other_failures: u64,
    pub cancelled: u64,
    pub avg_ms: Option<f64>,
    pub max_ms: Option<u64>,
}

pub fn snapshot() -> QueryMetricsSnapshot {
    let metrics = metrics();
    let total = metrics.total.load(Ordering::Relaxed);
    let duration_total = metrics.duration_total_ms.load(Ordering::Relaxed);
    let max_ms = metrics.duration_max_ms.load(Ordering::Relaxed);

    let avg_ms = if total > 0 {
        Some(duration_total as f64 / total as f64)
    } else {
        None
    };

    QueryMetricsSnapshot {
        total,
        raw: metrics.raw.load(Ordering::Relaxed),
        compile_failures: metrics.compile_failures.load(Ordering::Relaxed),
        execution_failures: metrics.execution_failures.load(Ordering::Relaxed),
        other_failures: metrics.other_failures.load(Ordering::Relaxed),
        cancelled: metrics.cancelled.load(Ordering::Relaxed),
        avg_ms,
        max_ms: if max_ms > 0 { Some(max_ms) } else { None },
    }
}

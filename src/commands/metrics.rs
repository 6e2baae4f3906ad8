// SPDX-License-Identifier: Apache-2.0

//! Metrics command.

use crate::metrics;

/// Returns the current query metrics snapshot.
pub fn get_metrics() -> metrics::QueryMetricsSnapshot {
    metrics::snapshot()
}

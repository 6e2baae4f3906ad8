// SPDX-License-Identifier: Apache-2.0

// Transport-agnostic command handlers

pub mod connection;
pub mod metrics;
pub mod models;
pub mod query;

//! End-to-end tests for the upload preflight.
//!
//! Each test drives a [`PreflightOrchestrator`](storage_preflight::PreflightOrchestrator)
//! against a fresh in-memory ledger through the public API only.

mod harness;
mod preflight_flow;

pub use harness::{RecordingSink, TestHarness};

//! # Kumir Translator Test Framework
//!
//! A regression test harness for the Kumir-to-C translator. It walks a
//! directory tree of test cases, runs the translator on every source that
//! has an expectation, compares the normalized result with the expectation
//! and produces an aggregated, filterable report.
//!
//! ## Architecture
//!
//! The framework is organized into several modules:
//! - `config`: Command-line configuration, path validation, reporting filters
//! - `comparison`: Output normalization and outcome classification
//! - `execution`: Test states, translator invocation and per-case execution
//! - `discovery`: Section/case discovery and case-folder validation
//! - `aggregation`: State counts and the filtered detail view
//! - `reporting`: Report rendering to the log file, console and JSON
//! - `harness`: Orchestration of a complete run

pub mod aggregation;
pub mod comparison;
pub mod config;
pub mod discovery;
pub mod execution;
pub mod harness;
pub mod reporting;

// Re-exports for easier access
pub use aggregation::{aggregate, AggregatedResults, StateCounts};
pub use comparison::{classify, normalize, OutputClassifier};
pub use config::{CaseLayout, ComparisonMode, ConfigIssue, ReportingConfig, TestConfig};
pub use discovery::{TestCase, TestDiscovery, TestSection};
pub use execution::{CaseExecutor, Invocation, InvocationFailure, ProcessTranslator, TestState, Translator};
pub use harness::{HarnessBuilder, KumirHarness, RunOutcome};
pub use reporting::{ReportSink, TestReport};

/// Current version of the test framework
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Test framework errors
#[derive(thiserror::Error, Debug)]
pub enum TestError {
    #[error("Test discovery failed: {0}")]
    Discovery(String),

    #[error("Test execution failed: {0}")]
    Execution(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Report error: {0}")]
    Report(String),

    #[error("Test case '{name}' already has a final state ({state})")]
    StateAlreadyAssigned { name: String, state: TestState },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Template error: {0}")]
    Template(#[from] indicatif::style::TemplateError),
}

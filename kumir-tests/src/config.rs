//! Configuration and settings for the test framework

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::execution::TestState;

/// Process exit statuses used by the `kumir-tests` binary
pub mod exit {
    /// Every case finished without a failing state
    pub const SUCCESS: i32 = 0;
    /// At least one case failed, hit a compiler error, or could not be invoked
    pub const TESTS_FAILED: i32 = 1;
    /// Bad flags, or `--help`
    pub const USAGE: i32 = 2;
    /// The test root was not given, does not exist, or is not a directory
    pub const MISSING_TEST_ROOT: i32 = 3;
    /// Translator or output path failed validation
    pub const INVALID_PATH: i32 = 4;
    /// Discovery or report writing failed
    pub const INTERNAL: i32 = 5;
}

/// How the normalized result is compared with the normalized expectation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonMode {
    /// Line counts must agree and every line must match
    Strict,
    /// Only the first `actual.len()` expected lines are compared
    Prefix,
}

/// Fixed conventions for reading a case folder and its translator output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseLayout {
    /// Extension of the Kumir source file (without the dot)
    pub source_extension: String,
    /// Extension of the expectation file (without the dot)
    pub expectation_extension: String,
    /// Appended to the source path with its extension stripped
    pub result_suffix: String,
    /// Substring that marks a translator-side error in the result file
    pub error_marker: String,
    /// Leading result-file lines (banner and source reference) to drop
    pub header_lines: usize,
    /// Comparison mode for the classifier
    pub comparison: ComparisonMode,
}

impl Default for CaseLayout {
    fn default() -> Self {
        Self {
            source_extension: "kum".to_string(),
            expectation_extension: "exp".to_string(),
            result_suffix: ".kumir.c".to_string(),
            error_marker: "ERROR!".to_string(),
            header_lines: 2,
            comparison: ComparisonMode::Strict,
        }
    }
}

impl CaseLayout {
    /// Derive the translator result path for a source file
    pub fn result_path_for(&self, source_path: &Path) -> PathBuf {
        let mut result = source_path.with_extension("").into_os_string();
        result.push(&self.result_suffix);
        PathBuf::from(result)
    }

    /// Check whether a file path carries the source extension
    pub fn is_source(&self, path: &Path) -> bool {
        has_extension(path, &self.source_extension)
    }

    /// Check whether a file path carries the expectation extension
    pub fn is_expectation(&self, path: &Path) -> bool {
        has_extension(path, &self.expectation_extension)
    }

    /// Whether a result file would land on a case input.
    ///
    /// Stale results are deleted before every run, so such a layout would
    /// delete the source or the expectation.
    pub fn result_overwrites_inputs(&self) -> bool {
        let source = PathBuf::from(format!("case.{}", self.source_extension));
        let result = self.result_path_for(&source);
        self.is_source(&result) || self.is_expectation(&result)
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().and_then(|ext| ext.to_str()).map(|ext| ext == extension).unwrap_or(false)
}

/// Immutable visibility filter applied to the detail view of a report.
///
/// Excluded states are hidden from the per-section listing only; the summary
/// counts are always computed over every case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportingConfig {
    excluded: BTreeSet<TestState>,
}

impl ReportingConfig {
    /// A filter that hides nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// A filter hiding the given states
    pub fn excluding(states: impl IntoIterator<Item = TestState>) -> Self {
        Self { excluded: states.into_iter().collect() }
    }

    /// Brief mode: every terminal state is hidden, only the summary remains
    pub fn brief() -> Self {
        Self::excluding(TestState::TERMINAL)
    }

    /// Whether cases in `state` are hidden from the detail view
    pub fn is_excluded(&self, state: TestState) -> bool {
        self.excluded.contains(&state)
    }

    /// Whether every terminal state is hidden
    pub fn is_brief(&self) -> bool {
        TestState::TERMINAL.iter().all(|state| self.excluded.contains(state))
    }

    /// Excluded states in a stable order
    pub fn excluded(&self) -> impl Iterator<Item = TestState> + '_ {
        self.excluded.iter().copied()
    }
}

/// Pre-flight configuration problems; each is fatal before any test runs
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigIssue {
    #[error("Test root was not specified (use --tests <DIR>)")]
    TestRootNotSpecified,

    #[error("Test root not found or not a directory: {0}")]
    TestRootNotFound(String),

    #[error("Translator not found or not a file: {0}")]
    TranslatorNotFound(String),

    #[error("Translator is not an executable binary: {0}")]
    TranslatorNotExecutable(String),

    #[error("Output path is a directory: {0}")]
    OutputIsDirectory(String),

    #[error("Output directory does not exist: {0}")]
    OutputParentMissing(String),

    #[error("{0}")]
    InvalidValue(String),
}

impl ConfigIssue {
    /// Exit status the binary uses for this problem
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::TestRootNotSpecified | Self::TestRootNotFound(_) => exit::MISSING_TEST_ROOT,
            Self::TranslatorNotFound(_)
            | Self::TranslatorNotExecutable(_)
            | Self::OutputIsDirectory(_)
            | Self::OutputParentMissing(_) => exit::INVALID_PATH,
            Self::InvalidValue(_) => exit::USAGE,
        }
    }
}

/// Configuration for the test framework
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "kumir-tests")]
#[command(version)]
#[command(about = "Regression tests for the Kumir-to-C translator")]
pub struct TestConfig {
    /// Path to the translator executable
    #[arg(short, long)]
    pub translator: PathBuf,

    /// Report file; results are appended, the file is created if absent
    #[arg(short, long, default_value = "kumir-tests.log")]
    pub output: PathBuf,

    /// Test root: <tests>/<section>/<case>/ folders
    #[arg(short = 'r', long)]
    pub tests: Option<PathBuf>,

    /// Duplicate the report to the console
    #[arg(short, long)]
    pub console: bool,

    /// Hide passed cases from the detail view
    #[arg(long)]
    pub skip_completed: bool,

    /// Hide cases whose output differs from the expectation
    #[arg(long)]
    pub skip_failed: bool,

    /// Hide cases without an expectation file
    #[arg(long)]
    pub skip_missing_expectation: bool,

    /// Hide cases where the translator reported an error
    #[arg(long)]
    pub skip_compiler_error: bool,

    /// Hide cases where the translator could not be run
    #[arg(long)]
    pub skip_invocation_error: bool,

    /// Hide cases where the translator timed out
    #[arg(long)]
    pub skip_timeout: bool,

    /// Print only the summary header
    #[arg(short, long)]
    pub brief: bool,

    /// Number of cases to run at once (1 = sequential)
    #[arg(short, long, default_value_t = 1)]
    pub jobs: usize,

    /// Timeout for a single translator run in seconds
    #[arg(long, default_value_t = 60)]
    pub timeout: u64,

    /// Source file extension
    #[arg(long, default_value = "kum")]
    pub source_ext: String,

    /// Expectation file extension
    #[arg(long, default_value = "exp")]
    pub expectation_ext: String,

    /// Suffix appended to the source stem to name the result file
    #[arg(long, default_value = ".kumir.c")]
    pub result_suffix: String,

    /// Marker the translator writes into its output on a compile error
    #[arg(long, default_value = "ERROR!")]
    pub error_marker: String,

    /// Number of leading result lines that are not compared
    #[arg(long, default_value_t = 2)]
    pub header_lines: usize,

    /// Accept a result shorter than the expectation if it matches as a prefix
    #[arg(long)]
    pub allow_truncated_output: bool,

    /// Also write the run summary as JSON to this path
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl TestConfig {
    /// Create a new configuration with sensible defaults
    pub fn new(translator: PathBuf, tests: PathBuf) -> Self {
        let layout = CaseLayout::default();
        Self {
            translator,
            output: PathBuf::from("kumir-tests.log"),
            tests: Some(tests),
            console: false,
            skip_completed: false,
            skip_failed: false,
            skip_missing_expectation: false,
            skip_compiler_error: false,
            skip_invocation_error: false,
            skip_timeout: false,
            brief: false,
            jobs: 1,
            timeout: 60,
            source_ext: layout.source_extension,
            expectation_ext: layout.expectation_extension,
            result_suffix: layout.result_suffix,
            error_marker: layout.error_marker,
            header_lines: layout.header_lines,
            allow_truncated_output: false,
            json: None,
            verbose: false,
        }
    }

    /// Build the visibility filter from the skip toggles
    pub fn reporting(&self) -> ReportingConfig {
        if self.brief {
            return ReportingConfig::brief();
        }

        let toggles = [
            (self.skip_completed, TestState::Completed),
            (self.skip_failed, TestState::Failed),
            (self.skip_missing_expectation, TestState::MissingExpectation),
            (self.skip_compiler_error, TestState::CompilerError),
            (self.skip_invocation_error, TestState::InvocationError),
            (self.skip_timeout, TestState::Timeout),
        ];

        ReportingConfig::excluding(
            toggles.into_iter().filter(|(enabled, _)| *enabled).map(|(_, state)| state),
        )
    }

    /// Build the case-folder conventions
    pub fn layout(&self) -> CaseLayout {
        CaseLayout {
            source_extension: self.source_ext.trim_start_matches('.').to_string(),
            expectation_extension: self.expectation_ext.trim_start_matches('.').to_string(),
            result_suffix: self.result_suffix.clone(),
            error_marker: self.error_marker.clone(),
            header_lines: self.header_lines,
            comparison: if self.allow_truncated_output {
                ComparisonMode::Prefix
            } else {
                ComparisonMode::Strict
            },
        }
    }

    /// The test root, once `validate` has accepted it
    pub fn test_root(&self) -> Result<&Path, ConfigIssue> {
        self.tests.as_deref().ok_or(ConfigIssue::TestRootNotSpecified)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigIssue> {
        let root = self.test_root()?;
        if !root.is_dir() {
            return Err(ConfigIssue::TestRootNotFound(root.display().to_string()));
        }

        if !self.translator.is_file() {
            return Err(ConfigIssue::TranslatorNotFound(self.translator.display().to_string()));
        }

        if !is_executable(&self.translator) {
            return Err(ConfigIssue::TranslatorNotExecutable(
                self.translator.display().to_string(),
            ));
        }

        if self.output.is_dir() {
            return Err(ConfigIssue::OutputIsDirectory(self.output.display().to_string()));
        }

        if let Some(parent) = self.output.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(ConfigIssue::OutputParentMissing(parent.display().to_string()));
            }
        }

        if self.timeout == 0 {
            return Err(ConfigIssue::InvalidValue("Timeout must be greater than 0".to_string()));
        }

        if self.jobs == 0 {
            return Err(ConfigIssue::InvalidValue("Jobs must be greater than 0".to_string()));
        }

        let layout = self.layout();
        if layout.source_extension.is_empty() || layout.expectation_extension.is_empty() {
            return Err(ConfigIssue::InvalidValue("File extensions must not be empty".to_string()));
        }

        if layout.source_extension == layout.expectation_extension {
            return Err(ConfigIssue::InvalidValue(
                "Source and expectation extensions must differ".to_string(),
            ));
        }

        if layout.result_overwrites_inputs() {
            return Err(ConfigIssue::InvalidValue(format!(
                "Result suffix '{}' would overwrite .{} or .{} files",
                layout.result_suffix, layout.source_extension, layout.expectation_extension
            )));
        }

        if layout.error_marker.chars().any(char::is_whitespace) {
            // Normalization strips whitespace, so such a marker could never match
            return Err(ConfigIssue::InvalidValue(
                "Error marker must not contain whitespace".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    fs::metadata(path).map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0).unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    let has_exe_extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("exe"))
        .unwrap_or(false);

    fs::metadata(path).map(|meta| meta.is_file()).unwrap_or(false) && has_exe_extension
}

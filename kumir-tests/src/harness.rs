//! Main test harness orchestrating the test framework

use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::aggregation::aggregate;
use crate::config::{exit, CaseLayout, ComparisonMode, ReportingConfig, TestConfig};
use crate::discovery::{TestDiscovery, TestSection};
use crate::execution::{CaseExecutor, ProcessTranslator, TestState, Translator};
use crate::reporting::{ReportSink, TestReport};
use crate::TestError;

/// Everything a finished run produced
#[derive(Debug)]
pub struct RunOutcome {
    /// All sections with every case, unfiltered
    pub sections: Vec<TestSection>,
    /// The report as written to the sinks
    pub report: TestReport,
}

impl RunOutcome {
    /// Check if no case ended in a failing state
    pub fn all_passed(&self) -> bool {
        !self.report.counts.has_failures()
    }

    /// Exit status for the binary
    pub fn exit_code(&self) -> i32 {
        if self.all_passed() {
            exit::SUCCESS
        } else {
            exit::TESTS_FAILED
        }
    }
}

/// Main test harness for running translator tests
pub struct KumirHarness<T: Translator = ProcessTranslator> {
    config: TestConfig,
    reporting: ReportingConfig,
    discovery: TestDiscovery,
    executor: CaseExecutor<T>,
}

impl KumirHarness<ProcessTranslator> {
    /// Create a harness that runs the configured translator binary
    pub fn new(config: TestConfig) -> Result<Self, TestError> {
        config.validate().map_err(|issue| TestError::Config(issue.to_string()))?;

        let translator = ProcessTranslator::new(config.layout(), Duration::from_secs(config.timeout))?;
        Ok(Self::assemble(config, translator))
    }
}

impl<T: Translator> KumirHarness<T> {
    /// Create a harness around any translator implementation.
    ///
    /// The translator path is passed through unchecked.
    pub fn with_translator(config: TestConfig, translator: T) -> Result<Self, TestError> {
        let root = config.test_root().map_err(|issue| TestError::Config(issue.to_string()))?;
        if !root.is_dir() {
            return Err(TestError::Config(format!(
                "Test root not found or not a directory: {}",
                root.display()
            )));
        }

        Ok(Self::assemble(config, translator))
    }

    fn assemble(config: TestConfig, translator: T) -> Self {
        let layout = config.layout();
        let reporting = config.reporting();
        let discovery = TestDiscovery::new(layout.clone());
        let executor = CaseExecutor::new(translator, config.translator.clone(), layout);

        Self { config, reporting, discovery, executor }
    }

    /// Get the test configuration
    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    /// Get the case executor
    pub fn executor(&self) -> &CaseExecutor<T> {
        &self.executor
    }

    /// Discover, execute, aggregate and report
    pub fn run(&self) -> Result<RunOutcome, TestError> {
        let start_time = Instant::now();
        let root = self.config.test_root().map_err(|issue| TestError::Config(issue.to_string()))?;

        let progress = self.progress_bar()?;
        let sections = self.discovery.discover(root, &self.executor, self.config.jobs, progress.as_ref())?;
        if let Some(pb) = progress {
            pb.finish_and_clear();
        }

        let hidden = self.reporting.excluded().collect();
        let aggregated = aggregate(&sections, &self.reporting);
        let report = TestReport::new(aggregated, hidden, self.reporting.is_brief(), start_time.elapsed());

        ReportSink::new(self.config.output.clone(), self.config.console).emit(&report)?;
        if let Some(json_path) = &self.config.json {
            report.save_json(json_path)?;
        }

        info!(
            "Finished {} cases in {:.2?}: {} completed, report appended to {}",
            report.counts.total(),
            report.duration,
            report.counts.get(TestState::Completed),
            self.config.output.display()
        );

        Ok(RunOutcome { sections, report })
    }

    /// Progress bar for console runs; its length is set once cases are known
    fn progress_bar(&self) -> Result<Option<ProgressBar>, TestError> {
        if !self.config.console {
            return Ok(None);
        }

        let pb = ProgressBar::new(0);
        pb.set_style(ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
        )?);
        Ok(Some(pb))
    }
}

/// Builder pattern for creating test harnesses
pub struct HarnessBuilder {
    config: TestConfig,
}

impl HarnessBuilder {
    /// Start building a harness with the given translator and test root
    pub fn new(translator: impl AsRef<Path>, tests: impl AsRef<Path>) -> Self {
        let config = TestConfig::new(translator.as_ref().to_path_buf(), tests.as_ref().to_path_buf());
        Self { config }
    }

    /// Set the report file
    pub fn output(mut self, output: impl Into<PathBuf>) -> Self {
        self.config.output = output.into();
        self
    }

    /// Mirror the report to the console
    pub fn console(mut self, console: bool) -> Self {
        self.config.console = console;
        self
    }

    /// Apply a visibility filter
    pub fn reporting(mut self, reporting: &ReportingConfig) -> Self {
        self.config.brief = reporting.is_brief();
        self.config.skip_completed = reporting.is_excluded(TestState::Completed);
        self.config.skip_failed = reporting.is_excluded(TestState::Failed);
        self.config.skip_missing_expectation = reporting.is_excluded(TestState::MissingExpectation);
        self.config.skip_compiler_error = reporting.is_excluded(TestState::CompilerError);
        self.config.skip_invocation_error = reporting.is_excluded(TestState::InvocationError);
        self.config.skip_timeout = reporting.is_excluded(TestState::Timeout);
        self
    }

    /// Set case-folder conventions
    pub fn layout(mut self, layout: &CaseLayout) -> Self {
        self.config.source_ext = layout.source_extension.clone();
        self.config.expectation_ext = layout.expectation_extension.clone();
        self.config.result_suffix = layout.result_suffix.clone();
        self.config.error_marker = layout.error_marker.clone();
        self.config.header_lines = layout.header_lines;
        self.config.allow_truncated_output = layout.comparison == ComparisonMode::Prefix;
        self
    }

    /// Set number of parallel jobs
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.config.jobs = jobs;
        self
    }

    /// Set translator timeout
    pub fn timeout(mut self, timeout_secs: u64) -> Self {
        self.config.timeout = timeout_secs;
        self
    }

    /// Also export the report as JSON
    pub fn json(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.json = Some(path.into());
        self
    }

    /// Build the harness around the real translator binary
    pub fn build(self) -> Result<KumirHarness, TestError> {
        KumirHarness::new(self.config)
    }

    /// Build the harness around a custom translator
    pub fn build_with<T: Translator>(self, translator: T) -> Result<KumirHarness<T>, TestError> {
        KumirHarness::with_translator(self.config, translator)
    }
}

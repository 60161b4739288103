//! Test execution functionality

use indicatif::ProgressBar;
use log::{debug, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;

use crate::comparison::OutputClassifier;
use crate::config::CaseLayout;
use crate::discovery::{TestCase, TestSection};
use crate::TestError;

/// Outcome of a single test case.
///
/// Every case starts `Pending` and receives exactly one terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TestState {
    /// Not run yet; never part of a finished report
    Pending,
    /// Normalized output matches the expectation
    Completed,
    /// Normalized output differs from the expectation
    Failed,
    /// The translator wrote the error marker into its result
    CompilerError,
    /// No expectation file; the translator was not invoked
    MissingExpectation,
    /// The translator could not be run or produced no result
    InvocationError,
    /// The translator exceeded the timeout and was killed
    Timeout,
}

impl TestState {
    /// All states a finished case can be in
    pub const TERMINAL: [TestState; 6] = [
        TestState::Completed,
        TestState::Failed,
        TestState::CompilerError,
        TestState::MissingExpectation,
        TestState::InvocationError,
        TestState::Timeout,
    ];

    pub fn is_terminal(self) -> bool {
        self != TestState::Pending
    }

    /// States that make the whole run unsuccessful
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            TestState::Failed | TestState::CompilerError | TestState::InvocationError | TestState::Timeout
        )
    }
}

impl fmt::Display for TestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(crate::reporting::describe(*self).label)
    }
}

/// A finished translator run
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Where the translator was asked to write its output
    pub result_path: PathBuf,
    /// Captured standard output
    pub raw_output: String,
    /// Exit code, if the process exited normally
    pub exit_code: Option<i32>,
    /// Whether the process reported success
    pub success: bool,
    /// Wall-clock time of the run
    pub duration: Duration,
}

/// Why the translator could not be run to completion
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InvocationFailure {
    #[error("failed to start translator: {0}")]
    Spawn(String),

    #[error("translator timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    #[error("failed to collect translator output: {0}")]
    Io(String),
}

/// The translator under test, seen as a black box.
///
/// Implementations block until the run is over.
pub trait Translator: Send + Sync {
    /// Translate `source_path` with the executable at `translator_path`
    fn invoke(&self, source_path: &Path, translator_path: &Path) -> Result<Invocation, InvocationFailure>;
}

/// Runs the real translator as a child process:
/// `<translator> --out=<result> -s <source>`
pub struct ProcessTranslator {
    layout: CaseLayout,
    timeout: Duration,
    runtime: tokio::runtime::Runtime,
}

impl ProcessTranslator {
    /// Create a translator runner with a per-run timeout
    pub fn new(layout: CaseLayout, timeout: Duration) -> Result<Self, TestError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|e| TestError::Execution(format!("Failed to create async runtime: {}", e)))?;

        Ok(Self { layout, timeout, runtime })
    }
}

impl Translator for ProcessTranslator {
    fn invoke(&self, source_path: &Path, translator_path: &Path) -> Result<Invocation, InvocationFailure> {
        let result_path = self.layout.result_path_for(source_path);

        let mut out_arg = OsString::from("--out=");
        out_arg.push(&result_path);

        let mut cmd = TokioCommand::new(translator_path);
        cmd.arg(out_arg)
            .arg("-s")
            .arg(source_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let timeout_duration = self.timeout;
        let start_time = Instant::now();

        // Dropping the child on timeout kills it
        let output = self.runtime.block_on(async move {
            let child = cmd.spawn().map_err(|e| InvocationFailure::Spawn(e.to_string()))?;
            let output = timeout(timeout_duration, child.wait_with_output())
                .await
                .map_err(|_| InvocationFailure::TimedOut(timeout_duration))?
                .map_err(|e| InvocationFailure::Io(e.to_string()))?;
            Ok::<_, InvocationFailure>(output)
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            debug!("Translator stderr for {}: {}", source_path.display(), stderr.trim_end());
        }

        Ok(Invocation {
            result_path,
            raw_output: String::from_utf8_lossy(&output.stdout).into_owned(),
            exit_code: output.status.code(),
            success: output.status.success(),
            duration: start_time.elapsed(),
        })
    }
}

/// Runs test cases and records their final state
pub struct CaseExecutor<T: Translator> {
    translator: T,
    translator_path: PathBuf,
    layout: CaseLayout,
    classifier: OutputClassifier,
}

impl<T: Translator> CaseExecutor<T> {
    /// Create a new case executor
    pub fn new(translator: T, translator_path: PathBuf, layout: CaseLayout) -> Self {
        let classifier = OutputClassifier::from_layout(&layout);
        Self { translator, translator_path, layout, classifier }
    }

    /// The translator collaborator
    pub fn translator(&self) -> &T {
        &self.translator
    }

    /// Run one case. Per-case problems become a state, never an error;
    /// the only error is a case that already has its final state.
    pub fn run_case(&self, case: &mut TestCase) -> Result<(), TestError> {
        if case.state().is_terminal() {
            return Err(TestError::StateAlreadyAssigned { name: case.name.clone(), state: case.state() });
        }

        let Some(expectation_path) = case.expectation_path.clone() else {
            debug!("{}: no expectation, translator not invoked", case.name);
            return case.assign_state(TestState::MissingExpectation);
        };

        let state = self.translate_and_classify(case, &expectation_path);
        if state.is_failure() {
            debug!("{}: {}", case.name, state);
        }
        case.assign_state(state)
    }

    fn translate_and_classify(&self, case: &mut TestCase, expectation_path: &Path) -> TestState {
        let expected = match read_lines(expectation_path) {
            Ok(lines) => lines,
            Err(e) => {
                warn!("{}: cannot read expectation {}: {}", case.name, expectation_path.display(), e);
                case.detail = Some(format!("cannot read expectation: {}", e));
                return TestState::InvocationError;
            }
        };

        // A result left over from an earlier run must not pass for a fresh one
        let stale_result = self.layout.result_path_for(&case.source_path);
        if let Err(e) = fs::remove_file(&stale_result) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("{}: cannot remove old result {}: {}", case.name, stale_result.display(), e);
            }
        }

        let invocation = match self.translator.invoke(&case.source_path, &self.translator_path) {
            Ok(invocation) => invocation,
            Err(failure) => {
                warn!("{}: {}", case.name, failure);
                case.detail = Some(failure.to_string());
                return match failure {
                    InvocationFailure::TimedOut(_) => TestState::Timeout,
                    _ => TestState::InvocationError,
                };
            }
        };

        case.duration = invocation.duration;
        case.result_path = Some(invocation.result_path.clone());

        let actual = match read_lines(&invocation.result_path) {
            Ok(lines) => lines,
            Err(e) => {
                warn!(
                    "{}: no result file {} (exit code {:?}): {}",
                    case.name,
                    invocation.result_path.display(),
                    invocation.exit_code,
                    e
                );
                case.detail = Some(format!("translator produced no result file: {}", e));
                return TestState::InvocationError;
            }
        };

        let state = self.classifier.classify(&expected, &actual);
        if state != TestState::CompilerError && !invocation.success {
            case.detail = Some(match invocation.exit_code {
                Some(code) => format!("translator exited with code {}", code),
                None => "translator was terminated by a signal".to_string(),
            });
            return TestState::InvocationError;
        }

        state
    }

    /// Run every case of every section.
    ///
    /// With `jobs > 1` cases run on a worker pool; states are written in
    /// place so the section and case order stays the discovery order.
    pub fn run_all(
        &self,
        sections: &mut [TestSection],
        jobs: usize,
        progress: Option<&ProgressBar>,
    ) -> Result<(), TestError> {
        let cases: Vec<&mut TestCase> = sections.iter_mut().flat_map(|s| s.cases.iter_mut()).collect();

        let run = |case: &mut TestCase| {
            let result = self.run_case(case);
            if let Some(pb) = progress {
                pb.inc(1);
            }
            result
        };

        if jobs <= 1 {
            return cases.into_iter().try_for_each(run);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build()
            .map_err(|e| TestError::Execution(format!("Failed to create worker pool: {}", e)))?;

        pool.install(|| cases.into_par_iter().try_for_each(run))
    }
}

fn read_lines(path: &Path) -> io::Result<Vec<String>> {
    let content = fs::read(path)?;
    Ok(String::from_utf8_lossy(&content).lines().map(str::to_string).collect())
}

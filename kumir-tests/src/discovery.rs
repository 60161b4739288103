//! Test discovery and case-folder validation

use indicatif::ProgressBar;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

use crate::config::CaseLayout;
use crate::execution::{CaseExecutor, TestState, Translator};
use crate::TestError;

/// One source program with an optional expectation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Name of the case folder
    pub name: String,
    /// Absolute path of the source file
    pub source_path: PathBuf,
    /// Expectation file, if the folder has one
    pub expectation_path: Option<PathBuf>,
    /// Translator result file; set only once the translator was invoked
    pub result_path: Option<PathBuf>,
    /// Diagnostic for invocation errors and timeouts
    pub detail: Option<String>,
    /// Time spent in the translator
    pub duration: Duration,
    state: TestState,
}

impl TestCase {
    /// Create a pending test case
    pub fn new(name: String, source_path: PathBuf, expectation_path: Option<PathBuf>) -> Self {
        Self {
            name,
            source_path,
            expectation_path,
            result_path: None,
            detail: None,
            duration: Duration::ZERO,
            state: TestState::Pending,
        }
    }

    /// Current state
    pub fn state(&self) -> TestState {
        self.state
    }

    /// Set the final state. A case is finished exactly once.
    pub fn assign_state(&mut self, state: TestState) -> Result<(), TestError> {
        if self.state.is_terminal() {
            return Err(TestError::StateAlreadyAssigned { name: self.name.clone(), state: self.state });
        }
        self.state = state;
        Ok(())
    }
}

/// A named group of cases, one per folder under the test root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSection {
    /// Name of the section folder
    pub name: String,
    /// Path of the section folder
    pub path: PathBuf,
    /// Cases in lexical folder order
    pub cases: Vec<TestCase>,
}

impl TestSection {
    /// Create a new section
    pub fn new(name: String, path: PathBuf, cases: Vec<TestCase>) -> Self {
        Self { name, path, cases }
    }

    /// Copy of this section keeping only the cases `keep` accepts
    pub fn filtered(&self, keep: impl Fn(&TestCase) -> bool) -> Self {
        Self {
            name: self.name.clone(),
            path: self.path.clone(),
            cases: self.cases.iter().filter(|case| keep(case)).cloned().collect(),
        }
    }

    /// Check if this section has no cases
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

/// Test discovery engine
pub struct TestDiscovery {
    layout: CaseLayout,
}

impl TestDiscovery {
    /// Create a new test discovery engine
    pub fn new(layout: CaseLayout) -> Self {
        Self { layout }
    }

    /// Discover every section and run its cases.
    ///
    /// Every returned case has a terminal state. `jobs` and `progress` are
    /// passed to [`CaseExecutor::run_all`]; the progress length is set to
    /// the number of discovered cases.
    pub fn discover<T: Translator>(
        &self,
        test_root: &Path,
        executor: &CaseExecutor<T>,
        jobs: usize,
        progress: Option<&ProgressBar>,
    ) -> Result<Vec<TestSection>, TestError> {
        let mut sections = self.scan(test_root)?;

        let total_cases: usize = sections.iter().map(|s| s.cases.len()).sum();
        info!("Running {} test cases with {} job(s)", total_cases, jobs);
        if let Some(pb) = progress {
            pb.set_length(total_cases as u64);
        }

        executor.run_all(&mut sections, jobs, progress)?;
        Ok(sections)
    }

    /// Build the section/case hierarchy without running anything.
    ///
    /// Files directly under the root are ignored. Case folders that do not
    /// hold exactly one source and at most one expectation are dropped.
    /// Symlinked folders and files are followed.
    pub fn scan(&self, test_root: &Path) -> Result<Vec<TestSection>, TestError> {
        let root = fs::canonicalize(test_root).map_err(|e| {
            TestError::Discovery(format!("Failed to resolve {}: {}", test_root.display(), e))
        })?;

        let mut sections = Vec::new();
        for section_dir in subdirectories(&root)? {
            let mut cases = Vec::new();
            for case_dir in subdirectories(&section_dir)? {
                if let Some(case) = self.scan_case(&case_dir)? {
                    cases.push(case);
                }
            }

            sections.push(TestSection::new(folder_name(&section_dir), section_dir, cases));
        }

        info!(
            "Discovered {} sections with {} test cases in {}",
            sections.len(),
            sections.iter().map(|s| s.cases.len()).sum::<usize>(),
            root.display()
        );

        Ok(sections)
    }

    /// Validate one case folder
    fn scan_case(&self, case_dir: &Path) -> Result<Option<TestCase>, TestError> {
        let mut sources = Vec::new();
        let mut expectations = Vec::new();

        for entry in WalkDir::new(case_dir).min_depth(1).max_depth(1).follow_links(true).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                TestError::Discovery(format!("Failed to read {}: {}", case_dir.display(), e))
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.into_path();
            if self.layout.is_source(&path) {
                sources.push(path);
            } else if self.layout.is_expectation(&path) {
                expectations.push(path);
            }
        }

        if sources.len() != 1 || expectations.len() > 1 {
            debug!(
                "Skipping {}: {} source and {} expectation files",
                case_dir.display(),
                sources.len(),
                expectations.len()
            );
            return Ok(None);
        }

        Ok(sources.pop().map(|source| TestCase::new(folder_name(case_dir), source, expectations.pop())))
    }
}

/// Immediate subdirectories of `dir` in lexical order
fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>, TestError> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) if entry.file_type().is_dir() => Some(Ok(entry.into_path())),
            Ok(_) => None,
            Err(e) => Some(Err(TestError::Discovery(format!(
                "Failed to read {}: {}",
                dir.display(),
                e
            )))),
        })
        .collect()
}

fn folder_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

//! Output normalization and outcome classification

use crate::config::{CaseLayout, ComparisonMode};
use crate::execution::TestState;

/// Characters that never take part in a comparison
const INSIGNIFICANT: [char; 4] = ['\n', '\r', '\t', ' '];

/// Strip insignificant characters from every line and drop lines left empty.
///
/// Line order is preserved. Applying it to its own output changes nothing.
pub fn normalize<S: AsRef<str>>(lines: &[S]) -> Vec<String> {
    lines
        .iter()
        .map(|line| line.as_ref().chars().filter(|c| !INSIGNIFICANT.contains(c)).collect::<String>())
        .filter(|line| !line.is_empty())
        .collect()
}

/// Classify with the default case layout: a two-line header, the `ERROR!`
/// marker and strict length comparison
pub fn classify<S: AsRef<str>>(expected: &[S], actual: &[S]) -> TestState {
    OutputClassifier::from_layout(&CaseLayout::default()).classify(expected, actual)
}

/// Compares translator output against an expectation
#[derive(Debug, Clone)]
pub struct OutputClassifier {
    header_lines: usize,
    error_marker: String,
    mode: ComparisonMode,
}

impl OutputClassifier {
    /// Create a classifier with explicit settings
    pub fn new(header_lines: usize, error_marker: impl Into<String>, mode: ComparisonMode) -> Self {
        Self { header_lines, error_marker: error_marker.into(), mode }
    }

    /// Create a classifier from the case-folder conventions
    pub fn from_layout(layout: &CaseLayout) -> Self {
        Self::new(layout.header_lines, layout.error_marker.clone(), layout.comparison)
    }

    /// Whether the translator flagged an error below the header of its output
    pub fn has_error_marker<S: AsRef<str>>(&self, actual: &[S]) -> bool {
        self.marked(&self.payload(actual))
    }

    fn marked(&self, payload: &[String]) -> bool {
        payload.iter().any(|line| line.contains(self.error_marker.as_str()))
    }

    /// Normalized result lines with the header dropped
    fn payload<S: AsRef<str>>(&self, actual: &[S]) -> Vec<String> {
        normalize(actual.get(self.header_lines..).unwrap_or_default())
    }

    /// Assign a terminal state to a translator result.
    ///
    /// The header is dropped from `actual` first. The error marker then
    /// dominates content comparison.
    pub fn classify<S: AsRef<str>>(&self, expected: &[S], actual: &[S]) -> TestState {
        let actual = self.payload(actual);
        if self.marked(&actual) {
            return TestState::CompilerError;
        }

        let expected = normalize(expected);

        if self.mode == ComparisonMode::Strict && actual.len() != expected.len() {
            return TestState::Failed;
        }

        for (index, line) in actual.iter().enumerate() {
            if expected.get(index) != Some(line) {
                return TestState::Failed;
            }
        }

        TestState::Completed
    }
}

impl Default for OutputClassifier {
    fn default() -> Self {
        Self::from_layout(&CaseLayout::default())
    }
}

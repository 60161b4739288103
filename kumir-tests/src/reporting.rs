//! Test reporting: summary header, per-section details and output sinks

use console::{style, Color};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::aggregation::{AggregatedResults, StateCounts};
use crate::discovery::{TestCase, TestSection};
use crate::execution::TestState;
use crate::TestError;

/// How a state is ordered and presented
#[derive(Debug)]
pub struct StateStyle {
    /// Position in a rendered section; lower comes first
    pub rank: u8,
    /// Short name used in the summary and in status lines
    pub label: &'static str,
    /// Status line template
    pub message: &'static str,
    /// Whether source, expectation and result paths are listed
    pub show_paths: bool,
    /// Console color of the label
    pub color: Color,
}

static FAILED: StateStyle = StateStyle {
    rank: 0,
    label: "Failed",
    message: "output differs from expectation",
    show_paths: true,
    color: Color::Red,
};

static COMPILER_ERROR: StateStyle = StateStyle {
    rank: 1,
    label: "Compiler error",
    message: "translator reported an error",
    show_paths: false,
    color: Color::Magenta,
};

static TIMEOUT: StateStyle = StateStyle {
    rank: 2,
    label: "Timeout",
    message: "translator did not finish in time",
    show_paths: false,
    color: Color::Red,
};

static INVOCATION_ERROR: StateStyle = StateStyle {
    rank: 3,
    label: "Invocation error",
    message: "translator produced no usable result",
    show_paths: false,
    color: Color::Red,
};

static MISSING_EXPECTATION: StateStyle = StateStyle {
    rank: 4,
    label: "Missing expectation",
    message: "no expectation file, translator not invoked",
    show_paths: false,
    color: Color::Yellow,
};

static COMPLETED: StateStyle = StateStyle {
    rank: 5,
    label: "Completed",
    message: "output matches expectation",
    show_paths: true,
    color: Color::Green,
};

static PENDING: StateStyle = StateStyle {
    rank: 6,
    label: "Pending",
    message: "not run",
    show_paths: false,
    color: Color::White,
};

/// Presentation of a state
pub fn describe(state: TestState) -> &'static StateStyle {
    match state {
        TestState::Failed => &FAILED,
        TestState::CompilerError => &COMPILER_ERROR,
        TestState::Timeout => &TIMEOUT,
        TestState::InvocationError => &INVOCATION_ERROR,
        TestState::MissingExpectation => &MISSING_EXPECTATION,
        TestState::Completed => &COMPLETED,
        TestState::Pending => &PENDING,
    }
}

/// Complete test report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    /// Counts over every case
    pub counts: StateCounts,
    /// Sections after the visibility filter
    pub sections: Vec<TestSection>,
    /// Only the summary header is rendered
    pub brief: bool,
    /// States hidden from the details
    pub hidden: Vec<TestState>,
    /// Total execution time
    pub duration: Duration,
    /// Timestamp when tests were run
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl TestReport {
    /// Create a new test report
    pub fn new(results: AggregatedResults, hidden: Vec<TestState>, brief: bool, duration: Duration) -> Self {
        Self {
            counts: results.counts,
            sections: results.sections,
            brief,
            hidden,
            duration,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Plain-text report, as written to the log file
    pub fn render(&self) -> String {
        self.to_string()
    }

    /// Report text; with `styled` the status labels carry console colors
    pub fn render_with(&self, styled: bool) -> String {
        Rendered { report: self, styled }.to_string()
    }

    /// Export report as JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Save report as JSON
    pub fn save_json(&self, path: &Path) -> Result<(), TestError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

impl fmt::Display for TestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&Rendered { report: self, styled: false }, f)
    }
}

/// A report bound to a presentation
struct Rendered<'a> {
    report: &'a TestReport,
    styled: bool,
}

impl Rendered<'_> {
    fn header(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.report;
        writeln!(f, "==== KUMIR TRANSLATOR TEST REPORT ====")?;
        writeln!(f, "Run at: {}", report.timestamp.format("%Y-%m-%d %H:%M:%S UTC"))?;
        writeln!(f, "Duration: {:.2?}", report.duration)?;
        writeln!(f, "Total cases: {}", report.counts.total())?;

        for (state, count) in report.counts.terminal() {
            writeln!(f, "  {}: {}", label(state, self.styled), count)?;
        }

        // Never expected; shows up only if a case escaped execution
        let pending = report.counts.get(TestState::Pending);
        if pending > 0 {
            writeln!(f, "  {}: {}", label(TestState::Pending, self.styled), pending)?;
        }

        if !report.brief && !report.hidden.is_empty() {
            let hidden: Vec<_> = report.hidden.iter().map(|s| describe(*s).label).collect();
            writeln!(f, "Hidden from details: {}", hidden.join(", "))?;
        }

        writeln!(f)
    }

    fn section(&self, f: &mut fmt::Formatter<'_>, section: &TestSection) -> fmt::Result {
        writeln!(f, "[{}] {} case(s)", section.name, section.cases.len())?;

        let mut cases: Vec<&TestCase> = section.cases.iter().collect();
        cases.sort_by_key(|case| describe(case.state()).rank);

        for case in cases {
            let state_style = describe(case.state());
            write!(f, "  {}: {} - {}", case.name, label(case.state(), self.styled), state_style.message)?;
            match &case.detail {
                Some(detail) => writeln!(f, " ({})", detail)?,
                None => writeln!(f)?,
            }

            if state_style.show_paths {
                writeln!(f, "    source:      {}", case.source_path.display())?;
                writeln!(f, "    expectation: {}", display_optional(&case.expectation_path))?;
                writeln!(f, "    result:      {}", display_optional(&case.result_path))?;
            }
        }

        writeln!(f)
    }
}

impl fmt::Display for Rendered<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.header(f)?;

        if !self.report.brief {
            for section in &self.report.sections {
                self.section(f, section)?;
            }
        }

        Ok(())
    }
}

fn label(state: TestState, styled: bool) -> String {
    let state_style = describe(state);
    if styled {
        style(state_style.label).fg(state_style.color).bold().to_string()
    } else {
        state_style.label.to_string()
    }
}

fn display_optional(path: &Option<PathBuf>) -> String {
    path.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "-".to_string())
}

/// Where a finished report goes: always the log file, optionally the console
#[derive(Debug, Clone)]
pub struct ReportSink {
    log_path: PathBuf,
    console: bool,
}

impl ReportSink {
    /// Create a sink appending to `log_path`
    pub fn new(log_path: PathBuf, console: bool) -> Self {
        Self { log_path, console }
    }

    /// Append the report to the log file and mirror it to stdout if enabled
    pub fn emit(&self, report: &TestReport) -> Result<(), TestError> {
        let mut file = OpenOptions::new().create(true).append(true).open(&self.log_path).map_err(|e| {
            TestError::Report(format!("Failed to open {}: {}", self.log_path.display(), e))
        })?;
        file.write_all(report.render().as_bytes())?;

        if self.console {
            print!("{}", report.render_with(true));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::aggregate;
    use crate::config::ReportingConfig;

    fn case(name: &str, state: TestState) -> TestCase {
        let mut case = TestCase::new(
            name.to_string(),
            PathBuf::from(format!("/t/basics/{name}/{name}.kum")),
            Some(PathBuf::from(format!("/t/basics/{name}/{name}.exp"))),
        );
        if matches!(state, TestState::Completed | TestState::Failed) {
            case.result_path = Some(PathBuf::from(format!("/t/basics/{name}/{name}.kumir.c")));
        }
        case.assign_state(state).unwrap();
        case
    }

    fn report(reporting: &ReportingConfig) -> TestReport {
        let sections = vec![TestSection::new(
            "basics".to_string(),
            PathBuf::from("/t/basics"),
            vec![
                case("add_two", TestState::Completed),
                case("bad_syntax", TestState::CompilerError),
                case("off_by_one", TestState::Failed),
            ],
        )];
        let hidden = reporting.excluded().collect();
        TestReport::new(aggregate(&sections, reporting), hidden, reporting.is_brief(), Duration::ZERO)
    }

    #[test]
    fn test_cases_sorted_by_severity() {
        let text = report(&ReportingConfig::new()).render();
        let failed = text.find("off_by_one").unwrap();
        let compiler = text.find("bad_syntax").unwrap();
        let completed = text.find("add_two").unwrap();
        assert!(failed < compiler && compiler < completed);
    }

    #[test]
    fn test_paths_only_for_compared_cases() {
        let text = report(&ReportingConfig::new()).render();
        assert!(text.contains("/t/basics/off_by_one/off_by_one.kumir.c"));
        assert!(text.contains("/t/basics/add_two/add_two.exp"));
        assert!(!text.contains("/t/basics/bad_syntax/bad_syntax.exp"));
    }

    #[test]
    fn test_skip_completed_keeps_summary_count() {
        let text = report(&ReportingConfig::excluding([TestState::Completed])).render();
        assert!(text.contains("  Completed: 1\n"));
        assert!(text.contains("Total cases: 3\n"));
        assert!(!text.contains("add_two"));
        assert!(text.contains("Hidden from details: Completed"));
    }

    #[test]
    fn test_brief_renders_summary_only() {
        let text = report(&ReportingConfig::brief()).render();
        assert!(text.contains("  Failed: 1\n"));
        assert!(!text.contains("[basics]"));
    }

    #[test]
    fn test_empty_section_still_named() {
        let text = report(&ReportingConfig::excluding(TestState::TERMINAL.into_iter().skip(1))).render();
        assert!(text.contains("[basics] 1 case(s)"));
        let all_hidden = report(&ReportingConfig::excluding([
            TestState::Completed,
            TestState::Failed,
            TestState::CompilerError,
        ]));
        assert!(all_hidden.render().contains("[basics] 0 case(s)"));
    }

    #[test]
    fn test_plain_render_matches_display() {
        let report = report(&ReportingConfig::new());
        assert_eq!(report.render(), report.to_string());
        assert_eq!(report.render_with(false), report.to_string());
        assert!(report.render().ends_with("\n\n"));
    }

    #[test]
    fn test_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("run.log");
        let sink = ReportSink::new(log.clone(), false);
        let report = report(&ReportingConfig::brief());

        sink.emit(&report).unwrap();
        sink.emit(&report).unwrap();

        let content = std::fs::read_to_string(log).unwrap();
        assert_eq!(content.matches("KUMIR TRANSLATOR TEST REPORT").count(), 2);
    }

    #[test]
    fn test_json_export() {
        let json = report(&ReportingConfig::new()).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["counts"]["counts"]["Failed"], 1);
        assert_eq!(value["sections"][0]["cases"].as_array().unwrap().len(), 3);
    }
}

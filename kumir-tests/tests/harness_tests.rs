//! End-to-end harness tests against a recording translator

use kumir_tests::{
    CaseLayout, HarnessBuilder, Invocation, InvocationFailure, ReportingConfig, TestCase, TestState, Translator,
};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

/// Writes a prepared result for each source stem and records every call
struct RecordingTranslator {
    layout: CaseLayout,
    results: HashMap<String, String>,
    calls: Mutex<Vec<PathBuf>>,
}

impl RecordingTranslator {
    fn new(results: &[(&str, &str)]) -> Self {
        Self {
            layout: CaseLayout::default(),
            results: results.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn called_for(&self, stem: &str) -> bool {
        self.calls.lock().unwrap().iter().any(|p| p.file_stem().and_then(|s| s.to_str()) == Some(stem))
    }
}

impl Translator for RecordingTranslator {
    fn invoke(&self, source_path: &Path, _translator_path: &Path) -> Result<Invocation, InvocationFailure> {
        self.calls.lock().unwrap().push(source_path.to_path_buf());

        let stem = source_path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        let result_path = self.layout.result_path_for(source_path);
        if let Some(body) = self.results.get(stem) {
            let content = format!("// kumir2-arduino\n// {}\n{}", source_path.display(), body);
            fs::write(&result_path, content).unwrap();
        }

        Ok(Invocation {
            result_path,
            raw_output: String::new(),
            exit_code: Some(0),
            success: true,
            duration: Duration::from_millis(1),
        })
    }
}

fn write(path: PathBuf, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("tests");

    write(root.join("basics/add_two/add_two.kum"), "алг\nнач\n  вывод 1+2\nкон\n");
    write(root.join("basics/add_two/add_two.exp"), "3\r\n");
    write(root.join("basics/off_by_one/off_by_one.kum"), "алг\nнач\n  вывод 2+2\nкон\n");
    write(root.join("basics/off_by_one/off_by_one.exp"), "5\n");
    write(root.join("basics/no_exp/no_exp.kum"), "алг\nнач\nкон\n");
    write(root.join("errors/bad_syntax/bad_syntax.kum"), "алг\nнач\n  вывод\n");
    write(root.join("errors/bad_syntax/bad_syntax.exp"), "");
    write(root.join("errors/two_sources/a.kum"), "");
    write(root.join("errors/two_sources/b.kum"), "");
    write(root.join("errors/two_sources/a.exp"), "");
    write(root.join("errors/no_source/only.exp"), "1\n");
    write(root.join("notes.txt"), "not a section");

    dir
}

fn translator() -> RecordingTranslator {
    RecordingTranslator::new(&[
        ("add_two", "3\n"),
        ("off_by_one", "4\n"),
        ("bad_syntax", "ERROR! line 3: missing expression\n"),
    ])
}

fn find<'a>(cases: impl IntoIterator<Item = &'a TestCase>, name: &str) -> &'a TestCase {
    cases.into_iter().find(|c| c.name == name).unwrap_or_else(|| panic!("case {} not found", name))
}

#[test]
fn test_scenarios_are_classified() {
    let dir = fixture();
    let harness = HarnessBuilder::new("kumir2-arduino", dir.path().join("tests"))
        .output(dir.path().join("report.log"))
        .build_with(translator())
        .unwrap();

    let outcome = harness.run().unwrap();
    let cases: Vec<&TestCase> = outcome.sections.iter().flat_map(|s| s.cases.iter()).collect();

    assert_eq!(find(cases.iter().copied(), "add_two").state(), TestState::Completed);
    assert_eq!(find(cases.iter().copied(), "off_by_one").state(), TestState::Failed);
    assert_eq!(find(cases.iter().copied(), "bad_syntax").state(), TestState::CompilerError);

    let no_exp = find(cases.iter().copied(), "no_exp");
    assert_eq!(no_exp.state(), TestState::MissingExpectation);
    assert!(no_exp.result_path.is_none());
    assert!(!harness.executor().translator().called_for("no_exp"));

    assert!(cases.iter().all(|c| c.state() != TestState::Pending));
    assert!(!outcome.all_passed());
    assert_eq!(outcome.exit_code(), 1);
}

#[test]
fn test_malformed_folders_never_listed() {
    let dir = fixture();
    let harness = HarnessBuilder::new("kumir2-arduino", dir.path().join("tests"))
        .output(dir.path().join("report.log"))
        .build_with(translator())
        .unwrap();

    let outcome = harness.run().unwrap();

    let section_names: Vec<_> = outcome.sections.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(section_names, ["basics", "errors"]);
    let names: Vec<_> = outcome.sections.iter().flat_map(|s| s.cases.iter()).map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["add_two", "no_exp", "off_by_one", "bad_syntax"]);
    assert_eq!(outcome.report.counts.total(), 4);
    assert!(!harness.executor().translator().called_for("a"));
}

#[test]
fn test_skip_completed_hides_details_only() {
    let dir = fixture();
    let log = dir.path().join("report.log");
    let harness = HarnessBuilder::new("kumir2-arduino", dir.path().join("tests"))
        .output(&log)
        .reporting(&ReportingConfig::excluding([TestState::Completed]))
        .build_with(translator())
        .unwrap();

    let outcome = harness.run().unwrap();
    let text = fs::read_to_string(&log).unwrap();

    assert_eq!(outcome.report.counts.get(TestState::Completed), 1);
    assert!(text.contains("  Completed: 1\n"));
    assert!(!text.contains("add_two"));
    assert!(text.contains("off_by_one"));
}

#[test]
fn test_brief_mode_writes_summary_only() {
    let dir = fixture();
    let log = dir.path().join("report.log");
    let harness = HarnessBuilder::new("kumir2-arduino", dir.path().join("tests"))
        .output(&log)
        .reporting(&ReportingConfig::brief())
        .build_with(translator())
        .unwrap();

    harness.run().unwrap();
    let text = fs::read_to_string(&log).unwrap();

    assert!(text.contains("Total cases: 4"));
    assert!(!text.contains("[basics]"));
    assert!(!text.contains("off_by_one"));
}

#[test]
fn test_report_is_appended() {
    let dir = fixture();
    let log = dir.path().join("report.log");
    fs::write(&log, "previous run\n").unwrap();

    let harness = HarnessBuilder::new("kumir2-arduino", dir.path().join("tests"))
        .output(&log)
        .build_with(translator())
        .unwrap();
    harness.run().unwrap();

    let text = fs::read_to_string(&log).unwrap();
    assert!(text.starts_with("previous run\n"));
    assert!(text.contains("KUMIR TRANSLATOR TEST REPORT"));
}

#[test]
fn test_parallel_run_matches_sequential() {
    let dir = fixture();
    let sequential = HarnessBuilder::new("kumir2-arduino", dir.path().join("tests"))
        .output(dir.path().join("seq.log"))
        .build_with(translator())
        .unwrap()
        .run()
        .unwrap();
    let parallel = HarnessBuilder::new("kumir2-arduino", dir.path().join("tests"))
        .output(dir.path().join("par.log"))
        .jobs(4)
        .build_with(translator())
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(sequential.report.counts, parallel.report.counts);
    let states = |sections: &[kumir_tests::TestSection]| -> Vec<(String, TestState)> {
        sections.iter().flat_map(|s| s.cases.iter()).map(|c| (c.name.clone(), c.state())).collect()
    };
    assert_eq!(states(&sequential.sections), states(&parallel.sections));
}

#[test]
fn test_json_summary_export() {
    let dir = fixture();
    let json = dir.path().join("report.json");
    let harness = HarnessBuilder::new("kumir2-arduino", dir.path().join("tests"))
        .output(dir.path().join("report.log"))
        .json(&json)
        .build_with(translator())
        .unwrap();

    harness.run().unwrap();

    let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(json).unwrap()).unwrap();
    assert_eq!(value["counts"]["counts"]["MissingExpectation"], 1);
    assert_eq!(value["sections"].as_array().unwrap().len(), 2);
}

#[test]
fn test_missing_test_root_rejected() {
    let dir = TempDir::new().unwrap();
    let result = HarnessBuilder::new("kumir2-arduino", dir.path().join("absent")).build_with(translator());
    assert!(result.is_err());
}

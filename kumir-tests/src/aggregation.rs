//! Result aggregation: state counts and the filtered detail view

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::ReportingConfig;
use crate::discovery::TestSection;
use crate::execution::TestState;

/// Number of cases per state over every discovered case
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    counts: BTreeMap<TestState, usize>,
}

impl StateCounts {
    /// Count the states of every case in every section
    pub fn from_sections(sections: &[TestSection]) -> Self {
        let mut counts = BTreeMap::new();
        for case in sections.iter().flat_map(|s| s.cases.iter()) {
            *counts.entry(case.state()).or_insert(0) += 1;
        }
        Self { counts }
    }

    /// Cases in `state`
    pub fn get(&self, state: TestState) -> usize {
        self.counts.get(&state).copied().unwrap_or(0)
    }

    /// Total number of cases
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Count for every terminal state, including zeros
    pub fn terminal(&self) -> impl Iterator<Item = (TestState, usize)> + '_ {
        TestState::TERMINAL.into_iter().map(move |state| (state, self.get(state)))
    }

    /// Whether any case ended in a failing state
    pub fn has_failures(&self) -> bool {
        self.counts.iter().any(|(state, count)| state.is_failure() && *count > 0)
    }
}

/// Counts plus the sections as they should be listed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedResults {
    /// Counts over all cases; never affected by the filter
    pub counts: StateCounts,
    /// Sections with filtered cases removed; empty sections are kept
    pub sections: Vec<TestSection>,
}

/// Count every case, then apply the visibility filter to a copy of the sections
pub fn aggregate(sections: &[TestSection], reporting: &ReportingConfig) -> AggregatedResults {
    let counts = StateCounts::from_sections(sections);
    let sections = sections
        .iter()
        .map(|section| section.filtered(|case| !reporting.is_excluded(case.state())))
        .collect();

    AggregatedResults { counts, sections }
}

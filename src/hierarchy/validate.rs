//! Ontology validation and health checking.
//!
//! Verifies the structural guarantees of a [`SynonymMap`]:
//! - no term maps to itself
//! - following labels never revisits a term (no cycles)
//! - every edge climbs at least one level
//! - no chain is longer than the configured depth limit
//!
//! Maps built through [`SynonymMap::assign`] satisfy all of these; maps
//! loaded from disk may not.
//!
//! # Example
//!
//! ```rust,ignore
//! let report = validate_synonyms(&map, config.max_ontology_depth);
//! if !report.is_healthy() {
//!     for issue in &report.issues {
//!         eprintln!("{issue}");
//!     }
//! }
//! ```

use std::collections::BTreeSet;
use std::fmt;

use crate::label::{Label, SynonymMap};

/// How bad a validation finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Unusual shape, still traversable.
    Info,
    /// Likely left over from an interrupted or hand-edited run.
    Warning,
    /// Violates the depth rules.
    Error,
    /// Breaks traversal: cycles and self-loops.
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARN",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        };
        f.write_str(name)
    }
}

/// One finding about one term of a synonym map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Severity of the finding.
    pub severity: Severity,
    /// The term whose edge is at fault.
    pub term: Label,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationIssue {
    fn new(severity: Severity, term: &Label, message: impl Into<String>) -> Self {
        Self {
            severity,
            term: term.clone(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.term, self.message)
    }
}

/// Findings of [`validate_synonyms`], in discovery order.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Every finding.
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// No errors or critical findings.
    pub fn is_healthy(&self) -> bool {
        self.worst().is_none_or(|s| s < Severity::Error)
    }

    /// No findings at all.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Highest severity present.
    pub fn worst(&self) -> Option<Severity> {
        self.issues.iter().map(|i| i.severity).max()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.worst() {
            None => write!(f, "Validation passed: no issues found"),
            Some(worst) => {
                writeln!(f, "Validation: {} issues, worst {worst}", self.issues.len())?;
                for issue in &self.issues {
                    writeln!(f, "  {issue}")?;
                }
                Ok(())
            }
        }
    }
}

/// Validation plus shape statistics of an ontology.
#[derive(Debug, Clone)]
pub struct HealthReport {
    /// Validation issues.
    pub validation: ValidationReport,
    /// Terms with a label.
    pub labeled: usize,
    /// Distinct labels with children.
    pub parents: usize,
    /// Labels with no parent of their own.
    pub top_parents: usize,
    /// Deepest label level present.
    pub max_depth: u8,
    /// Largest child count of any label.
    pub max_cluster_size: usize,
}

impl HealthReport {
    /// No errors or critical issues.
    pub fn is_healthy(&self) -> bool {
        self.validation.is_healthy()
    }
}

impl std::fmt::Display for HealthReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Ontology Health Report")?;
        writeln!(f, "======================")?;
        writeln!(f, "Labeled terms: {}", self.labeled)?;
        writeln!(f, "Parents: {} ({} top-level)", self.parents, self.top_parents)?;
        writeln!(f, "Max depth: {}", self.max_depth)?;
        writeln!(f, "Largest cluster: {}", self.max_cluster_size)?;
        writeln!(f)?;
        write!(f, "{}", self.validation)
    }
}

/// Check the structural guarantees of `map` for a depth limit of
/// `max_depth` parent levels.
pub fn validate_synonyms(map: &SynonymMap, max_depth: u8) -> ValidationReport {
    let mut report = ValidationReport::default();
    let mut push = |severity, term: &Label, message: String| {
        report.issues.push(ValidationIssue::new(severity, term, message));
    };

    for (term, label) in map.iter() {
        if term == label {
            push(Severity::Critical, term, "maps to itself".into());
        } else if label.depth() <= term.depth() {
            push(Severity::Error, term, format!("label {label} does not climb a level"));
        } else if label.depth() > term.depth() + 1 {
            push(Severity::Info, term, format!("label {label} skips a level"));
        }
    }

    // Walk each chain with its own visited set; a revisit is a cycle.
    let mut cyclic: BTreeSet<&Label> = BTreeSet::new();
    for (start, _) in map.iter() {
        let mut seen: BTreeSet<&Label> = BTreeSet::new();
        seen.insert(start);
        let mut hops = 0usize;
        let mut cur = start;
        while let Some(next) = map.get(cur) {
            hops += 1;
            if !seen.insert(next) {
                if cyclic.insert(start) {
                    push(Severity::Critical, start, format!("chain revisits {next}"));
                }
                break;
            }
            cur = next;
        }
        if !cyclic.contains(start) && start.depth() == 0 && hops > usize::from(max_depth) {
            push(Severity::Error, start, format!("chain of {hops} hops exceeds limit {max_depth}"));
        }
    }

    let labels: BTreeSet<&Label> = map.iter().map(|(_, l)| l).collect();
    for (term, _) in map.iter() {
        if term.is_parent() && !labels.contains(term) {
            push(Severity::Warning, term, "label has no members".into());
        }
    }
    for (label, children) in map.view().iter() {
        if label.depth() > 1 && children.len() == 1 {
            push(Severity::Warning, label, "upper-level label has a single child".into());
        }
    }

    report
}

/// Validate `map` and collect shape statistics.
pub fn ontology_health(map: &SynonymMap, max_depth: u8) -> HealthReport {
    let view = map.view();
    HealthReport {
        validation: validate_synonyms(map, max_depth),
        labeled: map.len(),
        parents: view.len(),
        top_parents: map.top_parents().len(),
        max_depth: view.iter().map(|(l, _)| l.depth()).max().unwrap_or(0),
        max_cluster_size: view.max_cluster_size(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn has(report: &ValidationReport, severity: Severity) -> bool {
        report.issues.iter().any(|i| i.severity == severity)
    }

    fn raw(edges: &[(Label, Label)]) -> SynonymMap {
        // Bypass `assign` to build maps it would refuse.
        let inner: BTreeMap<Label, Label> = edges.iter().cloned().collect();
        serde_json::from_value(serde_json::to_value(inner).unwrap()).unwrap()
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Critical);
    }

    #[test]
    fn issue_display_names_term() {
        let issue = ValidationIssue::new(Severity::Error, &Label::new("fruit", 2), "does not climb");
        assert_eq!(issue.to_string(), "[ERROR] ¶¶fruit: does not climb");
    }

    #[test]
    fn vacated_label_with_parent_is_flagged() {
        let map = raw(&[
            (Label::leaf("a"), Label::new("a", 1)),
            (Label::new("a", 1), Label::new("top", 2)),
            (Label::new("b", 1), Label::new("top", 2)),
        ]);
        let report = validate_synonyms(&map, 4);
        assert!(report.is_healthy());
        assert_eq!(report.worst(), Some(Severity::Warning));
        assert!(report
            .issues
            .iter()
            .any(|i| i.term == Label::new("b", 1) && i.message.contains("no members")));
    }

    #[test]
    fn well_formed_two_level_map_is_clean() {
        let mut map = SynonymMap::new();
        map.assign(Label::leaf("apples"), Label::new("apple", 1));
        map.assign(Label::leaf("apple"), Label::new("apple", 1));
        map.assign(Label::leaf("cherry"), Label::new("cherry", 1));
        map.assign(Label::new("apple", 1), Label::new("fruit", 2));
        map.assign(Label::new("cherry", 1), Label::new("fruit", 2));

        let report = validate_synonyms(&map, 4);
        assert!(report.is_clean(), "{report}");
        let health = ontology_health(&map, 4);
        assert_eq!(health.max_depth, 2);
        assert_eq!(health.top_parents, 1);
    }

    #[test]
    fn loaded_cycle_is_critical() {
        let a = Label::leaf("a");
        let b = Label::leaf("b");
        let map = raw(&[(a.clone(), b.clone()), (b, a)]);
        let report = validate_synonyms(&map, 4);
        assert!(!report.is_healthy());
        assert!(has(&report, Severity::Critical));
    }

    #[test]
    fn long_chain_flagged() {
        let mut map = SynonymMap::new();
        map.assign(Label::leaf("x"), Label::new("x", 1));
        map.assign(Label::new("x", 1), Label::new("x", 2));
        map.assign(Label::new("x", 2), Label::new("x", 3));
        assert!(validate_synonyms(&map, 3).is_healthy());
        let report = validate_synonyms(&map, 2);
        assert!(report.issues.iter().any(|i| i.message.contains("exceeds limit 2")));
    }

    proptest! {
        #[test]
        fn assigned_maps_are_always_acyclic(
            edges in proptest::collection::vec((0usize..12, 0u8..4, 0usize..12, 0u8..4), 0..60),
        ) {
            let mut map = SynonymMap::new();
            for (t, td, l, ld) in edges {
                map.assign(Label::new(format!("w{t}"), td), Label::new(format!("w{l}"), ld));
            }
            let report = validate_synonyms(&map, 4);
            prop_assert!(!has(&report, Severity::Critical), "{}", report);
            prop_assert!(report.is_healthy(), "{}", report);
        }
    }
}

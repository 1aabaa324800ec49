//! Ontology construction over labeled terms.
//!
//! ```text
//! Level 3:             ¶¶¶food
//!                     /       \
//! Level 2:      ¶¶fruit        ¶¶vegetable
//!               /     \            |
//! Level 1:  ¶apple  ¶cherry      ¶beet
//!            / \       |          /  \
//! Level 0: apple apples cherry  beet beets
//! ```
//!
//! Level 1 comes from term clustering. [`OntologyBuilder`] adds the levels
//! above it by clustering mean vectors of the level below, the way a RAPTOR
//! tree recursively clusters summaries. [`validate_synonyms`] checks that a
//! map (built or loaded) still has the shape the builder guarantees.

mod ontology;
mod validate;

pub use ontology::{OntologyBuilder, OntologyStats};
pub use validate::{
    ontology_health, validate_synonyms, HealthReport, Severity, ValidationIssue, ValidationReport,
};

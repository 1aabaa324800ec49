//! Term and canonical-label record.

use core::fmt;
use serde::{Deserialize, Serialize};

/// Marker used in the text form of parent labels, repeated once per level.
pub const DEPTH_MARKER: char = '¶';

/// Escape written before a name that itself starts with [`DEPTH_MARKER`]
/// or with this character.
pub const NAME_ESCAPE: char = '\\';

/// Separator joining the tokens of a compound term.
pub const COMPOUND_SEPARATOR: char = '_';

/// A term or canonical label with an explicit ontology depth.
///
/// Depth 0 is a leaf term as observed in the input. A parent created from a
/// member `m` has the same name and depth `m.depth + 1`. The text form
/// (`"¶¶name"` for depth 2) is only used for display and persistence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct Label {
    depth: u8,
    name: String,
}

impl Label {
    /// A leaf term.
    pub fn leaf(name: impl Into<String>) -> Self {
        Self {
            depth: 0,
            name: name.into(),
        }
    }

    /// A label at an explicit depth.
    pub fn new(name: impl Into<String>, depth: u8) -> Self {
        Self {
            depth,
            name: name.into(),
        }
    }

    /// Parse the marker-prefixed text form written by `Display`.
    pub fn parse(text: &str) -> Self {
        let mut depth: u8 = 0;
        let mut rest = text;
        while depth < u8::MAX {
            match rest.strip_prefix(DEPTH_MARKER) {
                Some(tail) => {
                    rest = tail;
                    depth += 1;
                }
                None => break,
            }
        }
        let name = rest.strip_prefix(NAME_ESCAPE).unwrap_or(rest);
        Self::new(name, depth)
    }

    /// Bare name without depth markers.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ontology level (0 = leaf).
    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// True for labels created by clustering (depth ≥ 1).
    pub fn is_parent(&self) -> bool {
        self.depth > 0
    }

    /// The label one level above this one, named after it.
    pub fn parent(&self) -> Self {
        Self::new(self.name.clone(), self.depth.saturating_add(1))
    }

    /// Leaf term made of several tokens joined by [`COMPOUND_SEPARATOR`].
    pub fn is_compound(&self) -> bool {
        self.depth == 0 && self.name.contains(COMPOUND_SEPARATOR)
    }

    /// First character is uppercase (proper-noun-like surface form).
    pub fn starts_upper(&self) -> bool {
        self.name.chars().next().is_some_and(char::is_uppercase)
    }

    /// First character is not uppercase (digits and symbols count as lower).
    pub fn starts_lower(&self) -> bool {
        self.name.chars().next().is_some_and(|c| !c.is_uppercase())
    }

    /// Surface text handed to an embedder: separators become spaces.
    pub fn surface(&self) -> String {
        self.name.replace(COMPOUND_SEPARATOR, " ")
    }

    /// Character length of the name, the fallback ranking key.
    pub fn char_len(&self) -> usize {
        self.name.chars().count()
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for _ in 0..self.depth {
            write!(f, "{DEPTH_MARKER}")?;
        }
        if self.name.starts_with([DEPTH_MARKER, NAME_ESCAPE]) {
            write!(f, "{NAME_ESCAPE}")?;
        }
        write!(f, "{}", self.name)
    }
}

impl From<Label> for String {
    fn from(label: Label) -> Self {
        label.to_string()
    }
}

impl From<String> for Label {
    fn from(text: String) -> Self {
        Label::parse(&text)
    }
}

impl From<&str> for Label {
    fn from(text: &str) -> Self {
        Label::parse(text)
    }
}

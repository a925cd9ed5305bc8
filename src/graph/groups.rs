use std::ops::RangeInclusive;

use petgraph::graph::{EdgeIndex, NodeIndex};

use super::{Flavor, MoleculeGraph};
use crate::geometry::Vec3;

/// Largest occurrence count an R-group can be asked for.
pub const MAX_OCCURRENCE: u32 = 0xFFFF;

/// The set of fragments that may replace an R-site.
#[derive(Debug, Clone, Default)]
pub struct RGroup<F: Flavor> {
    /// R-group that must be present for this one to be used.
    pub if_then: u32,
    /// Unmatched R-sites are hydrogen only.
    pub rest_h: bool,
    pub occurrence: Vec<RangeInclusive<u32>>,
    pub fragments: Vec<MoleculeGraph<F>>,
}

impl<F: Flavor> RGroup<F> {
    /// Parses an occurrence list such as `1-3,>5,<2,4`.
    ///
    /// `>n` allows more than `n` and `<n` allows fewer than `n`.
    pub fn parse_occurrence(text: &str) -> Option<Vec<RangeInclusive<u32>>> {
        let mut ranges = vec![];
        for item in text.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let range = if let Some(rest) = item.strip_prefix('>') {
                rest.trim().parse::<u32>().ok()?.checked_add(1)?..=MAX_OCCURRENCE
            } else if let Some(rest) = item.strip_prefix('<') {
                0..=rest.trim().parse::<u32>().ok()?.checked_sub(1)?
            } else if let Some((lo, hi)) = item.split_once('-') {
                lo.trim().parse().ok()?..=hi.trim().parse().ok()?
            } else {
                let n = item.parse().ok()?;
                n..=n
            };
            ranges.push(range);
        }
        Some(ranges)
    }

    /// Occurrence ranges with the default filled in.
    pub fn effective_occurrence(&self) -> Vec<RangeInclusive<u32>> {
        if self.occurrence.is_empty() && !self.fragments.is_empty() {
            vec![1..=MAX_OCCURRENCE]
        } else {
            self.occurrence.clone()
        }
    }

    pub fn occurrence_allows(&self, count: u32) -> bool {
        self.effective_occurrence().iter().any(|r| r.contains(&count))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SGroupKind {
    Generic,
    Superatom,
    Multiple,
    RepeatUnit,
    Data,
    /// Any other Molfile `STY` code, kept verbatim.
    Other(String),
}

impl SGroupKind {
    pub fn from_code(code: &str) -> Self {
        match code {
            "GEN" => SGroupKind::Generic,
            "SUP" => SGroupKind::Superatom,
            "MUL" => SGroupKind::Multiple,
            "SRU" => SGroupKind::RepeatUnit,
            "DAT" => SGroupKind::Data,
            other => SGroupKind::Other(other.to_owned()),
        }
    }
}

/// Head-to-head, head-to-tail or either-unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Connectivity {
    HeadToHead,
    #[default]
    HeadToTail,
    EitherUnknown,
}

impl Connectivity {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "HH" => Some(Connectivity::HeadToHead),
            "HT" => Some(Connectivity::HeadToTail),
            "EU" => Some(Connectivity::EitherUnknown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataField {
    pub name: String,
    pub value: String,
    pub display: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuperatomAttachment {
    pub atom: NodeIndex,
    pub leaving: Option<NodeIndex>,
}

/// A substructure group annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct SGroup {
    pub kind: SGroupKind,
    /// Number used for this group in the input file.
    pub original_id: u32,
    /// Position of the parent group in [`MoleculeGraph::sgroups`].
    pub parent: Option<usize>,
    pub atoms: Vec<NodeIndex>,
    pub bonds: Vec<EdgeIndex>,
    /// Bracket end points, two per bracket.
    pub brackets: Vec<[Vec3; 2]>,
    pub subtype: String,
    pub label: String,
    pub connectivity: Connectivity,
    pub subscript: String,
    pub multiplier: u32,
    /// Atoms of the repeated unit in a multiple group.
    pub parent_atoms: Vec<NodeIndex>,
    pub class: String,
    pub data: DataField,
    pub attachments: Vec<SuperatomAttachment>,
    /// Crossing-bond display vectors of a superatom.
    pub bond_vectors: Vec<(EdgeIndex, Vec3)>,
    /// Superatom shown expanded.
    pub expanded: bool,
}

impl SGroup {
    pub fn new(kind: SGroupKind, original_id: u32) -> Self {
        Self {
            kind,
            original_id,
            parent: None,
            atoms: vec![],
            bonds: vec![],
            brackets: vec![],
            subtype: String::new(),
            label: String::new(),
            connectivity: Connectivity::default(),
            subscript: String::new(),
            multiplier: 1,
            parent_atoms: vec![],
            class: String::new(),
            data: DataField::default(),
            attachments: vec![],
            bond_vectors: vec![],
            expanded: false,
        }
    }
}

/// A named fragment that template atoms refer to.
#[derive(Debug, Clone)]
pub struct Template<F: Flavor> {
    pub id: u32,
    pub class: String,
    pub name: String,
    pub molecule: MoleculeGraph<F>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Query;

    #[test]
    fn test_occurrence_parsing() {
        let ranges = RGroup::<Query>::parse_occurrence("1-3,>5,<2,4").unwrap();
        assert_eq!(ranges, vec![1..=3, 6..=MAX_OCCURRENCE, 0..=1, 4..=4]);
        assert!(RGroup::<Query>::parse_occurrence("x").is_none());
        assert_eq!(RGroup::<Query>::parse_occurrence("").unwrap(), vec![]);
    }

    #[test]
    fn test_default_occurrence() {
        let mut group = RGroup::<Query>::default();
        assert!(!group.occurrence_allows(1));
        group.fragments.push(MoleculeGraph::new());
        assert!(group.occurrence_allows(1));
        assert!(!group.occurrence_allows(0));
    }
}

use petgraph::graph::NodeIndex;

use super::{Flavor, GraphError, StereoKind};
use crate::element::{Radical, ATTACHMENT_POINT, ELEMENTS, PSEUDO, RSITE, TEMPLATE};
use crate::geometry::Vec3;
use crate::query::{AtomConstraint, AtomLeaf};

/// What an atom stands for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AtomKind {
    Element(u8),
    Pseudo(String),
    RSite,
    Template(String),
    AttachmentPoint,
    /// A query atom that is not pinned to a single element.
    Query,
}

impl AtomKind {
    /// Position in the element table, pseudo-kinds included.
    pub fn table_number(&self) -> Option<u8> {
        match self {
            AtomKind::Element(n) => Some(*n),
            AtomKind::Pseudo(_) => Some(PSEUDO),
            AtomKind::RSite => Some(RSITE),
            AtomKind::Template(_) => Some(TEMPLATE),
            AtomKind::AttachmentPoint => Some(ATTACHMENT_POINT),
            AtomKind::Query => None,
        }
    }

    pub fn label(&self) -> String {
        match self {
            AtomKind::Element(n) => ELEMENTS.number_to_symbol(*n).unwrap_or("?").to_owned(),
            AtomKind::Pseudo(label) | AtomKind::Template(label) => label.clone(),
            AtomKind::RSite => "R#".to_owned(),
            AtomKind::AttachmentPoint => "AP".to_owned(),
            AtomKind::Query => "*".to_owned(),
        }
    }
}

/// Enhanced-stereo label requested for an atom by the input, before
/// perception decides whether the atom really is a stereocenter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StereoGroup {
    pub kind: StereoKind,
    pub number: u32,
}

impl StereoGroup {
    pub fn new(kind: StereoKind, number: u32) -> Self {
        Self { kind, number }
    }
}

/// A SMILES `@` / `@@` mark with the neighbours in the order they were
/// written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmilesChirality {
    /// `@@`
    pub clockwise: bool,
    /// The atom this one was reached from, if any.
    pub parent: Option<NodeIndex>,
    /// Every neighbour in written order, ring closures in digit position.
    pub neighbors: Vec<NodeIndex>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Atom<F: Flavor> {
    pub kind: AtomKind,
    pub charge: i32,
    /// Mass number, `0` for natural abundance.
    pub isotope: u16,
    pub radical: Radical,
    pub aromatic: bool,
    pub explicit_valence: Option<i32>,
    pub implicit_h: Option<u32>,
    pub position: Vec3,
    /// Bit `n - 1` set when R-group `n` may substitute this R-site.
    pub rsite_bits: u32,
    /// Neighbours of an R-site in attachment order.
    pub attachment_order: Vec<NodeIndex>,
    /// R-group fragment attachment points, bit 0 first, bit 1 second.
    pub attachment_points: u8,
    /// Reaction atom-atom mapping or SMILES atom class.
    pub mapping: u32,
    pub inversion: i32,
    pub exact_change: bool,
    pub stereo_care: bool,
    pub alias: Option<String>,
    /// Free text attached to the atom by a Molfile `V` line.
    pub value: Option<String>,
    /// SMARTS component-level group, `0` when ungrouped.
    pub component: u32,
    pub template_class: Option<String>,
    pub sequence_id: Option<i32>,
    pub stereo_group: Option<StereoGroup>,
    pub smiles_chirality: Option<SmilesChirality>,
    pub query: F::AtomQuery,
}

impl<F: Flavor> Atom<F> {
    pub fn new(kind: AtomKind) -> Self {
        let query = F::kind_query(&kind);
        Self {
            kind,
            charge: 0,
            isotope: 0,
            radical: Radical::None,
            aromatic: false,
            explicit_valence: None,
            implicit_h: None,
            position: Vec3::default(),
            rsite_bits: 0,
            attachment_order: vec![],
            attachment_points: 0,
            mapping: 0,
            inversion: 0,
            exact_change: false,
            stereo_care: false,
            alias: None,
            value: None,
            component: 0,
            template_class: None,
            sequence_id: None,
            stereo_group: None,
            smiles_chirality: None,
            query,
        }
    }

    pub fn element(number: u8) -> Self {
        Self::new(AtomKind::Element(number))
    }

    /// Adds one more predicate. On a concrete atom this stores the value
    /// and fails for predicates that only make sense in a query.
    pub fn constrain(&mut self, leaf: AtomLeaf) -> Result<(), GraphError> {
        F::constrain_atom(self, leaf.into())
    }

    pub fn attach(&mut self, tree: AtomConstraint) -> Result<(), GraphError> {
        F::constrain_atom(self, tree)
    }

    /// Like [`constrain`](Self::constrain) but drops earlier predicates of
    /// the same kind first.
    pub fn replace(&mut self, leaf: AtomLeaf) -> Result<(), GraphError> {
        F::replace_atom_leaf(self, leaf)
    }

    pub fn constraint(&self) -> Option<&AtomConstraint> {
        F::atom_constraint(self)
    }

    pub fn number(&self) -> Option<u8> {
        match self.kind {
            AtomKind::Element(n) => Some(n),
            _ => None,
        }
    }

    pub fn is_rsite(&self) -> bool {
        self.kind == AtomKind::RSite
    }

    pub fn is_pseudo(&self) -> bool {
        matches!(self.kind, AtomKind::Pseudo(_))
    }

    pub fn allow_rgroup(&mut self, rgroup: u32) {
        if (1..=32).contains(&rgroup) {
            self.rsite_bits |= 1 << (rgroup - 1);
        }
    }

    /// R-group numbers allowed on this R-site, ascending.
    pub fn allowed_rgroups(&self) -> Vec<u32> {
        (1..=32).filter(|n| self.rsite_bits & (1 << (n - 1)) != 0).collect()
    }

    pub fn possible_number(&self, number: u8) -> bool {
        match self.constraint() {
            Some(tree) => tree.possible_number(number),
            None => self.number() == Some(number),
        }
    }

    pub fn possible_number_and_charge(&self, number: u8, charge: i32) -> bool {
        match self.constraint() {
            Some(tree) => tree.possible(&|leaf| match leaf {
                AtomLeaf::Number(n) => Some(*n == number),
                AtomLeaf::Charge(c) => Some(*c == charge),
                AtomLeaf::Pseudo(_) | AtomLeaf::RSite(_) | AtomLeaf::Template(_) => Some(false),
                _ => None,
            }),
            None => self.number() == Some(number) && self.charge == charge,
        }
    }

    pub fn possible_isotope(&self, isotope: u16) -> bool {
        match self.constraint() {
            Some(tree) => tree.possible(&|leaf| match leaf {
                AtomLeaf::Isotope(i) => Some(*i == isotope),
                _ => None,
            }),
            None => self.isotope == isotope,
        }
    }

    /// Hydrogen without a fixed non-natural isotope.
    pub fn is_pure_hydrogen(&self) -> bool {
        self.number() == Some(crate::element::H) && self.possible_isotope(0)
    }

    /// Hydrogen of any isotope could sit here.
    pub fn possible_hydrogen(&self) -> bool {
        self.possible_number(crate::element::H) && self.possible_isotope(0)
    }
}

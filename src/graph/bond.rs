use petgraph::graph::NodeIndex;

use super::{Flavor, GraphError};
use crate::query::{BondConstraint, BondLeaf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BondOrder {
    Zero,
    Single,
    Double,
    Triple,
    Aromatic,
    Coordination,
    Hydrogen,
    /// A query bond whose order is not pinned.
    Query,
}

impl BondOrder {
    /// Molfile bond type codes that describe a concrete order.
    pub fn from_molfile(code: i32) -> Option<Self> {
        match code {
            1 => Some(BondOrder::Single),
            2 => Some(BondOrder::Double),
            3 => Some(BondOrder::Triple),
            4 => Some(BondOrder::Aromatic),
            9 => Some(BondOrder::Coordination),
            10 => Some(BondOrder::Hydrogen),
            _ => None,
        }
    }

    /// Contribution to the drawn connectivity used for valence checks.
    pub fn valence(self) -> i32 {
        match self {
            BondOrder::Single | BondOrder::Aromatic => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
            BondOrder::Zero | BondOrder::Coordination | BondOrder::Hydrogen | BondOrder::Query => 0,
        }
    }
}

/// Wedge drawn on a bond, read from its first atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BondDirection {
    #[default]
    None,
    Up,
    Down,
    Either,
}

/// SMILES `/` or `\`, relative to the stored atom order of the bond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DirectionalMark {
    #[default]
    None,
    Slash,
    Backslash,
}

impl DirectionalMark {
    pub fn flipped(self) -> Self {
        match self {
            DirectionalMark::Slash => DirectionalMark::Backslash,
            DirectionalMark::Backslash => DirectionalMark::Slash,
            DirectionalMark::None => DirectionalMark::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    Ring,
    Chain,
}

/// How a multi-center bond meets its end point atoms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MultiAttach {
    All,
    Any,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bond<F: Flavor> {
    pub order: BondOrder,
    pub direction: BondDirection,
    pub mark: DirectionalMark,
    /// Filled in by [`MoleculeGraph::update_topology`](super::MoleculeGraph::update_topology).
    pub topology: Option<Topology>,
    pub reacting_center: i32,
    pub stereo_care: bool,
    /// Cis/trans configuration drawn as unknown.
    pub ignore_cis_trans: bool,
    /// End point atoms of a multi-center bond.
    pub endpoints: Vec<NodeIndex>,
    pub multi_attach: Option<MultiAttach>,
    pub query: F::BondQuery,
}

impl<F: Flavor> Bond<F> {
    pub fn new(order: BondOrder) -> Self {
        Self {
            order,
            direction: BondDirection::None,
            mark: DirectionalMark::None,
            topology: None,
            reacting_center: 0,
            stereo_care: false,
            ignore_cis_trans: false,
            endpoints: vec![],
            multi_attach: None,
            query: F::order_query(order),
        }
    }

    pub fn constrain(&mut self, leaf: BondLeaf) -> Result<(), GraphError> {
        F::constrain_bond(self, leaf.into())
    }

    pub fn attach(&mut self, tree: BondConstraint) -> Result<(), GraphError> {
        F::constrain_bond(self, tree)
    }

    pub fn constraint(&self) -> Option<&BondConstraint> {
        F::bond_constraint(self)
    }

    pub fn possible_order(&self, order: BondOrder) -> bool {
        match self.constraint() {
            Some(tree) => tree.possible(&|leaf| match leaf {
                BondLeaf::Order(o) => Some(*o == order),
                BondLeaf::Topology(_) => None,
            }),
            None => self.order == order,
        }
    }
}

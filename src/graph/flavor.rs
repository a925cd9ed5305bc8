use std::fmt::Debug;
use std::mem::take;

use super::{Atom, AtomKind, Bond, BondOrder, GraphError};
use crate::query::{AtomConstraint, AtomLeaf, BondConstraint, BondLeaf, Constraint};

/// Selects what a [`MoleculeGraph`](super::MoleculeGraph) stores per atom
/// and bond: plain values, or values plus a constraint tree.
pub trait Flavor: Debug + Clone + Copy + Default + PartialEq + 'static {
    type AtomQuery: Debug + Clone + PartialEq + Default;
    type BondQuery: Debug + Clone + PartialEq + Default;

    const IS_QUERY: bool;

    /// Starting query for a freshly created atom of `kind`.
    fn kind_query(kind: &AtomKind) -> Self::AtomQuery;
    fn order_query(order: BondOrder) -> Self::BondQuery;

    fn constrain_atom(atom: &mut Atom<Self>, tree: AtomConstraint) -> Result<(), GraphError>;
    fn replace_atom_leaf(atom: &mut Atom<Self>, leaf: AtomLeaf) -> Result<(), GraphError>;
    fn constrain_bond(bond: &mut Bond<Self>, tree: BondConstraint) -> Result<(), GraphError>;

    fn atom_constraint(atom: &Atom<Self>) -> Option<&AtomConstraint>;
    fn bond_constraint(bond: &Bond<Self>) -> Option<&BondConstraint>;
}

/// Plain molecules. Only pure conjunctions of concrete predicates can be
/// attached and they are stored straight into the atom fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Concrete;

/// Query molecules. Every atom and bond carries a constraint tree and the
/// plain fields mirror whatever value the tree pins down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Query;

fn query_only(what: impl Debug) -> GraphError {
    GraphError::QueryOnly(format!("{what:?}"))
}

fn store_concrete(atom: &mut Atom<Concrete>, leaf: AtomLeaf) -> Result<(), GraphError> {
    match leaf {
        AtomLeaf::Number(n) => atom.kind = AtomKind::Element(n),
        AtomLeaf::Pseudo(label) => atom.kind = AtomKind::Pseudo(label),
        AtomLeaf::RSite(bits) => {
            atom.kind = AtomKind::RSite;
            atom.rsite_bits |= bits;
        }
        AtomLeaf::Template(name) => atom.kind = AtomKind::Template(name),
        AtomLeaf::Charge(c) => atom.charge = c,
        AtomLeaf::Isotope(i) => atom.isotope = i,
        AtomLeaf::Radical(r) => atom.radical = r,
        AtomLeaf::Valence(v) => atom.explicit_valence = Some(v),
        AtomLeaf::TotalH(range) if range.start() == range.end() && *range.start() >= 0 => {
            atom.implicit_h = Some(*range.start() as u32)
        }
        AtomLeaf::Aromatic(flag) => atom.aromatic = flag,
        other => return Err(query_only(other)),
    }
    Ok(())
}

impl Flavor for Concrete {
    type AtomQuery = ();
    type BondQuery = ();

    const IS_QUERY: bool = false;

    fn kind_query(_: &AtomKind) {}
    fn order_query(_: BondOrder) {}

    fn constrain_atom(atom: &mut Atom<Self>, tree: AtomConstraint) -> Result<(), GraphError> {
        match tree {
            Constraint::Leaf(leaf) => store_concrete(atom, leaf),
            Constraint::And(children) => {
                for child in children {
                    Self::constrain_atom(atom, child)?;
                }
                Ok(())
            }
            other => Err(query_only(other)),
        }
    }

    fn replace_atom_leaf(atom: &mut Atom<Self>, leaf: AtomLeaf) -> Result<(), GraphError> {
        store_concrete(atom, leaf)
    }

    fn constrain_bond(bond: &mut Bond<Self>, tree: BondConstraint) -> Result<(), GraphError> {
        match tree {
            Constraint::Leaf(BondLeaf::Order(order)) => {
                bond.order = order;
                Ok(())
            }
            Constraint::And(children) => {
                for child in children {
                    Self::constrain_bond(bond, child)?;
                }
                Ok(())
            }
            other => Err(query_only(other)),
        }
    }

    fn atom_constraint(_: &Atom<Self>) -> Option<&AtomConstraint> {
        None
    }

    fn bond_constraint(_: &Bond<Self>) -> Option<&BondConstraint> {
        None
    }
}

/// Re-derives the mirror fields of a query atom from its tree.
fn refresh_atom(atom: &mut Atom<Query>) {
    let tree = &atom.query;
    let pseudo = tree.pinned(&|leaf| match leaf {
        AtomLeaf::Pseudo(label) => Some(label.clone()),
        _ => None,
    });
    let template = tree.pinned(&|leaf| match leaf {
        AtomLeaf::Template(name) => Some(name.clone()),
        _ => None,
    });
    let rsite = tree.pinned(&|leaf| match leaf {
        AtomLeaf::RSite(bits) => Some(*bits),
        _ => None,
    });

    if atom.kind != AtomKind::AttachmentPoint {
        atom.kind = if let Some(n) = tree.pinned_number() {
            AtomKind::Element(n)
        } else if let Some(label) = pseudo {
            AtomKind::Pseudo(label)
        } else if let Some(name) = template {
            AtomKind::Template(name)
        } else if rsite.is_some() {
            AtomKind::RSite
        } else {
            AtomKind::Query
        };
    }
    if let Some(bits) = rsite {
        atom.rsite_bits |= bits;
    }

    atom.charge = tree
        .pinned(&|leaf| match leaf {
            AtomLeaf::Charge(c) => Some(*c),
            _ => None,
        })
        .unwrap_or(0);
    atom.isotope = tree
        .pinned(&|leaf| match leaf {
            AtomLeaf::Isotope(i) => Some(*i),
            _ => None,
        })
        .unwrap_or(0);
    atom.radical = tree
        .pinned(&|leaf| match leaf {
            AtomLeaf::Radical(r) => Some(*r),
            _ => None,
        })
        .unwrap_or_default();
    atom.explicit_valence = tree.pinned(&|leaf| match leaf {
        AtomLeaf::Valence(v) => Some(*v),
        _ => None,
    });
    atom.aromatic = tree.pinned(&|leaf| match leaf {
        AtomLeaf::Aromatic(flag) => Some(*flag),
        _ => None,
    }) == Some(true);
}

impl Flavor for Query {
    type AtomQuery = AtomConstraint;
    type BondQuery = BondConstraint;

    const IS_QUERY: bool = true;

    fn kind_query(kind: &AtomKind) -> AtomConstraint {
        match kind {
            AtomKind::Element(n) => AtomLeaf::Number(*n).into(),
            AtomKind::Pseudo(label) => AtomLeaf::Pseudo(label.clone()).into(),
            AtomKind::Template(name) => AtomLeaf::Template(name.clone()).into(),
            AtomKind::RSite => AtomLeaf::RSite(0).into(),
            AtomKind::AttachmentPoint | AtomKind::Query => AtomConstraint::any(),
        }
    }

    fn order_query(order: BondOrder) -> BondConstraint {
        match order {
            BondOrder::Query => BondConstraint::any(),
            order => BondLeaf::Order(order).into(),
        }
    }

    fn constrain_atom(atom: &mut Atom<Self>, tree: AtomConstraint) -> Result<(), GraphError> {
        atom.query = take(&mut atom.query).and(tree);
        refresh_atom(atom);
        Ok(())
    }

    fn replace_atom_leaf(atom: &mut Atom<Self>, leaf: AtomLeaf) -> Result<(), GraphError> {
        atom.query = take(&mut atom.query).without_kind(&leaf).and(leaf);
        refresh_atom(atom);
        Ok(())
    }

    fn constrain_bond(bond: &mut Bond<Self>, tree: BondConstraint) -> Result<(), GraphError> {
        bond.query = take(&mut bond.query).and(tree);
        bond.order = bond
            .query
            .pinned(&|leaf| match leaf {
                BondLeaf::Order(order) => Some(*order),
                BondLeaf::Topology(_) => None,
            })
            .unwrap_or(BondOrder::Query);
        Ok(())
    }

    fn atom_constraint(atom: &Atom<Self>) -> Option<&AtomConstraint> {
        Some(&atom.query)
    }

    fn bond_constraint(bond: &Bond<Self>) -> Option<&BondConstraint> {
        Some(&bond.query)
    }
}

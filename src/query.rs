//! Boolean constraint trees attached to query atoms and bonds.

use std::mem::discriminant;
use std::ops::RangeInclusive;

use crate::element::Radical;
use crate::graph::{BondOrder, Topology};

/// A tree of leaf predicates joined by AND, OR and NOT.
///
/// An empty `And` matches everything and is the [`Default`].
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint<L> {
    Leaf(L),
    And(Vec<Constraint<L>>),
    Or(Vec<Constraint<L>>),
    Not(Box<Constraint<L>>),
}

impl<L> Default for Constraint<L> {
    fn default() -> Self {
        Constraint::And(vec![])
    }
}

impl<L> From<L> for Constraint<L> {
    fn from(leaf: L) -> Self {
        Constraint::Leaf(leaf)
    }
}

/// Upper bound used for open ranges such as "two or more".
pub const OPEN_END: i32 = 100;

impl<L: Clone + PartialEq> Constraint<L> {
    /// Matches anything.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Constraint::And(children) if children.is_empty())
    }

    /// Consumes the tree and returns it with `other` AND-ed on.
    ///
    /// Nested `And` nodes are flattened so repeated augmentation keeps the
    /// tree one level deep.
    pub fn and(self, other: impl Into<Constraint<L>>) -> Self {
        let other = other.into();
        match (self, other) {
            (lhs, rhs) if rhs.is_any() => lhs,
            (lhs, rhs) if lhs.is_any() => rhs,
            (Constraint::And(mut lhs), Constraint::And(rhs)) => {
                lhs.extend(rhs);
                Constraint::And(lhs)
            }
            (Constraint::And(mut lhs), rhs) => {
                lhs.push(rhs);
                Constraint::And(lhs)
            }
            (lhs, rhs) => Constraint::And(vec![lhs, rhs]),
        }
    }

    pub fn or(self, other: impl Into<Constraint<L>>) -> Self {
        let other = other.into();
        match (self, other) {
            (Constraint::Or(mut lhs), Constraint::Or(rhs)) => {
                lhs.extend(rhs);
                Constraint::Or(lhs)
            }
            (Constraint::Or(mut lhs), rhs) => {
                lhs.push(rhs);
                Constraint::Or(lhs)
            }
            (lhs, rhs) => Constraint::Or(vec![lhs, rhs]),
        }
    }

    pub fn negate(self) -> Self {
        match self {
            Constraint::Not(inner) => *inner,
            other => Constraint::Not(Box::new(other)),
        }
    }

    pub fn any_of(leaves: impl IntoIterator<Item = L>) -> Self {
        let mut children: Vec<Self> = leaves.into_iter().map(Constraint::Leaf).collect();
        if children.len() == 1 {
            children.remove(0)
        } else {
            Constraint::Or(children)
        }
    }

    /// Drops every top-level AND member that is a leaf of the same kind as
    /// `like`. Used before replacing a value, e.g. a charge read twice.
    pub fn without_kind(self, like: &L) -> Self {
        let kind = discriminant(like);
        match self {
            Constraint::Leaf(leaf) if discriminant(&leaf) == kind => Self::any(),
            Constraint::And(children) => Constraint::And(
                children
                    .into_iter()
                    .filter(|child| !matches!(child, Constraint::Leaf(leaf) if discriminant(leaf) == kind))
                    .collect(),
            ),
            other => other,
        }
    }

    /// Iterates over every leaf, whatever combinator it sits under.
    pub fn leaves(&self) -> Vec<&L> {
        let mut out = vec![];
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a L>) {
        match self {
            Constraint::Leaf(leaf) => out.push(leaf),
            Constraint::And(children) | Constraint::Or(children) => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
            Constraint::Not(inner) => inner.collect_leaves(out),
        }
    }

    pub fn mentions(&self, leaf: &L) -> bool {
        self.leaves().into_iter().any(|l| l == leaf)
    }

    /// Whether some object could satisfy the tree, given a verdict per leaf.
    /// A verdict of `None` means the leaf says nothing about the question
    /// and is assumed satisfiable.
    pub fn possible(&self, verdict: &impl Fn(&L) -> Option<bool>) -> bool {
        match self {
            Constraint::Leaf(leaf) => verdict(leaf).unwrap_or(true),
            Constraint::And(children) => children.iter().all(|c| c.possible(verdict)),
            Constraint::Or(children) => children.iter().any(|c| c.possible(verdict)),
            Constraint::Not(inner) => !inner.certain(verdict),
        }
    }

    /// Whether every object consistent with the verdicts satisfies the tree.
    pub fn certain(&self, verdict: &impl Fn(&L) -> Option<bool>) -> bool {
        match self {
            Constraint::Leaf(leaf) => verdict(leaf).unwrap_or(false),
            Constraint::And(children) => children.iter().all(|c| c.certain(verdict)),
            Constraint::Or(children) => children.iter().any(|c| c.certain(verdict)),
            Constraint::Not(inner) => !inner.possible(verdict),
        }
    }

    /// The single value the tree pins down through `extract`, if any.
    ///
    /// An AND pins a value when one of its members does; an OR only when
    /// all of its members pin the same value. NOT never pins.
    pub fn pinned<T: PartialEq>(&self, extract: &impl Fn(&L) -> Option<T>) -> Option<T> {
        match self {
            Constraint::Leaf(leaf) => extract(leaf),
            Constraint::And(children) => children.iter().find_map(|c| c.pinned(extract)),
            Constraint::Or(children) => {
                let mut values = children.iter().map(|c| c.pinned(extract));
                let first = values.next()??;
                for value in values {
                    if value.as_ref() != Some(&first) {
                        return None;
                    }
                }
                Some(first)
            }
            Constraint::Not(_) => None,
        }
    }
}

/// Atom predicates.
#[derive(Debug, Clone, PartialEq)]
pub enum AtomLeaf {
    Number(u8),
    Pseudo(String),
    /// Bitmask of R-group numbers that may substitute here.
    RSite(u32),
    Template(String),
    Charge(i32),
    Isotope(u16),
    Radical(Radical),
    /// Explicit valence as stored in a Molfile.
    Valence(i32),
    /// Sum of bond orders (SMARTS `v`).
    TotalBondOrder(i32),
    /// Explicit connections (SMARTS `D`, Molfile SUB).
    Substituents(RangeInclusive<i32>),
    /// Total connections including hydrogens (SMARTS `X`).
    Connectivity(i32),
    TotalH(RangeInclusive<i32>),
    /// Implicit hydrogens only (SMARTS `h`).
    ImplicitH(RangeInclusive<i32>),
    RingBonds(RangeInclusive<i32>),
    SssrRings(i32),
    SmallestRingSize(i32),
    Unsaturated,
    Aromatic(bool),
    /// Recursive SMARTS `$(...)`, kept as validated source text.
    Fragment(String),
}

impl AtomLeaf {
    pub fn substituents(n: i32) -> Self {
        AtomLeaf::Substituents(n..=n)
    }

    pub fn total_h(n: i32) -> Self {
        AtomLeaf::TotalH(n..=n)
    }

    pub fn ring_bonds(n: i32) -> Self {
        AtomLeaf::RingBonds(n..=n)
    }

    /// Concrete attributes can be stored on a plain molecule; everything
    /// else only makes sense as a search predicate.
    pub fn is_concrete(&self) -> bool {
        matches!(
            self,
            AtomLeaf::Number(_)
                | AtomLeaf::Pseudo(_)
                | AtomLeaf::RSite(_)
                | AtomLeaf::Template(_)
                | AtomLeaf::Charge(_)
                | AtomLeaf::Isotope(_)
                | AtomLeaf::Radical(_)
                | AtomLeaf::Valence(_)
        )
    }
}

/// Bond predicates.
#[derive(Debug, Clone, PartialEq)]
pub enum BondLeaf {
    Order(BondOrder),
    Topology(Topology),
}

pub type AtomConstraint = Constraint<AtomLeaf>;
pub type BondConstraint = Constraint<BondLeaf>;

impl BondConstraint {
    pub fn single_or_aromatic() -> Self {
        Self::any_of([BondLeaf::Order(BondOrder::Single), BondLeaf::Order(BondOrder::Aromatic)])
    }

    pub fn single_or_double() -> Self {
        Self::any_of([BondLeaf::Order(BondOrder::Single), BondLeaf::Order(BondOrder::Double)])
            .and(Constraint::Leaf(BondLeaf::Order(BondOrder::Aromatic)).negate())
    }

    pub fn double_or_aromatic() -> Self {
        Self::any_of([BondLeaf::Order(BondOrder::Double), BondLeaf::Order(BondOrder::Aromatic)])
    }
}

impl AtomConstraint {
    pub fn not_hydrogen() -> Self {
        Constraint::Leaf(AtomLeaf::Number(crate::element::H)).negate()
    }

    /// Molfile `Q`: neither hydrogen nor carbon.
    pub fn heteroatom() -> Self {
        Self::not_hydrogen().and(Constraint::Leaf(AtomLeaf::Number(crate::element::C)).negate())
    }

    /// Molfile `X`: any halogen.
    pub fn halogen() -> Self {
        use crate::element::{AT, BR, CL, F, I};
        Self::any_of([F, CL, BR, I, AT].into_iter().map(AtomLeaf::Number))
    }

    pub fn pinned_number(&self) -> Option<u8> {
        self.pinned(&|leaf| match leaf {
            AtomLeaf::Number(n) => Some(*n),
            _ => None,
        })
    }

    pub fn possible_number(&self, number: u8) -> bool {
        self.possible(&|leaf| match leaf {
            AtomLeaf::Number(n) => Some(*n == number),
            AtomLeaf::Pseudo(_) | AtomLeaf::RSite(_) | AtomLeaf::Template(_) => Some(false),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{C, N, O};

    #[test]
    fn test_and_flattens() {
        let tree = AtomConstraint::from(AtomLeaf::Number(C))
            .and(AtomLeaf::Charge(1))
            .and(AtomLeaf::Isotope(13));
        match &tree {
            Constraint::And(children) => assert_eq!(children.len(), 3),
            other => panic!("unexpected tree {other:?}"),
        }
        assert_eq!(AtomConstraint::any().and(AtomLeaf::Charge(0)), Constraint::Leaf(AtomLeaf::Charge(0)));
    }

    #[test]
    fn test_without_kind_replaces_value() {
        let tree = AtomConstraint::from(AtomLeaf::Number(N)).and(AtomLeaf::Charge(1));
        let tree = tree.without_kind(&AtomLeaf::Charge(0)).and(AtomLeaf::Charge(-1));
        assert!(tree.mentions(&AtomLeaf::Charge(-1)));
        assert!(!tree.mentions(&AtomLeaf::Charge(1)));
        assert_eq!(tree.pinned_number(), Some(N));
    }

    #[test]
    fn test_pinned_through_or() {
        let same = AtomConstraint::any_of([AtomLeaf::Number(C), AtomLeaf::Number(C)]);
        assert_eq!(same.pinned_number(), Some(C));
        let list = AtomConstraint::any_of([AtomLeaf::Number(C), AtomLeaf::Number(N)]);
        assert_eq!(list.pinned_number(), None);
        assert_eq!(list.clone().negate().pinned_number(), None);
    }

    #[test]
    fn test_three_valued_evaluation() {
        let list = AtomConstraint::any_of([AtomLeaf::Number(C), AtomLeaf::Number(N)]);
        assert!(list.possible_number(N));
        assert!(!list.possible_number(O));
        let not_list = list.negate();
        assert!(not_list.possible_number(O));
        assert!(!not_list.possible_number(C));
        // a charge leaf says nothing about the element
        let charged = AtomConstraint::from(AtomLeaf::Charge(1));
        assert!(charged.possible_number(O));
        assert!(AtomConstraint::not_hydrogen().possible_number(C));
        assert!(!AtomConstraint::heteroatom().possible_number(C));
    }

    #[test]
    fn test_bond_presets() {
        let tree = BondConstraint::single_or_double();
        let possible = |order: BondOrder| {
            tree.possible(&|leaf| match leaf {
                BondLeaf::Order(o) => Some(*o == order),
                _ => None,
            })
        };
        assert!(possible(BondOrder::Single));
        assert!(possible(BondOrder::Double));
        assert!(!possible(BondOrder::Aromatic));
        assert!(!possible(BondOrder::Triple));
    }
}

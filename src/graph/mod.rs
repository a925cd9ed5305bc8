//! The molecule graph shared by every loader.
//!
//! A [`MoleculeGraph`] is an undirected petgraph graph of [`Atom`]s and
//! [`Bond`]s plus the molecule-level tables that loaders fill in: stereo
//! perception results, R-groups, S-groups and templates. The [`Flavor`]
//! parameter decides whether atoms and bonds carry query constraint trees.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::ops::{Deref, Index, IndexMut};

use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use thiserror::Error;

mod atom;
mod bond;
mod dot;
mod flavor;
mod groups;

pub use atom::*;
pub use bond::*;
pub use flavor::*;
pub use groups::*;

use crate::element::ELEMENTS;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("{0} is allowed only for query molecules")]
    QueryOnly(String),
    #[error("no atom with index {0}")]
    NoSuchAtom(usize),
    #[error("no bond with index {0}")]
    NoSuchBond(usize),
    #[error("atoms {0} and {1} are already bonded")]
    DuplicateBond(usize, usize),
    #[error("atom {0} can not be bonded to itself")]
    SelfLoop(usize),
}

/// Enhanced stereo label of a stereocenter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StereoKind {
    /// Absolute configuration.
    Abs,
    /// Relative configuration shared with the rest of the group, the
    /// structure being a racemic mixture.
    And,
    /// Relative configuration shared with the rest of the group, the
    /// structure being one unknown enantiomer.
    Or,
    /// Configuration unknown.
    Any,
}

/// A tetrahedral center.
///
/// Looking from `pyramid[3]` towards the center, `pyramid[0..3]` go
/// counter-clockwise. A center with only three neighbours uses its own
/// index for the missing slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stereocenter {
    pub kind: StereoKind,
    pub group: u32,
    pub pyramid: [NodeIndex; 4],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CisTransParity {
    Cis,
    Trans,
    /// Drawn as unknown.
    Ignored,
}

/// A stereo double bond.
///
/// `substituents[0..2]` hang on the first atom of the bond and
/// `substituents[2..4]` on the second. The parity relates `[0]` and `[2]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CisTransBond {
    pub substituents: [Option<NodeIndex>; 4],
    pub parity: CisTransParity,
}

#[derive(Debug, Clone, Default)]
pub struct MoleculeGraph<F: Flavor> {
    graph: UnGraph<Atom<F>, Bond<F>>,
    pub name: String,
    pub properties: BTreeMap<String, String>,
    pub chiral_flag: bool,
    pub stereocenters: BTreeMap<NodeIndex, Stereocenter>,
    pub cis_trans: BTreeMap<EdgeIndex, CisTransBond>,
    pub rgroups: BTreeMap<u32, RGroup<F>>,
    pub sgroups: Vec<SGroup>,
    pub templates: Vec<Template<F>>,
}

pub type Molecule = MoleculeGraph<Concrete>;
pub type QueryMolecule = MoleculeGraph<Query>;

impl<F: Flavor> Deref for MoleculeGraph<F> {
    type Target = UnGraph<Atom<F>, Bond<F>>;

    fn deref(&self) -> &Self::Target {
        &self.graph
    }
}

impl<F: Flavor> Index<NodeIndex> for MoleculeGraph<F> {
    type Output = Atom<F>;

    fn index(&self, index: NodeIndex) -> &Atom<F> {
        &self.graph[index]
    }
}

impl<F: Flavor> IndexMut<NodeIndex> for MoleculeGraph<F> {
    fn index_mut(&mut self, index: NodeIndex) -> &mut Atom<F> {
        &mut self.graph[index]
    }
}

impl<F: Flavor> Index<EdgeIndex> for MoleculeGraph<F> {
    type Output = Bond<F>;

    fn index(&self, index: EdgeIndex) -> &Bond<F> {
        &self.graph[index]
    }
}

impl<F: Flavor> IndexMut<EdgeIndex> for MoleculeGraph<F> {
    fn index_mut(&mut self, index: EdgeIndex) -> &mut Bond<F> {
        &mut self.graph[index]
    }
}

impl<F: Flavor> MoleculeGraph<F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_query(&self) -> bool {
        F::IS_QUERY
    }

    pub fn atom_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn bond_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn add_atom(&mut self, atom: Atom<F>) -> NodeIndex {
        self.graph.add_node(atom)
    }

    pub fn add_bond(&mut self, a: NodeIndex, b: NodeIndex, bond: Bond<F>) -> Result<EdgeIndex, GraphError> {
        for node in [a, b] {
            if node.index() >= self.atom_count() {
                return Err(GraphError::NoSuchAtom(node.index()));
            }
        }
        if a == b {
            return Err(GraphError::SelfLoop(a.index()));
        }
        if self.graph.find_edge(a, b).is_some() {
            return Err(GraphError::DuplicateBond(a.index(), b.index()));
        }
        Ok(self.graph.add_edge(a, b, bond))
    }

    pub fn atom(&self, index: usize) -> Result<&Atom<F>, GraphError> {
        self.graph
            .node_weight(NodeIndex::new(index))
            .ok_or(GraphError::NoSuchAtom(index))
    }

    pub fn atom_mut(&mut self, index: usize) -> Result<&mut Atom<F>, GraphError> {
        self.graph
            .node_weight_mut(NodeIndex::new(index))
            .ok_or(GraphError::NoSuchAtom(index))
    }

    pub fn bond_mut(&mut self, index: usize) -> Result<&mut Bond<F>, GraphError> {
        self.graph
            .edge_weight_mut(EdgeIndex::new(index))
            .ok_or(GraphError::NoSuchBond(index))
    }

    /// The two atoms of a bond in the order they were given to
    /// [`add_bond`](Self::add_bond).
    pub fn endpoints(&self, bond: EdgeIndex) -> Result<(NodeIndex, NodeIndex), GraphError> {
        self.graph
            .edge_endpoints(bond)
            .ok_or(GraphError::NoSuchBond(bond.index()))
    }

    pub fn find_bond(&self, a: NodeIndex, b: NodeIndex) -> Option<EdgeIndex> {
        self.graph.find_edge(a, b)
    }

    /// Bonds of `node` with the atom on their other end, oldest bond first.
    pub fn incident(&self, node: NodeIndex) -> Vec<(EdgeIndex, NodeIndex)> {
        let mut out: Vec<_> = self
            .graph
            .edges(node)
            .map(|edge| {
                let other = if edge.source() == node { edge.target() } else { edge.source() };
                (edge.id(), other)
            })
            .collect();
        out.sort_by_key(|(edge, _)| *edge);
        out
    }

    pub fn degree(&self, node: NodeIndex) -> usize {
        self.graph.edges(node).count()
    }

    /// Sum of the drawn bond orders around `node`.
    pub fn connectivity(&self, node: NodeIndex) -> i32 {
        self.graph.edges(node).map(|edge| edge.weight().order.valence()).sum()
    }

    pub fn atoms(&self) -> impl Iterator<Item = (NodeIndex, &Atom<F>)> {
        self.graph
            .node_indices()
            .map(move |index| (index, &self.graph[index]))
    }

    /// Every bond as `(index, first atom, second atom, bond)`.
    pub fn bonds(&self) -> impl Iterator<Item = (EdgeIndex, NodeIndex, NodeIndex, &Bond<F>)> {
        self.graph
            .edge_references()
            .map(|edge| (edge.id(), edge.source(), edge.target(), edge.weight()))
    }

    pub fn possible_atom_number(&self, node: NodeIndex, number: u8) -> bool {
        self.graph[node].possible_number(number)
    }

    pub fn possible_bond_order(&self, bond: EdgeIndex, order: BondOrder) -> bool {
        self.graph[bond].possible_order(order)
    }

    /// Whether any atom has a non-zero z coordinate.
    pub fn has_3d_coordinates(&self) -> bool {
        self.graph.node_weights().any(|atom| atom.position.z.abs() > 1e-4)
    }

    /// Whether any two atoms are drawn apart.
    pub fn has_coordinates(&self) -> bool {
        self.graph.node_weights().any(|atom| atom.position.length() > 1e-4)
    }

    /// Bonds that lie on at least one cycle.
    pub fn ring_bonds(&self) -> HashSet<EdgeIndex> {
        let bridges = self.bridges();
        self.graph
            .edge_indices()
            .filter(|edge| !bridges.contains(edge))
            .collect()
    }

    /// Bonds whose removal disconnects their component, found with an
    /// iterative lowlink search.
    fn bridges(&self) -> HashSet<EdgeIndex> {
        const UNSEEN: usize = usize::MAX;
        let n = self.atom_count();
        let mut discovered = vec![UNSEEN; n];
        let mut low = vec![0; n];
        let mut timer = 0;
        let mut bridges = HashSet::new();

        for root in self.graph.node_indices() {
            if discovered[root.index()] != UNSEEN {
                continue;
            }
            discovered[root.index()] = timer;
            low[root.index()] = timer;
            timer += 1;

            // (atom, bond we came through, its bonds, next bond to visit)
            let mut stack = vec![(root, None, self.incident(root), 0)];
            while let Some((node, via, next)) = stack.last_mut().map(|frame| {
                let next = frame.2.get(frame.3).copied();
                frame.3 += 1;
                (frame.0, frame.1, next)
            }) {
                match next {
                    Some((edge, _)) if Some(edge) == via => {}
                    Some((edge, other)) => {
                        if discovered[other.index()] == UNSEEN {
                            discovered[other.index()] = timer;
                            low[other.index()] = timer;
                            timer += 1;
                            stack.push((other, Some(edge), self.incident(other), 0));
                        } else {
                            low[node.index()] = low[node.index()].min(discovered[other.index()]);
                        }
                    }
                    None => {
                        stack.pop();
                        if let (Some(parent), Some(edge)) = (stack.last(), via) {
                            let parent = parent.0.index();
                            low[parent] = low[parent].min(low[node.index()]);
                            if low[node.index()] > discovered[parent] {
                                bridges.insert(edge);
                            }
                        }
                    }
                }
            }
        }
        bridges
    }

    /// Marks every bond as ring or chain.
    pub fn update_topology(&mut self) {
        let ring = self.ring_bonds();
        for edge in self.graph.edge_indices() {
            self.graph[edge].topology = Some(if ring.contains(&edge) { Topology::Ring } else { Topology::Chain });
        }
    }

    /// Shortest-path tree from `root`: for every reached atom the atom one
    /// step closer to `root` and the bond between them.
    fn shortest_path_tree(&self, root: NodeIndex) -> Vec<Option<(NodeIndex, EdgeIndex)>> {
        let mut seen = vec![false; self.atom_count()];
        let mut parent = vec![None; self.atom_count()];
        seen[root.index()] = true;
        let mut queue = VecDeque::from([root]);
        while let Some(node) = queue.pop_front() {
            for (edge, other) in self.incident(node) {
                if !seen[other.index()] {
                    seen[other.index()] = true;
                    parent[other.index()] = Some((node, edge));
                    queue.push_back(other);
                }
            }
        }
        parent
    }

    /// A minimum cycle basis: the smallest rings that together span every
    /// cycle, shortest first, each as the list of bonds around it.
    ///
    /// Candidates are the cycles made of one bond and the shortest paths
    /// from each atom to its two ends. They are taken by length and kept
    /// when independent of the ones already kept.
    pub fn cycle_basis(&self) -> Vec<Vec<EdgeIndex>> {
        let rank = self.bond_count() + petgraph::algo::connected_components(&self.graph) - self.atom_count();
        if rank == 0 {
            return vec![];
        }

        let mut candidates = vec![];
        for root in self.graph.node_indices() {
            let parent = self.shortest_path_tree(root);
            let path_to_root = |mut node: NodeIndex| {
                let mut nodes = vec![node];
                let mut edges = vec![];
                while let Some((up, via)) = parent[node.index()] {
                    nodes.push(up);
                    edges.push(via);
                    node = up;
                }
                (nodes, edges)
            };
            for (edge, x, y, _) in self.bonds() {
                let reached = |node: NodeIndex| node == root || parent[node.index()].is_some();
                let tree_edge = |node: NodeIndex| parent[node.index()].map(|(_, via)| via) == Some(edge);
                if !reached(x) || tree_edge(x) || tree_edge(y) {
                    continue;
                }
                let (x_nodes, x_edges) = path_to_root(x);
                let (y_nodes, y_edges) = path_to_root(y);
                // the two paths may only meet at the root
                if x_nodes.iter().filter(|node| y_nodes.contains(*node)).count() != 1 {
                    continue;
                }
                let mut cycle: Vec<EdgeIndex> = x_edges.into_iter().rev().collect();
                cycle.push(edge);
                cycle.extend(y_edges);
                candidates.push(cycle);
            }
        }
        candidates.sort_by_key(Vec::len);

        // Gaussian elimination over GF(2), one bit per bond
        let words = self.bond_count().div_ceil(64);
        let mut rows: Vec<(usize, Vec<u64>)> = vec![];
        let mut basis = vec![];
        for cycle in candidates {
            if basis.len() == rank {
                break;
            }
            let mut bits = vec![0u64; words];
            for edge in &cycle {
                bits[edge.index() / 64] ^= 1u64 << (edge.index() % 64);
            }
            for &(pivot, ref row) in &rows {
                if bits[pivot / 64] >> (pivot % 64) & 1 == 1 {
                    bits.iter_mut().zip(row).for_each(|(bit, r)| *bit ^= r);
                }
            }
            let pivot = bits
                .iter()
                .enumerate()
                .find(|(_, word)| **word != 0)
                .map(|(index, word)| index * 64 + word.trailing_zeros() as usize);
            if let Some(pivot) = pivot {
                rows.push((pivot, bits));
                basis.push(cycle);
            }
        }
        basis
    }

    /// Atoms that could be hydrogen, counted around `node`.
    pub fn hydrogen_neighbors(&self, node: NodeIndex) -> Vec<NodeIndex> {
        self.incident(node)
            .into_iter()
            .map(|(_, other)| other)
            .filter(|other| self.graph[*other].is_pure_hydrogen())
            .collect()
    }

    /// Drops every stereo perception result.
    pub fn clear_stereo(&mut self) {
        self.stereocenters.clear();
        self.cis_trans.clear();
    }
}

impl MoleculeGraph<Concrete> {
    /// Implicit hydrogens on `node`: the stored count when there is one,
    /// otherwise what the valence rules ask for.
    pub fn implicit_hydrogens(&self, node: NodeIndex) -> u32 {
        let atom = &self.graph[node];
        if let Some(h) = atom.implicit_h {
            return h;
        }
        let Some(number) = atom.number() else {
            return 0;
        };
        let conn = self.connectivity(node);
        if let Some(valence) = atom.explicit_valence {
            let used = ELEMENTS.calc_valence_minus_hyd(number, atom.charge, atom.radical, conn);
            return (valence - used).max(0) as u32;
        }
        if atom.aromatic {
            return 0;
        }
        let (_, hyd) = ELEMENTS.calc_valence_lenient(number, atom.charge, atom.radical, conn);
        hyd.max(0) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{C, H, N, O};

    fn chain(n: usize) -> Molecule {
        let mut mol = Molecule::new();
        let atoms: Vec<_> = (0..n).map(|_| mol.add_atom(Atom::element(C))).collect();
        for pair in atoms.windows(2) {
            mol.add_bond(pair[0], pair[1], Bond::new(BondOrder::Single)).unwrap();
        }
        mol
    }

    #[test]
    fn test_add_bond_checks() {
        let mut mol = chain(2);
        let a = NodeIndex::new(0);
        let b = NodeIndex::new(1);
        assert_eq!(mol.add_bond(a, b, Bond::new(BondOrder::Single)), Err(GraphError::DuplicateBond(0, 1)));
        assert_eq!(mol.add_bond(b, a, Bond::new(BondOrder::Single)), Err(GraphError::DuplicateBond(1, 0)));
        assert_eq!(mol.add_bond(a, a, Bond::new(BondOrder::Single)), Err(GraphError::SelfLoop(0)));
        assert_eq!(
            mol.add_bond(a, NodeIndex::new(5), Bond::new(BondOrder::Single)),
            Err(GraphError::NoSuchAtom(5))
        );
        assert!(mol.atom(7).is_err());
    }

    #[test]
    fn test_incident_in_insertion_order() {
        let mut mol = chain(1);
        let center = NodeIndex::new(0);
        for _ in 0..3 {
            let other = mol.add_atom(Atom::element(O));
            mol.add_bond(center, other, Bond::new(BondOrder::Single)).unwrap();
        }
        let edges: Vec<_> = mol.incident(center).into_iter().map(|(e, _)| e.index()).collect();
        assert_eq!(edges, vec![0, 1, 2]);
    }

    #[test]
    fn test_ring_bonds_and_topology() {
        let mut mol = chain(4);
        // close a 4-ring and hang one chain atom off it
        mol.add_bond(NodeIndex::new(3), NodeIndex::new(0), Bond::new(BondOrder::Single)).unwrap();
        let tail = mol.add_atom(Atom::element(N));
        let tail_bond = mol.add_bond(NodeIndex::new(0), tail, Bond::new(BondOrder::Single)).unwrap();

        let ring = mol.ring_bonds();
        assert_eq!(ring.len(), 4);
        assert!(!ring.contains(&tail_bond));

        mol.update_topology();
        assert_eq!(mol[tail_bond].topology, Some(Topology::Chain));
        assert_eq!(mol[EdgeIndex::new(0)].topology, Some(Topology::Ring));
    }

    #[test]
    fn test_cycle_basis() {
        // naphthalene-like fused pair of 6-rings
        let mut mol = chain(10);
        mol.add_bond(NodeIndex::new(9), NodeIndex::new(0), Bond::new(BondOrder::Single)).unwrap();
        mol.add_bond(NodeIndex::new(4), NodeIndex::new(9), Bond::new(BondOrder::Single)).unwrap();
        let cycles = mol.cycle_basis();
        assert_eq!(cycles.len(), 2);
        let mut sizes: Vec<_> = cycles.iter().map(Vec::len).collect();
        sizes.sort();
        assert_eq!(sizes, vec![6, 6]);
        assert!(chain(5).cycle_basis().is_empty());

        // the same skeleton numbered so that a spanning tree closes the
        // 10-atom perimeter instead of one of the rings
        let mut mol = chain(10);
        mol.add_bond(NodeIndex::new(8), NodeIndex::new(3), Bond::new(BondOrder::Single)).unwrap();
        mol.add_bond(NodeIndex::new(9), NodeIndex::new(0), Bond::new(BondOrder::Single)).unwrap();
        let sizes: Vec<_> = mol.cycle_basis().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![6, 6]);

        // fused 6- and 5-ring, plus a spiro 3-ring on a disconnected part
        let mut mol = chain(9);
        mol.add_bond(NodeIndex::new(7), NodeIndex::new(2), Bond::new(BondOrder::Single)).unwrap();
        mol.add_bond(NodeIndex::new(8), NodeIndex::new(0), Bond::new(BondOrder::Single)).unwrap();
        let extra: Vec<_> = (0..3).map(|_| mol.add_atom(Atom::element(C))).collect();
        mol.add_bond(extra[0], extra[1], Bond::new(BondOrder::Single)).unwrap();
        mol.add_bond(extra[1], extra[2], Bond::new(BondOrder::Single)).unwrap();
        mol.add_bond(extra[2], extra[0], Bond::new(BondOrder::Single)).unwrap();
        let sizes: Vec<_> = mol.cycle_basis().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 5, 6]);
    }

    #[test]
    fn test_implicit_hydrogens() {
        let mut mol = chain(2);
        let o = mol.add_atom(Atom::element(O));
        mol.add_bond(NodeIndex::new(1), o, Bond::new(BondOrder::Double)).unwrap();
        assert_eq!(mol.implicit_hydrogens(NodeIndex::new(0)), 3);
        assert_eq!(mol.implicit_hydrogens(NodeIndex::new(1)), 1);
        assert_eq!(mol.implicit_hydrogens(o), 0);

        mol[o].implicit_h = Some(2);
        assert_eq!(mol.implicit_hydrogens(o), 2);

        let h = mol.add_atom(Atom::element(H));
        mol.add_bond(NodeIndex::new(0), h, Bond::new(BondOrder::Single)).unwrap();
        assert_eq!(mol.hydrogen_neighbors(NodeIndex::new(0)), vec![h]);
        assert_eq!(mol.implicit_hydrogens(NodeIndex::new(0)), 2);
    }

    #[test]
    fn test_query_possibilities() {
        let mut mol = QueryMolecule::new();
        let a = mol.add_atom(Atom::new(AtomKind::Query));
        let b = mol.add_atom(Atom::element(C));
        let mut bond = Bond::new(BondOrder::Query);
        bond.attach(crate::query::BondConstraint::single_or_double()).unwrap();
        let e = mol.add_bond(a, b, bond).unwrap();
        assert!(mol.possible_atom_number(a, O));
        assert!(!mol.possible_atom_number(b, O));
        assert!(mol.possible_bond_order(e, BondOrder::Double));
        assert!(!mol.possible_bond_order(e, BondOrder::Triple));
    }
}

use petgraph::graph::{EdgeIndex, NodeIndex};
use tracing::*;

use crate::element::{C, GE, N, SI};
use crate::geometry::Vec3;
use crate::graph::*;

const EPS: f64 = 1e-3;

/// Whether neighbours `nb` of `beg` and `ne` of `end` sit on the same side
/// of the `beg`–`end` axis: `1` same side, `-1` opposite, `0` undecidable.
pub fn sameside(beg: Vec3, end: Vec3, nb: Vec3, ne: Vec3) -> i32 {
    let diff = beg - end;
    let Some(norm) = diff.cross(nb - beg).cross(diff).normalized() else {
        return 0;
    };
    let (Some(to_nb), Some(to_ne)) = ((nb - beg).normalized(), (ne - end).normalized()) else {
        return 0;
    };
    let prod_beg = to_nb.dot(norm);
    let prod_end = to_ne.dot(norm);
    if prod_beg.abs() < EPS || prod_end.abs() < EPS {
        return 0;
    }
    if prod_beg * prod_end > 0.0 {
        1
    } else {
        -1
    }
}

fn sameside_atoms<F: Flavor>(mol: &MoleculeGraph<F>, beg: NodeIndex, end: NodeIndex, nb: NodeIndex, ne: NodeIndex) -> i32 {
    sameside(mol[beg].position, mol[end].position, mol[nb].position, mol[ne].position)
}

/// Substituents of a double bond that can carry cis/trans stereo, in
/// insertion order: two slots on the first atom, two on the second.
///
/// With `check_xyz` the two substituents on one end must also be drawn on
/// opposite sides of the bond axis.
pub fn is_geom_stereo_bond<F: Flavor>(
    mol: &MoleculeGraph<F>,
    edge: EdgeIndex,
    check_xyz: bool,
) -> Option<[Option<NodeIndex>; 4]> {
    if !mol.possible_bond_order(edge, BondOrder::Double) {
        return None;
    }
    let (beg, end) = mol.endpoints(edge).ok()?;

    let can_be_stereo_end = |atom: NodeIndex| {
        [C, N, SI, GE].iter().any(|n| mol.possible_atom_number(atom, *n)) && !mol[atom].is_rsite()
    };
    if !can_be_stereo_end(beg) || !can_be_stereo_end(end) {
        return None;
    }

    let mut substituents = [None; 4];
    for (slot, atom) in [(0, beg), (2, end)] {
        let incident = mol.incident(atom);
        if !(2..=3).contains(&incident.len()) {
            return None;
        }
        let mut next = slot;
        for (other_edge, other) in incident {
            if other_edge == edge {
                continue;
            }
            if !mol.possible_bond_order(other_edge, BondOrder::Single) {
                return None;
            }
            substituents[next] = Some(other);
            next += 1;
        }
    }

    if check_xyz {
        if let (Some(s0), Some(s1)) = (substituents[0], substituents[1]) {
            if sameside_atoms(mol, beg, end, s0, s1) != -1 {
                return None;
            }
        }
        if let (Some(s2), Some(s3)) = (substituents[2], substituents[3]) {
            if sameside_atoms(mol, beg, end, s2, s3) != -1 {
                return None;
            }
        }
    }
    Some(substituents)
}

/// Drops hydrogen substituents and orders the rest lowest index first.
/// Fails when one end carries nothing but hydrogens.
fn sort_substituents<F: Flavor>(mol: &MoleculeGraph<F>, mut subs: [Option<NodeIndex>; 4]) -> Option<[Option<NodeIndex>; 4]> {
    let pure_h = |slot: Option<NodeIndex>| slot.map_or(true, |atom| mol[atom].is_pure_hydrogen());

    for first in [0, 2] {
        let h0 = pure_h(subs[first]);
        let h1 = pure_h(subs[first + 1]);
        if h0 && h1 {
            return None;
        }
        if h1 {
            subs[first + 1] = None;
        } else if h0 {
            subs[first] = subs[first + 1];
            subs[first + 1] = None;
        } else if subs[first] > subs[first + 1] {
            subs.swap(first, first + 1);
        }
    }
    Some(subs)
}

/// Parities from 2D or 3D geometry. Bonds flagged as drawn "either" are
/// recorded as ignored.
pub(super) fn from_geometry<F: Flavor>(mol: &mut MoleculeGraph<F>) {
    let edges: Vec<EdgeIndex> = mol.edge_indices().collect();
    for edge in edges {
        if mol[edge].ignore_cis_trans {
            if mol.possible_bond_order(edge, BondOrder::Double) {
                let substituents = is_geom_stereo_bond(mol, edge, false)
                    .and_then(|subs| sort_substituents(mol, subs))
                    .unwrap_or([None; 4]);
                mol.cis_trans.insert(edge, CisTransBond { substituents, parity: CisTransParity::Ignored });
            }
            continue;
        }

        let Some(substituents) = is_geom_stereo_bond(mol, edge, true).and_then(|subs| sort_substituents(mol, subs)) else {
            continue;
        };
        let (Ok((beg, end)), Some(s0), Some(s2)) = (mol.endpoints(edge), substituents[0], substituents[2]) else {
            continue;
        };
        let parity = match sameside_atoms(mol, beg, end, s0, s2) {
            1 => CisTransParity::Cis,
            -1 => CisTransParity::Trans,
            _ => continue,
        };
        trace!("bond {} is {:?}", edge.index(), parity);
        mol.cis_trans.insert(edge, CisTransBond { substituents, parity });
    }
}

/// `/` and `\` as seen walking away from `atom` towards `sub`:
/// `1` for a slash, `2` for a backslash, `0` for no mark.
fn mark_from<F: Flavor>(mol: &MoleculeGraph<F>, atom: NodeIndex, sub: Option<NodeIndex>) -> u8 {
    let Some(sub) = sub else {
        return 0;
    };
    let Some(edge) = mol.find_bond(atom, sub) else {
        return 0;
    };
    let forward = matches!(mol.endpoints(edge), Ok((beg, _)) if beg == atom);
    match (mol[edge].mark, forward) {
        (DirectionalMark::Slash, true) | (DirectionalMark::Backslash, false) => 1,
        (DirectionalMark::Slash, false) | (DirectionalMark::Backslash, true) => 2,
        (DirectionalMark::None, _) => 0,
    }
}

/// Parities from SMILES directional marks. Ring bonds never get one.
pub(super) fn from_smiles<F: Flavor>(mol: &mut MoleculeGraph<F>) {
    let ring = mol.ring_bonds();
    let mut found = vec![];

    for edge in mol.edge_indices() {
        if ring.contains(&edge) {
            continue;
        }
        let Some(sorted) = is_geom_stereo_bond(mol, edge, false).and_then(|subs| sort_substituents(mol, subs)) else {
            continue;
        };
        let Ok((beg, end)) = mol.endpoints(edge) else {
            continue;
        };

        // a hydrogen can carry the mark for its end
        let mut subs = sorted;
        if subs[1].is_none() {
            subs[1] = mol.hydrogen_neighbors(beg).last().copied();
        }
        if subs[3].is_none() {
            subs[3] = mol.hydrogen_neighbors(end).last().copied();
        }

        let mut dirs = [
            mark_from(mol, beg, subs[0]),
            mark_from(mol, beg, subs[1]),
            mark_from(mol, end, subs[2]),
            mark_from(mol, end, subs[3]),
        ];

        // co-directed substituents, as in CC=C(C=CN)C=CO
        if (dirs[0] != 0 && dirs[0] == dirs[1]) || (dirs[2] != 0 && dirs[2] == dirs[3]) {
            continue;
        }
        if (dirs[0] == 0 && dirs[1] == 0) || (dirs[2] == 0 && dirs[3] == 0) {
            continue;
        }
        if dirs[1] != 0 {
            dirs[0] = 3 - dirs[1];
        }
        if dirs[3] != 0 {
            dirs[2] = 3 - dirs[3];
        }

        let parity = if dirs[0] == dirs[2] { CisTransParity::Cis } else { CisTransParity::Trans };
        found.push((edge, CisTransBond { substituents: sorted, parity }));
    }

    for (edge, bond) in found {
        if F::IS_QUERY {
            mol[edge].stereo_care = true;
        }
        mol.cis_trans.insert(edge, bond);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{CL, H};

    /// 2-butene drawn in the plane, cis or trans.
    fn butene(cis: bool) -> Molecule {
        let mut mol = Molecule::new();
        let y = if cis { 1.0 } else { -1.0 };
        let positions = [
            Vec3::new(-1.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(2.0, y, 0.0),
        ];
        let atoms: Vec<_> = positions
            .into_iter()
            .map(|position| {
                let mut atom = Atom::element(C);
                atom.position = position;
                mol.add_atom(atom)
            })
            .collect();
        mol.add_bond(atoms[0], atoms[1], Bond::new(BondOrder::Single)).unwrap();
        mol.add_bond(atoms[1], atoms[2], Bond::new(BondOrder::Double)).unwrap();
        mol.add_bond(atoms[2], atoms[3], Bond::new(BondOrder::Single)).unwrap();
        mol
    }

    #[test]
    fn test_sameside() {
        let beg = Vec3::new(0.0, 0.0, 0.0);
        let end = Vec3::new(1.0, 0.0, 0.0);
        assert_eq!(sameside(beg, end, Vec3::new(-1.0, 1.0, 0.0), Vec3::new(2.0, 1.0, 0.0)), 1);
        assert_eq!(sameside(beg, end, Vec3::new(-1.0, 1.0, 0.0), Vec3::new(2.0, -1.0, 0.0)), -1);
        assert_eq!(sameside(beg, end, Vec3::new(-1.0, 0.0, 0.0), Vec3::new(2.0, 1.0, 0.0)), 0);
    }

    #[test]
    fn test_geometry_parity() {
        let edge = EdgeIndex::new(1);
        let mut cis = butene(true);
        from_geometry(&mut cis);
        assert_eq!(cis.cis_trans[&edge].parity, CisTransParity::Cis);
        assert_eq!(cis.cis_trans[&edge].substituents, [Some(NodeIndex::new(0)), None, Some(NodeIndex::new(3)), None]);

        let mut trans = butene(false);
        from_geometry(&mut trans);
        assert_eq!(trans.cis_trans[&edge].parity, CisTransParity::Trans);
        assert_eq!(trans.cis_trans.len(), 1);
    }

    #[test]
    fn test_either_bond_is_ignored() {
        let mut mol = butene(true);
        mol[EdgeIndex::new(1)].ignore_cis_trans = true;
        from_geometry(&mut mol);
        assert_eq!(mol.cis_trans[&EdgeIndex::new(1)].parity, CisTransParity::Ignored);
    }

    #[test]
    fn test_hydrogens_only_end_is_not_stereo() {
        let mut mol = Molecule::new();
        let c1 = mol.add_atom(Atom::element(C));
        let c2 = mol.add_atom(Atom::element(C));
        let e = mol.add_bond(c1, c2, Bond::new(BondOrder::Double)).unwrap();
        for (atom, number) in [(c1, H), (c1, H), (c2, CL), (c2, H)] {
            let other = mol.add_atom(Atom::element(number));
            mol.add_bond(atom, other, Bond::new(BondOrder::Single)).unwrap();
        }
        let subs = is_geom_stereo_bond(&mol, e, false).unwrap();
        assert!(sort_substituents(&mol, subs).is_none());
    }

    #[test]
    fn test_smiles_marks() {
        // C/C=C/C written left to right
        let mut mol = butene(true);
        mol[EdgeIndex::new(0)].mark = DirectionalMark::Slash;
        mol[EdgeIndex::new(2)].mark = DirectionalMark::Slash;
        from_smiles(&mut mol);
        assert_eq!(mol.cis_trans[&EdgeIndex::new(1)].parity, CisTransParity::Trans);

        mol.clear_stereo();
        mol[EdgeIndex::new(2)].mark = DirectionalMark::Backslash;
        from_smiles(&mut mol);
        assert_eq!(mol.cis_trans[&EdgeIndex::new(1)].parity, CisTransParity::Cis);
    }
}

use petgraph::graph::{EdgeIndex, NodeIndex};
use tracing::*;

use super::{CenterError, StereoError};
use crate::element::{AS, B, C, H, N, P, S, SI};
use crate::geometry::Vec3;
use crate::graph::*;
use crate::options::LoaderOptions;

const EPS: f64 = 1e-3;

/// Rank given to neighbours that could be hydrogen, so they sort last.
const HYDROGEN_RANK: usize = 10000;

/// Atoms that can be tetrahedral centers:
/// (element, charge, degree, double bonds, degree with implicit H or lone pair).
const ALLOWED: [(u8, i32, usize, usize, usize); 16] = [
    (C, 0, 3, 0, 4),
    (C, 0, 4, 0, 4),
    (SI, 0, 3, 0, 4),
    (SI, 0, 4, 0, 4),
    (N, 1, 3, 0, 4),
    (N, 1, 4, 0, 4),
    (N, 0, 3, 0, 3),
    (S, 0, 4, 2, 4),
    (S, 1, 3, 0, 3),
    (S, 1, 4, 1, 4),
    (S, 0, 3, 1, 3),
    (P, 0, 3, 0, 3),
    (P, 1, 4, 0, 4),
    (P, 0, 4, 1, 4),
    (AS, 0, 4, 0, 4),
    (B, -1, 4, 0, 4),
];

struct Spoke {
    atom: NodeIndex,
    edge: EdgeIndex,
    rank: usize,
    /// Unit vector from the center towards the neighbour.
    vec: Vec3,
}

struct Assessment {
    /// Sorted by rank.
    spokes: Vec<Spoke>,
    lone_pair: bool,
}

/// Checks that `center` can carry a stereocenter at all and collects its
/// neighbours in rank order.
fn assess<F: Flavor>(mol: &MoleculeGraph<F>, center: NodeIndex) -> Result<Assessment, CenterError> {
    let incident = mol.incident(center);
    let degree = incident.len();
    if degree > 4 {
        return Err(CenterError::TooManyBonds(degree));
    }

    let origin = mol[center].position;
    let mut spokes = Vec::with_capacity(degree);
    let mut pure_hydrogens = 0;
    let mut sure_double = 0;
    let mut possible_double = 0;

    for (edge, other) in incident {
        let neighbor = &mol[other];
        let rank = if neighbor.possible_hydrogen() {
            if neighbor.number() == Some(H) && neighbor.isotope == 0 {
                pure_hydrogens += 1;
            }
            HYDROGEN_RANK
        } else {
            other.index()
        };
        let vec = (neighbor.position - origin)
            .normalized()
            .ok_or(CenterError::ZeroBondLength)?;

        let bond = &mol[edge];
        match bond.order {
            BondOrder::Triple => return Err(CenterError::TripleBond),
            BondOrder::Aromatic => return Err(CenterError::AromaticBond),
            BondOrder::Double => sure_double += 1,
            _ if bond.possible_order(BondOrder::Double) => possible_double += 1,
            _ => {}
        }
        spokes.push(Spoke { atom: other, edge, rank, vec });
    }

    let mut possible = false;
    let mut lone_pair = false;
    for (element, charge, allowed_degree, double_bonds, implicit_degree) in ALLOWED {
        if allowed_degree != degree || double_bonds < sure_double || double_bonds > sure_double + possible_double {
            continue;
        }
        if !mol[center].possible_number_and_charge(element, charge) {
            continue;
        }
        possible = true;
        if implicit_degree == 3 {
            lone_pair = true;
        }
    }

    if !possible {
        let double_bonds = if possible_double == 0 {
            sure_double.to_string()
        } else {
            format!("{}-{}", sure_double, sure_double + possible_double)
        };
        return Err(CenterError::UnknownConfiguration {
            label: mol[center].kind.label(),
            degree,
            double_bonds,
        });
    }
    if degree == 4 && pure_hydrogens > 1 {
        return Err(CenterError::TooManyHydrogens(pure_hydrogens));
    }
    if degree == 3 && pure_hydrogens > 0 && !lone_pair {
        return Err(CenterError::UnexpectedHydrogen);
    }

    spokes.sort_by_key(|spoke| spoke.rank);
    Ok(Assessment { spokes, lone_pair })
}

/// Where `u` lies relative to the angle between `v1` and `v2`:
/// 1 inside the smaller angle, 2 inside the bigger one, 4 or 8 on either
/// side of a straight angle.
fn xyzzy(v1: Vec3, v2: Vec3, u: Vec3) -> Result<i32, CenterError> {
    let sine1 = v1.cross(v2).z;
    let cosine1 = v1.dot(v2);
    let sine2 = v1.cross(u).z;
    let cosine2 = v1.dot(u);

    if sine1.abs() < EPS {
        if sine2.abs() < EPS {
            return Err(CenterError::Overlap);
        }
        return Ok(if sine2 > 0.0 { 4 } else { 8 });
    }
    if sine1 * sine2 < -EPS * EPS || cosine2 < cosine1 {
        return Ok(2);
    }
    Ok(1)
}

/// Orientation of the triangle `v1 v2 v3` in the drawing plane.
fn sign(v1: Vec3, v2: Vec3, v3: Vec3) -> Result<i32, CenterError> {
    let res = (v1.x - v3.x) * (v2.y - v3.y) - (v1.y - v3.y) * (v2.x - v3.x);
    if res > EPS {
        Ok(1)
    } else if res < -EPS {
        Ok(-1)
    } else {
        Err(CenterError::DegenerateTriangle)
    }
}

/// Wedge of `edge` as seen from `center`. Wedges only count from their
/// narrow end.
fn wedge<F: Flavor>(mol: &MoleculeGraph<F>, center: NodeIndex, edge: EdgeIndex) -> BondDirection {
    match mol.endpoints(edge) {
        Ok((beg, _)) if beg == center => mol[edge].direction,
        _ => BondDirection::None,
    }
}

fn flip(direction: BondDirection) -> BondDirection {
    match direction {
        BondDirection::Up => BondDirection::Down,
        BondDirection::Down => BondDirection::Up,
        other => other,
    }
}

fn build_from_wedges<F: Flavor>(
    mol: &MoleculeGraph<F>,
    center: NodeIndex,
    group: StereoGroup,
) -> Result<Stereocenter, CenterError> {
    let Assessment { spokes, lone_pair } = assess(mol, center)?;

    if group.kind == StereoKind::Any {
        // neighbour order as drawn, not by rank
        let mut pyramid = [center; 4];
        for (slot, (_, other)) in pyramid.iter_mut().zip(mol.incident(center)) {
            *slot = other;
        }
        return Ok(Stereocenter { kind: group.kind, group: group.number, pyramid });
    }

    let dirs: Vec<BondDirection> = spokes.iter().map(|s| wedge(mol, center, s.edge)).collect();
    let is_wedge = |d: &BondDirection| matches!(d, BondDirection::Up | BondDirection::Down);

    let pyramid = match spokes.len() {
        4 => {
            let v = |i: usize| spokes[i % 4].vec;
            let main1 = dirs.iter().position(is_wedge).ok_or(CenterError::NoStereoBond)?;
            let main_dir = dirs[main1];

            let mut found = None;
            for (m2, s1, s2) in [(1, 2, 3), (2, 1, 3), (3, 2, 1)] {
                let a = xyzzy(v(main1), v(main1 + m2), v(main1 + s1))?;
                let b = xyzzy(v(main1), v(main1 + m2), v(main1 + s2))?;
                if a + b == 3 || a + b == 12 {
                    found = Some(((main1 + m2) % 4, (main1 + s1) % 4, (main1 + s2) % 4));
                    break;
                }
            }
            let (main2, side1, side2) = found.ok_or(CenterError::NoOppositeBond)?;

            if is_wedge(&dirs[main2]) && dirs[main2] != main_dir {
                return Err(CenterError::OppositeMismatch);
            }
            if dirs[side1] == main_dir || dirs[side2] == main_dir {
                return Err(CenterError::NonOppositeMatch);
            }

            let last_dir = if main1 == 3 || main2 == 3 { main_dir } else { flip(main_dir) };
            let sign = sign(v(0), v(1), v(2))?;
            let atom = |i: usize| spokes[i].atom;
            if (last_dir == BondDirection::Up && sign > 0) || (last_dir == BondDirection::Down && sign < 0) {
                [atom(0), atom(1), atom(2), atom(3)]
            } else {
                [atom(0), atom(2), atom(1), atom(3)]
            }
        }
        3 => {
            let v = |i: usize| spokes[i % 3].vec;
            let mut n_up = 0;
            let mut n_down = 0;
            let mut invert = false;
            let mut not_invert = false;
            for i in 0..3 {
                match dirs[i] {
                    BondDirection::Up => n_up += 1,
                    BondDirection::Down => n_down += 1,
                    _ => {}
                }
                match xyzzy(v(i), v(i + 1), v(i + 2))? {
                    1 => invert = true,
                    2 => not_invert = true,
                    _ => {}
                }
            }

            if !invert && !not_invert {
                return Err(CenterError::Degenerate);
            }
            if n_up > 0 && n_down > 0 {
                return Err(CenterError::UpAndDown);
            }
            if n_up == 0 && n_down == 0 {
                return Err(CenterError::NoUpDown);
            }
            if !lone_pair && n_up == 3 {
                return Err(CenterError::AllSame("up"));
            }
            if !lone_pair && n_down == 3 {
                return Err(CenterError::AllSame("down"));
            }

            let mut dir = if n_down > 0 { -1 } else { 1 };
            if invert {
                dir = -dir;
            }
            let atom = |i: usize| spokes[i].atom;
            if sign(v(0), v(1), v(2))? == dir {
                [atom(0), atom(2), atom(1), center]
            } else {
                [atom(0), atom(1), atom(2), center]
            }
        }
        // assess already rejected every other degree
        n => return Err(CenterError::TooFewChiralBonds(n)),
    };

    Ok(Stereocenter { kind: group.kind, group: group.number, pyramid })
}

/// Centers from wedges, for every atom the loader flagged.
pub(super) fn from_wedges<F: Flavor>(mol: &mut MoleculeGraph<F>, options: &LoaderOptions) -> Result<(), StereoError> {
    let flagged: Vec<(NodeIndex, StereoGroup)> = mol
        .atoms()
        .filter_map(|(index, atom)| atom.stereo_group.map(|group| (index, group)))
        .collect();

    for (center, group) in flagged {
        match build_from_wedges(mol, center, group) {
            Ok(stereocenter) => {
                trace!("stereocenter on atom {}: {:?}", center.index(), stereocenter.pyramid);
                mol.stereocenters.insert(center, stereocenter);
            }
            Err(reason) if options.ignore_stereochemistry_errors => {
                warn!("dropping stereocenter on atom {}: {}", center.index(), reason);
            }
            Err(reason) => return Err(StereoError::Center { atom: center.index(), reason }),
        }
    }
    Ok(())
}

fn build_from_smiles(center: NodeIndex, chirality: &SmilesChirality) -> Result<[NodeIndex; 4], CenterError> {
    let mut pyramid: [Option<NodeIndex>; 4] = [None; 4];
    let mut counter = 0;
    let mut h_index = None;

    if let Some(parent) = chirality.parent {
        pyramid[counter] = Some(parent);
        counter += 1;
    }
    if chirality.neighbors.len() == 3 {
        h_index = Some(counter);
        counter += 1;
    }
    for &neighbor in &chirality.neighbors {
        if counter >= 4 {
            return Err(CenterError::TooManyChiralBonds);
        }
        if Some(neighbor) != chirality.parent {
            pyramid[counter] = Some(neighbor);
            counter += 1;
        }
    }

    if counter < 3 {
        return Err(CenterError::TooFewChiralBonds(counter));
    }
    if counter == 4 {
        pyramid.rotate_left(1);
        h_index = h_index.map(|h| if h == 0 { 3 } else { h - 1 });
    }
    if let Some(h) = h_index {
        if counter != 4 {
            return Err(CenterError::ImplicitHydrogen(counter - 1));
        }
        let mut parity = true;
        for j in h..3 {
            pyramid.swap(j, j + 1);
            parity = !parity;
        }
        if !parity {
            pyramid.swap(0, 1);
        }
    }
    if chirality.clockwise {
        pyramid.swap(0, 1);
    }

    Ok(pyramid.map(|slot| slot.unwrap_or(center)))
}

/// Centers from SMILES `@` and `@@`.
pub(super) fn from_smiles<F: Flavor>(mol: &mut MoleculeGraph<F>, options: &LoaderOptions) -> Result<(), StereoError> {
    let marked: Vec<(NodeIndex, SmilesChirality, Option<StereoGroup>)> = mol
        .atoms()
        .filter_map(|(index, atom)| {
            let chirality = atom.smiles_chirality.clone()?;
            Some((index, chirality, atom.stereo_group))
        })
        .collect();

    for (center, chirality, group) in marked {
        match build_from_smiles(center, &chirality) {
            Ok(pyramid) => {
                let group = group.unwrap_or(StereoGroup::new(StereoKind::Abs, 0));
                mol.stereocenters.insert(
                    center,
                    Stereocenter { kind: group.kind, group: group.number, pyramid },
                );
            }
            Err(reason) if options.ignore_stereochemistry_errors => {
                warn!("dropping stereocenter on atom {}: {}", center.index(), reason);
            }
            Err(reason) => return Err(StereoError::Center { atom: center.index(), reason }),
        }
    }
    Ok(())
}

/// Centers from the signed volume of 3D neighbour positions. Atoms that
/// can not be centers are skipped silently.
pub(super) fn from_3d<F: Flavor>(mol: &mut MoleculeGraph<F>) {
    let candidates: Vec<NodeIndex> = mol.node_indices().collect();
    for center in candidates {
        let Ok(Assessment { spokes, .. }) = assess(mol, center) else {
            continue;
        };
        if spokes.len() < 3 {
            continue;
        }
        let origin = mol[center].position;
        let position = |i: usize| mol[spokes[i].atom].position;
        let fourth = if spokes.len() == 4 {
            position(3)
        } else {
            match (-(spokes[0].vec + spokes[1].vec + spokes[2].vec)).normalized() {
                Some(direction) => origin + direction,
                None => continue,
            }
        };
        let p3 = fourth;
        let det = Vec3::det(position(0) - p3, position(1) - p3, position(2) - p3);
        if det.abs() < EPS {
            continue;
        }

        let last = if spokes.len() == 4 { spokes[3].atom } else { center };
        let mut pyramid = [spokes[0].atom, spokes[1].atom, spokes[2].atom, last];
        if det > 0.0 {
            pyramid.swap(1, 2);
        }
        let group = mol[center].stereo_group.unwrap_or(StereoGroup::new(StereoKind::Abs, 0));
        debug!("stereocenter on atom {} from 3D coordinates", center.index());
        mol.stereocenters.insert(center, Stereocenter { kind: group.kind, group: group.number, pyramid });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{BR, CL, F, O};

    fn idx(i: usize) -> NodeIndex {
        NodeIndex::new(i)
    }

    #[test]
    fn test_xyzzy_and_sign() {
        let x = Vec3::new(1.0, 0.0, 0.0);
        let y = Vec3::new(0.0, 1.0, 0.0);
        let diag = Vec3::new(1.0, 1.0, 0.0).normalized().unwrap();
        assert_eq!(xyzzy(x, y, diag), Ok(1));
        assert_eq!(xyzzy(x, y, -diag), Ok(2));
        assert_eq!(xyzzy(x, -x, y), Ok(4));
        assert_eq!(xyzzy(x, -x, -y), Ok(8));
        assert_eq!(xyzzy(x, x, x), Err(CenterError::Overlap));

        assert_eq!(sign(x, y, Vec3::default()), Ok(1));
        assert_eq!(sign(y, x, Vec3::default()), Ok(-1));
        assert_eq!(sign(x, x * 2.0, Vec3::default()), Err(CenterError::DegenerateTriangle));
    }

    #[test]
    fn test_smiles_pyramid_with_implicit_hydrogen() {
        // N[C@@H](C)C(=O)O with the center at 1
        let chirality = SmilesChirality {
            clockwise: true,
            parent: Some(idx(0)),
            neighbors: vec![idx(0), idx(2), idx(3)],
        };
        assert_eq!(build_from_smiles(idx(1), &chirality), Ok([idx(2), idx(3), idx(0), idx(1)]));

        let anticlockwise = SmilesChirality { clockwise: false, ..chirality };
        assert_eq!(build_from_smiles(idx(1), &anticlockwise), Ok([idx(3), idx(2), idx(0), idx(1)]));
    }

    #[test]
    fn test_smiles_pyramid_four_neighbors() {
        // F[C@](Cl)(Br)O, center 1
        let chirality = SmilesChirality {
            clockwise: false,
            parent: Some(idx(0)),
            neighbors: vec![idx(0), idx(2), idx(3), idx(4)],
        };
        assert_eq!(build_from_smiles(idx(1), &chirality), Ok([idx(2), idx(3), idx(4), idx(0)]));

        let too_few = SmilesChirality { clockwise: false, parent: None, neighbors: vec![idx(0), idx(2)] };
        assert_eq!(build_from_smiles(idx(1), &too_few), Err(CenterError::TooFewChiralBonds(2)));
    }

    #[test]
    fn test_3d_center() {
        // tetrahedral carbon with F, Cl, Br, O on alternating cube corners
        let mut mol = Molecule::new();
        let center = mol.add_atom(Atom::element(C));
        let corners = [
            (F, Vec3::new(1.0, 1.0, 1.0)),
            (CL, Vec3::new(-1.0, -1.0, 1.0)),
            (BR, Vec3::new(-1.0, 1.0, -1.0)),
            (O, Vec3::new(1.0, -1.0, -1.0)),
        ];
        for (number, position) in corners {
            let mut atom = Atom::element(number);
            atom.position = position;
            let other = mol.add_atom(atom);
            mol.add_bond(center, other, Bond::new(BondOrder::Single)).unwrap();
        }
        from_3d(&mut mol);
        let first = mol.stereocenters[&center].pyramid;

        // the mirror image swaps two pyramid slots
        for i in 1..5 {
            mol[idx(i)].position.z = -mol[idx(i)].position.z;
        }
        mol.clear_stereo();
        from_3d(&mut mol);
        let mirrored = mol.stereocenters[&center].pyramid;
        assert_eq!(first[0], mirrored[0]);
        assert_eq!(first[1], mirrored[2]);
        assert_eq!(first[2], mirrored[1]);
        assert_eq!(first[3], mirrored[3]);
    }
}

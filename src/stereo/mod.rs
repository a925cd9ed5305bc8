//! Stereochemistry perception.
//!
//! Loaders only record what the input says: wedges and enhanced-stereo
//! labels on atoms, SMILES `@`/`@@` with the written neighbour order, `/`
//! and `\` marks and "either" flags on bonds. [`perceive`] turns those
//! marks and the atom coordinates into the stereocenter and cis/trans
//! tables of the graph. It clears both tables first, so running it again
//! gives the same result.

use std::collections::HashSet;

use petgraph::graph::EdgeIndex;
use thiserror::Error;
use tracing::*;

use crate::graph::{BondDirection, DirectionalMark, Flavor, MoleculeGraph};
use crate::options::LoaderOptions;

mod cis_trans;
mod tetrahedral;

pub use cis_trans::{is_geom_stereo_bond, sameside};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CenterError {
    #[error("stereocenter with {0} bonds is not supported")]
    TooManyBonds(usize),
    #[error("zero bond length")]
    ZeroBondLength,
    #[error("triple bonds are not allowed near a stereocenter")]
    TripleBond,
    #[error("aromatic bonds are not allowed near a stereocenter")]
    AromaticBond,
    #[error("unknown stereocenter configuration: {label}, {degree} bonds ({double_bonds} double)")]
    UnknownConfiguration {
        label: String,
        degree: usize,
        double_bonds: String,
    },
    #[error("{0} hydrogens near stereocenter")]
    TooManyHydrogens(usize),
    #[error("hydrogen besides the implicit one near stereocenter")]
    UnexpectedHydrogen,
    #[error("none of 4 bonds going from stereocenter is a stereo bond")]
    NoStereoBond,
    #[error("can not find the bond opposite to the stereo bond")]
    NoOppositeBond,
    #[error("stereo types of the opposite bonds mismatch")]
    OppositeMismatch,
    #[error("stereo types of non-opposite bonds match")]
    NonOppositeMatch,
    #[error("degenerate case for 3 bonds near stereocenter")]
    Degenerate,
    #[error("one bond up, one bond down, indefinite case")]
    UpAndDown,
    #[error("no up or down bonds attached to stereocenter")]
    NoUpDown,
    #[error("all 3 bonds {0} near stereocenter")]
    AllSame(&'static str),
    #[error("bonds overlap")]
    Overlap,
    #[error("degenerate triangle")]
    DegenerateTriangle,
    #[error("too many bonds for a chiral atom")]
    TooManyChiralBonds,
    #[error("only {0} bonds for a chiral atom")]
    TooFewChiralBonds(usize),
    #[error("implicit hydrogen not allowed with {0} neighbor atoms")]
    ImplicitHydrogen(usize),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StereoError {
    #[error("atom {atom}: {reason}")]
    Center { atom: usize, reason: CenterError },
    #[error("direction of bond {0} makes no sense")]
    SenselessWedge(usize),
}

/// Rebuilds the stereocenter and cis/trans tables of `mol`.
pub fn perceive<F: Flavor>(mol: &mut MoleculeGraph<F>, options: &LoaderOptions) -> Result<(), StereoError> {
    mol.clear_stereo();

    if mol.atoms().any(|(_, atom)| atom.smiles_chirality.is_some()) {
        tetrahedral::from_smiles(mol, options)?;
    } else {
        tetrahedral::from_wedges(mol, options)?;
    }
    if mol.stereocenters.is_empty() && !options.skip_3d_chirality && mol.has_3d_coordinates() {
        tetrahedral::from_3d(mol);
    }

    if mol.bonds().any(|(_, _, _, bond)| bond.mark != DirectionalMark::None) {
        cis_trans::from_smiles(mol);
    } else {
        cis_trans::from_geometry(mol);
    }

    debug!(
        "perceived {} stereocenters and {} cis-trans bonds",
        mol.stereocenters.len(),
        mol.cis_trans.len()
    );
    Ok(())
}

/// Fails on a wedge whose first atom did not become a stereocenter,
/// unless the loader already found a use for it in `sensible`. Query
/// molecules are not checked.
pub fn check_wedges<F: Flavor>(
    mol: &MoleculeGraph<F>,
    sensible: &HashSet<EdgeIndex>,
    options: &LoaderOptions,
) -> Result<(), StereoError> {
    if F::IS_QUERY {
        return Ok(());
    }
    for (edge, beg, _, bond) in mol.bonds() {
        if bond.direction == BondDirection::None || mol.stereocenters.contains_key(&beg) || sensible.contains(&edge) {
            continue;
        }
        if options.ignore_stereochemistry_errors {
            warn!("direction of bond {} makes no sense, ignored", edge.index());
            continue;
        }
        return Err(StereoError::SenselessWedge(edge.index()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{BR, C, CL, F, H};
    use crate::geometry::Vec3;
    use crate::graph::*;
    use petgraph::graph::NodeIndex;

    /// A carbon at the origin with four substituents drawn on a cross,
    /// the first of them wedged.
    fn wedged_center(direction: BondDirection) -> Molecule {
        let mut mol = Molecule::new();
        let center = mol.add_atom(Atom::element(C));
        mol[center].stereo_group = Some(StereoGroup::new(StereoKind::Abs, 0));
        let spokes = [
            (F, Vec3::new(1.0, 0.0, 0.0)),
            (CL, Vec3::new(0.0, 1.0, 0.0)),
            (BR, Vec3::new(-1.0, 0.0, 0.0)),
            (H, Vec3::new(0.0, -1.0, 0.0)),
        ];
        for (i, (number, position)) in spokes.into_iter().enumerate() {
            let mut atom = Atom::element(number);
            atom.position = position;
            let other = mol.add_atom(atom);
            let mut bond = Bond::new(BondOrder::Single);
            if i == 0 {
                bond.direction = direction;
            }
            mol.add_bond(center, other, bond).unwrap();
        }
        mol
    }

    fn pyramid(mol: &Molecule) -> Vec<usize> {
        mol.stereocenters[&NodeIndex::new(0)].pyramid.iter().map(|n| n.index()).collect()
    }

    #[test]
    fn test_wedge_flips_pyramid() {
        let options = LoaderOptions::default();
        let mut up = wedged_center(BondDirection::Up);
        perceive(&mut up, &options).unwrap();
        assert_eq!(pyramid(&up), vec![1, 3, 2, 4]);

        let mut down = wedged_center(BondDirection::Down);
        perceive(&mut down, &options).unwrap();
        assert_eq!(pyramid(&down), vec![1, 2, 3, 4]);
        assert!(check_wedges(&down, &HashSet::new(), &options).is_ok());
    }

    #[test]
    fn test_perceive_is_idempotent() {
        let options = LoaderOptions::default();
        let mut mol = wedged_center(BondDirection::Up);
        perceive(&mut mol, &options).unwrap();
        let centers = mol.stereocenters.clone();
        let bonds = mol.cis_trans.clone();
        perceive(&mut mol, &options).unwrap();
        assert_eq!(mol.stereocenters, centers);
        assert_eq!(mol.cis_trans, bonds);
    }

    #[test]
    fn test_bad_center_is_dropped_when_ignored() {
        let mut mol = Molecule::new();
        let a = mol.add_atom(Atom::element(C));
        let mut b = Atom::element(C);
        b.position = Vec3::new(1.0, 0.0, 0.0);
        let b = mol.add_atom(b);
        let mut bond = Bond::new(BondOrder::Single);
        bond.direction = BondDirection::Up;
        mol.add_bond(a, b, bond).unwrap();
        mol[a].stereo_group = Some(StereoGroup::new(StereoKind::Abs, 0));

        let err = perceive(&mut mol, &LoaderOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            StereoError::Center { atom: 0, reason: CenterError::UnknownConfiguration { .. } }
        ));

        let lenient = LoaderOptions::default().with_ignore_stereochemistry_errors(true);
        perceive(&mut mol, &lenient).unwrap();
        assert!(mol.stereocenters.is_empty());
        let none = HashSet::new();
        assert!(check_wedges(&mol, &none, &LoaderOptions::default()).is_err());
        assert!(check_wedges(&mol, &none, &lenient).is_ok());
        assert!(check_wedges(&mol, &HashSet::from([EdgeIndex::new(0)]), &LoaderOptions::default()).is_ok());
    }
}

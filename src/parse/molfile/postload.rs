//! Work that needs the whole CTAB: hydrogen counts, stereo care, either
//! bonds and stereocenters.

use std::collections::{BTreeMap, HashSet};

use super::*;
use crate::options::TreatStereoAs;
use crate::stereo::{self, is_geom_stereo_bond};

/// Data S-group that carries the implicit hydrogen count of one atom.
const IMPLICIT_H_FIELD: &str = "MRV_IMPLICIT_H";

/// R-sites with no attachment order use their neighbours in index order.
fn rsite_attachment_defaults<F: Flavor>(mol: &mut MoleculeGraph<F>) {
    let sites: Vec<NodeIndex> = mol
        .atoms()
        .filter(|(_, atom)| atom.is_rsite() && atom.attachment_order.is_empty())
        .map(|(node, _)| node)
        .collect();
    for site in sites {
        let mut neighbors: Vec<NodeIndex> = mol.incident(site).into_iter().map(|(_, other)| other).collect();
        neighbors.sort();
        mol[site].attachment_order = neighbors;
    }
}

/// `IMPL_H<n>` data groups on single atoms, written by some drawing tools.
fn implicit_h_from_data_groups<F: Flavor>(ctab: &mut Ctab<F>) {
    let mut found = vec![];
    ctab.mol.sgroups.retain(|sgroup| {
        let hit = sgroup.kind == SGroupKind::Data && sgroup.data.name == IMPLICIT_H_FIELD && sgroup.atoms.len() == 1;
        if hit {
            match sgroup.data.value.trim().strip_prefix("IMPL_H").map(str::parse::<i32>) {
                Some(Ok(count)) => found.push((sgroup.atoms[0], count)),
                _ => warn!("ignoring {IMPLICIT_H_FIELD} value {:?}", sgroup.data.value),
            }
        }
        !hit
    });
    for (node, count) in found {
        ctab.hcount[node.index()] = count + 1;
    }
}

fn apply_hydrogen_counts<F: Flavor>(ctab: &mut Ctab<F>) -> Result<(), MolfileError> {
    for (index, &hcount) in ctab.hcount.iter().enumerate() {
        if hcount <= 0 {
            continue;
        }
        let node = NodeIndex::new(index);
        if !F::IS_QUERY {
            ctab.mol[node].implicit_h = Some(hcount as u32 - 1);
            continue;
        }
        let explicit = ctab.mol.hydrogen_neighbors(node).len() as i32;
        let leaf = if hcount == 1 {
            AtomLeaf::total_h(explicit)
        } else {
            AtomLeaf::TotalH(explicit + hcount - 1..=OPEN_END)
        };
        constrain(&mut ctab.mol[node], leaf, 0)?;
    }
    Ok(())
}

/// A bond is stereo care when it is a possible stereo bond and either it
/// or both of its atoms were boxed.
fn apply_stereo_care<F: Flavor>(ctab: &mut Ctab<F>) {
    let edges: Vec<(EdgeIndex, NodeIndex, NodeIndex)> = ctab.mol.bonds().map(|(edge, a, b, _)| (edge, a, b)).collect();
    for (edge, a, b) in edges {
        let boxed = ctab.stereo_care_bonds.contains(&edge) || (ctab.mol[a].stereo_care && ctab.mol[b].stereo_care);
        if boxed && !ctab.mol[edge].ignore_cis_trans && is_geom_stereo_bond(&ctab.mol, edge, true).is_some() {
            ctab.mol[edge].stereo_care = true;
        }
    }
}

/// Either bonds make a nearby double bond unknown. Returns the either
/// bonds that were used that way.
fn apply_either_bonds<F: Flavor>(mol: &mut MoleculeGraph<F>) -> HashSet<EdgeIndex> {
    let mut sensible = HashSet::new();
    let either: Vec<(EdgeIndex, NodeIndex)> = mol
        .bonds()
        .filter(|(_, _, _, bond)| bond.direction == BondDirection::Either)
        .map(|(edge, beg, _, _)| (edge, beg))
        .collect();
    for (edge, beg) in either {
        if is_geom_stereo_bond(mol, edge, true).is_some() {
            mol[edge].ignore_cis_trans = true;
            sensible.insert(edge);
            continue;
        }
        let double = mol
            .incident(beg)
            .into_iter()
            .map(|(other, _)| other)
            .find(|&other| is_geom_stereo_bond(mol, other, true).is_some());
        if let Some(double) = double {
            mol[double].ignore_cis_trans = true;
            sensible.insert(edge);
        }
    }
    sensible
}

/// Group for wedged atoms without an explicit label.
fn default_group(chiral: bool, treat: TreatStereoAs) -> StereoGroup {
    match treat {
        TreatStereoAs::UseChiralFlag if !chiral => StereoGroup::new(StereoKind::And, 1),
        TreatStereoAs::UseChiralFlag | TreatStereoAs::Absolute => StereoGroup::new(StereoKind::Abs, 0),
        TreatStereoAs::OrGroup => StereoGroup::new(StereoKind::Or, 1),
        TreatStereoAs::AndGroup => StereoGroup::new(StereoKind::And, 1),
        TreatStereoAs::Any => StereoGroup::new(StereoKind::Any, 0),
    }
}

/// Marks the atoms that wedges begin at, with the group they should get.
fn flag_stereo_atoms<F: Flavor>(ctab: &mut Ctab<F>, options: &LoaderOptions) {
    let default = default_group(ctab.mol.chiral_flag, options.treat_stereo_as);
    let mut hints: BTreeMap<NodeIndex, StereoGroup> = BTreeMap::new();
    for (_, beg, _, bond) in ctab.mol.bonds() {
        match bond.direction {
            BondDirection::None => {}
            BondDirection::Either => {
                hints.insert(beg, StereoGroup::new(StereoKind::Any, 0));
            }
            BondDirection::Up | BondDirection::Down => {
                hints.entry(beg).or_insert(default);
            }
        }
    }
    hints.retain(|&node, _| (3..=4).contains(&ctab.mol.degree(node)));
    for (&node, &group) in &ctab.stereo_labels {
        if let Some(hint) = hints.get_mut(&node) {
            *hint = group;
        }
    }
    for (node, group) in hints {
        ctab.mol[node].stereo_group = Some(group);
    }
}

/// Everything after the last block of a CTAB is read.
pub(super) fn finish<F: Flavor>(ctab: &mut Ctab<F>, options: &LoaderOptions) -> Result<(), MolfileError> {
    rsite_attachment_defaults(&mut ctab.mol);
    implicit_h_from_data_groups(ctab);
    apply_hydrogen_counts(ctab)?;
    ctab.mol.update_topology();

    if F::IS_QUERY {
        apply_stereo_care(ctab);
    }
    let sensible = apply_either_bonds(&mut ctab.mol);

    flag_stereo_atoms(ctab, options);
    stereo::perceive(&mut ctab.mol, options)?;

    for (&node, group) in &ctab.stereo_labels {
        if ctab.mol.stereocenters.contains_key(&node) {
            continue;
        }
        if F::IS_QUERY {
            debug!("atom {} is labelled {:?} but is no stereocenter", node.index(), group);
        } else if options.ignore_stereochemistry_errors {
            warn!("atom {} is labelled {:?} but is no stereocenter, label dropped", node.index(), group);
        } else {
            return Err(MolfileError::NotAStereocenter(node.index()));
        }
    }
    stereo::check_wedges(&ctab.mol, &sensible, options)?;

    for sgroup in &ctab.mol.sgroups {
        if sgroup.kind == SGroupKind::Data && !sgroup.data.name.is_empty() {
            ctab.mol.properties.insert(sgroup.data.name.clone(), sgroup.data.value.clone());
        }
    }
    Ok(())
}

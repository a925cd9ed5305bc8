//! Fixed-column V2000 connection tables and RGfile R-group blocks.

use std::collections::HashMap;

use tracing::*;

use super::fields::{Columns, Lines};
use super::*;
use crate::geometry::Vec3;
use crate::graph::{Connectivity, RGroup, SGroup, SGroupKind, SuperatomAttachment};
use crate::query::BondLeaf;

/// S-groups of one CTAB, by the number the file gives them.
#[derive(Debug, Default)]
struct SGroups {
    index: HashMap<i32, usize>,
    parents: Vec<(usize, i32)>,
}

impl SGroups {
    fn get<'m, F: Flavor>(&self, mol: &'m mut MoleculeGraph<F>, id: i32, line: usize) -> Result<&'m mut SGroup, MolfileError> {
        let index = *self.index.get(&id).ok_or(MolfileError::NoSuchSGroup { line, id })?;
        Ok(&mut mol.sgroups[index])
    }
}

/// Reads `n` `(number, value)` pairs of `width`-column values, as in
/// `M  CHGnn8 aaa vvv ...`.
fn pairs(cols: &mut Columns, value_width: usize, field: &'static str) -> Result<Vec<(i32, String)>, MolfileError> {
    let n = cols.required_int(3, "entry count")?;
    let mut out = vec![];
    for _ in 0..n {
        cols.skip(1);
        let number = cols.required_int(3, field)?;
        cols.skip(1);
        out.push((number, cols.text(value_width)?.to_owned()));
    }
    Ok(out)
}

fn int_pairs(cols: &mut Columns, field: &'static str) -> Result<Vec<(i32, i32)>, MolfileError> {
    let line = cols.number();
    pairs(cols, 3, field)?
        .into_iter()
        .map(|(number, value)| {
            value
                .parse()
                .map(|value| (number, value))
                .map_err(|_| MolfileError::BadNumber { line, field, text: value })
        })
        .collect()
}

/// `sss nn8 aaa aaa ...`: an S-group number followed by a counted list.
fn sgroup_list(cols: &mut Columns) -> Result<(i32, Vec<i32>), MolfileError> {
    cols.skip(1);
    let id = cols.required_int(3, "S-group number")?;
    let n = cols.required_int(3, "entry count")?;
    let mut items = vec![];
    for _ in 0..n {
        cols.skip(1);
        items.push(cols.required_int(3, "S-group entry")?);
    }
    Ok((id, items))
}

/// `sss` followed by free text.
fn sgroup_text<'a>(cols: &mut Columns<'a>) -> Result<(i32, &'a str), MolfileError> {
    cols.skip(1);
    let id = cols.required_int(3, "S-group number")?;
    cols.skip(1);
    Ok((id, cols.rest()?))
}

fn read_atom<F: Flavor>(line: &str, number: usize, ctab: &mut Ctab<F>, options: &LoaderOptions) -> Result<(), MolfileError> {
    let mut cols = Columns::new(line, number);
    let x = cols.float(10, "x")?;
    let y = cols.float(10, "y")?;
    let z = cols.float(10, "z")?;
    cols.skip(1);
    let label = cols.text(3)?;
    let mut atom = atom_from_label::<F>(label, options, number)?;
    atom.position = Vec3::new(x, y, z);

    let mass_difference = cols.int(2, "mass difference")?;
    if mass_difference != 0 {
        match atom.number() {
            Some(element) => {
                let isotope = ELEMENTS.default_isotope(element) as i32 + mass_difference;
                set_isotope(&mut atom, isotope.max(0) as u16, number)?;
            }
            None => {
                return Err(MolfileError::PseudoIsotope {
                    line: number,
                    label: label.to_owned(),
                })
            }
        }
    }

    let charge = match cols.int(3, "charge")? {
        0 => 0,
        1 => 3,
        2 => 2,
        3 => 1,
        4 => {
            set_radical(&mut atom, 2, number)?;
            0
        }
        5 => -1,
        6 => -2,
        7 => -3,
        value => {
            return Err(MolfileError::BadValue {
                line: number,
                field: "charge",
                value,
            })
        }
    };
    if charge != 0 {
        constrain(&mut atom, AtomLeaf::Charge(charge), number)?;
    }

    // parity is recomputed from the wedges
    cols.skip(3);
    let mut hcount = cols.int(3, "hydrogen count")?;
    if hcount != 0 && !query_feature::<F>(options, number, "H count")? {
        hcount = 0;
    }
    if cols.int(3, "stereo care")? > 0 && query_feature::<F>(options, number, "stereo care box")? {
        atom.stereo_care = true;
    }
    match cols.int(3, "valence")? {
        0 => {}
        15 => constrain(&mut atom, AtomLeaf::Valence(0), number)?,
        valence @ 1..=14 => constrain(&mut atom, AtomLeaf::Valence(valence), number)?,
        value => {
            return Err(MolfileError::BadValue {
                line: number,
                field: "valence",
                value,
            })
        }
    }
    cols.skip(9);
    atom.mapping = cols.int(3, "atom-atom mapping")?.max(0) as u32;
    atom.inversion = cols.int(3, "inversion")?;
    atom.exact_change = cols.int(3, "exact change")? > 0;

    ctab.add_atom(atom, hcount);
    Ok(())
}

fn read_bond<F: Flavor>(line: &str, number: usize, ctab: &mut Ctab<F>, options: &LoaderOptions) -> Result<(), MolfileError> {
    let mut cols = Columns::new(line, number);
    let beg = cols.required_int(3, "first atom")?;
    let end = cols.required_int(3, "second atom")?;
    let code = cols.required_int(3, "bond type")?;
    let stereo = cols.int(3, "bond stereo")?;
    let (beg, end) = (ctab.node(beg, number)?, ctab.node(end, number)?);

    let mut bond = bond_from_code::<F>(code, number)?;
    match stereo {
        0 => {}
        1 => bond.direction = BondDirection::Up,
        6 => bond.direction = BondDirection::Down,
        4 => bond.direction = BondDirection::Either,
        3 => bond.ignore_cis_trans = true,
        value => {
            return Err(MolfileError::BadValue {
                line: number,
                field: "bond stereo",
                value,
            })
        }
    }
    cols.skip(3);
    let topology = match cols.int(3, "bond topology")? {
        0 => None,
        1 => Some(Topology::Ring),
        2 => Some(Topology::Chain),
        value => {
            return Err(MolfileError::BadValue {
                line: number,
                field: "bond topology",
                value,
            })
        }
    };
    if let Some(topology) = topology {
        if query_feature::<F>(options, number, "bond topology")? {
            bond.constrain(BondLeaf::Topology(topology))
                .map_err(|source| MolfileError::Graph { line: number, source })?;
        }
    }
    bond.reacting_center = cols.int(3, "reacting center")?;

    ctab.mol
        .add_bond(beg, end, bond)
        .map_err(|source| MolfileError::Graph { line: number, source })?;
    Ok(())
}

/// `M  ALS aaannn e 11112222...`
fn read_atom_list<F: Flavor>(cols: &mut Columns, ctab: &mut Ctab<F>, options: &LoaderOptions) -> Result<(), MolfileError> {
    let line = cols.number();
    require_query::<F>(line, "atom lists")?;
    cols.skip(1);
    let atom = cols.required_int(3, "atom number")?;
    let n = cols.required_int(3, "entry count")?;
    cols.skip(1);
    let negated = match cols.text(1)? {
        "T" => true,
        "F" | "" => false,
        other => {
            return Err(MolfileError::AtomList {
                line,
                reason: format!("exclusion flag {other:?}"),
            })
        }
    };
    cols.skip(1);
    let mut entries = vec![];
    for _ in 0..n {
        entries.push(cols.text(4)?);
    }
    let tree = atom_list(&entries, negated, options, line)?;
    let atom = ctab.atom_mut(atom, line)?;
    // an atom list replaces whatever the label said
    atom.query = F::kind_query(&AtomKind::Query);
    atom.kind = AtomKind::Query;
    atom.attach(tree).map_err(|source| MolfileError::Graph { line, source })
}

/// `M  LOG  1 rrr iii hhh ooo...`
fn read_rgroup_logic<F: Flavor>(cols: &mut Columns, mol: &mut MoleculeGraph<F>) -> Result<(), MolfileError> {
    let line = cols.number();
    cols.skip(3);
    cols.skip(1);
    let rgroup = cols.required_int(3, "R-group number")?;
    cols.skip(1);
    let if_then = cols.int(3, "if-then R-group")?;
    cols.skip(1);
    let rest_h = cols.int(3, "rest H")?;
    cols.skip(1);
    let text = cols.rest()?.trim();
    let occurrence = RGroup::<F>::parse_occurrence(text).ok_or_else(|| MolfileError::Malformed {
        line,
        reason: format!("bad R-group occurrence {text:?}"),
    })?;
    if rgroup < 1 {
        return Err(MolfileError::BadValue { line, field: "R-group number", value: rgroup });
    }
    let group = mol.rgroups.entry(rgroup as u32).or_default();
    group.if_then = if_then.max(0) as u32;
    group.rest_h = rest_h > 0;
    group.occurrence = occurrence;
    Ok(())
}

/// One `M  xxx` property line. Returns `false` on `M  END`.
fn read_property<F: Flavor>(
    line: &str,
    number: usize,
    ctab: &mut Ctab<F>,
    sgroups: &mut SGroups,
    options: &LoaderOptions,
) -> Result<bool, MolfileError> {
    let mut cols = Columns::new(line, number);
    cols.skip(3);
    let tag = cols.raw(3)?;
    match tag {
        "END" => return Ok(false),
        "CHG" => {
            for (atom, charge) in int_pairs(&mut cols, "atom number")? {
                replace(ctab.atom_mut(atom, number)?, AtomLeaf::Charge(charge), number)?;
            }
        }
        "RAD" => {
            for (atom, code) in int_pairs(&mut cols, "atom number")? {
                set_radical(ctab.atom_mut(atom, number)?, code, number)?;
            }
        }
        "ISO" => {
            for (atom, isotope) in int_pairs(&mut cols, "atom number")? {
                if isotope < 0 {
                    return Err(MolfileError::BadValue { line: number, field: "isotope", value: isotope });
                }
                set_isotope(ctab.atom_mut(atom, number)?, isotope as u16, number)?;
            }
        }
        "SUB" => {
            require_query::<F>(number, "substitution counts")?;
            for (atom, value) in int_pairs(&mut cols, "atom number")? {
                let node = ctab.node(atom, number)?;
                substituent_count(ctab, node, value, number)?;
            }
        }
        "RBC" => {
            for (atom, value) in int_pairs(&mut cols, "atom number")? {
                if query_feature::<F>(options, number, "ring bond count")? {
                    let node = ctab.node(atom, number)?;
                    ring_bond_count(ctab, node, value, number)?;
                }
            }
        }
        "UNS" => {
            for (atom, value) in int_pairs(&mut cols, "atom number")? {
                if value > 0 && query_feature::<F>(options, number, "unsaturation")? {
                    constrain(ctab.atom_mut(atom, number)?, AtomLeaf::Unsaturated, number)?;
                }
            }
        }
        "ALS" => read_atom_list(&mut cols, ctab, options)?,
        "AAL" => {
            cols.skip(1);
            let site = cols.required_int(3, "R-site number")?;
            let mut order = vec![];
            for (neighbor, position) in int_pairs(&mut cols, "atom number")? {
                order.push((position, ctab.node(neighbor, number)?));
            }
            order.sort_by_key(|(position, _)| *position);
            ctab.atom_mut(site, number)?.attachment_order = order.into_iter().map(|(_, node)| node).collect();
        }
        "RGP" => {
            for (atom, rgroup) in int_pairs(&mut cols, "atom number")? {
                if rgroup > 0 {
                    ctab.atom_mut(atom, number)?.allow_rgroup(rgroup as u32);
                }
            }
        }
        "LOG" => read_rgroup_logic(&mut cols, &mut ctab.mol)?,
        "APO" => {
            for (atom, kind) in int_pairs(&mut cols, "atom number")? {
                let bits = match kind {
                    -1 => 3,
                    0..=3 => kind as u8,
                    value => return Err(MolfileError::BadValue { line: number, field: "attachment point", value }),
                };
                ctab.atom_mut(atom, number)?.attachment_points |= bits;
            }
        }
        "STY" => {
            for (id, code) in pairs(&mut cols, 3, "S-group number")? {
                sgroups.index.insert(id, ctab.mol.sgroups.len());
                ctab.mol.sgroups.push(SGroup::new(SGroupKind::from_code(&code), id.max(0) as u32));
            }
        }
        "SST" => {
            for (id, subtype) in pairs(&mut cols, 3, "S-group number")? {
                sgroups.get(&mut ctab.mol, id, number)?.subtype = subtype;
            }
        }
        "SLB" => {
            for (id, label) in pairs(&mut cols, 3, "S-group number")? {
                sgroups.get(&mut ctab.mol, id, number)?.label = label;
            }
        }
        "SPL" => {
            for (id, parent) in int_pairs(&mut cols, "S-group number")? {
                let index = *sgroups.index.get(&id).ok_or(MolfileError::NoSuchSGroup { line: number, id })?;
                sgroups.parents.push((index, parent));
            }
        }
        "SCN" => {
            for (id, code) in pairs(&mut cols, 3, "S-group number")? {
                let connectivity = Connectivity::from_code(&code).ok_or_else(|| MolfileError::Malformed {
                    line: number,
                    reason: format!("unknown S-group connectivity {code:?}"),
                })?;
                sgroups.get(&mut ctab.mol, id, number)?.connectivity = connectivity;
            }
        }
        "SAL" | "SPA" => {
            let (id, atoms) = sgroup_list(&mut cols)?;
            let nodes = atoms.into_iter().map(|atom| ctab.node(atom, number)).collect::<Result<Vec<_>, _>>()?;
            let sgroup = sgroups.get(&mut ctab.mol, id, number)?;
            if tag == "SAL" {
                sgroup.atoms.extend(nodes);
            } else {
                sgroup.parent_atoms.extend(nodes);
            }
        }
        "SBL" => {
            let (id, bonds) = sgroup_list(&mut cols)?;
            let edges = bonds.into_iter().map(|bond| ctab.edge(bond, number)).collect::<Result<Vec<_>, _>>()?;
            sgroups.get(&mut ctab.mol, id, number)?.bonds.extend(edges);
        }
        "SDI" => {
            let (id, rest) = sgroup_text(&mut cols)?;
            let mut words = rest.split_whitespace();
            // the count is always 4
            words.next();
            let coords = words
                .map(|word| {
                    word.parse::<f64>().map_err(|_| MolfileError::BadNumber {
                        line: number,
                        field: "bracket coordinate",
                        text: word.to_owned(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            if coords.len() != 4 {
                return Err(MolfileError::Malformed {
                    line: number,
                    reason: format!("a bracket needs 4 coordinates, got {}", coords.len()),
                });
            }
            sgroups.get(&mut ctab.mol, id, number)?.brackets.push([
                Vec3::new(coords[0], coords[1], 0.0),
                Vec3::new(coords[2], coords[3], 0.0),
            ]);
        }
        "SMT" => {
            let (id, text) = sgroup_text(&mut cols)?;
            let text = text.trim();
            let sgroup = sgroups.get(&mut ctab.mol, id, number)?;
            if sgroup.kind == SGroupKind::Multiple {
                sgroup.multiplier = text.parse().map_err(|_| MolfileError::BadNumber {
                    line: number,
                    field: "multiplier",
                    text: text.to_owned(),
                })?;
            } else {
                sgroup.subscript = text.to_owned();
            }
        }
        "SCL" => {
            let (id, text) = sgroup_text(&mut cols)?;
            sgroups.get(&mut ctab.mol, id, number)?.class = text.trim().to_owned();
        }
        "SDT" => {
            let (id, text) = sgroup_text(&mut cols)?;
            let name = Columns::new(text, number).text(30)?.to_owned();
            sgroups.get(&mut ctab.mol, id, number)?.data.name = name;
        }
        "SDD" => {
            let (id, text) = sgroup_text(&mut cols)?;
            sgroups.get(&mut ctab.mol, id, number)?.data.display = text.trim_end().to_owned();
        }
        "SCD" | "SED" => {
            let (id, text) = sgroup_text(&mut cols)?;
            let data = &mut sgroups.get(&mut ctab.mol, id, number)?.data.value;
            if tag == "SED" {
                data.push_str(text.trim_end());
                data.push('\n');
            } else {
                data.push_str(text);
            }
        }
        "SAP" => {
            cols.skip(1);
            let id = cols.required_int(3, "S-group number")?;
            let n = cols.required_int(3, "entry count")?;
            let mut attachments = vec![];
            for _ in 0..n {
                cols.skip(1);
                let atom = ctab.node(cols.required_int(3, "atom number")?, number)?;
                cols.skip(1);
                let leaving = match cols.int(3, "leaving atom")? {
                    0 => None,
                    leaving => Some(ctab.node(leaving, number)?),
                };
                // attachment id
                cols.skip(3);
                attachments.push(SuperatomAttachment { atom, leaving });
            }
            sgroups.get(&mut ctab.mol, id, number)?.attachments.extend(attachments);
        }
        "SBV" => {
            cols.skip(1);
            let id = cols.required_int(3, "S-group number")?;
            cols.skip(1);
            let bond = ctab.edge(cols.required_int(3, "bond number")?, number)?;
            let mut words = cols.rest()?.split_whitespace().map(str::parse::<f64>);
            let (Some(Ok(x)), Some(Ok(y))) = (words.next(), words.next()) else {
                return Err(MolfileError::Malformed {
                    line: number,
                    reason: "a bond vector needs 2 coordinates".to_owned(),
                });
            };
            sgroups.get(&mut ctab.mol, id, number)?.bond_vectors.push((bond, Vec3::new(x, y, 0.0)));
        }
        "SDS" => {
            cols.skip(1);
            if cols.text(3)? == "EXP" {
                let n = cols.required_int(3, "entry count")?;
                for _ in 0..n {
                    cols.skip(1);
                    let id = cols.required_int(3, "S-group number")?;
                    sgroups.get(&mut ctab.mol, id, number)?.expanded = true;
                }
            }
        }
        _ => debug!("line {number}: skipping \"M  {tag}\""),
    }
    Ok(true)
}

/// Links child S-groups to their parents and finishes data fields.
fn finish_sgroups<F: Flavor>(mol: &mut MoleculeGraph<F>, sgroups: SGroups, line: usize) -> Result<(), MolfileError> {
    for (child, parent) in sgroups.parents {
        let index = *sgroups.index.get(&parent).ok_or(MolfileError::NoSuchSGroup { line, id: parent })?;
        if index != child {
            mol.sgroups[child].parent = Some(index);
        }
    }
    for sgroup in &mut mol.sgroups {
        if sgroup.data.value.ends_with('\n') {
            sgroup.data.value.pop();
        }
    }
    Ok(())
}

/// Reads the atom, bond and property blocks after the counts line.
pub(super) fn read_ctab<F: Flavor>(
    lines: &mut Lines,
    ctab: &mut Ctab<F>,
    counts: Counts,
    options: &LoaderOptions,
) -> Result<(), MolfileError> {
    for _ in 0..counts.atoms {
        let line = lines.next()?;
        read_atom(line, lines.number(), ctab, options)?;
    }
    for _ in 0..counts.bonds {
        let line = lines.next()?;
        read_bond(line, lines.number(), ctab, options)?;
    }

    let mut sgroups = SGroups::default();
    loop {
        let line = lines.next()?;
        let number = lines.number();
        if line.starts_with("M  ") {
            if !read_property(line, number, ctab, &mut sgroups, options)? {
                break;
            }
        } else if let Some(rest) = line.strip_prefix('A') {
            let index = rest.trim().parse().map_err(|_| MolfileError::BadNumber {
                line: number,
                field: "alias atom",
                text: rest.trim().to_owned(),
            })?;
            let text = lines.next()?.trim();
            let alias = text
                .strip_prefix('\'')
                .and_then(|t| t.strip_suffix('\''))
                .unwrap_or(text)
                .to_owned();
            if alias.is_empty() {
                return Err(MolfileError::Malformed { line: lines.number(), reason: "empty alias".to_owned() });
            }
            let atom = ctab.atom_mut(index, number)?;
            match atom.kind {
                AtomKind::Element(_) => atom.alias = Some(alias),
                _ => replace(atom, AtomLeaf::Pseudo(alias), number)?,
            }
        } else if let Some(rest) = line.strip_prefix('V') {
            let mut cols = Columns::new(rest, number);
            let index = cols.required_int(5, "value atom")?;
            let text = cols.rest()?.trim();
            if !text.is_empty() {
                ctab.atom_mut(index, number)?.value = Some(text.to_owned());
            }
        } else if line.starts_with('G') {
            // group abbreviation and its text line
            lines.next()?;
        } else {
            debug!("line {number}: skipping {line:?}");
        }
    }
    finish_sgroups(&mut ctab.mol, sgroups, lines.number())?;
    ctab.resolve_as_drawn(lines.number())
}

/// The `$RGP` blocks of an RGfile, up to `$END MOL`.
pub(super) fn read_rgroups<F: Flavor>(
    lines: &mut Lines,
    mol: &mut MoleculeGraph<F>,
    options: &LoaderOptions,
    depth: usize,
) -> Result<(), MolfileError> {
    while let Ok(line) = lines.next() {
        let line = line.trim();
        if line == "$END MOL" {
            break;
        }
        if line != "$RGP" {
            continue;
        }
        let text = lines.next()?.trim();
        let rgroup: u32 = text.parse().map_err(|_| MolfileError::BadNumber {
            line: lines.number(),
            field: "R-group number",
            text: text.to_owned(),
        })?;
        loop {
            let line = lines.next()?.trim();
            match line {
                "$END RGP" => break,
                "$CTAB" => {
                    check_depth(depth + 1, options)?;
                    let counts = read_counts(lines)?;
                    let mut fragment = Ctab::<F>::new(counts.chiral || options.ignore_no_chiral_flag);
                    read_ctab(lines, &mut fragment, counts, options)?;
                    postload::finish(&mut fragment, options)?;
                    mol.rgroups.entry(rgroup).or_default().fragments.push(fragment.mol);
                }
                _ => trace!("skipping {line:?} inside $RGP"),
            }
        }
        debug!("read R-group {rgroup}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::tests::ETHANOL;
    use super::*;
    use crate::element::{C, CL, N, O};
    use crate::graph::{Molecule, QueryMolecule, StereoKind};

    fn query(text: &str) -> QueryMolecule {
        load(text, &LoaderOptions::default(), 0).unwrap()
    }

    fn node(n: usize) -> NodeIndex {
        NodeIndex::new(n)
    }

    #[test]
    fn test_charges_and_isotopes() {
        let text = "
  handwritten

  2  1  0  0  0  0  0  0  0  0999 V2000
    0.0000    0.0000    0.0000 N   0  3  0  0  0  0  0  0  0  0  0  0
    1.0000    0.0000    0.0000 C   1  0  0  0  0  0  0  0  0  0  0  0
  1  2  1  0
M  CHG  1   1   1
M  ISO  1   2  14
M  END
";
        let mol: Molecule = load(text, &LoaderOptions::default(), 0).unwrap();
        assert_eq!(mol[node(0)].charge, 1);
        assert_eq!(mol[node(1)].isotope, 14);
        assert_eq!(mol.implicit_hydrogens(node(0)), 3);
    }

    #[test]
    fn test_bad_charge_code() {
        let text = "\n\n\n  1  0  0  0  0  0  0  0  0  0999 V2000
    0.0000    0.0000    0.0000 C   0  9  0  0  0  0  0  0  0  0  0  0
M  END
";
        assert!(matches!(
            load::<Concrete>(text, &LoaderOptions::default(), 0),
            Err(MolfileError::BadValue { field: "charge", value: 9, .. })
        ));
    }

    #[test]
    fn test_hydrogen_count_needs_query() {
        let text = "\n\n\n  1  0  0  0  0  0  0  0  0  0999 V2000
    0.0000    0.0000    0.0000 C   0  0  0  2  0  0  0  0  0  0  0  0
M  END
";
        assert!(matches!(
            load::<Concrete>(text, &LoaderOptions::default(), 0),
            Err(MolfileError::QueryOnly { line: 4, .. })
        ));

        let options = LoaderOptions::default().with_ignore_non_critical_query_features(true);
        let mol: Molecule = load(text, &options, 0).unwrap();
        // the field is dropped and the carbon gets its usual hydrogens
        assert_eq!(mol[node(0)].implicit_h, None);
        assert_eq!(mol.implicit_hydrogens(node(0)), 4);

        let query = query(text);
        let tree = query[node(0)].constraint().unwrap();
        assert!(tree.mentions(&AtomLeaf::TotalH(1..=OPEN_END)));
    }

    #[test]
    fn test_label_splits_character() {
        let text = "\n\n\n  1  0  0  0  0  0  0  0  0  0999 V2000
    0.0000    0.0000    0.0000 CCé 0  0  0  0  0  0  0  0  0  0  0  0
M  END
";
        assert!(matches!(
            load::<Concrete>(text, &LoaderOptions::default(), 0),
            Err(MolfileError::Malformed { line: 4, .. })
        ));
    }

    #[test]
    fn test_query_properties() {
        let text = "
  handwritten

  3  2  0  0  0  0  0  0  0  0999 V2000
    0.0000    0.0000    0.0000 L   0  0  0  0  0  0  0  0  0  0  0  0
    1.0000    0.0000    0.0000 C   0  0  0  0  0  0  0  0  0  0  0  0
    2.0000    0.0000    0.0000 A   0  0  0  0  0  0  0  0  0  0  0  0
  1  2  6  0  0  1
  2  3  8  0
M  ALS   1  2 F N   O
M  SUB  2   1   2   2  -2
M  UNS  1   3   1
M  END
";
        let mol = query(text);
        assert!(mol[node(0)].possible_number(N));
        assert!(mol[node(0)].possible_number(O));
        assert!(!mol[node(0)].possible_number(C));
        assert_eq!(mol[node(0)].kind, AtomKind::Query);

        let carbon = mol[node(1)].constraint().unwrap();
        assert!(carbon.mentions(&AtomLeaf::Substituents(2..=2)));
        assert!(mol[node(2)].constraint().unwrap().mentions(&AtomLeaf::Unsaturated));

        let first = &mol[EdgeIndex::new(0)];
        assert!(first.possible_order(BondOrder::Single));
        assert!(first.constraint().unwrap().mentions(&BondLeaf::Topology(Topology::Ring)));
        assert!(mol[EdgeIndex::new(1)].possible_order(BondOrder::Triple));
    }

    #[test]
    fn test_atom_list_needs_query() {
        let text = "\n\n\n  1  0  0  0  0  0  0  0  0  0999 V2000
    0.0000    0.0000    0.0000 C   0  0  0  0  0  0  0  0  0  0  0  0
M  ALS   1  2 T N   O
M  END
";
        assert!(matches!(
            load::<Concrete>(text, &LoaderOptions::default(), 0),
            Err(MolfileError::QueryOnly { .. })
        ));
        let mol = query(text);
        assert!(mol[node(0)].possible_number(C));
        assert!(!mol[node(0)].possible_number(N));
    }

    #[test]
    fn test_aliases() {
        let text = "\n\n\n  2  1  0  0  0  0  0  0  0  0999 V2000
    0.0000    0.0000    0.0000 C   0  0  0  0  0  0  0  0  0  0  0  0
    1.0000    0.0000    0.0000 R#  0  0  0  0  0  0  0  0  0  0  0  0
  1  2  1  0
A    1
CH3
A    2
'Boc'
V    1 methyl end
M  END
";
        let mol: Molecule = load(text, &LoaderOptions::default(), 0).unwrap();
        assert_eq!(mol[node(0)].alias.as_deref(), Some("CH3"));
        assert_eq!(mol[node(1)].kind, AtomKind::Pseudo("Boc".to_owned()));
        assert_eq!(mol[node(0)].value.as_deref(), Some("methyl end"));
    }

    #[test]
    fn test_sgroups() {
        let text = "\n\n\n  3  2  0  0  0  0  0  0  0  0999 V2000
    0.0000    0.0000    0.0000 C   0  0  0  0  0  0  0  0  0  0  0  0
    1.0000    0.0000    0.0000 C   0  0  0  0  0  0  0  0  0  0  0  0
    2.0000    0.0000    0.0000 Cl  0  0  0  0  0  0  0  0  0  0  0  0
  1  2  1  0
  2  3  1  0
M  STY  2   1 SUP   2 DAT
M  SLB  1   1   1
M  SAL   1  2   2   3
M  SBL   1  1   1
M  SMT   1 CH2Cl
M  SAP   1  1   2   1 1
M  SBV   1   1    0.5000    0.0000
M  SAL   2  1   3
M  SDT   2 comment                       F
M  SED   2 first line
M  SED   2 second line
M  SPL  1   2   1
M  SDS EXP  1   1
M  END
";
        let mol: Molecule = load(text, &LoaderOptions::default(), 0).unwrap();
        assert_eq!(mol.sgroups.len(), 2);
        let superatom = &mol.sgroups[0];
        assert_eq!(superatom.kind, SGroupKind::Superatom);
        assert_eq!(superatom.atoms, vec![node(1), node(2)]);
        assert_eq!(superatom.bonds, vec![EdgeIndex::new(0)]);
        assert_eq!(superatom.subscript, "CH2Cl");
        assert_eq!(superatom.attachments, vec![SuperatomAttachment { atom: node(1), leaving: Some(node(0)) }]);
        assert_eq!(superatom.bond_vectors, vec![(EdgeIndex::new(0), Vec3::new(0.5, 0.0, 0.0))]);
        assert!(superatom.expanded);

        let data = &mol.sgroups[1];
        assert_eq!(data.kind, SGroupKind::Data);
        assert!(!data.expanded);
        assert_eq!(data.parent, Some(0));
        assert_eq!(data.data.name, "comment");
        assert_eq!(data.data.value, "first line\nsecond line");
        assert_eq!(mol.properties["comment"], "first line\nsecond line");
        assert_eq!(mol[node(2)].number(), Some(CL));
    }

    #[test]
    fn test_unknown_sgroup() {
        let text = "\n\n\n  1  0  0  0  0  0  0  0  0  0999 V2000
    0.0000    0.0000    0.0000 C   0  0  0  0  0  0  0  0  0  0  0  0
M  SAL   4  1   1
M  END
";
        assert!(matches!(
            load::<Concrete>(text, &LoaderOptions::default(), 0),
            Err(MolfileError::NoSuchSGroup { id: 4, .. })
        ));
    }

    const CHIRAL: &str = "
  handwritten

  5  4  0  0  1  0  0  0  0  0999 V2000
    0.0000    0.0000    0.0000 C   0  0  0  0  0  0  0  0  0  0  0  0
    1.0000    0.0000    0.0000 F   0  0  0  0  0  0  0  0  0  0  0  0
    0.0000    1.0000    0.0000 Cl  0  0  0  0  0  0  0  0  0  0  0  0
   -1.0000    0.0000    0.0000 Br  0  0  0  0  0  0  0  0  0  0  0  0
    0.0000   -1.0000    0.0000 I   0  0  0  0  0  0  0  0  0  0  0  0
  1  2  1  1
  1  3  1  0
  1  4  1  0
  1  5  1  0
M  END
";

    #[test]
    fn test_chiral_flag() {
        let mol: Molecule = load(CHIRAL, &LoaderOptions::default(), 0).unwrap();
        assert!(mol.chiral_flag);
        let center = mol.stereocenters[&node(0)];
        assert_eq!((center.kind, center.group), (StereoKind::Abs, 0));
        assert_eq!(center.pyramid, [node(1), node(3), node(2), node(4)]);

        let unflagged = CHIRAL.replace("  5  4  0  0  1", "  5  4  0  0  0");
        let mol: Molecule = load(&unflagged, &LoaderOptions::default(), 0).unwrap();
        let center = mol.stereocenters[&node(0)];
        assert_eq!((center.kind, center.group), (StereoKind::And, 1));

        let options = LoaderOptions::default().with_ignore_no_chiral_flag(true);
        let mol: Molecule = load(&unflagged, &options, 0).unwrap();
        assert_eq!(mol.stereocenters[&node(0)].kind, StereoKind::Abs);
    }

    #[test]
    fn test_either_bond() {
        let either = CHIRAL.replace("  1  2  1  1", "  1  2  1  4");
        let mol: Molecule = load(&either, &LoaderOptions::default(), 0).unwrap();
        assert_eq!(mol.stereocenters[&node(0)].kind, StereoKind::Any);
    }

    #[test]
    fn test_either_double_bond() {
        let text = "\n\n\n  4  3  0  0  0  0  0  0  0  0999 V2000
   -1.0000    1.0000    0.0000 C   0  0  0  0  0  0  0  0  0  0  0  0
    0.0000    0.0000    0.0000 C   0  0  0  0  0  0  0  0  0  0  0  0
    1.0000    0.0000    0.0000 C   0  0  0  0  0  0  0  0  0  0  0  0
    2.0000    1.0000    0.0000 C   0  0  0  0  0  0  0  0  0  0  0  0
  1  2  1  0
  2  3  2  3
  3  4  1  0
M  END
";
        let mol: Molecule = load(text, &LoaderOptions::default(), 0).unwrap();
        assert!(mol[EdgeIndex::new(1)].ignore_cis_trans);
        assert_eq!(mol.cis_trans[&EdgeIndex::new(1)].parity, crate::graph::CisTransParity::Ignored);

        let drawn = text.replace("  2  3  2  3", "  2  3  2  0");
        let mol: Molecule = load(&drawn, &LoaderOptions::default(), 0).unwrap();
        assert_eq!(mol.cis_trans[&EdgeIndex::new(1)].parity, crate::graph::CisTransParity::Cis);
    }

    #[test]
    fn test_rgfile() {
        let text = "$MDL  REV  1
$MOL
$HDR
scaffold


$END HDR
$CTAB
  2  1  0  0  0  0  0  0  0  0999 V2000
    0.0000    0.0000    0.0000 C   0  0  0  0  0  0  0  0  0  0  0  0
    1.0000    0.0000    0.0000 R#  0  0  0  0  0  0  0  0  0  0  0  0
  1  2  1  0
M  RGP  1   2   1
M  LOG  1   1   0   0   1-3
M  END
$END CTAB
$RGP
  1
$CTAB
  1  0  0  0  0  0  0  0  0  0999 V2000
    0.0000    0.0000    0.0000 O   0  0  0  0  0  0  0  0  0  0  0  0
M  APO  1   1   1
M  END
$END CTAB
$END RGP
$END MOL
";
        let mol = query(text);
        assert_eq!(mol.name, "scaffold");
        assert_eq!(mol[node(1)].allowed_rgroups(), vec![1]);
        let group = &mol.rgroups[&1];
        assert_eq!(group.occurrence, vec![1..=3]);
        assert_eq!(group.fragments.len(), 1);
        assert_eq!(group.fragments[0][node(0)].number(), Some(O));
        assert_eq!(group.fragments[0][node(0)].attachment_points, 1);

        let options = LoaderOptions::default().with_max_nesting_depth(0);
        assert_eq!(load::<Query>(text, &options, 0).unwrap_err(), MolfileError::TooDeep(0));
    }

    #[test]
    fn test_plain_molecule_loads() {
        let mol: Molecule = load(ETHANOL, &LoaderOptions::default(), 0).unwrap();
        assert!(mol.sgroups.is_empty());
        assert!(mol.stereocenters.is_empty());
    }
}

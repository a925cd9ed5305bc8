//! `M  V30` connection tables, with their collection, S-group, R-group
//! and template blocks.

use std::collections::HashMap;

use super::fields::{fields, Field, Lines, Value};
use super::*;
use crate::geometry::Vec3;
use crate::graph::{Connectivity, RGroup, SGroup, SGroupKind, SuperatomAttachment, Template};
use crate::query::BondLeaf;

const PREFIX: &str = "M  V30 ";

/// Splits one logical line into fields.
fn split(text: &str, line: usize) -> Result<Vec<Field>, MolfileError> {
    fields(text).map_err(|reason| MolfileError::Malformed { line, reason })
}

fn int(value: &Value, line: usize, field: &'static str) -> Result<i32, MolfileError> {
    value.int().ok_or_else(|| MolfileError::BadNumber {
        line,
        field,
        text: value.as_str().to_owned(),
    })
}

fn float(value: &Value, line: usize, field: &'static str) -> Result<f64, MolfileError> {
    value.as_str().parse().map_err(|_| MolfileError::BadNumber {
        line,
        field,
        text: value.as_str().to_owned(),
    })
}

fn int_list(value: &Value, line: usize, field: &'static str) -> Result<Vec<i32>, MolfileError> {
    value.int_items().ok_or_else(|| MolfileError::Malformed {
        line,
        reason: format!("bad {field} list"),
    })
}

/// Next logical line, which must be `expected`.
fn expect(lines: &mut Lines, expected: &str) -> Result<(), MolfileError> {
    let text = lines.next_v30()?;
    if text.trim() != expected {
        return Err(MolfileError::Malformed {
            line: lines.number(),
            reason: format!("expected {expected:?}, got {text:?}"),
        });
    }
    Ok(())
}

/// Whether the next raw line opens block `name`.
fn begins(lines: &Lines, name: &str) -> bool {
    lines
        .peek()
        .and_then(|line| line.strip_prefix(PREFIX))
        .is_some_and(|body| body.trim() == format!("BEGIN {name}"))
}

/// Skips an unknown block through its matching `END`.
fn skip_block(lines: &mut Lines, name: &str) -> Result<(), MolfileError> {
    debug!("line {}: skipping block {name}", lines.number());
    let end = format!("END {name}");
    loop {
        if lines.next_v30()?.trim() == end {
            return Ok(());
        }
    }
}

/// The atom symbol field: a label, a quoted pseudo atom, or a list such as
/// `[C,N]` with an optional leading `NOT`.
fn read_atom_symbol<F: Flavor>(
    fields: &mut std::slice::Iter<Field>,
    template: bool,
    options: &LoaderOptions,
    line: usize,
) -> Result<Atom<F>, MolfileError> {
    let missing = || MolfileError::Malformed { line, reason: "atom line too short".to_owned() };
    let mut symbol = fields.next().ok_or_else(missing)?;
    let mut negated = false;
    if symbol.value == Value::Word("NOT".to_owned()) {
        negated = true;
        symbol = fields.next().ok_or_else(missing)?;
    }
    match &symbol.value {
        Value::Quoted(label) => Ok(Atom::new(AtomKind::Pseudo(label.clone()))),
        Value::Word(word) if word.starts_with('[') => {
            require_query::<F>(line, "atom lists")?;
            let inner = word.trim_start_matches('[').trim_end_matches(']');
            let entries: Vec<&str> = inner.split(',').map(str::trim).collect();
            let mut atom = Atom::new(AtomKind::Query);
            atom.attach(atom_list(&entries, negated, options, line)?)
                .map_err(|source| MolfileError::Graph { line, source })?;
            Ok(atom)
        }
        Value::Word(word) if template => Ok(Atom::new(AtomKind::Template(word.clone()))),
        Value::Word(word) => atom_from_label(word, options, line),
        Value::List(_) => Err(MolfileError::Malformed { line, reason: "bad atom symbol".to_owned() }),
    }
}

fn read_atom<F: Flavor>(
    text: &str,
    line: usize,
    total: usize,
    ctab: &mut Ctab<F>,
    options: &LoaderOptions,
) -> Result<(), MolfileError> {
    let fields = split(text, line)?;
    let template = fields
        .iter()
        .any(|f| matches!(f.key.as_deref(), Some("CLASS") | Some("SEQID")));
    let mut iter = fields.iter();
    // the index itself is implied by the order of the lines
    iter.next();
    let mut atom = read_atom_symbol::<F>(&mut iter, template, options, line)?;

    let mut numbers = [0.0; 3];
    for (slot, name) in numbers.iter_mut().zip(["x", "y", "z"]) {
        let field = iter.next().ok_or(MolfileError::BadNumber { line, field: name, text: String::new() })?;
        *slot = float(&field.value, line, name)?;
    }
    atom.position = Vec3::new(numbers[0], numbers[1], numbers[2]);
    if let Some(field) = iter.next() {
        atom.mapping = int(&field.value, line, "atom-atom mapping")?.max(0) as u32;
    }

    let node = ctab.add_atom(atom, 0);
    for field in iter {
        let Some(key) = field.key.as_deref() else {
            return Err(MolfileError::Malformed {
                line,
                reason: format!("unexpected {:?} in atom line", field.value.as_str()),
            });
        };
        let value = &field.value;
        match key {
            "CHG" => {
                let charge = int(value, line, "charge")?;
                constrain(&mut ctab.mol[node], AtomLeaf::Charge(charge), line)?;
            }
            "RAD" => set_radical(&mut ctab.mol[node], int(value, line, "radical")?, line)?,
            // parity is recomputed from the wedges
            "CFG" => {}
            "MASS" => {
                let mass = int(value, line, "mass")?;
                if mass < 0 {
                    return Err(MolfileError::BadValue { line, field: "mass", value: mass });
                }
                set_isotope(&mut ctab.mol[node], mass as u16, line)?;
            }
            "VAL" => {
                let valence = match int(value, line, "valence")? {
                    -1 => 0,
                    valence => valence,
                };
                constrain(&mut ctab.mol[node], AtomLeaf::Valence(valence), line)?;
            }
            "HCOUNT" => {
                let hcount = int(value, line, "hydrogen count")?;
                if hcount != 0 && !query_feature::<F>(options, line, "H count")? {
                    continue;
                }
                // V2000 encoding: 1 for none, n + 1 for n
                ctab.hcount[node.index()] = match hcount {
                    -1 => 1,
                    n if n > 0 => n + 1,
                    _ => 0,
                };
            }
            "STBOX" => {
                if int(value, line, "stereo care")? > 0 && query_feature::<F>(options, line, "stereo care box")? {
                    ctab.mol[node].stereo_care = true;
                }
            }
            "INVRET" => ctab.mol[node].inversion = int(value, line, "inversion")?,
            "EXACHG" => ctab.mol[node].exact_change = int(value, line, "exact change")? > 0,
            "SUBST" => {
                require_query::<F>(line, "substitution counts")?;
                substituent_count(ctab, node, int(value, line, "substitution count")?, line)?;
            }
            "UNSAT" => {
                if int(value, line, "unsaturation")? > 0 && query_feature::<F>(options, line, "unsaturation")? {
                    constrain(&mut ctab.mol[node], AtomLeaf::Unsaturated, line)?;
                }
            }
            "RBCNT" => {
                let count = int(value, line, "ring bond count")?;
                if count != 0 && query_feature::<F>(options, line, "ring bond count")? {
                    ring_bond_count(ctab, node, count, line)?;
                }
            }
            "RGROUPS" => {
                for rgroup in int_list(value, line, "R-group")? {
                    if rgroup > 0 {
                        ctab.mol[node].allow_rgroup(rgroup as u32);
                    }
                }
            }
            "ATTCHPT" => {
                ctab.mol[node].attachment_points |= match int(value, line, "attachment point")? {
                    -1 => 3,
                    kind @ 0..=3 => kind as u8,
                    value => return Err(MolfileError::BadValue { line, field: "attachment point", value }),
                };
            }
            "ATTCHORD" => {
                let items = value.items().ok_or_else(|| MolfileError::Malformed {
                    line,
                    reason: "bad attachment order list".to_owned(),
                })?;
                let mut order = vec![];
                for pair in items.chunks(2) {
                    let neighbor: i32 = pair[0].parse().map_err(|_| MolfileError::BadNumber {
                        line,
                        field: "attachment neighbour",
                        text: pair[0].clone(),
                    })?;
                    if neighbor < 1 || neighbor as usize > total {
                        return Err(MolfileError::AtomIndex { line, index: neighbor });
                    }
                    let position = pair.get(1).and_then(|id| id.parse::<i32>().ok()).unwrap_or(order.len() as i32);
                    order.push((position, NodeIndex::new(neighbor as usize - 1)));
                }
                if ctab.mol[node].is_rsite() {
                    order.sort_by_key(|(position, _)| *position);
                }
                ctab.mol[node].attachment_order = order.into_iter().map(|(_, node)| node).collect();
            }
            "CLASS" => ctab.mol[node].template_class = Some(value.as_str().to_owned()),
            "SEQID" => ctab.mol[node].sequence_id = Some(int(value, line, "sequence id")?),
            _ => debug!("line {line}: skipping atom property {key}"),
        }
    }
    Ok(())
}

fn read_bond<F: Flavor>(text: &str, line: usize, ctab: &mut Ctab<F>, options: &LoaderOptions) -> Result<(), MolfileError> {
    let fields = split(text, line)?;
    if fields.len() < 4 {
        return Err(MolfileError::Malformed { line, reason: "bond line too short".to_owned() });
    }
    let code = int(&fields[1].value, line, "bond type")?;
    let beg = ctab.node(int(&fields[2].value, line, "first atom")?, line)?;
    let end = ctab.node(int(&fields[3].value, line, "second atom")?, line)?;
    let mut bond = bond_from_code::<F>(code, line)?;
    let mut boxed = false;

    for field in &fields[4..] {
        let Some(key) = field.key.as_deref() else {
            return Err(MolfileError::Malformed {
                line,
                reason: format!("unexpected {:?} in bond line", field.value.as_str()),
            });
        };
        let value = &field.value;
        match key {
            "CFG" => match int(value, line, "bond configuration")? {
                0 => {}
                1 => bond.direction = BondDirection::Up,
                3 => bond.direction = BondDirection::Down,
                2 if bond.order == BondOrder::Single => bond.direction = BondDirection::Either,
                2 if bond.order == BondOrder::Double => bond.ignore_cis_trans = true,
                2 => {
                    return Err(MolfileError::Malformed {
                        line,
                        reason: "CFG=2 on a bond that is neither single nor double".to_owned(),
                    })
                }
                value => return Err(MolfileError::BadValue { line, field: "bond configuration", value }),
            },
            "STBOX" => {
                if int(value, line, "stereo care")? > 0 && query_feature::<F>(options, line, "stereo care box")? {
                    boxed = true;
                }
            }
            "TOPO" => {
                let topology = match int(value, line, "bond topology")? {
                    0 => None,
                    1 => Some(Topology::Ring),
                    _ => Some(Topology::Chain),
                };
                if let Some(topology) = topology {
                    if query_feature::<F>(options, line, "bond topology")? {
                        bond.constrain(BondLeaf::Topology(topology))
                            .map_err(|source| MolfileError::Graph { line, source })?;
                    }
                }
            }
            "RXCTR" => bond.reacting_center = int(value, line, "reacting center")?,
            "ENDPTS" => {
                for atom in int_list(value, line, "end point")? {
                    bond.endpoints.push(ctab.node(atom, line)?);
                }
            }
            "ATTACH" => {
                bond.multi_attach = match value.as_str() {
                    "ALL" => Some(MultiAttach::All),
                    "ANY" => Some(MultiAttach::Any),
                    other => {
                        return Err(MolfileError::Malformed { line, reason: format!("unknown ATTACH value {other:?}") })
                    }
                }
            }
            "DISP" => trace!("line {line}: bond display {:?}", value.as_str()),
            _ => debug!("line {line}: skipping bond property {key}"),
        }
    }

    let edge = ctab
        .mol
        .add_bond(beg, end, bond)
        .map_err(|source| MolfileError::Graph { line, source })?;
    if boxed {
        ctab.stereo_care_bonds.insert(edge);
    }
    Ok(())
}

/// Enhanced stereo collections. Others are skipped.
fn read_collections<F: Flavor>(lines: &mut Lines, ctab: &mut Ctab<F>) -> Result<(), MolfileError> {
    loop {
        let text = lines.next_v30()?;
        let line = lines.number();
        if text.trim() == "END COLLECTION" {
            return Ok(());
        }
        let fields = split(&text, line)?;
        let Some(name) = fields.first().map(|f| f.value.as_str()) else {
            continue;
        };
        let group_number = |prefix: &str| -> Result<u32, MolfileError> {
            let digits = &name[prefix.len()..];
            digits.parse().map_err(|_| MolfileError::BadNumber {
                line,
                field: "stereo group",
                text: digits.to_owned(),
            })
        };
        let group = if name == "MDLV30/STEABS" {
            StereoGroup::new(StereoKind::Abs, 0)
        } else if name.starts_with("MDLV30/STERAC") {
            StereoGroup::new(StereoKind::And, group_number("MDLV30/STERAC")?)
        } else if name.starts_with("MDLV30/STEREL") {
            StereoGroup::new(StereoKind::Or, group_number("MDLV30/STEREL")?)
        } else {
            debug!("line {line}: skipping collection {name}");
            continue;
        };
        let atoms = fields
            .iter()
            .find(|f| f.key.as_deref() == Some("ATOMS"))
            .ok_or_else(|| MolfileError::Malformed {
                line,
                reason: format!("collection {name} lists no atoms"),
            })?;
        for atom in int_list(&atoms.value, line, "collection atom")? {
            let node = ctab.node(atom, line)?;
            ctab.stereo_labels.insert(node, group);
        }
    }
}

fn read_sgroup<F: Flavor>(
    text: &str,
    line: usize,
    ctab: &mut Ctab<F>,
    index: &mut HashMap<i32, usize>,
    parents: &mut Vec<(usize, i32)>,
) -> Result<(), MolfileError> {
    let fields = split(text, line)?;
    if fields.len() < 3 {
        return Err(MolfileError::Malformed { line, reason: "S-group line too short".to_owned() });
    }
    let id = int(&fields[0].value, line, "S-group number")?;
    let mut sgroup = SGroup::new(SGroupKind::from_code(fields[1].value.as_str()), id.max(0) as u32);

    for field in &fields[3..] {
        let Some(key) = field.key.as_deref() else {
            continue;
        };
        let value = &field.value;
        match key {
            "ATOMS" | "PATOMS" => {
                let nodes = int_list(value, line, "S-group atom")?
                    .into_iter()
                    .map(|atom| ctab.node(atom, line))
                    .collect::<Result<Vec<_>, _>>()?;
                if key == "ATOMS" {
                    sgroup.atoms = nodes;
                } else {
                    sgroup.parent_atoms = nodes;
                }
            }
            "XBONDS" | "CBONDS" => {
                for bond in int_list(value, line, "S-group bond")? {
                    sgroup.bonds.push(ctab.edge(bond, line)?);
                }
            }
            "SUBTYPE" => sgroup.subtype = value.as_str().to_owned(),
            "MULT" => sgroup.multiplier = int(value, line, "multiplier")?.max(1) as u32,
            "PARENT" => parents.push((ctab.mol.sgroups.len(), int(value, line, "S-group parent")?)),
            "BRKXYZ" => {
                let coords = value.float_items().filter(|c| c.len() == 9).ok_or_else(|| MolfileError::Malformed {
                    line,
                    reason: "a bracket needs 9 coordinates".to_owned(),
                })?;
                sgroup.brackets.push([
                    Vec3::new(coords[0], coords[1], 0.0),
                    Vec3::new(coords[3], coords[4], 0.0),
                ]);
            }
            "CONNECT" => {
                sgroup.connectivity = Connectivity::from_code(value.as_str()).ok_or_else(|| MolfileError::Malformed {
                    line,
                    reason: format!("unknown S-group connectivity {:?}", value.as_str()),
                })?;
            }
            "LABEL" => {
                if sgroup.kind == SGroupKind::Superatom {
                    sgroup.subscript = value.as_str().to_owned();
                } else {
                    sgroup.label = value.as_str().to_owned();
                }
            }
            "CLASS" => sgroup.class = value.as_str().to_owned(),
            "ESTATE" => sgroup.expanded = value.as_str() == "E",
            "FIELDNAME" => sgroup.data.name = value.as_str().to_owned(),
            "FIELDDISP" => sgroup.data.display = value.as_str().to_owned(),
            "FIELDDATA" => {
                if !sgroup.data.value.is_empty() {
                    sgroup.data.value.push('\n');
                }
                sgroup.data.value.push_str(value.as_str());
            }
            "CSTATE" => {
                let items = value.items().filter(|items| items.len() == 4).ok_or_else(|| MolfileError::Malformed {
                    line,
                    reason: "CSTATE needs 4 values".to_owned(),
                })?;
                let parse = |text: &String, field| {
                    text.parse::<f64>().map_err(|_| MolfileError::BadNumber { line, field, text: text.clone() })
                };
                let bond = ctab.edge(parse(&items[0], "bond number")? as i32, line)?;
                sgroup.bond_vectors.push((bond, Vec3::new(parse(&items[1], "x")?, parse(&items[2], "y")?, 0.0)));
            }
            "SAP" => {
                let items = value.items().filter(|items| items.len() == 3).ok_or_else(|| MolfileError::Malformed {
                    line,
                    reason: "SAP needs 3 values".to_owned(),
                })?;
                let parse = |text: &String, field| {
                    text.parse::<i32>().map_err(|_| MolfileError::BadNumber { line, field, text: text.clone() })
                };
                let atom = ctab.node(parse(&items[0], "atom number")?, line)?;
                let leaving = match parse(&items[1], "leaving atom")? {
                    0 => None,
                    leaving => Some(ctab.node(leaving, line)?),
                };
                sgroup.attachments.push(SuperatomAttachment { atom, leaving });
            }
            _ => debug!("line {line}: skipping S-group property {key}"),
        }
    }
    index.insert(id, ctab.mol.sgroups.len());
    ctab.mol.sgroups.push(sgroup);
    Ok(())
}

fn read_sgroups<F: Flavor>(lines: &mut Lines, ctab: &mut Ctab<F>) -> Result<(), MolfileError> {
    let mut index = HashMap::new();
    let mut parents = vec![];
    loop {
        let text = lines.next_v30()?;
        let line = lines.number();
        let trimmed = text.trim();
        if trimmed == "END SGROUP" {
            break;
        }
        if trimmed.starts_with("DEFAULT") {
            continue;
        }
        read_sgroup(trimmed, line, ctab, &mut index, &mut parents)?;
    }
    for (child, parent) in parents {
        let parent_index = *index.get(&parent).ok_or(MolfileError::NoSuchSGroup {
            line: lines.number(),
            id: parent,
        })?;
        if parent_index != child {
            ctab.mol.sgroups[child].parent = Some(parent_index);
        }
    }
    Ok(())
}

/// Reads `BEGIN CTAB` through `END CTAB`.
pub(super) fn read_ctab<F: Flavor>(lines: &mut Lines, ctab: &mut Ctab<F>, options: &LoaderOptions) -> Result<(), MolfileError> {
    expect(lines, "BEGIN CTAB")?;
    let text = lines.next_v30()?;
    let line = lines.number();
    let counts = split(&text, line)?;
    if counts.first().map(|f| f.value.as_str()) != Some("COUNTS") || counts.len() < 3 {
        return Err(MolfileError::Malformed { line, reason: format!("bad counts line {text:?}") });
    }
    let atoms = int(&counts[1].value, line, "atom count")?.max(0) as usize;
    let bonds = int(&counts[2].value, line, "bond count")?.max(0) as usize;
    if let Some(chiral) = counts.get(5) {
        ctab.mol.chiral_flag |= int(&chiral.value, line, "chiral flag")? != 0;
    }

    if atoms > 0 {
        expect(lines, "BEGIN ATOM")?;
        for _ in 0..atoms {
            let text = lines.next_v30()?;
            read_atom(&text, lines.number(), atoms, ctab, options)?;
        }
        expect(lines, "END ATOM")?;
    }
    if bonds > 0 {
        expect(lines, "BEGIN BOND")?;
        for _ in 0..bonds {
            let text = lines.next_v30()?;
            read_bond(&text, lines.number(), ctab, options)?;
        }
        expect(lines, "END BOND")?;
    }
    ctab.resolve_as_drawn(lines.number())?;

    loop {
        let text = lines.next_v30()?;
        let line = lines.number();
        match text.trim() {
            "END CTAB" => return Ok(()),
            "BEGIN COLLECTION" => read_collections(lines, ctab)?,
            "BEGIN SGROUP" => read_sgroups(lines, ctab)?,
            other if other.starts_with("LINKNODE") => {
                return Err(MolfileError::Malformed { line, reason: "link nodes are not supported".to_owned() })
            }
            other => match other.strip_prefix("BEGIN ") {
                Some(name) => skip_block(lines, name.trim())?,
                None => return Err(MolfileError::Malformed { line, reason: format!("unexpected {other:?}") }),
            },
        }
    }
}

/// One nested CTAB as a molecule of its own.
fn read_nested<F: Flavor>(lines: &mut Lines, options: &LoaderOptions, depth: usize) -> Result<MoleculeGraph<F>, MolfileError> {
    check_depth(depth, options)?;
    let mut ctab = Ctab::<F>::new(options.ignore_no_chiral_flag);
    read_ctab(lines, &mut ctab, options)?;
    postload::finish(&mut ctab, options)?;
    Ok(ctab.mol)
}

/// `BEGIN RGROUP n` blocks following the main CTAB.
pub(super) fn read_rgroups<F: Flavor>(
    lines: &mut Lines,
    mol: &mut MoleculeGraph<F>,
    options: &LoaderOptions,
    depth: usize,
) -> Result<(), MolfileError> {
    while let Some(header) = lines.peek().and_then(|line| line.strip_prefix(PREFIX)?.trim().strip_prefix("BEGIN RGROUP")) {
        let text = header.trim();
        lines.next()?;
        let line = lines.number();
        let number: u32 = text.parse().map_err(|_| MolfileError::BadNumber {
            line,
            field: "R-group number",
            text: text.to_owned(),
        })?;
        require_query::<F>(line, "R-groups")?;

        let mut group = RGroup::<F>::default();
        loop {
            if begins(lines, "CTAB") {
                group.fragments.push(read_nested(lines, options, depth + 1)?);
                continue;
            }
            let text = lines.next_v30()?;
            let line = lines.number();
            let fields = split(&text, line)?;
            match fields.first().map(|f| f.value.as_str()) {
                Some("END") => break,
                Some("RLOGIC") => {
                    let value = |i: usize| fields.get(i).map_or(Ok(0), |f| int(&f.value, line, "R-group logic"));
                    group.if_then = value(1)?.max(0) as u32;
                    group.rest_h = value(2)? > 0;
                    let occurrence: Vec<&str> = fields.iter().skip(3).map(|f| f.value.as_str()).collect();
                    let occurrence = occurrence.join("");
                    group.occurrence = RGroup::<F>::parse_occurrence(&occurrence).ok_or_else(|| MolfileError::Malformed {
                        line,
                        reason: format!("bad R-group occurrence {occurrence:?}"),
                    })?;
                }
                _ => return Err(MolfileError::Malformed { line, reason: format!("unexpected {text:?} in R-group") }),
            }
        }
        debug!("read R-group {number} with {} fragments", group.fragments.len());
        let existing = mol.rgroups.entry(number).or_default();
        existing.fragments.append(&mut group.fragments);
        existing.if_then = group.if_then;
        existing.rest_h = group.rest_h;
        existing.occurrence = group.occurrence;
    }
    Ok(())
}

/// The `BEGIN TEMPLATE` block, if there is one.
pub(super) fn read_templates<F: Flavor>(
    lines: &mut Lines,
    mol: &mut MoleculeGraph<F>,
    options: &LoaderOptions,
    depth: usize,
) -> Result<(), MolfileError> {
    if !begins(lines, "TEMPLATE") {
        return Ok(());
    }
    lines.next()?;
    loop {
        let text = lines.next_v30()?;
        let line = lines.number();
        if text.trim() == "END TEMPLATE" {
            return Ok(());
        }
        let fields = split(&text, line)?;
        if fields.first().map(|f| f.value.as_str()) != Some("TEMPLATE") {
            return Err(MolfileError::Malformed { line, reason: format!("unexpected {text:?} in templates") });
        }
        let id = fields.get(1).and_then(|f| f.value.int()).filter(|&id| id > 0).ok_or_else(|| {
            MolfileError::Malformed {
                line,
                reason: "can not read template index".to_owned(),
            }
        })?;
        let names = fields.get(2).map_or("", |f| f.value.as_str());
        let (class, name) = match names.split_once('/') {
            Some((class, rest)) => (class, rest.split('/').next().unwrap_or("")),
            None => ("", names),
        };
        let molecule = read_nested(lines, options, depth + 1)?;
        mol.templates.push(Template {
            id: id as u32,
            class: class.to_owned(),
            name: name.to_owned(),
            molecule,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{C, N, O};
    use crate::graph::{CisTransParity, Molecule, QueryMolecule};

    const HEADER: &str = "
  handwritten

  0  0  0     0  0            999 V3000
";

    fn molfile(body: &str) -> String {
        format!("{HEADER}{body}M  END\n")
    }

    fn node(n: usize) -> NodeIndex {
        NodeIndex::new(n)
    }

    #[test]
    fn test_v3000_basics() {
        let text = molfile(
            "M  V30 BEGIN CTAB
M  V30 COUNTS 3 2 0 0 0
M  V30 BEGIN ATOM
M  V30 1 C 0 0 0 0
M  V30 2 C 1.299 0.75 0 0 -
M  V30 CHG=-1
M  V30 3 O 2.5981 0 0 0 MASS=18
M  V30 END ATOM
M  V30 BEGIN BOND
M  V30 1 1 1 2
M  V30 2 2 2 3
M  V30 END BOND
M  V30 END CTAB
",
        );
        let mol: Molecule = load(&text, &LoaderOptions::default(), 0).unwrap();
        assert_eq!(mol.atom_count(), 3);
        assert_eq!(mol[node(1)].charge, -1);
        assert_eq!(mol[node(2)].isotope, 18);
        assert_eq!(mol[EdgeIndex::new(1)].order, BondOrder::Double);
        assert_eq!(mol.implicit_hydrogens(node(0)), 3);
    }

    #[test]
    fn test_v3000_missing_end() {
        let text = format!("{HEADER}M  V30 BEGIN CTAB\nM  V30 COUNTS 0 0 0 0 0\nM  V30 END CTAB\n");
        assert!(matches!(
            load::<Concrete>(&text, &LoaderOptions::default(), 0),
            Err(MolfileError::UnexpectedEnd { .. })
        ));
    }

    #[test]
    fn test_hydrogen_count_dropped() {
        let text = molfile(
            "M  V30 BEGIN CTAB
M  V30 COUNTS 2 1 0 0 0
M  V30 BEGIN ATOM
M  V30 1 C 0 0 0 0 HCOUNT=2
M  V30 2 O 1 0 0 0
M  V30 END ATOM
M  V30 BEGIN BOND
M  V30 1 1 1 2
M  V30 END BOND
M  V30 END CTAB
",
        );
        let options = LoaderOptions::default().with_ignore_non_critical_query_features(true);
        let mol: Molecule = load(&text, &options, 0).unwrap();
        assert_eq!(mol[node(0)].implicit_h, None);
        assert_eq!(mol.implicit_hydrogens(node(0)), 3);

        let query: QueryMolecule = load(&text, &LoaderOptions::default(), 0).unwrap();
        assert!(query[node(0)].constraint().unwrap().mentions(&AtomLeaf::TotalH(2..=OPEN_END)));
    }

    #[test]
    fn test_query_atoms() {
        let text = molfile(
            "M  V30 BEGIN CTAB
M  V30 COUNTS 3 2 0 0 0
M  V30 BEGIN ATOM
M  V30 1 NOT [N,O] 0 0 0 0
M  V30 2 C 1 0 0 0 SUBST=-2 RBCNT=-1 HCOUNT=-1
M  V30 3 \"Pol\" 2 0 0 0
M  V30 END ATOM
M  V30 BEGIN BOND
M  V30 1 6 1 2 TOPO=2
M  V30 2 1 2 3
M  V30 END BOND
M  V30 END CTAB
",
        );
        let mol: QueryMolecule = load(&text, &LoaderOptions::default(), 0).unwrap();
        assert!(mol[node(0)].possible_number(C));
        assert!(!mol[node(0)].possible_number(N));
        let carbon = mol[node(1)].constraint().unwrap();
        assert!(carbon.mentions(&AtomLeaf::Substituents(2..=2)));
        assert!(carbon.mentions(&AtomLeaf::RingBonds(0..=0)));
        assert!(carbon.mentions(&AtomLeaf::TotalH(0..=0)));
        assert_eq!(mol[node(2)].kind, AtomKind::Pseudo("Pol".to_owned()));
        assert!(mol[EdgeIndex::new(0)].constraint().unwrap().mentions(&BondLeaf::Topology(Topology::Chain)));

        assert!(matches!(
            load::<Concrete>(&text, &LoaderOptions::default(), 0),
            Err(MolfileError::QueryOnly { .. })
        ));
    }

    #[test]
    fn test_collections() {
        let text = molfile(
            "M  V30 BEGIN CTAB
M  V30 COUNTS 5 4 0 0 0
M  V30 BEGIN ATOM
M  V30 1 C 0 0 0 0
M  V30 2 F 1 0 0 0
M  V30 3 Cl 0 1 0 0
M  V30 4 Br -1 0 0 0
M  V30 5 I 0 -1 0 0
M  V30 END ATOM
M  V30 BEGIN BOND
M  V30 1 1 1 2 CFG=1
M  V30 2 1 1 3
M  V30 3 1 1 4
M  V30 4 1 1 5
M  V30 END BOND
M  V30 BEGIN COLLECTION
M  V30 MDLV30/STEREL2 ATOMS=(1 1)
M  V30 MDLV30/HILITE ATOMS=(1 2)
M  V30 END COLLECTION
M  V30 END CTAB
",
        );
        let mol: Molecule = load(&text, &LoaderOptions::default(), 0).unwrap();
        let center = mol.stereocenters[&node(0)];
        assert_eq!((center.kind, center.group), (StereoKind::Or, 2));
    }

    #[test]
    fn test_label_without_wedge() {
        let text = molfile(
            "M  V30 BEGIN CTAB
M  V30 COUNTS 2 1 0 0 0
M  V30 BEGIN ATOM
M  V30 1 C 0 0 0 0
M  V30 2 O 1 0 0 0
M  V30 END ATOM
M  V30 BEGIN BOND
M  V30 1 1 1 2
M  V30 END BOND
M  V30 BEGIN COLLECTION
M  V30 MDLV30/STEABS ATOMS=(1 1)
M  V30 END COLLECTION
M  V30 END CTAB
",
        );
        assert_eq!(
            load::<Concrete>(&text, &LoaderOptions::default(), 0).unwrap_err(),
            MolfileError::NotAStereocenter(0)
        );
        let options = LoaderOptions::default().with_ignore_stereochemistry_errors(true);
        assert!(load::<Concrete>(&text, &options, 0).unwrap().stereocenters.is_empty());
    }

    #[test]
    fn test_either_double_bond() {
        let text = molfile(
            "M  V30 BEGIN CTAB
M  V30 COUNTS 4 3 0 0 0
M  V30 BEGIN ATOM
M  V30 1 C -1 1 0 0
M  V30 2 C 0 0 0 0
M  V30 3 C 1 0 0 0
M  V30 4 C 2 1 0 0
M  V30 END ATOM
M  V30 BEGIN BOND
M  V30 1 1 1 2
M  V30 2 2 2 3 CFG=2
M  V30 3 1 3 4
M  V30 END BOND
M  V30 END CTAB
",
        );
        let mol: Molecule = load(&text, &LoaderOptions::default(), 0).unwrap();
        assert_eq!(mol.cis_trans[&EdgeIndex::new(1)].parity, CisTransParity::Ignored);
    }

    #[test]
    fn test_sgroups() {
        let text = molfile(
            "M  V30 BEGIN CTAB
M  V30 COUNTS 2 1 2 0 0
M  V30 BEGIN ATOM
M  V30 1 C 0 0 0 0
M  V30 2 O 1 0 0 0
M  V30 END ATOM
M  V30 BEGIN BOND
M  V30 1 1 1 2
M  V30 END BOND
M  V30 BEGIN SGROUP
M  V30 1 SRU 0 ATOMS=(1 1) XBONDS=(1 1) CONNECT=hh LABEL=n -
M  V30 BRKXYZ=(9 1 2 0 3 4 0 0 0 0)
M  V30 2 DAT 0 ATOMS=(1 2) PARENT=1 FIELDNAME=note ESTATE=E -
M  V30 FIELDDATA=\"two words\"
M  V30 END SGROUP
M  V30 END CTAB
",
        );
        let mol: Molecule = load(&text, &LoaderOptions::default(), 0).unwrap();
        let repeat = &mol.sgroups[0];
        assert_eq!(repeat.kind, SGroupKind::RepeatUnit);
        assert_eq!(repeat.connectivity, Connectivity::HeadToHead);
        assert_eq!(repeat.label, "n");
        assert_eq!(repeat.bonds, vec![EdgeIndex::new(0)]);
        assert_eq!(repeat.brackets, vec![[Vec3::new(1.0, 2.0, 0.0), Vec3::new(3.0, 4.0, 0.0)]]);
        assert_eq!(mol.sgroups[1].parent, Some(0));
        assert!(mol.sgroups[1].expanded);
        assert!(!repeat.expanded);
        assert_eq!(mol.properties["note"], "two words");
    }

    #[test]
    fn test_multi_center_bond() {
        let body = |attach: &str| {
            molfile(&format!(
                "M  V30 BEGIN CTAB
M  V30 COUNTS 3 1 0 0 0
M  V30 BEGIN ATOM
M  V30 1 C 0 0 0 0
M  V30 2 C 1 0 0 0
M  V30 3 C 1 1 0 0
M  V30 END ATOM
M  V30 BEGIN BOND
M  V30 1 1 1 2 ENDPTS=(2 2 3) ATTACH={attach} DISP=BOLD
M  V30 END BOND
M  V30 END CTAB
"
            ))
        };
        let mol: Molecule = load(&body("ANY"), &LoaderOptions::default(), 0).unwrap();
        let bond = &mol[EdgeIndex::new(0)];
        assert_eq!(bond.endpoints, vec![node(1), node(2)]);
        assert_eq!(bond.multi_attach, Some(MultiAttach::Any));

        assert!(matches!(
            load::<Concrete>(&body("SOME"), &LoaderOptions::default(), 0),
            Err(MolfileError::Malformed { line: 12, .. })
        ));
    }

    #[test]
    fn test_rgroups_and_templates() {
        let text = molfile(
            "M  V30 BEGIN CTAB
M  V30 COUNTS 2 1 0 0 0
M  V30 BEGIN ATOM
M  V30 1 C 0 0 0 0
M  V30 2 R# 1 0 0 0 RGROUPS=(1 1)
M  V30 END ATOM
M  V30 BEGIN BOND
M  V30 1 1 1 2
M  V30 END BOND
M  V30 END CTAB
M  V30 BEGIN RGROUP 1
M  V30 RLOGIC 0 1 >2
M  V30 BEGIN CTAB
M  V30 COUNTS 1 0 0 0 0
M  V30 BEGIN ATOM
M  V30 1 N 0 0 0 0 ATTCHPT=1
M  V30 END ATOM
M  V30 END CTAB
M  V30 END RGROUP
M  V30 BEGIN TEMPLATE
M  V30 TEMPLATE 1 AA/Gly/G/
M  V30 BEGIN CTAB
M  V30 COUNTS 1 0 0 0 0
M  V30 BEGIN ATOM
M  V30 1 O 0 0 0 0
M  V30 END ATOM
M  V30 END CTAB
M  V30 END TEMPLATE
",
        );
        let mol: QueryMolecule = load(&text, &LoaderOptions::default(), 0).unwrap();
        assert_eq!(mol[node(1)].allowed_rgroups(), vec![1]);
        assert_eq!(mol[node(1)].attachment_order, vec![node(0)]);
        let group = &mol.rgroups[&1];
        assert!(group.rest_h);
        assert_eq!(group.occurrence, vec![3..=crate::graph::MAX_OCCURRENCE]);
        assert_eq!(group.fragments[0][node(0)].attachment_points, 1);

        let template = &mol.templates[0];
        assert_eq!((template.id, template.class.as_str(), template.name.as_str()), (1, "AA", "Gly"));
        assert_eq!(template.molecule[node(0)].number(), Some(O));

        let shallow = LoaderOptions::default().with_max_nesting_depth(0);
        assert_eq!(load::<Query>(&text, &shallow, 0).unwrap_err(), MolfileError::TooDeep(0));
    }

    #[test]
    fn test_template_atoms() {
        let text = molfile(
            "M  V30 BEGIN CTAB
M  V30 COUNTS 2 1 0 0 0
M  V30 BEGIN ATOM
M  V30 1 Gly 0 0 0 0 CLASS=AA SEQID=1 ATTCHORD=(2 2 Al)
M  V30 2 Ala 1 0 0 0 CLASS=AA SEQID=2
M  V30 END ATOM
M  V30 BEGIN BOND
M  V30 1 1 1 2
M  V30 END BOND
M  V30 BEGIN OBJ3D
M  V30 anything goes here
M  V30 END OBJ3D
M  V30 END CTAB
",
        );
        let mol: Molecule = load(&text, &LoaderOptions::default(), 0).unwrap();
        assert_eq!(mol[node(0)].kind, AtomKind::Template("Gly".to_owned()));
        assert_eq!(mol[node(0)].template_class.as_deref(), Some("AA"));
        assert_eq!(mol[node(1)].sequence_id, Some(2));
        assert_eq!(mol[node(0)].attachment_order, vec![node(1)]);
    }
}

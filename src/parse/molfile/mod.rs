//! MDL Molfiles, V2000 and V3000.
//!
//! Both versions fill the same [`Ctab`]: the graph plus the few per-atom
//! hints that only make sense once every atom and bond is known. The
//! shared post-load pass in [`postload`] turns those hints into query
//! leaves, implicit hydrogens and stereo.

use std::collections::{BTreeMap, HashSet};

use petgraph::graph::{EdgeIndex, NodeIndex};
use thiserror::Error;
use tracing::*;

use crate::element::{self, Radical, ELEMENTS, C, H};
use crate::graph::*;
use crate::options::LoaderOptions;
use crate::query::{AtomConstraint, AtomLeaf, BondConstraint, Constraint, OPEN_END};
use crate::stereo::StereoError;

mod fields;
mod postload;
mod v2000;
mod v3000;

use fields::{Columns, Lines};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MolfileError {
    #[error("unexpected end of input after line {line}")]
    UnexpectedEnd { line: usize },
    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[error("line {line}: can not read {field} from {text:?}")]
    BadNumber { line: usize, field: &'static str, text: String },
    #[error("bad molfile version {0:?}")]
    BadVersion(String),
    #[error("line {line}: {what} allowed only for queries")]
    QueryOnly { line: usize, what: String },
    #[error("line {line}: atom index {index} out of range")]
    AtomIndex { line: usize, index: i32 },
    #[error("line {line}: bond index {index} out of range")]
    BondIndex { line: usize, index: i32 },
    #[error("line {line}: invalid {field} value {value}")]
    BadValue { line: usize, field: &'static str, value: i32 },
    #[error("line {line}: unknown bond type {code}")]
    UnknownBondType { line: usize, code: i32 },
    #[error("line {line}: atom list: {reason}")]
    AtomList { line: usize, reason: String },
    #[error("line {line}: pseudo atom {label:?} can not have an isotope")]
    PseudoIsotope { line: usize, label: String },
    #[error("line {line}: no S-group with number {id}")]
    NoSuchSGroup { line: usize, id: i32 },
    #[error("stereo type specified for atom {0}, but the bond directions do not say that it is a stereocenter")]
    NotAStereocenter(usize),
    #[error("CTABs nested deeper than {0} levels")]
    TooDeep(usize),
    #[error("line {line}: {source}")]
    Graph { line: usize, source: GraphError },
    #[error(transparent)]
    Stereo(#[from] StereoError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Version {
    V2000,
    V3000,
}

/// The counts line.
#[derive(Debug, Clone, Copy)]
struct Counts {
    atoms: usize,
    bonds: usize,
    chiral: bool,
    version: Version,
}

/// A CTAB being read.
#[derive(Debug)]
pub(crate) struct Ctab<F: Flavor> {
    mol: MoleculeGraph<F>,
    /// H-count field as written: `0` unspecified, `1` no hydrogens beyond
    /// the drawn ones, `n + 1` at least `n` more.
    hcount: Vec<i32>,
    /// Bonds inside a stereo care box.
    stereo_care_bonds: HashSet<EdgeIndex>,
    /// Enhanced stereo requested by V3000 collections.
    stereo_labels: BTreeMap<NodeIndex, StereoGroup>,
    /// Substituent counts and ring bond counts "as drawn", known only once
    /// every bond is in.
    substituents_as_drawn: Vec<NodeIndex>,
    ring_bonds_as_drawn: Vec<NodeIndex>,
}

impl<F: Flavor> Ctab<F> {
    fn new(chiral: bool) -> Self {
        let mut mol = MoleculeGraph::new();
        mol.chiral_flag = chiral;
        Self {
            mol,
            hcount: vec![],
            stereo_care_bonds: HashSet::new(),
            stereo_labels: BTreeMap::new(),
            substituents_as_drawn: vec![],
            ring_bonds_as_drawn: vec![],
        }
    }

    fn add_atom(&mut self, atom: Atom<F>, hcount: i32) -> NodeIndex {
        self.hcount.push(hcount);
        self.mol.add_atom(atom)
    }

    /// A 1-based atom number from the file.
    fn node(&self, index: i32, line: usize) -> Result<NodeIndex, MolfileError> {
        if index < 1 || index as usize > self.mol.atom_count() {
            return Err(MolfileError::AtomIndex { line, index });
        }
        Ok(NodeIndex::new(index as usize - 1))
    }

    /// A 1-based bond number from the file.
    fn edge(&self, index: i32, line: usize) -> Result<EdgeIndex, MolfileError> {
        if index < 1 || index as usize > self.mol.bond_count() {
            return Err(MolfileError::BondIndex { line, index });
        }
        Ok(EdgeIndex::new(index as usize - 1))
    }

    fn atom_mut(&mut self, index: i32, line: usize) -> Result<&mut Atom<F>, MolfileError> {
        let node = self.node(index, line)?;
        Ok(&mut self.mol[node])
    }

    /// Fills in the counts that were drawn rather than written.
    fn resolve_as_drawn(&mut self, line: usize) -> Result<(), MolfileError> {
        let ring = self.mol.ring_bonds();
        for node in std::mem::take(&mut self.substituents_as_drawn) {
            let degree = self.mol.degree(node) as i32;
            constrain(&mut self.mol[node], AtomLeaf::substituents(degree), line)?;
        }
        for node in std::mem::take(&mut self.ring_bonds_as_drawn) {
            let count = self.mol.incident(node).iter().filter(|(edge, _)| ring.contains(edge)).count() as i32;
            constrain(&mut self.mol[node], AtomLeaf::ring_bonds(count), line)?;
        }
        Ok(())
    }
}

fn constrain<F: Flavor>(atom: &mut Atom<F>, leaf: AtomLeaf, line: usize) -> Result<(), MolfileError> {
    atom.constrain(leaf).map_err(|source| MolfileError::Graph { line, source })
}

fn replace<F: Flavor>(atom: &mut Atom<F>, leaf: AtomLeaf, line: usize) -> Result<(), MolfileError> {
    atom.replace(leaf).map_err(|source| MolfileError::Graph { line, source })
}

fn require_query<F: Flavor>(line: usize, what: &str) -> Result<(), MolfileError> {
    if F::IS_QUERY {
        Ok(())
    } else {
        Err(MolfileError::QueryOnly { line, what: what.to_owned() })
    }
}

/// Whether a non-critical query field should be applied. On a concrete
/// molecule it is an error, or dropped with a warning when the options
/// say so.
fn query_feature<F: Flavor>(options: &LoaderOptions, line: usize, what: &str) -> Result<bool, MolfileError> {
    if F::IS_QUERY {
        return Ok(true);
    }
    if options.ignore_non_critical_query_features {
        warn!("line {line}: ignoring {what} on a non-query molecule");
        return Ok(false);
    }
    Err(MolfileError::QueryOnly { line, what: what.to_owned() })
}

/// `n`, or `n` and more once `n` reaches `open_from`.
fn count_range(n: i32, open_from: i32) -> std::ops::RangeInclusive<i32> {
    if n < open_from {
        n..=n
    } else {
        n..=OPEN_END
    }
}

/// Substituent count field shared by `M  SUB` and `SUBST=`.
fn substituent_count<F: Flavor>(ctab: &mut Ctab<F>, node: NodeIndex, value: i32, line: usize) -> Result<(), MolfileError> {
    match value {
        0 => Ok(()),
        -1 => constrain(&mut ctab.mol[node], AtomLeaf::substituents(0), line),
        -2 => {
            ctab.substituents_as_drawn.push(node);
            Ok(())
        }
        n if n > 0 => constrain(&mut ctab.mol[node], AtomLeaf::Substituents(count_range(n, 6)), line),
        value => Err(MolfileError::BadValue { line, field: "substitution count", value }),
    }
}

/// Ring bond count field shared by `M  RBC` and `RBCNT=`.
fn ring_bond_count<F: Flavor>(ctab: &mut Ctab<F>, node: NodeIndex, value: i32, line: usize) -> Result<(), MolfileError> {
    match value {
        0 => Ok(()),
        -1 => constrain(&mut ctab.mol[node], AtomLeaf::ring_bonds(0), line),
        -2 => {
            ctab.ring_bonds_as_drawn.push(node);
            Ok(())
        }
        n if n > 1 => constrain(&mut ctab.mol[node], AtomLeaf::RingBonds(count_range(n, 4)), line),
        value => Err(MolfileError::BadValue { line, field: "ring bond count", value }),
    }
}

/// Elements that are never metals, for the `M` and `MH` labels.
fn non_metals(with_hydrogen: bool) -> AtomConstraint {
    use element::*;
    let mut numbers = vec![C, N, O, F, P, S, CL, SE, BR, I, AT, HE, NE, AR, KR, XE, RN];
    if with_hydrogen {
        numbers.push(H);
    }
    AtomConstraint::any_of(numbers.into_iter().map(AtomLeaf::Number))
}

/// Generic labels that stand for a set of elements.
fn generic_label(label: &str, options: &LoaderOptions) -> Option<AtomConstraint> {
    let tree = match label {
        "A" => AtomConstraint::not_hydrogen(),
        "AH" | "*" => AtomConstraint::any(),
        "Q" => AtomConstraint::heteroatom(),
        "QH" => Constraint::Leaf(AtomLeaf::Number(C)).negate(),
        "X" if !options.treat_x_as_pseudoatom => AtomConstraint::halogen(),
        "XH" => AtomConstraint::halogen().or(AtomLeaf::Number(H)),
        "M" => non_metals(true).negate(),
        "MH" => non_metals(false).negate(),
        _ => return None,
    };
    Some(tree)
}

/// Element number of a label written in any case, as in `CL` or `cl`.
fn element_number(label: &str) -> Option<u8> {
    if label.is_empty() || !label.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let mut symbol = label[..1].to_ascii_uppercase();
    symbol.push_str(&label[1..].to_ascii_lowercase());
    ELEMENTS.symbol_to_number(&symbol)
}

/// A fresh atom for an atom-block label.
fn atom_from_label<F: Flavor>(label: &str, options: &LoaderOptions, line: usize) -> Result<Atom<F>, MolfileError> {
    match label {
        "R#" | "R" => return Ok(Atom::new(AtomKind::RSite)),
        "D" | "T" => {
            let mut atom = Atom::element(H);
            constrain(&mut atom, AtomLeaf::Isotope(if label == "D" { 2 } else { 3 }), line)?;
            return Ok(atom);
        }
        "L" => {
            require_query::<F>(line, "atom lists")?;
            return Ok(Atom::new(AtomKind::Query));
        }
        "*" if !F::IS_QUERY => return Ok(Atom::new(AtomKind::Pseudo(label.to_owned()))),
        _ => {}
    }
    if let Some(tree) = generic_label(label, options) {
        require_query::<F>(line, &format!("'{label}' atoms"))?;
        let mut atom = Atom::new(AtomKind::Query);
        atom.attach(tree).map_err(|source| MolfileError::Graph { line, source })?;
        return Ok(atom);
    }
    match element_number(label) {
        Some(number) => Ok(Atom::element(number)),
        None if label.is_empty() => Err(MolfileError::Malformed { line, reason: "empty atom label".to_owned() }),
        None => {
            debug!("line {line}: {label:?} read as a pseudo atom");
            Ok(Atom::new(AtomKind::Pseudo(label.to_owned())))
        }
    }
}

/// An atom list such as `C,N,O`, negated for `NOT [..]` or an `ALS` `T`
/// flag. Generic labels must stand alone.
fn atom_list(entries: &[&str], negated: bool, options: &LoaderOptions, line: usize) -> Result<AtomConstraint, MolfileError> {
    if entries.is_empty() {
        return Err(MolfileError::AtomList { line, reason: "empty list".to_owned() });
    }
    let mut numbers = vec![];
    let mut tree = None;
    for entry in entries {
        if let Some(generic) = generic_label(entry, options) {
            if entries.len() != 1 {
                return Err(MolfileError::AtomList {
                    line,
                    reason: format!("'{entry}' inside atom list, if present, must be single"),
                });
            }
            tree = Some(generic);
            continue;
        }
        let number = match *entry {
            "D" | "T" => H,
            entry => element_number(entry).ok_or_else(|| MolfileError::AtomList {
                line,
                reason: format!("unknown element {entry:?}"),
            })?,
        };
        numbers.push(AtomLeaf::Number(number));
    }
    let tree = tree.unwrap_or_else(|| AtomConstraint::any_of(numbers));
    Ok(if negated { tree.negate() } else { tree })
}

/// A bond from a Molfile bond type code.
fn bond_from_code<F: Flavor>(code: i32, line: usize) -> Result<Bond<F>, MolfileError> {
    if let Some(order) = BondOrder::from_molfile(code) {
        return Ok(Bond::new(order));
    }
    let (tree, what) = match code {
        5 => (BondConstraint::single_or_double(), "'single or double' bonds"),
        6 => (BondConstraint::single_or_aromatic(), "'single or aromatic' bonds"),
        7 => (BondConstraint::double_or_aromatic(), "'double or aromatic' bonds"),
        8 => (BondConstraint::any(), "'any' bonds"),
        code => return Err(MolfileError::UnknownBondType { line, code }),
    };
    require_query::<F>(line, what)?;
    let mut bond = Bond::new(BondOrder::Query);
    bond.attach(tree).map_err(|source| MolfileError::Graph { line, source })?;
    Ok(bond)
}

/// Sets the isotope of a freshly read atom.
fn set_isotope<F: Flavor>(atom: &mut Atom<F>, isotope: u16, line: usize) -> Result<(), MolfileError> {
    if let AtomKind::Pseudo(label) = &atom.kind {
        return Err(MolfileError::PseudoIsotope { line, label: label.clone() });
    }
    replace(atom, AtomLeaf::Isotope(isotope), line)
}

/// Sets a radical from its Molfile code.
fn set_radical<F: Flavor>(atom: &mut Atom<F>, code: i32, line: usize) -> Result<(), MolfileError> {
    let radical = Radical::from_code(code).ok_or(MolfileError::BadValue { line, field: "radical", value: code })?;
    replace(atom, AtomLeaf::Radical(radical), line)
}

/// Reads the three header lines. Returns the molecule name and whether
/// this is an RGfile.
fn read_header(lines: &mut Lines) -> Result<(String, bool), MolfileError> {
    let mut first = lines.next()?;
    let rgfile = first.starts_with('$');
    if rgfile {
        // $MOL, $HDR
        lines.next()?;
        lines.next()?;
        first = lines.next()?;
    }
    let name = first.trim().to_owned();
    let program = lines.next()?;
    let comment = lines.next()?;
    trace!("program line {program:?}, comment {comment:?}");
    if rgfile {
        // $END HDR, $CTAB
        lines.next()?;
        lines.next()?;
    }
    Ok((name, rgfile))
}

fn read_counts(lines: &mut Lines) -> Result<Counts, MolfileError> {
    let line = lines.next()?;
    let mut cols = Columns::new(line, lines.number());
    let atoms = cols.required_int(3, "atom count")?;
    let bonds = cols.required_int(3, "bond count")?;
    cols.skip(6);
    let chiral = cols.int(3, "chiral flag").unwrap_or(0) != 0;
    cols.skip(19);
    let version = match cols.text(5)?.to_ascii_uppercase().as_str() {
        "" | "V2000" => Version::V2000,
        "V3000" => Version::V3000,
        other => return Err(MolfileError::BadVersion(other.to_owned())),
    };
    if atoms < 0 || bonds < 0 {
        return Err(MolfileError::Malformed {
            line: lines.number(),
            reason: format!("negative counts {atoms} and {bonds}"),
        });
    }
    Ok(Counts {
        atoms: atoms as usize,
        bonds: bonds as usize,
        chiral,
        version,
    })
}

fn check_depth(depth: usize, options: &LoaderOptions) -> Result<(), MolfileError> {
    if depth > options.max_nesting_depth {
        return Err(MolfileError::TooDeep(options.max_nesting_depth));
    }
    Ok(())
}

/// Parses a complete Molfile or RGfile.
///
/// `depth` counts how many CTABs enclose this one; a top-level call
/// passes `0`.
pub fn load<F: Flavor>(text: &str, options: &LoaderOptions, depth: usize) -> Result<MoleculeGraph<F>, MolfileError> {
    check_depth(depth, options)?;
    let mut lines = Lines::new(text);
    let (name, rgfile) = read_header(&mut lines)?;
    if rgfile && !F::IS_QUERY {
        return Err(MolfileError::QueryOnly { line: 0, what: "RGfiles are".to_owned() });
    }

    let counts = read_counts(&mut lines)?;
    let mut ctab = Ctab::<F>::new(counts.chiral || options.ignore_no_chiral_flag);
    ctab.mol.name = name;

    match counts.version {
        Version::V2000 => {
            v2000::read_ctab(&mut lines, &mut ctab, counts, options)?;
            if rgfile {
                v2000::read_rgroups(&mut lines, &mut ctab.mol, options, depth)?;
            }
        }
        Version::V3000 => {
            v3000::read_ctab(&mut lines, &mut ctab, options)?;
            v3000::read_rgroups(&mut lines, &mut ctab.mol, options, depth)?;
            v3000::read_templates(&mut lines, &mut ctab.mol, options, depth)?;
            let end = lines.next()?;
            if !end.starts_with("M  END") {
                return Err(MolfileError::Malformed {
                    line: lines.number(),
                    reason: format!("expected \"M  END\", got {end:?}"),
                });
            }
        }
    }

    postload::finish(&mut ctab, options)?;
    info!(
        "loaded {:?}: {} atoms, {} bonds, {} stereocenters",
        ctab.mol.name,
        ctab.mol.atom_count(),
        ctab.mol.bond_count(),
        ctab.mol.stereocenters.len()
    );
    Ok(ctab.mol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{CL, N, O, SN};
    use crate::geometry::Vec3;

    pub(super) const ETHANOL: &str = "ethanol
  handwritten

  3  2  0  0  0  0  0  0  0  0999 V2000
    0.0000    0.0000    0.0000 C   0  0  0  0  0  0  0  0  0  0  0  0
    1.2990    0.7500    0.0000 C   0  0  0  0  0  0  0  0  0  0  0  0
    2.5981    0.0000    0.0000 O   0  0  0  0  0  0  0  0  0  0  0  0
  1  2  1  0
  2  3  1  0
M  END
";

    #[test]
    fn test_v2000_basics() {
        let mol: Molecule = load(ETHANOL, &LoaderOptions::default(), 0).unwrap();
        assert_eq!(mol.name, "ethanol");
        assert_eq!(mol.atom_count(), 3);
        assert_eq!(mol.bond_count(), 2);
        assert_eq!(mol[NodeIndex::new(2)].kind, AtomKind::Element(O));
        assert_eq!(mol[NodeIndex::new(1)].position, Vec3::new(1.299, 0.75, 0.0));
        assert_eq!(mol.implicit_hydrogens(NodeIndex::new(0)), 3);
        assert!(!mol.chiral_flag);
    }

    #[test]
    fn test_missing_atom_line() {
        let text = "
  handwritten

  3  1  0  0  0  0  0  0  0  0999 V2000
    0.0000    0.0000    0.0000 C   0  0
    1.0000    0.0000    0.0000 C   0  0
  1  2  1  0
M  END
";
        let err = load::<Concrete>(text, &LoaderOptions::default(), 0).unwrap_err();
        assert!(matches!(err, MolfileError::BadNumber { line: 6, .. }), "{err}");
    }

    #[test]
    fn test_bad_version() {
        let text = "\n\n\n  0  0  0  0  0  0  0  0  0  0999 V4000\nM  END\n";
        assert_eq!(
            load::<Concrete>(text, &LoaderOptions::default(), 0).unwrap_err(),
            MolfileError::BadVersion("V4000".to_owned())
        );
    }

    #[test]
    fn test_rgfile_needs_query() {
        let text = "$MDL  REV  1\n$MOL\n$HDR\n\n\n\n$END HDR\n$CTAB\n  0  0  0  0  0  0  0  0  0  0999 V2000\nM  END\n$END CTAB\n$END MOL\n";
        assert!(matches!(
            load::<Concrete>(text, &LoaderOptions::default(), 0),
            Err(MolfileError::QueryOnly { .. })
        ));
        let mol: QueryMolecule = load(text, &LoaderOptions::default(), 0).unwrap();
        assert_eq!(mol.atom_count(), 0);
    }

    #[test]
    fn test_labels() {
        let options = LoaderOptions::default();
        assert_eq!(element_number("CL"), Some(CL));
        assert_eq!(element_number("n"), Some(N));
        assert_eq!(element_number("C1"), None);

        let any: Atom<Query> = atom_from_label("A", &options, 0).unwrap();
        assert!(!any.possible_number(H));
        assert!(any.possible_number(C));
        assert!(atom_from_label::<Concrete>("A", &options, 0).is_err());

        let metal: Atom<Query> = atom_from_label("M", &options, 0).unwrap();
        assert!(metal.possible_number(SN));
        assert!(!metal.possible_number(C));

        let x: Atom<Concrete> = atom_from_label("X", &options.clone().with_treat_x_as_pseudoatom(true), 0).unwrap();
        assert_eq!(x.kind, AtomKind::Pseudo("X".to_owned()));

        let deuterium: Atom<Concrete> = atom_from_label("D", &options, 0).unwrap();
        assert_eq!((deuterium.number(), deuterium.isotope), (Some(H), 2));

        let pseudo: Atom<Concrete> = atom_from_label("Mab", &options, 0).unwrap();
        assert_eq!(pseudo.kind, AtomKind::Pseudo("Mab".to_owned()));
    }

    #[test]
    fn test_atom_lists() {
        let options = LoaderOptions::default();
        let list = atom_list(&["C", "N"], false, &options, 0).unwrap();
        assert!(list.possible_number(N));
        assert!(!list.possible_number(O));
        let not = atom_list(&["C", "N"], true, &options, 0).unwrap();
        assert!(not.possible_number(O));
        assert!(atom_list(&["A", "N"], false, &options, 0).is_err());
        assert!(atom_list(&["Zz"], false, &options, 0).is_err());
    }

    #[test]
    fn test_query_bond_codes() {
        assert!(matches!(
            bond_from_code::<Concrete>(6, 3),
            Err(MolfileError::QueryOnly { line: 3, .. })
        ));
        assert!(matches!(
            bond_from_code::<Query>(11, 3),
            Err(MolfileError::UnknownBondType { code: 11, .. })
        ));
        let bond = bond_from_code::<Query>(6, 3).unwrap();
        assert!(bond.possible_order(BondOrder::Aromatic));
        assert!(!bond.possible_order(BondOrder::Double));
    }

    #[test]
    fn test_nesting_limit() {
        let options = LoaderOptions::default().with_max_nesting_depth(1);
        assert_eq!(load::<Concrete>(ETHANOL, &options, 2).unwrap_err(), MolfileError::TooDeep(1));
    }
}

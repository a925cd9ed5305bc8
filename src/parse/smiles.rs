//! SMILES and SMARTS.
//!
//! The input is scanned once into atom and bond descriptions, then the
//! graph is built from them in one go. Bonds keep the order in which they
//! were opened, so a ring bond written as `C=1CCCCC1` gets its index at the
//! first `1`.

use std::collections::HashSet;

use petgraph::graph::{EdgeIndex, NodeIndex};
use thiserror::Error;
use tracing::*;

use super::properties::split_name_and_properties;
use crate::element::{Radical, ValenceError, AS, B, C, ELEMENTS, H, N, O, P, S, SE};
use crate::graph::*;
use crate::options::LoaderOptions;
use crate::query::{AtomConstraint, AtomLeaf, BondConstraint, BondLeaf, OPEN_END};
use crate::stereo::{self, StereoError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SmilesError {
    #[error("'[' at position {0} without a ']'")]
    UnclosedBracket(usize),
    #[error("probably misplaced '(' at position {0}")]
    MisplacedBranch(usize),
    #[error("unexpected ')' at position {0}")]
    UnexpectedBranchEnd(usize),
    #[error("{0} unclosed '('")]
    UnclosedBranch(usize),
    #[error("hierarchical component-level grouping at position {0} is not allowed")]
    NestedComponent(usize),
    #[error("no atom to attach to at position {0}")]
    NoPreviousAtom(usize),
    #[error("cycle {0} not closed")]
    UnclosedCycle(u32),
    #[error("bad cycle number at position {0}")]
    BadCycleNumber(usize),
    #[error("cycle {ring}: closing bond description {closing:?} does not match pending bond description {pending:?}")]
    RingBondMismatch { ring: u32, closing: String, pending: String },
    #[error("cycle {0}: closing bond direction does not match pending bond direction")]
    RingDirectionMismatch(u32),
    #[error("probably pending bond {0} not closed")]
    PendingBond(usize),
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("empty atom description at position {0}")]
    EmptyAtom(usize),
    #[error("invalid character '{ch}' within atom description {atom:?}")]
    InvalidAtomCharacter { ch: char, atom: String },
    #[error("unrecognized lowercase symbol '{0}'")]
    UnknownLowercase(char),
    #[error("unknown element {0:?}")]
    UnknownElement(String),
    #[error("two element labels for one atom {0:?}")]
    TwoElements(String),
    #[error("atom {0} without a label")]
    NoLabel(usize),
    #[error("'{0}' is allowed only for query molecules")]
    QueryOnly(String),
    #[error("'{0}' is allowed only in SMARTS")]
    SmartsOnly(String),
    #[error("bad atom class in {0:?}")]
    BadAtomClass(String),
    #[error("invalid bond description {0:?}")]
    InvalidBond(String),
    #[error("atom {atom}: {source}")]
    Valence { atom: usize, source: ValenceError },
    #[error("unclosed curly brace at position {0}")]
    UnclosedBrace(usize),
    #[error("{0}")]
    Polymer(&'static str),
    #[error("extended block: {0}")]
    ExtendedBlock(String),
    #[error("recursive SMARTS nested deeper than {0} levels")]
    TooDeep(usize),
    #[error(transparent)]
    Stereo(#[from] StereoError),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// A neighbour slot in written order. Ring-closure digits hold their place
/// until the ring is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Neighbor {
    Atom(usize),
    Ring(u32),
}

#[derive(Debug, Clone, Default)]
struct AtomDesc {
    tree: AtomConstraint,
    hydrogens: Option<u32>,
    /// `1` for `@`, `2` for `@@`.
    chirality: u8,
    aromatic: bool,
    brackets: bool,
    star: bool,
    class: u32,
    neighbors: Vec<Neighbor>,
    parent: Option<usize>,
    component: u32,
    polymer: Option<usize>,
    starts_polymer: bool,
    ends_polymer: bool,
    stereo_group: Option<StereoGroup>,
}

#[derive(Debug, Clone)]
struct BondDesc {
    beg: usize,
    end: Option<usize>,
    /// Last order written, `None` when nothing pins one.
    order: Option<BondOrder>,
    /// Whether any bond symbol was written at all.
    specified: bool,
    mark: DirectionalMark,
    tree: BondConstraint,
}

impl BondDesc {
    fn new(beg: usize) -> Self {
        Self {
            beg,
            end: None,
            order: None,
            specified: false,
            mark: DirectionalMark::None,
            tree: BondConstraint::any(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Cycle {
    /// Atom that opened the ring without a bond symbol.
    beg: Option<usize>,
    /// Bond that opened the ring with a bond symbol, and that symbol.
    pending: Option<(usize, String)>,
}

struct SmilesParser<'a> {
    chars: Vec<char>,
    i: usize,
    query: bool,
    smarts: bool,
    depth: usize,
    options: &'a LoaderOptions,

    atoms: Vec<AtomDesc>,
    bonds: Vec<BondDesc>,
    cycles: Vec<Cycle>,
    atom_stack: Vec<usize>,
    balance: usize,
    component: u32,
    inside_component: bool,
    /// Repetition count per polymer, `0` for a repeat unit.
    polymers: Vec<u32>,
    inside_polymer: bool,
    name: String,
    properties: std::collections::BTreeMap<String, String>,
}

fn is_organic(symbol: &str) -> bool {
    matches!(
        symbol,
        "B" | "C" | "N" | "O" | "P" | "S" | "F" | "Cl" | "Br" | "I" | "b" | "c" | "n" | "o" | "p" | "s" | "*"
    )
}

fn rsite_bit(number: u32) -> u32 {
    if (1..=32).contains(&number) {
        1 << (number - 1)
    } else {
        0
    }
}

/// Hides everything inside `$(...)` so separators there are not split on.
fn mask_recursive(text: &str) -> Vec<char> {
    let mut chars: Vec<char> = text.chars().collect();
    let mut k = 0;
    while k < chars.len() {
        if chars[k] == '$' && chars.get(k + 1) == Some(&'(') {
            let mut depth = 0;
            let mut j = k + 1;
            while j < chars.len() {
                match chars[j] {
                    '(' => depth += 1,
                    ')' => depth -= 1,
                    _ => {}
                }
                let done = depth == 0;
                chars[j] = '^';
                if done {
                    break;
                }
                j += 1;
            }
            k = j;
        }
        k += 1;
    }
    chars
}

/// Splits `text` at every `sep` that is visible in `masked`.
fn split_visible(text: &str, masked: &[char], sep: char) -> Vec<String> {
    let mut parts = vec![String::new()];
    for (c, m) in text.chars().zip(masked) {
        if *m == sep {
            parts.push(String::new());
        } else if let Some(last) = parts.last_mut() {
            last.push(c);
        }
    }
    parts
}

impl<'a> SmilesParser<'a> {
    fn new(text: &str, query: bool, smarts: bool, options: &'a LoaderOptions, depth: usize) -> Self {
        Self {
            chars: text.chars().collect(),
            i: 0,
            query,
            smarts,
            depth,
            options,
            atoms: vec![],
            bonds: vec![],
            cycles: vec![],
            atom_stack: vec![],
            balance: 0,
            component: 0,
            inside_component: false,
            polymers: vec![],
            inside_polymer: false,
            name: String::new(),
            properties: Default::default(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.i).copied()
    }

    fn top(&self) -> Result<usize, SmilesError> {
        self.atom_stack.last().copied().ok_or(SmilesError::NoPreviousAtom(self.i))
    }

    fn read_unsigned(&mut self) -> Option<u32> {
        let start = self.i;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.i += 1;
        }
        self.chars[start..self.i].iter().collect::<String>().parse().ok()
    }

    fn read_ring_number(&mut self) -> Result<u32, SmilesError> {
        let start = self.i;
        match self.peek() {
            Some('%') => {
                let digits: String = self.chars.iter().skip(self.i + 1).take(2).collect();
                if digits.len() != 2 || !digits.chars().all(|c| c.is_ascii_digit()) {
                    return Err(SmilesError::BadCycleNumber(start));
                }
                self.i += 3;
                digits.parse().map_err(|_| SmilesError::BadCycleNumber(start))
            }
            Some(c) if c.is_ascii_digit() => {
                self.i += 1;
                Ok(c as u32 - '0' as u32)
            }
            _ => Err(SmilesError::BadCycleNumber(start)),
        }
    }

    fn cycle(&mut self, number: u32) -> &mut Cycle {
        let index = number as usize;
        if self.cycles.len() <= index {
            self.cycles.resize(index + 1, Cycle::default());
        }
        &mut self.cycles[index]
    }

    /// Replaces the placeholder of ring `number` on `atom` with `other`.
    fn close_ring(&mut self, atom: usize, number: u32, other: usize) {
        if let Some(slot) = self.atoms[atom].neighbors.iter_mut().find(|n| **n == Neighbor::Ring(number)) {
            *slot = Neighbor::Atom(other);
        }
    }

    fn require_query(&self, what: impl ToString) -> Result<(), SmilesError> {
        if self.query {
            Ok(())
        } else {
            Err(SmilesError::QueryOnly(what.to_string()))
        }
    }

    fn scan(&mut self) -> Result<(), SmilesError> {
        let mut first_atom = true;

        while let Some(mut next) = self.peek() {
            if next.is_whitespace() {
                break;
            }

            if !first_atom {
                let mut added_bond = false;
                while next.is_ascii_digit() || next == '%' {
                    let number = self.read_ring_number()?;
                    let top = self.top()?;
                    let cycle = self.cycle(number);

                    if let Some(beg) = cycle.beg.take() {
                        // closing a ring opened by a bare digit, like the last 1 in c1ccccc1
                        let mut bond = BondDesc::new(top);
                        bond.end = Some(beg);
                        self.bonds.push(bond);
                        self.atoms[top].neighbors.push(Neighbor::Atom(beg));
                        self.close_ring(beg, number, top);
                        added_bond = true;
                        break;
                    } else if let Some((pending, _)) = cycle.pending.take() {
                        // closing a ring opened with a bond symbol, like the last 1 in C=1CCCCC1
                        let beg = self.bonds[pending].beg;
                        self.bonds[pending].end = Some(top);
                        self.atoms[top].neighbors.push(Neighbor::Atom(beg));
                        self.close_ring(beg, number, top);
                        added_bond = true;
                        break;
                    } else {
                        cycle.beg = Some(top);
                        self.atoms[top].neighbors.push(Neighbor::Ring(number));
                    }
                    match self.peek() {
                        Some(c) => next = c,
                        None => break,
                    }
                }
                if added_bond || self.peek().is_none() {
                    continue;
                }
                if let Some(c) = self.peek() {
                    next = c;
                }
                if next.is_whitespace() {
                    break;
                }
            }

            match next {
                '.' => {
                    self.i += 1;
                    if self.smarts && self.balance == 0 {
                        self.inside_component = false;
                        self.atom_stack.clear();
                    } else {
                        self.atom_stack.pop();
                    }
                    first_atom = true;
                    continue;
                }
                '(' => {
                    if self.smarts && first_atom {
                        if self.balance > 0 {
                            return Err(SmilesError::NestedComponent(self.i));
                        }
                        self.component += 1;
                        self.inside_component = true;
                    } else {
                        let top = self.atom_stack.last().copied().ok_or(SmilesError::MisplacedBranch(self.i))?;
                        self.atom_stack.push(top);
                    }
                    self.i += 1;
                    self.balance += 1;
                    continue;
                }
                ')' => {
                    if self.balance == 0 {
                        return Err(SmilesError::UnexpectedBranchEnd(self.i));
                    }
                    self.i += 1;
                    self.balance -= 1;
                    self.atom_stack.pop();
                    continue;
                }
                _ => {}
            }

            let mut bond = None;
            if !first_atom {
                let beg = self.top()?;
                let mut text = String::new();
                while let Some(c) = self.peek().filter(|c| "-=#$:@!;,&~?/\\".contains(*c)) {
                    text.push(c);
                    self.i += 1;
                }

                let mut desc = BondDesc::new(beg);
                if !text.is_empty() {
                    desc.specified = true;
                    desc.tree = self.read_bond(&text, &mut desc)?;
                }
                // directions are kept in the mark, the rest must match on ring closure
                let plain = text.replace(['/', '\\'], "-");

                if !text.is_empty() && self.peek().is_some_and(|c| c.is_ascii_digit() || c == '%') {
                    let number = self.read_ring_number()?;
                    let next_bond = self.bonds.len();
                    let cycle = self.cycle(number);

                    if let Some(opening) = cycle.beg.take() {
                        // like the last 1 in C1CCCCC=1
                        desc.end = Some(opening);
                        self.bonds.push(desc);
                        self.atoms[beg].neighbors.push(Neighbor::Atom(opening));
                        self.close_ring(opening, number, beg);
                    } else if let Some((pending, pending_text)) = cycle.pending.take() {
                        // like the last 1 in C=1CCCCC=1
                        if desc.mark != DirectionalMark::None {
                            if desc.mark == self.bonds[pending].mark {
                                if !self.options.ignore_cis_trans_errors {
                                    return Err(SmilesError::RingDirectionMismatch(number));
                                }
                                warn!("cycle {number}: conflicting bond directions, dropping them");
                                self.bonds[pending].mark = DirectionalMark::None;
                            } else {
                                self.bonds[pending].mark = desc.mark.flipped();
                            }
                        }
                        if plain != pending_text {
                            return Err(SmilesError::RingBondMismatch {
                                ring: number,
                                closing: plain,
                                pending: pending_text,
                            });
                        }
                        let opening = self.bonds[pending].beg;
                        self.bonds[pending].end = Some(beg);
                        self.atoms[beg].neighbors.push(Neighbor::Atom(opening));
                        self.close_ring(opening, number, beg);
                    } else {
                        // like the first 1 in C=1CCCCC=1
                        cycle.pending = Some((next_bond, plain));
                        self.bonds.push(desc);
                        self.atoms[beg].neighbors.push(Neighbor::Ring(number));
                    }
                    continue;
                }
                self.bonds.push(desc);
                bond = Some(self.bonds.len() - 1);
            }

            let start = self.i;
            let (text, brackets) = match self.peek() {
                Some('[') => {
                    self.i += 1;
                    let mut depth = 1;
                    let mut text = String::new();
                    loop {
                        let c = self.peek().ok_or(SmilesError::UnclosedBracket(start))?;
                        self.i += 1;
                        match c {
                            '[' => depth += 1,
                            ']' => {
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                            }
                            _ => {}
                        }
                        text.push(c);
                    }
                    (text, true)
                }
                Some(c) if !c.is_whitespace() => {
                    self.i += 1;
                    let mut text = c.to_string();
                    if let Some(second @ ('r' | 'l')) = self.peek() {
                        if (c, second) == ('B', 'r') || (c, second) == ('C', 'l') {
                            text.push(second);
                            self.i += 1;
                        }
                    }
                    if !self.smarts && !is_organic(&text) {
                        return Err(SmilesError::InvalidAtomCharacter { ch: c, atom: text });
                    }
                    (text, false)
                }
                _ => return Err(SmilesError::UnexpectedEnd),
            };

            if text.is_empty() {
                return Err(SmilesError::EmptyAtom(start));
            }
            let mut desc = AtomDesc::default();
            let tree = self.read_atom(&text, brackets, &mut desc)?;
            desc.tree = tree;
            desc.brackets = brackets;
            trace!("atom {} from {:?}", self.atoms.len(), text);

            let index = self.atoms.len();
            if let Some(b) = bond {
                let beg = self.bonds[b].beg;
                self.bonds[b].end = Some(index);
                self.atoms[beg].neighbors.push(Neighbor::Atom(index));
                desc.neighbors.push(Neighbor::Atom(beg));
                desc.parent = Some(beg);

                // a bond leaving a polymer keeps the new atom inside, unless it
                // leaves from the closing atom outside of a branch
                if let Some(polymer) = self.atoms[beg].polymer {
                    let in_branch = self.atom_stack.len() >= 2
                        && self.atom_stack[self.atom_stack.len() - 1] == self.atom_stack[self.atom_stack.len() - 2];
                    if !self.atoms[beg].ends_polymer || in_branch {
                        desc.polymer = Some(polymer);
                    }
                }
            }
            if self.inside_component {
                desc.component = self.component;
            }
            self.atoms.push(desc);

            if !first_atom {
                self.atom_stack.pop();
            }
            self.atom_stack.push(index);
            first_atom = false;

            while self.peek() == Some('{') {
                self.read_curly_brace(index)?;
            }
            if self.inside_polymer {
                self.atoms[index].polymer = Some(self.polymers.len() - 1);
            }
        }

        if self.balance > 0 {
            return Err(SmilesError::UnclosedBranch(self.balance));
        }
        for (number, cycle) in self.cycles.iter().enumerate() {
            if cycle.beg.is_some() || cycle.pending.is_some() {
                return Err(SmilesError::UnclosedCycle(number as u32));
            }
        }
        if self.inside_polymer {
            return Err(SmilesError::Polymer("polymer not closed"));
        }
        Ok(())
    }

    fn read_curly_brace(&mut self, atom: usize) -> Result<(), SmilesError> {
        let start = self.i;
        self.i += 1;
        let mut text = String::new();
        loop {
            match self.peek() {
                None => return Err(SmilesError::UnclosedBrace(start)),
                Some('}') => {
                    self.i += 1;
                    break;
                }
                Some(c) => {
                    text.push(c);
                    self.i += 1;
                }
            }
        }

        if text == "-" {
            if self.inside_polymer {
                return Err(SmilesError::Polymer("nested polymers not allowed"));
            }
            self.inside_polymer = true;
            self.atoms[atom].starts_polymer = true;
            self.polymers.push(0);
        } else if text.starts_with("+r") {
            return Err(SmilesError::Polymer("ring repeating units not supported"));
        } else if let Some(count) = text.strip_prefix("+n") {
            if !self.inside_polymer {
                return Err(SmilesError::Polymer("misplaced polymer ending"));
            }
            let repetitions = count.parse().unwrap_or(0);
            self.inside_polymer = false;
            if let Some(last) = self.polymers.last_mut() {
                *last = repetitions;
            }
            self.atoms[atom].polymer = Some(self.polymers.len() - 1);
            self.atoms[atom].ends_polymer = true;
        } else {
            debug!("skipping curly brace annotation {{{text}}}");
        }
        Ok(())
    }

    fn read_bond(&self, text: &str, desc: &mut BondDesc) -> Result<BondConstraint, SmilesError> {
        for (sep, conjunction) in [(';', true), (',', false), ('&', true)] {
            if !text.contains(sep) {
                continue;
            }
            self.require_query(sep)?;
            let mut tree: Option<BondConstraint> = None;
            for part in text.split(sep) {
                let sub = self.read_bond(part, desc)?;
                tree = Some(match tree {
                    None => sub,
                    Some(tree) if conjunction => tree.and(sub),
                    Some(tree) => tree.or(sub),
                });
            }
            return Ok(tree.unwrap_or_default());
        }

        let mut tree = BondConstraint::any();
        let mut neg = false;
        for c in text.chars() {
            let mut order = None;
            let mut topology = None;
            match c {
                '!' => {
                    self.require_query(c)?;
                    neg = !neg;
                    continue;
                }
                '-' => order = Some(BondOrder::Single),
                '=' => order = Some(BondOrder::Double),
                '#' => order = Some(BondOrder::Triple),
                ':' => order = Some(BondOrder::Aromatic),
                '/' => {
                    order = Some(BondOrder::Single);
                    desc.mark = DirectionalMark::Slash;
                }
                '\\' => {
                    order = Some(BondOrder::Single);
                    desc.mark = DirectionalMark::Backslash;
                }
                '~' => {
                    self.require_query(c)?;
                    desc.order = Some(BondOrder::Query);
                }
                '@' => {
                    self.require_query(c)?;
                    topology = Some(Topology::Ring);
                }
                '?' => {}
                _ => return Err(SmilesError::InvalidBond(text.to_owned())),
            }

            let mut sub = None;
            if let Some(order) = order {
                desc.order = Some(order);
                sub = Some(BondConstraint::from(BondLeaf::Order(order)));
            }
            if let Some(topology) = topology {
                sub = Some(sub.unwrap_or_default().and(BondLeaf::Topology(topology)));
            }
            if let Some(sub) = sub {
                let sub = if neg { sub.negate() } else { sub };
                neg = false;
                tree = tree.and(sub);
            }
        }
        Ok(tree)
    }

    fn element(symbol: &str) -> Result<u8, SmilesError> {
        ELEMENTS
            .symbol_to_number(symbol)
            .ok_or_else(|| SmilesError::UnknownElement(symbol.to_owned()))
    }

    fn read_atom(&self, text: &str, first_in_brackets: bool, desc: &mut AtomDesc) -> Result<AtomConstraint, SmilesError> {
        if text.is_empty() {
            return Err(SmilesError::EmptyAtom(self.i));
        }

        let masked = mask_recursive(text);
        for (sep, conjunction) in [(';', true), (',', false), ('&', true)] {
            if !masked.contains(&sep) {
                continue;
            }
            self.require_query(sep)?;
            let mut tree: Option<AtomConstraint> = None;
            for (k, part) in split_visible(text, &masked, sep).into_iter().enumerate() {
                let sub = self.read_atom(&part, first_in_brackets && k == 0, desc)?;
                tree = Some(match tree {
                    None => sub,
                    Some(tree) if conjunction => tree.and(sub),
                    Some(tree) => tree.or(sub),
                });
            }
            return Ok(tree.unwrap_or_default());
        }

        let chars: Vec<char> = text.chars().collect();
        let mut j = 0;
        let read_number = |j: &mut usize| -> Option<u32> {
            let start = *j;
            while chars.get(*j).is_some_and(|c| c.is_ascii_digit()) {
                *j += 1;
            }
            chars[start..*j].iter().collect::<String>().parse().ok()
        };
        let two_chars = |first: char, j: &mut usize| -> Result<u8, SmilesError> {
            let symbol: String = [first, chars[*j]].iter().collect();
            *j += 1;
            Self::element(&symbol)
        };
        let next_in = |j: usize, set: &str| chars.get(j).is_some_and(|c| set.contains(*c));

        let mut tree = AtomConstraint::any();
        let mut first = first_in_brackets;
        let mut element_assigned = false;
        let mut neg = false;

        while j < chars.len() {
            let next = chars[j];
            let mut isotope_set = false;
            let mut element = None;
            let mut aromatic = None;
            let mut sub: Option<AtomConstraint> = None;

            match next {
                '!' => {
                    self.require_query(next)?;
                    j += 1;
                    neg = !neg;
                    first = false;
                    continue;
                }
                '$' => {
                    if !self.smarts {
                        return Err(SmilesError::SmartsOnly("$".to_owned()));
                    }
                    j += 1;
                    if chars.get(j) != Some(&'(') {
                        return Err(SmilesError::InvalidAtomCharacter { ch: '$', atom: text.to_owned() });
                    }
                    j += 1;
                    let mut depth = 1;
                    let mut fragment = String::new();
                    loop {
                        let c = *chars
                            .get(j)
                            .ok_or_else(|| SmilesError::InvalidAtomCharacter { ch: '$', atom: text.to_owned() })?;
                        j += 1;
                        match c {
                            '(' => depth += 1,
                            ')' => {
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                            }
                            _ => {}
                        }
                        fragment.push(c);
                    }
                    if self.depth + 1 > self.options.max_nesting_depth {
                        return Err(SmilesError::TooDeep(self.options.max_nesting_depth));
                    }
                    load::<Query>(&fragment, true, self.options, self.depth + 1)?;
                    sub = Some(AtomLeaf::Fragment(fragment).into());
                }
                c if c.is_ascii_digit() => {
                    let isotope = read_number(&mut j).ok_or_else(|| SmilesError::InvalidAtomCharacter {
                        ch: c,
                        atom: text.to_owned(),
                    })?;
                    sub = Some(AtomLeaf::Isotope(isotope as u16).into());
                    isotope_set = true;
                }
                'H' => {
                    j += 1;
                    // He, Hs, Hf, Ho, Hg
                    if next_in(j, "esfog") {
                        element = Some(two_chars('H', &mut j)?);
                    } else if first {
                        element = Some(H);
                    } else {
                        let count = read_number(&mut j).unwrap_or(1);
                        desc.hydrogens = Some(count);
                        sub = Some(AtomLeaf::total_h(count as i32).into());
                    }
                }
                'A' => {
                    j += 1;
                    if next_in(j, "lrsgutcm") {
                        element = Some(two_chars('A', &mut j)?);
                    } else {
                        self.require_query('A')?;
                        sub = Some(AtomLeaf::Aromatic(false).into());
                    }
                }
                'R' => {
                    j += 1;
                    if next_in(j, "buhenafg") {
                        element = Some(two_chars('R', &mut j)?);
                    } else if next_in(j, "#") {
                        j += 1;
                        sub = Some(AtomLeaf::RSite(0).into());
                    } else if !self.query {
                        let bits = read_number(&mut j).map_or(0, rsite_bit);
                        sub = Some(AtomLeaf::RSite(bits).into());
                    } else {
                        sub = Some(match read_number(&mut j) {
                            Some(0) => AtomLeaf::ring_bonds(0).into(),
                            Some(n) => AtomLeaf::SssrRings(n as i32).into(),
                            None => AtomLeaf::RingBonds(1..=OPEN_END).into(),
                        });
                    }
                }
                'D' => {
                    j += 1;
                    if next_in(j, "bsy") {
                        element = Some(two_chars('D', &mut j)?);
                    } else {
                        self.require_query('D')?;
                        let degree = read_number(&mut j).unwrap_or(1);
                        sub = Some(AtomLeaf::substituents(degree as i32).into());
                    }
                }
                'X' => {
                    j += 1;
                    if next_in(j, "e") {
                        element = Some(two_chars('X', &mut j)?);
                    } else {
                        self.require_query('X')?;
                        let conn = read_number(&mut j).unwrap_or(1);
                        sub = Some(AtomLeaf::Connectivity(conn as i32).into());
                    }
                }
                '*' => {
                    j += 1;
                    desc.star = true;
                    sub = Some(if self.query {
                        AtomConstraint::not_hydrogen()
                    } else {
                        AtomLeaf::RSite(0).into()
                    });
                }
                '#' => {
                    if !self.smarts {
                        return Err(SmilesError::SmartsOnly("#".to_owned()));
                    }
                    j += 1;
                    let number = read_number(&mut j).ok_or_else(|| SmilesError::InvalidAtomCharacter {
                        ch: '#',
                        atom: text.to_owned(),
                    })?;
                    let number = u8::try_from(number)
                        .ok()
                        .filter(|n| ELEMENTS.is_element(*n))
                        .ok_or_else(|| SmilesError::UnknownElement(format!("#{number}")))?;
                    element = Some(number);
                }
                // aromatic arsenic and selenium
                'a' | 's' if chars.get(j + 1) == Some(&if next == 'a' { 's' } else { 'e' }) => {
                    j += 2;
                    element = Some(if next == 'a' { AS } else { SE });
                    aromatic = Some(true);
                }
                c if c.is_ascii_alphabetic() && !"hrvxa".contains(c) => {
                    j += 1;
                    match c {
                        'b' => element = Some(B),
                        'c' => element = Some(C),
                        'n' => element = Some(N),
                        'o' => element = Some(O),
                        'p' => element = Some(P),
                        's' => element = Some(S),
                        c if c.is_ascii_lowercase() => return Err(SmilesError::UnknownLowercase(c)),
                        _ => {}
                    }
                    if element.is_some() {
                        aromatic = Some(true);
                    } else if let Some(two) = chars
                        .get(j)
                        .filter(|l| l.is_ascii_lowercase())
                        .and_then(|l| ELEMENTS.symbol_to_number(&format!("{c}{l}")))
                    {
                        // [Nr] would be nitrogen in a ring, but nobody writes it that way
                        j += 1;
                        element = Some(two);
                    } else {
                        let number = Self::element(&c.to_string())?;
                        element = Some(number);
                        if self.smarts && matches!(number, B | C | N | O | P | S) {
                            aromatic = Some(false);
                        }
                    }
                }
                '@' => {
                    j += 1;
                    desc.chirality = 1;
                    if chars.get(j) == Some(&'@') {
                        j += 1;
                        desc.chirality = 2;
                    }
                }
                '+' | '-' => {
                    j += 1;
                    let unit = if next == '+' { 1 } else { -1 };
                    let charge = match read_number(&mut j) {
                        Some(n) => unit * n as i32,
                        None => {
                            let mut charge = unit;
                            while chars.get(j) == Some(&next) {
                                j += 1;
                                charge += unit;
                            }
                            charge
                        }
                    };
                    sub = Some(AtomLeaf::Charge(charge).into());
                }
                'a' => {
                    j += 1;
                    self.require_query('a')?;
                    sub = Some(AtomLeaf::Aromatic(true).into());
                }
                'h' => {
                    j += 1;
                    self.require_query('h')?;
                    sub = Some(match read_number(&mut j) {
                        Some(n) => AtomLeaf::ImplicitH(n as i32..=n as i32).into(),
                        None => AtomLeaf::ImplicitH(1..=OPEN_END).into(),
                    });
                }
                'r' => {
                    j += 1;
                    self.require_query('r')?;
                    sub = Some(match read_number(&mut j) {
                        Some(n) => AtomLeaf::SmallestRingSize(n as i32).into(),
                        None => AtomLeaf::RingBonds(1..=OPEN_END).into(),
                    });
                }
                'v' => {
                    j += 1;
                    self.require_query('v')?;
                    let valence = read_number(&mut j).unwrap_or(1);
                    sub = Some(AtomLeaf::TotalBondOrder(valence as i32).into());
                }
                'x' => {
                    j += 1;
                    self.require_query('x')?;
                    sub = Some(match read_number(&mut j) {
                        Some(n) => AtomLeaf::ring_bonds(n as i32).into(),
                        None => AtomLeaf::RingBonds(1..=OPEN_END).into(),
                    });
                }
                ':' => {
                    j += 1;
                    match read_number(&mut j) {
                        Some(class) if class > 0 => desc.class = class,
                        _ => return Err(SmilesError::BadAtomClass(text.to_owned())),
                    }
                }
                other => {
                    return Err(SmilesError::InvalidAtomCharacter { ch: other, atom: text.to_owned() });
                }
            }

            if let Some(number) = element {
                if element_assigned {
                    return Err(SmilesError::TwoElements(text.to_owned()));
                }
                element_assigned = true;
                sub = Some(sub.unwrap_or_default().and(AtomLeaf::Number(number)));
            }
            if let Some(flag) = aromatic {
                if flag {
                    desc.aromatic = true;
                }
                sub = Some(sub.unwrap_or_default().and(AtomLeaf::Aromatic(flag)));
            }
            if let Some(sub) = sub {
                let sub = if neg { sub.negate() } else { sub };
                neg = false;
                tree = tree.and(sub);
            }

            // [2H] is deuterium, not something with one hydrogen
            if !isotope_set {
                first = false;
            }
        }
        Ok(tree)
    }

    /// The `|...|` block of extended SMILES: enhanced stereo, radicals,
    /// pseudoatom labels and highlighting.
    fn read_extended_block(&mut self) -> Result<(), SmilesError> {
        let bad = |what: &str| SmilesError::ExtendedBlock(what.to_owned());

        loop {
            let c = self.peek().ok_or_else(|| bad("missing closing '|'"))?;
            self.i += 1;
            match c {
                '|' => break,
                'w' | 'a' | 'o' | '&' => {
                    let group = match c {
                        'o' | '&' => self.read_unsigned().ok_or_else(|| bad("group number expected"))?,
                        _ => 0,
                    };
                    let kind = match c {
                        'w' => StereoKind::Any,
                        'a' => StereoKind::Abs,
                        'o' => StereoKind::Or,
                        _ => StereoKind::And,
                    };
                    self.expect_colon(c)?;
                    for index in self.read_index_list()? {
                        self.atoms[index].stereo_group = Some(StereoGroup::new(kind, group));
                    }
                }
                '^' => {
                    let radical = match self.peek() {
                        Some('1') => Radical::Doublet,
                        Some('3') => Radical::Singlet,
                        Some('4') => Radical::Triplet,
                        other => return Err(SmilesError::ExtendedBlock(format!("unsupported radical number {other:?}"))),
                    };
                    self.i += 1;
                    self.expect_colon(c)?;
                    for index in self.read_index_list()? {
                        let tree = std::mem::take(&mut self.atoms[index].tree);
                        self.atoms[index].tree = tree
                            .without_kind(&AtomLeaf::Radical(radical))
                            .and(AtomLeaf::Radical(radical));
                    }
                }
                '$' => {
                    let mut labels = vec![String::new()];
                    loop {
                        let c = self.peek().ok_or_else(|| bad("end of input while reading $...$ block"))?;
                        self.i += 1;
                        match c {
                            '$' => break,
                            ';' => labels.push(String::new()),
                            c => {
                                if let Some(last) = labels.last_mut() {
                                    last.push(c)
                                }
                            }
                        }
                    }
                    if labels.len() != self.atoms.len() {
                        return Err(SmilesError::ExtendedBlock(format!(
                            "{} labels in $...$ block for {} atoms",
                            labels.len(),
                            self.atoms.len()
                        )));
                    }
                    for (atom, label) in self.atoms.iter_mut().zip(labels) {
                        if label.is_empty() {
                            continue;
                        }
                        let rsite = label.strip_prefix("_R").and_then(|n| n.parse::<u32>().ok());
                        atom.tree = match rsite {
                            Some(number) => AtomLeaf::RSite(rsite_bit(number)).into(),
                            None => std::mem::take(&mut atom.tree)
                                .without_kind(&AtomLeaf::Number(0))
                                .without_kind(&AtomLeaf::RSite(0))
                                .without_kind(&AtomLeaf::Aromatic(false))
                                .and(AtomLeaf::Pseudo(label)),
                        };
                        atom.aromatic = false;
                    }
                }
                'h' => {
                    match self.peek() {
                        Some('a' | 'b') => self.i += 1,
                        other => {
                            return Err(SmilesError::ExtendedBlock(format!("expected 'a' or 'b' after 'h', got {other:?}")))
                        }
                    }
                    self.expect_colon(c)?;
                    let highlighted = self.read_index_list()?;
                    debug!("ignoring highlighting of {} items", highlighted.len());
                }
                other => trace!("skipping '{other}' in extended block"),
            }
        }
        Ok(())
    }

    fn expect_colon(&mut self, after: char) -> Result<(), SmilesError> {
        if self.peek() != Some(':') {
            return Err(SmilesError::ExtendedBlock(format!("colon expected after '{after}'")));
        }
        self.i += 1;
        Ok(())
    }

    fn read_index_list(&mut self) -> Result<Vec<usize>, SmilesError> {
        let mut indices = vec![];
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            let index = self.read_unsigned().unwrap_or(u32::MAX) as usize;
            if index >= self.atoms.len() {
                return Err(SmilesError::ExtendedBlock(format!("no atom {index}")));
            }
            indices.push(index);
            if self.peek() == Some(',') {
                self.i += 1;
            }
        }
        Ok(indices)
    }

    /// Everything after the structure: the extended block, then the name
    /// and properties.
    fn read_trailer(&mut self) -> Result<(), SmilesError> {
        while self.peek().is_some_and(char::is_whitespace) {
            self.i += 1;
        }
        if self.peek() == Some('|') {
            self.i += 1;
            self.read_extended_block()?;
        }
        let rest: String = self.chars[self.i..].iter().collect();
        let (name, properties) = split_name_and_properties(rest.trim());
        self.name = name;
        self.properties = properties;
        Ok(())
    }

    fn build<F: Flavor>(mut self) -> Result<MoleculeGraph<F>, SmilesError> {
        let mut mol = MoleculeGraph::<F>::new();
        mol.name = std::mem::take(&mut self.name);
        mol.properties = std::mem::take(&mut self.properties);

        for (index, desc) in self.atoms.iter().enumerate() {
            let mut atom = Atom::<F>::new(AtomKind::Query);
            atom.attach(desc.tree.clone())?;
            if !F::IS_QUERY && atom.kind == AtomKind::Query {
                return Err(SmilesError::NoLabel(index));
            }
            atom.aromatic |= desc.aromatic;
            atom.mapping = desc.class;
            atom.component = desc.component;
            atom.stereo_group = desc.stereo_group;
            mol.add_atom(atom);
        }

        for (index, desc) in self.bonds.iter().enumerate() {
            let end = desc.end.ok_or(SmilesError::PendingBond(index))?;
            let mut bond = Bond::<F>::new(BondOrder::Query);
            bond.attach(desc.tree.clone())?;
            bond.mark = desc.mark;
            mol.add_bond(NodeIndex::new(desc.beg), NodeIndex::new(end), bond)?;
        }

        self.assign_default_bonds(&mut mol)?;

        for polymer in 0..self.polymers.len() {
            self.add_polymer_group(&mut mol, polymer)?;
        }

        if !F::IS_QUERY {
            self.assign_hydrogens(&mut mol)?;
        }

        if self.smarts {
            // SMARTS atoms never match hydrogen unless they say so
            for index in 0..self.atoms.len() {
                let atom = &mut mol[NodeIndex::new(index)];
                let Some(tree) = atom.constraint() else {
                    continue;
                };
                if tree.pinned_number().is_none() && atom.possible_number(H) && !tree.mentions(&AtomLeaf::Number(H)) {
                    atom.attach(AtomConstraint::not_hydrogen())?;
                }
            }
        }

        for (index, desc) in self.atoms.iter().enumerate() {
            let atom = &mut mol[NodeIndex::new(index)];
            if desc.star && desc.class != 0 {
                atom.replace(AtomLeaf::RSite(0))?;
                atom.allow_rgroup(desc.class);
            }
            if desc.chirality > 0 {
                let neighbors = desc
                    .neighbors
                    .iter()
                    .filter_map(|n| match n {
                        Neighbor::Atom(other) => Some(NodeIndex::new(*other)),
                        Neighbor::Ring(_) => None,
                    })
                    .collect();
                atom.smiles_chirality = Some(SmilesChirality {
                    clockwise: desc.chirality == 2,
                    parent: desc.parent.map(NodeIndex::new),
                    neighbors,
                });
            }
        }

        stereo::perceive(&mut mol, self.options)?;

        let rsites: Vec<NodeIndex> = mol.atoms().filter(|(_, a)| a.is_rsite()).map(|(n, _)| n).collect();
        for node in rsites {
            let order = mol.incident(node).into_iter().map(|(_, other)| other).collect();
            mol[node].attachment_order = order;
        }

        Ok(mol)
    }

    /// Bonds written without a symbol: single or aromatic. In SMARTS that
    /// is a query; otherwise the bond is aromatic when it lies on a ring
    /// of aromatic atoms with no explicit non-aromatic bond.
    fn assign_default_bonds<F: Flavor>(&self, mol: &mut MoleculeGraph<F>) -> Result<(), SmilesError> {
        let unspecified: Vec<EdgeIndex> = self
            .bonds
            .iter()
            .enumerate()
            .filter(|(_, desc)| !desc.specified)
            .map(|(index, _)| EdgeIndex::new(index))
            .collect();

        if self.smarts {
            for edge in unspecified {
                let (beg, end) = mol.endpoints(edge)?;
                let can_be_aromatic = |node: NodeIndex| {
                    mol[node].constraint().map_or(true, |tree| {
                        tree.possible(&|leaf| match leaf {
                            AtomLeaf::Aromatic(flag) => Some(*flag),
                            _ => None,
                        })
                    })
                };
                let tree = if can_be_aromatic(beg) && can_be_aromatic(end) {
                    BondConstraint::single_or_aromatic()
                } else {
                    BondLeaf::Order(BondOrder::Single).into()
                };
                mol[edge].attach(tree)?;
            }
            return Ok(());
        }

        let mut aromatic = HashSet::new();
        for cycle in mol.cycle_basis() {
            let mut needs_modification = false;
            let mut fits = true;
            for &edge in &cycle {
                let (beg, end) = mol.endpoints(edge)?;
                let desc = &self.bonds[edge.index()];
                if !self.atoms[beg.index()].aromatic || !self.atoms[end.index()].aromatic {
                    fits = false;
                } else if matches!(desc.order, Some(BondOrder::Single | BondOrder::Double | BondOrder::Triple)) {
                    fits = false;
                } else if !desc.specified {
                    needs_modification = true;
                } else if !mol.possible_bond_order(edge, BondOrder::Aromatic) {
                    fits = false;
                }
                if !fits {
                    break;
                }
            }
            if fits && needs_modification {
                aromatic.extend(cycle);
            }
        }

        for edge in unspecified {
            let order = if aromatic.contains(&edge) { BondOrder::Aromatic } else { BondOrder::Single };
            mol[edge].constrain(BondLeaf::Order(order))?;
        }
        Ok(())
    }

    fn assign_hydrogens<F: Flavor>(&self, mol: &mut MoleculeGraph<F>) -> Result<(), SmilesError> {
        for (index, desc) in self.atoms.iter().enumerate() {
            let node = NodeIndex::new(index);
            let hydrogens = if let Some(h) = desc.hydrogens {
                Some(h)
            } else if desc.brackets {
                Some(0)
            } else if desc.aromatic {
                // an aromatic carbon with two neighbours keeps one hydrogen
                if mol[node].number() == Some(C) && mol.degree(node) < 3 {
                    Some(1)
                } else {
                    Some(0)
                }
            } else if let Some(number) = mol[node].number() {
                let atom = &mol[node];
                match ELEMENTS.calc_valence(number, atom.charge, atom.radical, mol.connectivity(node)) {
                    Ok((_, hyd)) => Some(hyd.max(0) as u32),
                    Err(e) if self.options.ignore_bad_valence => {
                        warn!("atom {index}: {e}, ignored");
                        None
                    }
                    Err(source) => return Err(SmilesError::Valence { atom: index, source }),
                }
            } else {
                None
            };
            if hydrogens.is_some() {
                mol[node].implicit_h = hydrogens;
            }
        }
        Ok(())
    }

    /// Turns a `{-}...{+n}` span into a repeat unit, or a `{+nN}` span into
    /// a multiple group.
    fn add_polymer_group<F: Flavor>(&self, mol: &mut MoleculeGraph<F>, polymer: usize) -> Result<(), SmilesError> {
        let repetitions = self.polymers[polymer];
        let mut sgroup = if repetitions == 0 {
            let mut sgroup = SGroup::new(SGroupKind::RepeatUnit, mol.sgroups.len() as u32 + 1);
            sgroup.connectivity = Connectivity::HeadToTail;
            sgroup
        } else {
            let mut sgroup = SGroup::new(SGroupKind::Multiple, mol.sgroups.len() as u32 + 1);
            sgroup.multiplier = repetitions;
            sgroup
        };

        let inside = |index: usize| self.atoms.get(index).and_then(|a| a.polymer) == Some(polymer);
        let mut start = None;
        let mut end = None;
        for (index, desc) in self.atoms.iter().enumerate() {
            if desc.polymer != Some(polymer) {
                continue;
            }
            let node = NodeIndex::new(index);
            sgroup.atoms.push(node);
            if repetitions > 0 {
                sgroup.parent_atoms.push(node);
            }
            if desc.starts_polymer {
                start = Some(node);
            }
            if desc.ends_polymer {
                end = Some(node);
            }
        }
        let mut start = start.ok_or(SmilesError::Polymer("polymer start not found"))?;
        let mut end = end.ok_or(SmilesError::Polymer("polymer end not found"))?;

        let mut start_bond = None;
        let mut end_bond = None;
        for (edge, beg, other, _) in mol.bonds() {
            match (inside(beg.index()), inside(other.index())) {
                (false, false) => {}
                (true, true) => sgroup.bonds.push(edge),
                _ => {
                    if start_bond.is_none() && (beg == start || other == start) {
                        start_bond = Some(edge);
                    } else if end_bond.is_none() && (beg == end || other == end) {
                        end_bond = Some(edge);
                    } else {
                        return Err(SmilesError::Polymer("unknown bond going from a polymer"));
                    }
                }
            }
        }
        if end_bond.is_none() && start_bond.is_some() {
            std::mem::swap(&mut start, &mut end);
            std::mem::swap(&mut start_bond, &mut end_bond);
        }
        sgroup.brackets = vec![Default::default(); 2];

        if repetitions == 0 {
            // open ends of a repeat unit get a star
            for (atom, crossing) in [(start, start_bond), (end, end_bond)] {
                if crossing.is_some() {
                    continue;
                }
                let kind = if F::IS_QUERY { AtomKind::Query } else { AtomKind::Pseudo("*".to_owned()) };
                let star = mol.add_atom(Atom::new(kind));
                mol.add_bond(atom, star, Bond::new(BondOrder::Single))?;
            }
        }
        debug!("polymer {} spans {} atoms", polymer, sgroup.atoms.len());
        mol.sgroups.push(sgroup);
        Ok(())
    }
}

/// Parses `text` into a graph of flavor `F`. `smarts` switches on the
/// SMARTS dialect, which needs a query flavor.
pub fn load<F: Flavor>(text: &str, smarts: bool, options: &LoaderOptions, depth: usize) -> Result<MoleculeGraph<F>, SmilesError> {
    let mut parser = SmilesParser::new(text.trim_start(), F::IS_QUERY, smarts && F::IS_QUERY, options, depth);
    parser.scan()?;
    parser.read_trailer()?;
    let mol = parser.build::<F>()?;
    debug!("parsed {} atoms and {} bonds from {:?}", mol.atom_count(), mol.bond_count(), text);
    Ok(mol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{CL, F};

    fn smiles(text: &str) -> Result<Molecule, SmilesError> {
        load(text, false, &LoaderOptions::default(), 0)
    }

    fn smarts(text: &str) -> Result<QueryMolecule, SmilesError> {
        load(text, true, &LoaderOptions::default(), 0)
    }

    fn orders(mol: &Molecule) -> Vec<BondOrder> {
        mol.bonds().map(|(_, _, _, bond)| bond.order).collect()
    }

    #[test]
    fn test_aniline() {
        let mol = smiles("c1ccccc1N").unwrap();
        assert_eq!(mol.atom_count(), 7);
        let orders = orders(&mol);
        assert_eq!(orders.iter().filter(|o| **o == BondOrder::Aromatic).count(), 6);
        assert_eq!(orders.iter().filter(|o| **o == BondOrder::Single).count(), 1);
        assert!(mol.stereocenters.is_empty());
        assert_eq!(mol.implicit_hydrogens(NodeIndex::new(0)), 1);
        assert_eq!(mol.implicit_hydrogens(NodeIndex::new(5)), 0);
        assert_eq!(mol.implicit_hydrogens(NodeIndex::new(6)), 2);
    }

    #[test]
    fn test_ring_closures() {
        assert_eq!(smiles("C1CC").unwrap_err(), SmilesError::UnclosedCycle(1));

        let mol = smiles("C=1CCCCC1").unwrap();
        assert_eq!(mol.bond_count(), 6);
        // the ring bond is numbered where it was opened
        assert_eq!(mol.endpoints(EdgeIndex::new(0)).unwrap(), (NodeIndex::new(0), NodeIndex::new(5)));
        assert_eq!(mol[EdgeIndex::new(0)].order, BondOrder::Double);

        assert!(matches!(smiles("C=1CCCCC#1"), Err(SmilesError::RingBondMismatch { ring: 1, .. })));
        assert!(smiles("C=1CCCCC=1").is_ok());

        let mol = smiles("C%12CC%12").unwrap();
        assert_eq!(mol.bond_count(), 3);
    }

    #[test]
    fn test_branches_and_errors() {
        let mol = smiles("CC(C)(C)O").unwrap();
        assert_eq!(mol.degree(NodeIndex::new(1)), 4);
        assert!(matches!(smiles("CC)C"), Err(SmilesError::UnexpectedBranchEnd(2))));
        assert!(matches!(smiles("CC(C"), Err(SmilesError::UnclosedBranch(1))));
        assert!(matches!(smiles("C[CH3"), Err(SmilesError::UnclosedBracket(1))));
        assert!(matches!(smiles("C[Zz]"), Err(SmilesError::UnknownElement(_))));
        assert!(matches!(smiles("C="), Err(SmilesError::UnexpectedEnd)));
    }

    #[test]
    fn test_valence() {
        let err = smiles("C(C)(C)(C)(C)C").unwrap_err();
        assert!(matches!(err, SmilesError::Valence { atom: 0, .. }));

        let options = LoaderOptions::default().with_ignore_bad_valence(true);
        let mol: Molecule = load("C(C)(C)(C)(C)C", false, &options, 0).unwrap();
        assert_eq!(mol.atom_count(), 6);
    }

    #[test]
    fn test_bracket_atoms() {
        let mol = smiles("[13CH3:4][N+](C)(C)C.[Cl-]").unwrap();
        let carbon = &mol[NodeIndex::new(0)];
        assert_eq!(carbon.isotope, 13);
        assert_eq!(carbon.implicit_h, Some(3));
        assert_eq!(carbon.mapping, 4);
        assert_eq!(mol[NodeIndex::new(1)].charge, 1);
        assert_eq!(mol[NodeIndex::new(1)].implicit_h, Some(0));
        assert_eq!(mol[NodeIndex::new(5)].number(), Some(CL));
        assert_eq!(mol[NodeIndex::new(5)].charge, -1);
        assert_eq!(mol.bond_count(), 4);

        assert_eq!(smiles("[Fe+++]").unwrap()[NodeIndex::new(0)].charge, 3);
        assert_eq!(smiles("[2H]").unwrap()[NodeIndex::new(0)].isotope, 2);
        assert!(matches!(smiles("[CH4:0]"), Err(SmilesError::BadAtomClass(_))));
        assert!(matches!(smiles("[C;H4]"), Err(SmilesError::QueryOnly(_))));
    }

    #[test]
    fn test_name_and_properties() {
        let mol = smiles("CCO ethanol source=test").unwrap();
        assert_eq!(mol.name, "ethanol");
        assert_eq!(mol.properties["source"], "test");
    }

    #[test]
    fn test_chirality() {
        let mol = smiles("N[C@@H](C)C(=O)O").unwrap();
        let center = &mol.stereocenters[&NodeIndex::new(1)];
        assert_eq!(center.kind, StereoKind::Abs);
        assert_eq!(center.pyramid, [NodeIndex::new(2), NodeIndex::new(3), NodeIndex::new(0), NodeIndex::new(1)]);

        let mol = smiles("N[C@@H](C)C(=O)O |&1:1|").unwrap();
        assert_eq!(mol.stereocenters[&NodeIndex::new(1)].kind, StereoKind::And);
        assert_eq!(mol.stereocenters[&NodeIndex::new(1)].group, 1);

        assert!(smiles("C[C@](C)").is_err());
        let lenient = LoaderOptions::default().with_ignore_stereochemistry_errors(true);
        let mol: Molecule = load("C[C@](C)", false, &lenient, 0).unwrap();
        assert!(mol.stereocenters.is_empty());
    }

    #[test]
    fn test_cis_trans() {
        let mol = smiles("F/C=C/F").unwrap();
        assert_eq!(mol.cis_trans[&EdgeIndex::new(1)].parity, CisTransParity::Trans);
        let mol = smiles("F/C=C\\F").unwrap();
        assert_eq!(mol.cis_trans[&EdgeIndex::new(1)].parity, CisTransParity::Cis);
        assert_eq!(mol[NodeIndex::new(0)].number(), Some(F));
    }

    #[test]
    fn test_ring_closure_direction() {
        // the mark written at the closing side is flipped onto the ring bond
        let mol = smiles("F/C=C/1.C\\1").unwrap();
        let ring = mol.find_bond(NodeIndex::new(2), NodeIndex::new(3)).unwrap();
        assert_eq!(mol[ring].mark, DirectionalMark::Slash);
        assert_eq!(mol.cis_trans[&EdgeIndex::new(1)].parity, CisTransParity::Trans);

        // written at the closing atom, the mark reads from that atom
        let mol = smiles("F/C=C1.C/1").unwrap();
        assert_eq!(mol.cis_trans[&EdgeIndex::new(1)].parity, CisTransParity::Cis);

        assert!(matches!(smiles("C/1CC/1"), Err(SmilesError::RingDirectionMismatch(1))));
        let lenient = LoaderOptions::default().with_ignore_cis_trans_errors(true);
        let mol: Molecule = load("C/1CC/1", false, &lenient, 0).unwrap();
        assert!(mol.bonds().all(|(_, _, _, bond)| bond.mark == DirectionalMark::None));
    }

    #[test]
    fn test_extended_block() {
        let mol = smiles("CC* |$;;_R1$,^1:0|").unwrap();
        assert!(mol[NodeIndex::new(2)].is_rsite());
        assert_eq!(mol[NodeIndex::new(2)].allowed_rgroups(), vec![1]);
        assert_eq!(mol[NodeIndex::new(0)].radical, Radical::Doublet);
        assert_eq!(mol[NodeIndex::new(2)].attachment_order, vec![NodeIndex::new(1)]);

        let mol = smiles("CC* |$;;Pol$|").unwrap();
        assert_eq!(mol[NodeIndex::new(2)].kind, AtomKind::Pseudo("Pol".to_owned()));
        assert!(smiles("CC |$A$|").is_err());
    }

    #[test]
    fn test_polymer() {
        let mol = smiles("C{-}CC{+n}").unwrap();
        assert_eq!(mol.sgroups.len(), 1);
        let sru = &mol.sgroups[0];
        assert_eq!(sru.kind, SGroupKind::RepeatUnit);
        assert_eq!(sru.atoms, vec![NodeIndex::new(0), NodeIndex::new(1), NodeIndex::new(2)]);
        assert_eq!(sru.bonds.len(), 2);
        // both open ends got a star
        assert_eq!(mol.atom_count(), 5);
        assert_eq!(mol[NodeIndex::new(3)].kind, AtomKind::Pseudo("*".to_owned()));
        assert_eq!(mol.find_bond(NodeIndex::new(2), NodeIndex::new(4)).map(|e| e.index()), Some(3));

        let mol = smiles("C{-}CO{+n3}C").unwrap();
        assert_eq!(mol.sgroups[0].kind, SGroupKind::Multiple);
        assert_eq!(mol.sgroups[0].multiplier, 3);
        assert!(matches!(smiles("C{-}CC"), Err(SmilesError::Polymer(_))));
    }

    #[test]
    fn test_fused_saturated_rings() {
        for (text, single) in [
            ("C1CCc2ccccc2C1", 5),
            ("c1ccc2c(c1)CCCC2", 5),
            ("C1Cc2ccccc2C1", 4),
            ("c1ccc2c(c1)CCC2", 4),
        ] {
            let orders = orders(&smiles(text).unwrap());
            assert_eq!(orders.iter().filter(|o| **o == BondOrder::Aromatic).count(), 6, "{text}");
            assert_eq!(orders.iter().filter(|o| **o == BondOrder::Single).count(), single, "{text}");
            assert_eq!(orders.len(), 6 + single, "{text}");
        }
    }

    #[test]
    fn test_round_trip_orders() {
        use petgraph::algo::is_isomorphic_matching;

        let same = |a: &str, b: &str| {
            let (a, b) = (smiles(a).unwrap(), smiles(b).unwrap());
            is_isomorphic_matching(
                &*a,
                &*b,
                |x, y| (x.number(), x.charge, x.isotope) == (y.number(), y.charge, y.isotope),
                |x, y| x.order == y.order,
            )
        };
        assert!(same("CC(=O)O", "OC(C)=O"));
        assert!(same("[13CH3][O-]", "[O-][13CH3]"));
        assert!(same("CCN(C)C=O", "O=CN(C)CC"));
        assert!(!same("CC(=O)O", "OCC=O"));
        assert!(!same("[13CH3][O-]", "[CH3][O-]"));
        assert!(!same("[13CH3][O-]", "[13CH3]O"));
    }

    #[test]
    fn test_smarts_atomic_number() {
        let query = smarts("[#6]").unwrap();
        assert_eq!(query[NodeIndex::new(0)].constraint().unwrap().pinned_number(), Some(C));
        for text in ["[#300]", "[#256]", "[#119]", "[#0]"] {
            assert!(matches!(smarts(text), Err(SmilesError::UnknownElement(_))), "{text}");
        }
    }

    #[test]
    fn test_smarts_primitives() {
        let query = smarts("[#6;R2,$(C=O)]-,:[!C;H1]~*").unwrap();
        assert_eq!(query.atom_count(), 3);
        let first = query[NodeIndex::new(0)].constraint().unwrap();
        assert_eq!(first.pinned_number(), Some(C));
        assert!(first.mentions(&AtomLeaf::SssrRings(2)));
        assert!(first.mentions(&AtomLeaf::Fragment("C=O".to_owned())));

        let second = query[NodeIndex::new(1)].constraint().unwrap();
        assert!(second.mentions(&AtomLeaf::total_h(1)));
        assert!(second.mentions(&AtomLeaf::Aromatic(false)));
        // SMARTS atoms are kept off hydrogen
        assert!(!query[NodeIndex::new(1)].possible_number(H));
        assert!(!query[NodeIndex::new(2)].possible_number(H));

        assert!(query.possible_bond_order(EdgeIndex::new(0), BondOrder::Aromatic));
        assert!(!query.possible_bond_order(EdgeIndex::new(0), BondOrder::Double));
        assert!(query.possible_bond_order(EdgeIndex::new(1), BondOrder::Triple));
    }

    #[test]
    fn test_smarts_default_bond() {
        let query = smarts("cC").unwrap();
        // an aliphatic end rules out the aromatic choice
        assert!(query.possible_bond_order(EdgeIndex::new(0), BondOrder::Single));
        assert!(!query.possible_bond_order(EdgeIndex::new(0), BondOrder::Aromatic));

        let query = smarts("cc").unwrap();
        assert!(query.possible_bond_order(EdgeIndex::new(0), BondOrder::Aromatic));
    }

    #[test]
    fn test_smarts_components() {
        let query = smarts("(C.C).C").unwrap();
        assert_eq!(query[NodeIndex::new(0)].component, 1);
        assert_eq!(query[NodeIndex::new(1)].component, 1);
        assert_eq!(query[NodeIndex::new(2)].component, 0);
        assert!(matches!(smarts("((C))"), Err(SmilesError::NestedComponent(1))));
    }

    #[test]
    fn test_recursion_depth() {
        let options = LoaderOptions::default().with_max_nesting_depth(1);
        assert!(load::<Query>("[$(C[$(N)])]", true, &options, 0).is_err());
        assert!(load::<Query>("[$(CN)]", true, &options, 0).is_ok());
    }

    #[test]
    fn test_charged_atoms() {
        let mol = smiles("OC(=O)[C-](N)[15NH3+]").unwrap();
        let mut atoms: Vec<(Option<u8>, i32, u16)> =
            mol.atoms().map(|(_, atom)| (atom.number(), atom.charge, atom.isotope)).collect();
        atoms.sort();
        assert_eq!(
            atoms,
            vec![(Some(C), -1, 0), (Some(C), 0, 0), (Some(N), 0, 0), (Some(N), 1, 15), (Some(O), 0, 0), (Some(O), 0, 0)]
        );
        assert_eq!(mol.bond_count(), 5);
    }
}

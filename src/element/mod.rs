//! The periodic table shared by every loader.
//!
//! The table is built once, lazily, from CSV constants embedded in the
//! binary and is never mutated afterwards, so it can be read from any
//! number of threads without locking.

use std::collections::{BTreeMap, HashMap};

use csv::{ReaderBuilder, StringRecord};
use lazy_static::lazy_static;
use tracing::*;

mod valence;
pub use valence::*;

pub const H: u8 = 1;
pub const HE: u8 = 2;
pub const B: u8 = 5;
pub const C: u8 = 6;
pub const N: u8 = 7;
pub const O: u8 = 8;
pub const F: u8 = 9;
pub const NE: u8 = 10;
pub const AL: u8 = 13;
pub const SI: u8 = 14;
pub const P: u8 = 15;
pub const S: u8 = 16;
pub const CL: u8 = 17;
pub const AR: u8 = 18;
pub const GA: u8 = 31;
pub const GE: u8 = 32;
pub const AS: u8 = 33;
pub const SE: u8 = 34;
pub const BR: u8 = 35;
pub const KR: u8 = 36;
pub const IN: u8 = 49;
pub const SN: u8 = 50;
pub const SB: u8 = 51;
pub const TE: u8 = 52;
pub const I: u8 = 53;
pub const XE: u8 = 54;
pub const TL: u8 = 81;
pub const PB: u8 = 82;
pub const BI: u8 = 83;
pub const PO: u8 = 84;
pub const AT: u8 = 85;
pub const RN: u8 = 86;
pub const OG: u8 = 118;

/// Number of real chemical elements in the table.
pub const ELEMENT_COUNT: u8 = 118;
/// Pseudo-kinds stored after the real elements.
pub const PSEUDO: u8 = 119;
pub const RSITE: u8 = 120;
pub const TEMPLATE: u8 = 121;
pub const ATTACHMENT_POINT: u8 = 122;

/// Radical state of an atom, numbered the way Molfiles number it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Radical {
    #[default]
    None,
    Singlet,
    Doublet,
    Triplet,
}

impl Radical {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Radical::None),
            1 => Some(Radical::Singlet),
            2 => Some(Radical::Doublet),
            3 => Some(Radical::Triplet),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Unpaired electrons taken away from bonding.
    pub fn electrons(self) -> i32 {
        match self {
            Radical::None => 0,
            Radical::Doublet => 1,
            Radical::Singlet | Radical::Triplet => 2,
        }
    }

    pub fn orbitals(self) -> i32 {
        if self == Radical::None {
            0
        } else {
            1
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementInfo {
    pub number: u8,
    pub symbol: String,
    pub period: u8,
    pub group: u8,
    /// Standard atomic weight.
    pub weight: f64,
    pub default_isotope: u16,
    pub most_abundant_isotope: u16,
    pub aromatic_capable: bool,
}

impl ElementInfo {
    fn placeholder(number: u8, symbol: &str) -> Self {
        Self {
            number,
            symbol: symbol.to_owned(),
            period: 0,
            group: 0,
            weight: 0.0,
            default_isotope: 0,
            most_abundant_isotope: 0,
            aromatic_capable: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Isotope {
    pub mass: f64,
    /// Natural abundance as a fraction of one.
    pub composition: f64,
}

#[derive(Debug)]
pub struct ElementTable {
    elements: Vec<ElementInfo>,
    symbols: HashMap<String, u8>,
    isotopes: BTreeMap<(u8, u16), Isotope>,
}

lazy_static! {
    /// The process-wide periodic table.
    pub static ref ELEMENTS: ElementTable = ElementTable::from_csv(
        include_str!("elements.csv"),
        include_str!("isotopes.csv"),
    );
}

fn field<T: std::str::FromStr>(record: &StringRecord, index: usize) -> Option<T> {
    record.get(index).and_then(|s| s.trim().parse().ok())
}

impl ElementTable {
    /// Builds a table from the two embedded CSV documents.
    ///
    /// Rows that fail to parse are skipped with a warning; the pseudo-kinds
    /// are always present.
    pub fn from_csv(elements_csv: &str, isotopes_csv: &str) -> Self {
        let mut elements: Vec<ElementInfo> = (0..=ATTACHMENT_POINT)
            .map(|number| ElementInfo::placeholder(number, ""))
            .collect();
        elements[PSEUDO as usize].symbol = "Pseudo".to_owned();
        elements[RSITE as usize].symbol = "R#".to_owned();
        elements[TEMPLATE as usize].symbol = "Template".to_owned();
        elements[ATTACHMENT_POINT as usize].symbol = "AP".to_owned();

        let mut symbols = HashMap::new();
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .from_reader(elements_csv.as_bytes());
        for record in rdr.records() {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping unreadable element row: {e}");
                    continue;
                }
            };
            let (Some(number), Some(symbol), Some(period), Some(group), Some(weight)) = (
                field::<u8>(&record, 0),
                record.get(1).map(|s| s.trim().to_owned()),
                field::<u8>(&record, 2),
                field::<u8>(&record, 3),
                field::<f64>(&record, 4),
            ) else {
                warn!("Skipping malformed element row: {:?}", record);
                continue;
            };
            if number == 0 || number > ELEMENT_COUNT {
                warn!("Skipping element row with number {number}");
                continue;
            }
            let info = &mut elements[number as usize];
            info.symbol = symbol.clone();
            info.period = period;
            info.group = group;
            info.weight = weight;
            symbols.insert(symbol, number);
        }

        let mut isotopes = BTreeMap::new();
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .from_reader(isotopes_csv.as_bytes());
        for record in rdr.records().flatten() {
            let (Some(number), Some(mass_number), Some(mass), Some(composition)) = (
                field::<u8>(&record, 0),
                field::<u16>(&record, 1),
                field::<f64>(&record, 2),
                field::<f64>(&record, 3),
            ) else {
                warn!("Skipping malformed isotope row: {:?}", record);
                continue;
            };
            isotopes.insert((number, mass_number), Isotope { mass, composition });
        }

        let mut table = Self {
            elements,
            symbols,
            isotopes,
        };
        table.init_isotopes();
        table.init_aromatic();
        debug!(
            "Element table ready: {} symbols, {} isotopes",
            table.symbols.len(),
            table.isotopes.len()
        );
        table
    }

    /// Default isotope is the known isotope closest to the standard weight;
    /// the most abundant one is the one with the largest natural share.
    fn init_isotopes(&mut self) {
        for number in 1..=ELEMENT_COUNT {
            let weight = self.elements[number as usize].weight;
            let mut best: Option<(u16, f64)> = None;
            let mut abundant: Option<(u16, f64)> = None;
            for (&(_, mass_number), isotope) in self.isotopes.range((number, 0)..=(number, u16::MAX)) {
                let diff = (isotope.mass - weight).abs();
                if best.map_or(true, |(_, d)| diff < d) {
                    best = Some((mass_number, diff));
                }
                if isotope.composition > 0.0 && abundant.map_or(true, |(_, c)| isotope.composition > c) {
                    abundant = Some((mass_number, isotope.composition));
                }
            }
            let default = best
                .map(|(m, _)| m)
                .unwrap_or_else(|| weight.round().max(1.0) as u16);
            let info = &mut self.elements[number as usize];
            info.default_isotope = default;
            info.most_abundant_isotope = abundant.map(|(m, _)| m).unwrap_or(default);
        }
    }

    fn init_aromatic(&mut self) {
        let ranges = [(B, F), (AL, CL), (GA, BR), (IN, I), (TL, BI)];
        for (from, to) in ranges {
            for number in from..=to {
                self.elements[number as usize].aromatic_capable = true;
            }
        }
    }

    /// Looks up a case-sensitive element symbol such as `"Cl"`.
    pub fn symbol_to_number(&self, symbol: &str) -> Option<u8> {
        self.symbols.get(symbol).copied()
    }

    pub fn number_to_symbol(&self, number: u8) -> Option<&str> {
        self.info(number).map(|info| info.symbol.as_str())
    }

    pub fn info(&self, number: u8) -> Option<&ElementInfo> {
        if number == 0 {
            return None;
        }
        self.elements.get(number as usize)
    }

    pub fn is_element(&self, number: u8) -> bool {
        (1..=ELEMENT_COUNT).contains(&number)
    }

    pub fn period(&self, number: u8) -> u8 {
        self.info(number).map_or(0, |info| info.period)
    }

    pub fn group(&self, number: u8) -> u8 {
        self.info(number).map_or(0, |info| info.group)
    }

    pub fn standard_weight(&self, number: u8) -> f64 {
        self.info(number).map_or(0.0, |info| info.weight)
    }

    pub fn default_isotope(&self, number: u8) -> u16 {
        self.info(number).map_or(0, |info| info.default_isotope)
    }

    pub fn most_abundant_isotope(&self, number: u8) -> u16 {
        self.info(number).map_or(0, |info| info.most_abundant_isotope)
    }

    /// Relative mass of one isotope. Isotope `0` means natural abundance
    /// and yields the standard atomic weight.
    pub fn isotopic_mass(&self, number: u8, isotope: u16) -> Option<f64> {
        if isotope == 0 {
            return self.info(number).filter(|_| self.is_element(number)).map(|info| info.weight);
        }
        self.isotopes.get(&(number, isotope)).map(|iso| iso.mass)
    }

    pub fn isotopic_composition(&self, number: u8, isotope: u16) -> Option<f64> {
        self.isotopes.get(&(number, isotope)).map(|iso| iso.composition)
    }

    pub fn can_be_aromatic(&self, number: u8) -> bool {
        self.info(number).is_some_and(|info| info.aromatic_capable)
    }

    fn orbitals(&self, number: u8, use_d_orbitals: bool) -> i32 {
        match self.group(number) {
            1 => 1,
            2 => 2,
            group => {
                if use_d_orbitals && self.period(number) > 2 && group >= 4 {
                    9
                } else {
                    4
                }
            }
        }
    }

    /// Largest number of bonds the atom can form.
    ///
    /// # Arguments
    ///
    /// * `allow_hypervalent` - let period 3+ elements use their d orbitals.
    pub fn max_connectivity(&self, number: u8, charge: i32, radical: Radical, allow_hypervalent: bool) -> i32 {
        let electrons = self.group(number) as i32 - charge - radical.electrons();
        let vacant = self.orbitals(number, allow_hypervalent) - radical.orbitals();
        if electrons <= vacant {
            electrons
        } else {
            2 * vacant - electrons
        }
    }
}

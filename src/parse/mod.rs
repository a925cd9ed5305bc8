//! Text formats in, molecule graphs out.

use std::io::{BufRead, Read};

use anyhow::{Context, Result};
use tracing::*;

use crate::graph::{Flavor, Molecule, MoleculeGraph, Query, QueryMolecule};
use crate::options::{Aromaticity, LoaderOptions};

mod properties;

pub mod molfile;
pub mod smiles;

pub use molfile::MolfileError;
pub use smiles::SmilesError;

/// Runs the dearomatization hook when the options ask for it.
fn dearomatize<F: Flavor>(
    mol: &mut MoleculeGraph<F>,
    hook: Option<&dyn Aromaticity<F>>,
    options: &LoaderOptions,
) -> Result<()> {
    if !options.dearomatize_on_load {
        return Ok(());
    }
    match hook {
        Some(hook) => hook.dearomatize(mol, options).context("Failed to dearomatize"),
        None => {
            warn!("dearomatize on load requested but no aromaticity model is set");
            Ok(())
        }
    }
}

/// Reads SMILES, or SMARTS into a query.
pub struct SmilesLoader<'a, F: Flavor> {
    pub options: LoaderOptions,
    aromaticity: Option<&'a dyn Aromaticity<F>>,
}

impl<'a, F: Flavor> SmilesLoader<'a, F> {
    pub fn new(options: LoaderOptions) -> Self {
        Self { options, aromaticity: None }
    }

    pub fn with_aromaticity(mut self, hook: &'a dyn Aromaticity<F>) -> Self {
        self.aromaticity = Some(hook);
        self
    }

    pub fn load(&self, text: &str) -> Result<MoleculeGraph<F>> {
        let mut mol = smiles::load::<F>(text, false, &self.options, 0)
            .with_context(|| format!("Failed to parse SMILES string {text}"))?;
        dearomatize(&mut mol, self.aromaticity, &self.options)?;
        Ok(mol)
    }

    /// Loads the first line of `reader`.
    pub fn load_reader(&self, mut reader: impl BufRead) -> Result<MoleculeGraph<F>> {
        let mut line = String::new();
        reader.read_line(&mut line).context("Failed to read SMILES input")?;
        self.load(line.trim_end_matches(['\r', '\n']))
    }
}

impl<'a> SmilesLoader<'a, Query> {
    pub fn load_smarts(&self, text: &str) -> Result<QueryMolecule> {
        let mut mol = smiles::load::<Query>(text, true, &self.options, 0)
            .with_context(|| format!("Failed to parse SMARTS string {text}"))?;
        dearomatize(&mut mol, self.aromaticity, &self.options)?;
        Ok(mol)
    }
}

/// Reads Molfiles and RGfiles.
pub struct MolfileLoader<'a, F: Flavor> {
    pub options: LoaderOptions,
    aromaticity: Option<&'a dyn Aromaticity<F>>,
}

impl<'a, F: Flavor> MolfileLoader<'a, F> {
    pub fn new(options: LoaderOptions) -> Self {
        Self { options, aromaticity: None }
    }

    pub fn with_aromaticity(mut self, hook: &'a dyn Aromaticity<F>) -> Self {
        self.aromaticity = Some(hook);
        self
    }

    pub fn load(&self, text: &str) -> Result<MoleculeGraph<F>> {
        let mut mol = molfile::load::<F>(text, &self.options, 0).context("Failed to parse Molfile")?;
        dearomatize(&mut mol, self.aromaticity, &self.options)?;
        Ok(mol)
    }

    /// Loads one Molfile from `reader`, up to the end of input.
    pub fn load_reader(&self, mut reader: impl BufRead) -> Result<MoleculeGraph<F>> {
        let mut text = String::new();
        reader.read_to_string(&mut text).context("Failed to read Molfile input")?;
        self.load(&text)
    }
}

pub fn parse_smiles(text: &str) -> Result<Molecule> {
    SmilesLoader::new(LoaderOptions::default()).load(text)
}

pub fn parse_smarts(text: &str) -> Result<QueryMolecule> {
    SmilesLoader::<Query>::new(LoaderOptions::default()).load_smarts(text)
}

pub fn parse_molfile(text: &str) -> Result<Molecule> {
    MolfileLoader::new(LoaderOptions::default()).load(text)
}

pub fn parse_query_molfile(text: &str) -> Result<QueryMolecule> {
    MolfileLoader::new(LoaderOptions::default()).load(text)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::graph::{BondOrder, Concrete};

    /// Turns every aromatic bond single and counts its calls.
    struct Flatten {
        calls: Cell<usize>,
    }

    impl Aromaticity<Concrete> for Flatten {
        fn dearomatize(&self, graph: &mut Molecule, _: &LoaderOptions) -> Result<()> {
            self.calls.set(self.calls.get() + 1);
            for index in 0..graph.bond_count() {
                let bond = graph.bond_mut(index)?;
                if bond.order == BondOrder::Aromatic {
                    bond.order = BondOrder::Single;
                }
            }
            Ok(())
        }
    }

    #[test]
    fn test_entry_points() {
        assert_eq!(parse_smiles("CCO").unwrap().atom_count(), 3);
        assert!(parse_smarts("[#6;R]").unwrap().is_query());

        let err = parse_smiles("C(C").unwrap_err();
        assert!(err.to_string().contains("C(C"));
        assert!(err.downcast_ref::<SmilesError>().is_some());
    }

    #[test]
    fn test_readers() {
        let mol: Molecule = SmilesLoader::new(LoaderOptions::default()).load_reader(&b"CCN\nCCCC\n"[..]).unwrap();
        assert_eq!(mol.atom_count(), 3);

        let text = "\n\n\n  1  0  0  0  0  0  0  0  0  0999 V2000
    0.0000    0.0000    0.0000 O   0  0  0  0  0  0  0  0  0  0  0  0
M  END
";
        let mol: Molecule = MolfileLoader::new(LoaderOptions::default()).load_reader(text.as_bytes()).unwrap();
        assert_eq!(mol.implicit_hydrogens(petgraph::graph::NodeIndex::new(0)), 2);
    }

    #[test]
    fn test_molfile_entry_points() {
        let text = "\n\n\n  1  0  0  0  0  0  0  0  0  0999 V2000
    0.0000    0.0000    0.0000 A   0  0  0  0  0  0  0  0  0  0  0  0
M  END
";
        assert!(parse_molfile(text).is_err());
        assert_eq!(parse_query_molfile(text).unwrap().atom_count(), 1);
    }

    #[test]
    fn test_dearomatize_hook() {
        let hook = Flatten { calls: Cell::new(0) };
        let options = LoaderOptions::default().with_dearomatize_on_load(true);
        let mol = SmilesLoader::new(options.clone()).with_aromaticity(&hook).load("c1ccccc1").unwrap();
        assert_eq!(hook.calls.get(), 1);
        assert!(mol.bonds().all(|(_, _, _, bond)| bond.order == BondOrder::Single));

        // without a hook the flag only warns
        let mol: Molecule = SmilesLoader::new(options).load("c1ccccc1").unwrap();
        assert!(mol.bonds().all(|(_, _, _, bond)| bond.order == BondOrder::Aromatic));

        let plain = SmilesLoader::new(LoaderOptions::default()).with_aromaticity(&hook).load("c1ccccc1").unwrap();
        assert_eq!(hook.calls.get(), 1);
        assert_eq!(plain.bond_count(), 6);
    }
}

//! Chemical structure loading: SMILES, SMARTS and MDL Molfiles read into
//! one molecule graph with query constraints and stereochemistry.

use tracing::level_filters::LevelFilter;
use tracing::*;

pub mod element;
pub mod error;
pub mod geometry;
pub mod graph;
pub mod options;
pub mod parse;
pub mod query;
pub mod stereo;

pub use element::{ElementTable, Radical, ValenceError, ELEMENTS};
pub use error::ErrorCategory;
pub use graph::{
    Atom, AtomKind, Bond, BondDirection, BondOrder, CisTransBond, CisTransParity, Concrete, Flavor, GraphError,
    Molecule, MoleculeGraph, Query, QueryMolecule, RGroup, SGroup, SGroupKind, Stereocenter, StereoKind, Template,
    Topology,
};
pub use options::{Aromaticity, LoaderOptions, TreatStereoAs};
pub use parse::{
    parse_molfile, parse_query_molfile, parse_smarts, parse_smiles, MolfileError, MolfileLoader, SmilesError,
    SmilesLoader,
};
pub use query::{AtomConstraint, AtomLeaf, BondConstraint, BondLeaf, Constraint};
pub use stereo::{perceive, StereoError};

/// Installs a global `tracing` subscriber printing to stderr. `level` is
/// one of `off`, `error`, `warn`, `info`, `debug` or `trace`; anything else
/// falls back to `info`. Calling it again is harmless.
pub fn init_logging(level: &str) {
    let filter = level.parse::<LevelFilter>().unwrap_or(LevelFilter::INFO);
    let installed = tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_writer(std::io::stderr)
        .try_init();
    if installed.is_ok() {
        debug!("logging at {filter}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_twice() {
        init_logging("trace");
        init_logging("not a level");
        let mol = parse_smiles("C[C@H](N)O").unwrap();
        assert_eq!(mol.stereocenters.len(), 1);
    }
}

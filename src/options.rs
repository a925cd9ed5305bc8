//! Loader switches.

use crate::graph::{Flavor, MoleculeGraph};

/// How absolute stereocenters read from a Molfile are labelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreatStereoAs {
    /// Absolute when the chiral flag is set, otherwise one AND group.
    #[default]
    UseChiralFlag,
    Absolute,
    OrGroup,
    AndGroup,
    Any,
}

/// Hook that rewrites aromatic bonds into a Kekulé structure after load.
pub trait Aromaticity<F: Flavor> {
    fn dearomatize(&self, graph: &mut MoleculeGraph<F>, options: &LoaderOptions) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderOptions {
    /// Read Molfile `X` atoms as a pseudoatom labelled `X` instead of a
    /// halogen list.
    pub treat_x_as_pseudoatom: bool,
    pub ignore_cis_trans_errors: bool,
    pub ignore_bad_valence: bool,
    pub ignore_no_chiral_flag: bool,
    /// Drop query-only Molfile fields on a concrete molecule instead of
    /// failing.
    pub ignore_non_critical_query_features: bool,
    pub skip_3d_chirality: bool,
    pub ignore_stereochemistry_errors: bool,
    pub treat_stereo_as: TreatStereoAs,
    pub dearomatize_on_load: bool,
    /// How deeply R-group and template CTABs may nest.
    pub max_nesting_depth: usize,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            treat_x_as_pseudoatom: false,
            ignore_cis_trans_errors: false,
            ignore_bad_valence: false,
            ignore_no_chiral_flag: false,
            ignore_non_critical_query_features: false,
            skip_3d_chirality: false,
            ignore_stereochemistry_errors: false,
            treat_stereo_as: TreatStereoAs::UseChiralFlag,
            dearomatize_on_load: false,
            max_nesting_depth: 8,
        }
    }
}

impl LoaderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_treat_x_as_pseudoatom(mut self, on: bool) -> Self {
        self.treat_x_as_pseudoatom = on;
        self
    }

    pub fn with_ignore_cis_trans_errors(mut self, on: bool) -> Self {
        self.ignore_cis_trans_errors = on;
        self
    }

    pub fn with_ignore_bad_valence(mut self, on: bool) -> Self {
        self.ignore_bad_valence = on;
        self
    }

    pub fn with_ignore_no_chiral_flag(mut self, on: bool) -> Self {
        self.ignore_no_chiral_flag = on;
        self
    }

    pub fn with_ignore_non_critical_query_features(mut self, on: bool) -> Self {
        self.ignore_non_critical_query_features = on;
        self
    }

    pub fn with_skip_3d_chirality(mut self, on: bool) -> Self {
        self.skip_3d_chirality = on;
        self
    }

    pub fn with_ignore_stereochemistry_errors(mut self, on: bool) -> Self {
        self.ignore_stereochemistry_errors = on;
        self
    }

    pub fn with_treat_stereo_as(mut self, treat: TreatStereoAs) -> Self {
        self.treat_stereo_as = treat;
        self
    }

    pub fn with_dearomatize_on_load(mut self, on: bool) -> Self {
        self.dearomatize_on_load = on;
        self
    }

    pub fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }
}

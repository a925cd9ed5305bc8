//! Sorting load failures into the two kinds callers act on differently.

use crate::element::ValenceError;
use crate::graph::GraphError;
use crate::parse::{MolfileError, SmilesError};
use crate::stereo::StereoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The text does not follow the format.
    MalformedInput,
    /// The text parses but describes something that can not be, or that
    /// this molecule kind can not hold.
    SemanticViolation,
}

impl ErrorCategory {
    fn of_smiles(e: &SmilesError) -> Self {
        match e {
            SmilesError::QueryOnly(_)
            | SmilesError::SmartsOnly(_)
            | SmilesError::Valence { .. }
            | SmilesError::TooDeep(_)
            | SmilesError::Stereo(_)
            | SmilesError::Graph(_) => ErrorCategory::SemanticViolation,
            _ => ErrorCategory::MalformedInput,
        }
    }

    fn of_molfile(e: &MolfileError) -> Self {
        match e {
            MolfileError::QueryOnly { .. }
            | MolfileError::PseudoIsotope { .. }
            | MolfileError::NotAStereocenter(_)
            | MolfileError::TooDeep(_)
            | MolfileError::Graph { .. }
            | MolfileError::Stereo(_) => ErrorCategory::SemanticViolation,
            _ => ErrorCategory::MalformedInput,
        }
    }

    /// Classifies `error` by the first error in its chain this crate knows.
    pub fn of(error: &anyhow::Error) -> Self {
        for cause in error.chain() {
            if let Some(e) = cause.downcast_ref::<SmilesError>() {
                return Self::of_smiles(e);
            }
            if let Some(e) = cause.downcast_ref::<MolfileError>() {
                return Self::of_molfile(e);
            }
            if cause.is::<StereoError>() || cause.is::<ValenceError>() || cause.is::<GraphError>() {
                return ErrorCategory::SemanticViolation;
            }
        }
        ErrorCategory::MalformedInput
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{parse_molfile, parse_smiles};

    #[test]
    fn test_categories() {
        let malformed = parse_smiles("C1CC").unwrap_err();
        assert_eq!(ErrorCategory::of(&malformed), ErrorCategory::MalformedInput);

        let query_only = parse_smiles("[C;H4]").unwrap_err();
        assert_eq!(ErrorCategory::of(&query_only), ErrorCategory::SemanticViolation);

        let truncated = parse_molfile("\n\n").unwrap_err();
        assert_eq!(ErrorCategory::of(&truncated), ErrorCategory::MalformedInput);

        let plain = anyhow::anyhow!("something else");
        assert_eq!(ErrorCategory::of(&plain), ErrorCategory::MalformedInput);
    }
}

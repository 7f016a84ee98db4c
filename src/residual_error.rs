//! Error handling for residual and contact models

use std::fmt;

/// Unified error to report contract violations and configuration problems of residual
/// and contact models. Numerical edge cases (zero distance and the like) are never
/// reported through this type, they produce well-defined degenerate values instead.
#[derive(Debug, Clone, PartialEq)]
pub enum ResidualError {
    /// The shared data collector passed to `create_data` or `calc` is not of the kind
    /// this model needs.
    InvalidSharedData { expected: &'static str, found: &'static str },
    /// Data instance was created by a model of a different kind.
    InvalidDataKind { expected: &'static str, found: &'static str },
    /// `calc_diff` was invoked before `calc` populated the forward quantities.
    CalcDiffBeforeCalc,
    /// `calc_diff` was invoked for a state different from the one `calc` evaluated.
    StaleState,
    /// A world-aligned contact force was stored before `calc` placed the contact frame.
    ForceBeforeCalc,
    DimensionMismatch {
        what: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },
    IndexOutOfRange { what: &'static str, index: usize, len: usize },
    InvalidMask(String),
    UnsupportedPair { first: &'static str, second: &'static str },
    InvalidModel(String),
}

impl fmt::Display for ResidualError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ResidualError::InvalidSharedData { expected, found } =>
                write!(f, "Invalid argument: the shared data should be {}, found {}", expected, found),
            ResidualError::InvalidDataKind { expected, found } =>
                write!(f, "Invalid argument: expected {} data, found {} data", expected, found),
            ResidualError::CalcDiffBeforeCalc =>
                write!(f, "calc_diff called before calc"),
            ResidualError::StaleState =>
                write!(f, "calc_diff called for a state that calc has not evaluated"),
            ResidualError::ForceBeforeCalc =>
                write!(f, "update_force in world-aligned coordinates called before calc"),
            ResidualError::DimensionMismatch { what, expected, found } =>
                write!(f, "Invalid dimension of {}: expected {}x{}, found {}x{}",
                       what, expected.0, expected.1, found.0, found.1),
            ResidualError::IndexOutOfRange { what, index, len } =>
                write!(f, "{} index {} is out of range (size {})", what, index, len),
            ResidualError::InvalidMask(ref value) =>
                write!(f, "Invalid contact mask: {}", value),
            ResidualError::UnsupportedPair { first, second } =>
                write!(f, "Witness derivatives are not available for {} against {}", first, second),
            ResidualError::InvalidModel(ref msg) =>
                write!(f, "Invalid model: {}", msg),
        }
    }
}

impl std::error::Error for ResidualError {}

/// Fails with `DimensionMismatch` unless the vector has the expected length.
pub(crate) fn check_vector_len(what: &'static str, found: usize, expected: usize) -> Result<(), ResidualError> {
    if found != expected {
        tracing::warn!("{} has length {}, expected {}", what, found, expected);
        return Err(ResidualError::DimensionMismatch {
            what,
            expected: (expected, 1),
            found: (found, 1),
        });
    }
    Ok(())
}

/// Fails with `DimensionMismatch` unless the matrix has the expected shape.
pub(crate) fn check_matrix_shape(what: &'static str, found: (usize, usize), expected: (usize, usize))
                                 -> Result<(), ResidualError> {
    if found != expected {
        tracing::warn!("{} has shape {:?}, expected {:?}", what, found, expected);
        return Err(ResidualError::DimensionMismatch { what, expected, found });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_dimension_mismatch() {
        let err = ResidualError::DimensionMismatch { what: "force", expected: (1, 1), found: (3, 1) };
        assert_eq!(err.to_string(), "Invalid dimension of force: expected 1x1, found 3x1");
    }

    #[test]
    fn test_shape_checks() {
        assert!(check_vector_len("x", 4, 4).is_ok());
        assert!(matches!(check_vector_len("x", 3, 4),
            Err(ResidualError::DimensionMismatch { what: "x", .. })));
        assert!(check_matrix_shape("df_dx", (1, 8), (1, 8)).is_ok());
        assert!(check_matrix_shape("df_dx", (3, 8), (1, 8)).is_err());
    }
}

//! # Grading Primitives
//!
//! Hardcoded scales and limits for the gradebook CORE.
//!
//! Every grade the CORE stores or computes is an integer on one of these
//! scales. Conversion to and from `f64` only happens at the API boundary.

/// Grades are stored as hundredths of a point.
///
/// `8.75` is stored as `875`.
pub const GRADE_SCALE: u32 = 100;

/// Highest grade on the 0-10 scale, in hundredths.
pub const MAX_GRADE_HUNDREDTHS: u16 = 1000;

/// Adjusted grades are stored as half points.
///
/// `7.5` is stored as `15`.
pub const HALF_POINT_SCALE: u32 = 2;

/// Highest adjusted grade on the 0-10 scale, in half points.
pub const MAX_HALF_POINTS: u8 = 20;

/// Weights are stored as parts per million.
///
/// `0.35` is stored as `350_000`.
pub const WEIGHT_SCALE: u32 = 1_000_000;

/// Accepted distance between a weight sum and `1.0`, in parts per million.
///
/// The bound is inclusive: a sum of `0.99` or `1.01` is accepted.
pub const WEIGHT_SUM_TOLERANCE: u32 = 10_000;

/// Tag of the encoded simple-average formula.
pub const SIMPLE_TAG: &str = "SIMPLE";

/// Prefix of the encoded weighted-average formula; the JSON weight map follows it.
pub const WEIGHTED_PREFIX: &str = "WEIGHTED:";

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum number of items accepted by a single bulk upsert.
///
/// Larger batches are rejected before any item is applied.
pub const MAX_BULK_ITEMS: usize = 5000;

/// Maximum length of a component short code.
pub const MAX_SHORT_CODE_LENGTH: usize = 20;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_are_consistent() {
        assert_eq!(u32::from(MAX_GRADE_HUNDREDTHS), 10 * GRADE_SCALE);
        assert_eq!(u32::from(MAX_HALF_POINTS), 10 * HALF_POINT_SCALE);
    }

    #[test]
    fn tolerance_is_one_hundredth() {
        assert_eq!(WEIGHT_SUM_TOLERANCE * 100, WEIGHT_SCALE);
    }
}

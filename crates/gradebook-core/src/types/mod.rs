//! # Core Type Definitions
//!
//! This module contains all core types for the gradebook CORE:
//! - Record identifiers (`EnrollmentId`, `ComponentId`, ...)
//! - Fixed-point grade values (`Grade`, `HalfGrade`)
//! - Catalog and grade-entry records
//! - The authorization context (`ActorContext`)
//! - Error types (`GradebookError`)
//!
//! ## Determinism Guarantees
//!
//! All grade values in this module:
//! - Are stored as integers (hundredths or half points)
//! - Convert from `f64` exactly once, at the boundary, with range checks
//! - Implement `Ord` for deterministic ordering in `BTreeMap`/`BTreeSet`

use crate::pendency::PendencyReport;
use crate::primitives::{MAX_GRADE_HUNDREDTHS, MAX_HALF_POINTS};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

record_id!(
    /// Identifier of a discipline (academic subject).
    DisciplineId
);
record_id!(
    /// Identifier of an assessment component ("P1", "P2", ...).
    ComponentId
);
record_id!(
    /// Identifier of a class instance of a discipline.
    ClassId
);
record_id!(
    /// Identifier of a student.
    StudentId
);
record_id!(
    /// Identifier of a student's enrollment in a class.
    EnrollmentId
);
record_id!(
    /// Identifier of a stored grade entry.
    GradeEntryId
);
record_id!(
    /// Identifier of an audit row.
    AuditEntryId
);
record_id!(
    /// Identifier of a professor (the acting user).
    ProfessorId
);

// =============================================================================
// AUTHORIZATION CONTEXT
// =============================================================================

/// Who is performing an operation.
///
/// Passed explicitly into every `Gradebook` operation. Ownership checks
/// compare `professor` with the owner of the class reached by the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorContext {
    pub professor: ProfessorId,
}

impl ActorContext {
    #[must_use]
    pub const fn new(professor: ProfessorId) -> Self {
        Self { professor }
    }
}

// =============================================================================
// GRADE VALUES
// =============================================================================

/// Round to 2 decimal places, half away from zero.
///
/// `round2dp(round2dp(v)) == round2dp(v)` for every finite `v`.
#[must_use]
#[allow(clippy::float_arithmetic)]
pub fn round2dp(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// A grade on the 0-10 scale with exactly two decimals.
///
/// Stored as hundredths of a point; serialized as a JSON number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Grade(u16);

impl Grade {
    pub const ZERO: Self = Self(0);
    pub const MAX: Self = Self(MAX_GRADE_HUNDREDTHS);

    /// Build a grade from hundredths. Returns `None` above `10.00`.
    #[must_use]
    pub const fn from_hundredths(hundredths: u16) -> Option<Self> {
        if hundredths > MAX_GRADE_HUNDREDTHS {
            None
        } else {
            Some(Self(hundredths))
        }
    }

    /// Build a grade from hundredths, capping at `10.00`.
    #[must_use]
    pub const fn saturating_from_hundredths(hundredths: u16) -> Self {
        if hundredths > MAX_GRADE_HUNDREDTHS {
            Self(MAX_GRADE_HUNDREDTHS)
        } else {
            Self(hundredths)
        }
    }

    /// Round an input value to 2 decimals and range-check it.
    ///
    /// # Errors
    ///
    /// `GradebookError::InvalidRange` if the rounded value is not within
    /// `[0.00, 10.00]` or is not finite.
    #[allow(clippy::float_arithmetic)]
    pub fn round_from(value: f64) -> Result<Self, GradebookError> {
        let rounded = round2dp(value);
        if !rounded.is_finite() || !(0.0..=10.0).contains(&rounded) {
            return Err(GradebookError::InvalidRange(value));
        }
        let hundredths = (rounded * 100.0).round() as u16;
        Ok(Self(hundredths.min(MAX_GRADE_HUNDREDTHS)))
    }

    #[must_use]
    pub const fn hundredths(self) -> u16 {
        self.0
    }

    #[must_use]
    #[allow(clippy::float_arithmetic)]
    pub fn as_f64(self) -> f64 {
        f64::from(self.0) / 100.0
    }
}

impl TryFrom<f64> for Grade {
    type Error = GradebookError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::round_from(value)
    }
}

impl From<Grade> for f64 {
    fn from(grade: Grade) -> Self {
        grade.as_f64()
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// An adjusted final grade: a multiple of 0.5 on the 0-10 scale.
///
/// Stored as half points; serialized as a JSON number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct HalfGrade(u8);

impl HalfGrade {
    /// Build from half points. Returns `None` above `10.0`.
    #[must_use]
    pub const fn from_half_points(half_points: u8) -> Option<Self> {
        if half_points > MAX_HALF_POINTS {
            None
        } else {
            Some(Self(half_points))
        }
    }

    /// Build from half points, capping at `10.0`.
    #[must_use]
    pub const fn saturating_from_half_points(half_points: u8) -> Self {
        if half_points > MAX_HALF_POINTS {
            Self(MAX_HALF_POINTS)
        } else {
            Self(half_points)
        }
    }

    /// Validate a manually entered adjusted grade.
    ///
    /// The multiple-of-half check runs before the range check.
    ///
    /// # Errors
    ///
    /// - `GradebookError::AdjustedNotMultipleOfHalf` if `value * 2` is not integral
    /// - `GradebookError::AdjustedOutOfRange` if `value` is outside `[0.0, 10.0]`
    #[allow(clippy::float_arithmetic)]
    pub fn try_from_points(value: f64) -> Result<Self, GradebookError> {
        let doubled = value * 2.0;
        if doubled.is_nan() || doubled != doubled.round() {
            return Err(GradebookError::AdjustedNotMultipleOfHalf(value));
        }
        if !(0.0..=10.0).contains(&value) {
            return Err(GradebookError::AdjustedOutOfRange(value));
        }
        Ok(Self(doubled as u8))
    }

    #[must_use]
    pub const fn half_points(self) -> u8 {
        self.0
    }

    #[must_use]
    #[allow(clippy::float_arithmetic)]
    pub fn as_f64(self) -> f64 {
        f64::from(self.0) / 2.0
    }
}

impl TryFrom<f64> for HalfGrade {
    type Error = GradebookError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::try_from_points(value)
    }
}

impl From<HalfGrade> for f64 {
    fn from(grade: HalfGrade) -> Self {
        grade.as_f64()
    }
}

impl fmt::Display for HalfGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fraction = if self.0 % 2 == 1 { 5 } else { 0 };
        write!(f, "{}.{}", self.0 / 2, fraction)
    }
}

// =============================================================================
// CATALOG RECORDS
// =============================================================================

/// An academic subject. Owns the averaging formula and the adjusted-grade toggle.
///
/// `formula` is kept in its encoded form (`"SIMPLE"` or `"WEIGHTED:{...}"`)
/// and decoded by `AveragingPolicy::decode` whenever grades are computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discipline {
    pub id: DisciplineId,
    pub name: String,
    pub code: Option<String>,
    pub formula: String,
    pub adjusted_enabled: bool,
}

/// A named piece of evaluation belonging to a discipline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentComponent {
    pub id: ComponentId,
    pub discipline_id: DisciplineId,
    pub name: String,
    /// Unique per discipline; the key of weighted formulas.
    pub short_code: String,
}

/// A class instance of a discipline, owned by one professor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Class {
    pub id: ClassId,
    pub discipline_id: DisciplineId,
    pub owner: ProfessorId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub name: String,
}

/// Link between a student and a class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub student_id: StudentId,
    pub class_id: ClassId,
    pub enrolled_on: NaiveDate,
    /// Manual override of the adjusted final grade.
    pub manual_adjusted: Option<HalfGrade>,
}

// =============================================================================
// GRADE ENTRY & AUDIT RECORDS
// =============================================================================

/// One stored grade for an (enrollment, component) pair.
///
/// `value == None` means the grade was cleared; the row is kept so that
/// audit rows pointing at it stay linked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeEntry {
    pub id: GradeEntryId,
    pub component_id: ComponentId,
    pub enrollment_id: EnrollmentId,
    pub value: Option<Grade>,
    pub entered_at: DateTime<Utc>,
    pub entered_by: ProfessorId,
}

/// Append-only history row attached to a grade entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub grade_entry_id: GradeEntryId,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Broad error taxonomy used by outer layers to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Range or format violation. Never retried.
    Validation,
    /// Missing record, or a record the actor does not own.
    NotFound,
    /// State conflict: weights, duplicates, pending grades.
    Conflict,
    /// Storage failure or malformed stored data.
    Internal,
}

/// Errors that can occur in the gradebook CORE.
///
/// - Every message is directly displayable to an end user
/// - The CORE never panics; all errors are recoverable
#[derive(Debug, Error)]
pub enum GradebookError {
    /// A grade value outside `[0.00, 10.00]` after rounding.
    #[error("Grade must be between 0.00 and 10.00 (got {0})")]
    InvalidRange(f64),

    /// A manual adjusted grade that is not a multiple of 0.5.
    #[error("Adjusted final grade must be a multiple of 0.5, e.g. 7.0, 7.5, 8.0 (got {0})")]
    AdjustedNotMultipleOfHalf(f64),

    /// A manual adjusted grade outside `[0.0, 10.0]`.
    #[error("Adjusted final grade must be between 0.0 and 10.0 (got {0})")]
    AdjustedOutOfRange(f64),

    /// Weighted formula whose weights do not sum to `1.0 ± 0.01`.
    #[error("Weights must sum to 1.0 (current sum: {})", format_ppm(.sum_ppm))]
    WeightSumOutOfTolerance { sum_ppm: u64 },

    /// A single weight that is negative or not a number.
    #[error("Invalid weight for component {code}: {reason}")]
    InvalidWeight { code: String, reason: String },

    /// Weighted formula that leaves registered components out.
    #[error("Every registered component must appear in the formula. Missing: {}", .0.join(", "))]
    ComponentsMissingFromFormula(Vec<String>),

    /// Component short code already used in the same discipline.
    #[error("A component with short code {0} already exists in this discipline")]
    DuplicateShortCode(String),

    /// Empty or oversized component short code.
    #[error("Invalid component short code: {0:?}")]
    InvalidShortCode(String),

    /// Bulk request larger than `MAX_BULK_ITEMS`.
    #[error("Bulk request has {0} items (maximum {1})")]
    TooManyItems(usize, usize),

    /// Missing record, or one the actor may not see.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Export refused because grades are missing.
    #[error("Cannot export: grades are pending")]
    PendingGrades(Box<PendencyReport>),

    /// Stored weight configuration that cannot be decoded.
    #[error("Malformed weight configuration: {0}")]
    MalformedWeights(String),

    /// Storage backend failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Record encoding or decoding failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid application configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl GradebookError {
    /// Category of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidRange(_)
            | Self::AdjustedOutOfRange(_)
            | Self::InvalidWeight { .. }
            | Self::ComponentsMissingFromFormula(_)
            | Self::InvalidShortCode(_)
            | Self::TooManyItems(..) => ErrorCategory::Validation,
            Self::NotFound(_) => ErrorCategory::NotFound,
            Self::AdjustedNotMultipleOfHalf(_)
            | Self::WeightSumOutOfTolerance { .. }
            | Self::DuplicateShortCode(_)
            | Self::PendingGrades(_) => ErrorCategory::Conflict,
            Self::MalformedWeights(_)
            | Self::Storage(_)
            | Self::Serialization(_)
            | Self::Config(_) => ErrorCategory::Internal,
        }
    }

    /// Stable machine-readable code of this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRange(_) => "INVALID_RANGE",
            Self::AdjustedNotMultipleOfHalf(_) => "ADJUSTED_GRADE_NOT_MULTIPLE_OF_HALF",
            Self::AdjustedOutOfRange(_) => "ADJUSTED_GRADE_OUT_OF_RANGE",
            Self::WeightSumOutOfTolerance { .. } => "WEIGHT_SUM_OUT_OF_TOLERANCE",
            Self::InvalidWeight { .. } => "INVALID_WEIGHT",
            Self::ComponentsMissingFromFormula(_) => "COMPONENTS_MISSING_FROM_FORMULA",
            Self::DuplicateShortCode(_) => "DUPLICATE_SHORT_CODE",
            Self::InvalidShortCode(_) => "INVALID_SHORT_CODE",
            Self::TooManyItems(..) => "BULK_TOO_LARGE",
            Self::NotFound(_) => "NOT_FOUND",
            Self::PendingGrades(_) => "PENDING_GRADES",
            Self::MalformedWeights(_) => "MALFORMED_WEIGHTS",
            Self::Storage(_) => "STORAGE",
            Self::Serialization(_) => "SERIALIZATION",
            Self::Config(_) => "CONFIG",
        }
    }
}

/// Render a parts-per-million value with two decimals (`900_000` -> `"0.90"`).
fn format_ppm(ppm: &u64) -> String {
    let hundredths = (ppm + 5_000) / 10_000;
    format!("{}.{:02}", hundredths / 100, hundredths % 100)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_rounds_half_away_from_zero() {
        assert_eq!(Grade::round_from(7.125).expect("grade").hundredths(), 713);
        assert_eq!(Grade::round_from(7.994).expect("grade").hundredths(), 799);
        assert_eq!(Grade::round_from(7.999).expect("grade").hundredths(), 800);
        assert_eq!(Grade::round_from(-0.004).expect("grade"), Grade::ZERO);
    }

    #[test]
    fn grade_rejects_out_of_range() {
        assert!(matches!(
            Grade::round_from(11.0),
            Err(GradebookError::InvalidRange(_))
        ));
        assert!(matches!(
            Grade::round_from(-0.01),
            Err(GradebookError::InvalidRange(_))
        ));
        assert!(matches!(
            Grade::round_from(f64::NAN),
            Err(GradebookError::InvalidRange(_))
        ));
        assert_eq!(Grade::round_from(10.0).expect("grade"), Grade::MAX);
    }

    #[test]
    fn grade_display_has_two_decimals() {
        assert_eq!(Grade::round_from(8.5).expect("grade").to_string(), "8.50");
        assert_eq!(Grade::ZERO.to_string(), "0.00");
        assert_eq!(Grade::MAX.to_string(), "10.00");
    }

    #[test]
    fn grade_serializes_as_number() {
        let grade = Grade::round_from(7.25).expect("grade");
        assert_eq!(serde_json::to_string(&grade).expect("json"), "7.25");
        let back: Grade = serde_json::from_str("7.25").expect("parse");
        assert_eq!(back, grade);
        assert!(serde_json::from_str::<Grade>("12").is_err());
    }

    #[test]
    fn half_grade_checks_multiple_before_range() {
        assert!(matches!(
            HalfGrade::try_from_points(7.3),
            Err(GradebookError::AdjustedNotMultipleOfHalf(_))
        ));
        assert!(matches!(
            HalfGrade::try_from_points(10.5),
            Err(GradebookError::AdjustedOutOfRange(_))
        ));
        assert!(matches!(
            HalfGrade::try_from_points(-0.5),
            Err(GradebookError::AdjustedOutOfRange(_))
        ));
        assert_eq!(HalfGrade::try_from_points(9.5).expect("half").half_points(), 19);
    }

    #[test]
    fn half_grade_display() {
        assert_eq!(HalfGrade::from_half_points(15).expect("half").to_string(), "7.5");
        assert_eq!(HalfGrade::from_half_points(14).expect("half").to_string(), "7.0");
        assert!(HalfGrade::from_half_points(21).is_none());
    }

    #[test]
    fn error_categories() {
        assert_eq!(
            GradebookError::InvalidRange(11.0).category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            GradebookError::AdjustedNotMultipleOfHalf(7.3).category(),
            ErrorCategory::Conflict
        );
        assert_eq!(
            GradebookError::NotFound("Enrollment").category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            GradebookError::MalformedWeights("x".into()).category(),
            ErrorCategory::Internal
        );
    }

    #[test]
    fn weight_sum_message_shows_two_decimals() {
        let err = GradebookError::WeightSumOutOfTolerance { sum_ppm: 900_000 };
        assert_eq!(err.to_string(), "Weights must sum to 1.0 (current sum: 0.90)");
        assert_eq!(err.code(), "WEIGHT_SUM_OUT_OF_TOLERANCE");
    }
}

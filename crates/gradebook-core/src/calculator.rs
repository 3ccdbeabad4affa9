//! # Final Grade Calculator
//!
//! Deterministic final-grade computation.
//!
//! A final grade is kept as an exact rational (`Mean`) in hundredths of a
//! point until it is reported. Two roundings are derived from it:
//!
//! - The reported final grade: half-up to two decimals.
//! - The adjusted final grade: nearest half point, where an exact tie
//!   (a fractional part of `.25` or `.75`) rounds DOWN.
//!
//! No partial averages are produced: if a component that takes part in the
//! policy has no value, the final grade is `None`.

use crate::gradebook::{ClassSheet, Gradebook};
use crate::policy::{AveragingPolicy, Weights};
use crate::primitives::{GRADE_SCALE, HALF_POINT_SCALE, MAX_GRADE_HUNDREDTHS, MAX_HALF_POINTS};
use crate::store::GradebookStore;
use crate::{
    ActorContext, AssessmentComponent, ClassId, ComponentId, DisciplineId, EnrollmentId, Grade,
    GradebookError, HalfGrade, StudentId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Hundredths per half point.
const HUNDREDTHS_PER_HALF_POINT: u128 = (GRADE_SCALE / HALF_POINT_SCALE) as u128;

// =============================================================================
// EXACT MEAN
// =============================================================================

/// An exact average in hundredths of a point: `numerator / denominator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mean {
    numerator: u128,
    denominator: u128,
}

impl Mean {
    /// Returns `None` for an empty denominator.
    #[must_use]
    pub fn new(numerator: u128, denominator: u128) -> Option<Self> {
        (denominator > 0).then_some(Self {
            numerator,
            denominator,
        })
    }

    /// The mean of a single grade.
    #[must_use]
    pub fn of_grade(grade: Grade) -> Self {
        Self {
            numerator: u128::from(grade.hundredths()),
            denominator: 1,
        }
    }

    /// Round half-up to two decimals.
    #[must_use]
    pub fn rounded(self) -> Grade {
        let hundredths = (2 * self.numerator + self.denominator) / (2 * self.denominator);
        Grade::saturating_from_hundredths(u16::try_from(hundredths).unwrap_or(MAX_GRADE_HUNDREDTHS))
    }

    /// Round to the nearest half point; an exact tie rounds down.
    ///
    /// `7.25 -> 7.0`, `7.75 -> 7.5`, `7.70 -> 7.5`, `7.76 -> 8.0`.
    #[must_use]
    pub fn adjusted(self) -> HalfGrade {
        let unit = self.denominator * HUNDREDTHS_PER_HALF_POINT;
        let floor = self.numerator / unit;
        let remainder = self.numerator % unit;
        let half_points = if 2 * remainder > unit { floor + 1 } else { floor };
        HalfGrade::saturating_from_half_points(u8::try_from(half_points).unwrap_or(MAX_HALF_POINTS))
    }
}

/// Adjust a stored two-decimal grade to the half-point scale.
#[must_use]
pub fn adjust_grade(grade: Grade) -> HalfGrade {
    Mean::of_grade(grade).adjusted()
}

/// The adjusted grade to report for one student.
///
/// `None` when the discipline does not use adjusted grades. Otherwise a
/// manual override always wins, even over a missing final grade.
#[must_use]
pub fn resolve_adjusted(
    enabled: bool,
    computed: Option<Mean>,
    manual: Option<HalfGrade>,
) -> Option<HalfGrade> {
    if !enabled {
        return None;
    }
    manual.or_else(|| computed.map(Mean::adjusted))
}

// =============================================================================
// CALCULATOR
// =============================================================================

/// Computes final grades for one discipline.
///
/// Borrowing the decoded policy and the discipline's components, it is
/// cheap to build once per class and apply per student.
#[derive(Debug, Clone, Copy)]
pub struct FinalGradeCalculator<'a> {
    policy: &'a AveragingPolicy,
    components: &'a [AssessmentComponent],
}

impl<'a> FinalGradeCalculator<'a> {
    #[must_use]
    pub fn new(policy: &'a AveragingPolicy, components: &'a [AssessmentComponent]) -> Self {
        Self { policy, components }
    }

    /// The exact final mean of one enrollment, or `None` if incomplete.
    #[must_use]
    pub fn final_mean(&self, values: &BTreeMap<ComponentId, Grade>) -> Option<Mean> {
        match self.policy {
            AveragingPolicy::Simple => self.simple_mean(values),
            AveragingPolicy::Weighted(weights) => self.weighted_mean(weights, values),
        }
    }

    /// The reported final grade of one enrollment.
    #[must_use]
    pub fn final_grade(&self, values: &BTreeMap<ComponentId, Grade>) -> Option<Grade> {
        self.final_mean(values).map(Mean::rounded)
    }

    fn simple_mean(&self, values: &BTreeMap<ComponentId, Grade>) -> Option<Mean> {
        let mut sum: u128 = 0;
        for component in self.components {
            let value = values.get(&component.id)?;
            sum += u128::from(value.hundredths());
        }
        Mean::new(sum, self.components.len() as u128)
    }

    /// Iterates the discipline's components, not the weight keys.
    fn weighted_mean(
        &self,
        weights: &Weights,
        values: &BTreeMap<ComponentId, Grade>,
    ) -> Option<Mean> {
        let mut numerator: u128 = 0;
        let mut denominator: u128 = 0;
        for component in self.components {
            let Some(weight) = weights.get(&component.short_code) else {
                continue;
            };
            let value = values.get(&component.id)?;
            numerator += u128::from(value.hundredths()) * u128::from(weight.ppm());
            denominator += u128::from(weight.ppm());
        }
        Mean::new(numerator, denominator)
    }
}

// =============================================================================
// CLASS REPORT
// =============================================================================

/// Final grades of one student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentFinalGrade {
    pub enrollment_id: EnrollmentId,
    pub student_id: StudentId,
    pub student_name: String,
    /// Every component of the discipline, keyed by short code.
    pub component_values: BTreeMap<String, Option<Grade>>,
    pub final_grade: Option<Grade>,
    pub adjusted_final_grade: Option<HalfGrade>,
}

/// Final grades of a whole class, ordered by student name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassReport {
    pub discipline_id: DisciplineId,
    pub class_id: ClassId,
    /// `"simple"` or `"weighted"`; `None` when the stored formula is malformed.
    pub policy: Option<String>,
    pub adjusted_enabled: bool,
    /// Why every final grade is `None`, when the stored formula is malformed.
    pub policy_issue: Option<String>,
    pub students: Vec<StudentFinalGrade>,
}

/// Result of toggling the adjusted-grade mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustedMode {
    pub discipline_id: DisciplineId,
    pub enabled: bool,
}

/// Compute the report of an already loaded class.
///
/// A malformed formula is logged and degrades every final grade to `None`;
/// manual adjusted grades are still reported.
pub(crate) fn class_report(sheet: &ClassSheet) -> ClassReport {
    let discipline = &sheet.discipline;
    let (policy, policy_issue) = match AveragingPolicy::decode(&discipline.formula) {
        Ok(policy) => (Some(policy), None),
        Err(e) => {
            tracing::error!(
                discipline_id = %discipline.id,
                code = e.code(),
                error = %e,
                "stored averaging formula cannot be decoded"
            );
            (None, Some(e.to_string()))
        }
    };

    let students = sheet
        .rows
        .iter()
        .map(|row| {
            let mean = policy.as_ref().and_then(|p| {
                FinalGradeCalculator::new(p, &sheet.components).final_mean(&row.values)
            });
            StudentFinalGrade {
                enrollment_id: row.enrollment.id,
                student_id: row.enrollment.student_id,
                student_name: row.student_name.clone(),
                component_values: sheet
                    .components
                    .iter()
                    .map(|c| (c.short_code.clone(), row.values.get(&c.id).copied()))
                    .collect(),
                final_grade: mean.map(Mean::rounded),
                adjusted_final_grade: resolve_adjusted(
                    discipline.adjusted_enabled,
                    mean,
                    row.enrollment.manual_adjusted,
                ),
            }
        })
        .collect();

    ClassReport {
        discipline_id: discipline.id,
        class_id: sheet.class.id,
        policy: policy.as_ref().map(|p| p.kind().to_string()),
        adjusted_enabled: discipline.adjusted_enabled,
        policy_issue,
        students,
    }
}

// =============================================================================
// GRADEBOOK OPERATIONS
// =============================================================================

impl<S: GradebookStore> Gradebook<S> {
    /// Final and adjusted grades of every student of a class.
    ///
    /// # Errors
    ///
    /// `NotFound` if the discipline or class is missing, the class is not
    /// owned by the actor, or the class belongs to another discipline.
    pub fn compute_for_class(
        &self,
        actor: &ActorContext,
        discipline_id: DisciplineId,
        class_id: ClassId,
    ) -> Result<ClassReport, GradebookError> {
        let sheet = self.load_sheet(actor, discipline_id, class_id)?;
        Ok(class_report(&sheet))
    }

    /// Enable or disable adjusted final grades for a discipline.
    ///
    /// Manual overrides already stored on enrollments are kept.
    ///
    /// Disciplines have no owning professor: only classes do. Any actor may
    /// change this setting, and the actor is recorded in the log line.
    pub fn set_adjusted_mode(
        &mut self,
        actor: &ActorContext,
        discipline_id: DisciplineId,
        enabled: bool,
    ) -> Result<AdjustedMode, GradebookError> {
        let mut discipline = self.discipline_or_not_found(discipline_id)?;
        discipline.adjusted_enabled = enabled;
        self.store.put_discipline(discipline)?;
        tracing::info!(
            discipline_id = %discipline_id,
            professor = %actor.professor,
            enabled,
            "adjusted final grade mode changed"
        );
        Ok(AdjustedMode {
            discipline_id,
            enabled,
        })
    }

    /// Set or clear the manual adjusted grade of an enrollment.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the enrollment is missing or not owned by the actor
    /// - `AdjustedNotMultipleOfHalf` / `AdjustedOutOfRange` for invalid values
    pub fn set_manual_adjusted_grade(
        &mut self,
        actor: &ActorContext,
        enrollment_id: EnrollmentId,
        value: Option<f64>,
    ) -> Result<Option<HalfGrade>, GradebookError> {
        let (mut enrollment, _class) = self.owned_enrollment(actor, enrollment_id)?;
        let manual = value.map(HalfGrade::try_from_points).transpose()?;
        enrollment.manual_adjusted = manual;
        self.store.put_enrollment(enrollment)?;
        tracing::debug!(
            enrollment_id = %enrollment_id,
            professor = %actor.professor,
            manual = ?manual.map(|g| g.to_string()),
            "manual adjusted grade set"
        );
        Ok(manual)
    }

    /// Replace the averaging policy of a discipline.
    ///
    /// As with [`Self::set_adjusted_mode`], there is no ownership check on a
    /// discipline; the actor only appears in the log line.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the discipline is missing
    /// - `WeightSumOutOfTolerance` / `ComponentsMissingFromFormula` for
    ///   weighted policies that do not fit the discipline's components
    pub fn set_averaging_policy(
        &mut self,
        actor: &ActorContext,
        discipline_id: DisciplineId,
        policy: &AveragingPolicy,
    ) -> Result<(), GradebookError> {
        let mut discipline = self.discipline_or_not_found(discipline_id)?;
        let components = self.store.components_of(discipline_id)?;
        policy.validate_for(&components)?;
        discipline.formula = policy.encode();
        self.store.put_discipline(discipline)?;
        tracing::info!(
            discipline_id = %discipline_id,
            professor = %actor.professor,
            policy = policy.kind(),
            "averaging policy changed"
        );
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn grade(v: f64) -> Grade {
        Grade::round_from(v).expect("grade")
    }

    fn half(v: f64) -> HalfGrade {
        HalfGrade::try_from_points(v).expect("half grade")
    }

    fn components(codes: &[&str]) -> Vec<AssessmentComponent> {
        codes
            .iter()
            .enumerate()
            .map(|(i, code)| AssessmentComponent {
                id: ComponentId(i as u64 + 1),
                discipline_id: DisciplineId(1),
                name: code.to_string(),
                short_code: code.to_string(),
            })
            .collect()
    }

    fn values(pairs: &[(u64, f64)]) -> BTreeMap<ComponentId, Grade> {
        pairs
            .iter()
            .map(|(id, v)| (ComponentId(*id), grade(*v)))
            .collect()
    }

    #[test]
    fn adjustment_tie_break_rounds_down() {
        assert_eq!(adjust_grade(grade(7.25)), half(7.0));
        assert_eq!(adjust_grade(grade(7.75)), half(7.5));
        assert_eq!(adjust_grade(grade(7.70)), half(7.5));
        assert_eq!(adjust_grade(grade(7.76)), half(8.0));
        assert_eq!(adjust_grade(grade(7.24)), half(7.0));
        assert_eq!(adjust_grade(grade(7.26)), half(7.5));
    }

    #[test]
    fn adjustment_bounds() {
        assert_eq!(adjust_grade(Grade::ZERO), half(0.0));
        assert_eq!(adjust_grade(Grade::MAX), half(10.0));
        assert_eq!(adjust_grade(grade(9.9)), half(10.0));
    }

    #[test]
    fn adjustment_uses_exact_mean() {
        // 7.255 is reported as 7.26 and lies just above the 7.25 tie.
        let mean = Mean::new(2 * 725 + 1, 2).expect("mean");
        assert_eq!(mean.rounded(), grade(7.26));
        assert_eq!(mean.adjusted(), half(7.5));

        let tie = Mean::new(1450, 2).expect("mean");
        assert_eq!(tie.adjusted(), half(7.0));
    }

    #[test]
    fn rounding_is_half_up() {
        let mean = Mean::new(2001, 3).expect("mean"); // 6.67
        assert_eq!(mean.rounded(), grade(6.67));
        let mean = Mean::new(1, 2).expect("mean"); // 0.005
        assert_eq!(mean.rounded(), grade(0.01));
        assert!(Mean::new(1, 0).is_none());
    }

    #[test]
    fn simple_average_of_complete_components() {
        let comps = components(&["P1", "P2", "P3"]);
        let policy = AveragingPolicy::Simple;
        let calc = FinalGradeCalculator::new(&policy, &comps);

        let full = values(&[(1, 10.0), (2, 8.0), (3, 6.0)]);
        assert_eq!(calc.final_grade(&full), Some(grade(8.0)));

        for missing in 1..=3 {
            let mut partial = full.clone();
            partial.remove(&ComponentId(missing));
            assert_eq!(calc.final_grade(&partial), None);
        }
    }

    #[test]
    fn simple_average_without_components_is_none() {
        let policy = AveragingPolicy::Simple;
        let calc = FinalGradeCalculator::new(&policy, &[]);
        assert_eq!(calc.final_grade(&BTreeMap::new()), None);
    }

    #[test]
    fn weighted_average() {
        let comps = components(&["P1", "P2"]);
        let policy = AveragingPolicy::Weighted(
            Weights::from_decimals([("P1", 0.5), ("P2", 0.5)]).expect("weights"),
        );
        let calc = FinalGradeCalculator::new(&policy, &comps);
        assert_eq!(
            calc.final_grade(&values(&[(1, 8.0), (2, 6.0)])),
            Some(grade(7.0))
        );
    }

    #[test]
    fn weighted_skips_unweighted_and_unknown_keys() {
        let comps = components(&["P1", "P2", "EX"]);
        let policy = AveragingPolicy::Weighted(
            Weights::from_decimals([("P1", 0.4), ("P2", 0.6), ("GHOST", 0.3)]).expect("weights"),
        );
        let calc = FinalGradeCalculator::new(&policy, &comps);

        // EX carries no weight, so its missing value does not matter.
        let result = calc.final_grade(&values(&[(1, 5.0), (2, 10.0)]));
        assert_eq!(result, Some(grade(8.0)));

        // A weighted component without a value invalidates the result.
        assert_eq!(calc.final_grade(&values(&[(1, 5.0), (3, 10.0)])), None);
    }

    #[test]
    fn weighted_without_any_weighted_component_is_none() {
        let comps = components(&["P1"]);
        let policy = AveragingPolicy::Weighted(
            Weights::from_decimals([("P1", 0.0)]).expect("weights"),
        );
        let calc = FinalGradeCalculator::new(&policy, &comps);
        assert_eq!(calc.final_grade(&values(&[(1, 5.0)])), None);
    }

    #[test]
    fn manual_override_takes_precedence() {
        let computed = Mean::new(750, 1);
        assert_eq!(
            resolve_adjusted(true, computed, Some(half(9.5))),
            Some(half(9.5))
        );
        assert_eq!(resolve_adjusted(true, computed, None), Some(half(7.5)));
        assert_eq!(resolve_adjusted(true, None, Some(half(6.0))), Some(half(6.0)));
        assert_eq!(resolve_adjusted(true, None, None), None);
        assert_eq!(resolve_adjusted(false, computed, Some(half(9.5))), None);
    }
}

//! # Property-Based Tests
//!
//! Rounding, adjustment and completeness invariants checked with proptest.

use gradebook_core::{
    AssessmentComponent, AveragingPolicy, ComponentId, DisciplineId, FinalGradeCalculator, Grade,
    Mean, Weights, adjust_grade, round2dp,
};
use proptest::collection::vec;
use proptest::prelude::*;
use std::collections::BTreeMap;

fn components(count: usize) -> Vec<AssessmentComponent> {
    (0..count)
        .map(|i| AssessmentComponent {
            id: ComponentId(i as u64 + 1),
            discipline_id: DisciplineId(1),
            name: format!("Test {}", i + 1),
            short_code: format!("P{}", i + 1),
        })
        .collect()
}

fn values_of(hundredths: &[u16]) -> BTreeMap<ComponentId, Grade> {
    hundredths
        .iter()
        .enumerate()
        .filter_map(|(i, h)| Grade::from_hundredths(*h).map(|g| (ComponentId(i as u64 + 1), g)))
        .collect()
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Rounding to two decimals is idempotent.
    #[test]
    fn round2dp_is_idempotent(value in -1.0e6f64..1.0e6) {
        let once = round2dp(value);
        prop_assert_eq!(round2dp(once), once);
    }

    /// Every accepted grade survives a second rounding unchanged.
    #[test]
    fn accepted_grades_are_stable(value in 0.0f64..=10.0) {
        let grade = Grade::round_from(value).expect("in range");
        prop_assert_eq!(Grade::round_from(grade.as_f64()).expect("in range"), grade);
    }

    /// The adjusted grade is a half point within half a point of the grade.
    #[test]
    fn adjusted_grade_is_nearest_half_point(hundredths in 0u16..=1000) {
        let grade = Grade::from_hundredths(hundredths).expect("in range");
        let adjusted = adjust_grade(grade);
        let adjusted_hundredths = i32::from(adjusted.half_points()) * 50;
        let distance = adjusted_hundredths - i32::from(hundredths);

        prop_assert!(adjusted.half_points() <= 20);
        prop_assert!(distance.abs() <= 25);
        // Exactly halfway between two half points always goes down.
        if distance.abs() == 25 {
            prop_assert_eq!(distance, -25);
        }
    }

    /// A simple average lies between the lowest and highest component.
    #[test]
    fn simple_average_is_bounded(grades in vec(0u16..=1000, 1..8)) {
        let comps = components(grades.len());
        let policy = AveragingPolicy::Simple;
        let calc = FinalGradeCalculator::new(&policy, &comps);
        let result = calc.final_grade(&values_of(&grades)).expect("complete");

        let min = grades.iter().copied().min().unwrap_or(0);
        let max = grades.iter().copied().max().unwrap_or(0);
        prop_assert!(result.hundredths() >= min && result.hundredths() <= max);
    }

    /// Removing any single value makes the final grade undefined.
    #[test]
    fn incomplete_grades_yield_none(
        grades in vec(0u16..=1000, 1..8),
        missing in any::<prop::sample::Index>(),
    ) {
        let comps = components(grades.len());
        let mut values = values_of(&grades);
        let removed = ComponentId(missing.index(grades.len()) as u64 + 1);
        values.remove(&removed);

        let policy = AveragingPolicy::Simple;
        prop_assert_eq!(FinalGradeCalculator::new(&policy, &comps).final_grade(&values), None);

        let weights = Weights::from_decimals(
            comps.iter().map(|c| (c.short_code.clone(), 0.25)),
        ).expect("weights");
        let weighted = AveragingPolicy::Weighted(weights);
        prop_assert_eq!(FinalGradeCalculator::new(&weighted, &comps).final_grade(&values), None);
    }

    /// Equal weights give the same final grade as the simple average.
    #[test]
    fn equal_weights_match_simple_average(grades in vec(0u16..=1000, 1..6)) {
        let comps = components(grades.len());
        let values = values_of(&grades);
        let weights = Weights::from_decimals(
            comps.iter().map(|c| (c.short_code.clone(), 0.1)),
        ).expect("weights");

        let simple = AveragingPolicy::Simple;
        let weighted = AveragingPolicy::Weighted(weights);
        prop_assert_eq!(
            FinalGradeCalculator::new(&simple, &comps).final_mean(&values).map(Mean::rounded),
            FinalGradeCalculator::new(&weighted, &comps).final_mean(&values).map(Mean::rounded)
        );
    }
}

//! # Grade Entry
//!
//! Validated writes of individual grades and the read-only grid view.
//!
//! Each write is one atomic read-modify-write in the store, followed by the
//! gradebook's observers. A bulk request is a sequence of independent
//! writes: a failing item is reported and the next item still runs.

use crate::gradebook::Gradebook;
use crate::primitives::MAX_BULK_ITEMS;
use crate::store::{GradeWrite, GradebookStore};
use crate::{
    ActorContext, ClassId, ComponentId, EnrollmentId, Grade, GradeEntry, GradebookError, StudentId,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

// =============================================================================
// REQUEST & RESPONSE TYPES
// =============================================================================

/// One item of a bulk upsert. `value: None` clears the grade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BulkItem {
    pub enrollment_id: EnrollmentId,
    pub component_id: ComponentId,
    pub value: Option<f64>,
}

/// A bulk item that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkItemError {
    pub enrollment_id: EnrollmentId,
    pub component_id: ComponentId,
    pub code: String,
    pub message: String,
}

/// Outcome of a bulk upsert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkOutcome {
    /// Items applied successfully, including no-op clears.
    pub updated_count: usize,
    pub errors: Vec<BulkItemError>,
}

/// One student row of the grade grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridRow {
    pub enrollment_id: EnrollmentId,
    pub student_id: StudentId,
    pub student_name: String,
    pub current_value: Option<Grade>,
}

/// The grades of one component across a class, ordered by student name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeGrid {
    pub class_id: ClassId,
    pub component_id: ComponentId,
    pub short_code: String,
    /// Informational only; writes are not refused because of it.
    pub readonly: bool,
    pub rows: Vec<GridRow>,
}

// =============================================================================
// OPERATIONS
// =============================================================================

impl<S: GradebookStore> Gradebook<S> {
    /// Record, update or clear one grade.
    ///
    /// Non-null values are rounded half away from zero to 2 decimals.
    /// Returns the stored row, or `None` when clearing a grade that was
    /// never recorded.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the enrollment is missing, its class is not owned by
    ///   the actor, or the component is not part of the class's discipline
    /// - `InvalidRange` if the rounded value is outside `[0.00, 10.00]`
    pub fn upsert_grade(
        &mut self,
        actor: &ActorContext,
        enrollment_id: EnrollmentId,
        component_id: ComponentId,
        value: Option<f64>,
    ) -> Result<Option<GradeEntry>, GradebookError> {
        let (_, class) = self.owned_enrollment(actor, enrollment_id)?;
        self.class_component(&class, component_id)?;
        let value = value.map(Grade::round_from).transpose()?;

        let write = GradeWrite {
            enrollment_id,
            component_id,
            value,
            actor: actor.professor,
            at: Utc::now(),
        };
        let Some(change) = self.store.write_grade(write)? else {
            return Ok(None);
        };
        self.notify(&change);

        tracing::debug!(
            enrollment_id = %enrollment_id,
            component_id = %component_id,
            professor = %actor.professor,
            kind = ?change.kind,
            "grade written"
        );
        Ok(Some(change.entry))
    }

    /// Apply many grade writes independently.
    ///
    /// Each item is its own atomic write; a failing item is recorded in
    /// `errors` and does not stop the batch.
    ///
    /// # Errors
    ///
    /// `TooManyItems` if the batch exceeds `MAX_BULK_ITEMS`; nothing is
    /// applied in that case.
    pub fn bulk_upsert(
        &mut self,
        actor: &ActorContext,
        items: &[BulkItem],
    ) -> Result<BulkOutcome, GradebookError> {
        if items.len() > MAX_BULK_ITEMS {
            return Err(GradebookError::TooManyItems(items.len(), MAX_BULK_ITEMS));
        }

        let mut outcome = BulkOutcome::default();
        for item in items {
            match self.upsert_grade(actor, item.enrollment_id, item.component_id, item.value) {
                Ok(_) => outcome.updated_count += 1,
                Err(e) => outcome.errors.push(BulkItemError {
                    enrollment_id: item.enrollment_id,
                    component_id: item.component_id,
                    code: e.code().to_string(),
                    message: e.to_string(),
                }),
            }
        }

        if !outcome.errors.is_empty() {
            tracing::warn!(
                professor = %actor.professor,
                applied = outcome.updated_count,
                failed = outcome.errors.len(),
                "bulk upsert partially failed"
            );
        }
        Ok(outcome)
    }

    /// The current value of one component for every student of a class.
    ///
    /// # Errors
    ///
    /// `NotFound` if the class is missing or not owned by the actor, or the
    /// component is not part of the class's discipline.
    pub fn read_grid(
        &self,
        actor: &ActorContext,
        class_id: ClassId,
        component_id: ComponentId,
        readonly: bool,
    ) -> Result<GradeGrid, GradebookError> {
        let class = self.owned_class(actor, class_id)?;
        let component = self.class_component(&class, component_id)?;

        let mut rows = Vec::new();
        for enrollment in self.store.enrollments_of(class_id)? {
            let current_value = self
                .store
                .grade_entry(enrollment.id, component_id)?
                .and_then(|entry| entry.value);
            rows.push(GridRow {
                enrollment_id: enrollment.id,
                student_id: enrollment.student_id,
                student_name: self.student_name(enrollment.student_id)?,
                current_value,
            });
        }
        rows.sort_by(|a, b| {
            a.student_name
                .cmp(&b.student_name)
                .then(a.enrollment_id.cmp(&b.enrollment_id))
        });

        Ok(GradeGrid {
            class_id,
            component_id,
            short_code: component.short_code,
            readonly,
            rows,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        AssessmentComponent, Class, Discipline, DisciplineId, Enrollment, ProfessorId, Student,
    };
    use chrono::NaiveDate;

    const OWNER: ActorContext = ActorContext::new(ProfessorId(7));

    fn seeded() -> Gradebook {
        let mut book = Gradebook::in_memory();
        let store = book.store_mut();
        for (id, name) in [(1, "Algebra"), (2, "Physics")] {
            store
                .put_discipline(Discipline {
                    id: DisciplineId(id),
                    name: name.into(),
                    code: None,
                    formula: "SIMPLE".into(),
                    adjusted_enabled: false,
                })
                .expect("discipline");
        }
        for (id, discipline, code) in [(1, 1, "P1"), (2, 1, "P2"), (3, 2, "P1")] {
            store
                .put_component(AssessmentComponent {
                    id: ComponentId(id),
                    discipline_id: DisciplineId(discipline),
                    name: code.into(),
                    short_code: code.into(),
                })
                .expect("component");
        }
        store
            .put_class(Class {
                id: ClassId(10),
                discipline_id: DisciplineId(1),
                owner: ProfessorId(7),
                name: "A".into(),
            })
            .expect("class");
        for (id, name) in [(1, "Carla"), (2, "Ana")] {
            store
                .put_student(Student {
                    id: StudentId(id),
                    name: name.into(),
                })
                .expect("student");
            store
                .put_enrollment(Enrollment {
                    id: EnrollmentId(100 + id),
                    student_id: StudentId(id),
                    class_id: ClassId(10),
                    enrolled_on: NaiveDate::from_ymd_opt(2024, 2, 1).expect("date"),
                    manual_adjusted: None,
                })
                .expect("enrollment");
        }
        book
    }

    #[test]
    fn upsert_rounds_and_stores() {
        let mut book = seeded();
        let entry = book
            .upsert_grade(&OWNER, EnrollmentId(101), ComponentId(1), Some(7.125))
            .expect("upsert")
            .expect("entry");
        assert_eq!(entry.value, Some(Grade::round_from(7.13).expect("grade")));
        assert_eq!(entry.entered_by, ProfessorId(7));
    }

    #[test]
    fn upsert_rejects_out_of_range() {
        let mut book = seeded();
        let result = book.upsert_grade(&OWNER, EnrollmentId(101), ComponentId(1), Some(10.01));
        assert!(matches!(result, Err(GradebookError::InvalidRange(_))));
    }

    #[test]
    fn clearing_unrecorded_grade_is_noop() {
        let mut book = seeded();
        let result = book
            .upsert_grade(&OWNER, EnrollmentId(101), ComponentId(1), None)
            .expect("upsert");
        assert!(result.is_none());
        assert!(
            book.store()
                .grade_entry(EnrollmentId(101), ComponentId(1))
                .expect("read")
                .is_none()
        );
    }

    #[test]
    fn foreign_actor_and_foreign_component_are_not_found() {
        let mut book = seeded();
        let stranger = ActorContext::new(ProfessorId(8));
        assert!(matches!(
            book.upsert_grade(&stranger, EnrollmentId(101), ComponentId(1), Some(5.0)),
            Err(GradebookError::NotFound(_))
        ));
        // Component 3 belongs to another discipline.
        assert!(matches!(
            book.upsert_grade(&OWNER, EnrollmentId(101), ComponentId(3), Some(5.0)),
            Err(GradebookError::NotFound("Component"))
        ));
    }

    #[test]
    fn bulk_reports_failed_items_and_keeps_going() {
        let mut book = seeded();
        let items = [
            BulkItem {
                enrollment_id: EnrollmentId(101),
                component_id: ComponentId(1),
                value: Some(8.0),
            },
            BulkItem {
                enrollment_id: EnrollmentId(101),
                component_id: ComponentId(2),
                value: Some(11.0),
            },
            BulkItem {
                enrollment_id: EnrollmentId(102),
                component_id: ComponentId(1),
                value: Some(6.5),
            },
        ];
        let outcome = book.bulk_upsert(&OWNER, &items).expect("bulk");
        assert_eq!(outcome.updated_count, 2);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].component_id, ComponentId(2));
        assert_eq!(outcome.errors[0].code, "INVALID_RANGE");
    }

    struct FailingObserver;

    impl crate::GradeObserver for FailingObserver {
        fn on_grade_written(
            &self,
            _change: &crate::store::GradeChange,
            _store: &mut dyn GradebookStore,
        ) -> Result<(), GradebookError> {
            Err(GradebookError::Storage("observer offline".into()))
        }
    }

    #[test]
    fn observer_failure_does_not_fail_committed_write() {
        let mut book = seeded();
        book.add_observer(Box::new(FailingObserver));

        let entry = book
            .upsert_grade(&OWNER, EnrollmentId(101), ComponentId(1), Some(6.0))
            .expect("upsert")
            .expect("entry");
        assert_eq!(entry.value, Some(Grade::round_from(6.0).expect("grade")));

        let items = [BulkItem {
            enrollment_id: EnrollmentId(102),
            component_id: ComponentId(1),
            value: Some(7.0),
        }];
        let outcome = book.bulk_upsert(&OWNER, &items).expect("bulk");
        assert_eq!(outcome.updated_count, 1);
        assert!(outcome.errors.is_empty());

        let stored = book
            .store()
            .grade_entry(EnrollmentId(102), ComponentId(1))
            .expect("read")
            .and_then(|entry| entry.value);
        assert_eq!(stored, Some(Grade::round_from(7.0).expect("grade")));

        // The default audit trail still ran before the failing observer.
        let history = book
            .list_audit_by_class(&OWNER, ClassId(10))
            .expect("history");
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn bulk_rejects_oversized_batch() {
        let mut book = seeded();
        let item = BulkItem {
            enrollment_id: EnrollmentId(101),
            component_id: ComponentId(1),
            value: Some(8.0),
        };
        let items = vec![item; MAX_BULK_ITEMS + 1];
        assert!(matches!(
            book.bulk_upsert(&OWNER, &items),
            Err(GradebookError::TooManyItems(..))
        ));
    }

    #[test]
    fn grid_is_sorted_by_name() {
        let mut book = seeded();
        book.upsert_grade(&OWNER, EnrollmentId(101), ComponentId(1), Some(9.0))
            .expect("upsert");

        let grid = book
            .read_grid(&OWNER, ClassId(10), ComponentId(1), true)
            .expect("grid");
        assert!(grid.readonly);
        assert_eq!(grid.short_code, "P1");
        let names: Vec<_> = grid.rows.iter().map(|r| r.student_name.as_str()).collect();
        assert_eq!(names, vec!["Ana", "Carla"]);
        assert_eq!(grid.rows[0].current_value, None);
        assert_eq!(
            grid.rows[1].current_value,
            Some(Grade::round_from(9.0).expect("grade"))
        );
    }
}

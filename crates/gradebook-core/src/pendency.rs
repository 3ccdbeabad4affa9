//! # Pendencies and Export Gate
//!
//! Completeness of a class's grades.
//!
//! A component is pending while any enrolled student lacks a value for it.
//! A student is pending while their final grade cannot be computed. Export
//! is refused as long as anything is pending, and the refusal carries the
//! full report.

use crate::calculator::{ClassReport, class_report};
use crate::gradebook::{ClassSheet, Gradebook};
use crate::store::GradebookStore;
use crate::{ActorContext, ClassId, DisciplineId, EnrollmentId, GradebookError, StudentId};
use serde::{Deserialize, Serialize};

/// Missing grades of one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingComponent {
    pub short_code: String,
    pub missing_count: usize,
}

/// A student whose final grade is not defined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentRef {
    pub id: StudentId,
    pub enrollment_id: EnrollmentId,
    pub name: String,
}

/// What keeps a class from being exported.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PendencyReport {
    pub has_pendencies: bool,
    /// In component order; components without missing grades are omitted.
    pub pending_components: Vec<PendingComponent>,
    /// In student-name order.
    pub students_without_final_grade: Vec<StudentRef>,
}

impl PendencyReport {
    /// Derive the report from a loaded class and its computed grades.
    pub(crate) fn from_sheet(sheet: &ClassSheet, report: &ClassReport) -> Self {
        let pending_components: Vec<PendingComponent> = sheet
            .components
            .iter()
            .filter_map(|component| {
                let missing_count = sheet
                    .rows
                    .iter()
                    .filter(|row| !row.values.contains_key(&component.id))
                    .count();
                (missing_count > 0).then(|| PendingComponent {
                    short_code: component.short_code.clone(),
                    missing_count,
                })
            })
            .collect();

        let students_without_final_grade: Vec<StudentRef> = report
            .students
            .iter()
            .filter(|student| student.final_grade.is_none())
            .map(|student| StudentRef {
                id: student.student_id,
                enrollment_id: student.enrollment_id,
                name: student.student_name.clone(),
            })
            .collect();

        Self {
            has_pendencies: !pending_components.is_empty()
                || !students_without_final_grade.is_empty(),
            pending_components,
            students_without_final_grade,
        }
    }
}

impl<S: GradebookStore> Gradebook<S> {
    /// Missing grades of a class.
    ///
    /// A class without enrollments has no pendencies.
    pub fn compute_pendencies(
        &self,
        actor: &ActorContext,
        discipline_id: DisciplineId,
        class_id: ClassId,
    ) -> Result<PendencyReport, GradebookError> {
        let sheet = self.load_sheet(actor, discipline_id, class_id)?;
        let report = class_report(&sheet);
        Ok(PendencyReport::from_sheet(&sheet, &report))
    }

    /// The class report, only when nothing is pending.
    ///
    /// # Errors
    ///
    /// - `PendingGrades` carrying the pendency report while grades are missing
    /// - `NotFound` as for `compute_for_class`
    pub fn export_report(
        &self,
        actor: &ActorContext,
        discipline_id: DisciplineId,
        class_id: ClassId,
    ) -> Result<ClassReport, GradebookError> {
        let sheet = self.load_sheet(actor, discipline_id, class_id)?;
        let report = class_report(&sheet);
        let pendencies = PendencyReport::from_sheet(&sheet, &report);
        if pendencies.has_pendencies {
            tracing::info!(
                class_id = %class_id,
                pending_components = pendencies.pending_components.len(),
                pending_students = pendencies.students_without_final_grade.len(),
                "export refused: grades are pending"
            );
            return Err(GradebookError::PendingGrades(Box::new(pendencies)));
        }
        Ok(report)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::{
        AssessmentComponent, Class, ComponentId, Discipline, Enrollment, ProfessorId, Student,
    };
    use chrono::NaiveDate;

    const OWNER: ActorContext = ActorContext::new(ProfessorId(1));

    fn seeded(students: u64) -> Gradebook {
        let mut book = Gradebook::in_memory();
        let store = book.store_mut();
        store
            .put_discipline(Discipline {
                id: DisciplineId(1),
                name: "Algebra".into(),
                code: None,
                formula: "SIMPLE".into(),
                adjusted_enabled: false,
            })
            .expect("discipline");
        for (id, code) in [(1, "P1"), (2, "P2")] {
            store
                .put_component(AssessmentComponent {
                    id: ComponentId(id),
                    discipline_id: DisciplineId(1),
                    name: code.into(),
                    short_code: code.into(),
                })
                .expect("component");
        }
        store
            .put_class(Class {
                id: ClassId(1),
                discipline_id: DisciplineId(1),
                owner: ProfessorId(1),
                name: "A".into(),
            })
            .expect("class");
        for id in 1..=students {
            store
                .put_student(Student {
                    id: StudentId(id),
                    name: format!("Student {:02}", id),
                })
                .expect("student");
            store
                .put_enrollment(Enrollment {
                    id: EnrollmentId(id),
                    student_id: StudentId(id),
                    class_id: ClassId(1),
                    enrolled_on: NaiveDate::from_ymd_opt(2024, 3, 1).expect("date"),
                    manual_adjusted: None,
                })
                .expect("enrollment");
        }
        book
    }

    #[test]
    fn empty_class_has_no_pendencies() {
        let book = seeded(0);
        let report = book
            .compute_pendencies(&OWNER, DisciplineId(1), ClassId(1))
            .expect("pendencies");
        assert_eq!(report, PendencyReport::default());
        assert!(book.export_report(&OWNER, DisciplineId(1), ClassId(1)).is_ok());
    }

    #[test]
    fn missing_grade_blocks_export() {
        let mut book = seeded(2);
        for enrollment in 1..=2 {
            book.upsert_grade(&OWNER, EnrollmentId(enrollment), ComponentId(1), Some(7.0))
                .expect("upsert");
        }
        book.upsert_grade(&OWNER, EnrollmentId(1), ComponentId(2), Some(8.0))
            .expect("upsert");

        let report = book
            .compute_pendencies(&OWNER, DisciplineId(1), ClassId(1))
            .expect("pendencies");
        assert!(report.has_pendencies);
        assert_eq!(
            report.pending_components,
            vec![PendingComponent {
                short_code: "P2".into(),
                missing_count: 1
            }]
        );
        assert_eq!(report.students_without_final_grade.len(), 1);
        assert_eq!(report.students_without_final_grade[0].id, StudentId(2));

        match book.export_report(&OWNER, DisciplineId(1), ClassId(1)) {
            Err(GradebookError::PendingGrades(payload)) => assert_eq!(*payload, report),
            other => panic!("expected pending grades, got {:?}", other),
        }
    }

    #[test]
    fn complete_class_exports() {
        let mut book = seeded(1);
        book.upsert_grade(&OWNER, EnrollmentId(1), ComponentId(1), Some(7.0))
            .expect("upsert");
        book.upsert_grade(&OWNER, EnrollmentId(1), ComponentId(2), Some(8.0))
            .expect("upsert");

        let report = book
            .export_report(&OWNER, DisciplineId(1), ClassId(1))
            .expect("export");
        assert_eq!(report.students.len(), 1);
        assert_eq!(
            report.students[0].final_grade.map(|g| g.hundredths()),
            Some(750)
        );
    }

    #[test]
    fn malformed_policy_marks_every_student_pending() {
        let mut book = seeded(1);
        let mut discipline = book
            .store()
            .discipline(DisciplineId(1))
            .expect("read")
            .expect("discipline");
        discipline.formula = "WEIGHTED:[1]".into();
        book.store_mut().put_discipline(discipline).expect("put");
        for component in 1..=2 {
            book.upsert_grade(&OWNER, EnrollmentId(1), ComponentId(component), Some(5.0))
                .expect("upsert");
        }

        let report = book
            .compute_pendencies(&OWNER, DisciplineId(1), ClassId(1))
            .expect("pendencies");
        assert!(report.pending_components.is_empty());
        assert!(report.has_pendencies);
        assert_eq!(report.students_without_final_grade.len(), 1);
    }
}

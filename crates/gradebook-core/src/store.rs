//! # Gradebook Store
//!
//! The persistence boundary of the gradebook CORE.
//!
//! This module defines the `GradebookStore` trait and its in-memory
//! implementation. The redb-backed implementation lives in `storage`.
//! All data structures use `BTreeMap` for deterministic ordering.

use crate::primitives::MAX_SHORT_CODE_LENGTH;
use crate::{
    AssessmentComponent, AuditEntry, AuditEntryId, Class, ClassId, ComponentId, Discipline,
    DisciplineId, Enrollment, EnrollmentId, Grade, GradeEntry, GradeEntryId, GradebookError,
    ProfessorId, Student, StudentId,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

// =============================================================================
// GRADE WRITES
// =============================================================================

/// A requested change to one (enrollment, component) grade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradeWrite {
    pub enrollment_id: EnrollmentId,
    pub component_id: ComponentId,
    /// `None` clears the grade.
    pub value: Option<Grade>,
    pub actor: ProfessorId,
    pub at: DateTime<Utc>,
}

/// What a grade write did to the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradeChangeKind {
    /// A new row was inserted.
    Created,
    /// An existing row received a value.
    Updated,
    /// An existing row had its value removed.
    Cleared,
}

/// The outcome of an applied grade write, handed to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradeChange {
    /// The row as stored after the write.
    pub entry: GradeEntry,
    /// The value before the write (`None` for new rows and empty rows).
    pub previous: Option<Grade>,
    pub kind: GradeChangeKind,
    pub actor: ProfessorId,
    pub at: DateTime<Utc>,
}

/// Apply a write to the current row, if any.
///
/// Returns `None` when the write is a no-op: clearing a grade that was
/// never recorded creates no row. `allocate` is only called when a new
/// row is needed.
pub fn apply_write(
    existing: Option<GradeEntry>,
    write: &GradeWrite,
    allocate: impl FnOnce() -> GradeEntryId,
) -> Option<GradeChange> {
    match (existing, write.value) {
        (None, None) => None,
        (None, Some(value)) => Some(GradeChange {
            entry: GradeEntry {
                id: allocate(),
                component_id: write.component_id,
                enrollment_id: write.enrollment_id,
                value: Some(value),
                entered_at: write.at,
                entered_by: write.actor,
            },
            previous: None,
            kind: GradeChangeKind::Created,
            actor: write.actor,
            at: write.at,
        }),
        (Some(mut entry), value) => {
            let previous = entry.value;
            entry.value = value;
            let kind = if value.is_some() {
                GradeChangeKind::Updated
            } else {
                GradeChangeKind::Cleared
            };
            Some(GradeChange {
                entry,
                previous,
                kind,
                actor: write.actor,
                at: write.at,
            })
        }
    }
}

/// Reject empty/oversized short codes and codes already used by another
/// component of the same discipline.
pub fn check_component<'a>(
    component: &AssessmentComponent,
    existing: impl IntoIterator<Item = &'a AssessmentComponent>,
) -> Result<(), GradebookError> {
    let code = component.short_code.trim();
    if code.is_empty() || code.len() > MAX_SHORT_CODE_LENGTH {
        return Err(GradebookError::InvalidShortCode(
            component.short_code.clone(),
        ));
    }
    let duplicate = existing.into_iter().any(|other| {
        other.id != component.id
            && other.discipline_id == component.discipline_id
            && other.short_code == component.short_code
    });
    if duplicate {
        return Err(GradebookError::DuplicateShortCode(
            component.short_code.clone(),
        ));
    }
    Ok(())
}

// =============================================================================
// GRADEBOOKSTORE TRAIT
// =============================================================================

/// The GradebookStore trait defines every read and write the CORE needs.
///
/// The catalog writers (`put_*`) stand in for the external repositories
/// that own institutions, disciplines, classes and students; the CORE
/// itself only reads the catalog, except for the adjusted-grade fields
/// and the averaging formula.
///
/// All fallible operations return `Result<T, GradebookError>` to support
/// both in-memory and persistent storage backends uniformly.
pub trait GradebookStore {
    /// Insert or replace a discipline.
    fn put_discipline(&mut self, discipline: Discipline) -> Result<(), GradebookError>;

    fn discipline(&self, id: DisciplineId) -> Result<Option<Discipline>, GradebookError>;

    /// Insert or replace a component.
    /// Fails with `DuplicateShortCode` if another component of the same
    /// discipline already uses the short code.
    fn put_component(&mut self, component: AssessmentComponent) -> Result<(), GradebookError>;

    fn component(&self, id: ComponentId) -> Result<Option<AssessmentComponent>, GradebookError>;

    /// Components of a discipline, ordered by id.
    fn components_of(
        &self,
        discipline: DisciplineId,
    ) -> Result<Vec<AssessmentComponent>, GradebookError>;

    fn put_class(&mut self, class: Class) -> Result<(), GradebookError>;

    fn class(&self, id: ClassId) -> Result<Option<Class>, GradebookError>;

    fn put_student(&mut self, student: Student) -> Result<(), GradebookError>;

    fn student(&self, id: StudentId) -> Result<Option<Student>, GradebookError>;

    /// Insert or replace an enrollment (also used to store manual adjusted grades).
    fn put_enrollment(&mut self, enrollment: Enrollment) -> Result<(), GradebookError>;

    fn enrollment(&self, id: EnrollmentId) -> Result<Option<Enrollment>, GradebookError>;

    /// Enrollments of a class, ordered by id.
    fn enrollments_of(&self, class: ClassId) -> Result<Vec<Enrollment>, GradebookError>;

    /// The grade row of an (enrollment, component) pair.
    fn grade_entry(
        &self,
        enrollment: EnrollmentId,
        component: ComponentId,
    ) -> Result<Option<GradeEntry>, GradebookError>;

    /// Every grade row of an enrollment, ordered by component id.
    fn grade_entries_of(&self, enrollment: EnrollmentId) -> Result<Vec<GradeEntry>, GradebookError>;

    /// Apply a grade write as one atomic read-modify-write.
    ///
    /// Returns `None` if the write was a no-op.
    fn write_grade(&mut self, write: GradeWrite) -> Result<Option<GradeChange>, GradebookError>;

    /// Append an audit row to a grade entry.
    fn append_audit(
        &mut self,
        grade_entry: GradeEntryId,
        message: String,
        at: DateTime<Utc>,
    ) -> Result<AuditEntry, GradebookError>;

    /// Audit rows of a grade entry, ordered by id.
    fn audit_of(&self, grade_entry: GradeEntryId) -> Result<Vec<AuditEntry>, GradebookError>;
}

// =============================================================================
// IN-MEMORY IMPLEMENTATION
// =============================================================================

/// In-memory store.
///
/// Uses `BTreeMap` exclusively for deterministic ordering.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    disciplines: BTreeMap<DisciplineId, Discipline>,
    components: BTreeMap<ComponentId, AssessmentComponent>,
    classes: BTreeMap<ClassId, Class>,
    students: BTreeMap<StudentId, Student>,
    enrollments: BTreeMap<EnrollmentId, Enrollment>,
    entries: BTreeMap<GradeEntryId, GradeEntry>,
    /// (enrollment, component) -> entry
    entry_index: BTreeMap<(EnrollmentId, ComponentId), GradeEntryId>,
    audit: BTreeMap<AuditEntryId, AuditEntry>,
    next_entry_id: u64,
    next_audit_id: u64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            disciplines: BTreeMap::new(),
            components: BTreeMap::new(),
            classes: BTreeMap::new(),
            students: BTreeMap::new(),
            enrollments: BTreeMap::new(),
            entries: BTreeMap::new(),
            entry_index: BTreeMap::new(),
            audit: BTreeMap::new(),
            next_entry_id: 1,
            next_audit_id: 1,
        }
    }
}

impl MemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored grade rows.
    #[must_use]
    pub fn grade_entry_count(&self) -> usize {
        self.entries.len()
    }
}

impl GradebookStore for MemoryStore {
    fn put_discipline(&mut self, discipline: Discipline) -> Result<(), GradebookError> {
        self.disciplines.insert(discipline.id, discipline);
        Ok(())
    }

    fn discipline(&self, id: DisciplineId) -> Result<Option<Discipline>, GradebookError> {
        Ok(self.disciplines.get(&id).cloned())
    }

    fn put_component(&mut self, component: AssessmentComponent) -> Result<(), GradebookError> {
        check_component(&component, self.components.values())?;
        self.components.insert(component.id, component);
        Ok(())
    }

    fn component(&self, id: ComponentId) -> Result<Option<AssessmentComponent>, GradebookError> {
        Ok(self.components.get(&id).cloned())
    }

    fn components_of(
        &self,
        discipline: DisciplineId,
    ) -> Result<Vec<AssessmentComponent>, GradebookError> {
        Ok(self
            .components
            .values()
            .filter(|c| c.discipline_id == discipline)
            .cloned()
            .collect())
    }

    fn put_class(&mut self, class: Class) -> Result<(), GradebookError> {
        self.classes.insert(class.id, class);
        Ok(())
    }

    fn class(&self, id: ClassId) -> Result<Option<Class>, GradebookError> {
        Ok(self.classes.get(&id).cloned())
    }

    fn put_student(&mut self, student: Student) -> Result<(), GradebookError> {
        self.students.insert(student.id, student);
        Ok(())
    }

    fn student(&self, id: StudentId) -> Result<Option<Student>, GradebookError> {
        Ok(self.students.get(&id).cloned())
    }

    fn put_enrollment(&mut self, enrollment: Enrollment) -> Result<(), GradebookError> {
        self.enrollments.insert(enrollment.id, enrollment);
        Ok(())
    }

    fn enrollment(&self, id: EnrollmentId) -> Result<Option<Enrollment>, GradebookError> {
        Ok(self.enrollments.get(&id).cloned())
    }

    fn enrollments_of(&self, class: ClassId) -> Result<Vec<Enrollment>, GradebookError> {
        Ok(self
            .enrollments
            .values()
            .filter(|e| e.class_id == class)
            .cloned()
            .collect())
    }

    fn grade_entry(
        &self,
        enrollment: EnrollmentId,
        component: ComponentId,
    ) -> Result<Option<GradeEntry>, GradebookError> {
        Ok(self
            .entry_index
            .get(&(enrollment, component))
            .and_then(|id| self.entries.get(id))
            .cloned())
    }

    fn grade_entries_of(&self, enrollment: EnrollmentId) -> Result<Vec<GradeEntry>, GradebookError> {
        Ok(self
            .entry_index
            .range((enrollment, ComponentId(0))..=(enrollment, ComponentId(u64::MAX)))
            .filter_map(|(_, id)| self.entries.get(id).cloned())
            .collect())
    }

    fn write_grade(&mut self, write: GradeWrite) -> Result<Option<GradeChange>, GradebookError> {
        let existing = self.grade_entry(write.enrollment_id, write.component_id)?;
        let next_id = self.next_entry_id;
        let change = apply_write(existing, &write, || GradeEntryId(next_id));

        if let Some(change) = &change {
            if change.kind == GradeChangeKind::Created {
                self.next_entry_id = self.next_entry_id.saturating_add(1);
                self.entry_index
                    .insert((write.enrollment_id, write.component_id), change.entry.id);
            }
            self.entries.insert(change.entry.id, change.entry.clone());
        }
        Ok(change)
    }

    fn append_audit(
        &mut self,
        grade_entry: GradeEntryId,
        message: String,
        at: DateTime<Utc>,
    ) -> Result<AuditEntry, GradebookError> {
        if !self.entries.contains_key(&grade_entry) {
            return Err(GradebookError::NotFound("Grade entry"));
        }
        let entry = AuditEntry {
            id: AuditEntryId(self.next_audit_id),
            grade_entry_id: grade_entry,
            message,
            timestamp: at,
        };
        self.next_audit_id = self.next_audit_id.saturating_add(1);
        self.audit.insert(entry.id, entry.clone());
        Ok(entry)
    }

    fn audit_of(&self, grade_entry: GradeEntryId) -> Result<Vec<AuditEntry>, GradebookError> {
        Ok(self
            .audit
            .values()
            .filter(|a| a.grade_entry_id == grade_entry)
            .cloned()
            .collect())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn write(enrollment: u64, component: u64, value: Option<u16>) -> GradeWrite {
        GradeWrite {
            enrollment_id: EnrollmentId(enrollment),
            component_id: ComponentId(component),
            value: value.and_then(Grade::from_hundredths),
            actor: ProfessorId(1),
            at: Utc::now(),
        }
    }

    fn component(id: u64, discipline: u64, code: &str) -> AssessmentComponent {
        AssessmentComponent {
            id: ComponentId(id),
            discipline_id: DisciplineId(discipline),
            name: code.to_string(),
            short_code: code.to_string(),
        }
    }

    #[test]
    fn clearing_missing_row_is_noop() {
        let mut store = MemoryStore::new();
        let change = store.write_grade(write(1, 1, None)).expect("write");
        assert!(change.is_none());
        assert_eq!(store.grade_entry_count(), 0);
    }

    #[test]
    fn first_write_creates_then_updates() {
        let mut store = MemoryStore::new();

        let created = store
            .write_grade(write(1, 1, Some(700)))
            .expect("write")
            .expect("change");
        assert_eq!(created.kind, GradeChangeKind::Created);
        assert_eq!(created.previous, None);

        let updated = store
            .write_grade(write(1, 1, Some(850)))
            .expect("write")
            .expect("change");
        assert_eq!(updated.kind, GradeChangeKind::Updated);
        assert_eq!(updated.entry.id, created.entry.id);
        assert_eq!(updated.previous, Grade::from_hundredths(700));
        assert_eq!(store.grade_entry_count(), 1);
    }

    #[test]
    fn clearing_keeps_the_row() {
        let mut store = MemoryStore::new();
        store.write_grade(write(1, 1, Some(700))).expect("write");

        let cleared = store
            .write_grade(write(1, 1, None))
            .expect("write")
            .expect("change");
        assert_eq!(cleared.kind, GradeChangeKind::Cleared);

        let row = store
            .grade_entry(EnrollmentId(1), ComponentId(1))
            .expect("read")
            .expect("row kept");
        assert_eq!(row.value, None);
    }

    #[test]
    fn entries_of_enrollment_are_scoped() {
        let mut store = MemoryStore::new();
        store.write_grade(write(1, 2, Some(100))).expect("write");
        store.write_grade(write(1, 1, Some(200))).expect("write");
        store.write_grade(write(2, 1, Some(300))).expect("write");

        let entries = store.grade_entries_of(EnrollmentId(1)).expect("read");
        let components: Vec<_> = entries.iter().map(|e| e.component_id).collect();
        assert_eq!(components, vec![ComponentId(1), ComponentId(2)]);
    }

    #[test]
    fn duplicate_short_code_rejected() {
        let mut store = MemoryStore::new();
        store.put_component(component(1, 1, "P1")).expect("put");
        store.put_component(component(2, 2, "P1")).expect("other discipline");

        let result = store.put_component(component(3, 1, "P1"));
        assert!(matches!(result, Err(GradebookError::DuplicateShortCode(_))));

        // Re-putting the same component is an update, not a duplicate.
        store.put_component(component(1, 1, "P1")).expect("update");
    }

    #[test]
    fn empty_short_code_rejected() {
        let mut store = MemoryStore::new();
        let result = store.put_component(component(1, 1, "  "));
        assert!(matches!(result, Err(GradebookError::InvalidShortCode(_))));
    }

    #[test]
    fn audit_requires_existing_entry() {
        let mut store = MemoryStore::new();
        let result = store.append_audit(GradeEntryId(9), "x".into(), Utc::now());
        assert!(matches!(result, Err(GradebookError::NotFound(_))));
    }
}

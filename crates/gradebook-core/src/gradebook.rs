//! # Gradebook Module
//!
//! The facade every outer layer talks to.
//!
//! A `Gradebook` combines a `GradebookStore` with the observers notified
//! after each grade write. The grading operations themselves live next to
//! their logic (`entry`, `calculator`, `pendency`, `audit`) as `impl`
//! blocks on `Gradebook`.
//!
//! ## Storage Backends
//!
//! - `InMemory`: Uses `MemoryStore` (fast, volatile)
//! - `Persistent`: Uses `RedbStore` for disk-backed ACID storage
//!
//! ## Ownership
//!
//! Every operation receives an `ActorContext`. Records reached through a
//! class the actor does not own are reported exactly like missing records.

use crate::audit::{AuditTrail, GradeObserver};
use crate::storage::RedbStore;
use crate::store::{GradeChange, GradeWrite, GradebookStore, MemoryStore};
use crate::{
    ActorContext, AssessmentComponent, AuditEntry, Class, ClassId, ComponentId, Discipline,
    DisciplineId, Enrollment, EnrollmentId, Grade, GradeEntry, GradeEntryId, GradebookError,
    Student, StudentId,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::Path;

// =============================================================================
// STORAGE BACKEND
// =============================================================================

/// Storage backend for a Gradebook.
#[derive(Debug)]
pub enum StorageBackend {
    /// In-memory store (fast, volatile).
    InMemory(MemoryStore),
    /// Disk-backed store using redb (ACID, persistent).
    Persistent(RedbStore),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(MemoryStore::new())
    }
}

impl StorageBackend {
    /// Returns true if using persistent storage.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::Persistent(_))
    }
}

macro_rules! dispatch {
    ($self:ident, $store:ident => $call:expr) => {
        match $self {
            StorageBackend::InMemory($store) => $call,
            StorageBackend::Persistent($store) => $call,
        }
    };
}

impl GradebookStore for StorageBackend {
    fn put_discipline(&mut self, discipline: Discipline) -> Result<(), GradebookError> {
        dispatch!(self, s => s.put_discipline(discipline))
    }

    fn discipline(&self, id: DisciplineId) -> Result<Option<Discipline>, GradebookError> {
        dispatch!(self, s => s.discipline(id))
    }

    fn put_component(&mut self, component: AssessmentComponent) -> Result<(), GradebookError> {
        dispatch!(self, s => s.put_component(component))
    }

    fn component(&self, id: ComponentId) -> Result<Option<AssessmentComponent>, GradebookError> {
        dispatch!(self, s => s.component(id))
    }

    fn components_of(
        &self,
        discipline: DisciplineId,
    ) -> Result<Vec<AssessmentComponent>, GradebookError> {
        dispatch!(self, s => s.components_of(discipline))
    }

    fn put_class(&mut self, class: Class) -> Result<(), GradebookError> {
        dispatch!(self, s => s.put_class(class))
    }

    fn class(&self, id: ClassId) -> Result<Option<Class>, GradebookError> {
        dispatch!(self, s => s.class(id))
    }

    fn put_student(&mut self, student: Student) -> Result<(), GradebookError> {
        dispatch!(self, s => s.put_student(student))
    }

    fn student(&self, id: StudentId) -> Result<Option<Student>, GradebookError> {
        dispatch!(self, s => s.student(id))
    }

    fn put_enrollment(&mut self, enrollment: Enrollment) -> Result<(), GradebookError> {
        dispatch!(self, s => s.put_enrollment(enrollment))
    }

    fn enrollment(&self, id: EnrollmentId) -> Result<Option<Enrollment>, GradebookError> {
        dispatch!(self, s => s.enrollment(id))
    }

    fn enrollments_of(&self, class: ClassId) -> Result<Vec<Enrollment>, GradebookError> {
        dispatch!(self, s => s.enrollments_of(class))
    }

    fn grade_entry(
        &self,
        enrollment: EnrollmentId,
        component: ComponentId,
    ) -> Result<Option<GradeEntry>, GradebookError> {
        dispatch!(self, s => s.grade_entry(enrollment, component))
    }

    fn grade_entries_of(&self, enrollment: EnrollmentId) -> Result<Vec<GradeEntry>, GradebookError> {
        dispatch!(self, s => s.grade_entries_of(enrollment))
    }

    fn write_grade(&mut self, write: GradeWrite) -> Result<Option<GradeChange>, GradebookError> {
        dispatch!(self, s => s.write_grade(write))
    }

    fn append_audit(
        &mut self,
        grade_entry: GradeEntryId,
        message: String,
        at: DateTime<Utc>,
    ) -> Result<AuditEntry, GradebookError> {
        dispatch!(self, s => s.append_audit(grade_entry, message, at))
    }

    fn audit_of(&self, grade_entry: GradeEntryId) -> Result<Vec<AuditEntry>, GradebookError> {
        dispatch!(self, s => s.audit_of(grade_entry))
    }
}

// =============================================================================
// CLASS SHEET
// =============================================================================

/// One enrollment of a loaded class.
#[derive(Debug, Clone)]
pub(crate) struct SheetRow {
    pub enrollment: Enrollment,
    pub student_name: String,
    /// Non-null values of the discipline's components.
    pub values: BTreeMap<ComponentId, Grade>,
}

/// Everything needed to compute final grades and pendencies of a class,
/// read once from storage.
#[derive(Debug, Clone)]
pub(crate) struct ClassSheet {
    pub discipline: Discipline,
    pub class: Class,
    pub components: Vec<AssessmentComponent>,
    /// Ordered by student name, then enrollment id.
    pub rows: Vec<SheetRow>,
}

// =============================================================================
// GRADEBOOK
// =============================================================================

/// The grading engine over a store.
pub struct Gradebook<S = StorageBackend> {
    pub(crate) store: S,
    observers: Vec<Box<dyn GradeObserver>>,
}

impl<S: std::fmt::Debug> std::fmt::Debug for Gradebook<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gradebook")
            .field("store", &self.store)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Default for Gradebook<StorageBackend> {
    fn default() -> Self {
        Self::new(StorageBackend::default())
    }
}

impl Gradebook<StorageBackend> {
    /// Create a gradebook with in-memory storage.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Create a gradebook with persistent redb storage.
    ///
    /// Opens or creates a redb database at the given path.
    pub fn with_redb(path: impl AsRef<Path>) -> Result<Self, GradebookError> {
        let store = RedbStore::open(path)?;
        Ok(Self::new(StorageBackend::Persistent(store)))
    }

    /// Returns true if using persistent storage.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.store.is_persistent()
    }
}

impl<S: GradebookStore> Gradebook<S> {
    /// Create a gradebook over `store` with the audit trail attached.
    pub fn new(store: S) -> Self {
        Self {
            store,
            observers: vec![Box::new(AuditTrail)],
        }
    }

    /// Create a gradebook without any observer.
    pub fn without_observers(store: S) -> Self {
        Self {
            store,
            observers: Vec::new(),
        }
    }

    /// Attach another observer; observers run in attachment order.
    pub fn add_observer(&mut self, observer: Box<dyn GradeObserver>) {
        self.observers.push(observer);
    }

    /// Read access to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Write access to the underlying store, for the catalog writers.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Run every observer on an applied change.
    ///
    /// The grade is already committed, so an observer error is logged and
    /// the remaining observers still run.
    pub(crate) fn notify(&mut self, change: &GradeChange) {
        for observer in &self.observers {
            if let Err(e) = observer.on_grade_written(change, &mut self.store) {
                tracing::error!(
                    grade_entry_id = %change.entry.id,
                    code = e.code(),
                    error = %e,
                    "grade observer failed"
                );
            }
        }
    }

    // =========================================================================
    // LOOKUPS WITH OWNERSHIP
    // =========================================================================

    pub(crate) fn discipline_or_not_found(
        &self,
        id: DisciplineId,
    ) -> Result<Discipline, GradebookError> {
        self.store
            .discipline(id)?
            .ok_or(GradebookError::NotFound("Discipline"))
    }

    /// The class, if it exists and is owned by the actor.
    pub(crate) fn owned_class(
        &self,
        actor: &ActorContext,
        id: ClassId,
    ) -> Result<Class, GradebookError> {
        self.store
            .class(id)?
            .filter(|class| class.owner == actor.professor)
            .ok_or(GradebookError::NotFound("Class"))
    }

    /// The enrollment and its class, if the actor owns the class.
    pub(crate) fn owned_enrollment(
        &self,
        actor: &ActorContext,
        id: EnrollmentId,
    ) -> Result<(Enrollment, Class), GradebookError> {
        let enrollment = self
            .store
            .enrollment(id)?
            .ok_or(GradebookError::NotFound("Enrollment"))?;
        let class = self
            .store
            .class(enrollment.class_id)?
            .filter(|class| class.owner == actor.professor)
            .ok_or(GradebookError::NotFound("Enrollment"))?;
        Ok((enrollment, class))
    }

    /// The component, if it belongs to the discipline of `class`.
    pub(crate) fn class_component(
        &self,
        class: &Class,
        id: ComponentId,
    ) -> Result<AssessmentComponent, GradebookError> {
        self.store
            .component(id)?
            .filter(|component| component.discipline_id == class.discipline_id)
            .ok_or(GradebookError::NotFound("Component"))
    }

    pub(crate) fn student_name(&self, id: StudentId) -> Result<String, GradebookError> {
        Ok(self
            .store
            .student(id)?
            .map(|student| student.name)
            .unwrap_or_else(|| format!("Student {}", id)))
    }

    /// Load a class of a discipline with every enrollment and grade.
    ///
    /// The class must be owned by the actor and belong to the discipline.
    pub(crate) fn load_sheet(
        &self,
        actor: &ActorContext,
        discipline_id: DisciplineId,
        class_id: ClassId,
    ) -> Result<ClassSheet, GradebookError> {
        let discipline = self.discipline_or_not_found(discipline_id)?;
        let class = self.owned_class(actor, class_id)?;
        if class.discipline_id != discipline_id {
            return Err(GradebookError::NotFound("Class"));
        }
        let components = self.store.components_of(discipline_id)?;

        let mut rows = Vec::new();
        for enrollment in self.store.enrollments_of(class_id)? {
            let values = self
                .store
                .grade_entries_of(enrollment.id)?
                .into_iter()
                .filter(|entry| components.iter().any(|c| c.id == entry.component_id))
                .filter_map(|entry| entry.value.map(|value| (entry.component_id, value)))
                .collect();
            rows.push(SheetRow {
                student_name: self.student_name(enrollment.student_id)?,
                enrollment,
                values,
            });
        }
        rows.sort_by(|a, b| {
            a.student_name
                .cmp(&b.student_name)
                .then(a.enrollment.id.cmp(&b.enrollment.id))
        });

        Ok(ClassSheet {
            discipline,
            class,
            components,
            rows,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

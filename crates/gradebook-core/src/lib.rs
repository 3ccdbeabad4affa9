//! # gradebook-core
//!
//! The deterministic grading engine - THE LOGIC.
//!
//! This crate records assessment grades per enrollment, computes final
//! grades under a simple or weighted averaging policy, derives the
//! half-point adjusted grade, and gates report export on completeness.
//!
//! ## Architectural Constraints
//!
//! The CORE:
//! - Has NO async, NO network dependencies (pure Rust)
//! - Stores and computes grades as integers; floats exist only at the boundary
//! - Receives the acting professor explicitly in every operation
//! - Never produces a partial average: incomplete grades yield `None`
//!
//! ## Example
//!
//! ```
//! use gradebook_core::{ActorContext, AssessmentComponent, Class, ClassId, ComponentId,
//!     Discipline, DisciplineId, Enrollment, EnrollmentId, Gradebook, GradebookStore,
//!     ProfessorId, Student, StudentId};
//!
//! let mut book = Gradebook::in_memory();
//! let actor = ActorContext::new(ProfessorId(1));
//! let store = book.store_mut();
//! store.put_discipline(Discipline {
//!     id: DisciplineId(1),
//!     name: "Algebra".into(),
//!     code: None,
//!     formula: "SIMPLE".into(),
//!     adjusted_enabled: true,
//! })?;
//! store.put_component(AssessmentComponent {
//!     id: ComponentId(1),
//!     discipline_id: DisciplineId(1),
//!     name: "Test 1".into(),
//!     short_code: "P1".into(),
//! })?;
//! store.put_class(Class {
//!     id: ClassId(1),
//!     discipline_id: DisciplineId(1),
//!     owner: ProfessorId(1),
//!     name: "Morning".into(),
//! })?;
//! store.put_student(Student { id: StudentId(1), name: "Ana".into() })?;
//! store.put_enrollment(Enrollment {
//!     id: EnrollmentId(1),
//!     student_id: StudentId(1),
//!     class_id: ClassId(1),
//!     enrolled_on: chrono::NaiveDate::default(),
//!     manual_adjusted: None,
//! })?;
//!
//! book.upsert_grade(&actor, EnrollmentId(1), ComponentId(1), Some(7.25))?;
//! let report = book.compute_for_class(&actor, DisciplineId(1), ClassId(1))?;
//! assert_eq!(report.students[0].final_grade.map(|g| g.to_string()), Some("7.25".into()));
//! assert_eq!(report.students[0].adjusted_final_grade.map(|g| g.to_string()), Some("7.0".into()));
//! # Ok::<(), gradebook_core::GradebookError>(())
//! ```

// =============================================================================
// MODULES
// =============================================================================

pub mod audit;
pub mod calculator;
pub mod entry;
pub mod gradebook;
pub mod pendency;
pub mod policy;
pub mod primitives;
pub mod storage;
pub mod store;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    ActorContext, AssessmentComponent, AuditEntry, AuditEntryId, Class, ClassId, ComponentId,
    Discipline, DisciplineId, Enrollment, EnrollmentId, ErrorCategory, Grade, GradeEntry,
    GradeEntryId, GradebookError, HalfGrade, ProfessorId, Student, StudentId, round2dp,
};

// =============================================================================
// RE-EXPORTS: Grading Engine
// =============================================================================

pub use audit::{AuditTrail, AuditView, GradeObserver};
pub use calculator::{
    AdjustedMode, ClassReport, FinalGradeCalculator, Mean, StudentFinalGrade, adjust_grade,
    resolve_adjusted,
};
pub use entry::{BulkItem, BulkItemError, BulkOutcome, GradeGrid, GridRow};
pub use gradebook::{Gradebook, StorageBackend};
pub use pendency::{PendencyReport, PendingComponent, StudentRef};
pub use policy::{AveragingPolicy, Weight, Weights};
pub use storage::RedbStore;
pub use store::{GradeChange, GradeChangeKind, GradeWrite, GradebookStore, MemoryStore};

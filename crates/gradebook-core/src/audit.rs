//! # Audit Trail
//!
//! Grade writes are observed, not hidden in storage.
//!
//! After every applied grade write the gradebook calls each attached
//! `GradeObserver` with the change. `AuditTrail`, attached by default,
//! appends a displayable history row to the written grade entry. No row is
//! written for a no-op clear.

use crate::gradebook::Gradebook;
use crate::store::{GradeChange, GradeChangeKind, GradebookStore};
use crate::{ActorContext, AuditEntryId, ClassId, GradebookError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Extension point notified after each applied grade write.
///
/// Observers run synchronously, in attachment order, after the write has
/// committed. An observer error is logged and does not fail the write.
pub trait GradeObserver: Send + Sync {
    fn on_grade_written(
        &self,
        change: &GradeChange,
        store: &mut dyn GradebookStore,
    ) -> Result<(), GradebookError>;
}

/// Appends an `AuditEntry` for every grade write.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditTrail;

impl AuditTrail {
    fn message(change: &GradeChange, component: &str) -> String {
        let entry = &change.entry;
        let previous = change
            .previous
            .map_or_else(|| "empty".to_string(), |g| g.to_string());
        match change.kind {
            GradeChangeKind::Created => format!(
                "{} grade of enrollment {} recorded as {} by professor {}",
                component,
                entry.enrollment_id,
                entry.value.map_or_else(|| "empty".to_string(), |g| g.to_string()),
                change.actor
            ),
            GradeChangeKind::Updated => format!(
                "{} grade of enrollment {} changed from {} to {} by professor {}",
                component,
                entry.enrollment_id,
                previous,
                entry.value.map_or_else(|| "empty".to_string(), |g| g.to_string()),
                change.actor
            ),
            GradeChangeKind::Cleared => format!(
                "{} grade of enrollment {} cleared (was {}) by professor {}",
                component, entry.enrollment_id, previous, change.actor
            ),
        }
    }
}

impl GradeObserver for AuditTrail {
    fn on_grade_written(
        &self,
        change: &GradeChange,
        store: &mut dyn GradebookStore,
    ) -> Result<(), GradebookError> {
        let component = store
            .component(change.entry.component_id)?
            .map(|c| c.short_code)
            .unwrap_or_else(|| format!("Component {}", change.entry.component_id));
        let message = Self::message(change, &component);
        store.append_audit(change.entry.id, message, change.at)?;
        Ok(())
    }
}

/// One history row as shown to a professor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditView {
    pub id: AuditEntryId,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl<S: GradebookStore> Gradebook<S> {
    /// Grade history of a class, newest first.
    ///
    /// Entries with the same timestamp are ordered by id, newest first.
    pub fn list_audit_by_class(
        &self,
        actor: &ActorContext,
        class_id: ClassId,
    ) -> Result<Vec<AuditView>, GradebookError> {
        self.owned_class(actor, class_id)?;

        let mut views = Vec::new();
        for enrollment in self.store.enrollments_of(class_id)? {
            for entry in self.store.grade_entries_of(enrollment.id)? {
                views.extend(self.store.audit_of(entry.id)?.into_iter().map(|audit| {
                    AuditView {
                        id: audit.id,
                        message: audit.message,
                        timestamp: audit.timestamp,
                    }
                }));
            }
        }
        views.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(views)
    }
}

// =============================================================================
// TESTS
// =============================================================================

//! # redb-backed Gradebook Storage
//!
//! A disk-backed store using the redb embedded database, providing:
//! - ACID transactions
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! Records are encoded with postcard. Every mutation runs in its own write
//! transaction, so a grade write is one atomic read-modify-write.

use crate::store::{
    GradeChange, GradeChangeKind, GradeWrite, GradebookStore, apply_write, check_component,
};
use crate::{
    AssessmentComponent, AuditEntry, AuditEntryId, Class, ClassId, ComponentId, Discipline,
    DisciplineId, Enrollment, EnrollmentId, GradeEntry, GradeEntryId, GradebookError, Student,
    StudentId,
};
use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;

type RecordTable = TableDefinition<'static, u64, &'static [u8]>;

/// Table for disciplines: DisciplineId(u64) -> serialized Discipline
const DISCIPLINES: RecordTable = TableDefinition::new("disciplines");

/// Table for components: ComponentId(u64) -> serialized AssessmentComponent
const COMPONENTS: RecordTable = TableDefinition::new("components");

/// Table for classes: ClassId(u64) -> serialized Class
const CLASSES: RecordTable = TableDefinition::new("classes");

/// Table for students: StudentId(u64) -> serialized Student
const STUDENTS: RecordTable = TableDefinition::new("students");

/// Table for enrollments: EnrollmentId(u64) -> serialized Enrollment
const ENROLLMENTS: RecordTable = TableDefinition::new("enrollments");

/// Table for grade entries: GradeEntryId(u64) -> serialized GradeEntry
const GRADE_ENTRIES: RecordTable = TableDefinition::new("grade_entries");

/// Table for audit rows: AuditEntryId(u64) -> serialized AuditEntry
const AUDIT: RecordTable = TableDefinition::new("audit");

/// Table for the grade index: (enrollment_id, component_id) -> GradeEntryId
const GRADE_INDEX: TableDefinition<(u64, u64), u64> = TableDefinition::new("grade_index");

/// Table for the audit index: (grade_entry_id, audit_id) -> AuditEntryId
const AUDIT_INDEX: TableDefinition<(u64, u64), u64> = TableDefinition::new("audit_index");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const NEXT_GRADE_ENTRY_ID: &str = "next_grade_entry_id";
const NEXT_AUDIT_ID: &str = "next_audit_id";

fn io_error(e: impl std::fmt::Display) -> GradebookError {
    GradebookError::Storage(e.to_string())
}

fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>, GradebookError> {
    postcard::to_allocvec(record).map_err(|e| GradebookError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, GradebookError> {
    postcard::from_bytes(bytes).map_err(|e| GradebookError::Serialization(e.to_string()))
}

/// A disk-backed gradebook store using redb.
pub struct RedbStore {
    /// The redb database handle.
    db: Database,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a gradebook database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GradebookError> {
        let db = Database::create(path.as_ref()).map_err(io_error)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(io_error)?;
            for table in [
                DISCIPLINES,
                COMPONENTS,
                CLASSES,
                STUDENTS,
                ENROLLMENTS,
                GRADE_ENTRIES,
                AUDIT,
            ] {
                let _ = write_txn.open_table(table).map_err(io_error)?;
            }
            for index in [GRADE_INDEX, AUDIT_INDEX] {
                let _ = write_txn.open_table(index).map_err(io_error)?;
            }
            let _ = write_txn.open_table(METADATA).map_err(io_error)?;
            write_txn.commit().map_err(io_error)?;
        }

        tracing::debug!(path = %path.as_ref().display(), "opened gradebook database");
        Ok(Self { db })
    }

    fn get_record<T: DeserializeOwned>(
        &self,
        table: RecordTable,
        id: u64,
    ) -> Result<Option<T>, GradebookError> {
        let read_txn = self.db.begin_read().map_err(io_error)?;
        let table = read_txn.open_table(table).map_err(io_error)?;
        let record = match table.get(id).map_err(io_error)? {
            Some(bytes) => Some(decode(bytes.value())?),
            None => None,
        };
        Ok(record)
    }

    fn put_record<T: Serialize>(
        &self,
        table: RecordTable,
        id: u64,
        record: &T,
    ) -> Result<(), GradebookError> {
        let bytes = encode(record)?;
        let write_txn = self.db.begin_write().map_err(io_error)?;
        {
            let mut table = write_txn.open_table(table).map_err(io_error)?;
            table.insert(id, bytes.as_slice()).map_err(io_error)?;
        }
        write_txn.commit().map_err(io_error)
    }

    /// Every record of a table matching `keep`, in id order.
    fn scan_records<T: DeserializeOwned>(
        &self,
        table: RecordTable,
        keep: impl Fn(&T) -> bool,
    ) -> Result<Vec<T>, GradebookError> {
        let read_txn = self.db.begin_read().map_err(io_error)?;
        let table = read_txn.open_table(table).map_err(io_error)?;
        let mut records = Vec::new();
        for entry in table.iter().map_err(io_error)? {
            let (_, bytes) = entry.map_err(io_error)?;
            let record: T = decode(bytes.value())?;
            if keep(&record) {
                records.push(record);
            }
        }
        Ok(records)
    }
}

impl GradebookStore for RedbStore {
    fn put_discipline(&mut self, discipline: Discipline) -> Result<(), GradebookError> {
        self.put_record(DISCIPLINES, discipline.id.0, &discipline)
    }

    fn discipline(&self, id: DisciplineId) -> Result<Option<Discipline>, GradebookError> {
        self.get_record(DISCIPLINES, id.0)
    }

    fn put_component(&mut self, component: AssessmentComponent) -> Result<(), GradebookError> {
        let bytes = encode(&component)?;
        let write_txn = self.db.begin_write().map_err(io_error)?;
        {
            let mut table = write_txn.open_table(COMPONENTS).map_err(io_error)?;
            let mut existing = Vec::new();
            for entry in table.iter().map_err(io_error)? {
                let (_, value) = entry.map_err(io_error)?;
                existing.push(decode::<AssessmentComponent>(value.value())?);
            }
            check_component(&component, &existing)?;
            table
                .insert(component.id.0, bytes.as_slice())
                .map_err(io_error)?;
        }
        write_txn.commit().map_err(io_error)
    }

    fn component(&self, id: ComponentId) -> Result<Option<AssessmentComponent>, GradebookError> {
        self.get_record(COMPONENTS, id.0)
    }

    fn components_of(
        &self,
        discipline: DisciplineId,
    ) -> Result<Vec<AssessmentComponent>, GradebookError> {
        self.scan_records(COMPONENTS, |c: &AssessmentComponent| {
            c.discipline_id == discipline
        })
    }

    fn put_class(&mut self, class: Class) -> Result<(), GradebookError> {
        self.put_record(CLASSES, class.id.0, &class)
    }

    fn class(&self, id: ClassId) -> Result<Option<Class>, GradebookError> {
        self.get_record(CLASSES, id.0)
    }

    fn put_student(&mut self, student: Student) -> Result<(), GradebookError> {
        self.put_record(STUDENTS, student.id.0, &student)
    }

    fn student(&self, id: StudentId) -> Result<Option<Student>, GradebookError> {
        self.get_record(STUDENTS, id.0)
    }

    fn put_enrollment(&mut self, enrollment: Enrollment) -> Result<(), GradebookError> {
        self.put_record(ENROLLMENTS, enrollment.id.0, &enrollment)
    }

    fn enrollment(&self, id: EnrollmentId) -> Result<Option<Enrollment>, GradebookError> {
        self.get_record(ENROLLMENTS, id.0)
    }

    fn enrollments_of(&self, class: ClassId) -> Result<Vec<Enrollment>, GradebookError> {
        self.scan_records(ENROLLMENTS, |e: &Enrollment| e.class_id == class)
    }

    fn grade_entry(
        &self,
        enrollment: EnrollmentId,
        component: ComponentId,
    ) -> Result<Option<GradeEntry>, GradebookError> {
        let entry_id = {
            let read_txn = self.db.begin_read().map_err(io_error)?;
            let index = read_txn.open_table(GRADE_INDEX).map_err(io_error)?;
            index
                .get((enrollment.0, component.0))
                .map_err(io_error)?
                .map(|v| v.value())
        };
        match entry_id {
            Some(id) => self.get_record(GRADE_ENTRIES, id),
            None => Ok(None),
        }
    }

    fn grade_entries_of(&self, enrollment: EnrollmentId) -> Result<Vec<GradeEntry>, GradebookError> {
        let read_txn = self.db.begin_read().map_err(io_error)?;
        let index = read_txn.open_table(GRADE_INDEX).map_err(io_error)?;
        let entries = read_txn.open_table(GRADE_ENTRIES).map_err(io_error)?;

        let mut result = Vec::new();
        for item in index
            .range((enrollment.0, 0)..=(enrollment.0, u64::MAX))
            .map_err(io_error)?
        {
            let (_, entry_id) = item.map_err(io_error)?;
            if let Some(bytes) = entries.get(entry_id.value()).map_err(io_error)? {
                result.push(decode(bytes.value())?);
            }
        }
        Ok(result)
    }

    fn write_grade(&mut self, write: GradeWrite) -> Result<Option<GradeChange>, GradebookError> {
        let key = (write.enrollment_id.0, write.component_id.0);
        let write_txn = self.db.begin_write().map_err(io_error)?;
        let change = {
            let mut index = write_txn.open_table(GRADE_INDEX).map_err(io_error)?;
            let mut entries = write_txn.open_table(GRADE_ENTRIES).map_err(io_error)?;
            let mut metadata = write_txn.open_table(METADATA).map_err(io_error)?;

            let existing_id = index.get(key).map_err(io_error)?.map(|v| v.value());
            let existing: Option<GradeEntry> = match existing_id {
                Some(id) => match entries.get(id).map_err(io_error)? {
                    Some(bytes) => Some(decode(bytes.value())?),
                    None => None,
                },
                None => None,
            };
            let next_id = metadata
                .get(NEXT_GRADE_ENTRY_ID)
                .map_err(io_error)?
                .map(|v| v.value())
                .unwrap_or(1);

            let change = apply_write(existing, &write, || GradeEntryId(next_id));
            if let Some(change) = &change {
                let bytes = encode(&change.entry)?;
                entries
                    .insert(change.entry.id.0, bytes.as_slice())
                    .map_err(io_error)?;
                if change.kind == GradeChangeKind::Created {
                    index.insert(key, change.entry.id.0).map_err(io_error)?;
                    metadata
                        .insert(NEXT_GRADE_ENTRY_ID, next_id.saturating_add(1))
                        .map_err(io_error)?;
                }
            }
            change
        };
        write_txn.commit().map_err(io_error)?;
        Ok(change)
    }

    fn append_audit(
        &mut self,
        grade_entry: GradeEntryId,
        message: String,
        at: DateTime<Utc>,
    ) -> Result<AuditEntry, GradebookError> {
        let write_txn = self.db.begin_write().map_err(io_error)?;
        let entry = {
            let entries = write_txn.open_table(GRADE_ENTRIES).map_err(io_error)?;
            if entries.get(grade_entry.0).map_err(io_error)?.is_none() {
                return Err(GradebookError::NotFound("Grade entry"));
            }

            let mut metadata = write_txn.open_table(METADATA).map_err(io_error)?;
            let next_id = metadata
                .get(NEXT_AUDIT_ID)
                .map_err(io_error)?
                .map(|v| v.value())
                .unwrap_or(1);
            let entry = AuditEntry {
                id: AuditEntryId(next_id),
                grade_entry_id: grade_entry,
                message,
                timestamp: at,
            };

            let mut audit = write_txn.open_table(AUDIT).map_err(io_error)?;
            audit
                .insert(next_id, encode(&entry)?.as_slice())
                .map_err(io_error)?;
            let mut index = write_txn.open_table(AUDIT_INDEX).map_err(io_error)?;
            index
                .insert((grade_entry.0, next_id), next_id)
                .map_err(io_error)?;
            metadata
                .insert(NEXT_AUDIT_ID, next_id.saturating_add(1))
                .map_err(io_error)?;
            entry
        };
        write_txn.commit().map_err(io_error)?;
        Ok(entry)
    }

    fn audit_of(&self, grade_entry: GradeEntryId) -> Result<Vec<AuditEntry>, GradebookError> {
        let read_txn = self.db.begin_read().map_err(io_error)?;
        let index = read_txn.open_table(AUDIT_INDEX).map_err(io_error)?;
        let audit = read_txn.open_table(AUDIT).map_err(io_error)?;

        let mut result = Vec::new();
        for item in index
            .range((grade_entry.0, 0)..=(grade_entry.0, u64::MAX))
            .map_err(io_error)?
        {
            let (_, audit_id) = item.map_err(io_error)?;
            if let Some(bytes) = audit.get(audit_id.value()).map_err(io_error)? {
                result.push(decode(bytes.value())?);
            }
        }
        Ok(result)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Grade, ProfessorId};
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn write(value: Option<u16>) -> GradeWrite {
        GradeWrite {
            enrollment_id: EnrollmentId(1),
            component_id: ComponentId(2),
            value: value.and_then(Grade::from_hundredths),
            actor: ProfessorId(1),
            at: Utc::now(),
        }
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("grades.redb");

        {
            let mut store = RedbStore::open(&path).expect("open");
            store
                .put_enrollment(Enrollment {
                    id: EnrollmentId(1),
                    student_id: StudentId(5),
                    class_id: ClassId(9),
                    enrolled_on: NaiveDate::from_ymd_opt(2024, 2, 10).expect("date"),
                    manual_adjusted: None,
                })
                .expect("put");
            store.write_grade(write(Some(650))).expect("write");
        }

        let store = RedbStore::open(&path).expect("reopen");
        let enrollment = store
            .enrollment(EnrollmentId(1))
            .expect("read")
            .expect("enrollment");
        assert_eq!(enrollment.student_id, StudentId(5));

        let entry = store
            .grade_entry(EnrollmentId(1), ComponentId(2))
            .expect("read")
            .expect("entry");
        assert_eq!(entry.value, Grade::from_hundredths(650));
        assert_eq!(entry.id, GradeEntryId(1));
    }

    #[test]
    fn write_grade_lifecycle() {
        let dir = tempdir().expect("tempdir");
        let mut store = RedbStore::open(dir.path().join("g.redb")).expect("open");

        assert!(store.write_grade(write(None)).expect("noop").is_none());

        let created = store
            .write_grade(write(Some(700)))
            .expect("write")
            .expect("change");
        assert_eq!(created.kind, GradeChangeKind::Created);

        let cleared = store
            .write_grade(write(None))
            .expect("write")
            .expect("change");
        assert_eq!(cleared.kind, GradeChangeKind::Cleared);
        assert_eq!(cleared.entry.id, created.entry.id);

        let entries = store.grade_entries_of(EnrollmentId(1)).expect("entries");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].value, None);
    }

    #[test]
    fn audit_rows_are_numbered() {
        let dir = tempdir().expect("tempdir");
        let mut store = RedbStore::open(dir.path().join("g.redb")).expect("open");
        let entry = store
            .write_grade(write(Some(500)))
            .expect("write")
            .expect("change")
            .entry;

        let first = store
            .append_audit(entry.id, "one".into(), Utc::now())
            .expect("audit");
        let second = store
            .append_audit(entry.id, "two".into(), Utc::now())
            .expect("audit");
        assert_eq!(first.id, AuditEntryId(1));
        assert_eq!(second.id, AuditEntryId(2));
        assert_eq!(store.audit_of(entry.id).expect("read").len(), 2);

        let other = store
            .write_grade(GradeWrite {
                component_id: ComponentId(3),
                ..write(Some(800))
            })
            .expect("write")
            .expect("change")
            .entry;
        store
            .append_audit(other.id, "three".into(), Utc::now())
            .expect("audit");
        let rows = store.audit_of(entry.id).expect("read");
        let messages: Vec<_> = rows.iter().map(|a| a.message.as_str()).collect();
        assert_eq!(messages, vec!["one", "two"]);
        assert_eq!(store.audit_of(other.id).expect("read")[0].id, AuditEntryId(3));

        assert!(matches!(
            store.append_audit(GradeEntryId(42), "x".into(), Utc::now()),
            Err(GradebookError::NotFound(_))
        ));
    }

    #[test]
    fn duplicate_short_code_rejected() {
        let dir = tempdir().expect("tempdir");
        let mut store = RedbStore::open(dir.path().join("g.redb")).expect("open");
        let component = |id: u64| AssessmentComponent {
            id: ComponentId(id),
            discipline_id: DisciplineId(1),
            name: "Exam".into(),
            short_code: "EX".into(),
        };
        store.put_component(component(1)).expect("put");
        assert!(matches!(
            store.put_component(component(2)),
            Err(GradebookError::DuplicateShortCode(_))
        ));
        assert_eq!(
            store.components_of(DisciplineId(1)).expect("read").len(),
            1
        );
    }
}

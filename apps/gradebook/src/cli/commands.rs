//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::api;
use crate::config::{AppConfig, Backend};
use chrono::Utc;
use gradebook_core::{
    ActorContext, AssessmentComponent, AveragingPolicy, Class, ClassId, ClassReport, ComponentId,
    Discipline, DisciplineId, Enrollment, EnrollmentId, Gradebook, GradebookError,
    GradebookStore, PendencyReport, Student, Weights,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// =============================================================================
// FILE VALIDATION
// =============================================================================

/// Maximum roster file size (50 MB).
const MAX_ROSTER_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), GradebookError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| GradebookError::Storage(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(GradebookError::Serialization(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Canonicalize an input path and require a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, GradebookError> {
    let canonical = path.canonicalize().map_err(|e| {
        GradebookError::Storage(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(GradebookError::Storage(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Resolve an output path against its canonical parent directory.
fn validate_output_path(path: &Path) -> Result<PathBuf, GradebookError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        GradebookError::Storage(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(GradebookError::Storage(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| GradebookError::Storage("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_default()
    );
}

// =============================================================================
// GRADEBOOK LOADING
// =============================================================================

/// Open the gradebook on the configured backend.
pub fn open_gradebook(config: &AppConfig) -> Result<Gradebook, GradebookError> {
    match config.storage.backend {
        Backend::Redb => Gradebook::with_redb(&config.storage.database),
        Backend::Memory => {
            tracing::warn!("Using the in-memory backend; nothing will be persisted");
            Ok(Gradebook::in_memory())
        }
    }
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(config: &AppConfig, seed: Option<&Path>) -> Result<(), GradebookError> {
    let mut gradebook = open_gradebook(config)?;
    if let Some(seed) = seed {
        let summary = load_roster(&mut gradebook, seed)?;
        tracing::info!(records = summary.total(), "roster loaded before serving");
    }

    println!("Gradebook Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Address:  {}", config.server.addr());
    println!("  Backend:  {}", config.storage.backend);
    if config.storage.backend == Backend::Redb {
        println!("  Database: {}", config.storage.database.display());
    }
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    api::run_server(&config.server.addr(), gradebook, &config.security).await
}

// =============================================================================
// INFO (DEFAULT) COMMAND
// =============================================================================

/// Show the effective configuration.
pub fn cmd_info(config: &AppConfig, json_mode: bool) -> Result<(), GradebookError> {
    let exists = config.storage.database.exists();

    if json_mode {
        print_json(&serde_json::json!({
            "backend": config.storage.backend.to_string(),
            "database": config.storage.database.to_string_lossy(),
            "database_exists": exists,
            "address": config.server.addr(),
        }));
        return Ok(());
    }

    println!("Gradebook");
    println!("=========");
    println!("Backend:  {}", config.storage.backend);
    println!(
        "Database: {} ({})",
        config.storage.database.display(),
        if exists { "present" } else { "not created" }
    );
    println!("Address:  {}", config.server.addr());
    println!();
    println!("Run `gradebook --help` for the available commands.");
    Ok(())
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Create an empty database.
pub fn cmd_init(config: &AppConfig, force: bool) -> Result<(), GradebookError> {
    if config.storage.backend == Backend::Memory {
        return Err(GradebookError::Config(
            "init only applies to the redb backend".to_string(),
        ));
    }

    let path = &config.storage.database;
    if path.exists() {
        if !force {
            return Err(GradebookError::Storage(format!(
                "Database {} already exists (use --force to replace it)",
                path.display()
            )));
        }
        std::fs::remove_file(path)
            .map_err(|e| GradebookError::Storage(format!("Remove database: {}", e)))?;
    }

    Gradebook::with_redb(path)?;
    println!("Initialized empty gradebook at {}", path.display());
    Ok(())
}

// =============================================================================
// SEED COMMAND
// =============================================================================

/// Catalog records loaded by `seed`.
///
/// Every list is optional; records with an existing id are replaced.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Roster {
    pub disciplines: Vec<Discipline>,
    pub components: Vec<AssessmentComponent>,
    pub classes: Vec<Class>,
    pub students: Vec<Student>,
    pub enrollments: Vec<Enrollment>,
}

impl Roster {
    #[must_use]
    pub fn total(&self) -> usize {
        self.disciplines.len()
            + self.components.len()
            + self.classes.len()
            + self.students.len()
            + self.enrollments.len()
    }

    /// Write every record, parents first.
    pub fn apply(&self, store: &mut dyn GradebookStore) -> Result<(), GradebookError> {
        for discipline in &self.disciplines {
            AveragingPolicy::decode(&discipline.formula)?;
            store.put_discipline(discipline.clone())?;
        }
        for component in &self.components {
            store.put_component(component.clone())?;
        }
        for class in &self.classes {
            store.put_class(class.clone())?;
        }
        for student in &self.students {
            store.put_student(student.clone())?;
        }
        for enrollment in &self.enrollments {
            store.put_enrollment(enrollment.clone())?;
        }
        Ok(())
    }
}

fn load_roster(gradebook: &mut Gradebook, file: &Path) -> Result<Roster, GradebookError> {
    let path = validate_file_path(file)?;
    validate_file_size(&path, MAX_ROSTER_FILE_SIZE)?;

    let contents = std::fs::read(&path)
        .map_err(|e| GradebookError::Storage(format!("Read file: {}", e)))?;
    let roster: Roster = serde_json::from_slice(&contents)
        .map_err(|e| GradebookError::Serialization(format!("Invalid roster: {}", e)))?;

    roster.apply(gradebook.store_mut())?;
    Ok(roster)
}

/// Load a roster file into the database.
pub fn cmd_seed(config: &AppConfig, file: &Path) -> Result<(), GradebookError> {
    tracing::info!("Seeding from {}", file.display());
    let mut gradebook = open_gradebook(config)?;
    let roster = load_roster(&mut gradebook, file)?;

    println!(
        "Loaded {} disciplines, {} components, {} classes, {} students, {} enrollments",
        roster.disciplines.len(),
        roster.components.len(),
        roster.classes.len(),
        roster.students.len(),
        roster.enrollments.len()
    );
    Ok(())
}

// =============================================================================
// GRADE COMMAND
// =============================================================================

pub fn cmd_grade(
    config: &AppConfig,
    actor: &ActorContext,
    json_mode: bool,
    enrollment: u64,
    component: u64,
    value: Option<f64>,
) -> Result<(), GradebookError> {
    let mut gradebook = open_gradebook(config)?;
    let entry = gradebook.upsert_grade(
        actor,
        EnrollmentId(enrollment),
        ComponentId(component),
        value,
    )?;

    if json_mode {
        print_json(&entry);
        return Ok(());
    }

    match entry.and_then(|e| e.value) {
        Some(grade) => println!(
            "Enrollment {} component {}: {}",
            enrollment, component, grade
        ),
        None => println!("Enrollment {} component {}: cleared", enrollment, component),
    }
    Ok(())
}

// =============================================================================
// POLICY COMMANDS
// =============================================================================

/// Parse `P1=0.4,P2=0.6` into weights.
fn parse_weights(spec: &str) -> Result<Weights, GradebookError> {
    let mut pairs = Vec::new();
    for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (code, weight) = part.split_once('=').ok_or_else(|| {
            GradebookError::Config(format!("expected CODE=WEIGHT, got '{}'", part))
        })?;
        let weight: f64 = weight.trim().parse().map_err(|_| {
            GradebookError::Config(format!("weight of {} is not a number", code.trim()))
        })?;
        pairs.push((code.trim().to_string(), weight));
    }
    Weights::from_decimals(pairs)
}

pub fn cmd_policy(
    config: &AppConfig,
    actor: &ActorContext,
    discipline: u64,
    weights: Option<&str>,
) -> Result<(), GradebookError> {
    let policy = match weights {
        Some(spec) => AveragingPolicy::Weighted(parse_weights(spec)?),
        None => AveragingPolicy::Simple,
    };

    let mut gradebook = open_gradebook(config)?;
    gradebook.set_averaging_policy(actor, DisciplineId(discipline), &policy)?;
    println!(
        "Discipline {} now uses: {}",
        discipline,
        policy.encode()
    );
    Ok(())
}

pub fn cmd_adjusted_mode(
    config: &AppConfig,
    actor: &ActorContext,
    discipline: u64,
    enabled: bool,
) -> Result<(), GradebookError> {
    let mut gradebook = open_gradebook(config)?;
    let mode = gradebook.set_adjusted_mode(actor, DisciplineId(discipline), enabled)?;
    println!(
        "Adjusted final grades {} for discipline {}",
        if mode.enabled { "enabled" } else { "disabled" },
        mode.discipline_id
    );
    Ok(())
}

// =============================================================================
// REPORT COMMANDS
// =============================================================================

fn print_report(report: &ClassReport) {
    println!(
        "Discipline {} / Class {} ({})",
        report.discipline_id,
        report.class_id,
        report.policy.as_deref().unwrap_or("invalid policy")
    );
    if let Some(issue) = &report.policy_issue {
        println!("Warning: {}", issue);
    }
    println!();

    for student in &report.students {
        let final_grade = student
            .final_grade
            .map_or_else(|| "-".to_string(), |g| g.to_string());
        let adjusted = student
            .adjusted_final_grade
            .map_or_else(|| "-".to_string(), |g| g.to_string());
        let components: Vec<String> = student
            .component_values
            .iter()
            .map(|(code, value)| {
                format!(
                    "{}={}",
                    code,
                    value.map_or_else(|| "-".to_string(), |g| g.to_string())
                )
            })
            .collect();

        if report.adjusted_enabled {
            println!(
                "  {:<30} {:>6} {:>5}  {}",
                student.student_name,
                final_grade,
                adjusted,
                components.join(" ")
            );
        } else {
            println!(
                "  {:<30} {:>6}  {}",
                student.student_name,
                final_grade,
                components.join(" ")
            );
        }
    }
}

fn print_pendencies(report: &PendencyReport) {
    if !report.has_pendencies {
        println!("No pending grades.");
        return;
    }
    println!("Pending grades:");
    for component in &report.pending_components {
        println!(
            "  {}: {} missing",
            component.short_code, component.missing_count
        );
    }
    println!("Students without a final grade:");
    for student in &report.students_without_final_grade {
        println!("  {} (enrollment {})", student.name, student.enrollment_id);
    }
}

pub fn cmd_final_grades(
    config: &AppConfig,
    actor: &ActorContext,
    json_mode: bool,
    discipline: u64,
    class: u64,
) -> Result<(), GradebookError> {
    let gradebook = open_gradebook(config)?;
    let report = gradebook.compute_for_class(actor, DisciplineId(discipline), ClassId(class))?;

    if json_mode {
        print_json(&report);
    } else {
        print_report(&report);
    }
    Ok(())
}

pub fn cmd_pendencies(
    config: &AppConfig,
    actor: &ActorContext,
    json_mode: bool,
    discipline: u64,
    class: u64,
) -> Result<(), GradebookError> {
    let gradebook = open_gradebook(config)?;
    let report = gradebook.compute_pendencies(actor, DisciplineId(discipline), ClassId(class))?;

    if json_mode {
        print_json(&report);
    } else {
        print_pendencies(&report);
    }
    Ok(())
}

/// Exported report file.
#[derive(Debug, Serialize)]
struct ExportFile<'a> {
    exported_at: chrono::DateTime<Utc>,
    exported_by: u64,
    report: &'a ClassReport,
}

/// Write the class report to `output`; refused while grades are pending.
pub fn cmd_export(
    config: &AppConfig,
    actor: &ActorContext,
    discipline: u64,
    class: u64,
    output: &Path,
) -> Result<(), GradebookError> {
    let output = validate_output_path(output)?;
    let gradebook = open_gradebook(config)?;

    let report = match gradebook.export_report(actor, DisciplineId(discipline), ClassId(class)) {
        Ok(report) => report,
        Err(GradebookError::PendingGrades(pendencies)) => {
            print_pendencies(&pendencies);
            return Err(GradebookError::PendingGrades(pendencies));
        }
        Err(e) => return Err(e),
    };

    let file = ExportFile {
        exported_at: Utc::now(),
        exported_by: actor.professor.0,
        report: &report,
    };
    let data = serde_json::to_vec_pretty(&file)
        .map_err(|e| GradebookError::Serialization(e.to_string()))?;
    std::fs::write(&output, &data)
        .map_err(|e| GradebookError::Storage(format!("Write file: {}", e)))?;

    println!(
        "Exported {} students to {}",
        report.students.len(),
        output.display()
    );
    Ok(())
}

// =============================================================================
// AUDIT COMMAND
// =============================================================================

pub fn cmd_audit(
    config: &AppConfig,
    actor: &ActorContext,
    json_mode: bool,
    class: u64,
) -> Result<(), GradebookError> {
    let gradebook = open_gradebook(config)?;
    let entries = gradebook.list_audit_by_class(actor, ClassId(class))?;

    if json_mode {
        print_json(&entries);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No grade history for class {}", class);
    }
    for entry in &entries {
        println!("{}  {}", entry.timestamp.to_rfc3339(), entry.message);
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

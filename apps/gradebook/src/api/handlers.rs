//! # API Endpoint Handlers
//!
//! Each handler resolves the acting professor, takes the gradebook lock and
//! delegates to one CORE operation. Errors are rendered by `ApiError`.

use super::{
    AppState,
    auth::Actor,
    types::{
        AdjustedModeRequest, ApiError, ApiResponse, BulkUpsertRequest, GridQuery, HealthResponse,
        ManualAdjustedRequest, ManualAdjustedResponse, PolicyRequest, PolicyResponse,
        UpsertGradeRequest,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use gradebook_core::{
    AdjustedMode, AuditView, BulkOutcome, ClassId, ClassReport, ComponentId, DisciplineId,
    EnrollmentId, GradeEntry, GradeGrid, PendencyReport,
};

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let gradebook = state.gradebook.read().await;
    Json(HealthResponse::new(gradebook.is_persistent()))
}

// =============================================================================
// GRADE ENTRY HANDLERS
// =============================================================================

/// Current values of one component for a class.
pub async fn grid_handler(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path((class_id, component_id)): Path<(u64, u64)>,
    Query(query): Query<GridQuery>,
) -> ApiResult<GradeGrid> {
    let gradebook = state.gradebook.read().await;
    let grid = gradebook.read_grid(
        &actor,
        ClassId(class_id),
        ComponentId(component_id),
        query.readonly,
    )?;
    Ok(ApiResponse::ok(grid))
}

/// Record, change or clear one grade.
pub async fn upsert_grade_handler(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path((enrollment_id, component_id)): Path<(u64, u64)>,
    Json(request): Json<UpsertGradeRequest>,
) -> ApiResult<Option<GradeEntry>> {
    let mut gradebook = state.gradebook.write().await;
    let entry = gradebook.upsert_grade(
        &actor,
        EnrollmentId(enrollment_id),
        ComponentId(component_id),
        request.value,
    )?;
    Ok(ApiResponse::ok(entry))
}

/// Apply many grade writes; failures are reported per item.
pub async fn bulk_upsert_handler(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(request): Json<BulkUpsertRequest>,
) -> ApiResult<BulkOutcome> {
    let mut gradebook = state.gradebook.write().await;
    let outcome = gradebook.bulk_upsert(&actor, &request.items)?;
    Ok(ApiResponse::ok(outcome))
}

// =============================================================================
// FINAL GRADE HANDLERS
// =============================================================================

pub async fn final_grades_handler(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path((discipline_id, class_id)): Path<(u64, u64)>,
) -> ApiResult<ClassReport> {
    let gradebook = state.gradebook.read().await;
    let report =
        gradebook.compute_for_class(&actor, DisciplineId(discipline_id), ClassId(class_id))?;
    Ok(ApiResponse::ok(report))
}

pub async fn adjusted_mode_handler(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(discipline_id): Path<u64>,
    Json(request): Json<AdjustedModeRequest>,
) -> ApiResult<AdjustedMode> {
    let mut gradebook = state.gradebook.write().await;
    let mode = gradebook.set_adjusted_mode(&actor, DisciplineId(discipline_id), request.enabled)?;
    Ok(ApiResponse::ok(mode))
}

pub async fn manual_adjusted_handler(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(enrollment_id): Path<u64>,
    Json(request): Json<ManualAdjustedRequest>,
) -> ApiResult<ManualAdjustedResponse> {
    let mut gradebook = state.gradebook.write().await;
    let enrollment_id = EnrollmentId(enrollment_id);
    let manual_adjusted =
        gradebook.set_manual_adjusted_grade(&actor, enrollment_id, request.value)?;
    Ok(ApiResponse::ok(ManualAdjustedResponse {
        enrollment_id,
        manual_adjusted,
    }))
}

pub async fn policy_handler(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(discipline_id): Path<u64>,
    Json(request): Json<PolicyRequest>,
) -> ApiResult<PolicyResponse> {
    let policy = request.to_policy()?;
    let mut gradebook = state.gradebook.write().await;
    let discipline_id = DisciplineId(discipline_id);
    gradebook.set_averaging_policy(&actor, discipline_id, &policy)?;
    Ok(ApiResponse::ok(PolicyResponse {
        discipline_id,
        kind: policy.kind().to_string(),
        formula: policy.encode(),
    }))
}

// =============================================================================
// PENDENCY AND EXPORT HANDLERS
// =============================================================================

pub async fn pendencies_handler(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path((discipline_id, class_id)): Path<(u64, u64)>,
) -> ApiResult<PendencyReport> {
    let gradebook = state.gradebook.read().await;
    let report =
        gradebook.compute_pendencies(&actor, DisciplineId(discipline_id), ClassId(class_id))?;
    Ok(ApiResponse::ok(report))
}

/// Final report of a class; 409 with the pendencies while grades are missing.
pub async fn export_handler(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path((discipline_id, class_id)): Path<(u64, u64)>,
) -> ApiResult<ClassReport> {
    let gradebook = state.gradebook.read().await;
    let report = gradebook.export_report(&actor, DisciplineId(discipline_id), ClassId(class_id))?;
    Ok(ApiResponse::ok(report))
}

// =============================================================================
// AUDIT HANDLER
// =============================================================================

pub async fn audit_handler(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(class_id): Path<u64>,
) -> ApiResult<Vec<AuditView>> {
    let gradebook = state.gradebook.read().await;
    let entries = gradebook.list_audit_by_class(&actor, ClassId(class_id))?;
    Ok(ApiResponse::ok(entries))
}

//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gradebook_core::{
    AveragingPolicy, BulkItem, DisciplineId, EnrollmentId, ErrorCategory, GradebookError,
    HalfGrade, PendencyReport, Weights,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// ENVELOPES
// =============================================================================

/// Successful response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

/// Error response body.
///
/// `pendencies` is only present when an export is refused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub code: String,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pendencies: Option<PendencyReport>,
}

/// A core error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub GradebookError);

impl From<GradebookError> for ApiError {
    fn from(error: GradebookError) -> Self {
        Self(error)
    }
}

/// HTTP status for an error category.
#[must_use]
pub fn status_for(category: ErrorCategory) -> StatusCode {
    match category {
        ErrorCategory::Validation => StatusCode::BAD_REQUEST,
        ErrorCategory::NotFound => StatusCode::NOT_FOUND,
        ErrorCategory::Conflict => StatusCode::CONFLICT,
        ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.category());
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(code = self.0.code(), "request failed: {}", self.0);
        }

        let code = self.0.code().to_string();
        let error = self.0.to_string();
        let pendencies = match self.0 {
            GradebookError::PendingGrades(report) => Some(*report),
            _ => None,
        };
        let body = ErrorResponse {
            success: false,
            code,
            error,
            pendencies,
        };
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub persistent: bool,
}

impl HealthResponse {
    pub fn new(persistent: bool) -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            persistent,
        }
    }
}

// =============================================================================
// GRADE ENTRY REQUESTS
// =============================================================================

/// Grid query string.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GridQuery {
    #[serde(default)]
    pub readonly: bool,
}

/// Single grade write; `null` or an absent value clears the grade.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UpsertGradeRequest {
    #[serde(default)]
    pub value: Option<f64>,
}

/// Bulk grade write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkUpsertRequest {
    pub items: Vec<BulkItem>,
}

// =============================================================================
// FINAL GRADE REQUESTS
// =============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AdjustedModeRequest {
    pub enabled: bool,
}

/// Manual adjusted grade; `null` removes the override.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ManualAdjustedRequest {
    #[serde(default)]
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualAdjustedResponse {
    pub enrollment_id: EnrollmentId,
    pub manual_adjusted: Option<HalfGrade>,
}

/// Averaging policy request (tagged union).
///
/// ```json
/// {"kind": "weighted", "weights": {"P1": 0.4, "P2": 0.6}}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyRequest {
    Simple,
    Weighted { weights: BTreeMap<String, f64> },
}

impl PolicyRequest {
    /// Convert to a policy, validating each weight.
    pub fn to_policy(&self) -> Result<AveragingPolicy, GradebookError> {
        match self {
            Self::Simple => Ok(AveragingPolicy::Simple),
            Self::Weighted { weights } => Weights::from_decimals(
                weights.iter().map(|(code, weight)| (code.clone(), *weight)),
            )
            .map(AveragingPolicy::Weighted),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyResponse {
    pub discipline_id: DisciplineId,
    pub kind: String,
    /// Stored formula, as persisted on the discipline.
    pub formula: String,
}

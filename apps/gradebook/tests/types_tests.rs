//! Unit tests for API types serialization/deserialization.

#![allow(clippy::unwrap_used, clippy::panic)]

use axum::http::StatusCode;
use gradebook::api::{
    ApiResponse, BulkUpsertRequest, ErrorResponse, GridQuery, ManualAdjustedRequest,
    PolicyRequest, UpsertGradeRequest, status_for,
};
use gradebook_core::{AveragingPolicy, ComponentId, EnrollmentId, ErrorCategory, GradebookError};

// =============================================================================
// GRADE REQUESTS
// =============================================================================

#[test]
fn upsert_request_value_defaults_to_clear() {
    let request: UpsertGradeRequest = serde_json::from_str("{}").unwrap();
    assert_eq!(request.value, None);

    let request: UpsertGradeRequest = serde_json::from_str(r#"{"value":null}"#).unwrap();
    assert_eq!(request.value, None);

    let request: UpsertGradeRequest = serde_json::from_str(r#"{"value":7.5}"#).unwrap();
    assert_eq!(request.value, Some(7.5));
}

#[test]
fn bulk_request_items() {
    let json = r#"{"items":[
        {"enrollment_id":1,"component_id":2,"value":9.25},
        {"enrollment_id":3,"component_id":4}
    ]}"#;
    let request: BulkUpsertRequest = serde_json::from_str(json).unwrap();

    assert_eq!(request.items.len(), 2);
    assert_eq!(request.items[0].enrollment_id, EnrollmentId(1));
    assert_eq!(request.items[0].component_id, ComponentId(2));
    assert_eq!(request.items[0].value, Some(9.25));
    assert_eq!(request.items[1].value, None);
}

#[test]
fn grid_query_defaults_to_editable() {
    let query: GridQuery = serde_json::from_str("{}").unwrap();
    assert!(!query.readonly);
}

#[test]
fn manual_adjusted_null_removes_override() {
    let request: ManualAdjustedRequest = serde_json::from_str(r#"{"value":null}"#).unwrap();
    assert_eq!(request.value, None);
}

// =============================================================================
// POLICY REQUEST
// =============================================================================

#[test]
fn simple_policy_request() {
    let request: PolicyRequest = serde_json::from_str(r#"{"kind":"simple"}"#).unwrap();
    assert_eq!(request.to_policy().unwrap(), AveragingPolicy::Simple);
}

#[test]
fn weighted_policy_request() {
    let request: PolicyRequest =
        serde_json::from_str(r#"{"kind":"weighted","weights":{"P1":0.4,"P2":0.6}}"#).unwrap();
    let AveragingPolicy::Weighted(weights) = request.to_policy().unwrap() else {
        panic!("expected a weighted policy");
    };
    assert_eq!(weights.len(), 2);
    assert!(weights.validate_sum().is_ok());
}

#[test]
fn negative_weight_is_rejected() {
    let request: PolicyRequest =
        serde_json::from_str(r#"{"kind":"weighted","weights":{"P1":-0.5,"P2":1.5}}"#).unwrap();
    assert!(matches!(
        request.to_policy(),
        Err(GradebookError::InvalidWeight { .. })
    ));
}

#[test]
fn unknown_policy_kind_fails_to_parse() {
    let result = serde_json::from_str::<PolicyRequest>(r#"{"kind":"median"}"#);
    assert!(result.is_err());
}

// =============================================================================
// ENVELOPES
// =============================================================================

#[test]
fn success_envelope_serialization() {
    let body = ApiResponse::ok(vec![1, 2, 3]).0;
    let json = serde_json::to_string(&body).unwrap();
    assert_eq!(json, r#"{"success":true,"data":[1,2,3]}"#);
}

#[test]
fn error_body_omits_absent_pendencies() {
    let body = ErrorResponse {
        success: false,
        code: "NOT_FOUND".to_string(),
        error: "Class not found".to_string(),
        pendencies: None,
    };
    let json = serde_json::to_string(&body).unwrap();
    assert!(!json.contains("pendencies"));
    assert!(json.contains(r#""code":"NOT_FOUND""#));
}

#[test]
fn error_categories_map_to_statuses() {
    assert_eq!(status_for(ErrorCategory::Validation), StatusCode::BAD_REQUEST);
    assert_eq!(status_for(ErrorCategory::NotFound), StatusCode::NOT_FOUND);
    assert_eq!(status_for(ErrorCategory::Conflict), StatusCode::CONFLICT);
    assert_eq!(
        status_for(ErrorCategory::Internal),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

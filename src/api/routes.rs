//! REST endpoints — RFP/vendor records plus the ingestion pipeline
//! operations (check responses, manual entry, comparison).
//!
//! Error mapping: not-found → 404, validation → 400, duplicates → 409,
//! everything else → 500 with a manual-entry suggestion. Fetch timeouts
//! and an empty mailbox are 200s with an explanatory message — the
//! summary itself distinguishes "nothing to do" from "something failed".

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::{DatabaseError, PipelineError};
use crate::extract::ExtractionService;
use crate::mailbox::RfpMailer;
use crate::model::{Proposal, Rfp, Vendor};
use crate::pipeline::{ComparisonAggregator, IngestionPipeline, MANUAL_ENTRY_SUGGESTION};
use crate::store::Database;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn Database>,
    pub extractor: Arc<ExtractionService>,
    pub pipeline: Arc<IngestionPipeline>,
    pub aggregator: Arc<ComparisonAggregator>,
    /// Outbound mailer (None if the mailbox is not configured).
    pub mailer: Option<Arc<RfpMailer>>,
}

/// Build the Axum router.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/rfps", post(create_rfp).get(list_rfps))
        .route("/api/rfps/{id}", get(get_rfp))
        .route("/api/rfps/{id}/send", post(send_rfp))
        .route("/api/rfps/{id}/vendors", get(list_rfp_vendors))
        .route("/api/rfps/{id}/check-responses", post(check_responses))
        .route("/api/rfps/{id}/compare", post(compare_proposals))
        .route("/api/rfps/{id}/proposals", get(list_rfp_proposals))
        .route("/api/vendors", post(create_vendor).get(list_vendors))
        .route(
            "/api/vendors/{id}",
            get(get_vendor).put(update_vendor).delete(delete_vendor),
        )
        .route("/api/proposals/manual", post(create_manual_proposal))
        .route("/api/proposals/{id}", get(get_proposal))
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "rfp-assist"
    }))
}

// ── Error mapping ───────────────────────────────────────────────────

fn pipeline_error_response(e: PipelineError) -> Response {
    let status = match &e {
        PipelineError::RfpNotFound(_)
        | PipelineError::VendorNotFound(_)
        | PipelineError::ProposalNotFound(_)
        | PipelineError::NoProposals(_) => StatusCode::NOT_FOUND,
        PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
        PipelineError::DuplicateProposal { .. } => StatusCode::CONFLICT,
        PipelineError::Database(DatabaseError::Constraint(_)) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(error = %e, "Pipeline operation failed");
        (
            status,
            Json(json!({
                "error": e.to_string(),
                "suggestion": MANUAL_ENTRY_SUGGESTION,
            })),
        )
            .into_response()
    } else {
        (status, Json(json!({ "error": e.to_string() }))).into_response()
    }
}

fn db_error_response(e: DatabaseError) -> Response {
    if matches!(e, DatabaseError::Constraint(_)) {
        return (StatusCode::CONFLICT, Json(json!({ "error": e.to_string() }))).into_response();
    }
    error!(error = %e, "Database operation failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
        .into_response()
}

fn not_found(entity: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("{entity} not found") })),
    )
        .into_response()
}

/// Proposal + vendor pair rendered for API responses.
fn proposal_json(proposal: &Proposal, vendor: &Vendor) -> serde_json::Value {
    json!({
        "proposal": proposal,
        "vendor_name": vendor.name,
        "vendor_email": vendor.email,
    })
}

// ── RFPs ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CreateRfpRequest {
    natural_language_input: String,
}

/// POST /api/rfps — create an RFP from a free-text description.
async fn create_rfp(
    State(state): State<AppState>,
    Json(req): Json<CreateRfpRequest>,
) -> Response {
    if req.natural_language_input.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Natural language input is required" })),
        )
            .into_response();
    }

    let parsed = match state.extractor.parse_rfp(&req.natural_language_input).await {
        Ok(parsed) => parsed,
        Err(e) => return pipeline_error_response(e.into()),
    };

    let rfp = Rfp::from_parsed(parsed);
    if let Err(e) = state.db.insert_rfp(&rfp).await {
        return db_error_response(e);
    }

    info!(rfp = %rfp.title, "RFP created");
    (
        StatusCode::CREATED,
        Json(json!({ "message": "RFP created successfully", "rfp": rfp })),
    )
        .into_response()
}

/// GET /api/rfps
async fn list_rfps(State(state): State<AppState>) -> Response {
    match state.db.list_rfps().await {
        Ok(rfps) => Json(json!({ "rfps": rfps })).into_response(),
        Err(e) => db_error_response(e),
    }
}

/// GET /api/rfps/{id}
async fn get_rfp(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.db.get_rfp(id).await {
        Ok(Some(rfp)) => Json(json!({ "rfp": rfp })).into_response(),
        Ok(None) => not_found("RFP"),
        Err(e) => db_error_response(e),
    }
}

#[derive(Deserialize)]
struct SendRfpRequest {
    vendor_ids: Vec<Uuid>,
}

/// POST /api/rfps/{id}/send — solicit the selected vendors.
///
/// Per-vendor send failures are reported in the results without aborting
/// the rest; the RFP is marked sent either way.
async fn send_rfp(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SendRfpRequest>,
) -> Response {
    if req.vendor_ids.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "At least one vendor must be selected" })),
        )
            .into_response();
    }

    let Some(mailer) = state.mailer.clone() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "Outbound mailbox is not configured" })),
        )
            .into_response();
    };

    let rfp = match state.db.get_rfp(id).await {
        Ok(Some(rfp)) => rfp,
        Ok(None) => return not_found("RFP"),
        Err(e) => return db_error_response(e),
    };

    let mut results = Vec::with_capacity(req.vendor_ids.len());
    for vendor_id in req.vendor_ids {
        let vendor = match state.db.get_vendor(vendor_id).await {
            Ok(Some(vendor)) => vendor,
            Ok(None) => {
                results.push(json!({
                    "vendor_id": vendor_id,
                    "status": "failed",
                    "error": "Vendor not found",
                }));
                continue;
            }
            Err(e) => return db_error_response(e),
        };

        match mailer.send_rfp(&vendor, &rfp) {
            Ok(()) => {
                if let Err(e) = state.db.record_invitation(id, vendor.id).await {
                    return db_error_response(e);
                }
                results.push(json!({
                    "vendor": vendor.name,
                    "email": vendor.email,
                    "status": "sent",
                }));
            }
            Err(e) => {
                results.push(json!({
                    "vendor": vendor.name,
                    "email": vendor.email,
                    "status": "failed",
                    "error": e.to_string(),
                }));
            }
        }
    }

    if let Err(e) = state.db.mark_rfp_sent(id).await {
        return db_error_response(e);
    }

    info!(rfp = %rfp.title, vendors = results.len(), "RFP send cycle complete");
    Json(json!({
        "message": "RFP sending process completed",
        "results": results,
    }))
    .into_response()
}

/// GET /api/rfps/{id}/vendors — vendors invited to this RFP.
async fn list_rfp_vendors(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.db.list_invited_vendors(id).await {
        Ok(vendors) => Json(json!({ "vendors": vendors })).into_response(),
        Err(e) => db_error_response(e),
    }
}

/// POST /api/rfps/{id}/check-responses — run one ingestion cycle.
async fn check_responses(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.pipeline.check_responses(id).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => pipeline_error_response(e),
    }
}

/// POST /api/rfps/{id}/compare — rank all proposals for this RFP.
async fn compare_proposals(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.aggregator.compare(id).await {
        Ok(report) => {
            let proposals: Vec<serde_json::Value> = report
                .proposals
                .iter()
                .map(|(p, v)| proposal_json(p, v))
                .collect();
            Json(json!({
                "rfp": report.rfp,
                "proposals": proposals,
                "comparison": report.comparison,
            }))
            .into_response()
        }
        Err(e) => pipeline_error_response(e),
    }
}

/// GET /api/rfps/{id}/proposals — stored proposals, highest score first.
async fn list_rfp_proposals(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.db.list_proposals(id).await {
        Ok(proposals) => {
            let proposals: Vec<serde_json::Value> = proposals
                .iter()
                .map(|(p, v)| proposal_json(p, v))
                .collect();
            Json(json!({ "proposals": proposals })).into_response()
        }
        Err(e) => db_error_response(e),
    }
}

// ── Vendors ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CreateVendorRequest {
    name: String,
    email: String,
    #[serde(default)]
    contact_person: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    address: Option<String>,
}

/// POST /api/vendors
async fn create_vendor(
    State(state): State<AppState>,
    Json(req): Json<CreateVendorRequest>,
) -> Response {
    if req.name.trim().is_empty() || req.email.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Name and email are required" })),
        )
            .into_response();
    }

    let mut vendor = Vendor::new(req.name, req.email);
    vendor.contact_person = req.contact_person;
    vendor.phone = req.phone;
    vendor.address = req.address;

    match state.db.insert_vendor(&vendor).await {
        Ok(()) => (
            StatusCode::CREATED,
            Json(json!({ "message": "Vendor created successfully", "vendor": vendor })),
        )
            .into_response(),
        Err(DatabaseError::Constraint(_)) => (
            StatusCode::CONFLICT,
            Json(json!({ "error": "Vendor with this email already exists" })),
        )
            .into_response(),
        Err(e) => db_error_response(e),
    }
}

/// GET /api/vendors
async fn list_vendors(State(state): State<AppState>) -> Response {
    match state.db.list_vendors().await {
        Ok(vendors) => Json(json!({ "vendors": vendors })).into_response(),
        Err(e) => db_error_response(e),
    }
}

/// GET /api/vendors/{id}
async fn get_vendor(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.db.get_vendor(id).await {
        Ok(Some(vendor)) => Json(json!({ "vendor": vendor })).into_response(),
        Ok(None) => not_found("Vendor"),
        Err(e) => db_error_response(e),
    }
}

#[derive(Deserialize, Default)]
struct UpdateVendorRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    contact_person: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    address: Option<String>,
}

/// PUT /api/vendors/{id} — partial update; absent fields keep their value.
async fn update_vendor(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateVendorRequest>,
) -> Response {
    let mut vendor = match state.db.get_vendor(id).await {
        Ok(Some(vendor)) => vendor,
        Ok(None) => return not_found("Vendor"),
        Err(e) => return db_error_response(e),
    };

    if let Some(name) = req.name {
        vendor.name = name;
    }
    if let Some(email) = req.email {
        vendor.email = email;
    }
    if req.contact_person.is_some() {
        vendor.contact_person = req.contact_person;
    }
    if req.phone.is_some() {
        vendor.phone = req.phone;
    }
    if req.address.is_some() {
        vendor.address = req.address;
    }

    match state.db.update_vendor(&vendor).await {
        Ok(()) => Json(json!({
            "message": "Vendor updated successfully",
            "vendor": vendor,
        }))
        .into_response(),
        Err(e) => db_error_response(e),
    }
}

/// DELETE /api/vendors/{id}
async fn delete_vendor(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.db.delete_vendor(id).await {
        Ok(true) => Json(json!({ "message": "Vendor deleted successfully" })).into_response(),
        Ok(false) => not_found("Vendor"),
        Err(e) => db_error_response(e),
    }
}

// ── Proposals ───────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ManualProposalRequest {
    rfp_id: Uuid,
    vendor_id: Uuid,
    #[serde(default)]
    email_subject: Option<String>,
    email_body: String,
}

/// POST /api/proposals/manual — operator-entered proposal text.
async fn create_manual_proposal(
    State(state): State<AppState>,
    Json(req): Json<ManualProposalRequest>,
) -> Response {
    match state
        .pipeline
        .add_manual_proposal(req.rfp_id, req.vendor_id, req.email_subject, &req.email_body)
        .await
    {
        Ok(processed) => (
            StatusCode::CREATED,
            Json(json!({
                "message": "Proposal created successfully",
                "proposal": processed.proposal,
                "analysis": processed.analysis,
            })),
        )
            .into_response(),
        Err(e) => pipeline_error_response(e),
    }
}

/// GET /api/proposals/{id}
async fn get_proposal(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.db.get_proposal(id).await {
        Ok(Some((proposal, vendor))) => Json(json!({
            "proposal": proposal,
            "vendor_name": vendor.name,
            "vendor_email": vendor.email,
            "contact_person": vendor.contact_person,
        }))
        .into_response(),
        Ok(None) => not_found("Proposal"),
        Err(e) => db_error_response(e),
    }
}

//! HTTP surface: ingest, report, proof bundle, health.
//!
//! Grounded in `api/simple.rs`'s `Router::new().route(...).with_state(...)`
//! assembly and `AppState`-as-cloneable-handle pattern from `main.rs`.

use crate::bundle::{assemble_proof_bundle, ProofBundle};
use crate::commitments::Commitment;
use crate::error::{ApiError, IngestError};
use crate::events::Event;
use crate::report::{generate_report, InvestorReport};
use crate::signer::KeyPair;
use crate::state_manager::{IngestOutcome, StateManager};
use crate::store::Store;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub state_manager: Arc<StateManager>,
    pub keys: Arc<KeyPair>,
    pub trusted_key_versions: Vec<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/instances/:instance_id/events", post(ingest_event))
        .route("/instances/:instance_id/report", get(get_report))
        .route("/instances/:instance_id/bundle", get(get_bundle))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "OK"
}

#[derive(Serialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
enum IngestResponse {
    Appended { seq_no: u64, checkpoint_created: bool, commitment_created: bool },
    AlreadyRecorded { seq_no: u64 },
}

impl From<IngestOutcome> for IngestResponse {
    fn from(outcome: IngestOutcome) -> Self {
        match outcome {
            IngestOutcome::Appended { seq_no, checkpoint_created, commitment_created } => {
                IngestResponse::Appended { seq_no, checkpoint_created, commitment_created }
            }
            IngestOutcome::AlreadyRecorded { seq_no } => IngestResponse::AlreadyRecorded { seq_no },
        }
    }
}

async fn ingest_event(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    Json(event): Json<Event>,
) -> Result<Json<IngestResponse>, ApiError> {
    if event.instance_id != instance_id {
        return Err(ApiError::Ingest(IngestError::SchemaInvalid(crate::events::SchemaError::new(
            "instanceId in body does not match the URL path",
        ))));
    }
    let outcome = state.state_manager.ingest_event(event)?;
    Ok(Json(outcome.into()))
}

/// Optional `seqNo` range bounding a report/bundle to part of an
/// instance's history. The first event in the filtered range may start
/// mid-chain; its `prevHash` is trusted rather than checked.
#[derive(Debug, Deserialize)]
pub struct ReportRangeParams {
    pub from: Option<u64>,
    pub to: Option<u64>,
}

fn in_range(seq_no: u64, range: &ReportRangeParams) -> bool {
    range.from.map_or(true, |from| seq_no >= from) && range.to.map_or(true, |to| seq_no <= to)
}

fn apply_range(events: Vec<Event>, range: &ReportRangeParams) -> Vec<Event> {
    events.into_iter().filter(|e| in_range(e.seq_no, range)).collect()
}

async fn get_report(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    Query(range): Query<ReportRangeParams>,
) -> Result<Json<InvestorReport>, ApiError> {
    let events = apply_range(state.store.load_events(&instance_id)?, &range);
    if events.is_empty() {
        return Err(ApiError::InstanceNotFound { instance_id });
    }
    let report_id = uuid::Uuid::new_v4().to_string();
    let report = generate_report(&instance_id, &events, &state.keys, report_id, Utc::now());
    Ok(Json(report))
}

async fn get_bundle(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    Query(range): Query<ReportRangeParams>,
) -> Result<Json<ProofBundle>, ApiError> {
    let events = apply_range(state.store.load_events(&instance_id)?, &range);
    if events.is_empty() {
        return Err(ApiError::InstanceNotFound { instance_id });
    }
    let checkpoints: Vec<_> =
        state.store.load_checkpoints(&instance_id)?.into_iter().filter(|c| in_range(c.seq_no, &range)).collect();
    let commitments: Vec<Commitment> = state.store.load_commitments(&instance_id)?;

    let report_id = uuid::Uuid::new_v4().to_string();
    let bundle = assemble_proof_bundle(
        &instance_id,
        &events,
        &checkpoints,
        &state.keys,
        report_id,
        Utc::now(),
        &state.trusted_key_versions,
    )
    .with_commitments(commitments);

    Ok(Json(bundle))
}


// src/handlers/risk.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;

use crate::{
    config::Config,
    engine::{
        intervention::{annotate_with_interventions, new_candidates},
        risk::build_lms_risk_signals,
    },
    error::AppError,
    models::{
        intervention::{Intervention, InterventionListParams},
        risk::RiskSignal,
    },
    store::LmsStore,
};

#[derive(Debug, Default, Deserialize)]
pub struct RiskQuery {
    /// Also return learners scored as low risk.
    #[serde(default)]
    pub include_low: bool,
}

async fn signals_and_interventions(
    store: &dyn LmsStore,
    config: &Config,
    include_low: bool,
) -> Result<(Vec<RiskSignal>, Vec<Intervention>), AppError> {
    let inputs = store.risk_inputs().await?;
    let signals = build_lms_risk_signals(&inputs, &config.risk_policy, Utc::now(), include_low);
    let interventions = store
        .list_interventions(&InterventionListParams::default())
        .await?;
    Ok((signals, interventions))
}

/// Risk dashboard: every flagged (learner, course) pair, highest score
/// first, each with the intervention tracking it (if any).
pub async fn list_risk_signals(
    State(store): State<Arc<dyn LmsStore>>,
    State(config): State<Config>,
    Query(params): Query<RiskQuery>,
) -> Result<impl IntoResponse, AppError> {
    let (signals, interventions) =
        signals_and_interventions(store.as_ref(), &config, params.include_low).await?;

    tracing::info!("Risk scan produced {} signals", signals.len());
    Ok(Json(annotate_with_interventions(signals, &interventions)))
}

/// Flagged pairs that no open or in-progress intervention covers yet.
pub async fn list_candidates(
    State(store): State<Arc<dyn LmsStore>>,
    State(config): State<Config>,
) -> Result<impl IntoResponse, AppError> {
    let (signals, interventions) = signals_and_interventions(store.as_ref(), &config, false).await?;
    Ok(Json(new_candidates(signals, &interventions)))
}

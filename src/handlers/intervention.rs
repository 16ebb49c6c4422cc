// src/handlers/intervention.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    engine::intervention::{SavePlan, plan_intervention_save},
    error::AppError,
    models::intervention::{InterventionListParams, SaveInterventionRequest},
    store::LmsStore,
    utils::{html::clean_authored_text, jwt::Claims},
};

/// Lists interventions, newest first, optionally filtered by status,
/// learner or course.
pub async fn list_interventions(
    State(store): State<Arc<dyn LmsStore>>,
    Query(params): Query<InterventionListParams>,
) -> Result<impl IntoResponse, AppError> {
    let interventions = store.list_interventions(&params).await?;
    Ok(Json(interventions))
}

pub async fn get_intervention(
    State(store): State<Arc<dyn LmsStore>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let intervention = store
        .get_intervention(id)
        .await?
        .ok_or(AppError::NotFound("Intervention not found".to_string()))?;
    Ok(Json(intervention))
}

/// Creates or updates an intervention.
///
/// The target is the record named by `id`, else the active record for the
/// learner and course. With neither, a new record is opened (201).
pub async fn save_intervention(
    State(store): State<Arc<dyn LmsStore>>,
    Extension(claims): Extension<Claims>,
    Json(mut req): Json<SaveInterventionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = req.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    req.action_plan = req.action_plan.as_deref().and_then(clean_authored_text);
    req.reason = clean_authored_text(&req.reason)
        .ok_or(AppError::BadRequest("Reason cannot be empty".to_string()))?;

    let existing = match req.id {
        Some(id) => Some(
            store
                .get_intervention(id)
                .await?
                .ok_or(AppError::NotFound("Intervention not found".to_string()))?,
        ),
        None => {
            store
                .find_active_intervention(&req.user_id, &req.course_id)
                .await?
        }
    };

    let plan = plan_intervention_save(existing.as_ref(), req, &claims.sub, Utc::now())?;
    let status = match plan {
        SavePlan::Create(_) => StatusCode::CREATED,
        SavePlan::Update(_) => StatusCode::OK,
    };

    let saved = store.save_intervention(plan).await?;

    tracing::info!(
        "Intervention {} for user {} in course {} is now {} (by {})",
        saved.id,
        saved.user_id,
        saved.course_id,
        saved.status,
        claims.sub
    );

    Ok((status, Json(saved)))
}

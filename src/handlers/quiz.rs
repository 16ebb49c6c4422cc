// src/handlers/quiz.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, SubsecRound, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::{
    engine::quiz_session::{
        create_quiz_session, grade_quiz_session, normalize_quiz_payload, validate_submission,
    },
    error::AppError,
    models::{
        attempt::{
            AttemptReplay, NewQuizAttempt, QuizModule, SessionResponse, SubmitAttemptRequest,
            SubmitAttemptResponse,
        },
        quiz::{QuizDefinition, QuizSession},
    },
    store::LmsStore,
    utils::{
        hash::{build_session_seed, parse_session_seed},
        jwt::Claims,
    },
};

/// Loads a module and normalizes its quiz. A module without a usable quiz
/// is reported as not found so the player renders no assessment.
async fn load_quiz(
    store: &dyn LmsStore,
    module_id: &str,
) -> Result<(QuizModule, QuizDefinition), AppError> {
    let module = store
        .quiz_module(module_id)
        .await?
        .ok_or(AppError::NotFound("Quiz module not found".to_string()))?;

    let definition = normalize_quiz_payload(&module.payload).ok_or_else(|| {
        tracing::warn!("Module {} has no usable quiz questions", module.id);
        AppError::NotFound("No quiz available for this module".to_string())
    })?;

    Ok((module, definition))
}

/// Starts a quiz session.
///
/// * Builds a fresh seed from module, learner and the current time, so each
///   retake gets a new ordering.
/// * Returns questions and options in session order, without answer keys.
pub async fn start_session(
    State(store): State<Arc<dyn LmsStore>>,
    Extension(claims): Extension<Claims>,
    Path(module_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let (module, definition) = load_quiz(store.as_ref(), &module_id).await?;

    // Millisecond precision, the same as the seed's freshness token.
    let started_at = Utc::now().trunc_subsecs(3);
    let seed = build_session_seed(
        &module.id,
        &claims.sub,
        &started_at.timestamp_millis().to_string(),
    );
    let session = create_quiz_session(&definition, &seed);

    tracing::debug!("Started quiz session for user {} on module {}", claims.sub, module.id);

    Ok(Json(SessionResponse {
        module_id: module.id.clone(),
        pass_threshold: module.pass_threshold(),
        started_at,
        quiz: session.present(&definition),
    }))
}

/// Submits a quiz attempt.
///
/// * Rejects incomplete submissions before grading.
/// * Re-derives the session from the submitted seed and grades against it.
/// * Times the attempt from the seed's issue time, not client input.
/// * Appends the attempt; a passing attempt also completes the module.
pub async fn submit_attempt(
    State(store): State<Arc<dyn LmsStore>>,
    Extension(claims): Extension<Claims>,
    Path(module_id): Path<String>,
    Json(req): Json<SubmitAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = req.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let (module, definition) = load_quiz(store.as_ref(), &module_id).await?;

    // Seeds are only valid for the learner and module they were issued for.
    let started_at = parse_session_seed(&req.seed, &module.id, &claims.sub)
        .and_then(DateTime::from_timestamp_millis)
        .ok_or(AppError::BadRequest(
            "Seed does not belong to this learner and module".to_string(),
        ))?;

    if let Err(invalid) = validate_submission(&definition, &req.answers) {
        return Err(AppError::BadRequest(format!(
            "Incomplete submission, unanswered or invalid questions: {}",
            invalid.join(", ")
        )));
    }

    let submitted_at = Utc::now();
    if started_at > submitted_at {
        return Err(AppError::BadRequest("Seed was issued in the future".to_string()));
    }

    let session = create_quiz_session(&definition, &req.seed);
    let result = grade_quiz_session(&definition, &session, &req.answers, module.pass_threshold());

    let attempt = store
        .record_attempt(NewQuizAttempt {
            user_id: claims.sub.clone(),
            course_id: module.course_id.clone(),
            module_id: module.id.clone(),
            answers: req.answers,
            question_order: session.question_order,
            option_order_by_question: session.option_order_by_question,
            seed: session.seed,
            score_percent: result.score_percent,
            correct_answers: result.correct_answers,
            total_questions: result.total_questions,
            passed: result.passed,
            started_at,
            submitted_at,
        })
        .await?;

    tracing::info!(
        "Recorded attempt {} for user {} on module {}: {}% ({})",
        attempt.attempt_number,
        claims.sub,
        module.id,
        result.score_percent,
        if result.passed { "passed" } else { "failed" }
    );

    Ok((
        StatusCode::CREATED,
        Json(SubmitAttemptResponse {
            attempt_id: attempt.id,
            attempt_number: attempt.attempt_number,
            result,
        }),
    ))
}

/// Lists the caller's attempts for a module, oldest first.
pub async fn list_attempts(
    State(store): State<Arc<dyn LmsStore>>,
    Extension(claims): Extension<Claims>,
    Path(module_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let attempts = store.list_attempts(&claims.sub, &module_id).await?;
    Ok(Json(attempts))
}

/// Shows a past attempt exactly as the learner saw it.
///
/// The session is re-derived from the stored seed. If the module's quiz has
/// been edited since, the stored orderings are used instead.
pub async fn replay_attempt(
    State(store): State<Arc<dyn LmsStore>>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = store
        .get_attempt(attempt_id)
        .await?
        .ok_or(AppError::NotFound("Attempt not found".to_string()))?;

    if attempt.user_id != claims.sub && !claims.role().can_manage_learners() {
        return Err(AppError::Forbidden(
            "Attempt belongs to another learner".to_string(),
        ));
    }

    let (_, definition) = load_quiz(store.as_ref(), &attempt.module_id).await?;

    let derived = create_quiz_session(&definition, &attempt.seed);
    let session = if derived.question_order == attempt.question_order
        && derived.option_order_by_question == attempt.option_order_by_question
    {
        derived
    } else {
        tracing::warn!(
            "Quiz for module {} changed since attempt {}, replaying stored order",
            attempt.module_id,
            attempt.id
        );
        QuizSession {
            seed: attempt.seed.clone(),
            question_order: attempt.question_order.clone(),
            option_order_by_question: attempt.option_order_by_question.clone(),
        }
    };

    let quiz = session.present(&definition);
    Ok(Json(AttemptReplay { attempt, quiz }))
}

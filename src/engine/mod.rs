// src/engine/mod.rs

//! Pure decision logic: quiz sessions and grading, learner risk scoring,
//! and the intervention workflow. Nothing here performs I/O.

pub mod intervention;
pub mod quiz_session;
pub mod risk;

// src/models/quiz.rs

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single answer option of a quiz question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizOption {
    pub id: String,
    pub label: String,
}

/// A normalized quiz question.
/// Always has at least two options and exactly one correct option id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    pub options: Vec<QuizOption>,
    pub correct_option_id: String,
}

impl Question {
    pub fn has_option(&self, option_id: &str) -> bool {
        self.options.iter().any(|o| o.id == option_id)
    }
}

/// Quiz attached to a course module, in authoring order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizDefinition {
    pub questions: Vec<Question>,
}

impl QuizDefinition {
    pub fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }
}

/// Orderings derived from a seed. Reconstructible, never stored on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizSession {
    pub seed: String,
    pub question_order: Vec<String>,
    pub option_order_by_question: HashMap<String, Vec<String>>,
}

/// Outcome of grading one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOutcome {
    pub question_id: String,
    pub selected_option_id: Option<String>,
    pub correct: bool,
}

/// Result of grading an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizResult {
    pub score_percent: u32,
    pub correct_answers: u32,
    pub total_questions: u32,
    pub passed: bool,
    pub breakdown: Vec<QuestionOutcome>,
}

/// Question as shown to the learner: session order, no answer key.
#[derive(Debug, Clone, Serialize)]
pub struct PresentedQuestion {
    pub id: String,
    pub prompt: String,
    pub options: Vec<QuizOption>,
}

/// Player-facing view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct PresentedQuiz {
    pub seed: String,
    pub questions: Vec<PresentedQuestion>,
}

// src/engine/quiz_session.rs

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use crate::{
    models::quiz::{
        PresentedQuestion, PresentedQuiz, Question, QuestionOutcome, QuizDefinition, QuizOption,
        QuizResult, QuizSession,
    },
    utils::{hash::SeedStream, html::clean_authored_text},
};

const PROMPT_KEYS: &[&str] = &["prompt", "question", "text"];
const OPTION_LIST_KEYS: &[&str] = &["options", "choices"];
const OPTION_LABEL_KEYS: &[&str] = &["label", "text"];
const CORRECT_ID_KEYS: &[&str] = &["correctOptionId", "correct_option_id"];
const CORRECT_ANSWER_KEYS: &[&str] = &["correctAnswer", "correct_answer"];
const CORRECT_INDEX_KEYS: &[&str] = &["correctIndex", "correct_index", "answerIndex"];
const CORRECT_FLAG_KEYS: &[&str] = &["correct", "isCorrect", "is_correct"];

/// Option kept during normalization, with its position in the raw list.
struct RawOption {
    raw_index: usize,
    option: QuizOption,
    flagged_correct: bool,
}

fn first_str<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| obj.get(*k).and_then(Value::as_str))
}

/// Accepts string or integer ids; blank strings count as missing.
fn id_value(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn normalize_options(question_id: &str, raw: &[Value]) -> Vec<RawOption> {
    let mut seen = HashSet::new();
    let mut kept = Vec::new();

    for (raw_index, entry) in raw.iter().enumerate() {
        let generated_id = format!("{}-o{}", question_id, raw_index + 1);
        let (id, label, flagged_correct) = match entry {
            Value::String(label) => (generated_id, clean_authored_text(label), false),
            Value::Object(obj) => (
                id_value(obj.get("id")).unwrap_or(generated_id),
                first_str(obj, OPTION_LABEL_KEYS).and_then(clean_authored_text),
                CORRECT_FLAG_KEYS
                    .iter()
                    .any(|k| obj.get(*k).and_then(Value::as_bool).unwrap_or(false)),
            ),
            _ => continue,
        };

        let Some(label) = label else {
            continue;
        };
        if !seen.insert(id.clone()) {
            continue;
        }

        kept.push(RawOption {
            raw_index,
            option: QuizOption { id, label },
            flagged_correct,
        });
    }

    kept
}

/// Resolves the single correct option. Explicit keys win over per-option
/// flags; an explicit key that matches nothing rejects the question.
fn resolve_correct(obj: &Map<String, Value>, options: &[RawOption]) -> Option<String> {
    if let Some(raw) = CORRECT_ID_KEYS.iter().find_map(|k| obj.get(*k)) {
        let id = id_value(Some(raw))?;
        return options
            .iter()
            .find(|o| o.option.id == id)
            .map(|o| o.option.id.clone());
    }

    if let Some(answer) = CORRECT_ANSWER_KEYS.iter().find_map(|k| obj.get(*k)) {
        let answer = id_value(Some(answer))?;
        if let Some(found) = options.iter().find(|o| o.option.id == answer) {
            return Some(found.option.id.clone());
        }
        let label = clean_authored_text(&answer)?;
        let mut matches = options.iter().filter(|o| o.option.label == label);
        let found = matches.next()?;
        if matches.next().is_some() {
            return None;
        }
        return Some(found.option.id.clone());
    }

    if let Some(index) = CORRECT_INDEX_KEYS.iter().find_map(|k| obj.get(*k)) {
        let index = usize::try_from(index.as_u64()?).ok()?;
        return options
            .iter()
            .find(|o| o.raw_index == index)
            .map(|o| o.option.id.clone());
    }

    let mut flagged = options.iter().filter(|o| o.flagged_correct);
    let found = flagged.next()?;
    if flagged.next().is_some() {
        return None;
    }
    Some(found.option.id.clone())
}

/// Normalizes a stored quiz payload into a `QuizDefinition`.
///
/// Accepts either a bare array of questions or an object with a `questions`
/// array. Malformed questions and options are dropped, missing ids are
/// generated from their position (`q3`, `q3-o2`), and `None` is returned
/// when no usable question remains.
pub fn normalize_quiz_payload(raw: &Value) -> Option<QuizDefinition> {
    let entries = match raw {
        Value::Array(items) => items,
        Value::Object(obj) => obj.get("questions")?.as_array()?,
        _ => return None,
    };

    let mut seen = HashSet::new();
    let mut questions = Vec::new();

    for (index, entry) in entries.iter().enumerate() {
        let Some(obj) = entry.as_object() else {
            continue;
        };
        let Some(prompt) = first_str(obj, PROMPT_KEYS).and_then(clean_authored_text) else {
            continue;
        };
        let id = id_value(obj.get("id")).unwrap_or_else(|| format!("q{}", index + 1));
        if seen.contains(&id) {
            continue;
        }

        let raw_options = OPTION_LIST_KEYS
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_array))
            .map(Vec::as_slice)
            .unwrap_or_default();
        let options = normalize_options(&id, raw_options);
        if options.len() < 2 {
            continue;
        }
        let Some(correct_option_id) = resolve_correct(obj, &options) else {
            continue;
        };

        seen.insert(id.clone());
        questions.push(Question {
            id,
            prompt,
            options: options.into_iter().map(|o| o.option).collect(),
            correct_option_id,
        });
    }

    if questions.is_empty() {
        tracing::debug!("Quiz payload has no usable questions");
        return None;
    }

    Some(QuizDefinition { questions })
}

/// Derives the presentation order for a definition from a seed.
///
/// The seed stream is consumed in a fixed order: one Fisher-Yates pass over
/// the question ids, then one pass per question over its option ids, taking
/// questions in authoring order.
pub fn create_quiz_session(definition: &QuizDefinition, seed: &str) -> QuizSession {
    let mut stream = SeedStream::from_seed(seed);

    let mut question_order: Vec<String> =
        definition.questions.iter().map(|q| q.id.clone()).collect();
    stream.shuffle(&mut question_order);

    let mut option_order_by_question = HashMap::with_capacity(definition.questions.len());
    for question in &definition.questions {
        let mut option_order: Vec<String> = question.options.iter().map(|o| o.id.clone()).collect();
        stream.shuffle(&mut option_order);
        option_order_by_question.insert(question.id.clone(), option_order);
    }

    QuizSession {
        seed: seed.to_string(),
        question_order,
        option_order_by_question,
    }
}

/// Lists question ids that are unanswered or answered with an unknown option.
/// Submission handlers call this before grading.
pub fn validate_submission(
    definition: &QuizDefinition,
    answers: &HashMap<String, String>,
) -> Result<(), Vec<String>> {
    let invalid: Vec<String> = definition
        .questions
        .iter()
        .filter(|q| !answers.get(&q.id).is_some_and(|a| q.has_option(a)))
        .map(|q| q.id.clone())
        .collect();

    if invalid.is_empty() {
        Ok(())
    } else {
        Err(invalid)
    }
}

/// `round(100 * correct / total)` with halves rounded up; 0 when `total == 0`.
pub fn score_percent(correct: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let correct = u64::from(correct);
    let total = u64::from(total);
    ((200 * correct + total) / (2 * total)) as u32
}

/// Grades submitted answers against the definition.
///
/// Correctness depends only on ids, never on display order; the breakdown is
/// listed in the session's question order. Missing answers count as wrong and
/// answers for unknown questions are ignored.
pub fn grade_quiz_session(
    definition: &QuizDefinition,
    session: &QuizSession,
    answers: &HashMap<String, String>,
    pass_threshold: u32,
) -> QuizResult {
    let mut ordered: Vec<&Question> = session
        .question_order
        .iter()
        .filter_map(|id| definition.question(id))
        .collect();
    for question in &definition.questions {
        if !session.question_order.contains(&question.id) {
            ordered.push(question);
        }
    }

    let breakdown: Vec<QuestionOutcome> = ordered
        .into_iter()
        .map(|q| {
            let selected = answers.get(&q.id).cloned();
            QuestionOutcome {
                question_id: q.id.clone(),
                correct: selected.as_deref() == Some(q.correct_option_id.as_str()),
                selected_option_id: selected,
            }
        })
        .collect();

    let total_questions = breakdown.len() as u32;
    let correct_answers = breakdown.iter().filter(|o| o.correct).count() as u32;
    let score_percent = score_percent(correct_answers, total_questions);
    let passed = total_questions > 0 && score_percent >= pass_threshold.min(100);

    QuizResult {
        score_percent,
        correct_answers,
        total_questions,
        passed,
        breakdown,
    }
}

impl QuizSession {
    /// Lays out the definition in this session's order, without answer keys.
    pub fn present(&self, definition: &QuizDefinition) -> PresentedQuiz {
        let questions = self
            .question_order
            .iter()
            .filter_map(|id| definition.question(id))
            .map(|q| {
                let options = match self.option_order_by_question.get(&q.id) {
                    Some(order) => order
                        .iter()
                        .filter_map(|oid| q.options.iter().find(|o| &o.id == oid))
                        .cloned()
                        .collect(),
                    None => q.options.clone(),
                };
                PresentedQuestion {
                    id: q.id.clone(),
                    prompt: q.prompt.clone(),
                    options,
                }
            })
            .collect();

        PresentedQuiz {
            seed: self.seed.clone(),
            questions,
        }
    }
}

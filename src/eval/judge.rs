//! Correctness grading: exact match or an evaluator model.
//!
//! Exact matching normalizes both sides before comparing:
//! `<think>` blocks removed, surrounding whitespace trimmed, inner whitespace
//! runs collapsed, trailing `.`, `!` and `?` dropped, case ignored.
//!
//! Evaluator replies are read leniently but fail closed: a reply counts as
//! correct only if it says "correct" as a word, carries no negative marker and
//! has no negation within the few words before any "correct".

use crate::llm::{ChatModel, Message, Prompts};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// Phrases that turn a reply containing "correct" into a failing verdict.
const NEGATIVE_MARKERS: &[&str] = &["incorrect", "partially correct"];

/// Words that negate a following "correct".
const NEGATIONS: &[&str] = &["not", "no", "never", "nor", "neither", "cannot", "hardly"];

/// How many words before "correct" are checked for a negation.
const NEGATION_WINDOW: usize = 3;

/// How a result was graded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "model", rename_all = "snake_case")]
pub enum GradingMethod {
    ExactMatch,
    Evaluator(String),
}

impl fmt::Display for GradingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GradingMethod::ExactMatch => write!(f, "exact match"),
            GradingMethod::Evaluator(model) => write!(f, "evaluator {}", model),
        }
    }
}

/// Outcome of grading one answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grade {
    pub correct: bool,
    /// Raw evaluator reply, when an evaluator was used and answered.
    pub verdict: Option<String>,
    /// Why grading could not complete, if it failed.
    pub error: Option<String>,
}

impl Grade {
    fn exact(correct: bool) -> Self {
        Self {
            correct,
            verdict: None,
            error: None,
        }
    }
}

/// Grades generated answers against reference answers.
pub struct Judge<'a, C: ChatModel> {
    client: &'a C,
    evaluator: Option<String>,
}

impl<'a, C: ChatModel> Judge<'a, C> {
    /// Use `evaluator` for grading if given, exact matching otherwise.
    pub fn new(client: &'a C, evaluator: Option<String>) -> Self {
        Self { client, evaluator }
    }

    pub fn method(&self) -> GradingMethod {
        match &self.evaluator {
            Some(model) => GradingMethod::Evaluator(model.clone()),
            None => GradingMethod::ExactMatch,
        }
    }

    /// Grade `generated` against `expected`. Never fails: evaluator errors
    /// grade as incorrect and are reported in [`Grade::error`].
    pub async fn grade(&self, question: &str, expected: &str, generated: &str) -> Grade {
        let Some(model) = &self.evaluator else {
            return Grade::exact(exact_match(generated, expected));
        };

        let messages = vec![
            Message::system(Prompts::evaluator_system()),
            Message::user(Prompts::evaluator_user(question, expected, generated)),
        ];

        match self.client.chat(model, messages).await {
            Ok(reply) => Grade {
                correct: parse_verdict(&reply),
                verdict: Some(reply),
                error: None,
            },
            Err(e) => {
                warn!(evaluator = %model, error = %e, "evaluator request failed, grading as incorrect");
                Grade {
                    correct: false,
                    verdict: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

/// Compare two answers after normalization.
pub fn exact_match(generated: &str, expected: &str) -> bool {
    normalize_answer(generated) == normalize_answer(expected)
}

/// Canonical form of an answer for exact matching.
pub fn normalize_answer(text: &str) -> String {
    let collapsed = strip_think(text)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    collapsed
        .trim_end_matches(['.', '!', '?'])
        .trim_end()
        .to_lowercase()
}

/// Read an evaluator reply as a pass/fail verdict.
pub fn parse_verdict(reply: &str) -> bool {
    let text = strip_think(reply).to_lowercase().replace('’', "'");
    let words: Vec<&str> = text
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|w| w.trim_matches('\''))
        .filter(|w| !w.is_empty())
        .collect();

    let joined = words.join(" ");
    if NEGATIVE_MARKERS.iter().any(|marker| joined.contains(marker)) {
        return false;
    }

    let mut affirmed = false;
    for (i, _) in words.iter().enumerate().filter(|(_, w)| **w == "correct") {
        let window = &words[i.saturating_sub(NEGATION_WINDOW)..i];
        if window.iter().any(|w| is_negation(w)) {
            return false;
        }
        affirmed = true;
    }
    affirmed
}

fn is_negation(word: &str) -> bool {
    NEGATIONS.contains(&word) || word.ends_with("n't")
}

/// Remove `<think>...</think>` reasoning blocks.
///
/// An unclosed `<think>` drops the rest of the text; a `</think>` with no
/// opening tag drops everything before it.
pub fn strip_think(text: &str) -> String {
    let mut rest = text;
    if let Some(close) = rest.find(THINK_CLOSE) {
        if !rest[..close].contains(THINK_OPEN) {
            rest = &rest[close + THINK_CLOSE.len()..];
        }
    }

    let mut out = String::with_capacity(rest.len());
    while let Some(start) = rest.find(THINK_OPEN) {
        out.push_str(&rest[..start]);
        let after = &rest[start + THINK_OPEN.len()..];
        match after.find(THINK_CLOSE) {
            Some(end) => rest = &after[end + THINK_CLOSE.len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

//! Prompts sent to the evaluator model.

/// Collection of prompts used for model-graded evaluation.
pub struct Prompts;

impl Prompts {
    /// System prompt instructing the evaluator to reply with a single verdict.
    pub fn evaluator_system() -> &'static str {
        "You are an evaluator. Compare the expected answer with the generated answer, \
ignore the tag <think> content, the generated answers may vary slightly in wording \
but should preserve the original meaning, and respond with only 'CORRECT' or 'INCORRECT'"
    }

    /// User message carrying the question and both answers.
    pub fn evaluator_user(question: &str, expected: &str, generated: &str) -> String {
        format!(
            "Question: {}\nExpected Answer: {}\nGenerated Answer: {}",
            question, expected, generated
        )
    }
}

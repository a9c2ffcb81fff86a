//! Evaluation module.
//!
//! This module provides:
//! - Test-case discovery (prompt/answer file pairing)
//! - Correctness grading by exact match or evaluator model
//! - The answer and evaluate stages of a benchmark run

pub mod benchmark;
pub mod dataset;
pub mod judge;

pub use benchmark::{
    CancelFlag, GeneratedAnswer, ResultRecord, Selection, evaluate_answers, generate_answers,
};
pub use dataset::{MATCH_ALL, TestCase, TestSuite, compile_pattern, matches_name};
pub use judge::{Grade, GradingMethod, Judge, exact_match, parse_verdict};

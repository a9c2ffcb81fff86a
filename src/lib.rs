//! Prompt Bench - benchmark language models against prompt/answer files.
//!
//! Sends every prompt in a directory to one or more models behind an
//! OpenAI-compatible chat-completion endpoint, grades each reply against the
//! reference answer with the same file name, and reports accuracy and latency
//! per model.
//!
//! # Quick Start
//!
//! ```no_run
//! use prompt_bench::{
//!     config::Config,
//!     eval::{CancelFlag, Judge, Selection, TestSuite, evaluate_answers, generate_answers},
//!     llm::LlmClient,
//!     persistence::AnswerStore,
//!     report::print_report,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     config.validate()?;
//!
//!     let client = LlmClient::new(&config)?;
//!     let store = AnswerStore::new(&config.output_dir);
//!     let suite = TestSuite::discover(&config.prompt_dir, &config.answer_dir, "*")?;
//!
//!     generate_answers(&client, &config.models, &suite, &store, &CancelFlag::new()).await?;
//!
//!     let judge = Judge::new(&client, config.evaluator.clone());
//!     let selection = Selection::new(&config.models, &suite);
//!     let records = evaluate_answers(&judge, &store, &selection).await?;
//!
//!     print_report(&records, &config.models);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Config**: settings from environment, `.env` and an optional YAML file
//! - **TestSuite**: prompt files paired with answer files by name
//! - **LlmClient**: OpenAI-compatible client behind the `ChatModel` trait
//! - **Judge**: exact-match or evaluator-model grading
//! - **AnswerStore**: JSON checkpoints between the answer, evaluate and render stages
//! - **report**: detailed and summary tables, HTML export

pub mod config;
pub mod error;
pub mod eval;
pub mod llm;
pub mod persistence;
pub mod report;

// Re-export commonly used types
pub use config::Config;
pub use error::{BenchError, Result};
pub use eval::{GeneratedAnswer, Judge, ResultRecord, TestCase, TestSuite};
pub use llm::{ChatModel, LlmClient};
pub use persistence::AnswerStore;

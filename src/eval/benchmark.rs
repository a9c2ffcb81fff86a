//! Answer and evaluate stages of a benchmark run.
//!
//! Both stages are strictly sequential: models in configured order, cases in
//! pairing order, one request at a time. A failing case is recorded and the
//! loop moves on.

use super::dataset::TestSuite;
use super::judge::{Grade, GradingMethod, Judge};
use crate::error::Result;
use crate::llm::ChatModel;
use crate::persistence::{AnswerStore, Keyed};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// One model's answer to one test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedAnswer {
    pub model: String,
    /// Test case file name.
    pub file: String,
    pub prompt: String,
    pub expected: String,
    pub generated: String,
    /// Seconds from request dispatch to full response (or failure).
    pub response_time: f64,
    /// Set when the answer could not be produced.
    #[serde(default)]
    pub error: Option<String>,
}

/// A graded answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub model: String,
    pub file: String,
    pub prompt: String,
    pub expected: String,
    pub generated: String,
    pub response_time: f64,
    pub correct: bool,
    pub method: GradingMethod,
    /// Raw evaluator reply.
    #[serde(default)]
    pub verdict: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ResultRecord {
    pub fn from_generated(answer: GeneratedAnswer, method: GradingMethod, grade: Grade) -> Self {
        Self {
            model: answer.model,
            file: answer.file,
            prompt: answer.prompt,
            expected: answer.expected,
            generated: answer.generated,
            response_time: answer.response_time,
            correct: grade.correct,
            method,
            verdict: grade.verdict,
            error: answer.error.or(grade.error),
        }
    }
}

/// The (model, file) pairs that belong to the current run.
///
/// Checkpoints keep results from earlier runs; only records for a configured
/// model and a currently paired test case are graded or reported.
#[derive(Debug, Clone, Copy)]
pub struct Selection<'a> {
    models: &'a [String],
    suite: &'a TestSuite,
}

impl<'a> Selection<'a> {
    pub fn new(models: &'a [String], suite: &'a TestSuite) -> Self {
        Self { models, suite }
    }

    /// Position of `(model, file)` in run order, if selected.
    fn rank(&self, model: &str, file: &str) -> Option<(usize, usize)> {
        let m = self.models.iter().position(|name| name == model)?;
        let f = self.suite.cases.iter().position(|case| case.name == file)?;
        Some((m, f))
    }

    pub fn contains(&self, model: &str, file: &str) -> bool {
        self.rank(model, file).is_some()
    }

    /// Keep selected records, ordered models outer, cases inner.
    pub fn apply<T: Keyed>(&self, records: Vec<T>) -> Vec<T> {
        let mut ranked: Vec<_> = records
            .into_iter()
            .filter_map(|r| {
                let (model, file) = r.key();
                self.rank(model, file).map(|rank| (rank, r))
            })
            .collect();
        ranked.sort_by_key(|(rank, _)| *rank);
        ranked.into_iter().map(|(_, r)| r).collect()
    }
}

/// Cooperative stop signal checked between cases.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Query every model with every case and checkpoint the answers.
///
/// Returns the answers produced by this run; the checkpoint also keeps
/// answers from earlier runs for other (model, file) pairs.
pub async fn generate_answers<C: ChatModel>(
    client: &C,
    models: &[String],
    suite: &TestSuite,
    store: &AnswerStore,
    cancel: &CancelFlag,
) -> Result<Vec<GeneratedAnswer>> {
    let mut answers = Vec::with_capacity(models.len() * suite.len());

    'models: for model in models {
        println!("\nTesting model: {}", model);
        println!("{}", "=".repeat(50));

        for case in &suite.cases {
            if cancel.is_cancelled() {
                warn!("interrupted, stopping before {} / {}", model, case.name);
                break 'models;
            }

            let inputs = case
                .read_prompt()
                .and_then(|prompt| Ok((prompt, case.read_expected()?)));
            let (prompt, expected) = match inputs {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(file = %case.name, error = %e, "failed to read test case");
                    answers.push(GeneratedAnswer {
                        model: model.clone(),
                        file: case.name.clone(),
                        prompt: String::new(),
                        expected: String::new(),
                        generated: String::new(),
                        response_time: 0.0,
                        error: Some(e.to_string()),
                    });
                    continue;
                }
            };

            let (outcome, elapsed) = client.infer(model, &prompt).await;
            let response_time = elapsed.as_secs_f64();

            let (generated, error) = match outcome {
                Ok(text) => {
                    if let Err(e) = store.write_answer_text(model, &case.name, &text) {
                        warn!(error = %e, "failed to write answer text");
                    }
                    (text, None)
                }
                Err(e) => {
                    warn!(model = %model, file = %case.name, error = %e, "inference failed");
                    println!("Error for {}: {}", case.name, e);
                    println!("Time elapsed before error: {:.2} seconds", response_time);
                    (String::new(), Some(e.to_string()))
                }
            };

            if error.is_none() {
                println!("File: {}", case.name);
                println!("Response Time: {:.2} seconds", response_time);
            }
            println!("{}", "-".repeat(40));

            answers.push(GeneratedAnswer {
                model: model.clone(),
                file: case.name.clone(),
                prompt,
                expected,
                generated,
                response_time,
                error,
            });
        }
    }

    store.merge_generated(answers.clone())?;
    Ok(answers)
}

/// Grade the checkpointed answers in `selection`.
///
/// Answers that failed to generate are graded incorrect without consulting
/// the evaluator.
pub async fn evaluate_answers<C: ChatModel>(
    judge: &Judge<'_, C>,
    store: &AnswerStore,
    selection: &Selection<'_>,
) -> Result<Vec<ResultRecord>> {
    let answers = selection.apply(store.load_generated()?);

    info!(answers = answers.len(), method = %judge.method(), "evaluating");
    let mut records = Vec::with_capacity(answers.len());

    for answer in answers {
        let grade = if answer.error.is_some() {
            Grade {
                correct: false,
                verdict: None,
                error: None,
            }
        } else {
            judge
                .grade(&answer.prompt, &answer.expected, &answer.generated)
                .await
        };

        println!(
            "{} / {}: {}",
            answer.model,
            answer.file,
            if grade.correct { "correct" } else { "incorrect" }
        );
        if !grade.correct {
            println!("  Expected:  {}", answer.expected);
            match &answer.error {
                Some(e) => println!("  Error:     {}", e),
                None => println!("  Generated: {}", answer.generated),
            }
        }

        records.push(ResultRecord::from_generated(answer, judge.method(), grade));
    }

    store.merge_evaluated(records.clone())?;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BenchError;
    use crate::eval::dataset::MATCH_ALL;
    use crate::llm::Message;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Replies per (model, last user message); unknown pairs fail like a dead server.
    #[derive(Default)]
    struct ScriptedModel {
        replies: HashMap<(String, String), String>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedModel {
        fn reply(mut self, model: &str, prompt: &str, answer: &str) -> Self {
            self.replies
                .insert((model.to_string(), prompt.to_string()), answer.to_string());
            self
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn chat(&self, model: &str, messages: Vec<Message>) -> Result<String> {
            let prompt = messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            self.calls
                .lock()
                .unwrap()
                .push((model.to_string(), prompt.clone()));
            self.replies
                .get(&(model.to_string(), prompt))
                .cloned()
                .ok_or_else(|| BenchError::Http("connection refused".to_string()))
        }
    }

    struct Fixture {
        _dir: TempDir,
        prompts: PathBuf,
        answers: PathBuf,
        suite: TestSuite,
        store: AnswerStore,
    }

    impl Fixture {
        fn rediscover(&self) -> TestSuite {
            TestSuite::discover(&self.prompts, &self.answers, MATCH_ALL).unwrap()
        }
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let prompts = dir.path().join("prompts");
        let answers = dir.path().join("answers");
        fs::create_dir(&prompts).unwrap();
        fs::create_dir(&answers).unwrap();

        fs::write(prompts.join("1-capital-italy.txt"), "What is the capital of Italy?").unwrap();
        fs::write(answers.join("1-capital-italy.txt"), "Rome").unwrap();
        fs::write(prompts.join("2-capital-france.txt"), "What is the capital of France?").unwrap();
        fs::write(answers.join("2-capital-france.txt"), "Paris").unwrap();
        fs::write(prompts.join("3-orphan.txt"), "No answer for this one").unwrap();

        let suite = TestSuite::discover(&prompts, &answers, MATCH_ALL).unwrap();
        let store = AnswerStore::new(dir.path().join("answers-generated"));
        Fixture {
            _dir: dir,
            prompts,
            answers,
            suite,
            store,
        }
    }

    fn models() -> Vec<String> {
        vec!["small".to_string(), "large".to_string()]
    }

    #[tokio::test]
    async fn test_unanswered_prompts_are_never_sent() {
        let fx = fixture();
        let client = ScriptedModel::default()
            .reply("small", "What is the capital of Italy?", "Rome.")
            .reply("small", "What is the capital of France?", "Lyon")
            .reply("large", "What is the capital of Italy?", "Rome")
            .reply("large", "What is the capital of France?", "Paris");

        let answers = generate_answers(&client, &models(), &fx.suite, &fx.store, &CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(answers.len(), 4);
        let calls = client.calls();
        assert_eq!(calls.len(), 4);
        assert!(calls.iter().all(|(_, p)| p != "No answer for this one"));

        // models outer, cases inner
        let order: Vec<_> = answers
            .iter()
            .map(|a| (a.model.as_str(), a.file.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("small", "1-capital-italy.txt"),
                ("small", "2-capital-france.txt"),
                ("large", "1-capital-italy.txt"),
                ("large", "2-capital-france.txt"),
            ]
        );
        assert_eq!(fx.store.load_generated().unwrap().len(), 4);
        assert!(fx.store.dir().join("small").join("1-capital-italy.txt").is_file());
    }

    #[tokio::test]
    async fn test_failed_request_is_recorded_and_run_continues() {
        let fx = fixture();
        // Nothing scripted for "small": every request fails.
        let client = ScriptedModel::default()
            .reply("large", "What is the capital of Italy?", "Rome")
            .reply("large", "What is the capital of France?", "Paris");

        let answers = generate_answers(&client, &models(), &fx.suite, &fx.store, &CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(answers.len(), 4);
        assert!(answers[0].error.as_deref().unwrap().contains("connection refused"));
        assert!(answers[0].generated.is_empty());
        assert!(answers[2].error.is_none());

        let models = models();
        let judge = Judge::new(&client, None);
        let records = evaluate_answers(&judge, &fx.store, &Selection::new(&models, &fx.suite))
            .await
            .unwrap();
        let correct: Vec<_> = records.iter().map(|r| r.correct).collect();
        assert_eq!(correct, vec![false, false, true, true]);
        assert!(records[0].error.is_some());
    }

    #[tokio::test]
    async fn test_unreadable_case_is_recorded_and_run_continues() {
        let fx = fixture();
        fs::remove_file(fx.answers.join("1-capital-italy.txt")).unwrap();
        let client = ScriptedModel::default()
            .reply("small", "What is the capital of France?", "Paris")
            .reply("large", "What is the capital of France?", "Paris");

        let answers = generate_answers(&client, &models(), &fx.suite, &fx.store, &CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(answers.len(), 4);
        assert_eq!(answers[0].file, "1-capital-italy.txt");
        assert!(answers[0].error.as_deref().unwrap().contains("1-capital-italy.txt"));
        assert!(answers[0].prompt.is_empty());
        assert_eq!(answers[1].generated, "Paris");
        assert!(answers[3].error.is_none());
        // the unreadable case never reaches the model
        let calls = client.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|(_, p)| p == "What is the capital of France?"));

        let models = models();
        let judge = Judge::new(&client, None);
        let records = evaluate_answers(&judge, &fx.store, &Selection::new(&models, &fx.suite))
            .await
            .unwrap();
        let correct: Vec<_> = records.iter().map(|r| r.correct).collect();
        assert_eq!(correct, vec![false, true, false, true]);
    }

    #[tokio::test]
    async fn test_rerun_reports_only_current_models_and_cases() {
        let fx = fixture();
        let client = ScriptedModel::default()
            .reply("small", "What is the capital of Italy?", "Rome")
            .reply("small", "What is the capital of France?", "Paris")
            .reply("large", "What is the capital of Italy?", "Rome")
            .reply("large", "What is the capital of France?", "Paris");
        let judge = Judge::new(&client, None);

        let first_models = models();
        generate_answers(&client, &first_models, &fx.suite, &fx.store, &CancelFlag::new())
            .await
            .unwrap();
        let first = evaluate_answers(&judge, &fx.store, &Selection::new(&first_models, &fx.suite))
            .await
            .unwrap();
        assert_eq!(first.len(), 4);

        // Second run: one model dropped, one answer file deleted.
        fs::remove_file(fx.answers.join("2-capital-france.txt")).unwrap();
        let suite = fx.rediscover();
        let second_models = vec!["small".to_string()];
        generate_answers(&client, &second_models, &suite, &fx.store, &CancelFlag::new())
            .await
            .unwrap();
        let selection = Selection::new(&second_models, &suite);
        let records = evaluate_answers(&judge, &fx.store, &selection)
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].model, "small");
        assert_eq!(records[0].file, "1-capital-italy.txt");

        // Checkpoint still holds the first run; the report does not.
        let saved = fx.store.load_evaluated().unwrap();
        assert_eq!(saved.len(), 4);
        let shown = selection.apply(saved);
        assert_eq!(shown.len(), 1);
        let table = crate::report::detailed_table(&shown);
        assert_eq!(table.lines().filter(|l| l.starts_with('|')).count(), 2);
        let summaries = crate::report::summarize(&shown, &second_models);
        assert_eq!(summaries.len(), 1);
        assert_eq!((summaries[0].correct, summaries[0].total), (1, 1));
    }

    #[test]
    fn test_selection_orders_by_model_then_case() {
        let fx = fixture();
        let models = models();
        let selection = Selection::new(&models, &fx.suite);
        let answer = |model: &str, file: &str| GeneratedAnswer {
            model: model.to_string(),
            file: file.to_string(),
            prompt: String::new(),
            expected: String::new(),
            generated: String::new(),
            response_time: 0.0,
            error: None,
        };

        let selected = selection.apply(vec![
            answer("large", "2-capital-france.txt"),
            answer("retired", "1-capital-italy.txt"),
            answer("small", "2-capital-france.txt"),
            answer("large", "1-capital-italy.txt"),
            answer("small", "deleted.txt"),
            answer("small", "1-capital-italy.txt"),
        ]);
        let keys: Vec<_> = selected
            .iter()
            .map(|a| (a.model.as_str(), a.file.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("small", "1-capital-italy.txt"),
                ("small", "2-capital-france.txt"),
                ("large", "1-capital-italy.txt"),
                ("large", "2-capital-france.txt"),
            ]
        );
        assert!(selection.contains("large", "1-capital-italy.txt"));
        assert!(!selection.contains("small", "3-orphan.txt"));
    }

    #[tokio::test]
    async fn test_exact_match_evaluation() {
        let fx = fixture();
        let client = ScriptedModel::default()
            .reply("small", "What is the capital of Italy?", "Rome.")
            .reply("small", "What is the capital of France?", "Lyon")
            .reply("large", "What is the capital of Italy?", "Paris")
            .reply("large", "What is the capital of France?", "paris");

        generate_answers(&client, &models(), &fx.suite, &fx.store, &CancelFlag::new())
            .await
            .unwrap();

        let models = models();
        let judge = Judge::new(&client, None);
        let records = evaluate_answers(&judge, &fx.store, &Selection::new(&models, &fx.suite))
            .await
            .unwrap();

        let correct: Vec<_> = records.iter().map(|r| r.correct).collect();
        assert_eq!(correct, vec![true, false, false, true]);
        assert!(records.iter().all(|r| r.method == GradingMethod::ExactMatch));
        // two models x three prompts, one without an answer: 4 rows + header
        let table = crate::report::detailed_table(&records);
        assert_eq!(table.lines().filter(|l| l.starts_with('|')).count(), 5);

        let saved = fx.store.load_evaluated().unwrap();
        assert_eq!(saved.len(), 4);
        assert_eq!(saved.iter().map(|r| r.correct).collect::<Vec<_>>(), correct);
    }

    #[tokio::test]
    async fn test_evaluator_graded_run() {
        let fx = fixture();
        let italy = "Question: What is the capital of Italy?\nExpected Answer: Rome\nGenerated Answer: It is Rome";
        let client = ScriptedModel::default()
            .reply("small", "What is the capital of Italy?", "It is Rome")
            .reply("judge", italy, "CORRECT");

        let models = vec!["small".to_string()];
        generate_answers(&client, &models, &fx.suite, &fx.store, &CancelFlag::new())
            .await
            .unwrap();

        let judge = Judge::new(&client, Some("judge".to_string()));
        let records = evaluate_answers(&judge, &fx.store, &Selection::new(&models, &fx.suite))
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert!(records[0].correct);
        assert_eq!(records[0].verdict.as_deref(), Some("CORRECT"));
        // France failed to generate: incorrect, evaluator not consulted.
        assert!(!records[1].correct);
        let judge_calls = client.calls().into_iter().filter(|(m, _)| m == "judge").count();
        assert_eq!(judge_calls, 1);
    }

    #[tokio::test]
    async fn test_evaluate_honours_pattern() {
        let fx = fixture();
        let client = ScriptedModel::default()
            .reply("small", "What is the capital of Italy?", "Rome")
            .reply("small", "What is the capital of France?", "Paris");
        let models = vec!["small".to_string()];
        generate_answers(&client, &models, &fx.suite, &fx.store, &CancelFlag::new())
            .await
            .unwrap();

        let italy = TestSuite::discover(&fx.prompts, &fx.answers, "*italy*").unwrap();
        let judge = Judge::new(&client, None);
        let records = evaluate_answers(&judge, &fx.store, &Selection::new(&models, &italy))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].file, "1-capital-italy.txt");
    }

    #[tokio::test]
    async fn test_cancelled_run_stops_and_checkpoints() {
        let fx = fixture();
        let client = ScriptedModel::default();
        let cancel = CancelFlag::new();
        cancel.cancel();

        let answers = generate_answers(&client, &models(), &fx.suite, &fx.store, &cancel)
            .await
            .unwrap();
        assert!(answers.is_empty());
        assert!(client.calls().is_empty());
        assert!(fx.store.generated_path().is_file());
    }

    #[test]
    fn test_evaluate_without_checkpoint_fails() {
        let dir = TempDir::new().unwrap();
        let store = AnswerStore::new(dir.path());
        let client = ScriptedModel::default();
        let judge = Judge::new(&client, None);
        let suite = TestSuite::default();

        let result = tokio_test::block_on(evaluate_answers(
            &judge,
            &store,
            &Selection::new(&[], &suite),
        ));
        assert!(matches!(result, Err(BenchError::ReportNotFound { .. })));
    }
}

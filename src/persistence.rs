//! Checkpoint files shared by the answer, evaluate and render stages.
//!
//! Layout under the output directory:
//! - `report.json`: generated answers, written by the answer stage
//! - `report-evaluated.json`: graded results, written by the evaluate stage
//! - `<model>/<file>`: raw generated answer text, for inspection

use crate::error::{BenchError, Result};
use crate::eval::{GeneratedAnswer, ResultRecord};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// File name of the generated-answers checkpoint.
pub const GENERATED_REPORT: &str = "report.json";

/// File name of the graded-results checkpoint.
pub const EVALUATED_REPORT: &str = "report-evaluated.json";

/// Records identified by (model, file).
pub trait Keyed {
    fn key(&self) -> (&str, &str);
}

impl Keyed for GeneratedAnswer {
    fn key(&self) -> (&str, &str) {
        (self.model.as_str(), self.file.as_str())
    }
}

impl Keyed for ResultRecord {
    fn key(&self) -> (&str, &str) {
        (self.model.as_str(), self.file.as_str())
    }
}

/// Merge `fresh` into `existing`: matching keys are replaced in place, new
/// keys appended in the order given.
pub fn merge_records<T: Keyed>(mut existing: Vec<T>, fresh: Vec<T>) -> Vec<T> {
    for record in fresh {
        match existing.iter().position(|r| r.key() == record.key()) {
            Some(idx) => existing[idx] = record,
            None => existing.push(record),
        }
    }
    existing
}

/// Directory holding the run's checkpoint files.
#[derive(Debug, Clone)]
pub struct AnswerStore {
    dir: PathBuf,
}

impl AnswerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn generated_path(&self) -> PathBuf {
        self.dir.join(GENERATED_REPORT)
    }

    pub fn evaluated_path(&self) -> PathBuf {
        self.dir.join(EVALUATED_REPORT)
    }

    /// Load generated answers written by the answer stage.
    pub fn load_generated(&self) -> Result<Vec<GeneratedAnswer>> {
        load_json(&self.generated_path(), "answer")
    }

    /// Load graded results written by the evaluate stage.
    pub fn load_evaluated(&self) -> Result<Vec<ResultRecord>> {
        load_json(&self.evaluated_path(), "evaluate")
    }

    /// Merge `fresh` into the generated-answers checkpoint and save it.
    pub fn merge_generated(&self, fresh: Vec<GeneratedAnswer>) -> Result<Vec<GeneratedAnswer>> {
        let path = self.generated_path();
        let existing = if path.is_file() {
            self.load_generated()?
        } else {
            Vec::new()
        };
        let merged = merge_records(existing, fresh);
        save_json(&merged, &path)?;
        info!(path = %path.display(), records = merged.len(), "saved generated answers");
        Ok(merged)
    }

    /// Merge `fresh` into the graded-results checkpoint and save it.
    pub fn merge_evaluated(&self, fresh: Vec<ResultRecord>) -> Result<Vec<ResultRecord>> {
        let path = self.evaluated_path();
        let existing = if path.is_file() {
            self.load_evaluated()?
        } else {
            Vec::new()
        };
        let merged = merge_records(existing, fresh);
        save_json(&merged, &path)?;
        info!(path = %path.display(), records = merged.len(), "saved evaluated results");
        Ok(merged)
    }

    /// Write one model's raw answer to `<dir>/<model>/<file>`.
    pub fn write_answer_text(&self, model: &str, file: &str, text: &str) -> Result<PathBuf> {
        let model_dir = self.dir.join(sanitize_component(model));
        fs::create_dir_all(&model_dir).map_err(|e| BenchError::io(&model_dir, e))?;
        let path = model_dir.join(sanitize_component(file));
        fs::write(&path, text).map_err(|e| BenchError::io(&path, e))?;
        Ok(path)
    }
}

/// Make a model or file name safe to use as a single path component.
pub fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        cleaned.replace('.', "_") + "_"
    } else {
        cleaned
    }
}

fn save_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| BenchError::io(parent, e))?;
        }
    }

    let data = serde_json::to_string_pretty(value)
        .map_err(|e| BenchError::Serialization(e.to_string()))?;
    fs::write(path, data).map_err(|e| BenchError::io(path, e))?;
    Ok(())
}

fn load_json<T: DeserializeOwned>(path: &Path, stage: &'static str) -> Result<T> {
    if !path.exists() {
        return Err(BenchError::ReportNotFound {
            path: path.to_path_buf(),
            stage,
        });
    }

    let content = fs::read_to_string(path).map_err(|e| BenchError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| BenchError::Serialization(e.to_string()))
}

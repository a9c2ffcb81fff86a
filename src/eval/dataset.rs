//! Test-case discovery.
//!
//! A test case is a prompt file plus the answer file with the same name in
//! the answer directory. Prompts without an answer are dropped before any
//! model is queried.

use crate::error::{BenchError, Result};
use glob::{MatchOptions, Pattern};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Pattern used when no filter is given.
pub const MATCH_ALL: &str = "*";

/// A prompt file paired with its reference answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    /// Shared file name, used as the case identifier.
    pub name: String,
    pub prompt_path: PathBuf,
    pub answer_path: PathBuf,
}

impl TestCase {
    /// Read the prompt text, trimmed.
    pub fn read_prompt(&self) -> Result<String> {
        read_trimmed(&self.prompt_path)
    }

    /// Read the reference answer, trimmed.
    pub fn read_expected(&self) -> Result<String> {
        read_trimmed(&self.answer_path)
    }
}

/// The cases selected for a run.
#[derive(Debug, Clone, Default)]
pub struct TestSuite {
    /// Paired cases, sorted by file name.
    pub cases: Vec<TestCase>,
    /// Prompt files that matched the pattern but have no answer file.
    pub skipped: Vec<String>,
}

impl TestSuite {
    /// Scan `prompt_dir` for files matching `pattern` and pair each with
    /// `answer_dir/<same name>`.
    pub fn discover(prompt_dir: &Path, answer_dir: &Path, pattern: &str) -> Result<Self> {
        let filter = compile_pattern(pattern)?;
        let mut suite = TestSuite::default();

        let entries = WalkDir::new(prompt_dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by_file_name();

        for entry in entries {
            let entry = entry.map_err(|e| BenchError::io(prompt_dir, e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let Some(name) = entry.file_name().to_str() else {
                warn!(path = %entry.path().display(), "skipping prompt with non UTF-8 name");
                continue;
            };

            if !matches_name(&filter, name) {
                continue;
            }

            let answer_path = answer_dir.join(name);
            if !answer_path.is_file() {
                warn!(file = name, "skipping prompt: no matching answer file");
                suite.skipped.push(name.to_string());
                continue;
            }

            debug!(file = name, "paired test case");
            suite.cases.push(TestCase {
                name: name.to_string(),
                prompt_path: entry.path().to_path_buf(),
                answer_path,
            });
        }

        Ok(suite)
    }

    /// Number of paired cases.
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// Check if no case was paired.
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

/// Compile a glob pattern for file-name filtering.
pub fn compile_pattern(pattern: &str) -> Result<Pattern> {
    Pattern::new(pattern).map_err(|e| BenchError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

/// Match a bare file name; a leading dot must be matched literally, as in shell globbing.
pub fn matches_name(pattern: &Pattern, name: &str) -> bool {
    let options = MatchOptions {
        require_literal_leading_dot: true,
        ..MatchOptions::default()
    };
    pattern.matches_with(name, options)
}

fn read_trimmed(path: &Path) -> Result<String> {
    let content = fs::read_to_string(path).map_err(|e| BenchError::io(path, e))?;
    Ok(content.trim().to_string())
}

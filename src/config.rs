//! Configuration for the benchmark runner.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values.

use crate::error::{BenchError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

pub const DEFAULT_PROMPT_DIR: &str = "prompts";
pub const DEFAULT_ANSWER_DIR: &str = "answers";
pub const DEFAULT_OUTPUT_DIR: &str = "answers-generated";
pub const DEFAULT_ENDPOINT_URL: &str = "http://localhost:9292/v1/chat/completions";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 600;

/// Full application configuration.
///
/// Built once at startup and handed to each component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding prompt files.
    pub prompt_dir: PathBuf,

    /// Directory holding reference answers, one per prompt file name.
    pub answer_dir: PathBuf,

    /// Directory for generated answers and reports.
    pub output_dir: PathBuf,

    /// Full chat-completion URL (e.g., "http://localhost:9292/v1/chat/completions")
    pub endpoint_url: String,

    /// Bearer token, sent only when present
    pub api_key: Option<String>,

    /// Models under test, in run order
    pub models: Vec<String>,

    /// Model used to grade answers; exact matching is used when absent
    pub evaluator: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Sampling temperature (optional)
    pub temperature: Option<f32>,

    /// Maximum tokens for response (optional)
    pub max_tokens: Option<u32>,
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prompt_dir: PathBuf::from(DEFAULT_PROMPT_DIR),
            answer_dir: PathBuf::from(DEFAULT_ANSWER_DIR),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            endpoint_url: DEFAULT_ENDPOINT_URL.to_string(),
            api_key: None,
            models: Vec::new(),
            evaluator: None,
            request_timeout_secs: default_request_timeout_secs(),
            temperature: None,
            max_tokens: None,
        }
    }
}

/// Configuration file structure (YAML format).
#[derive(Debug, Deserialize)]
struct ConfigFile {
    prompt_dir: Option<PathBuf>,
    answer_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    endpoint_url: Option<String>,
    api_key: Option<String>,
    models: Option<Vec<String>>,
    evaluator: Option<String>,
    request_timeout_secs: Option<u64>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl Config {
    /// Load configuration from environment variables and optional config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (PROMPT_DIR, ANSWER_DIR, OUTPUT_DIR, ENDPOINT_URL,
    ///    API_KEY, MODEL_NAMES, MODEL_EVALUATOR, REQUEST_TIMEOUT_SECS,
    ///    TEMPERATURE, MAX_TOKENS)
    /// 2. Config file (~/.config/prompt-bench/config.yaml)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                config = Self::load_from_file(&config_path)?;
            }
        }

        config.apply_overrides(|key| env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BenchError::io(path, e))?;

        let file: ConfigFile = serde_yaml::from_str(&content)
            .map_err(|e| BenchError::Config(format!("Failed to parse config file: {}", e)))?;

        let mut config = Config::default();

        if let Some(prompt_dir) = file.prompt_dir {
            config.prompt_dir = prompt_dir;
        }
        if let Some(answer_dir) = file.answer_dir {
            config.answer_dir = answer_dir;
        }
        if let Some(output_dir) = file.output_dir {
            config.output_dir = output_dir;
        }
        if let Some(endpoint_url) = file.endpoint_url {
            config.endpoint_url = endpoint_url;
        }
        config.api_key = non_blank(file.api_key);
        if let Some(models) = file.models {
            config.models = dedup_models(models);
        }
        config.evaluator = non_blank(file.evaluator);
        if let Some(timeout) = file.request_timeout_secs {
            config.request_timeout_secs = timeout;
        }
        config.temperature = file.temperature;
        config.max_tokens = file.max_tokens;

        Ok(config)
    }

    /// Override fields from a key lookup (the process environment in `load`).
    ///
    /// Unparseable numeric values are ignored and the previous value kept.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("PROMPT_DIR") {
            self.prompt_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("ANSWER_DIR") {
            self.answer_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup("ENDPOINT_URL") {
            self.endpoint_url = url;
        }
        if let Some(key) = lookup("API_KEY") {
            self.api_key = non_blank(Some(key));
        }
        if let Some(names) = lookup("MODEL_NAMES") {
            self.models = parse_model_names(&names);
        }
        if let Some(evaluator) = lookup("MODEL_EVALUATOR") {
            self.evaluator = non_blank(Some(evaluator));
        }
        if let Some(timeout) = lookup("REQUEST_TIMEOUT_SECS") {
            if let Ok(secs) = timeout.trim().parse() {
                self.request_timeout_secs = secs;
            }
        }
        if let Some(temperature) = lookup("TEMPERATURE") {
            if let Ok(temp) = temperature.trim().parse() {
                self.temperature = Some(temp);
            }
        }
        if let Some(max_tokens) = lookup("MAX_TOKENS") {
            if let Ok(tokens) = max_tokens.trim().parse() {
                self.max_tokens = Some(tokens);
            }
        }
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "prompt-bench")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Validate that required configuration is present and the directories are usable.
    ///
    /// Creates the output directory if it does not exist yet.
    pub fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            return Err(BenchError::Config(
                "MODEL_NAMES is required. Set it to a comma-separated list of model identifiers."
                    .to_string(),
            ));
        }

        if self.endpoint_url.trim().is_empty() {
            return Err(BenchError::Config(
                "ENDPOINT_URL must not be empty.".to_string(),
            ));
        }

        if !self.prompt_dir.is_dir() {
            return Err(BenchError::InvalidDirectory {
                setting: "PROMPT_DIR",
                path: self.prompt_dir.clone(),
            });
        }

        if !self.answer_dir.is_dir() {
            return Err(BenchError::InvalidDirectory {
                setting: "ANSWER_DIR",
                path: self.answer_dir.clone(),
            });
        }

        std::fs::create_dir_all(&self.output_dir).map_err(|e| {
            BenchError::Config(format!(
                "OUTPUT_DIR '{}' cannot be created: {}",
                self.output_dir.display(),
                e
            ))
        })?;

        Ok(())
    }

    /// Create a config from explicit values (useful for testing).
    pub fn with_models(
        endpoint_url: impl Into<String>,
        models: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            models: dedup_models(models.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }
}

/// Split a comma-separated model list, dropping blanks and repeats.
pub fn parse_model_names(raw: &str) -> Vec<String> {
    dedup_models(raw.split(',').map(str::to_string).collect())
}

fn dedup_models(models: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(models.len());
    for model in models {
        let model = model.trim();
        if !model.is_empty() && !out.iter().any(|m| m == model) {
            out.push(model.to_string());
        }
    }
    out
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.prompt_dir, PathBuf::from("prompts"));
        assert_eq!(config.answer_dir, PathBuf::from("answers"));
        assert_eq!(config.output_dir, PathBuf::from("answers-generated"));
        assert_eq!(
            config.endpoint_url,
            "http://localhost:9292/v1/chat/completions"
        );
        assert!(config.api_key.is_none());
        assert!(config.models.is_empty());
        assert!(config.evaluator.is_none());
        assert_eq!(config.request_timeout_secs, 600);
    }

    #[test]
    fn test_parse_model_names() {
        let models = parse_model_names(" gemma-3-270m , ,Qwen3-8B,gemma-3-270m,");
        assert_eq!(models, vec!["gemma-3-270m", "Qwen3-8B"]);
        assert!(parse_model_names(" , ").is_empty());
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.apply_overrides(lookup_from(&[
            ("PROMPT_DIR", "p"),
            ("ANSWER_DIR", "a"),
            ("ENDPOINT_URL", "http://example.com/v1/chat/completions"),
            ("API_KEY", "secret"),
            ("MODEL_NAMES", "m1,m2"),
            ("MODEL_EVALUATOR", "judge"),
            ("REQUEST_TIMEOUT_SECS", "30"),
            ("TEMPERATURE", "not-a-number"),
        ]));

        assert_eq!(config.prompt_dir, PathBuf::from("p"));
        assert_eq!(config.answer_dir, PathBuf::from("a"));
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.models, vec!["m1", "m2"]);
        assert_eq!(config.evaluator.as_deref(), Some("judge"));
        assert_eq!(config.request_timeout_secs, 30);
        assert!(config.temperature.is_none());
    }

    #[test]
    fn test_blank_evaluator_means_exact_match() {
        let mut config = Config::default();
        config.apply_overrides(lookup_from(&[("MODEL_EVALUATOR", "  "), ("API_KEY", "")]));
        assert!(config.evaluator.is_none());
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_validate_requires_models() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("MODEL_NAMES"));
    }

    #[test]
    fn test_validate_checks_directories() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::with_models(DEFAULT_ENDPOINT_URL, ["m1"]);
        config.prompt_dir = dir.path().join("missing");
        config.answer_dir = dir.path().to_path_buf();

        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            BenchError::InvalidDirectory {
                setting: "PROMPT_DIR",
                ..
            }
        ));

        config.prompt_dir = dir.path().to_path_buf();
        config.output_dir = dir.path().join("out").join("nested");
        config.validate().unwrap();
        assert!(config.output_dir.is_dir());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "endpoint_url: http://gpu-box:8080/v1/chat/completions\nmodels: [a, b, a]\nevaluator: judge-8b\nmax_tokens: 256\n",
        )
        .unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.endpoint_url, "http://gpu-box:8080/v1/chat/completions");
        assert_eq!(config.models, vec!["a", "b"]);
        assert_eq!(config.evaluator.as_deref(), Some("judge-8b"));
        assert_eq!(config.max_tokens, Some(256));
        assert_eq!(config.prompt_dir, PathBuf::from("prompts"));
    }
}

use crate::edit::EditKind;
use crate::program::Selection;
use crate::search::SearchConfig;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Component, Path};
use std::time::Duration;

/// Everything needed to build a [`Program`](crate::Program) and search it.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ProgramConfig {
    /// Shell command run inside the sandbox to evaluate a candidate.
    pub test_command: String,
    /// Files to mutate, relative to the project root.
    pub target_files: Vec<String>,
    /// Reject candidates that add tree-sitter syntax errors without running
    /// the test command.
    #[serde(default)]
    pub validate_syntax: bool,
    /// Per-file modification point weights, keyed by target file.
    #[serde(default)]
    pub weights: BTreeMap<String, Vec<f64>>,
    #[serde(default)]
    pub search: SearchSettings,
}

impl ProgramConfig {
    pub fn new<I, S>(test_command: impl Into<String>, target_files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            test_command: test_command.into(),
            target_files: target_files.into_iter().map(Into::into).collect(),
            validate_syntax: false,
            weights: BTreeMap::new(),
            search: SearchSettings::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.test_command.trim().is_empty() {
            issues.push(ValidationIssue::MissingField {
                field: "test_command",
            });
        }

        if self.target_files.is_empty() {
            issues.push(ValidationIssue::EmptyTargetList);
        }

        let mut seen = HashSet::new();
        for file in &self.target_files {
            if file.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    field: "target_files[]",
                });
                continue;
            }
            if !seen.insert(file.as_str()) {
                issues.push(ValidationIssue::DuplicateTarget { file: file.clone() });
            }
            let path = Path::new(file);
            if path.is_absolute() {
                issues.push(ValidationIssue::InvalidTarget {
                    file: file.clone(),
                    message: "must be relative to the project root".to_string(),
                });
            } else if path.components().any(|c| matches!(c, Component::ParentDir)) {
                issues.push(ValidationIssue::InvalidTarget {
                    file: file.clone(),
                    message: "may not contain '..'".to_string(),
                });
            }
        }

        for (file, weights) in &self.weights {
            if !self.target_files.contains(file) {
                issues.push(ValidationIssue::InvalidWeights {
                    file: file.clone(),
                    message: "not a target file".to_string(),
                });
            }
            if let Err(message) = check_weights(weights) {
                issues.push(ValidationIssue::InvalidWeights {
                    file: file.clone(),
                    message,
                });
            }
        }

        if let Err(found) = self.search.validate() {
            issues.extend(found);
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

/// Weights must be finite, non-negative and not all zero.
pub fn check_weights(weights: &[f64]) -> Result<(), String> {
    if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
        return Err(format!("weight {bad} is not a non-negative finite number"));
    }
    if !weights.is_empty() && weights.iter().all(|w| *w == 0.0) {
        return Err("weights are all zero".to_string());
    }
    Ok(())
}

/// Search strategy.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    #[default]
    Local,
    Tabu,
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Strategy::Local),
            "tabu" => Ok(Strategy::Tabu),
            other => Err(format!("unknown strategy '{other}' (expected local or tabu)")),
        }
    }
}

/// Search knobs; command-line flags override them.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SearchSettings {
    pub warmup_reps: usize,
    pub epochs: usize,
    pub max_iter: usize,
    pub timeout_secs: f64,
    pub seed: Option<u64>,
    pub strategy: Strategy,
    pub removal_probability: f64,
    pub selection: Selection,
    pub operators: Vec<EditKind>,
    pub tabu_attempts: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            warmup_reps: 1,
            epochs: 5,
            max_iter: 100,
            timeout_secs: 15.0,
            seed: None,
            strategy: Strategy::Local,
            removal_probability: 0.5,
            selection: Selection::Random,
            operators: vec![EditKind::Replacement, EditKind::Insertion, EditKind::Deletion],
            tabu_attempts: 1000,
        }
    }
}

impl SearchSettings {
    fn validate(&self) -> Result<(), Vec<ValidationIssue>> {
        let mut issues = Vec::new();
        let mut bad = |field: &'static str, message: &str| {
            issues.push(ValidationIssue::InvalidValue {
                field,
                message: message.to_string(),
            })
        };

        if self.warmup_reps == 0 {
            bad("search.warmup_reps", "must be at least 1");
        }
        if self.epochs == 0 {
            bad("search.epochs", "must be at least 1");
        }
        if self.max_iter == 0 {
            bad("search.max_iter", "must be at least 1");
        }
        if self.timeout_secs <= 0.0 || Duration::try_from_secs_f64(self.timeout_secs).is_err() {
            bad("search.timeout_secs", "must be a positive, representable number of seconds");
        }
        if !(0.0..=1.0).contains(&self.removal_probability) {
            bad("search.removal_probability", "must lie in [0, 1]");
        }
        if self.operators.is_empty() {
            bad("search.operators", "must name at least one edit kind");
        }
        if self.tabu_attempts == 0 {
            bad("search.tabu_attempts", "must be at least 1");
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }

    /// Saturates at [`Duration::MAX`] for values that fail validation.
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_secs).unwrap_or(Duration::MAX)
    }

    pub fn search_config(&self) -> SearchConfig {
        SearchConfig {
            warmup_reps: self.warmup_reps,
            epochs: self.epochs,
            max_iter: self.max_iter,
            timeout: self.timeout(),
            seed: self.seed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationIssue {
    EmptyTargetList,
    MissingField {
        field: &'static str,
    },
    DuplicateTarget {
        file: String,
    },
    InvalidTarget {
        file: String,
        message: String,
    },
    InvalidWeights {
        file: String,
        message: String,
    },
    InvalidValue {
        field: &'static str,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyTargetList => write!(f, "config lists no target files"),
            ValidationIssue::MissingField { field } => {
                write!(f, "missing required field '{field}'")
            }
            ValidationIssue::DuplicateTarget { file } => {
                write!(f, "target file '{file}' is listed more than once")
            }
            ValidationIssue::InvalidTarget { file, message } => {
                write!(f, "target file '{file}' {message}")
            }
            ValidationIssue::InvalidWeights { file, message } => {
                write!(f, "weights for '{file}': {message}")
            }
            ValidationIssue::InvalidValue { field, message } => {
                write!(f, "'{field}' {message}")
            }
        }
    }
}

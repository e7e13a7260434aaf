use crate::config::schema::{ProgramConfig, ValidationError};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Dotfile looked up in the project root, TOML flavour.
pub const TOML_DOTFILE: &str = ".graft.toml";
/// Dotfile looked up in the project root, JSON flavour.
pub const JSON_DOTFILE: &str = ".graft.json";

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Json {
        path: Option<PathBuf>,
        source: serde_json::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
    UnsupportedFormat {
        path: PathBuf,
    },
    NotFound {
        project: PathBuf,
    },
}

impl ConfigError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            ConfigError::Toml { path: None, source } => ConfigError::Toml {
                path: Some(path),
                source,
            },
            ConfigError::Json { path: None, source } => ConfigError::Json {
                path: Some(path),
                source,
            },
            ConfigError::Validation { path: None, source } => ConfigError::Validation {
                path: Some(path),
                source,
            },
            other => other,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read config from {}: {}", path.display(), source)
            }
            ConfigError::Toml { path, source } => match path {
                Some(path) => write!(
                    f,
                    "failed to parse config TOML ({}): {}",
                    path.display(),
                    source
                ),
                None => write!(f, "failed to parse config TOML: {}", source),
            },
            ConfigError::Json { path, source } => match path {
                Some(path) => write!(
                    f,
                    "failed to parse config JSON ({}): {}",
                    path.display(),
                    source
                ),
                None => write!(f, "failed to parse config JSON: {}", source),
            },
            ConfigError::Validation { path, source } => match path {
                Some(path) => write!(f, "invalid config ({}): {}", path.display(), source),
                None => write!(f, "invalid config: {}", source),
            },
            ConfigError::UnsupportedFormat { path } => write!(
                f,
                "unsupported config format: {} (expected .toml or .json)",
                path.display()
            ),
            ConfigError::NotFound { project } => write!(
                f,
                "no {TOML_DOTFILE} or {JSON_DOTFILE} found in {}",
                project.display()
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Json { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
            ConfigError::UnsupportedFormat { .. } | ConfigError::NotFound { .. } => None,
        }
    }
}

fn validated(config: ProgramConfig) -> Result<ProgramConfig, ConfigError> {
    config
        .validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(config)
}

/// Parse and validate a TOML config.
pub fn load_from_str(input: &str) -> Result<ProgramConfig, ConfigError> {
    let config: ProgramConfig = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml { path: None, source })?;
    validated(config)
}

/// Parse and validate a JSON config.
pub fn load_from_json_str(input: &str) -> Result<ProgramConfig, ConfigError> {
    let config: ProgramConfig = serde_json::from_str(input)
        .map_err(|source| ConfigError::Json { path: None, source })?;
    validated(config)
}

/// Load a config file, picking the format from its extension.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<ProgramConfig, ConfigError> {
    let path = path.as_ref();
    let parse: fn(&str) -> Result<ProgramConfig, ConfigError> = match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => load_from_str,
        Some("json") => load_from_json_str,
        _ => {
            return Err(ConfigError::UnsupportedFormat {
                path: path.to_path_buf(),
            })
        }
    };
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&contents).map_err(|error| error.with_path(path))
}

/// Load the project's dotfile; `.graft.toml` wins over `.graft.json`.
pub fn load_from_project(project: impl AsRef<Path>) -> Result<ProgramConfig, ConfigError> {
    let project = project.as_ref();
    for name in [TOML_DOTFILE, JSON_DOTFILE] {
        let candidate = project.join(name);
        if candidate.is_file() {
            return load_from_path(candidate);
        }
    }
    Err(ConfigError::NotFound {
        project: project.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::Strategy;
    use crate::edit::EditKind;
    use crate::program::Selection;

    #[test]
    fn toml_with_search_section() {
        let config = load_from_str(
            r#"
test_command = "python3 run_tests.py"
target_files = ["triangle.py"]
validate_syntax = true

[weights]
"triangle.py" = [1.0, 0.0, 2.0]

[search]
epochs = 2
max_iter = 50
timeout_secs = 3.5
seed = 7
strategy = "tabu"
selection = "weighted"
operators = ["deletion", "moving"]
"#,
        )
        .unwrap();
        assert_eq!(config.target_files, vec!["triangle.py"]);
        assert!(config.validate_syntax);
        assert_eq!(config.weights["triangle.py"], vec![1.0, 0.0, 2.0]);
        assert_eq!(config.search.epochs, 2);
        assert_eq!(config.search.max_iter, 50);
        assert_eq!(config.search.seed, Some(7));
        assert_eq!(config.search.strategy, Strategy::Tabu);
        assert_eq!(config.search.selection, Selection::Weighted);
        assert_eq!(config.search.operators, vec![EditKind::Deletion, EditKind::Moving]);
        assert_eq!(config.search.warmup_reps, 1);
    }

    #[test]
    fn json_config() {
        let config = load_from_json_str(
            r#"{"test_command": "make test", "target_files": ["a.c", "b.c"]}"#,
        )
        .unwrap();
        assert_eq!(config.test_command, "make test");
        assert_eq!(config.target_files.len(), 2);
        assert!(!config.validate_syntax);
    }

    #[test]
    fn syntax_and_validation_errors_are_distinguished() {
        assert!(matches!(
            load_from_str("test_command = "),
            Err(ConfigError::Toml { path: None, .. })
        ));
        assert!(matches!(
            load_from_str("test_command = \"x\"\ntarget_files = []\n"),
            Err(ConfigError::Validation { path: None, .. })
        ));
    }

    #[test]
    fn project_dotfile_prefers_toml() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(JSON_DOTFILE),
            r#"{"test_command": "json", "target_files": ["a.py"]}"#,
        )
        .unwrap();
        assert_eq!(load_from_project(dir.path()).unwrap().test_command, "json");

        fs::write(
            dir.path().join(TOML_DOTFILE),
            "test_command = \"toml\"\ntarget_files = [\"a.py\"]\n",
        )
        .unwrap();
        assert_eq!(load_from_project(dir.path()).unwrap().test_command, "toml");
    }

    #[test]
    fn errors_carry_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "target_files = []\n").unwrap();
        let error = load_from_path(&path).unwrap_err();
        assert!(error.to_string().contains("bad.toml"));

        assert!(matches!(
            load_from_path(dir.path().join("config.yaml")),
            Err(ConfigError::UnsupportedFormat { .. })
        ));
        assert!(matches!(
            load_from_project(dir.path()),
            Err(ConfigError::NotFound { .. })
        ));
    }
}

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to set language {language} for parser")]
    LanguageSet { language: &'static str },

    #[error("failed to parse {language} source")]
    ParseFailed { language: &'static str },

    #[error("no engine registered for {path}")]
    NoEngine { path: PathBuf },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub mod loader;
pub mod schema;

pub use loader::{
    load_from_json_str, load_from_path, load_from_project, load_from_str, ConfigError,
    JSON_DOTFILE, TOML_DOTFILE,
};
pub use schema::{
    check_weights, ProgramConfig, SearchSettings, Strategy, ValidationError, ValidationIssue,
};

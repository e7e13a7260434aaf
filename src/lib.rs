//! Graft: genetic improvement of source code
//!
//! Graft mutates a target program at statement (tree) or line granularity,
//! runs the program's own test command on each mutant and searches for a
//! patch that improves a user-defined fitness.
//!
//! # Architecture
//!
//! - An [`Engine`](engine::Engine) parses a file into [`Content`](engine::Content)
//!   and enumerates its modification points, each a [`Position`] path of
//!   `(container, index)` steps.
//! - An [`Edit`] names its target and ingredient by point index into the
//!   pristine tables of a [`Program`]. A [`Patch`] applies its edits in order
//!   to a copy of the contents, rewriting a working copy of the tables as
//!   insertions shift siblings.
//! - The [`harness`] writes a patch into the program's sandbox, runs the test
//!   command under a timeout and classifies the outcome.
//! - [`LocalSearch`] and [`TabuSearch`] drive epochs of neighbour generation
//!   and evaluation through [`SearchHooks`].
//!
//! # Example
//!
//! ```no_run
//! use graft::fitness::StdoutNumber;
//! use graft::search::{LocalSearch, RandomEdits, SearchConfig};
//! use graft::{Program, ProgramConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ProgramConfig::new("python3 run_tests.py", ["triangle.py"]);
//! let program = Program::builder("sample/triangle").config(config).build()?;
//!
//! let mut search = LocalSearch::new(&program, RandomEdits::default(), StdoutNumber);
//! let report = search.run(&SearchConfig::default())?;
//! for epoch in &report.epochs {
//!     println!("{} {} {}", epoch.epoch, epoch.best_fitness, epoch.best);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod edit;
pub mod engine;
pub mod exec;
pub mod fitness;
pub mod harness;
pub mod patch;
pub mod pool;
pub mod position;
pub mod program;
pub mod safety;
pub mod sandbox;
pub mod search;
pub mod validate;

// Re-exports
pub use config::{load_from_path, load_from_project, ConfigError, ProgramConfig, SearchSettings};
pub use edit::{Edit, EditKind, Point};
pub use engine::{Content, Direction, Engine, EngineError, EngineMap, Language};
pub use harness::{evaluate, Evaluation, HarnessError, Status};
pub use patch::{Applied, Patch, PatchError};
pub use position::{shift_table, Position, Step};
pub use program::{Program, ProgramBuilder, ProgramError, Selection};
pub use search::{
    EpochReport, LocalSearch, SearchConfig, SearchError, SearchHooks, SearchReport, TabuSearch,
};

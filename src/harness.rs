//! Evaluation of one candidate patch.

use crate::exec::{run_command, ExecError, RunOutcome};
use crate::fitness::FitnessFunction;
use crate::patch::{Patch, PatchError};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Outcome class of an evaluation. Only `Success` carries a fitness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success,
    Timeout,
    ParseError,
    /// An edit could not be applied, or the result failed syntax validation.
    Invalid,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Success => "SUCCESS",
            Status::Timeout => "TIMEOUT",
            Status::ParseError => "PARSE_ERROR",
            Status::Invalid => "INVALID",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub status: Status,
    pub fitness: Option<f64>,
    pub elapsed: Duration,
}

impl Evaluation {
    fn failed(status: Status, elapsed: Duration) -> Self {
        Self {
            status,
            fitness: None,
            elapsed,
        }
    }
}

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Materialize `patch` into its program's sandbox, run the test command for
/// at most `timeout` and score the output with `fitness`.
///
/// Only I/O failures are errors; every other outcome is classified.
pub fn evaluate<F>(
    patch: &Patch<'_>,
    timeout: Duration,
    fitness: &F,
) -> Result<Evaluation, HarnessError>
where
    F: FitnessFunction + ?Sized,
{
    let start = Instant::now();
    let program = patch.program();
    let applied = patch.apply();

    if !applied.is_clean() {
        debug!(%patch, failed = ?applied.failed, "patch does not apply");
        return Ok(Evaluation::failed(Status::Invalid, start.elapsed()));
    }

    if program.validate_syntax() {
        for index in patch.touched_files() {
            let file = &program.files()[index];
            if file
                .engine()
                .introduces_syntax_errors(file.content(), &applied.contents[index])
            {
                debug!(%patch, file = file.path(), "patch introduces syntax errors");
                return Ok(Evaluation::failed(Status::Invalid, start.elapsed()));
            }
        }
    }

    patch.write(&applied)?;

    let evaluation = match run_command(program.test_command(), program.sandbox().path(), timeout)? {
        RunOutcome::TimedOut { elapsed } => Evaluation::failed(Status::Timeout, elapsed),
        RunOutcome::Completed(output) => match fitness.compute(&output) {
            Ok(value) => Evaluation {
                status: Status::Success,
                fitness: Some(value),
                elapsed: output.elapsed,
            },
            Err(error) => {
                warn!(%error, code = ?output.exit_code, "could not compute fitness");
                Evaluation::failed(Status::ParseError, output.elapsed)
            }
        },
    };
    debug!(%patch, status = %evaluation.status, fitness = ?evaluation.fitness, "evaluated");
    Ok(evaluation)
}

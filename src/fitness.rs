//! Mapping test command output to a fitness value.
//!
//! Lower is better under the default search comparison. A function that
//! cannot find its value reports a [`FitnessError`], which the harness
//! classifies as a parse error.

use crate::exec::RunOutput;
use std::collections::HashMap;
use thiserror::Error;

/// Tag of the stock result line: `[GRAFT_RESULT] {runtime: 7, failed: 0}`.
pub const RESULT_TAG: &str = "GRAFT_RESULT";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FitnessError {
    #[error("no fitness value found in test output")]
    Missing,

    #[error("result line has no '{0}' entry")]
    MissingKey(String),

    #[error("malformed result entry '{0}'")]
    Malformed(String),

    #[error("'{0}' is not a number")]
    NotANumber(String),
}

pub trait FitnessFunction {
    fn compute(&self, output: &RunOutput) -> Result<f64, FitnessError>;
}

impl<F> FitnessFunction for F
where
    F: Fn(&RunOutput) -> Result<f64, FitnessError>,
{
    fn compute(&self, output: &RunOutput) -> Result<f64, FitnessError> {
        self(output)
    }
}

fn number(text: &str) -> Result<f64, FitnessError> {
    let text = text.trim();
    text.parse::<f64>()
        .ok()
        .filter(|value| !value.is_nan())
        .ok_or_else(|| FitnessError::NotANumber(text.to_string()))
}

/// The last non-empty stdout line, read as a number.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutNumber;

impl FitnessFunction for StdoutNumber {
    fn compute(&self, output: &RunOutput) -> Result<f64, FitnessError> {
        let line = output
            .stdout
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .ok_or(FitnessError::Missing)?;
        number(line)
    }
}

/// Wall-clock run time in seconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct ElapsedTime;

impl FitnessFunction for ElapsedTime {
    fn compute(&self, output: &RunOutput) -> Result<f64, FitnessError> {
        Ok(output.elapsed.as_secs_f64())
    }
}

/// One numeric entry of a tagged result line.
#[derive(Debug, Clone)]
pub struct ResultLine {
    tag: String,
    key: String,
}

impl ResultLine {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            tag: RESULT_TAG.to_string(),
            key: key.into(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }
}

impl FitnessFunction for ResultLine {
    fn compute(&self, output: &RunOutput) -> Result<f64, FitnessError> {
        let entries = parse_result_line(&self.tag, &output.stdout)?;
        let value = entries
            .get(&self.key)
            .ok_or_else(|| FitnessError::MissingKey(self.key.clone()))?;
        number(value)
    }
}

/// Entries of the first `[tag] {key: value, ...}` line in `stdout`.
pub fn parse_result_line(tag: &str, stdout: &str) -> Result<HashMap<String, String>, FitnessError> {
    let marker = format!("[{tag}]");
    let body = stdout
        .lines()
        .find_map(|line| {
            let rest = line.split_once(marker.as_str())?.1.trim_start();
            let rest = rest.strip_prefix('{')?;
            let (body, _) = rest.split_once('}')?;
            Some(body)
        })
        .ok_or(FitnessError::Missing)?;

    let mut entries = HashMap::new();
    for entry in body.split(',').filter(|entry| !entry.trim().is_empty()) {
        let mut parts = entry.split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(key), Some(value), None) if !key.trim().is_empty() => {
                entries.insert(key.trim().to_string(), value.trim().to_string());
            }
            _ => return Err(FitnessError::Malformed(entry.trim().to_string())),
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn output(stdout: &str) -> RunOutput {
        RunOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            elapsed: Duration::from_millis(1500),
            exit_code: Some(0),
        }
    }

    #[test]
    fn stdout_number_takes_last_line() {
        assert_eq!(StdoutNumber.compute(&output("noise\n 42.5 \n\n")), Ok(42.5));
        assert_eq!(StdoutNumber.compute(&output("")), Err(FitnessError::Missing));
        assert!(matches!(
            StdoutNumber.compute(&output("FAILED\n")),
            Err(FitnessError::NotANumber(_))
        ));
    }

    #[test]
    fn elapsed_time_in_seconds() {
        assert_eq!(ElapsedTime.compute(&output("")), Ok(1.5));
    }

    #[test]
    fn result_line_entries() {
        let stdout = "running\n[GRAFT_RESULT] {runtime: 7, pass_all: true}\nbye\n";
        let entries = parse_result_line(RESULT_TAG, stdout).unwrap();
        assert_eq!(entries["runtime"], "7");
        assert_eq!(entries["pass_all"], "true");

        assert_eq!(ResultLine::new("runtime").compute(&output(stdout)), Ok(7.0));
        assert_eq!(
            ResultLine::new("failed").compute(&output(stdout)),
            Err(FitnessError::MissingKey("failed".to_string()))
        );
        assert!(matches!(
            ResultLine::new("pass_all").compute(&output(stdout)),
            Err(FitnessError::NotANumber(_))
        ));
    }

    #[test]
    fn result_line_custom_tag_and_errors() {
        let stdout = "[SCORE] {x: 0.25}\n";
        assert_eq!(
            ResultLine::new("x").with_tag("SCORE").compute(&output(stdout)),
            Ok(0.25)
        );
        assert_eq!(
            ResultLine::new("x").compute(&output(stdout)),
            Err(FitnessError::Missing)
        );
        assert!(matches!(
            parse_result_line("SCORE", "[SCORE] {x: 1: 2}\n"),
            Err(FitnessError::Malformed(_))
        ));
    }

    #[test]
    fn closures_are_fitness_functions() {
        let failures = |out: &RunOutput| -> Result<f64, FitnessError> {
            Ok(out.stdout.matches("FAIL").count() as f64)
        };
        assert_eq!(failures.compute(&output("FAIL\nok\nFAIL\n")), Ok(2.0));
    }
}

//! JavaScript runtimes used to answer IUAM challenges.

mod boa;

pub use boa::BoaJavascriptInterpreter;

use thiserror::Error;

/// Runs a challenge page's scripts and reports the computed answer.
pub trait JavascriptInterpreter: Send + Sync {
    /// Evaluate the page served for `host` and return `jschl_answer`, numbers
    /// formatted with 10 decimal places.
    fn solve_challenge(&self, page_html: &str, host: &str) -> Result<String, InterpreterError>;
}

#[derive(Debug, Error)]
pub enum InterpreterError {
    #[error("challenge page has no executable script")]
    NoScript,
    #[error("script did not set jschl_answer")]
    NoAnswer,
    #[error("javascript execution failed: {0}")]
    Execution(String),
}

pub type InterpreterResult<T> = Result<T, InterpreterError>;

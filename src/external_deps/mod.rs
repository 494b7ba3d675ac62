//! Adapters over third-party runtimes the challenge solvers depend on.

pub mod interpreters;

pub use interpreters::{BoaJavascriptInterpreter, InterpreterError, JavascriptInterpreter};

//! Init-check harness.
//!
//! Runs an injected initialization entry point once and asserts that it
//! exists, returns without error, and reports the expected success message.
//! The run is linear and stops at the first failed check.

use crate::telemetry::error_chain_fmt;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};

/// Argument passed to the entry point
pub const CALL_ARGUMENT: &str = "hello";

/// Value the entry point must return
pub const EXPECTED_RESULT: &str = "Successfully initialized OBS";

/// Line written to stdout when every check passed
pub const PASSED_MESSAGE: &str = "Tests passed- everything looks OK!";

/// Initialization entry point under test
pub type EntryPoint<'a> = &'a dyn Fn(&str) -> anyhow::Result<String>;

#[derive(thiserror::Error)]
pub enum AssertionFailure {
    #[error("The expected function is undefined")]
    Undefined,
    #[error("testBasic threw an exception")]
    Threw(#[source] anyhow::Error),
    #[error("Unexpected value returned: expected {expected:?}, got {actual:?}")]
    UnexpectedValue { expected: String, actual: String },
}

impl std::fmt::Debug for AssertionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// Run every check against `entry` without reporting.
pub fn check(entry: Option<EntryPoint<'_>>) -> Result<(), AssertionFailure> {
    let entry = entry.ok_or(AssertionFailure::Undefined)?;
    let actual = invoke(entry, CALL_ARGUMENT).map_err(AssertionFailure::Threw)?;

    if actual != EXPECTED_RESULT {
        return Err(AssertionFailure::UnexpectedValue {
            expected: EXPECTED_RESULT.to_string(),
            actual,
        });
    }
    Ok(())
}

/// Run every check and write the confirmation line to `out` on success.
pub fn run<W: Write>(entry: Option<EntryPoint<'_>>, out: &mut W) -> Result<(), AssertionFailure> {
    check(entry)?;
    // A closed stdout does not turn a passed check into a failure
    let _ = writeln!(out, "{}", PASSED_MESSAGE);
    Ok(())
}

/// Call the entry point, turning a panic into an error.
fn invoke(entry: EntryPoint<'_>, argument: &str) -> anyhow::Result<String> {
    match panic::catch_unwind(AssertUnwindSafe(|| entry(argument))) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            anyhow::bail!("entry point panicked: {}", message)
        }
    }
}

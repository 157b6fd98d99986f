use crate::errors::MockError;
use crate::logging::append_run_log;
use crate::session::Session;
use serde::Serialize;
use serde_json::json;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseOutcome {
    pub name: String,
    pub passed: bool,
    pub failure: Option<String>,
}

/// Runs one test case against `session`: reset, body, verify (unless
/// `harness.verify_after_case` is off), reset. Errors returned by the body
/// and panics raised inside it both count as failures.
pub fn run_case<F>(session: &mut Session, name: &str, body: F) -> CaseOutcome
where
    F: FnOnce(&mut Session) -> Result<(), MockError>,
{
    session.reset();
    append_run_log("debug", "harness.case.started", json!({ "case": name }));

    let result = panic::catch_unwind(AssertUnwindSafe(|| body(&mut *session)));
    let failure = match result {
        Ok(Ok(())) if session.config().harness.verify_after_case => {
            session.verify().err().map(|err| err.to_string())
        }
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(err.to_string()),
        Err(payload) => Some(format!("panicked: {}", panic_message(payload.as_ref()))),
    };

    session.reset();
    let outcome = CaseOutcome {
        name: name.to_string(),
        passed: failure.is_none(),
        failure,
    };
    append_run_log(
        if outcome.passed { "info" } else { "error" },
        "harness.case.finished",
        json!({
            "case": outcome.name,
            "passed": outcome.passed,
            "failure": outcome.failure,
        }),
    );
    outcome
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "non-string panic payload".to_string()
}

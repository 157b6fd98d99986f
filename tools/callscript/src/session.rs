//! The verification session: expectation queue plus state machine.
//!
//! Test code records expectations between `begin_expect` and `end_expect`,
//! attaches effects to the most recent one, and then lets the unit under test
//! run. Live calls are matched strictly FIFO against the queue head. `verify`
//! closes a test case and `reset` discards everything.

use crate::config::EngineConfig;
use crate::errors::MockError;
use crate::logging::append_run_log;
use crate::record::{CallRecord, ExpectationQueue, PendingCall, Provenance};
use crate::report::{FailureReporter, StderrReporter};
use crate::state::{validate_transition, MockState};
use crate::value::{render_to_string, BoxedCell, TypeTag, ValueCell};
use serde_json::json;

pub struct Session {
    pub(crate) state: MockState,
    pub(crate) queue: ExpectationQueue,
    pub(crate) open: Option<Provenance>,
    reporter: Box<dyn FailureReporter>,
    config: EngineConfig,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            state: MockState::Idle,
            queue: ExpectationQueue::new(),
            open: None,
            reporter: Box::new(StderrReporter),
            config,
        }
    }

    pub fn with_reporter(mut self, reporter: impl FailureReporter + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> MockState {
        self.state
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn pending_calls(&self) -> Vec<PendingCall> {
        let limit = self.config.diagnostics.max_rendered_bytes;
        self.queue.iter().map(|record| record.pending(limit)).collect()
    }

    // ── lifecycle ────────────────────────────────────────────────────────────

    /// Back to `Idle` with an empty queue. Unmatched records are dropped
    /// without error.
    pub fn reset(&mut self) {
        let discarded = self.queue.len();
        let previous = self.state;
        self.state = MockState::Idle;
        self.queue = ExpectationQueue::new();
        self.open = None;
        append_run_log(
            "debug",
            "mock.session.reset",
            json!({
                "previous_state": previous.as_str(),
                "discarded": discarded,
            }),
        );
    }

    pub fn verify(&mut self) -> Result<(), MockError> {
        self.settle_sealed();
        if self.state != MockState::Idle {
            return Err(self.fail(MockError::State {
                operation: "verify",
                state: self.state,
            }));
        }
        if let Some(next) = self.queue.front() {
            let error = MockError::UnmetExpectations {
                count: self.queue.len(),
                call_site: next.provenance.call_site.clone(),
                rendered: next.render(self.config.diagnostics.max_rendered_bytes),
                file: next.provenance.file.clone(),
                line: next.provenance.line,
            };
            return Err(self.fail(error));
        }
        append_run_log("info", "mock.session.verified", json!({}));
        Ok(())
    }

    // ── recording ────────────────────────────────────────────────────────────

    pub fn begin_expect(&mut self, call_site: &str, file: &str, line: u32) -> Result<(), MockError> {
        self.settle_sealed();
        match self.state {
            MockState::Idle => {}
            MockState::RecordingSealedAwaitingReturn => {
                return Err(self.fail(self.missing_return()));
            }
            state => {
                return Err(self.fail(MockError::State {
                    operation: "begin_expect",
                    state,
                }))
            }
        }
        self.transition(MockState::RecordingBegun)?;
        self.open = Some(Provenance::new(call_site, file, line));
        append_run_log(
            "debug",
            "mock.expect.begin",
            json!({
                "call_site": call_site,
                "file": file,
                "line": line,
            }),
        );
        Ok(())
    }

    pub fn record_call(&mut self, name: &str, arguments: Vec<BoxedCell>) -> Result<(), MockError> {
        match self.state {
            MockState::RecordingBegun => {}
            MockState::RecordingCalled => {
                let open = self.open_provenance();
                return Err(self.fail(MockError::MultipleMockedCalls {
                    call_site: open.call_site,
                    file: open.file,
                    line: open.line,
                }));
            }
            state => {
                return Err(self.fail(MockError::State {
                    operation: "record_call",
                    state,
                }))
            }
        }
        let provenance = self.open_provenance();
        self.queue.push(CallRecord::new(name, arguments, provenance));
        self.transition(MockState::RecordingCalled)
    }

    pub fn end_expect(&mut self, call_site: &str) -> Result<(), MockError> {
        match self.state {
            MockState::RecordingCalled => {}
            MockState::RecordingBegun => {
                return Err(self.fail(MockError::UnmockedCall {
                    call_site: call_site.to_string(),
                }));
            }
            state => {
                return Err(self.fail(MockError::State {
                    operation: "end_expect",
                    state,
                }))
            }
        }
        let opened = self.open_provenance().call_site;
        if opened != call_site {
            return Err(self.fail(MockError::MismatchedExpect {
                opened,
                closed: call_site.to_string(),
            }));
        }
        let awaits_return = match self.queue.back() {
            Some(record) => record.awaits_return(),
            None => return Err(self.fail(MockError::Internal("empty call queue".to_string()))),
        };
        let next = if awaits_return {
            MockState::RecordingSealedAwaitingReturn
        } else {
            MockState::RecordingSealed
        };
        self.transition(next)?;
        append_run_log(
            "debug",
            "mock.expect.sealed",
            json!({
                "call_site": call_site,
                "awaits_return": awaits_return,
            }),
        );
        Ok(())
    }

    pub fn declare_return_type(&mut self, tag: TypeTag) -> Result<(), MockError> {
        if self.state != MockState::RecordingCalled {
            return Err(self.fail(MockError::State {
                operation: "declare_return_type",
                state: self.state,
            }));
        }
        let record = self.tail()?;
        if record.declared_return_type.is_some() {
            let function = record.name.clone();
            return Err(self.fail(MockError::DuplicateReturn { function }));
        }
        record.declared_return_type = Some(tag);
        Ok(())
    }

    pub fn attach_return(&mut self, value: BoxedCell) -> Result<(), MockError> {
        match self.state {
            MockState::RecordingSealedAwaitingReturn => {}
            MockState::RecordingSealed => {
                let open = self.open_provenance();
                return Err(self.fail(MockError::UnexpectedReturn {
                    call_site: open.call_site,
                    file: open.file,
                    line: open.line,
                }));
            }
            state => {
                return Err(self.fail(MockError::State {
                    operation: "attach_return",
                    state,
                }))
            }
        }
        let record = self.tail()?;
        let Some(declared) = record.declared_return_type else {
            return Err(self.fail(MockError::Internal(
                "awaiting a return without a declared type".to_string(),
            )));
        };
        if declared != value.type_tag() {
            let error = MockError::TypeMismatch {
                call: self.open_provenance().call_site,
                context: "return",
                expected: declared.name(),
                actual: value.type_tag().name(),
            };
            return Err(self.fail(error));
        }
        let rendered = render_to_string(value.as_ref());
        self.tail()?.return_value = Some(value);
        self.transition(MockState::Idle)?;
        self.log_attached("return", json!(rendered));
        Ok(())
    }

    pub fn attach_exception(&mut self, value: BoxedCell) -> Result<(), MockError> {
        self.require_sealed("attach_exception")?;
        let rendered = render_to_string(value.as_ref());
        self.tail()?.exception_value = Some(value);
        self.transition(MockState::Idle)?;
        self.log_attached("exception", json!(rendered));
        Ok(())
    }

    pub fn attach_output(&mut self, value: BoxedCell) -> Result<(), MockError> {
        self.require_sealed("attach_output")?;
        self.store_output(value)
    }

    pub fn attach_callback<F>(&mut self, callback: F) -> Result<(), MockError>
    where
        F: FnOnce(&mut Session) -> Result<(), MockError> + 'static,
    {
        self.require_sealed("attach_callback")?;
        if self.tail()?.callback.is_some() {
            return Err(self.fail(self.duplicate_effect("callback")));
        }
        self.tail()?.callback = Some(Box::new(callback));
        self.log_attached("callback", json!(null));
        Ok(())
    }

    /// Output value captured from inside the expectation bracket (the shim saw
    /// the caller's current out-parameter while recording).
    pub fn capture_output(&mut self, value: BoxedCell) -> Result<(), MockError> {
        if self.state != MockState::RecordingCalled {
            return Err(self.fail(MockError::State {
                operation: "capture_output",
                state: self.state,
            }));
        }
        self.store_output(value)
    }

    // ── replay ───────────────────────────────────────────────────────────────

    pub fn dispatch_call(&mut self, name: &str, arguments: Vec<BoxedCell>) -> Result<(), MockError> {
        if self.state.is_recording_open() {
            self.record_call(name, arguments)
        } else {
            self.replay_call(name, arguments)
        }
    }

    pub fn replay_call(&mut self, name: &str, arguments: Vec<BoxedCell>) -> Result<(), MockError> {
        self.settle_sealed();
        match self.state {
            MockState::Idle => {}
            MockState::RecordingCalled => {
                let open = self.open_provenance();
                return Err(self.fail(MockError::MultipleMockedCalls {
                    call_site: open.call_site,
                    file: open.file,
                    line: open.line,
                }));
            }
            MockState::RecordingSealedAwaitingReturn => {
                return Err(self.fail(self.missing_return()));
            }
            state => {
                return Err(self.fail(MockError::State {
                    operation: "replay_call",
                    state,
                }))
            }
        }

        let limit = self.config.diagnostics.max_rendered_bytes;
        let actual = CallRecord::live(name, arguments);
        let Some(expected) = self.queue.front() else {
            return Err(self.fail(MockError::UnexpectedCall {
                actual: actual.render(limit),
            }));
        };
        if !expected.matches(&actual) {
            let error = MockError::MismatchedCall {
                expected: expected.render(limit),
                actual: actual.render(limit),
                call_site: expected.provenance.call_site.clone(),
                file: expected.provenance.file.clone(),
                line: expected.provenance.line,
            };
            return Err(self.fail(error));
        }
        let call = actual.render(limit);

        if expected.has_exception() {
            let mut record = self.take_head()?;
            let Some(exception) = record.exception_value.take() else {
                return Err(self.fail(MockError::Internal("exception vanished".to_string())));
            };
            let fault = exception.raise();
            append_run_log(
                "info",
                "mock.replay.raised",
                json!({
                    "call": call,
                    "fault_type": fault.type_tag().name(),
                    "fault": fault.rendered(),
                }),
            );
            return Err(MockError::Raised { call, fault });
        }

        append_run_log("debug", "mock.replay.matched", json!({ "call": call }));
        if expected.has_output() {
            self.transition(MockState::ReplayAwaitingOutput)
        } else if expected.has_return() {
            self.transition(MockState::ReplayAwaitingReturn)
        } else {
            self.complete_head()
        }
    }

    pub fn claim_output(&mut self, target: &mut dyn ValueCell) -> Result<(), MockError> {
        if self.state != MockState::ReplayAwaitingOutput {
            return Err(self.fail(MockError::State {
                operation: "claim_output",
                state: self.state,
            }));
        }
        let limit = self.config.diagnostics.max_rendered_bytes;
        let has_return = {
            let Some(head) = self.queue.front() else {
                return Err(self.fail(MockError::Internal("empty call queue".to_string())));
            };
            let Some(stored) = head.output_value.as_ref() else {
                return Err(self.fail(MockError::Internal("output vanished".to_string())));
            };
            if !target.copy_from(stored.as_ref()) {
                let error = MockError::TypeMismatch {
                    call: head.render(limit),
                    context: "output",
                    expected: stored.type_tag().name(),
                    actual: target.type_tag().name(),
                };
                return Err(self.fail(error));
            }
            head.has_return()
        };
        if has_return {
            self.transition(MockState::ReplayAwaitingReturn)
        } else {
            self.complete_head()
        }
    }

    pub fn claim_return(&mut self, target: &mut dyn ValueCell) -> Result<(), MockError> {
        if self.state != MockState::ReplayAwaitingReturn {
            return Err(self.fail(MockError::State {
                operation: "claim_return",
                state: self.state,
            }));
        }
        let limit = self.config.diagnostics.max_rendered_bytes;
        {
            let Some(head) = self.queue.front() else {
                return Err(self.fail(MockError::Internal("empty call queue".to_string())));
            };
            let Some(stored) = head.return_value.as_ref() else {
                return Err(self.fail(MockError::Internal("return vanished".to_string())));
            };
            if !target.copy_from(stored.as_ref()) {
                let error = MockError::TypeMismatch {
                    call: head.render(limit),
                    context: "return",
                    expected: stored.type_tag().name(),
                    actual: target.type_tag().name(),
                };
                return Err(self.fail(error));
            }
        }
        self.complete_head()
    }

    // ── internals ────────────────────────────────────────────────────────────

    /// Pop the matched head, go back to `Idle` and run its callback. The
    /// record has left the queue before the callback sees the session.
    fn complete_head(&mut self) -> Result<(), MockError> {
        let record = self.take_head()?;
        self.transition(MockState::Idle)?;
        let call = record.to_string();
        let CallRecord { callback, .. } = record;
        if let Some(callback) = callback {
            append_run_log("debug", "mock.replay.callback", json!({ "call": call }));
            callback(self)?;
        }
        Ok(())
    }

    fn take_head(&mut self) -> Result<CallRecord, MockError> {
        match self.queue.pop() {
            Some(record) => Ok(record),
            None => Err(self.fail(MockError::Internal("empty call queue".to_string()))),
        }
    }

    fn tail(&mut self) -> Result<&mut CallRecord, MockError> {
        if self.queue.is_empty() {
            return Err(self.fail(MockError::Internal("empty call queue".to_string())));
        }
        self.queue
            .back_mut()
            .ok_or_else(|| MockError::Internal("empty call queue".to_string()))
    }

    fn store_output(&mut self, value: BoxedCell) -> Result<(), MockError> {
        if self.tail()?.output_value.is_some() {
            return Err(self.fail(self.duplicate_effect("output")));
        }
        if value.is_raise_only() {
            let error = MockError::TypeMismatch {
                call: self.open_provenance().call_site,
                context: "output",
                expected: "a copyable value",
                actual: value.type_tag().name(),
            };
            return Err(self.fail(error));
        }
        let rendered = render_to_string(value.as_ref());
        self.tail()?.output_value = Some(value);
        self.log_attached("output", json!(rendered));
        Ok(())
    }

    fn require_sealed(&mut self, operation: &'static str) -> Result<(), MockError> {
        if self.state.is_sealed() {
            return Ok(());
        }
        Err(self.fail(MockError::State {
            operation,
            state: self.state,
        }))
    }

    fn settle_sealed(&mut self) {
        if self.state == MockState::RecordingSealed {
            self.state = MockState::Idle;
        }
    }

    fn transition(&mut self, next: MockState) -> Result<(), MockError> {
        validate_transition(self.state, next).map_err(|error| self.fail(error))?;
        self.state = next;
        Ok(())
    }

    fn open_provenance(&self) -> Provenance {
        self.open.clone().unwrap_or_default()
    }

    fn missing_return(&self) -> MockError {
        let open = self.open_provenance();
        MockError::MissingReturn {
            call_site: open.call_site,
            file: open.file,
            line: open.line,
        }
    }

    fn duplicate_effect(&self, effect: &'static str) -> MockError {
        let open = self.open_provenance();
        MockError::DuplicateEffect {
            effect,
            call_site: open.call_site,
            file: open.file,
            line: open.line,
        }
    }

    fn log_attached(&self, effect: &str, value: serde_json::Value) {
        append_run_log(
            "debug",
            "mock.expect.attached",
            json!({
                "call_site": self.open.as_ref().map(|open| open.call_site.as_str()),
                "effect": effect,
                "value": value,
            }),
        );
    }

    pub(crate) fn fail(&self, error: MockError) -> MockError {
        self.reporter.report(&error);
        append_run_log(
            "error",
            "mock.failure",
            json!({
                "kind": error.kind(),
                "state": self.state.as_str(),
                "message": error.to_string(),
                "pending": self.queue.len(),
            }),
        );
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells;
    use crate::report::CollectingReporter;
    use crate::value::{ExceptionCell, TypedCell};

    fn session() -> (Session, CollectingReporter) {
        let reporter = CollectingReporter::new();
        (Session::new().with_reporter(reporter.clone()), reporter)
    }

    fn record(session: &mut Session, name: &str, args: Vec<BoxedCell>) {
        session.begin_expect(name, "session.rs", 1).expect("begin");
        session.record_call(name, args).expect("record");
        session.end_expect(name).expect("end");
    }

    #[test]
    fn recorded_calls_replay_in_order_and_verify() {
        let (mut s, reporter) = session();
        record(&mut s, "fx", cells![1, 2, 3]);
        record(&mut s, "gx", cells![3, 4]);
        assert_eq!(s.pending(), 2);

        s.replay_call("fx", cells![1, 2, 3]).expect("fx");
        s.replay_call("gx", cells![3, 4]).expect("gx");
        s.verify().expect("verify");
        assert!(reporter.messages().is_empty());
    }

    #[test]
    fn declared_return_flows_back_to_the_caller() {
        let (mut s, _) = session();
        s.begin_expect("fx(1)", "session.rs", 10).expect("begin");
        s.record_call("fx", cells![1]).expect("record");
        s.declare_return_type(TypeTag::of::<i32>()).expect("declare");
        s.end_expect("fx(1)").expect("end");
        assert_eq!(s.state(), MockState::RecordingSealedAwaitingReturn);
        s.attach_return(TypedCell::boxed(10i32)).expect("return");
        assert_eq!(s.state(), MockState::Idle);

        s.replay_call("fx", cells![1]).expect("replay");
        assert_eq!(s.state(), MockState::ReplayAwaitingReturn);
        let mut result = TypedCell::new(0i32);
        s.claim_return(&mut result).expect("claim");
        assert_eq!(*result.get(), 10);
        s.verify().expect("verify");
    }

    #[test]
    fn mismatch_keeps_the_head_and_reports_both_calls() {
        let (mut s, reporter) = session();
        record(&mut s, "fx", cells![1, 2, 3]);
        let err = s.replay_call("fx", cells![1, 5, 3]).expect_err("mismatch");
        match &err {
            MockError::MismatchedCall {
                expected, actual, ..
            } => {
                assert_eq!(expected, "fx(1, 2, 3)");
                assert_eq!(actual, "fx(1, 5, 3)");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(s.pending(), 1);
        assert_eq!(reporter.messages().len(), 1);
        assert!(reporter.messages()[0].contains("fx(1, 5, 3)"));
    }

    #[test]
    fn empty_queue_rejects_live_calls() {
        let (mut s, _) = session();
        let err = s.replay_call("gx", cells![3, 4]).expect_err("unexpected");
        assert!(matches!(err, MockError::UnexpectedCall { actual } if actual == "gx(3, 4)"));
    }

    #[test]
    fn end_expect_without_a_call_is_unmocked() {
        let (mut s, _) = session();
        s.begin_expect("plain()", "session.rs", 1).expect("begin");
        let err = s.end_expect("plain()").expect_err("unmocked");
        assert!(matches!(err, MockError::UnmockedCall { .. }));
    }

    #[test]
    fn end_expect_checks_the_call_site_token() {
        let (mut s, _) = session();
        s.begin_expect("fx(1)", "session.rs", 1).expect("begin");
        s.record_call("fx", cells![1]).expect("record");
        let err = s.end_expect("fx(2)").expect_err("mismatched");
        assert!(matches!(
            err,
            MockError::MismatchedExpect { opened, closed } if opened == "fx(1)" && closed == "fx(2)"
        ));
    }

    #[test]
    fn second_declared_return_is_rejected() {
        let (mut s, _) = session();
        s.begin_expect("fx()", "session.rs", 1).expect("begin");
        s.record_call("fx", cells![]).expect("record");
        s.declare_return_type(TypeTag::of::<i32>()).expect("first");
        let err = s
            .declare_return_type(TypeTag::of::<i32>())
            .expect_err("second");
        assert!(matches!(err, MockError::DuplicateReturn { function } if function == "fx"));
    }

    #[test]
    fn return_requires_declared_type() {
        let (mut s, _) = session();
        record(&mut s, "gx", cells![3, 4]);
        let err = s.attach_return(TypedCell::boxed(1i32)).expect_err("no return");
        assert!(matches!(err, MockError::UnexpectedReturn { .. }));
    }

    #[test]
    fn return_type_is_checked_at_recording_time() {
        let (mut s, _) = session();
        s.begin_expect("fx()", "session.rs", 1).expect("begin");
        s.record_call("fx", cells![]).expect("record");
        s.declare_return_type(TypeTag::of::<i32>()).expect("declare");
        s.end_expect("fx()").expect("end");
        let err = s
            .attach_return(TypedCell::boxed("ten".to_string()))
            .expect_err("type mismatch");
        assert!(matches!(
            err,
            MockError::TypeMismatch { context: "return", expected: "i32", .. }
        ));
        assert_eq!(s.state(), MockState::RecordingSealedAwaitingReturn);
    }

    #[test]
    fn begin_after_missing_return_names_previous_expectation() {
        let (mut s, _) = session();
        s.begin_expect("fx(1, 2, 3)", "tests.rs", 42).expect("begin");
        s.record_call("fx", cells![1, 2, 3]).expect("record");
        s.declare_return_type(TypeTag::of::<i32>()).expect("declare");
        s.end_expect("fx(1, 2, 3)").expect("end");

        let err = s.begin_expect("gx(3, 4)", "tests.rs", 43).expect_err("missing");
        assert_eq!(
            err.to_string(),
            "mock expected call 'fx(1, 2, 3)' is missing and_return or and_throw tests.rs:42"
        );
    }

    #[test]
    fn exception_wins_and_removes_the_record() {
        let (mut s, reporter) = session();
        record(&mut s, "fx", cells![1, 2, 3]);
        s.attach_exception(ExceptionCell::boxed("disk full".to_string()))
            .expect("throw");
        record(&mut s, "gx", cells![3, 4]);

        let err = s.replay_call("fx", cells![1, 2, 3]).expect_err("raised");
        let fault = err.into_fault().expect("fault");
        assert_eq!(fault.downcast_ref::<String>().map(String::as_str), Some("disk full"));
        assert_eq!(s.pending(), 1);
        assert!(reporter.messages().is_empty());

        s.replay_call("gx", cells![3, 4]).expect("gx");
        s.verify().expect("verify");
    }

    #[test]
    fn output_is_copied_before_return() {
        let (mut s, _) = session();
        s.begin_expect("read()", "session.rs", 1).expect("begin");
        s.record_call("read", cells![]).expect("record");
        s.declare_return_type(TypeTag::of::<bool>()).expect("declare");
        s.end_expect("read()").expect("end");
        s.attach_output(TypedCell::boxed(0x1234i32)).expect("output");
        assert_eq!(s.state(), MockState::RecordingSealedAwaitingReturn);
        s.attach_return(TypedCell::boxed(true)).expect("return");

        s.replay_call("read", cells![]).expect("replay");
        assert_eq!(s.state(), MockState::ReplayAwaitingOutput);
        let mut out = TypedCell::new(0i32);
        s.claim_output(&mut out).expect("output");
        assert_eq!(*out.get(), 0x1234);
        assert_eq!(s.state(), MockState::ReplayAwaitingReturn);
        let mut ok = TypedCell::new(false);
        s.claim_return(&mut ok).expect("return");
        assert!(*ok.get());
        s.verify().expect("verify");
    }

    #[test]
    fn raise_only_cell_is_rejected_as_return_at_recording_time() {
        let (mut s, _) = session();
        s.begin_expect("fx()", "session.rs", 1).expect("begin");
        s.record_call("fx", cells![]).expect("record");
        s.declare_return_type(TypeTag::of::<i32>()).expect("declare");
        s.end_expect("fx()").expect("end");

        let err = s
            .attach_return(ExceptionCell::boxed(5i32))
            .expect_err("raise-only return");
        assert!(matches!(
            err,
            MockError::TypeMismatch { context: "return", expected: "i32", .. }
        ));
        assert_eq!(s.state(), MockState::RecordingSealedAwaitingReturn);

        s.attach_return(TypedCell::boxed(5i32)).expect("typed return");
        s.replay_call("fx", cells![]).expect("replay");
        let mut result = TypedCell::new(0i32);
        s.claim_return(&mut result).expect("claim");
        assert_eq!(*result.get(), 5);
        s.verify().expect("verify");
    }

    #[test]
    fn raise_only_cell_is_rejected_as_output() {
        let (mut s, _) = session();
        record(&mut s, "read", cells![]);
        let err = s
            .attach_output(ExceptionCell::boxed(7i32))
            .expect_err("raise-only output");
        assert!(matches!(err, MockError::TypeMismatch { context: "output", .. }));
        assert!(!s.pending_calls()[0].has_output);
    }

    #[test]
    fn output_type_mismatch_leaves_head_in_place() {
        let (mut s, _) = session();
        record(&mut s, "read", cells![]);
        s.attach_output(TypedCell::boxed(7u8)).expect("output");
        s.replay_call("read", cells![]).expect("replay");
        let mut wrong = TypedCell::new(0i32);
        let err = s.claim_output(&mut wrong).expect_err("mismatch");
        assert!(matches!(err, MockError::TypeMismatch { context: "output", .. }));
        assert_eq!(s.pending(), 1);
    }

    #[test]
    fn second_callback_is_rejected() {
        let (mut s, _) = session();
        record(&mut s, "fx", cells![]);
        s.attach_callback(|_| Ok(())).expect("first");
        let err = s.attach_callback(|_| Ok(())).expect_err("second");
        assert!(matches!(err, MockError::DuplicateEffect { effect: "callback", .. }));
    }

    #[test]
    fn callback_runs_after_record_leaves_queue() {
        let (mut s, _) = session();
        record(&mut s, "fx", cells![]);
        s.attach_callback(|inner| {
            assert_eq!(inner.state(), MockState::Idle);
            assert_eq!(inner.pending(), 1);
            inner.replay_call("gx", cells![9, 8])
        })
        .expect("callback");
        record(&mut s, "gx", cells![9, 8]);

        s.replay_call("fx", cells![]).expect("fx");
        s.verify().expect("verify");
    }

    #[test]
    fn verify_reports_next_pending_call() {
        let (mut s, _) = session();
        s.begin_expect("gx(3, 4)", "tests.rs", 7).expect("begin");
        s.record_call("gx", cells![3, 4]).expect("record");
        s.end_expect("gx(3, 4)").expect("end");
        let err = s.verify().expect_err("unmet");
        assert_eq!(
            err.to_string(),
            "mock missing 1 expected calls. Next: 'gx(3, 4)' gx(3, 4) tests.rs:7"
        );
    }

    #[test]
    fn verify_rejects_unclaimed_return() {
        let (mut s, _) = session();
        s.begin_expect("fx()", "session.rs", 1).expect("begin");
        s.record_call("fx", cells![]).expect("record");
        s.declare_return_type(TypeTag::of::<i32>()).expect("declare");
        s.end_expect("fx()").expect("end");
        s.attach_return(TypedCell::boxed(1i32)).expect("return");
        s.replay_call("fx", cells![]).expect("replay");
        let err = s.verify().expect_err("state");
        assert!(matches!(
            err,
            MockError::State { operation: "verify", state: MockState::ReplayAwaitingReturn }
        ));
    }

    #[test]
    fn reset_discards_everything_without_error() {
        let (mut s, reporter) = session();
        record(&mut s, "fx", cells![1]);
        s.begin_expect("gx()", "session.rs", 2).expect("begin");
        s.reset();
        assert_eq!(s.state(), MockState::Idle);
        assert_eq!(s.pending(), 0);
        s.verify().expect("clean after reset");
        assert!(reporter.messages().is_empty());
    }

    #[test]
    fn pending_calls_describe_queued_records() {
        let (mut s, _) = session();
        record(&mut s, "gx", cells![3, 4]);
        s.attach_callback(|_| Ok(())).expect("callback");
        let pending = s.pending_calls();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].call, "gx(3, 4)");
        assert!(pending[0].has_callback);
        let json = serde_json::to_value(&pending).expect("serialize");
        assert_eq!(json[0]["provenance"]["call_site"], "gx");
    }
}

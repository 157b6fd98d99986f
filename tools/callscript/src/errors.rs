use crate::state::MockState;
use crate::value::Fault;
use thiserror::Error;

/// Which side of the contract a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The recording grammar was misused by test code.
    Usage,
    /// The unit under test deviated from the scripted calls.
    Violation,
    /// A fault scripted with `and_throw` was delivered to the caller.
    Scripted,
    /// Config or log-file problems outside the engine itself.
    Environment,
}

#[derive(Debug, Error)]
pub enum MockError {
    #[error("mock state error: {operation} is not valid while {state}")]
    State {
        operation: &'static str,
        state: MockState,
    },
    #[error("mock expected call '{call_site}' is missing and_return or and_throw {file}:{line}")]
    MissingReturn {
        call_site: String,
        file: String,
        line: u32,
    },
    #[error("mock of a non-mocked method '{call_site}'")]
    UnmockedCall { call_site: String },
    #[error("mock mismatched expect: opened '{opened}' but closed '{closed}'")]
    MismatchedExpect { opened: String, closed: String },
    #[error("mock '{call_site}' calls multiple mocked methods {file}:{line}")]
    MultipleMockedCalls {
        call_site: String,
        file: String,
        line: u32,
    },
    #[error("mock method '{function}' declares two returns")]
    DuplicateReturn { function: String },
    #[error("mock '{call_site}' already has an attached {effect} {file}:{line}")]
    DuplicateEffect {
        effect: &'static str,
        call_site: String,
        file: String,
        line: u32,
    },
    #[error("mock '{call_site}' does not expect a return {file}:{line}")]
    UnexpectedReturn {
        call_site: String,
        file: String,
        line: u32,
    },
    #[error("mock '{call}' expects {context} type {expected}, but got {actual}")]
    TypeMismatch {
        call: String,
        context: &'static str,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("mock unexpected call {actual}")]
    UnexpectedCall { actual: String },
    #[error("mock expected {expected} actual {actual} ('{call_site}' {file}:{line})")]
    MismatchedCall {
        expected: String,
        actual: String,
        call_site: String,
        file: String,
        line: u32,
    },
    #[error("mock missing {count} expected calls. Next: '{call_site}' {rendered} {file}:{line}")]
    UnmetExpectations {
        count: usize,
        call_site: String,
        rendered: String,
        file: String,
        line: u32,
    },
    #[error("mock call {call} raised {fault}")]
    Raised { call: String, fault: Fault },
    #[error("mock internal error: {0}")]
    Internal(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl MockError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::State { .. }
            | Self::MissingReturn { .. }
            | Self::UnmockedCall { .. }
            | Self::MismatchedExpect { .. }
            | Self::MultipleMockedCalls { .. }
            | Self::DuplicateReturn { .. }
            | Self::DuplicateEffect { .. }
            | Self::UnexpectedReturn { .. }
            | Self::Internal(_) => ErrorClass::Usage,
            Self::TypeMismatch { .. }
            | Self::UnexpectedCall { .. }
            | Self::MismatchedCall { .. }
            | Self::UnmetExpectations { .. } => ErrorClass::Violation,
            Self::Raised { .. } => ErrorClass::Scripted,
            Self::Io(_) | Self::ConfigParse(_) | Self::InvalidConfig(_) => ErrorClass::Environment,
        }
    }

    /// Short stable identifier used as the `kind` field of failure log events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::State { .. } => "state",
            Self::MissingReturn { .. } => "missing_return",
            Self::UnmockedCall { .. } => "unmocked_call",
            Self::MismatchedExpect { .. } => "mismatched_expect",
            Self::MultipleMockedCalls { .. } => "multiple_mocked_calls",
            Self::DuplicateReturn { .. } => "duplicate_return",
            Self::DuplicateEffect { .. } => "duplicate_effect",
            Self::UnexpectedReturn { .. } => "unexpected_return",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::UnexpectedCall { .. } => "unexpected_call",
            Self::MismatchedCall { .. } => "mismatched_call",
            Self::UnmetExpectations { .. } => "unmet_expectations",
            Self::Raised { .. } => "raised",
            Self::Internal(_) => "internal",
            Self::Io(_) => "io",
            Self::ConfigParse(_) => "config_parse",
            Self::InvalidConfig(_) => "invalid_config",
        }
    }

    /// The scripted payload, when this error carries one.
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            Self::Raised { fault, .. } => Some(fault),
            _ => None,
        }
    }

    pub fn into_fault(self) -> Result<Fault, MockError> {
        match self {
            Self::Raised { fault, .. } => Ok(fault),
            other => Err(other),
        }
    }
}

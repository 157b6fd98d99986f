//! Call records and the FIFO queue that owns them.

use crate::errors::MockError;
use crate::logging::truncate_str;
use crate::session::Session;
use crate::value::{render_to_string, BoxedCell, TypeTag};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;

/// Deferred action run after a matched record's primary effect. It receives
/// the session so it can issue further live calls.
pub type Callback = Box<dyn FnOnce(&mut Session) -> Result<(), MockError>>;

/// Where an expectation was written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Provenance {
    pub call_site: String,
    pub file: String,
    pub line: u32,
}

impl Provenance {
    pub fn new(call_site: &str, file: &str, line: u32) -> Self {
        Self {
            call_site: call_site.to_string(),
            file: file.to_string(),
            line,
        }
    }
}

pub struct CallRecord {
    pub(crate) name: String,
    pub(crate) arguments: Vec<BoxedCell>,
    pub(crate) declared_return_type: Option<TypeTag>,
    pub(crate) return_value: Option<BoxedCell>,
    pub(crate) exception_value: Option<BoxedCell>,
    pub(crate) output_value: Option<BoxedCell>,
    pub(crate) callback: Option<Callback>,
    pub(crate) provenance: Provenance,
}

impl CallRecord {
    pub fn new(name: &str, arguments: Vec<BoxedCell>, provenance: Provenance) -> Self {
        Self {
            name: name.to_string(),
            arguments,
            declared_return_type: None,
            return_value: None,
            exception_value: None,
            output_value: None,
            callback: None,
            provenance,
        }
    }

    /// A record describing an actual call; it never enters the queue.
    pub fn live(name: &str, arguments: Vec<BoxedCell>) -> Self {
        Self::new(name, arguments, Provenance::default())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &[BoxedCell] {
        &self.arguments
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn declared_return_type(&self) -> Option<TypeTag> {
        self.declared_return_type
    }

    pub fn has_return(&self) -> bool {
        self.return_value.is_some()
    }

    pub fn has_exception(&self) -> bool {
        self.exception_value.is_some()
    }

    pub fn has_output(&self) -> bool {
        self.output_value.is_some()
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    /// Declared a return type but has neither a return value nor an exception.
    pub fn awaits_return(&self) -> bool {
        self.declared_return_type.is_some() && !self.has_return() && !self.has_exception()
    }

    /// Same name, same arity, pairwise-equal arguments in order.
    pub fn matches(&self, actual: &CallRecord) -> bool {
        self.name == actual.name
            && self.arguments.len() == actual.arguments.len()
            && self
                .arguments
                .iter()
                .zip(actual.arguments.iter())
                .all(|(expected, actual)| expected.equals(actual.as_ref()))
    }

    /// `name(arg, arg, ...)`, capped at `max_bytes`.
    pub fn render(&self, max_bytes: usize) -> String {
        let rendered = self.to_string();
        if rendered.len() <= max_bytes {
            return rendered;
        }
        format!("{}...", truncate_str(&rendered, max_bytes.saturating_sub(3)))
    }

    pub fn pending(&self, max_bytes: usize) -> PendingCall {
        PendingCall {
            call: self.render(max_bytes),
            provenance: self.provenance.clone(),
            declared_return_type: self.declared_return_type.map(|tag| tag.name()),
            has_return: self.has_return(),
            has_exception: self.has_exception(),
            has_output: self.has_output(),
            has_callback: self.has_callback(),
        }
    }
}

impl fmt::Display for CallRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (idx, argument) in self.arguments.iter().enumerate() {
            if idx != 0 {
                f.write_str(", ")?;
            }
            f.write_str(&render_to_string(argument.as_ref()))?;
        }
        f.write_str(")")
    }
}

impl fmt::Debug for CallRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallRecord")
            .field("call", &self.to_string())
            .field("declared_return_type", &self.declared_return_type)
            .field("has_return", &self.has_return())
            .field("has_exception", &self.has_exception())
            .field("has_output", &self.has_output())
            .field("has_callback", &self.has_callback())
            .field("provenance", &self.provenance)
            .finish()
    }
}

/// Serializable summary of a record still waiting in the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingCall {
    pub call: String,
    pub provenance: Provenance,
    pub declared_return_type: Option<&'static str>,
    pub has_return: bool,
    pub has_exception: bool,
    pub has_output: bool,
    pub has_callback: bool,
}

#[derive(Debug, Default)]
pub struct ExpectationQueue {
    records: VecDeque<CallRecord>,
}

impl ExpectationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: CallRecord) {
        self.records.push_back(record);
    }

    pub fn front(&self) -> Option<&CallRecord> {
        self.records.front()
    }

    pub fn back(&self) -> Option<&CallRecord> {
        self.records.back()
    }

    pub fn back_mut(&mut self) -> Option<&mut CallRecord> {
        self.records.back_mut()
    }

    pub fn pop(&mut self) -> Option<CallRecord> {
        self.records.pop_front()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CallRecord> {
        self.records.iter()
    }
}

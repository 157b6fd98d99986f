//! Record/replay call expectations for unit tests.
//!
//! Test code records the dependency calls it expects, in order, and scripts
//! what each one returns, throws, writes to an out-parameter or triggers
//! afterwards. The unit under test then runs against mocked dependencies that
//! replay those scripts, and [`Session::verify`] checks nothing was left over.

pub mod bytes;
pub mod config;
pub mod errors;
pub mod expect;
pub mod harness;
pub mod logging;
pub mod record;
pub mod report;
pub mod session;
pub mod shim;
pub mod state;
pub mod value;

pub use bytes::ByteSpan;
pub use config::{load_config, EngineConfig};
pub use errors::{ErrorClass, MockError};
pub use expect::Expectation;
pub use harness::{run_case, CaseOutcome};
pub use record::{CallRecord, PendingCall, Provenance};
pub use report::{CollectingReporter, FailureReporter, StderrReporter};
pub use session::Session;
pub use state::MockState;
pub use value::{
    BoxedCell, CellValue, ExceptionCell, Fault, IntoCell, Render, TypeTag, TypedCell, ValueCell,
};

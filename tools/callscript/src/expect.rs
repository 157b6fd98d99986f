//! Recording front end: bracket one mocked call and attach its effects.

use crate::errors::MockError;
use crate::session::Session;
use crate::value::{ExceptionCell, IntoCell};
use std::fmt;

/// Records the mocked call made by `$call`, using its source text as the
/// call-site token. `$session` names the `&mut Session` (or owned session)
/// in scope and is rebound inside the call.
///
/// ```
/// use callscript::{cells, expect_call, MockError, Session};
///
/// fn ping(s: &mut Session, seq: u16) -> Result<(), MockError> {
///     s.dispatch_call("ping", cells![seq])
/// }
///
/// let mut s = Session::new();
/// expect_call!(s => ping(s, 7)).expect("recorded");
/// ping(&mut s, 7).expect("replayed");
/// s.verify().expect("verified");
/// ```
#[macro_export]
macro_rules! expect_call {
    ($session:ident => $call:expr) => {
        $session.expect(
            ::std::stringify!($call),
            ::std::file!(),
            ::std::line!(),
            |$session: &mut $crate::Session| $call,
        )
    };
}

impl Session {
    /// Runs `call` inside `begin_expect`/`end_expect`. The value the shim
    /// produces while recording is discarded.
    pub fn expect<F, R>(
        &mut self,
        call_site: &str,
        file: &str,
        line: u32,
        call: F,
    ) -> Result<Expectation<'_>, MockError>
    where
        F: FnOnce(&mut Session) -> Result<R, MockError>,
    {
        self.begin_expect(call_site, file, line)?;
        call(self)?;
        self.end_expect(call_site)?;
        Ok(Expectation { session: self })
    }
}

/// Builder over the expectation just sealed. Callbacks and outputs must be
/// attached before `and_return`/`and_throw`, which close the recording.
pub struct Expectation<'s> {
    session: &'s mut Session,
}

impl<'s> Expectation<'s> {
    pub fn and_return(self, value: impl IntoCell) -> Result<Self, MockError> {
        self.session.attach_return(value.into_cell())?;
        Ok(self)
    }

    pub fn and_throw<E>(self, fault: E) -> Result<Self, MockError>
    where
        E: fmt::Debug + Send + 'static,
    {
        self.session.attach_exception(ExceptionCell::boxed(fault))?;
        Ok(self)
    }

    pub fn and_do<F>(self, callback: F) -> Result<Self, MockError>
    where
        F: FnOnce(&mut Session) -> Result<(), MockError> + 'static,
    {
        self.session.attach_callback(callback)?;
        Ok(self)
    }

    pub fn and_output(self, value: impl IntoCell) -> Result<Self, MockError> {
        self.session.attach_output(value.into_cell())?;
        Ok(self)
    }
}

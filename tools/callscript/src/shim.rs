use crate::errors::MockError;
use crate::session::Session;
use crate::state::MockState;
use crate::value::{CellValue, TypeTag, TypedCell};

#[macro_export]
macro_rules! cells {
    ($($arg:expr),* $(,)?) => {{
        let cells: ::std::vec::Vec<$crate::value::BoxedCell> =
            ::std::vec![$($crate::value::IntoCell::into_cell($arg)),*];
        cells
    }};
}

impl Session {
    /// While recording, declares `T` as the return type and hands back
    /// `T::default()`. While replaying, yields the scripted return value.
    pub fn returning<T: CellValue + Default>(&mut self) -> Result<T, MockError> {
        if self.state == MockState::RecordingCalled {
            self.declare_return_type(TypeTag::of::<T>())?;
            return Ok(T::default());
        }
        let mut cell = TypedCell::<T>::default();
        self.claim_return(&mut cell)?;
        Ok(cell.into_inner())
    }

    /// While recording, captures `*target` as the scripted output. While
    /// replaying a record with an output, overwrites `*target` with a copy of
    /// it. Otherwise leaves `*target` untouched.
    pub fn out_param<T: CellValue>(&mut self, target: &mut T) -> Result<(), MockError> {
        match self.state {
            MockState::RecordingCalled => self.capture_output(TypedCell::boxed(target.clone())),
            MockState::ReplayAwaitingOutput => {
                let mut cell = TypedCell::new(target.clone());
                self.claim_output(&mut cell)?;
                *target = cell.into_inner();
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

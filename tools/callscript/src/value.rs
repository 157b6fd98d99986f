use crate::logging::append_run_log;
use serde_json::json;
use std::any::{Any, TypeId};
use std::fmt;

pub type BoxedCell = Box<dyn ValueCell>;

#[derive(Clone, Copy)]
pub struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl TypeTag {
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeTag {}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeTag({})", self.name)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Human-readable rendering used in mismatch diagnostics.
pub trait Render {
    fn render(&self, out: &mut dyn fmt::Write) -> fmt::Result;
}

macro_rules! render_with_display {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Render for $ty {
                fn render(&self, out: &mut dyn fmt::Write) -> fmt::Result {
                    write!(out, "{self}")
                }
            }
        )*
    };
}

render_with_display!(
    i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, bool
);

impl Render for char {
    fn render(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        write!(out, "{self:?}")
    }
}

impl Render for String {
    fn render(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        write!(out, "{self:?}")
    }
}

impl Render for () {
    fn render(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        out.write_str("()")
    }
}

impl<T: Render> Render for Option<T> {
    fn render(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        match self {
            Some(value) => {
                out.write_str("Some(")?;
                value.render(out)?;
                out.write_str(")")
            }
            None => out.write_str("None"),
        }
    }
}

impl<T: Render> Render for Vec<T> {
    fn render(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        out.write_str("[")?;
        for (idx, item) in self.iter().enumerate() {
            if idx != 0 {
                out.write_str(", ")?;
            }
            item.render(out)?;
        }
        out.write_str("]")
    }
}

pub trait CellValue: Clone + PartialEq + Render + Send + 'static {}

impl<T: Clone + PartialEq + Render + Send + 'static> CellValue for T {}

/// Capabilities the engine needs from a boxed value.
pub trait ValueCell: Any {
    fn type_tag(&self) -> TypeTag;
    fn render(&self, out: &mut dyn fmt::Write) -> fmt::Result;
    /// Value equality. Cells of different types compare unequal and leave a
    /// diagnostic in the run log.
    fn equals(&self, other: &dyn ValueCell) -> bool;
    /// Copies `other`'s payload into `self`; false when the types differ.
    fn copy_from(&mut self, other: &dyn ValueCell) -> bool;
    fn raise(self: Box<Self>) -> Fault;
    fn as_any(&self) -> &dyn Any;

    fn is_raise_only(&self) -> bool {
        false
    }
}

pub fn render_to_string(cell: &dyn ValueCell) -> String {
    let mut out = String::new();
    if cell.render(&mut out).is_err() {
        out.push_str("<unrenderable>");
    }
    out
}

fn log_type_disagreement(operation: &str, left: TypeTag, right: TypeTag) {
    append_run_log(
        "warn",
        "mock.cell.type_mismatch",
        json!({
            "operation": operation,
            "left": left.name(),
            "right": right.name(),
        }),
    );
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypedCell<T> {
    value: T,
}

impl<T: CellValue> TypedCell<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }

    pub fn boxed(value: T) -> BoxedCell {
        Box::new(Self::new(value))
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn set(&mut self, value: T) {
        self.value = value;
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T: CellValue> ValueCell for TypedCell<T> {
    fn type_tag(&self) -> TypeTag {
        TypeTag::of::<T>()
    }

    fn render(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        self.value.render(out)
    }

    fn equals(&self, other: &dyn ValueCell) -> bool {
        match other.as_any().downcast_ref::<TypedCell<T>>() {
            Some(other) => self.value == other.value,
            None => {
                log_type_disagreement("equals", self.type_tag(), other.type_tag());
                false
            }
        }
    }

    fn copy_from(&mut self, other: &dyn ValueCell) -> bool {
        match other.as_any().downcast_ref::<TypedCell<T>>() {
            Some(other) => {
                self.value = other.value.clone();
                true
            }
            None => false,
        }
    }

    fn raise(self: Box<Self>) -> Fault {
        let rendered = render_to_string(self.as_ref());
        Fault::with_rendering(self.value, rendered)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Cell for scripted exceptions: the payload only needs to be raised, never
/// compared or copied.
pub struct ExceptionCell<E> {
    payload: E,
}

impl<E: fmt::Debug + Send + 'static> ExceptionCell<E> {
    pub fn new(payload: E) -> Self {
        Self { payload }
    }

    pub fn boxed(payload: E) -> BoxedCell {
        Box::new(Self::new(payload))
    }
}

impl<E: fmt::Debug + Send + 'static> ValueCell for ExceptionCell<E> {
    // Never equal to the tag of `TypedCell<E>`.
    fn type_tag(&self) -> TypeTag {
        TypeTag::of::<ExceptionCell<E>>()
    }

    fn render(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        write!(out, "{:?}", self.payload)
    }

    fn equals(&self, other: &dyn ValueCell) -> bool {
        if self.type_tag() != other.type_tag() {
            log_type_disagreement("equals", self.type_tag(), other.type_tag());
        }
        false
    }

    fn copy_from(&mut self, _other: &dyn ValueCell) -> bool {
        false
    }

    fn is_raise_only(&self) -> bool {
        true
    }

    fn raise(self: Box<Self>) -> Fault {
        Fault::new(self.payload)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A raised payload, handed back to the caller of a mocked dependency.
pub struct Fault {
    tag: TypeTag,
    rendered: String,
    payload: Box<dyn Any + Send>,
}

impl Fault {
    pub fn new<E: fmt::Debug + Send + 'static>(payload: E) -> Self {
        let rendered = format!("{payload:?}");
        Self::with_rendering(payload, rendered)
    }

    fn with_rendering<E: Send + 'static>(payload: E, rendered: String) -> Self {
        Self {
            tag: TypeTag::of::<E>(),
            rendered,
            payload: Box::new(payload),
        }
    }

    pub fn type_tag(&self) -> TypeTag {
        self.tag
    }

    pub fn rendered(&self) -> &str {
        &self.rendered
    }

    pub fn is<E: 'static>(&self) -> bool {
        self.payload.is::<E>()
    }

    pub fn downcast_ref<E: 'static>(&self) -> Option<&E> {
        self.payload.downcast_ref::<E>()
    }

    pub fn downcast<E: 'static>(self) -> Result<E, Fault> {
        let Fault {
            tag,
            rendered,
            payload,
        } = self;
        match payload.downcast::<E>() {
            Ok(value) => Ok(*value),
            Err(payload) => Err(Fault {
                tag,
                rendered,
                payload,
            }),
        }
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fault")
            .field("type", &self.tag.name())
            .field("rendered", &self.rendered)
            .finish()
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.tag.name(), self.rendered)
    }
}

pub trait IntoCell {
    fn into_cell(self) -> BoxedCell;
}

macro_rules! into_cell_by_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoCell for $ty {
                fn into_cell(self) -> BoxedCell {
                    TypedCell::boxed(self)
                }
            }
        )*
    };
}

into_cell_by_value!(
    i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, bool, char,
    String, ()
);

impl IntoCell for &str {
    fn into_cell(self) -> BoxedCell {
        TypedCell::boxed(self.to_string())
    }
}

impl<T: CellValue> IntoCell for Option<T> {
    fn into_cell(self) -> BoxedCell {
        TypedCell::boxed(self)
    }
}

impl<T: CellValue> IntoCell for Vec<T> {
    fn into_cell(self) -> BoxedCell {
        TypedCell::boxed(self)
    }
}

impl<T: CellValue> IntoCell for TypedCell<T> {
    fn into_cell(self) -> BoxedCell {
        Box::new(self)
    }
}

impl IntoCell for BoxedCell {
    fn into_cell(self) -> BoxedCell {
        self
    }
}

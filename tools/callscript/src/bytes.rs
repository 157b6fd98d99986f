use crate::value::{BoxedCell, IntoCell, Render, TypedCell};
use sha2::{Digest, Sha256};
use std::fmt;

const HEX_PREVIEW_LIMIT: usize = 32;

/// Raw buffer argument compared by length and content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteSpan(Vec<u8>);

impl ByteSpan {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Copies the first `len` bytes of `data`, clamped to its length.
    pub fn from_prefix(data: &[u8], len: usize) -> Self {
        Self(data[..len.min(data.len())].to_vec())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl From<&[u8]> for ByteSpan {
    fn from(value: &[u8]) -> Self {
        Self(value.to_vec())
    }
}

impl Render for ByteSpan {
    fn render(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        if self.0.len() > HEX_PREVIEW_LIMIT {
            let hash = Sha256::digest(&self.0);
            return write!(
                out,
                "<{} bytes sha256:{}>",
                self.0.len(),
                hex_bytes(&hash[..8])
            );
        }
        write!(out, "<{} bytes", self.0.len())?;
        for byte in &self.0 {
            write!(out, " {byte:02x}")?;
        }
        out.write_str(">")
    }
}

impl IntoCell for ByteSpan {
    fn into_cell(self) -> BoxedCell {
        TypedCell::boxed(self)
    }
}

impl IntoCell for &[u8] {
    fn into_cell(self) -> BoxedCell {
        TypedCell::boxed(ByteSpan::from(self))
    }
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// In: src/bridge/negotiation.rs

//! Size-query-then-fill over caller-owned buffers.
//!
//! The caller passes a buffer; if it is too small nothing is written and the
//! required size comes back so the caller can retry. These helpers work on safe
//! slices; `ffi::capi` is responsible for turning raw pointers into slices.

/// Outcome of copying into a caller-owned buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Negotiated {
    /// `n` elements were written.
    Written(usize),
    /// Nothing was written; the buffer must hold at least this many elements.
    NeedsCapacity(usize),
}

impl Negotiated {
    /// The size the caller should see: written or required, whichever applies.
    pub fn required(self) -> usize {
        match self {
            Negotiated::Written(n) | Negotiated::NeedsCapacity(n) => n,
        }
    }
}

/// Copies `src` into the front of `dst` if it fits.
pub fn copy_negotiated<T: Copy>(src: &[T], dst: &mut [T]) -> Negotiated {
    if dst.len() < src.len() {
        return Negotiated::NeedsCapacity(src.len());
    }
    dst[..src.len()].copy_from_slice(src);
    Negotiated::Written(src.len())
}

/// Writes `text` plus a trailing NUL into `dst` if it fits. The reported size always
/// counts the NUL.
pub fn write_c_string(text: &str, dst: &mut [u8]) -> Negotiated {
    let bytes = text.as_bytes();
    let required = bytes.len() + 1;
    if dst.len() < required {
        return Negotiated::NeedsCapacity(required);
    }
    dst[..bytes.len()].copy_from_slice(bytes);
    dst[bytes.len()] = 0;
    Negotiated::Written(required)
}

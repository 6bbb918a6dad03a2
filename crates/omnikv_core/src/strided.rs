//! Zero-copy strided views over batch arguments.
//!
//! Every batched call takes its logical arguments as [`Strided`] views:
//! element `i` of a view lives `i * stride` bytes past the base. A
//! stride of zero broadcasts one element to every task. Callers can
//! therefore pass struct-of-arrays slices, a single broadcast element,
//! or raw array-of-structs bytes without copying; everything downstream
//! of this module sees only logical task `i`.

use crate::error::{EngineError, EngineResult};
use crate::types::CollectionId;

/// An element type decodable from a strided byte layout.
pub trait StridedItem: Copy {
    /// Encoded width in bytes.
    const SIZE: usize;

    /// Decodes one element from exactly [`Self::SIZE`] little-endian
    /// bytes.
    fn from_le_bytes(bytes: &[u8]) -> Self;
}

impl StridedItem for i64 {
    const SIZE: usize = 8;

    fn from_le_bytes(bytes: &[u8]) -> Self {
        let mut word = [0u8; 8];
        word.copy_from_slice(bytes);
        i64::from_le_bytes(word)
    }
}

impl StridedItem for u64 {
    const SIZE: usize = 8;

    fn from_le_bytes(bytes: &[u8]) -> Self {
        let mut word = [0u8; 8];
        word.copy_from_slice(bytes);
        u64::from_le_bytes(word)
    }
}

impl StridedItem for u32 {
    const SIZE: usize = 4;

    fn from_le_bytes(bytes: &[u8]) -> Self {
        let mut word = [0u8; 4];
        word.copy_from_slice(bytes);
        u32::from_le_bytes(word)
    }
}

impl StridedItem for CollectionId {
    const SIZE: usize = 8;

    fn from_le_bytes(bytes: &[u8]) -> Self {
        CollectionId::new(u64::from_le_bytes({
            let mut word = [0u8; 8];
            word.copy_from_slice(bytes);
            word
        }))
    }
}

#[derive(Debug, Clone, Copy)]
enum Repr<'a, T> {
    /// Struct-of-arrays: one element per task, stride = element size.
    Items(&'a [T]),
    /// Stride zero: the same element for every task.
    Broadcast(T),
    /// Array-of-structs: elements decoded at `i * stride` byte offsets.
    Bytes { data: &'a [u8], stride: usize },
}

/// A zero-copy view over one strided batch argument.
#[derive(Debug, Clone, Copy)]
pub struct Strided<'a, T> {
    repr: Repr<'a, T>,
}

impl<'a, T: StridedItem> Strided<'a, T> {
    /// A view over a plain slice, one element per task.
    #[must_use]
    pub fn items(items: &'a [T]) -> Self {
        Self {
            repr: Repr::Items(items),
        }
    }

    /// A zero-stride view repeating `item` for every task.
    #[must_use]
    pub fn broadcast(item: T) -> Self {
        Self {
            repr: Repr::Broadcast(item),
        }
    }

    /// A view over raw bytes with an explicit byte stride, for
    /// array-of-structs layouts.
    ///
    /// # Errors
    ///
    /// Returns a usage error if `stride` is smaller than the element
    /// size.
    pub fn bytes(data: &'a [u8], stride: usize) -> EngineResult<Self> {
        if stride < T::SIZE {
            return Err(EngineError::usage(format!(
                "stride {stride} is smaller than the {}-byte element",
                T::SIZE
            )));
        }
        Ok(Self {
            repr: Repr::Bytes { data, stride },
        })
    }

    /// Number of addressable elements, or `None` for a broadcast view.
    #[must_use]
    pub fn len(&self) -> Option<usize> {
        match self.repr {
            Repr::Items(items) => Some(items.len()),
            Repr::Broadcast(_) => None,
            Repr::Bytes { data, stride } => {
                if data.len() < T::SIZE {
                    Some(0)
                } else {
                    Some((data.len() - T::SIZE) / stride + 1)
                }
            }
        }
    }

    /// Whether this view repeats a single element.
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        matches!(self.repr, Repr::Broadcast(_))
    }

    /// Checks that the view supplies at least `tasks` elements.
    pub(crate) fn ensure_covers(&self, tasks: usize, argument: &str) -> EngineResult<()> {
        match self.len() {
            Some(len) if len < tasks => Err(EngineError::usage(format!(
                "{argument} supplies {len} elements for {tasks} tasks"
            ))),
            _ => Ok(()),
        }
    }

    /// The element for logical task `i`.
    ///
    /// Panics if the view was not validated to cover `i`; batch entry
    /// points call [`Self::ensure_covers`] first.
    #[must_use]
    pub fn get(&self, i: usize) -> T {
        match self.repr {
            Repr::Items(items) => items[i],
            Repr::Broadcast(item) => item,
            Repr::Bytes { data, stride } => {
                let at = i * stride;
                T::from_le_bytes(&data[at..at + T::SIZE])
            }
        }
    }
}

impl<'a, T: StridedItem> From<&'a [T]> for Strided<'a, T> {
    fn from(items: &'a [T]) -> Self {
        Self::items(items)
    }
}

impl<'a, T: StridedItem, const N: usize> From<&'a [T; N]> for Strided<'a, T> {
    fn from(items: &'a [T; N]) -> Self {
        Self::items(items)
    }
}

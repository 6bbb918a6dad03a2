//! Caller-held scratch arenas and the result tape layout.
//!
//! Batch results are packed into a caller-reused [`Arena`] as *tapes*: a
//! header of fixed-width little-endian lengths followed by concatenated
//! payload bytes. Returned [`ReadResult`]/[`ScanResult`] values borrow
//! the arena, so the borrow checker enforces the lifetime rule: buffers
//! from one call stay valid exactly until the next call that uses the
//! same arena.

use crate::types::{Key, ValueLen, MISSING_VALUE_LENGTH};
use omnikv_backend::ScanEntry;

/// A caller-held scratch region the engine grows and reuses.
///
/// The arena is logically emptied at the start of every call that uses
/// it; its backing allocation is retained, so steady-state batch reads
/// allocate nothing. Arenas are single-owner: share one across threads
/// and the compiler will stop you.
#[derive(Debug, Default)]
pub struct Arena {
    buf: Vec<u8>,
}

impl Arena {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an arena with a pre-sized backing buffer.
    #[must_use]
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            buf: Vec::with_capacity(bytes),
        }
    }

    /// Returns the capacity of the backing buffer in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Current length of the packed contents in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether the arena currently holds no packed contents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub(crate) fn reset(&mut self) {
        self.buf.clear();
    }

    /// Packs a string and returns it borrowed from the arena.
    pub(crate) fn place_str(&mut self, s: &str) -> &str {
        self.reset();
        self.buf.extend_from_slice(s.as_bytes());
        std::str::from_utf8(&self.buf).unwrap_or("")
    }
}

fn read_u32(tape: &[u8], at: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&tape[at..at + 4]);
    u32::from_le_bytes(word)
}

fn read_i64(tape: &[u8], at: usize) -> i64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&tape[at..at + 8]);
    i64::from_le_bytes(word)
}

/// Incrementally packs a read tape: `[ len[0] .. len[N-1] | bytes ]`.
///
/// Tasks must be pushed in order. The header is written in place; value
/// bytes are appended behind it without intermediate allocation.
pub(crate) struct ValueTapeBuilder<'a> {
    arena: &'a mut Arena,
    tasks: usize,
    filled: usize,
    with_bytes: bool,
}

impl<'a> ValueTapeBuilder<'a> {
    pub(crate) fn new(arena: &'a mut Arena, tasks: usize, with_bytes: bool) -> Self {
        arena.reset();
        arena.buf.resize(tasks * 4, 0);
        Self {
            arena,
            tasks,
            filled: 0,
            with_bytes,
        }
    }

    /// Records the next task's value; `None` marks a missing key.
    pub(crate) fn push(&mut self, value: Option<&[u8]>) {
        debug_assert!(self.filled < self.tasks);
        let header = self.filled * 4;
        match value {
            None => {
                self.arena.buf[header..header + 4]
                    .copy_from_slice(&MISSING_VALUE_LENGTH.to_le_bytes());
            }
            Some(bytes) => {
                let len = bytes.len() as ValueLen;
                self.arena.buf[header..header + 4].copy_from_slice(&len.to_le_bytes());
                if self.with_bytes {
                    self.arena.buf.extend_from_slice(bytes);
                }
            }
        }
        self.filled += 1;
    }

    pub(crate) fn finish(self) -> ReadResult<'a> {
        let Self {
            arena,
            tasks,
            filled,
            with_bytes,
        } = self;
        debug_assert_eq!(filled, tasks);
        ReadResult {
            tasks,
            with_bytes,
            tape: &arena.buf,
        }
    }
}

/// The outcome of a batch read, borrowed from the arena it was packed
/// into.
///
/// The header length for task `i` is either the value length, or
/// [`MISSING_VALUE_LENGTH`] when the key was absent. Value bytes for
/// task `i` start at the sum of the present lengths before it.
#[derive(Debug, Clone, Copy)]
pub struct ReadResult<'a> {
    tasks: usize,
    with_bytes: bool,
    tape: &'a [u8],
}

impl<'a> ReadResult<'a> {
    /// Number of tasks in the batch.
    #[must_use]
    pub fn tasks(&self) -> usize {
        self.tasks
    }

    /// Whether value bytes were fetched, or only lengths.
    #[must_use]
    pub fn has_bytes(&self) -> bool {
        self.with_bytes
    }

    /// The raw header word for task `i`, including the missing sentinel.
    ///
    /// Panics if `i` is out of range.
    #[must_use]
    pub fn raw_len(&self, i: usize) -> ValueLen {
        assert!(i < self.tasks, "task index out of range");
        read_u32(self.tape, i * 4)
    }

    /// The value length for task `i`, or `None` if the key was absent.
    #[must_use]
    pub fn value_len(&self, i: usize) -> Option<ValueLen> {
        let len = self.raw_len(i);
        (len != MISSING_VALUE_LENGTH).then_some(len)
    }

    /// The value bytes for task `i`.
    ///
    /// Returns `None` when the key was absent or when the read was
    /// lengths-only; a present empty value yields an empty slice.
    #[must_use]
    pub fn value(&self, i: usize) -> Option<&'a [u8]> {
        let len = self.value_len(i)? as usize;
        if !self.with_bytes {
            return None;
        }
        let mut offset = self.tasks * 4;
        for j in 0..i {
            if let Some(prior) = self.value_len(j) {
                offset += prior as usize;
            }
        }
        Some(&self.tape[offset..offset + len])
    }

    /// Iterates the header words in task order.
    pub fn lengths(&self) -> impl Iterator<Item = ValueLen> + 'a {
        let tape = self.tape;
        (0..self.tasks).map(move |i| read_u32(tape, i * 4))
    }

    /// The whole tape: lengths header followed by concatenated bytes.
    #[must_use]
    pub fn tape(&self) -> &'a [u8] {
        self.tape
    }
}

/// Packs scan results as `[ count[0..N] | keys | lens? ]` and returns
/// the borrowed view.
pub(crate) fn pack_scan<'a>(
    arena: &'a mut Arena,
    results: &[Vec<ScanEntry>],
    with_lengths: bool,
) -> ScanResult<'a> {
    arena.reset();
    for entries in results {
        arena
            .buf
            .extend_from_slice(&(entries.len() as u32).to_le_bytes());
    }
    for entries in results {
        for (key, _) in entries {
            arena.buf.extend_from_slice(&key.to_le_bytes());
        }
    }
    if with_lengths {
        for entries in results {
            for (_, len) in entries {
                arena.buf.extend_from_slice(&len.to_le_bytes());
            }
        }
    }
    ScanResult {
        tasks: results.len(),
        total: results.iter().map(Vec::len).sum(),
        with_lengths,
        tape: &arena.buf,
    }
}

/// The outcome of a batch scan, borrowed from the arena.
///
/// Keys within each task are ascending; tasks with fewer matches than
/// requested simply report a smaller count - there is no padding.
#[derive(Debug, Clone, Copy)]
pub struct ScanResult<'a> {
    tasks: usize,
    total: usize,
    with_lengths: bool,
    tape: &'a [u8],
}

impl<'a> ScanResult<'a> {
    /// Number of tasks in the batch.
    #[must_use]
    pub fn tasks(&self) -> usize {
        self.tasks
    }

    /// Number of keys found for task `i`.
    ///
    /// Panics if `i` is out of range.
    #[must_use]
    pub fn count(&self, i: usize) -> usize {
        assert!(i < self.tasks, "task index out of range");
        read_u32(self.tape, i * 4) as usize
    }

    fn task_start(&self, i: usize) -> usize {
        (0..i).map(|j| self.count(j)).sum()
    }

    /// The `j`-th key found for task `i`.
    #[must_use]
    pub fn key(&self, i: usize, j: usize) -> Key {
        assert!(j < self.count(i), "entry index out of range");
        let slot = self.task_start(i) + j;
        read_i64(self.tape, self.tasks * 4 + slot * 8)
    }

    /// Iterates the keys found for task `i`, ascending.
    pub fn keys(&self, i: usize) -> impl Iterator<Item = Key> + 'a {
        let count = self.count(i);
        let start = self.task_start(i);
        let tasks = self.tasks;
        let tape = self.tape;
        (0..count).map(move |j| read_i64(tape, tasks * 4 + (start + j) * 8))
    }

    /// The value length of the `j`-th key for task `i`, if lengths were
    /// requested.
    #[must_use]
    pub fn value_len(&self, i: usize, j: usize) -> Option<ValueLen> {
        if !self.with_lengths {
            return None;
        }
        assert!(j < self.count(i), "entry index out of range");
        let slot = self.task_start(i) + j;
        Some(read_u32(
            self.tape,
            self.tasks * 4 + self.total * 8 + slot * 4,
        ))
    }
}

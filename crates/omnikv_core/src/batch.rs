//! Batch argument structures and their task decoding.
//!
//! The four data-plane calls accept their arguments as strided views
//! plus a handful of optional vectors with documented defaults. This
//! module turns those argument bundles into resolved logical tasks; it
//! is the only place the per-argument layout rules live.

use crate::error::{EngineError, EngineResult};
use crate::strided::Strided;
use crate::types::{CollectionId, Key, DEFAULT_COLLECTION};

/// The value inputs of a batch write.
///
/// Mirrors the three layouts the contract supports: no values at all
/// (a pure deletion batch), one chunk per task, or a single shared tape
/// addressed through per-task offsets and lengths.
#[derive(Debug, Clone, Copy)]
pub enum Values<'a> {
    /// One chunk per task; `None` deletes that task's key.
    PerTask(&'a [Option<&'a [u8]>]),
    /// A single tape shared by every task (stride-zero values).
    Broadcast(&'a [u8]),
}

/// Arguments of a batch write.
///
/// Only `keys` is required. Omitted `collections` target the default
/// collection, omitted `values` delete every addressed key, omitted
/// `offsets` mean zero, and omitted `lengths` are inferred by scanning
/// the chunk for its first zero byte.
#[derive(Debug, Clone, Copy)]
pub struct WriteBatch<'a> {
    pub(crate) collections: Option<Strided<'a, CollectionId>>,
    pub(crate) keys: Strided<'a, Key>,
    pub(crate) values: Option<Values<'a>>,
    pub(crate) offsets: Option<Strided<'a, u32>>,
    pub(crate) lengths: Option<Strided<'a, u32>>,
}

impl<'a> WriteBatch<'a> {
    /// Starts a write batch over the given keys.
    #[must_use]
    pub fn new(keys: impl Into<Strided<'a, Key>>) -> Self {
        Self {
            collections: None,
            keys: keys.into(),
            values: None,
            offsets: None,
            lengths: None,
        }
    }

    /// Supplies per-task collections.
    #[must_use]
    pub fn collections(mut self, collections: impl Into<Strided<'a, CollectionId>>) -> Self {
        self.collections = Some(collections.into());
        self
    }

    /// Targets a single collection for every task.
    #[must_use]
    pub fn collection(mut self, collection: CollectionId) -> Self {
        self.collections = Some(Strided::broadcast(collection));
        self
    }

    /// Supplies the value inputs.
    #[must_use]
    pub fn values(mut self, values: Values<'a>) -> Self {
        self.values = Some(values);
        self
    }

    /// Supplies one value chunk per task; `None` entries delete.
    #[must_use]
    pub fn per_task_values(mut self, values: &'a [Option<&'a [u8]>]) -> Self {
        self.values = Some(Values::PerTask(values));
        self
    }

    /// Shares one value tape across every task.
    #[must_use]
    pub fn broadcast_value(mut self, tape: &'a [u8]) -> Self {
        self.values = Some(Values::Broadcast(tape));
        self
    }

    /// Supplies per-task byte offsets into the value chunks.
    #[must_use]
    pub fn offsets(mut self, offsets: impl Into<Strided<'a, u32>>) -> Self {
        self.offsets = Some(offsets.into());
        self
    }

    /// Supplies per-task value lengths.
    #[must_use]
    pub fn lengths(mut self, lengths: impl Into<Strided<'a, u32>>) -> Self {
        self.lengths = Some(lengths.into());
        self
    }
}

/// Arguments of a batch read.
#[derive(Debug, Clone, Copy)]
pub struct ReadBatch<'a> {
    pub(crate) collections: Option<Strided<'a, CollectionId>>,
    pub(crate) keys: Strided<'a, Key>,
}

impl<'a> ReadBatch<'a> {
    /// Starts a read batch over the given keys.
    #[must_use]
    pub fn new(keys: impl Into<Strided<'a, Key>>) -> Self {
        Self {
            collections: None,
            keys: keys.into(),
        }
    }

    /// Supplies per-task collections.
    #[must_use]
    pub fn collections(mut self, collections: impl Into<Strided<'a, CollectionId>>) -> Self {
        self.collections = Some(collections.into());
        self
    }

    /// Targets a single collection for every task.
    #[must_use]
    pub fn collection(mut self, collection: CollectionId) -> Self {
        self.collections = Some(Strided::broadcast(collection));
        self
    }
}

/// Arguments of a batch scan: per task, the smallest key of interest
/// and the page size.
#[derive(Debug, Clone, Copy)]
pub struct ScanBatch<'a> {
    pub(crate) collections: Option<Strided<'a, CollectionId>>,
    pub(crate) min_keys: Strided<'a, Key>,
    pub(crate) scan_lengths: Strided<'a, u64>,
}

impl<'a> ScanBatch<'a> {
    /// Starts a scan batch over the given range starts and page sizes.
    #[must_use]
    pub fn new(
        min_keys: impl Into<Strided<'a, Key>>,
        scan_lengths: impl Into<Strided<'a, u64>>,
    ) -> Self {
        Self {
            collections: None,
            min_keys: min_keys.into(),
            scan_lengths: scan_lengths.into(),
        }
    }

    /// Supplies per-task collections.
    #[must_use]
    pub fn collections(mut self, collections: impl Into<Strided<'a, CollectionId>>) -> Self {
        self.collections = Some(collections.into());
        self
    }

    /// Targets a single collection for every task.
    #[must_use]
    pub fn collection(mut self, collection: CollectionId) -> Self {
        self.collections = Some(Strided::broadcast(collection));
        self
    }
}

/// Arguments of a batch size estimation over `[min, max]` key ranges.
#[derive(Debug, Clone, Copy)]
pub struct SizeBatch<'a> {
    pub(crate) collections: Option<Strided<'a, CollectionId>>,
    pub(crate) min_keys: Strided<'a, Key>,
    pub(crate) max_keys: Strided<'a, Key>,
}

impl<'a> SizeBatch<'a> {
    /// Starts a size batch over the given key ranges.
    #[must_use]
    pub fn new(
        min_keys: impl Into<Strided<'a, Key>>,
        max_keys: impl Into<Strided<'a, Key>>,
    ) -> Self {
        Self {
            collections: None,
            min_keys: min_keys.into(),
            max_keys: max_keys.into(),
        }
    }

    /// Supplies per-task collections.
    #[must_use]
    pub fn collections(mut self, collections: impl Into<Strided<'a, CollectionId>>) -> Self {
        self.collections = Some(collections.into());
        self
    }

    /// Targets a single collection for every task.
    #[must_use]
    pub fn collection(mut self, collection: CollectionId) -> Self {
        self.collections = Some(Strided::broadcast(collection));
        self
    }
}

/// One resolved write: target and the bytes to store, or `None` for a
/// deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WriteTask<'a> {
    pub collection: CollectionId,
    pub key: Key,
    pub value: Option<&'a [u8]>,
}

fn task_count(keys: &Strided<'_, Key>, argument: &str) -> EngineResult<usize> {
    keys.len()
        .ok_or_else(|| EngineError::usage(format!("{argument} cannot use a zero stride")))
}

fn collection_for(
    collections: Option<&Strided<'_, CollectionId>>,
    i: usize,
) -> CollectionId {
    collections.map_or(DEFAULT_COLLECTION, |view| view.get(i))
}

/// Resolves a write batch into per-task operations.
pub(crate) fn decode_write<'a>(batch: &WriteBatch<'a>) -> EngineResult<Vec<WriteTask<'a>>> {
    let tasks = task_count(&batch.keys, "keys")?;
    if let Some(collections) = &batch.collections {
        collections.ensure_covers(tasks, "collections")?;
    }
    if let Some(offsets) = &batch.offsets {
        offsets.ensure_covers(tasks, "offsets")?;
    }
    if let Some(lengths) = &batch.lengths {
        lengths.ensure_covers(tasks, "lengths")?;
    }
    if let Some(Values::PerTask(chunks)) = batch.values {
        if chunks.len() < tasks {
            return Err(EngineError::usage(format!(
                "values supplies {} chunks for {tasks} tasks",
                chunks.len()
            )));
        }
    }

    let mut resolved = Vec::with_capacity(tasks);
    for i in 0..tasks {
        let chunk = match batch.values {
            None => None,
            Some(Values::PerTask(chunks)) => chunks[i],
            Some(Values::Broadcast(tape)) => Some(tape),
        };
        let value = match chunk {
            None => None,
            Some(chunk) => Some(resolve_chunk(batch, chunk, i)?),
        };
        resolved.push(WriteTask {
            collection: collection_for(batch.collections.as_ref(), i),
            key: batch.keys.get(i),
            value,
        });
    }
    Ok(resolved)
}

/// Applies the offset/length rules to one task's value chunk.
fn resolve_chunk<'a>(
    batch: &WriteBatch<'a>,
    chunk: &'a [u8],
    i: usize,
) -> EngineResult<&'a [u8]> {
    let offset = batch.offsets.as_ref().map_or(0, |view| view.get(i)) as usize;
    let rest = chunk.get(offset..).ok_or_else(|| {
        EngineError::usage(format!(
            "offset {offset} is past the {}-byte value of task {i}",
            chunk.len()
        ))
    })?;
    match &batch.lengths {
        Some(lengths) => {
            let len = lengths.get(i) as usize;
            rest.get(..len).ok_or_else(|| {
                EngineError::usage(format!(
                    "length {len} overruns the {}-byte value of task {i}",
                    rest.len()
                ))
            })
        }
        // No lengths: the chunk is terminated by its first zero byte,
        // or runs to the end of the chunk.
        None => match rest.iter().position(|b| *b == 0) {
            Some(nul) => Ok(&rest[..nul]),
            None => Ok(rest),
        },
    }
}

/// Resolves a read batch into `(collection, key)` pairs.
pub(crate) fn decode_read(batch: &ReadBatch<'_>) -> EngineResult<Vec<(CollectionId, Key)>> {
    let tasks = task_count(&batch.keys, "keys")?;
    if let Some(collections) = &batch.collections {
        collections.ensure_covers(tasks, "collections")?;
    }
    Ok((0..tasks)
        .map(|i| {
            (
                collection_for(batch.collections.as_ref(), i),
                batch.keys.get(i),
            )
        })
        .collect())
}

/// One resolved scan range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScanTask {
    pub collection: CollectionId,
    pub min_key: Key,
    pub limit: usize,
}

/// Resolves a scan batch into per-task ranges.
pub(crate) fn decode_scan(batch: &ScanBatch<'_>) -> EngineResult<Vec<ScanTask>> {
    let tasks = task_count(&batch.min_keys, "min_keys")?;
    if let Some(collections) = &batch.collections {
        collections.ensure_covers(tasks, "collections")?;
    }
    batch.scan_lengths.ensure_covers(tasks, "scan_lengths")?;
    Ok((0..tasks)
        .map(|i| ScanTask {
            collection: collection_for(batch.collections.as_ref(), i),
            min_key: batch.min_keys.get(i),
            limit: batch.scan_lengths.get(i) as usize,
        })
        .collect())
}

/// One resolved size-estimation range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SizeTask {
    pub collection: CollectionId,
    pub min_key: Key,
    pub max_key: Key,
}

/// Resolves a size batch into per-task ranges.
pub(crate) fn decode_size(batch: &SizeBatch<'_>) -> EngineResult<Vec<SizeTask>> {
    let tasks = task_count(&batch.min_keys, "min_keys")?;
    if let Some(collections) = &batch.collections {
        collections.ensure_covers(tasks, "collections")?;
    }
    batch.max_keys.ensure_covers(tasks, "max_keys")?;
    Ok((0..tasks)
        .map(|i| SizeTask {
            collection: collection_for(batch.collections.as_ref(), i),
            min_key: batch.min_keys.get(i),
            max_key: batch.max_keys.get(i),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn broadcast_keys_are_rejected() {
        let batch = WriteBatch::new(Strided::broadcast(1i64));
        let err = decode_write(&batch).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn omitted_collections_hit_the_default() {
        let keys = [1i64, 2];
        let tasks = decode_read(&ReadBatch::new(&keys)).unwrap();
        assert_eq!(tasks, vec![(DEFAULT_COLLECTION, 1), (DEFAULT_COLLECTION, 2)]);
    }

    #[test]
    fn omitted_values_delete_every_key() {
        let keys = [1i64, 2, 3];
        let tasks = decode_write(&WriteBatch::new(&keys)).unwrap();
        assert!(tasks.iter().all(|t| t.value.is_none()));
    }

    #[test]
    fn per_task_none_deletes_that_key() {
        let keys = [1i64, 2];
        let chunks: [Option<&[u8]>; 2] = [Some(b"a"), None];
        let tasks = decode_write(&WriteBatch::new(&keys).per_task_values(&chunks)).unwrap();
        assert_eq!(tasks[0].value, Some(&b"a"[..]));
        assert_eq!(tasks[1].value, None);
    }

    #[test]
    fn explicit_zero_length_is_an_empty_value() {
        let keys = [1i64];
        let chunks: [Option<&[u8]>; 1] = [Some(b"ignored")];
        let lengths = [0u32];
        let tasks = decode_write(
            &WriteBatch::new(&keys)
                .per_task_values(&chunks)
                .lengths(&lengths),
        )
        .unwrap();
        assert_eq!(tasks[0].value, Some(&b""[..]));
    }

    #[test]
    fn missing_lengths_stop_at_first_zero_byte() {
        let keys = [1i64];
        let chunks: [Option<&[u8]>; 1] = [Some(b"abc\0def")];
        let tasks = decode_write(&WriteBatch::new(&keys).per_task_values(&chunks)).unwrap();
        assert_eq!(tasks[0].value, Some(&b"abc"[..]));
    }

    #[test]
    fn missing_lengths_without_zero_take_the_whole_chunk() {
        let keys = [1i64];
        let chunks: [Option<&[u8]>; 1] = [Some(b"abc")];
        let tasks = decode_write(&WriteBatch::new(&keys).per_task_values(&chunks)).unwrap();
        assert_eq!(tasks[0].value, Some(&b"abc"[..]));
    }

    #[test]
    fn broadcast_tape_with_offsets_and_lengths() {
        let keys = [1i64, 2];
        let tape = b"aabbb";
        let offsets = [0u32, 2];
        let lengths = [2u32, 3];
        let tasks = decode_write(
            &WriteBatch::new(&keys)
                .broadcast_value(tape)
                .offsets(&offsets)
                .lengths(&lengths),
        )
        .unwrap();
        assert_eq!(tasks[0].value, Some(&b"aa"[..]));
        assert_eq!(tasks[1].value, Some(&b"bbb"[..]));
    }

    #[test]
    fn broadcast_value_without_offsets_repeats() {
        let keys = [1i64, 2, 3];
        let tasks = decode_write(
            &WriteBatch::new(&keys)
                .broadcast_value(b"same")
                .lengths(Strided::broadcast(4u32)),
        )
        .unwrap();
        assert!(tasks.iter().all(|t| t.value == Some(&b"same"[..])));
    }

    #[test]
    fn offset_past_chunk_is_usage_error() {
        let keys = [1i64];
        let offsets = [10u32];
        let err = decode_write(
            &WriteBatch::new(&keys)
                .broadcast_value(b"abc")
                .offsets(&offsets),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn length_overrun_is_usage_error() {
        let keys = [1i64];
        let lengths = [10u32];
        let err = decode_write(
            &WriteBatch::new(&keys)
                .broadcast_value(b"abc")
                .lengths(&lengths),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn short_argument_vectors_are_usage_errors() {
        let keys = [1i64, 2, 3];
        let collections = [DEFAULT_COLLECTION];
        let err = decode_read(&ReadBatch::new(&keys).collections(&collections[..])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn scan_tasks_resolve_limits() {
        let mins = [0i64, 10];
        let batch = ScanBatch::new(&mins, Strided::broadcast(3u64));
        let tasks = decode_scan(&batch).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].limit, 3);
        assert_eq!(tasks[1].min_key, 10);
    }

    #[test]
    fn size_tasks_pair_ranges() {
        let mins = [0i64, 100];
        let maxs = [50i64, 150];
        let tasks = decode_size(&SizeBatch::new(&mins, &maxs)).unwrap();
        assert_eq!(tasks[1].min_key, 100);
        assert_eq!(tasks[1].max_key, 150);
    }

    #[test]
    fn mixed_collections_per_task() {
        let keys = [1i64, 2];
        let collections = [CollectionId::new(1), CollectionId::new(2)];
        let tasks = decode_read(&ReadBatch::new(&keys).collections(&collections[..])).unwrap();
        assert_eq!(tasks[0].0, CollectionId::new(1));
        assert_eq!(tasks[1].0, CollectionId::new(2));
    }
}

//! Key/value store contract consumed by processors.

use crate::api::Processor;
use crate::error::Result;

/// Callback applied to each key/value pair during a range iteration.
/// The borrowed bytes are valid only for the duration of the call and must
/// be copied for outside use. Returning an error stops the iteration.
pub type RangeFn<'a> = &'a mut dyn FnMut(&[u8], &[u8]) -> Result<()>;

/// A named, read/write key/value store.
///
/// Stores are accessed concurrently by arbitrary processors and must be
/// internally thread-safe. They also implement the [`Processor`] contract
/// so a sink-style node can materialize forwarded records directly into a
/// store: a record with a key and no value deletes that key.
pub trait Store: Processor {
    /// This store's name, as registered in the topology.
    fn name(&self) -> String;

    /// Value for the given key, or [`Error::KeyNotFound`] on a miss.
    ///
    /// [`Error::KeyNotFound`]: crate::Error::KeyNotFound
    fn get(&self, key: &[u8]) -> Result<Vec<u8>>;

    /// Set the value for the given key.
    fn set(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Delete the given key and its value. Deleting an absent key is not
    /// an error.
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Iterate key/value pairs in byte-wise lexicographic order within
    /// `[from, to)`. A `None` endpoint means the beginning or end of the
    /// store.
    fn range(&self, from: Option<&[u8]>, to: Option<&[u8]>, cb: RangeFn<'_>) -> Result<()>;

    /// Iterate key/value pairs whose keys start with `prefix`, in
    /// byte-wise lexicographic order.
    fn range_prefix(&self, prefix: &[u8], cb: RangeFn<'_>) -> Result<()>;

    /// Close the store and erase its persistent state. Defaults to a plain
    /// close for stores with nothing to erase.
    fn remove(&self) -> Result<()> {
        self.close()
    }
}

//! Ordered in-memory key/value store.

use std::collections::BTreeMap;
use std::ops::Bound;

use anyhow::anyhow;
use parking_lot::{Mutex, RwLock};

use rill_core::{Error, Processor, ProcessorContext, RangeFn, Record, Result, Store};

/// An in-memory [`Store`] over an ordered map.
///
/// Range iterations run over a detached snapshot, so callbacks observe the
/// keys present when the iteration started and may freely call back into
/// the store.
#[derive(Default)]
pub struct MemoryStore {
    name: Mutex<String>,
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store. The name is bound at init time from the
    /// owning topology node.
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// Create an empty store with an explicit name, for use outside a
    /// stream.
    pub fn with_name(name: impl Into<String>) -> MemoryStore {
        MemoryStore {
            name: Mutex::new(name.into()),
            data: RwLock::new(BTreeMap::new()),
        }
    }

    fn snapshot(&self, from: Option<&[u8]>, to: Option<&[u8]>) -> Vec<(Vec<u8>, Vec<u8>)> {
        if let (Some(from), Some(to)) = (from, to) {
            if from >= to {
                return Vec::new();
            }
        }
        let lower = from.map_or(Bound::Unbounded, Bound::Included);
        let upper = to.map_or(Bound::Unbounded, Bound::Excluded);
        self.data
            .read()
            .range::<[u8], _>((lower, upper))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl Processor for MemoryStore {
    fn init(&self, ctx: &ProcessorContext) -> Result<()> {
        *self.name.lock() = ctx.node_name().to_string();
        Ok(())
    }

    /// Materialize a forwarded record: set the key, or delete it when the
    /// record carries no value.
    fn process(&self, _ctx: &ProcessorContext, record: Record) -> Result<()> {
        if !record.is_valid() {
            return Err(anyhow!("invalid record for store").into());
        }
        let Some(key) = &record.key else {
            return Err(anyhow!("record without key cannot be stored").into());
        };

        match &record.value {
            Some(value) => self.set(key, value),
            None => self.delete(key),
        }
    }
}

impl Store for MemoryStore {
    fn name(&self) -> String {
        self.name.lock().clone()
    }

    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.data.read().get(key).cloned().ok_or(Error::KeyNotFound)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.data.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.data.write().remove(key);
        Ok(())
    }

    fn range(&self, from: Option<&[u8]>, to: Option<&[u8]>, cb: RangeFn<'_>) -> Result<()> {
        for (key, value) in self.snapshot(from, to) {
            cb(&key, &value)?;
        }
        Ok(())
    }

    fn range_prefix(&self, prefix: &[u8], cb: RangeFn<'_>) -> Result<()> {
        for (key, value) in self.snapshot(Some(prefix), None) {
            if !key.starts_with(prefix) {
                break;
            }
            cb(&key, &value)?;
        }
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        self.data.write().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_missing_key() {
        let store = MemoryStore::with_name("m");
        assert!(matches!(store.get(b"nope"), Err(Error::KeyNotFound)));
    }

    #[test]
    fn test_set_get_delete() {
        let store = MemoryStore::with_name("m");
        store.set(b"k", b"v").unwrap();
        assert_eq!(store.get(b"k").unwrap(), b"v");

        store.set(b"k", b"v2").unwrap();
        assert_eq!(store.get(b"k").unwrap(), b"v2");

        store.delete(b"k").unwrap();
        assert!(matches!(store.get(b"k"), Err(Error::KeyNotFound)));

        // Deleting an absent key is not an error.
        store.delete(b"k").unwrap();
    }

    #[test]
    fn test_range_is_lexicographic_and_half_open() {
        let store = MemoryStore::with_name("m");
        for key in ["b", "a", "d", "c", "e"] {
            store.set(key.as_bytes(), b"v").unwrap();
        }

        let mut seen = Vec::new();
        store
            .range(Some(b"b"), Some(b"d"), &mut |key, _value| {
                seen.push(key.to_vec());
                Ok(())
            })
            .unwrap();
        // from inclusive, to exclusive
        assert_eq!(seen, vec![b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_range_open_endpoints() {
        let store = MemoryStore::with_name("m");
        for key in ["b", "a", "c"] {
            store.set(key.as_bytes(), b"v").unwrap();
        }

        let mut seen = Vec::new();
        store
            .range(None, None, &mut |key, _value| {
                seen.push(key.to_vec());
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);

        seen.clear();
        store
            .range(Some(b"b"), None, &mut |key, _value| {
                seen.push(key.to_vec());
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec![b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_range_callback_error_stops_iteration() {
        let store = MemoryStore::with_name("m");
        for key in ["a", "b", "c"] {
            store.set(key.as_bytes(), b"v").unwrap();
        }

        let mut seen = 0;
        let outcome = store.range(None, None, &mut |_key, _value| {
            seen += 1;
            if seen == 2 {
                return Err(anyhow!("stop").into());
            }
            Ok(())
        });
        assert!(outcome.is_err());
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_range_prefix() {
        let store = MemoryStore::with_name("m");
        for key in ["user/1", "user/2", "group/1", "userx"] {
            store.set(key.as_bytes(), b"v").unwrap();
        }

        let mut seen = Vec::new();
        store
            .range_prefix(b"user/", &mut |key, _value| {
                seen.push(String::from_utf8(key.to_vec()).unwrap());
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec!["user/1".to_string(), "user/2".to_string()]);
    }

    #[test]
    fn test_callback_may_reenter_the_store() {
        let store = MemoryStore::with_name("m");
        store.set(b"a", b"1").unwrap();
        store.set(b"b", b"2").unwrap();

        store
            .range(None, None, &mut |key, _value| {
                // Iteration runs over a snapshot; writes are legal.
                let mut doubled = key.to_vec();
                doubled.push(b'!');
                store.set(&doubled, b"copy")
            })
            .unwrap();

        assert_eq!(store.get(b"a!").unwrap(), b"copy");
        assert_eq!(store.get(b"b!").unwrap(), b"copy");
    }

    #[test]
    fn test_remove_clears_state() {
        let store = MemoryStore::with_name("m");
        store.set(b"a", b"1").unwrap();
        store.remove().unwrap();
        assert!(matches!(store.get(b"a"), Err(Error::KeyNotFound)));
    }

    #[test]
    fn test_concurrent_readers_and_writers() {
        use std::sync::Arc;

        let store = Arc::new(MemoryStore::with_name("m"));
        let keys: Vec<Vec<u8>> = (0..32u8).map(|i| vec![b'k', i]).collect();
        for key in &keys {
            store.set(key, b"seed").unwrap();
        }

        let writer = {
            let store = Arc::clone(&store);
            let keys = keys.clone();
            std::thread::spawn(move || {
                for round in 0..100u8 {
                    for key in &keys {
                        store.set(key, &[round]).unwrap();
                    }
                }
            })
        };

        let reader = {
            let store = Arc::clone(&store);
            let keys = keys.clone();
            std::thread::spawn(move || {
                for _ in 0..100 {
                    for key in &keys {
                        store.get(key).unwrap();
                    }
                }
            })
        };

        writer.join().unwrap();
        reader.join().unwrap();

        // Every key still present and iterable in order.
        let mut count = 0;
        store
            .range(None, None, &mut |_key, _value| {
                count += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(count, keys.len());
    }
}

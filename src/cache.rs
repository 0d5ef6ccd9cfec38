use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

type Slot<V> = Arc<Mutex<Option<V>>>;

/// Memo of computed results, keyed by the options they were computed with.
///
/// Every key has its own slot lock, held while that key is computed.
/// Concurrent callers asking for the same key wait for the first computation
/// instead of racing it; other keys stay readable meanwhile. An entry is
/// written once and never replaced.
pub struct ResultCache<K, V> {
    slots: Mutex<HashMap<K, Slot<V>>>,
}

impl<K: Eq + Hash, V: Clone> ResultCache<K, V> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached value for `key`, computing and storing it on first use.
    /// Failed computations are not cached.
    pub fn get_or_try_insert_with<E>(
        &self,
        key: K,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        let slot = Arc::clone(lock(&self.slots).entry(key).or_default());
        let mut value = lock(&slot);
        if let Some(value) = value.as_ref() {
            return Ok(value.clone());
        }
        let computed = compute()?;
        *value = Some(computed.clone());
        Ok(computed)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        lock(&self.slots)
            .values()
            .filter(|slot| lock(slot).is_some())
            .count()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash, V: Clone> Default for ResultCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// A panic inside a computation leaves its slot empty, so a poisoned lock
/// still guards consistent data.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;

    #[test]
    fn computes_once_per_key() {
        let cache = ResultCache::new();
        let calls = AtomicUsize::new(0);
        let compute = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(vec![1, 2, 3])
        };

        assert_eq!(cache.get_or_try_insert_with("a", compute).unwrap(), vec![1, 2, 3]);
        assert_eq!(cache.get_or_try_insert_with("a", compute).unwrap(), vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.get_or_try_insert_with("b", compute).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn errors_are_not_cached() {
        let cache: ResultCache<u8, u8> = ResultCache::new();
        assert!(cache.get_or_try_insert_with(1, || Err("boom")).is_err());
        assert!(cache.is_empty());
        assert_eq!(cache.get_or_try_insert_with(1, || Ok::<_, &str>(7)), Ok(7));
    }

    #[test]
    fn concurrent_callers_share_one_computation() {
        let cache = Arc::new(ResultCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                thread::spawn(move || {
                    cache
                        .get_or_try_insert_with(42u32, || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(std::time::Duration::from_millis(5));
                            Ok::<_, Infallible>(String::from("done"))
                        })
                        .unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), "done");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn slow_key_does_not_block_other_keys() {
        let cache = Arc::new(ResultCache::new());
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let slow = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                cache
                    .get_or_try_insert_with(1u32, || {
                        started_tx.send(()).unwrap();
                        release_rx.recv().unwrap();
                        Ok::<_, Infallible>("slow")
                    })
                    .unwrap()
            })
        };

        started_rx.recv().unwrap();
        let fast = cache
            .get_or_try_insert_with(2u32, || Ok::<_, Infallible>("fast"))
            .unwrap();
        assert_eq!(fast, "fast");

        release_tx.send(()).unwrap();
        assert_eq!(slow.join().unwrap(), "slow");
        assert_eq!(cache.len(), 2);
    }
}

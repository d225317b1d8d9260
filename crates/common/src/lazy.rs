//! Single-acquisition lazy cell for heavyweight models
//!
//! Concurrent first callers block on one shared initialization instead of each
//! running their own. A failed initialization leaves the cell empty so the next
//! caller retries. `reset` drops the loaded value (teardown).

use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

pub struct LazyResource<T: ?Sized> {
    cell: Mutex<Arc<OnceCell<Arc<T>>>>,
}

impl<T: ?Sized> LazyResource<T> {
    pub fn new() -> Self {
        Self {
            cell: Mutex::new(Arc::new(OnceCell::new())),
        }
    }

    fn current(&self) -> Arc<OnceCell<Arc<T>>> {
        // A poisoned lock only means another thread panicked while swapping
        // the Arc; the Arc itself is always valid.
        let guard = self.cell.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Return the loaded value, running `init` once if nothing is loaded yet
    pub async fn get_or_try_init<E, F, Fut>(&self, init: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<T>, E>>,
    {
        let cell = self.current();
        let value = cell.get_or_try_init(init).await?;
        Ok(Arc::clone(value))
    }

    pub fn is_loaded(&self) -> bool {
        self.current().initialized()
    }

    /// Drop the loaded value; in-flight holders keep their own `Arc`
    pub fn reset(&self) {
        let mut guard = self.cell.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(OnceCell::new());
    }
}

impl<T: ?Sized> Default for LazyResource<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_initializes_once() {
        let lazy: LazyResource<String> = LazyResource::new();
        let count = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = lazy
                .get_or_try_init(|| async {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>(Arc::new("model".to_string()))
                })
                .await
                .unwrap();
            assert_eq!(value.as_str(), "model");
        }

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(lazy.is_loaded());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_use_shares_one_init() {
        let lazy: Arc<LazyResource<u32>> = Arc::new(LazyResource::new());
        let count = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let lazy = Arc::clone(&lazy);
            let count = Arc::clone(&count);
            handles.push(tokio::spawn(async move {
                lazy.get_or_try_init(|| async {
                    count.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, ()>(Arc::new(7))
                })
                .await
            }));
        }

        for handle in handles {
            assert_eq!(*handle.await.unwrap().unwrap(), 7);
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_init_is_retried() {
        let lazy: LazyResource<u32> = LazyResource::new();

        let first = lazy.get_or_try_init(|| async { Err::<Arc<u32>, _>("offline") }).await;
        assert!(first.is_err());
        assert!(!lazy.is_loaded());

        let second = lazy.get_or_try_init(|| async { Ok::<_, &str>(Arc::new(1)) }).await;
        assert_eq!(*second.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reset_drops_value() {
        let lazy: LazyResource<u32> = LazyResource::new();
        lazy.get_or_try_init(|| async { Ok::<_, ()>(Arc::new(1)) }).await.unwrap();
        assert!(lazy.is_loaded());

        lazy.reset();
        assert!(!lazy.is_loaded());

        let value = lazy.get_or_try_init(|| async { Ok::<_, ()>(Arc::new(2)) }).await.unwrap();
        assert_eq!(*value, 2);
    }
}

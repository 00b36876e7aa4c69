use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;

/// Coalesces concurrent calls for the same key into one execution.
///
/// The first caller for a key runs its future; callers arriving while it is
/// in flight wait and receive a clone of the same output. If the running
/// caller is cancelled, one of the waiters runs its own future instead.
/// An entry is dropped once its call completes or its last waiter goes away,
/// so later calls run afresh.
pub struct SingleFlight<K, V> {
    calls: Mutex<HashMap<K, Call<V>>>,
}

struct Call<V> {
    cell: Arc<OnceCell<V>>,
    waiters: usize,
}

/// Registration of one caller on a call; unregisters on drop, including cancellation.
struct Waiter<'a, K: Eq + Hash, V> {
    calls: &'a Mutex<HashMap<K, Call<V>>>,
    key: K,
    cell: Arc<OnceCell<V>>,
}

impl<K: Eq + Hash, V> Drop for Waiter<'_, K, V> {
    fn drop(&mut self) {
        let mut calls = self.calls.lock();
        if let Some(call) = calls.get_mut(&self.key)
            && Arc::ptr_eq(&call.cell, &self.cell)
        {
            call.waiters -= 1;
            if call.waiters == 0 || call.cell.initialized() {
                calls.remove(&self.key);
            }
        }
    }
}

impl<K, V> Default for SingleFlight<K, V> {
    fn default() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn run<F, Fut>(&self, key: K, f: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let waiter = {
            let mut calls = self.calls.lock();
            let call = calls.entry(key.clone()).or_insert_with(|| Call {
                cell: Arc::new(OnceCell::new()),
                waiters: 0,
            });
            call.waiters += 1;
            Waiter {
                calls: &self.calls,
                key,
                cell: call.cell.clone(),
            }
        };

        waiter.cell.get_or_init(f).await.clone()
    }

    /// Number of keys with a call currently in flight.
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }
}

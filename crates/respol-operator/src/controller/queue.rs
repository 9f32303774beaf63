//! Keyed work queue for reconciliation.
//!
//! - a pending key is queued at most once;
//! - a key handed to a worker is not handed to another until `done`; re-adds
//!   in the meantime are deferred and replayed on `done`;
//! - delayed adds keep only the earliest deadline per key;
//! - failures back off exponentially per key until `forget`.
//!
//! Drives the in-process (memory backend) controller. Cluster mode schedules
//! through `kube::runtime::Controller` and only shares [`Backoff`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn from_config(cfg: &crate::config::ControllerSection) -> Self {
        Self {
            base: Duration::from_millis(cfg.backoff_base_ms),
            max: Duration::from_millis(cfg.backoff_max_ms),
        }
    }

    /// Delay before the `failures`-th retry (1-based).
    pub fn delay(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(31);
        self.base.saturating_mul(1u32 << exp).min(self.max)
    }
}

#[derive(Default)]
struct QueueState {
    queue: VecDeque<String>,
    queued: HashSet<String>,
    active: HashSet<String>,
    dirty: HashSet<String>,
    waiting: HashMap<String, Instant>,
    failures: HashMap<String, u32>,
    shutdown: bool,
}

pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    backoff: Backoff,
}

impl WorkQueue {
    pub fn new(backoff: Backoff) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            backoff,
        })
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // State is plain bookkeeping; a poisoned lock still holds consistent sets.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn add(&self, key: &str) {
        {
            let mut st = self.lock();
            if st.shutdown || st.queued.contains(key) {
                return;
            }
            if st.active.contains(key) {
                st.dirty.insert(key.to_string());
                return;
            }
            st.queued.insert(key.to_string());
            st.queue.push_back(key.to_string());
        }
        self.notify.notify_one();
    }

    pub fn add_after(self: &Arc<Self>, key: &str, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }
        let deadline = Instant::now() + delay;
        {
            let mut st = self.lock();
            if st.shutdown {
                return;
            }
            if let Some(existing) = st.waiting.get(key) {
                if *existing <= deadline {
                    return;
                }
            }
            st.waiting.insert(key.to_string(), deadline);
        }

        let queue = Arc::clone(self);
        let key = key.to_string();
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            queue.fire(&key, deadline);
        });
    }

    fn fire(&self, key: &str, deadline: Instant) {
        {
            let mut st = self.lock();
            match st.waiting.get(key) {
                Some(d) if *d == deadline => {
                    st.waiting.remove(key);
                }
                // Superseded by an earlier deadline.
                _ => return,
            }
        }
        self.add(key);
    }

    pub fn add_rate_limited(self: &Arc<Self>, key: &str) -> Duration {
        let failures = {
            let mut st = self.lock();
            let n = st.failures.entry(key.to_string()).or_insert(0);
            *n = n.saturating_add(1);
            *n
        };
        let delay = self.backoff.delay(failures);
        self.add_after(key, delay);
        delay
    }

    pub fn forget(&self, key: &str) {
        self.lock().failures.remove(key);
    }

    pub fn num_requeues(&self, key: &str) -> u32 {
        self.lock().failures.get(key).copied().unwrap_or(0)
    }

    /// Wait for the next key. `None` once the queue is shut down and drained.
    pub async fn get(&self) -> Option<String> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut st = self.lock();
                if let Some(key) = st.queue.pop_front() {
                    st.queued.remove(&key);
                    st.active.insert(key.clone());
                    return Some(key);
                }
                if st.shutdown {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Mark a key processed; replays a re-add that arrived while it was active.
    pub fn done(&self, key: &str) {
        let requeue = {
            let mut st = self.lock();
            st.active.remove(key);
            if st.dirty.remove(key) && !st.shutdown && !st.queued.contains(key) {
                st.queued.insert(key.to_string());
                st.queue.push_back(key.to_string());
                true
            } else {
                false
            }
        };
        if requeue {
            self.notify.notify_one();
        }
    }

    pub fn shutdown(&self) {
        self.lock().shutdown = true;
        self.notify.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

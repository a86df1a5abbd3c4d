use std::{collections::HashMap, future::Future, time::Duration};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Delayed teardowns, at most one per post.
#[derive(Default)]
pub struct TeardownTimers {
    pending: Mutex<HashMap<Uuid, JoinHandle<()>>>,
}

impl TeardownTimers {
    /// Runs `teardown` after `delay` unless cancelled first. Re-arming a post
    /// replaces its previous timer.
    pub fn arm<F>(&self, post_id: Uuid, delay: Duration, teardown: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            teardown.await;
        });
        if let Some(previous) = self.pending.lock().insert(post_id, handle) {
            previous.abort();
        }
    }

    /// Forgets the timer without stopping it. Called by the timer's own task
    /// when it fires, so the teardown it runs cannot abort itself.
    pub fn disarm(&self, post_id: Uuid) {
        self.pending.lock().remove(&post_id);
    }

    /// Stops a pending timer. `false` if none was pending.
    pub fn cancel(&self, post_id: Uuid) -> bool {
        match self.pending.lock().remove(&post_id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self, post_id: Uuid) -> bool {
        self.pending.lock()
            .get(&post_id)
            .is_some_and(|handle| !handle.is_finished())
    }
}

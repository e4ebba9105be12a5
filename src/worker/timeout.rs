//! Timeout chain
//!
//! Ordered membership structure used to find and evict connections idle
//! past a threshold. Arming re-inserts at the tail, so the head of the
//! chain is always the least-recently-active member and a sweep can stop
//! at the first fresh entry.
//!
//! Entries are removed lazily: `disarm` drops the live entry while stale
//! `(id, seq)` pairs left in the order queue are skipped during sweeps.

use crate::worker::ConnId;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify};

struct Entry {
    seq: u64,
    since: Instant,
    evict: Arc<Notify>,
}

#[derive(Default)]
struct Inner {
    order: VecDeque<(ConnId, u64)>,
    entries: HashMap<ConnId, Entry>,
    next_seq: u64,
}

/// One chain instance; the server's idle connections and the client
/// pool's persistent connections each keep their own because their
/// freshness policies differ.
#[derive(Default)]
pub struct TimeoutChain {
    inner: Mutex<Inner>,
}

impl TimeoutChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or refreshes) a connection with the current timestamp.
    /// Called on every suspend; a re-arm moves the entry to the tail.
    pub async fn arm(&self, id: ConnId, evict: Arc<Notify>) {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        // Drop stale head pairs left behind by disarm/take_if_fresh, so
        // the queue stays bounded even on a chain that is never swept.
        while let Some(&(head_id, head_seq)) = inner.order.front() {
            match inner.entries.get(&head_id) {
                Some(entry) if entry.seq == head_seq => break,
                _ => {
                    inner.order.pop_front();
                }
            }
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(
            id,
            Entry {
                seq,
                since: Instant::now(),
                evict,
            },
        );
        inner.order.push_back((id, seq));
    }

    /// Removes a connection from the chain. Called when a fiber resumes
    /// work on the connection or the connection closes.
    pub async fn disarm(&self, id: ConnId) {
        self.inner.lock().await.entries.remove(&id);
    }

    /// Evicts every member idle longer than `max_idle`, firing its
    /// eviction notifier. Walks from the head and stops at the first
    /// fresh entry.
    pub async fn sweep(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let mut evicted = 0;
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        while let Some(&(id, seq)) = inner.order.front() {
            match inner.entries.get(&id) {
                // Stale queue position from an earlier arm.
                Some(entry) if entry.seq != seq => {
                    inner.order.pop_front();
                }
                Some(entry) if now.duration_since(entry.since) >= max_idle => {
                    entry.evict.notify_one();
                    inner.entries.remove(&id);
                    inner.order.pop_front();
                    evicted += 1;
                }
                // Head is fresh; everything behind it is fresher.
                Some(_) => break,
                None => {
                    inner.order.pop_front();
                }
            }
        }
        evicted
    }

    /// Removes a connection and reports whether it was still fresh.
    /// Used by the client pool, which evicts by request instead of by
    /// periodic sweep.
    pub async fn take_if_fresh(&self, id: ConnId, max_idle: Duration) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.entries.remove(&id) {
            Some(entry) => entry.since.elapsed() < max_idle,
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }
}

//! Fan-out to connected clients.
//!
//! Every connection owns a bounded [`Outbox`] drained by its writer task.
//! Senders never wait on a recipient: when an outbox is full the oldest
//! queued packet is discarded to make room.

use broadside_core::HandleId;
use broadside_protocol::{ErrorBody, ErrorCode, PacketType};
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// A packet waiting to be written. The writer assigns the sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub packet_type: PacketType,
    pub payload: Bytes,
}

impl Outbound {
    pub fn new(packet_type: PacketType, payload: impl Into<Bytes>) -> Self {
        Self {
            packet_type,
            payload: payload.into(),
        }
    }

    /// Serializes `value` as the JSON payload.
    pub fn json<T: Serialize>(packet_type: PacketType, value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(packet_type, serde_json::to_vec(value)?))
    }

    /// An ERROR packet.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        let body = ErrorBody::new(code, message);
        // A struct of a string and a unit enum always serializes.
        let payload = serde_json::to_vec(&body).unwrap_or_default();
        Self::new(PacketType::Error, payload)
    }
}

/// Bounded drop-oldest queue feeding one connection's writer.
#[derive(Debug)]
pub struct Outbox {
    queue: Mutex<VecDeque<Outbound>>,
    capacity: usize,
    notify: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl Outbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    /// Queues a packet. Returns false once the outbox is closed.
    pub fn push(&self, packet: Outbound) -> bool {
        if self.is_closed() {
            return false;
        }
        {
            let mut queue = self.queue.lock();
            if queue.len() >= self.capacity {
                queue.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            queue.push_back(packet);
        }
        self.notify.notify_one();
        true
    }

    /// Stops accepting packets. Already queued packets are still delivered.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Waits for the next packet. Returns `None` once closed and drained.
    pub async fn recv(&self) -> Option<Outbound> {
        loop {
            let notified = self.notify.notified();
            {
                let mut queue = self.queue.lock();
                if let Some(packet) = queue.pop_front() {
                    return Some(packet);
                }
                if self.is_closed() {
                    return None;
                }
            }
            notified.await;
        }
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Packets discarded because the outbox was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Registry of connection outboxes keyed by handle.
#[derive(Default)]
pub struct BroadcastHub {
    outboxes: DashMap<HandleId, Arc<Outbox>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handle: HandleId, outbox: Arc<Outbox>) {
        self.outboxes.insert(handle, outbox);
    }

    /// Removes and closes a handle's outbox.
    pub fn unregister(&self, handle: HandleId) -> bool {
        match self.outboxes.remove(&handle) {
            Some((_, outbox)) => {
                outbox.close();
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, handle: HandleId) -> bool {
        self.outboxes.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.outboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outboxes.is_empty()
    }

    /// Sends to one handle. Returns false if it is not registered.
    pub fn send(&self, handle: HandleId, packet: Outbound) -> bool {
        match self.outboxes.get(&handle) {
            Some(outbox) => outbox.push(packet),
            None => false,
        }
    }

    /// Sends the same packet to every registered handle.
    pub fn broadcast(&self, packet: &Outbound) {
        for entry in self.outboxes.iter() {
            entry.value().push(packet.clone());
        }
    }

    /// Sends a per-recipient packet; `render` returns `None` to skip one.
    pub fn broadcast_with<F>(&self, mut render: F)
    where
        F: FnMut(HandleId) -> Option<Outbound>,
    {
        for entry in self.outboxes.iter() {
            if let Some(packet) = render(*entry.key()) {
                entry.value().push(packet);
            }
        }
    }

    /// Registered handles.
    pub fn handles(&self) -> Vec<HandleId> {
        let mut handles: Vec<HandleId> = self.outboxes.iter().map(|e| *e.key()).collect();
        handles.sort();
        handles
    }
}

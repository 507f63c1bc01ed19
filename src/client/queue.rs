// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The two packet queues and their ordering contract.
//!
//! Outgoing holds packets awaiting transmission; pending holds packets
//! already on the wire awaiting a matching reply. Each queue has a single
//! producer and a single consumer: API callers append to outgoing, the
//! sender loop moves packets from outgoing to pending, the receiver loop
//! consumes pending. Head insertion exists only for the handshake replay.

use std::{collections::VecDeque, sync::Mutex};

use crate::client::{common::lock, packet::Packet};

/// Ordered queue of packets awaiting transmission.
#[derive(Debug, Default)]
pub struct TransmitQueue {
    inner: Mutex<VecDeque<Packet>>,
}

impl TransmitQueue {
    pub fn push_back(&self, pkt: Packet) {
        lock(&self.inner).push_back(pkt);
    }

    /// Splices a batch at the head, keeping the batch's own order. Used once
    /// per handshake for the SetWatches/Auth replay, which must precede every
    /// application packet queued while the connection was down.
    pub fn push_replay(&self, batch: Vec<Packet>) {
        let mut q = lock(&self.inner);
        for pkt in batch.into_iter().rev() {
            q.push_front(pkt);
        }
    }

    pub fn pop_front(&self) -> Option<Packet> {
        lock(&self.inner).pop_front()
    }

    pub fn drain_all(&self) -> Vec<Packet> {
        lock(&self.inner).drain(..).collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).is_empty()
    }
}

/// FIFO of packets transmitted and awaiting a reply.
#[derive(Debug, Default)]
pub struct PendingQueue {
    inner: Mutex<VecDeque<Packet>>,
}

impl PendingQueue {
    pub fn push_back(&self, pkt: Packet) {
        lock(&self.inner).push_back(pkt);
    }

    pub fn pop_front(&self) -> Option<Packet> {
        lock(&self.inner).pop_front()
    }

    pub fn drain_all(&self) -> Vec<Packet> {
        lock(&self.inner).drain(..).collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).is_empty()
    }
}

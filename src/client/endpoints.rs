// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Resolved server list. Endpoints are shuffled once at startup and then
//! visited round-robin; per-endpoint failure tracking lets the reconnect
//! controller tell a fresh sweep from an exhausted one.

use std::time::Instant;

use rand::seq::SliceRandom;

use crate::cfg::config::{ConnectString, HostPort};

#[derive(Debug, Clone)]
pub struct Endpoint {
    pub addr: HostPort,
    pub consecutive_failures: u32,
    pub last_failure_at: Option<Instant>,
    failed_since_success: bool,
}

impl Endpoint {
    fn new(addr: HostPort) -> Self {
        Self {
            addr,
            consecutive_failures: 0,
            last_failure_at: None,
            failed_since_success: false,
        }
    }
}

#[derive(Debug)]
pub struct EndpointSet {
    endpoints: Vec<Endpoint>,
    cursor: usize,
}

impl EndpointSet {
    /// Builds the set from a parsed connect string, in randomized order.
    pub fn new(cs: &ConnectString) -> Self {
        let mut endpoints: Vec<Endpoint> =
            cs.endpoints.iter().cloned().map(Endpoint::new).collect();
        endpoints.shuffle(&mut rand::rng());
        Self {
            endpoints,
            cursor: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Hands out the endpoint under the cursor and advances it, wrapping
    /// around the list.
    pub fn next_candidate(&mut self) -> (usize, HostPort) {
        let idx = self.cursor;
        self.cursor = (self.cursor + 1) % self.endpoints.len();
        (idx, self.endpoints[idx].addr.clone())
    }

    /// True while some endpoint has not failed since the last success; once
    /// this turns false the sweep is exhausted and the caller backs off.
    pub fn is_next_available(&self) -> bool {
        self.endpoints.iter().any(|e| !e.failed_since_success)
    }

    pub fn mark_failure(&mut self, idx: usize) {
        let ep = &mut self.endpoints[idx];
        ep.consecutive_failures += 1;
        ep.last_failure_at = Some(Instant::now());
        ep.failed_since_success = true;
    }

    /// A success opens a new epoch: the succeeding endpoint's counter resets
    /// and every endpoint becomes eligible for the next sweep.
    pub fn mark_success(&mut self, idx: usize) {
        self.endpoints[idx].consecutive_failures = 0;
        for ep in &mut self.endpoints {
            ep.failed_since_success = false;
        }
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Watch-related records and the dispatcher-facing event types.
//!
//! The engine does not keep watch bookkeeping itself; the watch manager is an
//! external collaborator. It is consulted once per handshake for the replay
//! snapshot, and receives completed registrations back through the packet
//! completion signal.

use anyhow::Result;

use crate::models::archive::{ReadArchive, WriteArchive};

/// Node event kinds pushed by the server.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    None = -1,
    NodeCreated = 1,
    NodeDeleted = 2,
    NodeDataChanged = 3,
    NodeChildrenChanged = 4,
}

impl EventType {
    pub fn from_i32(v: i32) -> Option<Self> {
        Some(match v {
            -1 => Self::None,
            1 => Self::NodeCreated,
            2 => Self::NodeDeleted,
            3 => Self::NodeDataChanged,
            4 => Self::NodeChildrenChanged,
            _ => return None,
        })
    }
}

/// Session state as seen by watchers.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeeperState {
    Disconnected = 0,
    SyncConnected = 3,
    AuthFailed = 4,
    Expired = -112,
}

impl KeeperState {
    pub fn from_i32(v: i32) -> Option<Self> {
        Some(match v {
            0 => Self::Disconnected,
            3 => Self::SyncConnected,
            4 => Self::AuthFailed,
            -112 => Self::Expired,
            _ => return None,
        })
    }
}

/// Wire form of a notification body (xid −1 replies).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherEvent {
    pub event_type: i32,
    pub state: i32,
    pub path: String,
}

impl WatcherEvent {
    pub fn write(&self, w: &mut WriteArchive) {
        w.write_i32(self.event_type);
        w.write_i32(self.state);
        w.write_string(&self.path);
    }

    pub fn read(r: &mut ReadArchive) -> Result<Self> {
        Ok(Self {
            event_type: r.read_i32()?,
            state: r.read_i32()?,
            path: r.read_string()?,
        })
    }
}

/// What the event dispatcher receives: session events and node
/// notifications, with the chroot prefix already stripped from paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedEvent {
    pub event_type: EventType,
    pub keeper_state: KeeperState,
    pub path: String,
}

impl WatchedEvent {
    /// Session-level event with no node path attached.
    pub fn state_event(state: KeeperState) -> Self {
        Self {
            event_type: EventType::None,
            keeper_state: state,
            path: String::new(),
        }
    }
}

/// Which watch list a pending registration belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    Data,
    Exist,
    Child,
}

/// Registration tag a packet carries for the watch manager. The engine hands
/// it back, untouched, with the completion signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRegistration {
    pub path: String,
    pub kind: WatchKind,
}

/// Snapshot of registered watches taken at handshake time for the replay
/// packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchSnapshot {
    pub data_watches: Vec<String>,
    pub exist_watches: Vec<String>,
    pub child_watches: Vec<String>,
}

impl WatchSnapshot {
    pub fn is_empty(&self) -> bool {
        self.data_watches.is_empty()
            && self.exist_watches.is_empty()
            && self.child_watches.is_empty()
    }
}

/// Seam to the external watch bookkeeping collaborator.
pub trait WatchManager: Send + Sync {
    /// Current registered watches, with server-side (chrooted) paths.
    fn snapshot(&self) -> WatchSnapshot;
}

/// Wire record replayed after a reconnect so the server re-arms watches
/// (xid −8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetWatches {
    pub relative_zxid: i64,
    pub data_watches: Vec<String>,
    pub exist_watches: Vec<String>,
    pub child_watches: Vec<String>,
}

impl SetWatches {
    pub fn from_snapshot(last_zxid: i64, snap: WatchSnapshot) -> Self {
        Self {
            relative_zxid: last_zxid,
            data_watches: snap.data_watches,
            exist_watches: snap.exist_watches,
            child_watches: snap.child_watches,
        }
    }

    pub fn write(&self, w: &mut WriteArchive) {
        w.write_i64(self.relative_zxid);
        w.write_string_vec(&self.data_watches);
        w.write_string_vec(&self.exist_watches);
        w.write_string_vec(&self.child_watches);
    }

    pub fn read(r: &mut ReadArchive) -> Result<Self> {
        Ok(Self {
            relative_zxid: r.read_i64()?,
            data_watches: r.read_string_vec()?,
            exist_watches: r.read_string_vec()?,
            child_watches: r.read_string_vec()?,
        })
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Handshake records: the ConnectRequest/ConnectResponse pair exchanged when
//! a session is created or resumed, and the SASL token carrier exchanged
//! during the optional authentication loop.

use anyhow::Result;
use bytes::Bytes;

use crate::models::archive::{ReadArchive, WriteArchive};

/// Session passwords are fixed-size on the wire.
pub const PASSWORD_LEN: usize = 16;

/// First payload sent on every new TCP connection. Carries the session
/// identity so the server can resume an existing session, or zeros for a
/// brand new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub protocol_version: i32,
    pub last_zxid_seen: i64,
    pub timeout_ms: i32,
    pub session_id: i64,
    pub password: Vec<u8>,
}

impl ConnectRequest {
    pub fn write(&self, w: &mut WriteArchive) {
        w.write_i32(self.protocol_version);
        w.write_i64(self.last_zxid_seen);
        w.write_i32(self.timeout_ms);
        w.write_i64(self.session_id);
        w.write_buffer(&self.password);
    }

    pub fn read(r: &mut ReadArchive) -> Result<Self> {
        Ok(Self {
            protocol_version: r.read_i32()?,
            last_zxid_seen: r.read_i64()?,
            timeout_ms: r.read_i32()?,
            session_id: r.read_i64()?,
            password: r.read_buffer()?.to_vec(),
        })
    }
}

/// First payload received after a ConnectRequest. A non-positive negotiated
/// timeout means the server refused to resume the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectResponse {
    pub protocol_version: i32,
    pub negotiated_timeout_ms: i32,
    pub session_id: i64,
    pub password: Vec<u8>,
}

impl ConnectResponse {
    pub fn write(&self, w: &mut WriteArchive) {
        w.write_i32(self.protocol_version);
        w.write_i32(self.negotiated_timeout_ms);
        w.write_i64(self.session_id);
        w.write_buffer(&self.password);
    }

    pub fn read(r: &mut ReadArchive) -> Result<Self> {
        Ok(Self {
            protocol_version: r.read_i32()?,
            negotiated_timeout_ms: r.read_i32()?,
            session_id: r.read_i64()?,
            password: r.read_buffer()?.to_vec(),
        })
    }
}

/// Token carrier for one step of the SASL challenge/response loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaslRequest {
    pub token: Bytes,
}

impl SaslRequest {
    pub fn write(&self, w: &mut WriteArchive) {
        w.write_buffer(&self.token);
    }

    pub fn read(r: &mut ReadArchive) -> Result<Self> {
        Ok(Self {
            token: r.read_buffer()?,
        })
    }
}

/// Challenge token attached to a SASL reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaslResponse {
    pub token: Bytes,
}

impl SaslResponse {
    pub fn write(&self, w: &mut WriteArchive) {
        w.write_buffer(&self.token);
    }

    pub fn read(r: &mut ReadArchive) -> Result<Self> {
        Ok(Self {
            token: r.read_buffer()?,
        })
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Auth credential record. Credentials added by the API layer are sent as
//! xid −4 packets and replayed on every reconnect so the restored connection
//! carries the same identity.

use anyhow::Result;
use bytes::Bytes;

use crate::models::archive::{ReadArchive, WriteArchive};

/// One stored credential: a scheme name plus opaque auth bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthData {
    pub scheme: String,
    pub auth: Bytes,
}

/// Wire record for an Auth request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPacket {
    pub auth_type: i32,
    pub scheme: String,
    pub auth: Bytes,
}

impl AuthPacket {
    pub fn from_data(data: &AuthData) -> Self {
        Self {
            auth_type: 0,
            scheme: data.scheme.clone(),
            auth: data.auth.clone(),
        }
    }

    pub fn write(&self, w: &mut WriteArchive) {
        w.write_i32(self.auth_type);
        w.write_string(&self.scheme);
        w.write_buffer(&self.auth);
    }

    pub fn read(r: &mut ReadArchive) -> Result<Self> {
        Ok(Self {
            auth_type: r.read_i32()?,
            scheme: r.read_string()?,
            auth: r.read_buffer()?,
        })
    }
}

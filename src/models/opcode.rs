// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Request type codes carried in `RequestHeader.type`.
//!
//! The engine itself interprets only the session-level codes (Ping, Auth,
//! Sasl, SetWatches, CloseSession); everything else is submitted by the API
//! layer and travels through the engine as an opaque payload.

use std::convert::TryFrom;

use thiserror::Error;

/// All request types defined by the ZooKeeper protocol.
#[repr(i32)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Notification = 0,
    Create = 1,
    Delete = 2,
    Exists = 3,
    #[default]
    GetData = 4,
    SetData = 5,
    GetAcl = 6,
    SetAcl = 7,
    GetChildren = 8,
    Sync = 9,
    Ping = 11,
    GetChildren2 = 12,
    Check = 13,
    Multi = 14,
    Auth = 100,
    SetWatches = 101,
    Sasl = 102,
    CreateSession = -10,
    CloseSession = -11,
    Error = -1,
}

impl OpCode {
    pub fn from_i32(v: i32) -> Option<Self> {
        Some(match v {
            0 => Self::Notification,
            1 => Self::Create,
            2 => Self::Delete,
            3 => Self::Exists,
            4 => Self::GetData,
            5 => Self::SetData,
            6 => Self::GetAcl,
            7 => Self::SetAcl,
            8 => Self::GetChildren,
            9 => Self::Sync,
            11 => Self::Ping,
            12 => Self::GetChildren2,
            13 => Self::Check,
            14 => Self::Multi,
            100 => Self::Auth,
            101 => Self::SetWatches,
            102 => Self::Sasl,
            -10 => Self::CreateSession,
            -11 => Self::CloseSession,
            -1 => Self::Error,
            _ => return None,
        })
    }

    /// Session-level traffic generated by the engine rather than the caller.
    #[inline]
    pub fn is_internal(self) -> bool {
        matches!(
            self,
            Self::Ping | Self::Auth | Self::Sasl | Self::SetWatches | Self::CreateSession
        )
    }
}

/// Returned when a header carries a type code this crate does not know.
#[derive(Debug, Error)]
#[error("unknown opcode: {0}")]
pub struct UnknownOpCode(pub i32);

impl TryFrom<i32> for OpCode {
    type Error = UnknownOpCode;

    fn try_from(v: i32) -> Result<Self, UnknownOpCode> {
        OpCode::from_i32(v).ok_or(UnknownOpCode(v))
    }
}

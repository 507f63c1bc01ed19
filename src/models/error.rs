// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Server error codes surfaced through `ReplyHeader.err`.
//!
//! The engine materializes only the codes it produces itself (connection
//! loss, timeouts, session death); data-layer codes pass through verbatim so
//! the API layer can interpret them.

use thiserror::Error;

#[repr(i32)]
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ZkError {
    #[error("ok")]
    Ok = 0,
    #[error("system error")]
    SystemError = -1,
    #[error("runtime inconsistency")]
    RuntimeInconsistency = -2,
    #[error("data inconsistency")]
    DataInconsistency = -3,
    #[error("connection loss")]
    ConnectionLoss = -4,
    #[error("marshalling error")]
    MarshallingError = -5,
    #[error("operation is unimplemented")]
    Unimplemented = -6,
    #[error("operation timeout")]
    OperationTimeout = -7,
    #[error("bad arguments")]
    BadArguments = -8,
    #[error("api error")]
    ApiError = -100,
    #[error("node does not exist")]
    NoNode = -101,
    #[error("not authenticated")]
    NoAuth = -102,
    #[error("version conflict")]
    BadVersion = -103,
    #[error("ephemeral nodes may not have children")]
    NoChildrenForEphemerals = -108,
    #[error("node already exists")]
    NodeExists = -110,
    #[error("node has children")]
    NotEmpty = -111,
    #[error("session expired")]
    SessionExpired = -112,
    #[error("invalid callback")]
    InvalidCallback = -113,
    #[error("invalid acl")]
    InvalidAcl = -114,
    #[error("authentication failed")]
    AuthFailed = -115,
    #[error("session moved to another server")]
    SessionMoved = -118,
    #[error("state-changing request passed to read-only server")]
    NotReadOnly = -119,
}

impl ZkError {
    /// Decode a wire error code; unknown codes collapse to the nearest
    /// category marker so callers still get a typed value.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Ok,
            -1 => Self::SystemError,
            -2 => Self::RuntimeInconsistency,
            -3 => Self::DataInconsistency,
            -4 => Self::ConnectionLoss,
            -5 => Self::MarshallingError,
            -6 => Self::Unimplemented,
            -7 => Self::OperationTimeout,
            -8 => Self::BadArguments,
            -100 => Self::ApiError,
            -101 => Self::NoNode,
            -102 => Self::NoAuth,
            -103 => Self::BadVersion,
            -108 => Self::NoChildrenForEphemerals,
            -110 => Self::NodeExists,
            -111 => Self::NotEmpty,
            -112 => Self::SessionExpired,
            -113 => Self::InvalidCallback,
            -114 => Self::InvalidAcl,
            -115 => Self::AuthFailed,
            -118 => Self::SessionMoved,
            -119 => Self::NotReadOnly,
            c if c > -100 => Self::SystemError,
            _ => Self::ApiError,
        }
    }

    #[inline]
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Errors that kill the session for good; no reconnect is attempted.
    #[inline]
    pub fn is_fatal_session(self) -> bool {
        matches!(self, Self::SessionExpired | Self::AuthFailed)
    }
}

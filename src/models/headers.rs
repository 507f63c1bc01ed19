// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Fixed-layout request/reply headers.
//!
//! Every framed request except the initial ConnectRequest starts with a
//! `RequestHeader`; every reply except the ConnectResponse starts with a
//! `ReplyHeader`. Both are plain big-endian structs, so they are mapped with
//! zerocopy instead of going through the archive reader.

use anyhow::{Result, anyhow};
use zerocopy::{
    BigEndian, FromBytes as ZFromBytes, I32, I64, Immutable, IntoBytes, KnownLayout,
};

/// Reply xid marking a watch notification pushed by the server.
pub const NOTIFICATION_XID: i32 = -1;
/// Xid reserved for ping traffic; ping replies never match the pending queue.
pub const PING_XID: i32 = -2;
/// Xid reserved for auth packets.
pub const AUTH_XID: i32 = -4;
/// Xid reserved for the watch-replay packet sent right after a reconnect.
pub const SET_WATCHES_XID: i32 = -8;

pub const REQUEST_HEADER_LEN: usize = 8;
pub const REPLY_HEADER_LEN: usize = 16;

/// `{ xid: i32, type: i32 }` prefix of every client request.
#[repr(C)]
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, ZFromBytes, IntoBytes, KnownLayout, Immutable,
)]
pub struct RequestHeader {
    pub xid: I32<BigEndian>,
    pub op: I32<BigEndian>,
}

impl RequestHeader {
    pub fn new(xid: i32, op: i32) -> Self {
        Self {
            xid: I32::new(xid),
            op: I32::new(op),
        }
    }

    #[inline]
    pub fn xid(&self) -> i32 {
        self.xid.get()
    }

    #[inline]
    pub fn op(&self) -> i32 {
        self.op.get()
    }
}

/// `{ xid: i32, zxid: i64, err: i32 }` prefix of every server reply.
#[repr(C)]
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, ZFromBytes, IntoBytes, KnownLayout, Immutable,
)]
pub struct ReplyHeader {
    pub xid: I32<BigEndian>,
    pub zxid: I64<BigEndian>,
    pub err: I32<BigEndian>,
}

impl ReplyHeader {
    pub fn new(xid: i32, zxid: i64, err: i32) -> Self {
        Self {
            xid: I32::new(xid),
            zxid: I64::new(zxid),
            err: I32::new(err),
        }
    }

    /// Map the leading [`REPLY_HEADER_LEN`] bytes of a reply frame.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let (hdr, _rest) = <Self as ZFromBytes>::read_from_prefix(buf)
            .map_err(|_| anyhow!("reply frame shorter than {REPLY_HEADER_LEN} bytes"))?;
        Ok(hdr)
    }

    #[inline]
    pub fn xid(&self) -> i32 {
        self.xid.get()
    }

    #[inline]
    pub fn zxid(&self) -> i64 {
        self.zxid.get()
    }

    #[inline]
    pub fn err(&self) -> i32 {
        self.err.get()
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A packet is one unit of work: the serialized request frame, the slot for
//! its reply, and the completion signal the submitting caller waits on.
//!
//! The wire bytes are produced at construction and never change afterwards.
//! Completion happens exactly once; the oneshot sender is consumed by it, so
//! a second completion is unrepresentable.

use std::time::Duration;

use anyhow::{Result, anyhow};
use bytes::{Bytes, BytesMut};
use tokio::sync::oneshot;
use tracing::trace;
use zerocopy::IntoBytes;

use crate::{
    client::framing::FRAME_PREFIX_LEN,
    models::{
        error::ZkError,
        headers::{REQUEST_HEADER_LEN, ReplyHeader, RequestHeader},
        watch::WatchRegistration,
    },
};

/// What the caller receives when its packet finishes.
#[derive(Debug)]
pub struct Reply {
    pub header: ReplyHeader,
    /// Raw response body; the API layer deserializes it.
    pub body: Bytes,
    /// The registration tag handed back for the watch manager.
    pub watch: Option<WatchRegistration>,
    pub client_path: String,
}

impl Reply {
    #[inline]
    pub fn error(&self) -> ZkError {
        ZkError::from_code(self.header.err())
    }
}

/// Caller-side half of the completion signal.
#[derive(Debug)]
pub struct PacketHandle {
    rx: oneshot::Receiver<Reply>,
}

impl PacketHandle {
    /// Waits for completion with a bounded deadline. The packet stays in
    /// flight past the deadline; only the wait is abandoned.
    pub async fn wait(self, deadline: Duration) -> Result<Reply> {
        match tokio::time::timeout(deadline, self.rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(anyhow!(ZkError::ConnectionLoss)),
            Err(_) => Err(anyhow!(ZkError::OperationTimeout)),
        }
    }
}

#[derive(Debug)]
pub struct Packet {
    header: Option<RequestHeader>,
    /// Authoritative once the packet has finished.
    pub reply_header: ReplyHeader,
    /// Full frame including the length prefix; immutable after construction.
    bytes: Bytes,
    pub response: Option<Bytes>,
    pub watch: Option<WatchRegistration>,
    pub client_path: String,
    pub server_path: String,
    done: Option<oneshot::Sender<Reply>>,
}

impl Packet {
    /// Caller-submitted packet with a completion handle.
    pub fn new(
        header: RequestHeader,
        body: &[u8],
        watch: Option<WatchRegistration>,
        client_path: String,
        server_path: String,
    ) -> (Self, PacketHandle) {
        let (tx, rx) = oneshot::channel();
        let pkt = Self {
            bytes: serialize(Some(&header), body),
            header: Some(header),
            reply_header: ReplyHeader::default(),
            response: None,
            watch,
            client_path,
            server_path,
            done: Some(tx),
        };
        (pkt, PacketHandle { rx })
    }

    /// Engine-generated packet (ping, auth, watch replay, close) with nobody
    /// waiting on the other end.
    pub fn internal(header: RequestHeader, body: &[u8]) -> Self {
        Self {
            bytes: serialize(Some(&header), body),
            header: Some(header),
            reply_header: ReplyHeader::default(),
            response: None,
            watch: None,
            client_path: String::new(),
            server_path: String::new(),
            done: None,
        }
    }

    #[inline]
    pub fn xid(&self) -> i32 {
        self.header.map(|h| h.xid()).unwrap_or_default()
    }

    #[inline]
    pub fn op(&self) -> i32 {
        self.header.map(|h| h.op()).unwrap_or_default()
    }

    /// The frame to put on the socket, length prefix included.
    #[inline]
    pub fn wire_bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Completes the packet with whatever `reply_header`/`response` hold.
    pub fn finish(mut self) {
        let reply = Reply {
            header: self.reply_header,
            body: self.response.take().unwrap_or_default(),
            watch: self.watch.take(),
            client_path: std::mem::take(&mut self.client_path),
        };
        trace!(xid = reply.header.xid(), err = reply.header.err(), "packet finished");
        if let Some(tx) = self.done.take() {
            // The caller may have timed out and dropped its handle.
            let _ = tx.send(reply);
        }
    }

    /// Completes the packet with an engine-generated error.
    pub fn finish_err(mut self, err: ZkError) {
        self.reply_header = ReplyHeader::new(self.xid(), self.reply_header.zxid(), err.code());
        self.response = None;
        self.finish();
    }
}

fn serialize(header: Option<&RequestHeader>, body: &[u8]) -> Bytes {
    let header_len = header.map(|_| REQUEST_HEADER_LEN).unwrap_or(0);
    let total = header_len + body.len();
    let mut buf = BytesMut::with_capacity(FRAME_PREFIX_LEN + total);
    buf.extend_from_slice(&(total as i32).to_be_bytes());
    if let Some(h) = header {
        buf.extend_from_slice(h.as_bytes());
    }
    buf.extend_from_slice(body);
    buf.freeze()
}

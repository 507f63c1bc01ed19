// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! SASL seam and the inline challenge/response loop.
//!
//! Mechanism implementations (DIGEST-MD5, GSSAPI, …) live outside this
//! crate; the engine only drives the exchange. The loop runs inside the
//! handshake while the driver has exclusive use of the socket, so every
//! reply is awaited synchronously under the connect timeout.

use std::{net::SocketAddr, time::Duration};

use anyhow::{Context, Result, anyhow, bail};
use bytes::Bytes;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use zerocopy::IntoBytes;

use crate::{
    client::{
        common::io_with_timeout,
        framing::{read_frame, write_frame},
    },
    models::{
        archive::{ReadArchive, WriteArchive},
        connect::{SaslRequest, SaslResponse},
        error::ZkError,
        headers::{ReplyHeader, RequestHeader},
        opcode::OpCode,
    },
};

/// Client side of one SASL mechanism. Stateful: `evaluate_challenge` advances
/// the mechanism until `is_complete` reports done.
pub trait SaslClient: Send {
    /// Produces the initial token. Called once, before any exchange.
    fn start(&mut self, local: SocketAddr, remote: SocketAddr) -> Result<Vec<u8>>;

    /// Consumes a server challenge and produces the next response token.
    fn evaluate_challenge(&mut self, challenge: &[u8]) -> Result<Vec<u8>>;

    fn is_complete(&self) -> bool;

    /// Whether a final response token must still be sent once the mechanism
    /// has completed.
    fn has_last_packet(&self) -> bool;
}

/// Runs the challenge/response loop to completion. A non-zero error in any
/// reply fails the handshake as an authentication failure.
pub(crate) async fn negotiate(
    client: &mut dyn SaslClient,
    stream: &mut TcpStream,
    max_frame: usize,
    io_timeout: Duration,
    cancel: &CancellationToken,
    mut next_xid: impl FnMut() -> i32,
) -> Result<()> {
    let local = stream.local_addr()?;
    let remote = stream.peer_addr()?;

    let mut token = client.start(local, remote)?;
    let mut rounds = 0u32;
    loop {
        let challenge =
            exchange(stream, &token, max_frame, io_timeout, cancel, next_xid()).await?;
        rounds += 1;

        if client.is_complete() {
            break;
        }

        token = client
            .evaluate_challenge(&challenge)
            .context("SASL challenge evaluation failed")?;

        if client.is_complete() {
            if client.has_last_packet() {
                let _ = exchange(stream, &token, max_frame, io_timeout, cancel, next_xid())
                    .await?;
                rounds += 1;
            }
            break;
        }
    }

    debug!(rounds, "SASL negotiation complete");
    Ok(())
}

/// One request/reply round: send a token, synchronously await the challenge.
async fn exchange(
    stream: &mut TcpStream,
    token: &[u8],
    max_frame: usize,
    io_timeout: Duration,
    cancel: &CancellationToken,
    xid: i32,
) -> Result<Bytes> {
    let mut w = WriteArchive::new();
    w.write_raw(RequestHeader::new(xid, OpCode::Sasl as i32).as_bytes());
    SaslRequest {
        token: Bytes::copy_from_slice(token),
    }
    .write(&mut w);

    io_with_timeout(
        "write SASL token",
        write_frame(stream, &w.into_bytes()),
        io_timeout,
        cancel,
    )
    .await?;

    let frame = io_with_timeout(
        "read SASL reply",
        read_frame(stream, max_frame),
        io_timeout,
        cancel,
    )
    .await?;

    let header = ReplyHeader::parse(&frame)?;
    if header.err() != 0 {
        return Err(anyhow!(ZkError::AuthFailed)).with_context(|| {
            format!("server rejected SASL token with err={}", header.err())
        });
    }
    if header.xid() != xid {
        bail!(
            "SASL reply xid {} does not match request xid {xid}",
            header.xid()
        );
    }

    let mut r = ReadArchive::new(frame.slice(crate::models::headers::REPLY_HEADER_LEN..));
    Ok(SaslResponse::read(&mut r)?.token)
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The handshake sequence run on every new TCP connection: send the
//! ConnectRequest, run the optional SASL loop, then consume the
//! ConnectResponse. While this driver runs it has exclusive use of the
//! socket; the send/receive loops only start once it has finished, so no
//! application packet can interleave with the handshake exchange.

use std::pin::Pin;

use anyhow::{Context, Result, anyhow};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    client::{
        client::ClientSession,
        common::io_with_timeout,
        framing::{read_frame, write_frame},
    },
    models::{
        archive::{ReadArchive, WriteArchive},
        connect::ConnectResponse,
        error::ZkError,
    },
    state_machine::{
        common::{StateMachine, StateMachineCtx, Transition},
        sasl,
    },
};

/// Context threaded through the handshake states.
pub struct HandshakeCtx<'a> {
    pub session: &'a ClientSession,
    pub stream: &'a mut TcpStream,
    pub cancel: CancellationToken,
    /// The consumed ConnectResponse once `AwaitConnect` has run.
    pub response: Option<ConnectResponse>,

    state: Option<HandshakeStates>,
}

impl<'a> HandshakeCtx<'a> {
    pub fn new(
        session: &'a ClientSession,
        stream: &'a mut TcpStream,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session,
            stream,
            cancel,
            response: None,
            state: Some(HandshakeStates::SendConnect(SendConnect)),
        }
    }
}

/// A step either errors out or names the next state.
pub type HandshakeStepOut = Transition<HandshakeStates, Result<()>>;

/// The handshake sub-states, in wire order.
#[derive(Debug)]
pub enum HandshakeStates {
    /// Writes the ConnectRequest carrying the stored session identity.
    SendConnect(SendConnect),
    /// Runs the inline SASL challenge/response loop.
    SaslNegotiate(SaslNegotiate),
    /// Reads and validates the ConnectResponse.
    AwaitConnect(AwaitConnect),
}

#[derive(Debug)]
pub struct SendConnect;

impl<'ctx> StateMachine<HandshakeCtx<'ctx>, HandshakeStepOut> for SendConnect {
    type StepResult<'a>
        = Pin<Box<dyn Future<Output = HandshakeStepOut> + Send + 'a>>
    where
        Self: 'a,
        HandshakeCtx<'ctx>: 'a;

    fn step<'a>(&'a mut self, ctx: &'a mut HandshakeCtx<'ctx>) -> Self::StepResult<'a> {
        Box::pin(async move {
            let req = ctx.session.connect_request();
            debug!(
                session_id = format_args!("{:#018x}", req.session_id),
                last_zxid = req.last_zxid_seen,
                timeout_ms = req.timeout_ms,
                "sending connect request"
            );

            let mut w = WriteArchive::new();
            req.write(&mut w);

            let res = io_with_timeout(
                "write connect request",
                write_frame(ctx.stream, &w.into_bytes()),
                ctx.session.config().session.connect_timeout,
                &ctx.cancel,
            )
            .await;

            match res {
                Err(e) => Transition::Done(Err(e)),
                Ok(()) if ctx.session.has_sasl() => {
                    Transition::Next(HandshakeStates::SaslNegotiate(SaslNegotiate), Ok(()))
                },
                Ok(()) => {
                    Transition::Next(HandshakeStates::AwaitConnect(AwaitConnect), Ok(()))
                },
            }
        })
    }
}

#[derive(Debug)]
pub struct SaslNegotiate;

impl<'ctx> StateMachine<HandshakeCtx<'ctx>, HandshakeStepOut> for SaslNegotiate {
    type StepResult<'a>
        = Pin<Box<dyn Future<Output = HandshakeStepOut> + Send + 'a>>
    where
        Self: 'a,
        HandshakeCtx<'ctx>: 'a;

    fn step<'a>(&'a mut self, ctx: &'a mut HandshakeCtx<'ctx>) -> Self::StepResult<'a> {
        Box::pin(async move {
            let mut guard = ctx.session.sasl_slot().lock().await;
            let Some(client) = guard.as_mut() else {
                // Configured flag without a client is a construction bug.
                return Transition::Done(Err(anyhow!("SASL client missing")));
            };

            let cfg = ctx.session.config();
            let res = sasl::negotiate(
                client.as_mut(),
                ctx.stream,
                cfg.session.max_packet_length,
                cfg.session.connect_timeout,
                &ctx.cancel,
                || ctx.session.next_xid(),
            )
            .await;

            match res {
                Err(e) => Transition::Done(Err(e)),
                Ok(()) => {
                    Transition::Next(HandshakeStates::AwaitConnect(AwaitConnect), Ok(()))
                },
            }
        })
    }
}

#[derive(Debug)]
pub struct AwaitConnect;

impl<'ctx> StateMachine<HandshakeCtx<'ctx>, HandshakeStepOut> for AwaitConnect {
    type StepResult<'a>
        = Pin<Box<dyn Future<Output = HandshakeStepOut> + Send + 'a>>
    where
        Self: 'a,
        HandshakeCtx<'ctx>: 'a;

    fn step<'a>(&'a mut self, ctx: &'a mut HandshakeCtx<'ctx>) -> Self::StepResult<'a> {
        Box::pin(async move {
            let cfg = ctx.session.config();
            let frame = match io_with_timeout(
                "read connect response",
                read_frame(ctx.stream, cfg.session.max_packet_length),
                cfg.session.connect_timeout,
                &ctx.cancel,
            )
            .await
            {
                Ok(frame) => frame,
                Err(e) => return Transition::Done(Err(e)),
            };

            let mut r = ReadArchive::new(frame);
            let resp = match ConnectResponse::read(&mut r)
                .context("malformed connect response")
            {
                Ok(resp) => resp,
                Err(e) => return Transition::Done(Err(e)),
            };

            if resp.negotiated_timeout_ms <= 0 {
                warn!(
                    session_id = format_args!("{:#018x}", resp.session_id),
                    "server refused session resumption"
                );
                return Transition::Done(
                    Err(anyhow!(ZkError::SessionExpired))
                        .context("session expired by server"),
                );
            }

            ctx.response = Some(resp);
            Transition::Done(Ok(()))
        })
    }
}

impl<'ctx> StateMachineCtx<ConnectResponse> for HandshakeCtx<'ctx> {
    async fn execute(&mut self, _cancel: &CancellationToken) -> Result<ConnectResponse> {
        loop {
            let state = self.state.take().context("handshake state must be set")?;
            let tr = match state {
                HandshakeStates::SendConnect(mut s) => s.step(self).await,
                HandshakeStates::SaslNegotiate(mut s) => s.step(self).await,
                HandshakeStates::AwaitConnect(mut s) => s.step(self).await,
            };

            match tr {
                Transition::Next(next_state, r) => {
                    r?;
                    self.state = Some(next_state);
                },
                Transition::Stay(r) => r?,
                Transition::Done(r) => {
                    r?;
                    return self
                        .response
                        .take()
                        .ok_or_else(|| anyhow!("handshake finished without a response"));
                },
            }
        }
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{net::SocketAddr, time::Duration};

use anyhow::{Result, ensure};
use bytes::Bytes;
use tokio::time::timeout;
use zk_client_rs::{
    client::client::ClientSession,
    models::{
        archive::{ReadArchive, WriteArchive},
        connect::{SaslRequest, SaslResponse},
        error::ZkError,
        opcode::OpCode,
        watch::KeeperState,
    },
    state_machine::sasl::SaslClient,
};

use crate::integration_tests::common::{
    STEP, accept, bind, config_with_timeout, read_frame, server_password, shutdown,
    split_request, write_reply,
};

/// Scripted two-round mechanism: empty initial token, one challenge, one
/// response, then done with a final packet.
struct ScriptedSasl {
    responded: bool,
    complete: bool,
}

impl ScriptedSasl {
    fn new() -> Self {
        Self {
            responded: false,
            complete: false,
        }
    }
}

impl SaslClient for ScriptedSasl {
    fn start(&mut self, _local: SocketAddr, _remote: SocketAddr) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    fn evaluate_challenge(&mut self, challenge: &[u8]) -> Result<Vec<u8>> {
        ensure!(challenge == b"challenge-1", "unexpected challenge");
        self.responded = true;
        self.complete = true;
        Ok(b"response-1".to_vec())
    }

    fn is_complete(&self) -> bool {
        self.complete
    }

    fn has_last_packet(&self) -> bool {
        self.responded
    }
}

#[tokio::test]
async fn sasl_exchange_precedes_the_first_application_packet() -> Result<()> {
    let (listener, addr) = bind().await?;
    let cfg = config_with_timeout(&addr, Duration::from_secs(6));
    let (session, mut events) =
        ClientSession::start_with(cfg, Some(Box::new(ScriptedSasl::new())), None)?;

    // Submitted before the handshake even starts; it must still come last.
    let handle = session.submit(OpCode::GetData, Bytes::from_static(b"after-sasl"))?;

    let server = tokio::spawn(async move {
        let mut stream = accept(&listener).await?;

        // ConnectRequest arrives first, before any SASL traffic.
        let req = crate::integration_tests::common::read_connect_request(&mut stream)
            .await?;
        ensure!(req.session_id == 0, "fresh session expected");

        // Round 1: empty initial token -> challenge.
        let frame = read_frame(&mut stream).await?;
        let (sasl1, body) = split_request(&frame)?;
        ensure!(sasl1.op() == OpCode::Sasl as i32, "expected SASL packet");
        let token = SaslRequest::read(&mut ReadArchive::new(body))?.token;
        ensure!(token.is_empty(), "initial token must be empty");

        let mut w = WriteArchive::new();
        SaslResponse {
            token: Bytes::from_static(b"challenge-1"),
        }
        .write(&mut w);
        write_reply(&mut stream, sasl1.xid(), 0, 0, &w.into_bytes()).await?;

        // Round 2: the evaluated response, acknowledged with no challenge.
        let frame = read_frame(&mut stream).await?;
        let (sasl2, body) = split_request(&frame)?;
        let token = SaslRequest::read(&mut ReadArchive::new(body))?.token;
        ensure!(token.as_ref() == b"response-1", "unexpected SASL response");

        let mut w = WriteArchive::new();
        SaslResponse { token: Bytes::new() }.write(&mut w);
        write_reply(&mut stream, sasl2.xid(), 0, 0, &w.into_bytes()).await?;

        // Only now the ConnectResponse; handshake resumes.
        let resp = zk_client_rs::models::connect::ConnectResponse {
            protocol_version: 0,
            negotiated_timeout_ms: 20_000,
            session_id: 0xCAFE,
            password: server_password(),
        };
        let mut w = WriteArchive::new();
        resp.write(&mut w);
        crate::integration_tests::common::write_frame(&mut stream, &w.into_bytes())
            .await?;

        // The first post-handshake frame is the application packet.
        let frame = read_frame(&mut stream).await?;
        let (app, app_body) = split_request(&frame)?;
        ensure!(app.op() == OpCode::GetData as i32, "expected application packet");
        write_reply(&mut stream, app.xid(), 7, 0, b"granted").await?;

        anyhow::Ok((sasl1, sasl2, app, app_body, stream))
    });

    let (sasl1, sasl2, app, app_body, stream) = server.await??;
    assert_eq!(app_body.as_ref(), b"after-sasl");
    // The early submission took xid 1; the SASL rounds drew the next two.
    assert_eq!(app.xid(), 1);
    assert_eq!(sasl1.xid(), 2);
    assert_eq!(sasl2.xid(), 3);

    let ev = timeout(STEP, events.recv()).await?.expect("event");
    assert_eq!(ev.keeper_state, KeeperState::SyncConnected);

    let reply = handle.wait(STEP).await?;
    assert_eq!(reply.error(), ZkError::Ok);
    assert_eq!(reply.body.as_ref(), b"granted");
    assert_eq!(session.session_id(), 0xCAFE);

    shutdown(&session, stream).await;
    Ok(())
}

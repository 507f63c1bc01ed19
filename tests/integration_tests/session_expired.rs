// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use tokio::time::timeout;
use zk_client_rs::{
    client::client::ClientSession,
    models::{
        archive::WriteArchive, connect::ConnectResponse, error::ZkError, opcode::OpCode,
        watch::KeeperState,
    },
    state_machine::session::SessionState,
};

use crate::integration_tests::common::{
    STEP, accept, bind, config_with_timeout, read_connect_request, serve_handshake,
    server_password, write_frame,
};

#[tokio::test]
async fn refused_resumption_kills_the_session_for_good() -> Result<()> {
    let (listener, addr) = bind().await?;
    let cfg = config_with_timeout(&addr, Duration::from_secs(6));
    let (session, mut events) = ClientSession::start(cfg)?;

    let server = tokio::spawn(async move {
        // First connection: session established, then the server goes away.
        let mut stream = accept(&listener).await?;
        serve_handshake(&mut stream, 20_000, 0xF00D, &server_password()).await?;
        drop(stream);

        // The reconnect attempt is refused: negotiated timeout 0 means the
        // session is gone.
        let mut stream = accept(&listener).await?;
        let resume = read_connect_request(&mut stream).await?;
        let refusal = ConnectResponse {
            protocol_version: 0,
            negotiated_timeout_ms: 0,
            session_id: 0,
            password: vec![0u8; 16],
        };
        let mut w = WriteArchive::new();
        refusal.write(&mut w);
        write_frame(&mut stream, &w.into_bytes()).await?;
        anyhow::Ok((resume, stream))
    });

    let ev = timeout(STEP, events.recv()).await?.expect("event");
    assert_eq!(ev.keeper_state, KeeperState::SyncConnected);
    let ev = timeout(STEP, events.recv()).await?.expect("event");
    assert_eq!(ev.keeper_state, KeeperState::Disconnected);

    // Queued while the session is between connections; it must die with the
    // session, not with the connection.
    let handle = session.submit(OpCode::GetData, Bytes::from_static(b"doomed"))?;

    let ev = timeout(STEP, events.recv()).await?.expect("event");
    assert_eq!(ev.keeper_state, KeeperState::Expired);

    let (resume, _stream) = server.await??;
    assert_eq!(resume.session_id, 0xF00D);
    assert_eq!(resume.password, server_password());

    let reply = handle.wait(STEP).await?;
    assert_eq!(reply.error(), ZkError::SessionExpired);

    // Terminal: no reconnect, submissions are rejected outright.
    assert_eq!(session.state(), SessionState::Closed);
    let err = session
        .submit(OpCode::GetData, Bytes::new())
        .expect_err("closed session must reject submissions");
    assert_eq!(
        err.chain()
            .find_map(|c| c.downcast_ref::<ZkError>())
            .copied(),
        Some(ZkError::SessionExpired)
    );

    session.dispose().await.ok();
    Ok(())
}

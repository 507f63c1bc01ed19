// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use tokio::time::timeout;
use zk_client_rs::{
    client::client::ClientSession,
    models::{opcode::OpCode, watch::KeeperState},
    state_machine::session::SessionState,
};

use crate::integration_tests::common::{
    STEP, accept, bind, config_with_timeout, read_frame, serve_handshake,
    server_password, split_request,
};

#[tokio::test]
async fn dispose_flushes_close_session_and_waits_for_peer_close() -> Result<()> {
    let (listener, addr) = bind().await?;
    let cfg = config_with_timeout(&addr, Duration::from_secs(6));
    let (session, mut events) = ClientSession::start(cfg)?;

    let server = tokio::spawn(async move {
        let mut stream = accept(&listener).await?;
        serve_handshake(&mut stream, 20_000, 0x5E55, &server_password()).await?;

        // The peer closes the socket once the CloseSession arrives.
        let frame = read_frame(&mut stream).await?;
        let (header, _) = split_request(&frame)?;
        drop(stream);
        anyhow::Ok(header)
    });

    let ev = timeout(STEP, events.recv()).await?.expect("event");
    assert_eq!(ev.keeper_state, KeeperState::SyncConnected);

    session.dispose().await?;

    let close = server.await??;
    assert_eq!(close.op(), OpCode::CloseSession as i32);
    assert!(close.xid() > 0);

    assert_eq!(session.state(), SessionState::Closed);

    // No packets are accepted after closing begins.
    assert!(session.submit(OpCode::GetData, Bytes::new()).is_err());
    Ok(())
}

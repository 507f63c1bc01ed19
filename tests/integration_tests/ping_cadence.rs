// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::{Duration, Instant};

use anyhow::Result;
use serial_test::serial;
use zk_client_rs::{
    client::client::ClientSession,
    models::{headers::PING_XID, opcode::OpCode},
};

use crate::integration_tests::common::{
    accept, bind, config_with_timeout, read_frame, serve_handshake, server_password,
    shutdown, split_request, write_reply,
};

// Serialized: the cadence assertion is sensitive to scheduler load from
// sibling tests.
#[tokio::test]
#[serial]
async fn idle_connection_keeps_the_ping_cadence() -> Result<()> {
    let (listener, addr) = bind().await?;
    let cfg = config_with_timeout(&addr, Duration::from_secs(6));
    let (session, _events) = ClientSession::start(cfg)?;

    // Negotiated 1200 ms -> read timeout 800 ms -> a ping every 400 ms idle.
    let server = tokio::spawn(async move {
        let mut stream = accept(&listener).await?;
        serve_handshake(&mut stream, 1_200, 0x99, &server_password()).await?;

        let mut gaps = Vec::new();
        let mut last = Instant::now();
        for _ in 0..3 {
            let frame = read_frame(&mut stream).await?;
            let (header, _) = split_request(&frame)?;
            anyhow::ensure!(header.xid() == PING_XID, "expected a ping");
            anyhow::ensure!(header.op() == OpCode::Ping as i32, "expected a ping");
            gaps.push(last.elapsed());
            last = Instant::now();
            write_reply(&mut stream, PING_XID, 0, 0, &[]).await?;
        }
        anyhow::Ok((gaps, stream))
    });

    let (gaps, stream) = server.await??;

    // Idle gap between pings stays at or under half the read timeout, with
    // slack for scheduling.
    for gap in &gaps {
        assert!(
            *gap <= Duration::from_millis(700),
            "ping gap {gap:?} exceeds the cadence bound"
        );
    }

    shutdown(&session, stream).await;
    Ok(())
}

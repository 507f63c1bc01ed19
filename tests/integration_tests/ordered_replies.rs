// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use zk_client_rs::{
    client::client::ClientSession,
    models::{error::ZkError, opcode::OpCode},
};

use crate::integration_tests::common::{
    accept, bind, config_with_timeout, serve_handshake, server_password, shutdown,
    split_request, read_frame, write_reply,
};

#[tokio::test]
async fn pipelined_requests_complete_in_submission_order() -> Result<()> {
    let (listener, addr) = bind().await?;
    let cfg = config_with_timeout(&addr, Duration::from_secs(6));
    let (session, _events) = ClientSession::start(cfg)?;

    let server = tokio::spawn(async move {
        let mut stream = accept(&listener).await?;
        serve_handshake(&mut stream, 20_000, 0x1, &server_password()).await?;

        // Collect all three requests first, then reply in order.
        let mut seen = Vec::new();
        for _ in 0..3 {
            let frame = read_frame(&mut stream).await?;
            let (header, _body) = split_request(&frame)?;
            seen.push(header);
        }
        for (i, header) in seen.iter().enumerate() {
            let body = format!("payload-{i}");
            write_reply(&mut stream, header.xid(), 100 + i as i64, 0, body.as_bytes())
                .await?;
        }
        anyhow::Ok((seen, stream))
    });

    let h1 = session.submit(OpCode::GetData, Bytes::from_static(b"req-1"))?;
    let h2 = session.submit(OpCode::GetData, Bytes::from_static(b"req-2"))?;
    let h3 = session.submit(OpCode::GetData, Bytes::from_static(b"req-3"))?;

    let (seen, stream) = server.await??;

    // Application xids are positive and strictly increasing.
    assert_eq!(seen[0].xid(), 1);
    assert_eq!(seen[1].xid(), 2);
    assert_eq!(seen[2].xid(), 3);
    assert!(seen.iter().all(|h| h.op() == OpCode::GetData as i32));

    let deadline = Duration::from_secs(6);
    let r1 = h1.wait(deadline).await?;
    let r2 = h2.wait(deadline).await?;
    let r3 = h3.wait(deadline).await?;

    for (i, r) in [&r1, &r2, &r3].into_iter().enumerate() {
        assert_eq!(r.error(), ZkError::Ok);
        assert_eq!(r.header.xid(), (i + 1) as i32);
        assert_eq!(r.body.as_ref(), format!("payload-{i}").as_bytes());
    }

    // The greatest observed zxid sticks.
    assert_eq!(session.last_zxid(), 102);

    shutdown(&session, stream).await;
    Ok(())
}

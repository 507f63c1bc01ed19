// SPDX-License-Identifier: AGPL-3.0-or-later GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use bytes::Bytes;
use zerocopy::IntoBytes;
use zk_client_rs::models::{
    archive::{ReadArchive, WriteArchive},
    connect::{ConnectRequest, ConnectResponse, PASSWORD_LEN},
    headers::{
        AUTH_XID, NOTIFICATION_XID, PING_XID, REPLY_HEADER_LEN, ReplyHeader,
        RequestHeader, SET_WATCHES_XID,
    },
    opcode::OpCode,
    watch::{SetWatches, WatchSnapshot, WatcherEvent},
};

use crate::unit_tests::load_fixture;

#[test]
fn connect_request_matches_fixture() -> Result<()> {
    let expected =
        load_fixture("tests/unit_tests/fixtures/connect/connect_request.hex")?;

    // A brand new session: zero identity, 30 s requested timeout.
    let req = ConnectRequest {
        protocol_version: 0,
        last_zxid_seen: 0,
        timeout_ms: 30_000,
        session_id: 0,
        password: vec![0u8; PASSWORD_LEN],
    };
    let mut w = WriteArchive::new();
    req.write(&mut w);

    assert_eq!(w.into_bytes().as_ref(), expected.as_slice());
    Ok(())
}

#[test]
fn connect_response_parses_fixture() -> Result<()> {
    let raw = load_fixture("tests/unit_tests/fixtures/connect/connect_response.hex")?;

    let mut r = ReadArchive::new(Bytes::from(raw));
    let resp = ConnectResponse::read(&mut r)?;

    assert_eq!(resp.protocol_version, 0);
    assert_eq!(resp.negotiated_timeout_ms, 20_000);
    assert_eq!(resp.session_id, 0xABC);
    assert_eq!(resp.password.len(), PASSWORD_LEN);
    assert_eq!(resp.password[1], 0x01);
    assert_eq!(r.remaining(), 0);
    Ok(())
}

#[test]
fn connect_request_round_trips() -> Result<()> {
    let req = ConnectRequest {
        protocol_version: 0,
        last_zxid_seen: 0x1122334455,
        timeout_ms: 10_000,
        session_id: -0x7ead_beef,
        password: (0..PASSWORD_LEN as u8).collect(),
    };
    let mut w = WriteArchive::new();
    req.write(&mut w);

    let mut r = ReadArchive::new(w.into_bytes());
    assert_eq!(ConnectRequest::read(&mut r)?, req);
    Ok(())
}

#[test]
fn request_header_layout_is_big_endian() {
    let header = RequestHeader::new(0x0102_0304, OpCode::GetData as i32);
    assert_eq!(
        header.as_bytes(),
        [0x01, 0x02, 0x03, 0x04, 0x00, 0x00, 0x00, 0x04]
    );
}

#[test]
fn reply_header_parses_prefix_and_rejects_short_input() -> Result<()> {
    let mut raw = Vec::new();
    raw.extend_from_slice(&2i32.to_be_bytes());
    raw.extend_from_slice(&0x0abc_i64.to_be_bytes());
    raw.extend_from_slice(&(-101i32).to_be_bytes());
    raw.extend_from_slice(b"trailing response body");

    let header = ReplyHeader::parse(&raw)?;
    assert_eq!(header.xid(), 2);
    assert_eq!(header.zxid(), 0x0abc);
    assert_eq!(header.err(), -101);

    assert!(ReplyHeader::parse(&raw[..REPLY_HEADER_LEN - 1]).is_err());
    Ok(())
}

#[test]
fn reserved_xids() {
    assert_eq!(NOTIFICATION_XID, -1);
    assert_eq!(PING_XID, -2);
    assert_eq!(AUTH_XID, -4);
    assert_eq!(SET_WATCHES_XID, -8);
}

#[test]
fn watcher_event_round_trips() -> Result<()> {
    let ev = WatcherEvent {
        event_type: 3,
        state: 3,
        path: "/app/node".to_string(),
    };
    let mut w = WriteArchive::new();
    ev.write(&mut w);

    let mut r = ReadArchive::new(w.into_bytes());
    assert_eq!(WatcherEvent::read(&mut r)?, ev);
    Ok(())
}

#[test]
fn set_watches_carries_snapshot_lists() -> Result<()> {
    let snap = WatchSnapshot {
        data_watches: vec!["/a".into(), "/b".into()],
        exist_watches: vec![],
        child_watches: vec!["/c".into()],
    };
    let record = SetWatches::from_snapshot(77, snap);

    let mut w = WriteArchive::new();
    record.write(&mut w);
    let mut r = ReadArchive::new(w.into_bytes());
    let parsed = SetWatches::read(&mut r)?;

    assert_eq!(parsed.relative_zxid, 77);
    assert_eq!(parsed.data_watches, vec!["/a", "/b"]);
    assert!(parsed.exist_watches.is_empty());
    assert_eq!(parsed.child_watches, vec!["/c"]);
    Ok(())
}

#[test]
fn opcode_decoding() {
    assert_eq!(OpCode::from_i32(11), Some(OpCode::Ping));
    assert_eq!(OpCode::from_i32(-11), Some(OpCode::CloseSession));
    assert_eq!(OpCode::from_i32(102), Some(OpCode::Sasl));
    assert_eq!(OpCode::from_i32(4242), None);
    assert!(OpCode::Ping.is_internal());
    assert!(!OpCode::GetData.is_internal());
}

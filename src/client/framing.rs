// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Length-prefixed framing: a 4-byte big-endian signed length followed by
//! exactly that many payload bytes. Declared lengths outside
//! `[0, max_frame)` abort the connection.

use anyhow::{Result, bail};
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const FRAME_PREFIX_LEN: usize = 4;

/// Reads one complete frame payload, however many socket reads it takes.
pub async fn read_frame<R>(r: &mut R, max_frame: usize) -> Result<Bytes>
where R: AsyncRead + Unpin {
    let mut prefix = [0u8; FRAME_PREFIX_LEN];
    r.read_exact(&mut prefix).await?;

    let declared = i32::from_be_bytes(prefix);
    if declared < 0 || declared as usize >= max_frame {
        bail!("declared frame length {declared} outside [0, {max_frame})");
    }

    let mut payload = BytesMut::zeroed(declared as usize);
    r.read_exact(&mut payload).await?;
    Ok(payload.freeze())
}

/// Prefixes the payload with its length and writes both in one call.
pub async fn write_frame<W>(w: &mut W, payload: &[u8]) -> Result<()>
where W: AsyncWrite + Unpin {
    w.write_all(&frame(payload)).await?;
    Ok(())
}

/// Builds the wire form of a payload: length prefix plus body, contiguous.
pub fn frame(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(FRAME_PREFIX_LEN + payload.len());
    buf.put_i32(payload.len() as i32);
    buf.put_slice(payload);
    buf.freeze()
}

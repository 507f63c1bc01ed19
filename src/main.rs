// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result};
use tracing::info;
use zk_client_rs::{
    cfg::{config::Config, logger::init_logger},
    client::client::ClientSession,
    models::watch::KeeperState,
};

#[tokio::main]
async fn main() -> Result<()> {
    let _logger_guard = init_logger("config_logger.yaml")?;

    let cfg = Config::load_from_file("config.yaml").context("failed to load config")?;

    let (session, mut events) = ClientSession::start(cfg)?;

    // Wait until the driver reports a live session.
    while let Some(ev) = events.recv().await {
        info!(event = ?ev, "dispatcher event");
        match ev.keeper_state {
            KeeperState::SyncConnected => break,
            KeeperState::Expired | KeeperState::AuthFailed => {
                anyhow::bail!("session failed to establish: {:?}", ev.keeper_state)
            },
            _ => {},
        }
    }

    info!(
        session_id = format_args!("{:#018x}", session.session_id()),
        negotiated_timeout_ms = session.negotiated_timeout().as_millis() as u64,
        "session is up"
    );

    session.dispose().await?;
    Ok(())
}

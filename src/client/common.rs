// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use anyhow::{Result, anyhow};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Locks a mutex, recovering the guard from a poisoned lock. The engine's
/// critical sections only move plain data, so a panic mid-section cannot
/// leave the value torn.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Bounds an IO future by a deadline and a cancellation token. The label ends
/// up in the error so a failed step can be told apart in the logs.
pub(crate) async fn io_with_timeout<F, T, E>(
    label: &'static str,
    fut: F,
    io_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<T>
where
    F: Future<Output = Result<T, E>>,
    E: Into<anyhow::Error>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(anyhow!("{label} cancelled")),
        res = timeout(io_timeout, fut) => {
            match res {
                Ok(Ok(v)) => Ok(v),
                Ok(Err(e)) => Err(e.into()).map_err(|e: anyhow::Error| e.context(label)),
                Err(_) => Err(anyhow!("{label} timed out after {io_timeout:?}")),
            }
        }
    }
}

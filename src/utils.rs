// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Result, bail};

/// Validates a chroot-style path: absolute, no empty or `.`/`..` segments,
/// no trailing slash except for the root itself.
pub fn validate_path(path: &str) -> Result<()> {
    if path.is_empty() {
        bail!("path must not be empty");
    }
    if !path.starts_with('/') {
        bail!("path '{path}' must start with '/'");
    }
    if path == "/" {
        return Ok(());
    }
    if path.ends_with('/') {
        bail!("path '{path}' must not end with '/'");
    }
    for seg in path[1..].split('/') {
        match seg {
            "" => bail!("path '{path}' contains an empty segment"),
            "." | ".." => bail!("path '{path}' contains a relative segment"),
            _ => {},
        }
    }
    Ok(())
}

/// Strips the chroot prefix from a server-side path before an event is
/// handed to the dispatcher. A path equal to the chroot becomes `/`; a path
/// outside the chroot is passed through untouched.
pub fn strip_chroot(server_path: &str, chroot: Option<&str>) -> String {
    let Some(root) = chroot else {
        return server_path.to_string();
    };
    if server_path == root {
        return "/".to_string();
    }
    match server_path.strip_prefix(root) {
        Some(rest) if rest.starts_with('/') => rest.to_string(),
        _ => server_path.to_string(),
    }
}

/// Prepends the chroot to a client-side path, the inverse of
/// [`strip_chroot`].
pub fn prepend_chroot(client_path: &str, chroot: Option<&str>) -> String {
    match chroot {
        None => client_path.to_string(),
        Some(root) if client_path == "/" => root.to_string(),
        Some(root) => format!("{root}{client_path}"),
    }
}

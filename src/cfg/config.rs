// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fmt, fs, path::Path, time::Duration};

use anyhow::{Context, Result, bail, ensure};
use serde::{Deserialize, Serialize};

use crate::utils::validate_path;

/// Port used when a host in the connect string carries none.
pub const DEFAULT_PORT: u16 = 2181;

fn default_connect_timeout() -> Duration {
    Duration::from_millis(500)
}

fn default_max_packet_length() -> usize {
    4 * 1024 * 1024
}

fn default_max_spin() -> u32 {
    30
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Which ensemble to talk to and under which root.
    pub ensemble: EnsembleConfig,
    /// Session liveness, framing and teardown knobs.
    pub session: SessionConfig,
}

/// Ensemble addressing as it appears in the config file.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct EnsembleConfig {
    #[serde(rename = "ConnectString")]
    /// `host[:port](,host[:port])*[/chroot]` (mandatory).
    pub connect_string: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
/// Runtime parameters of a single session.
pub struct SessionConfig {
    #[serde(rename = "SessionTimeout", with = "serde_millis")]
    /// Requested session timeout; the server may negotiate it down.
    pub session_timeout: Duration,

    #[serde(
        rename = "ConnectTimeout",
        with = "serde_millis",
        default = "default_connect_timeout"
    )]
    /// Bound on a single TCP connect attempt and on each handshake I/O step.
    pub connect_timeout: Duration,

    #[serde(rename = "MaxPacketLength", default = "default_max_packet_length")]
    /// Upper bound on a declared frame length; larger frames abort the
    /// connection.
    pub max_packet_length: usize,

    #[serde(rename = "MaxSpin", default = "default_max_spin")]
    /// Number of poll slices the disposer waits for the peer to close.
    pub max_spin: u32,

    #[serde(rename = "DisableAutoWatchReset", default)]
    /// Skip the SetWatches replay after a reconnect.
    pub disable_auto_watch_reset: bool,
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Minimal in-process construction; other knobs keep their defaults.
    pub fn new(connect_string: impl Into<String>, session_timeout: Duration) -> Self {
        Self {
            ensemble: EnsembleConfig {
                connect_string: connect_string.into(),
            },
            session: SessionConfig {
                session_timeout,
                connect_timeout: default_connect_timeout(),
                max_packet_length: default_max_packet_length(),
                max_spin: default_max_spin(),
                disable_auto_watch_reset: false,
            },
        }
    }

    /// Validates invariants without touching the network.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.session.session_timeout.is_zero(),
            "SessionTimeout must be > 0"
        );
        ensure!(
            !self.session.connect_timeout.is_zero(),
            "ConnectTimeout must be > 0"
        );
        ensure!(
            self.session.max_packet_length > 0,
            "MaxPacketLength must be > 0"
        );
        ensure!(self.session.max_spin > 0, "MaxSpin must be > 0");
        // Fail configuration errors eagerly rather than on first connect.
        ConnectString::parse(&self.ensemble.connect_string)?;
        Ok(())
    }
}

/// One resolved `host:port` pair from the connect string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPort {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Parsed form of `host[:port](,host[:port])*[/chroot]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectString {
    pub endpoints: Vec<HostPort>,
    pub chroot: Option<String>,
}

impl ConnectString {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            bail!("connect string must not be empty");
        }

        let (hosts, chroot) = match s.find('/') {
            Some(idx) => {
                let root = &s[idx..];
                validate_path(root)
                    .with_context(|| format!("invalid chroot in connect string '{s}'"))?;
                let chroot = (root != "/").then(|| root.to_string());
                (&s[..idx], chroot)
            },
            None => (s, None),
        };

        let mut endpoints = Vec::new();
        for part in hosts.split(',') {
            let part = part.trim();
            if part.is_empty() {
                bail!("connect string '{s}' contains an empty host entry");
            }
            let (host, port) = match part.split_once(':') {
                Some((h, p)) => {
                    let port: u16 = p
                        .parse()
                        .with_context(|| format!("invalid port '{p}' in connect string"))?;
                    (h, port)
                },
                None => (part, DEFAULT_PORT),
            };
            if host.is_empty() {
                bail!("connect string '{s}' contains an empty host");
            }
            endpoints.push(HostPort {
                host: host.to_string(),
                port,
            });
        }

        Ok(Self { endpoints, chroot })
    }
}

/// Serde helpers for representing `Duration` as a number of milliseconds.
mod serde_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

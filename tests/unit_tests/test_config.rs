// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::Result;
use zk_client_rs::cfg::config::{Config, ConnectString, DEFAULT_PORT};

#[test]
fn single_host_with_default_port() -> Result<()> {
    let cs = ConnectString::parse("10.0.0.1")?;
    assert_eq!(cs.endpoints.len(), 1);
    assert_eq!(cs.endpoints[0].host, "10.0.0.1");
    assert_eq!(cs.endpoints[0].port, DEFAULT_PORT);
    assert_eq!(cs.chroot, None);
    Ok(())
}

#[test]
fn host_list_with_ports_and_chroot() -> Result<()> {
    let cs = ConnectString::parse("h1:2181,h2:2182,h3/app/v1")?;
    assert_eq!(cs.endpoints.len(), 3);
    assert_eq!(cs.endpoints[1].to_string(), "h2:2182");
    assert_eq!(cs.endpoints[2].port, DEFAULT_PORT);
    assert_eq!(cs.chroot.as_deref(), Some("/app/v1"));
    Ok(())
}

#[test]
fn root_chroot_means_no_chroot() -> Result<()> {
    let cs = ConnectString::parse("h:2181/")?;
    assert_eq!(cs.chroot, None);
    Ok(())
}

#[test]
fn invalid_connect_strings_are_rejected() {
    assert!(ConnectString::parse("").is_err());
    assert!(ConnectString::parse("h:notaport").is_err());
    assert!(ConnectString::parse("h1,,h2").is_err());
    assert!(ConnectString::parse(":2181").is_err());
    assert!(ConnectString::parse("h:2181/app/").is_err());
    assert!(ConnectString::parse("h:2181/app//x").is_err());
    assert!(ConnectString::parse("h:2181/../x").is_err());
}

#[test]
fn yaml_defaults_apply() -> Result<()> {
    let yaml = r#"
ensemble:
  ConnectString: "zk1:2181,zk2:2181/app"
session:
  SessionTimeout: 30000
"#;
    let cfg: Config = serde_yaml::from_str(yaml)?;
    cfg.validate()?;

    assert_eq!(cfg.session.session_timeout, Duration::from_millis(30_000));
    assert_eq!(cfg.session.connect_timeout, Duration::from_millis(500));
    assert_eq!(cfg.session.max_packet_length, 4 * 1024 * 1024);
    assert_eq!(cfg.session.max_spin, 30);
    assert!(!cfg.session.disable_auto_watch_reset);
    Ok(())
}

#[test]
fn zero_session_timeout_fails_validation() {
    let cfg = Config::new("h:2181", Duration::ZERO);
    assert!(cfg.validate().is_err());
}

#[test]
fn bad_chroot_fails_validation() {
    let cfg = Config::new("h:2181/app/", Duration::from_secs(30));
    assert!(cfg.validate().is_err());
}

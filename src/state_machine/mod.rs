// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Generic state machine plumbing shared by the handshake driver.
pub mod common;
/// The connect-request/SASL/connect-response handshake sequence.
pub mod handshake;
/// SASL client seam and the inline challenge/response loop.
pub mod sasl;
/// Session lifecycle states and their permitted transitions.
pub mod session;

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// The session engine: loops, handshake entry points, submission surface.
pub mod client;
/// Small IO helpers shared by the loops and the handshake driver.
pub mod common;
/// Resolved server list with failure tracking and round-robin selection.
pub mod endpoints;
/// Length-prefixed frame reader/writer.
pub mod framing;
/// Unit of work travelling through the queues, plus its completion signal.
pub mod packet;
/// Outgoing and pending queues with their ordering discipline.
pub mod queue;

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The session engine.
//!
//! One [`ClientSession`] owns one coordination session for its whole life:
//! it drives the connection state machine, runs the handshake on every new
//! TCP connection, moves packets from the outgoing queue onto the wire and
//! matches replies against the pending queue. The socket is written by
//! exactly one task (the driver, which doubles as the sender loop) and read
//! by exactly one task (the per-connection receiver); the queues follow the
//! same single-producer/single-consumer discipline.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicI32, AtomicI64, AtomicU64, Ordering},
    },
    time::Duration,
};

use anyhow::{Context, Result, anyhow, bail, ensure};
use bytes::Bytes;
use rand::RngExt;
use tokio::{
    net::{TcpStream, tcp::{OwnedReadHalf, OwnedWriteHalf}},
    io::AsyncWriteExt,
    sync::{Mutex as AsyncMutex, Notify, mpsc},
    task::JoinHandle,
    time::{Instant, sleep, timeout},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{
    cfg::config::{Config, ConnectString},
    client::{
        common::{io_with_timeout, lock},
        endpoints::EndpointSet,
        framing::read_frame,
        packet::{Packet, PacketHandle},
        queue::{PendingQueue, TransmitQueue},
    },
    models::{
        archive::{ReadArchive, WriteArchive},
        auth::{AuthData, AuthPacket},
        connect::{ConnectRequest, ConnectResponse, PASSWORD_LEN},
        error::ZkError,
        headers::{
            AUTH_XID, NOTIFICATION_XID, PING_XID, REPLY_HEADER_LEN, ReplyHeader,
            RequestHeader, SET_WATCHES_XID,
        },
        opcode::OpCode,
        watch::{
            EventType, KeeperState, SetWatches, WatchManager, WatchRegistration,
            WatchedEvent, WatcherEvent,
        },
    },
    state_machine::{
        common::StateMachineCtx,
        handshake::HandshakeCtx,
        sasl::SaslClient,
        session::SessionState,
    },
    utils::{prepend_chroot, strip_chroot},
};

/// A single long-lived coordination session multiplexed over one server
/// connection at a time.
pub struct ClientSession {
    cfg: Config,
    chroot: Option<String>,

    state: Mutex<SessionState>,
    endpoints: Mutex<EndpointSet>,

    outgoing: TransmitQueue,
    pending: PendingQueue,
    /// Nudges the sender out of its bounded nap.
    wakeup: Notify,

    xid_gen: AtomicI32,
    session_id: AtomicI64,
    password: Mutex<Vec<u8>>,
    last_zxid: AtomicI64,
    negotiated_timeout_ms: AtomicI32,
    read_timeout_ms: AtomicU64,
    closing: AtomicBool,

    auth_data: Mutex<Vec<AuthData>>,
    has_sasl: bool,
    sasl: AsyncMutex<Option<Box<dyn SaslClient>>>,
    watches: Option<Arc<dyn WatchManager>>,
    events: mpsc::UnboundedSender<WatchedEvent>,

    cancel: CancellationToken,
    driver: Mutex<Option<JoinHandle<()>>>,

    last_send: Mutex<Instant>,
    ping_sent_at: Mutex<Option<Instant>>,
}

impl ClientSession {
    /// Starts a session with no SASL client and no watch manager.
    pub fn start(
        cfg: Config,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<WatchedEvent>)> {
        Self::start_with(cfg, None, None)
    }

    /// Starts the session driver. Returns immediately; connection and
    /// handshake happen in the background, and submissions made before the
    /// session is up simply wait in the outgoing queue.
    ///
    /// The returned receiver is the event dispatcher feed: session state
    /// changes and watch notifications, in delivery order.
    pub fn start_with(
        cfg: Config,
        sasl: Option<Box<dyn SaslClient>>,
        watches: Option<Arc<dyn WatchManager>>,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<WatchedEvent>)> {
        cfg.validate()?;
        let cs = ConnectString::parse(&cfg.ensemble.connect_string)?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let read_timeout_ms = cfg.session.session_timeout.as_millis() as u64 * 2 / 3;
        let me = Arc::new(Self {
            chroot: cs.chroot.clone(),
            endpoints: Mutex::new(EndpointSet::new(&cs)),
            state: Mutex::new(SessionState::NotConnected),
            outgoing: TransmitQueue::default(),
            pending: PendingQueue::default(),
            wakeup: Notify::new(),
            xid_gen: AtomicI32::new(1),
            session_id: AtomicI64::new(0),
            password: Mutex::new(vec![0u8; PASSWORD_LEN]),
            last_zxid: AtomicI64::new(0),
            negotiated_timeout_ms: AtomicI32::new(
                cfg.session.session_timeout.as_millis() as i32,
            ),
            read_timeout_ms: AtomicU64::new(read_timeout_ms),
            closing: AtomicBool::new(false),
            auth_data: Mutex::new(Vec::new()),
            has_sasl: sasl.is_some(),
            sasl: AsyncMutex::new(sasl),
            watches,
            events: events_tx,
            cancel: CancellationToken::new(),
            driver: Mutex::new(None),
            last_send: Mutex::new(Instant::now()),
            ping_sent_at: Mutex::new(None),
            cfg,
        });

        let handle = tokio::spawn(Arc::clone(&me).run());
        *lock(&me.driver) = Some(handle);
        Ok((me, events_rx))
    }

    // ------------------------------------------------------------------
    // Submission surface

    /// Queues a request for transmission and returns the completion handle.
    pub fn submit(&self, op: OpCode, body: Bytes) -> Result<PacketHandle> {
        self.submit_with(op, body, None, None)
    }

    /// Like [`submit`](Self::submit), with the client path and watch
    /// registration tag the API layer wants echoed back on completion.
    pub fn submit_with(
        &self,
        op: OpCode,
        body: Bytes,
        client_path: Option<String>,
        watch: Option<WatchRegistration>,
    ) -> Result<PacketHandle> {
        ensure!(
            !op.is_internal() && op != OpCode::CloseSession,
            "opcode {op:?} is reserved for the engine"
        );

        let st = self.state();
        if self.closing.load(Ordering::Acquire) || st == SessionState::Closed {
            return Err(anyhow!(ZkError::SessionExpired)).context("session is closing");
        }
        if st == SessionState::AuthFailed {
            return Err(anyhow!(ZkError::AuthFailed))
                .context("session failed authentication");
        }

        let client_path = client_path.unwrap_or_default();
        let server_path = if client_path.is_empty() {
            String::new()
        } else {
            prepend_chroot(&client_path, self.chroot.as_deref())
        };

        let header = RequestHeader::new(self.next_xid(), op as i32);
        let (pkt, handle) = Packet::new(header, &body, watch, client_path, server_path);
        trace!(xid = pkt.xid(), op = ?op, "packet submitted");
        self.outgoing.push_back(pkt);
        self.wakeup.notify_one();

        // The driver may have torn down between the state check and the
        // enqueue; its final drain could then miss this packet.
        if !self.state().is_alive() {
            self.drain_with(self.terminal_error());
        }
        Ok(handle)
    }

    /// Stores a credential for replay on every reconnect; if the session is
    /// currently connected the auth packet also goes out right away.
    pub fn add_auth_info(&self, scheme: impl Into<String>, auth: impl Into<Bytes>) {
        let data = AuthData {
            scheme: scheme.into(),
            auth: auth.into(),
        };
        lock(&self.auth_data).push(data.clone());

        if self.state().is_connected() {
            self.outgoing.push_back(auth_packet(&data));
            self.wakeup.notify_one();
        }
    }

    /// Closes the session: flushes a CloseSession packet, waits for the peer
    /// to drop the connection (bounded by the session timeout, polled in
    /// `max_spin` slices), then force-closes and joins the driver.
    pub async fn dispose(self: &Arc<Self>) -> Result<()> {
        let mut timed_out = false;

        if !self.closing.swap(true, Ordering::AcqRel) {
            if self.state().is_connected() {
                let header =
                    RequestHeader::new(self.next_xid(), OpCode::CloseSession as i32);
                self.outgoing.push_back(Packet::internal(header, &[]));
                self.wakeup.notify_one();
                debug!("close-session queued");

                let spin =
                    self.cfg.session.session_timeout / self.cfg.session.max_spin;
                for _ in 0..self.cfg.session.max_spin {
                    if !self.state().is_alive() {
                        break;
                    }
                    sleep(spin).await;
                }
                timed_out = self.state().is_alive();
                if timed_out {
                    warn!("peer did not close the session in time; force-closing");
                }
            }
            self.cancel.cancel();
            self.wakeup.notify_one();
        }

        let handle = lock(&self.driver).take();
        if let Some(h) = handle {
            let _ = h.await;
        }

        self.set_state(SessionState::Closed);
        self.drain_with(self.terminal_error());

        if timed_out {
            bail!("dispose timed out waiting for the server to close the session");
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Introspection

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    pub fn session_id(&self) -> i64 {
        self.session_id.load(Ordering::Acquire)
    }

    pub fn session_password(&self) -> Vec<u8> {
        lock(&self.password).clone()
    }

    pub fn last_zxid(&self) -> i64 {
        self.last_zxid.load(Ordering::Acquire)
    }

    pub fn negotiated_timeout(&self) -> Duration {
        Duration::from_millis(
            self.negotiated_timeout_ms.load(Ordering::Acquire).max(0) as u64,
        )
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    // ------------------------------------------------------------------
    // Handshake support

    pub(crate) fn connect_request(&self) -> ConnectRequest {
        ConnectRequest {
            protocol_version: 0,
            last_zxid_seen: self.last_zxid(),
            timeout_ms: self.cfg.session.session_timeout.as_millis() as i32,
            session_id: self.session_id(),
            password: lock(&self.password).clone(),
        }
    }

    pub(crate) fn has_sasl(&self) -> bool {
        self.has_sasl
    }

    pub(crate) fn sasl_slot(&self) -> &AsyncMutex<Option<Box<dyn SaslClient>>> {
        &self.sasl
    }

    pub(crate) fn next_xid(&self) -> i32 {
        self.xid_gen.fetch_add(1, Ordering::AcqRel)
    }

    // ------------------------------------------------------------------
    // Driver: reconnect controller + sender loop

    async fn run(self: Arc<Self>) {
        let mut first_attempt = true;

        loop {
            if self.cancel.is_cancelled() || !self.state().is_alive() {
                break;
            }

            let Some((idx, mut stream)) = self.connect_next(&mut first_attempt).await
            else {
                continue;
            };

            if !self.set_state(SessionState::Associating) {
                break;
            }
            let hs_cancel = self.cancel.child_token();
            let resp = HandshakeCtx::new(&self, &mut stream, hs_cancel.clone())
                .execute(&hs_cancel)
                .await;

            let resp = match resp {
                Ok(resp) => resp,
                Err(e) => {
                    match root_zk_error(&e) {
                        Some(ZkError::SessionExpired) => {
                            warn!("session expired during handshake");
                            self.set_state(SessionState::Closed);
                            self.emit_state(KeeperState::Expired);
                            break;
                        },
                        Some(ZkError::AuthFailed) => {
                            warn!("authentication failed during handshake");
                            self.set_state(SessionState::AuthFailed);
                            self.emit_state(KeeperState::AuthFailed);
                            break;
                        },
                        _ => {},
                    }
                    warn!("handshake failed: {e:#}");
                    lock(&self.endpoints).mark_failure(idx);
                    self.set_state(SessionState::NotConnected);
                    continue;
                },
            };

            self.establish(idx, resp);

            let (reader, writer) = stream.into_split();
            let generation = self.cancel.child_token();
            let receiver =
                tokio::spawn(Arc::clone(&self).recv_loop(reader, generation.clone()));

            if let Err(e) = self.send_loop(writer, &generation).await {
                debug!("connection ended: {e:#}");
            }
            generation.cancel();
            let _ = receiver.await;

            if self.closing.load(Ordering::Acquire) {
                self.set_state(SessionState::Closed);
                break;
            }

            self.set_state(SessionState::NotConnected);
            self.drain_with(ZkError::ConnectionLoss);
            self.emit_state(KeeperState::Disconnected);
        }

        // Terminal teardown: whatever is still queued dies with the session.
        let err = self.terminal_error();
        self.set_state(SessionState::Closed);
        self.drain_with(err);
        debug!("session driver exited");
    }

    fn terminal_error(&self) -> ZkError {
        if self.state() == SessionState::AuthFailed {
            ZkError::AuthFailed
        } else {
            ZkError::SessionExpired
        }
    }

    /// One reconnect-controller step: jitter, sweep backoff, cursor advance,
    /// bounded TCP connect.
    async fn connect_next(
        &self,
        first_attempt: &mut bool,
    ) -> Option<(usize, TcpStream)> {
        if !*first_attempt {
            // Desynchronize clients reconnecting to the same ensemble.
            let jitter = Duration::from_millis(rand::rng().random_range(0..50));
            sleep(jitter).await;
        }
        *first_attempt = false;

        let exhausted = !lock(&self.endpoints).is_next_available();
        if exhausted {
            debug!("endpoint sweep exhausted; backing off");
            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                _ = sleep(Duration::from_secs(1)) => {},
            }
        }

        let (idx, addr) = lock(&self.endpoints).next_candidate();
        if !self.set_state(SessionState::Connecting) {
            return None;
        }
        info!(addr = %addr, "connecting");

        let attempt = timeout(
            self.cfg.session.connect_timeout,
            TcpStream::connect((addr.host.as_str(), addr.port)),
        )
        .await;

        match attempt {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    warn!(addr = %addr, "failed to set TCP_NODELAY: {e}");
                }
                Some((idx, stream))
            },
            Ok(Err(e)) => {
                warn!(addr = %addr, "connect failed: {e}");
                self.note_connect_failure(idx);
                None
            },
            Err(_) => {
                warn!(addr = %addr, "connect timed out");
                self.note_connect_failure(idx);
                None
            },
        }
    }

    fn note_connect_failure(&self, idx: usize) {
        lock(&self.endpoints).mark_failure(idx);
        self.set_state(SessionState::NotConnected);
    }

    /// Steps 4–6 of the handshake: store the negotiated identity, queue the
    /// priority replay, go Connected.
    fn establish(&self, idx: usize, resp: ConnectResponse) {
        self.session_id.store(resp.session_id, Ordering::Release);
        *lock(&self.password) = resp.password.clone();
        self.negotiated_timeout_ms
            .store(resp.negotiated_timeout_ms, Ordering::Release);
        self.read_timeout_ms
            .store(resp.negotiated_timeout_ms as u64 * 2 / 3, Ordering::Release);

        // Replay order on the wire: SetWatches, then stored auth, then the
        // first application packet.
        let mut replay: Vec<Packet> = Vec::new();
        if !self.cfg.session.disable_auto_watch_reset {
            if let Some(mgr) = &self.watches {
                let snap = mgr.snapshot();
                if !snap.is_empty() {
                    let record = SetWatches::from_snapshot(self.last_zxid(), snap);
                    let mut w = WriteArchive::new();
                    record.write(&mut w);
                    let body = w.into_bytes();
                    replay.push(Packet::internal(
                        RequestHeader::new(SET_WATCHES_XID, OpCode::SetWatches as i32),
                        &body,
                    ));
                }
            }
        }
        for data in lock(&self.auth_data).iter() {
            replay.push(auth_packet(data));
        }
        if !replay.is_empty() {
            debug!(count = replay.len(), "queueing handshake replay");
            self.outgoing.push_replay(replay);
        }

        lock(&self.endpoints).mark_success(idx);
        *lock(&self.last_send) = Instant::now();
        *lock(&self.ping_sent_at) = None;

        self.set_state(SessionState::Connected);
        info!(
            session_id = format_args!("{:#018x}", resp.session_id),
            negotiated_timeout_ms = resp.negotiated_timeout_ms,
            "session established"
        );
        self.emit_state(KeeperState::SyncConnected);
    }

    /// Drains the outgoing queue onto the socket and keeps the ping cadence.
    /// Returns only on connection death.
    async fn send_loop(
        &self,
        mut writer: OwnedWriteHalf,
        generation: &CancellationToken,
    ) -> Result<()> {
        loop {
            if generation.is_cancelled() {
                bail!("connection torn down");
            }

            if self.state().is_connected() {
                let idle = lock(&self.last_send).elapsed();
                if idle >= self.ping_interval() {
                    let ping = Packet::internal(
                        RequestHeader::new(PING_XID, OpCode::Ping as i32),
                        &[],
                    );
                    self.transmit(&mut writer, ping, generation).await?;
                    continue;
                }
            }

            match self.outgoing.pop_front() {
                Some(pkt) => self.transmit(&mut writer, pkt, generation).await?,
                None => {
                    // Short bounded nap so the ping deadline is checked
                    // promptly even without submissions.
                    let _ =
                        timeout(Duration::from_millis(1), self.wakeup.notified()).await;
                },
            }
        }
    }

    /// Moves one packet onto the wire. Tracked packets enter pending before
    /// the write so a fast reply can never race past them.
    async fn transmit(
        &self,
        writer: &mut OwnedWriteHalf,
        pkt: Packet,
        generation: &CancellationToken,
    ) -> Result<()> {
        let xid = pkt.xid();
        let bytes = pkt.wire_bytes().clone();

        if xid == PING_XID {
            *lock(&self.ping_sent_at) = Some(Instant::now());
            trace!("ping");
        } else if xid != AUTH_XID {
            self.pending.push_back(pkt);
        }

        io_with_timeout(
            "write packet",
            writer.write_all(&bytes),
            self.cfg.session.connect_timeout,
            generation,
        )
        .await?;

        *lock(&self.last_send) = Instant::now();
        trace!(xid, "packet sent");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Receiver loop

    async fn recv_loop(
        self: Arc<Self>,
        mut reader: OwnedReadHalf,
        generation: CancellationToken,
    ) {
        loop {
            let frame = match io_with_timeout(
                "read frame",
                read_frame(&mut reader, self.cfg.session.max_packet_length),
                self.read_timeout(),
                &generation,
            )
            .await
            {
                Ok(frame) => frame,
                Err(e) => {
                    if !generation.is_cancelled() {
                        debug!("receive loop ended: {e:#}");
                    }
                    break;
                },
            };

            if let Err(e) = self.handle_frame(frame) {
                warn!("broken reply stream: {e:#}");
                break;
            }
        }
        generation.cancel();
        self.wakeup.notify_one();
    }

    /// Routes one reply frame: reserved xids first, then the pending match.
    fn handle_frame(&self, frame: Bytes) -> Result<()> {
        let header = ReplyHeader::parse(&frame)?;
        let body = frame.slice(REPLY_HEADER_LEN..);

        let zxid = header.zxid();
        if zxid > 0 {
            self.last_zxid.fetch_max(zxid, Ordering::AcqRel);
        }

        match header.xid() {
            PING_XID => {
                if let Some(sent) = lock(&self.ping_sent_at).take() {
                    trace!(rtt_ms = sent.elapsed().as_millis() as u64, "ping reply");
                }
                Ok(())
            },
            AUTH_XID => {
                if header.err() != 0 {
                    warn!(err = header.err(), "auth request rejected by server");
                }
                Ok(())
            },
            NOTIFICATION_XID => self.dispatch_notification(body),
            xid => {
                let Some(mut pkt) = self.pending.pop_front() else {
                    bail!("reply xid {xid} with no packet pending");
                };
                if pkt.xid() != xid {
                    let expected = pkt.xid();
                    pkt.finish_err(ZkError::ConnectionLoss);
                    bail!("reply xid {xid} does not match pending head xid {expected}");
                }

                pkt.reply_header = header;
                if header.err() == 0 && !body.is_empty() {
                    pkt.response = Some(body);
                }
                pkt.finish();
                Ok(())
            },
        }
    }

    fn dispatch_notification(&self, body: Bytes) -> Result<()> {
        let mut r = ReadArchive::new(body);
        let ev = WatcherEvent::read(&mut r).context("malformed watcher event")?;

        let Some(event_type) = EventType::from_i32(ev.event_type) else {
            warn!(event_type = ev.event_type, "unknown watch event type");
            return Ok(());
        };
        let Some(keeper_state) = KeeperState::from_i32(ev.state) else {
            warn!(state = ev.state, "unknown keeper state in notification");
            return Ok(());
        };

        let path = strip_chroot(&ev.path, self.chroot.as_deref());
        debug!(event = ?event_type, path = %path, "watch notification");
        self.emit(WatchedEvent {
            event_type,
            keeper_state,
            path,
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Shared plumbing

    /// Applies a state transition if the table permits it; every transition
    /// wakes the sender so a teardown is noticed immediately.
    fn set_state(&self, to: SessionState) -> bool {
        {
            let mut st = lock(&self.state);
            if !st.can_transition(to) {
                return false;
            }
            debug!(from = %*st, to = %to, "session state");
            *st = to;
        }
        self.wakeup.notify_one();
        true
    }

    /// Completes every queued packet with the given error: transmitted
    /// packets first (they were submitted earlier), then untransmitted ones.
    fn drain_with(&self, err: ZkError) {
        let mut drained = 0usize;
        for pkt in self.pending.drain_all() {
            pkt.finish_err(err);
            drained += 1;
        }
        for pkt in self.outgoing.drain_all() {
            pkt.finish_err(err);
            drained += 1;
        }
        if drained > 0 {
            debug!(count = drained, error = %err, "drained queues");
        }
    }

    fn emit_state(&self, state: KeeperState) {
        self.emit(WatchedEvent::state_event(state));
    }

    fn emit(&self, ev: WatchedEvent) {
        // The dispatcher may already be gone during teardown.
        let _ = self.events.send(ev);
    }

    fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.load(Ordering::Acquire))
    }

    fn ping_interval(&self) -> Duration {
        self.read_timeout() / 2
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        // Guaranteed teardown even without an explicit dispose.
        self.cancel.cancel();
    }
}

fn auth_packet(data: &AuthData) -> Packet {
    let record = AuthPacket::from_data(data);
    let mut w = WriteArchive::new();
    record.write(&mut w);
    let body = w.into_bytes();
    Packet::internal(RequestHeader::new(AUTH_XID, OpCode::Auth as i32), &body)
}

/// Walks an error chain looking for a session-fatal code.
fn root_zk_error(e: &anyhow::Error) -> Option<ZkError> {
    e.chain()
        .find_map(|cause| cause.downcast_ref::<ZkError>())
        .copied()
}

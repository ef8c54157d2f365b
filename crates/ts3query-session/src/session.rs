use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, info, warn};
use ts3query_codec::{is_blank, is_outcome_line, trim_delimiter};
use ts3query_transport::{Carrier, Transport, TransportError};

use crate::builder::QueryBuilder;
use crate::control::{StopSignal, EVENT_PREFIX, KEEPALIVE_LINE, QUIT_COMMAND};
use crate::error::{QueryError, Result};
use crate::response::{Event, Response};

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Default bound for [`Session::execute`]. `None` waits indefinitely.
    pub command_timeout: Option<Duration>,
    /// Longest single read; bounds how quickly stop requests and keepalives
    /// are noticed.
    pub poll_interval: Duration,
    /// Idle time after which [`Session::run_events`] sends a keepalive.
    pub keepalive_interval: Duration,
    /// Unclaimed events kept before the oldest are dropped.
    pub max_queued_events: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_timeout: Some(Duration::from_secs(10)),
            poll_interval: Duration::from_millis(250),
            keepalive_interval: Duration::from_secs(5 * 60),
            max_queued_events: 4096,
        }
    }
}

/// Lifecycle of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    /// Terminal.
    Closed,
}

/// A query connection: one transport, a FIFO of pending commands and a
/// queue of events.
///
/// Every inbound line is classified by whichever caller happens to read it:
/// - an outcome line closes the response of the oldest pending command
/// - any other line belongs to that response's body while a command is
///   pending, and is an [`Event`] otherwise
///
/// All methods take `&self`; one thread may wait for events while another
/// executes commands. Commands themselves are serialized, and a command
/// queued behind another still honours its own timeout.
pub struct Session {
    inner: Mutex<Inner>,
    wakeup: Condvar,
    config: SessionConfig,
    carrier: Carrier,
    peer_host: Option<String>,
}

struct Inner {
    /// `None` while a reader has it checked out, and after close.
    transport: Option<Box<dyn Transport>>,
    reading: bool,
    writers_waiting: usize,
    /// A command is between its write and its response.
    command_active: bool,
    state: SessionState,
    next_seq: u64,
    pending: VecDeque<u64>,
    abandoned: HashSet<u64>,
    body: Vec<Bytes>,
    ready: HashMap<u64, Response>,
    events: VecDeque<Event>,
    max_events: usize,
    last_write: Instant,
    anomalies: u64,
}

impl Session {
    /// Take ownership of a connected transport whose greeting is already
    /// consumed.
    pub fn from_transport(transport: Box<dyn Transport>, config: SessionConfig) -> Self {
        let carrier = transport.carrier();
        let peer_host = transport.peer_host().map(str::to_string);
        let state = if transport.is_closed() {
            SessionState::Closed
        } else {
            SessionState::Connected
        };

        Self {
            inner: Mutex::new(Inner::new(Some(transport), state, config.max_queued_events)),
            wakeup: Condvar::new(),
            config,
            carrier,
            peer_host,
        }
    }

    /// Execute a query with the configured command timeout.
    ///
    /// A non-zero outcome fails with [`QueryError::Protocol`].
    pub fn execute(&self, query: &QueryBuilder) -> Result<Response> {
        self.execute_timeout(query, self.config.command_timeout)
    }

    /// Execute a query with an explicit timeout.
    pub fn execute_timeout(
        &self,
        query: &QueryBuilder,
        timeout: Option<Duration>,
    ) -> Result<Response> {
        self.execute_raw(query, timeout)?.into_result()
    }

    /// Execute a query, treating the listed outcome ids as success.
    pub fn execute_ignoring(&self, query: &QueryBuilder, ignored: &[u32]) -> Result<Response> {
        self.execute_raw(query, self.config.command_timeout)?
            .into_result_ignoring(ignored)
    }

    /// Execute a query and return its response whatever the outcome.
    pub fn execute_raw(&self, query: &QueryBuilder, timeout: Option<Duration>) -> Result<Response> {
        query.validate()?;
        let line = query.compile();

        let deadline = timeout.map(|t| Instant::now() + t);
        let _slot = self.claim_command(deadline, timeout)?;
        let seq = {
            let mut inner = self.writable()?;
            let seq = inner.next_seq;
            inner.next_seq += 1;
            debug!(seq, command = query.command(), "sending query");
            if let Err(err) = inner.write(line.as_bytes()) {
                self.shutdown(&mut inner, "write failed");
                return Err(err.into());
            }
            inner.pending.push_back(seq);
            seq
        };
        self.wakeup.notify_all();

        self.await_response(seq, deadline, timeout)
    }

    /// Block until the next event, or until `timeout` elapses.
    ///
    /// Events already queued are returned first, in arrival order.
    pub fn wait_for_event(&self, timeout: Option<Duration>) -> Result<Event> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let mut inner = self.lock_inner();
            if let Some(event) = inner.events.pop_front() {
                return Ok(event);
            }
            if inner.state == SessionState::Closed {
                return Err(QueryError::Closed);
            }
            let slice = match self.slice_until(deadline) {
                Some(slice) => slice,
                None => return Err(QueryError::Timeout(timeout.unwrap_or_default())),
            };
            self.pump(inner, slice)?;
        }
    }

    /// Write a bare delimiter so the server does not drop an idle connection.
    ///
    /// Registers no pending command; safe while another thread waits for
    /// events.
    pub fn send_keepalive(&self) -> Result<()> {
        let mut inner = self.writable()?;
        debug!("sending keepalive");
        if let Err(err) = inner.write(KEEPALIVE_LINE) {
            self.shutdown(&mut inner, "keepalive write failed");
            return Err(err.into());
        }
        drop(inner);
        self.wakeup.notify_all();
        Ok(())
    }

    /// Deliver events to `handler` until `stop` is raised.
    ///
    /// Sends a keepalive whenever the connection has been idle for
    /// `keepalive_interval`. Timeouts are absorbed; any other error ends
    /// the loop.
    pub fn run_events<F>(&self, stop: &StopSignal, mut handler: F) -> Result<()>
    where
        F: FnMut(&Event),
    {
        while !stop.is_stopped() {
            if self.keepalive_due() {
                self.send_keepalive()?;
            }
            match self.wait_for_event(Some(self.config.poll_interval)) {
                Ok(event) => handler(&event),
                Err(QueryError::Timeout(_)) => {}
                Err(err) => return Err(err),
            }
        }
        debug!("event loop stopped");
        Ok(())
    }

    /// Send `quit` (best effort), close the transport and drop all queued
    /// state. Idempotent.
    ///
    /// If another thread is reading, waits for that read to return (at most
    /// one `poll_interval`) so `quit` still goes out.
    pub fn close(&self) {
        let mut inner = self.lock_inner();
        if inner.state == SessionState::Closed {
            return;
        }
        inner.writers_waiting += 1;
        let mut inner = self
            .wakeup
            .wait_while(inner, |inner| inner.reading)
            .unwrap_or_else(PoisonError::into_inner);
        inner.writers_waiting -= 1;
        if let Some(transport) = inner.transport.as_mut() {
            let _ = transport.write_line(QUIT_COMMAND.as_bytes());
        }
        self.shutdown(&mut inner, "closed by caller");
    }

    pub fn state(&self) -> SessionState {
        self.lock_inner().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    pub fn carrier(&self) -> Carrier {
        self.carrier
    }

    /// Host the transport connected to, if known.
    pub fn peer_host(&self) -> Option<&str> {
        self.peer_host.as_deref()
    }

    /// Commands sent but not yet answered, abandoned ones included.
    pub fn pending_commands(&self) -> usize {
        self.lock_inner().pending.len()
    }

    /// Events read but not yet claimed.
    pub fn queued_events(&self) -> usize {
        self.lock_inner().events.len()
    }

    /// Lines that violated the classification rules.
    pub fn anomalies(&self) -> u64 {
        self.lock_inner().anomalies
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn await_response(
        &self,
        seq: u64,
        deadline: Option<Instant>,
        timeout: Option<Duration>,
    ) -> Result<Response> {
        loop {
            let mut inner = self.lock_inner();
            if let Some(response) = inner.ready.remove(&seq) {
                debug!(seq, lines = response.lines().len(), "response complete");
                return Ok(response);
            }
            if inner.state == SessionState::Closed {
                return Err(QueryError::Closed);
            }
            let Some(slice) = self.slice_until(deadline) else {
                let bound = timeout.unwrap_or_default();
                if !inner.body.is_empty() {
                    warn!(seq, "timed out with a partial response; closing session");
                    self.shutdown(&mut inner, "partial response timed out");
                } else {
                    debug!(seq, "timed out; late response will be dropped");
                    inner.abandoned.insert(seq);
                }
                return Err(QueryError::Timeout(bound));
            };
            self.pump(inner, slice)?;
        }
    }

    /// Read at most one line within `slice`, or wait for the thread that is
    /// currently reading. Writers waiting for the transport go first.
    fn pump(&self, mut inner: MutexGuard<'_, Inner>, slice: Duration) -> Result<()> {
        if inner.reading || inner.writers_waiting > 0 {
            let _ = self
                .wakeup
                .wait_timeout(inner, slice)
                .unwrap_or_else(PoisonError::into_inner);
            return Ok(());
        }

        let Some(mut transport) = inner.transport.take() else {
            return Err(QueryError::Closed);
        };
        inner.reading = true;
        drop(inner);

        let read = transport.read_line(Some(slice));

        let mut inner = self.lock_inner();
        inner.reading = false;
        inner.transport = Some(transport);

        let result = match read {
            Ok(line) => {
                inner.classify(line);
                Ok(())
            }
            Err(TransportError::Timeout(_)) => Ok(()),
            Err(err) => {
                self.shutdown(&mut inner, "transport failed");
                Err(err.into())
            }
        };

        // Closed while the transport was checked out.
        if inner.state == SessionState::Closed {
            if let Some(mut transport) = inner.transport.take() {
                transport.close();
            }
        }
        drop(inner);
        self.wakeup.notify_all();
        result
    }

    /// Wait, until `deadline`, for no other command to be in flight.
    fn claim_command(
        &self,
        deadline: Option<Instant>,
        timeout: Option<Duration>,
    ) -> Result<CommandSlot<'_>> {
        let mut inner = self.lock_inner();
        loop {
            if inner.state == SessionState::Closed {
                return Err(QueryError::Closed);
            }
            if !inner.command_active {
                inner.command_active = true;
                return Ok(CommandSlot { session: self });
            }
            let Some(slice) = self.slice_until(deadline) else {
                debug!("timed out waiting behind another command");
                return Err(QueryError::Timeout(timeout.unwrap_or_default()));
            };
            inner = self
                .wakeup
                .wait_timeout(inner, slice)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Lock the state once no reader holds the transport.
    fn writable(&self) -> Result<MutexGuard<'_, Inner>> {
        let mut inner = self.lock_inner();
        inner.writers_waiting += 1;
        let mut inner = self
            .wakeup
            .wait_while(inner, |inner| inner.reading)
            .unwrap_or_else(PoisonError::into_inner);
        inner.writers_waiting -= 1;
        if inner.state == SessionState::Closed || inner.transport.is_none() {
            return Err(QueryError::Closed);
        }
        Ok(inner)
    }

    fn shutdown(&self, inner: &mut Inner, reason: &str) {
        if inner.state == SessionState::Closed {
            return;
        }
        inner.state = SessionState::Closed;
        if let Some(mut transport) = inner.transport.take() {
            transport.close();
        }
        inner.pending.clear();
        inner.abandoned.clear();
        inner.body.clear();
        inner.ready.clear();
        inner.events.clear();
        info!(carrier = %self.carrier, reason, "query session closed");
        self.wakeup.notify_all();
    }

    fn keepalive_due(&self) -> bool {
        self.lock_inner().last_write.elapsed() >= self.config.keepalive_interval
    }

    fn slice_until(&self, deadline: Option<Instant>) -> Option<Duration> {
        match deadline {
            None => Some(self.config.poll_interval),
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    None
                } else {
                    Some(remaining.min(self.config.poll_interval))
                }
            }
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        lock(&self.inner)
    }
}

/// Marks a command in flight; released on drop.
struct CommandSlot<'a> {
    session: &'a Session,
}

impl Drop for CommandSlot<'_> {
    fn drop(&mut self) {
        self.session.lock_inner().command_active = false;
        self.session.wakeup.notify_all();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("carrier", &self.carrier)
            .field("peer_host", &self.peer_host)
            .field("state", &self.state())
            .finish()
    }
}

impl Inner {
    fn new(transport: Option<Box<dyn Transport>>, state: SessionState, max_events: usize) -> Self {
        Self {
            transport,
            reading: false,
            writers_waiting: 0,
            command_active: false,
            state,
            next_seq: 1,
            pending: VecDeque::new(),
            abandoned: HashSet::new(),
            body: Vec::new(),
            ready: HashMap::new(),
            events: VecDeque::new(),
            max_events: max_events.max(1),
            last_write: Instant::now(),
            anomalies: 0,
        }
    }

    fn write(&mut self, line: &[u8]) -> std::result::Result<(), TransportError> {
        let transport = self.transport.as_mut().ok_or(TransportError::Closed)?;
        transport.write_line(line)?;
        self.last_write = Instant::now();
        Ok(())
    }

    fn classify(&mut self, line: Bytes) {
        if is_blank(&line) {
            return;
        }

        if is_outcome_line(&line) {
            let Some(seq) = self.pending.pop_front() else {
                self.anomalies += 1;
                warn!(
                    line = %lossy(&line),
                    "outcome line with no pending command; discarding"
                );
                return;
            };
            let mut lines = std::mem::take(&mut self.body);
            lines.push(line);
            if self.abandoned.remove(&seq) {
                debug!(seq, "dropping response of abandoned command");
            } else {
                self.ready.insert(seq, Response::new(lines));
            }
            return;
        }

        if self.pending.is_empty() {
            let event = Event::new(line);
            debug!(name = event.name(), "event received");
            if self.events.len() >= self.max_events {
                if let Some(dropped) = self.events.pop_front() {
                    warn!(
                        name = dropped.name(),
                        limit = self.max_events,
                        "event queue full; dropping oldest event"
                    );
                }
            }
            self.events.push_back(event);
            return;
        }

        if trim_delimiter(&line).starts_with(EVENT_PREFIX) {
            self.anomalies += 1;
            warn!(
                line = %lossy(&line),
                "event-like line while a command is pending; treating as response body"
            );
        }
        self.body.push(line);
    }
}

fn lossy(line: &[u8]) -> String {
    String::from_utf8_lossy(trim_delimiter(line)).into_owned()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};

    use super::*;
    use crate::builder::Pipe;

    /// In-memory transport: the test plays the server through two channels.
    struct FakeTransport {
        inbound: Receiver<Bytes>,
        outbound: Sender<Vec<u8>>,
        closed: bool,
    }

    impl Transport for FakeTransport {
        fn read_line(&mut self, timeout: Option<Duration>) -> ts3query_transport::Result<Bytes> {
            if self.closed {
                return Err(TransportError::Closed);
            }
            let received = match timeout {
                Some(t) => self.inbound.recv_timeout(t).map_err(|err| match err {
                    RecvTimeoutError::Timeout => TransportError::Timeout(t),
                    RecvTimeoutError::Disconnected => TransportError::Closed,
                }),
                None => self.inbound.recv().map_err(|_| TransportError::Closed),
            };
            if matches!(received, Err(TransportError::Closed)) {
                self.closed = true;
            }
            received
        }

        fn write_line(&mut self, line: &[u8]) -> ts3query_transport::Result<()> {
            if self.closed {
                return Err(TransportError::Closed);
            }
            self.outbound
                .send(line.to_vec())
                .map_err(|_| TransportError::Closed)
        }

        fn close(&mut self) {
            self.closed = true;
        }

        fn is_closed(&self) -> bool {
            self.closed
        }

        fn carrier(&self) -> Carrier {
            Carrier::Tcp
        }

        fn peer_host(&self) -> Option<&str> {
            Some("127.0.0.1")
        }
    }

    struct Server {
        lines: Sender<Bytes>,
        written: Receiver<Vec<u8>>,
    }

    impl Server {
        fn send(&self, line: &str) {
            let mut wire = line.as_bytes().to_vec();
            wire.extend_from_slice(b"\n\r");
            self.lines.send(Bytes::from(wire)).unwrap();
        }

        fn next_written(&self) -> Vec<u8> {
            self.written.recv_timeout(Duration::from_secs(5)).unwrap()
        }

        fn written_so_far(&self) -> Vec<Vec<u8>> {
            self.written.try_iter().collect()
        }
    }

    fn test_config() -> SessionConfig {
        SessionConfig {
            command_timeout: Some(Duration::from_secs(5)),
            poll_interval: Duration::from_millis(20),
            ..SessionConfig::default()
        }
    }

    fn fake_session(config: SessionConfig) -> (Session, Server) {
        let (lines_tx, lines_rx) = mpsc::channel();
        let (written_tx, written_rx) = mpsc::channel();
        let transport = FakeTransport {
            inbound: lines_rx,
            outbound: written_tx,
            closed: false,
        };
        let session = Session::from_transport(Box::new(transport), config);
        (
            session,
            Server {
                lines: lines_tx,
                written: written_rx,
            },
        )
    }

    fn ok_outcome() -> &'static str {
        "error id=0 msg=ok"
    }

    #[test]
    fn execute_returns_items() {
        let (session, server) = fake_session(test_config());
        server.send("clid=1 client_nickname=serveradmin|clid=5 client_nickname=bob");
        server.send(ok_outcome());

        let response = session.execute(&QueryBuilder::new("clientlist")).unwrap();
        assert_eq!(server.next_written(), b"clientlist");
        let items = response.items().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].get("client_nickname"), Some("bob"));
        assert_eq!(session.pending_commands(), 0);
        assert_eq!(session.peer_host(), Some("127.0.0.1"));
    }

    #[test]
    fn failed_outcome_is_a_protocol_error() {
        let (session, server) = fake_session(test_config());
        server.send("error id=512 msg=invalid\\sparameter");

        let err = session
            .execute(&QueryBuilder::new("clientkick").param("clid", 99))
            .unwrap_err();
        match err {
            QueryError::Protocol { id, msg, .. } => {
                assert_eq!(id, "512");
                assert_eq!(msg, "invalid parameter");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(session.is_connected());
    }

    #[test]
    fn raw_execute_keeps_failed_response() {
        let (session, server) = fake_session(test_config());
        server.send("error id=1281 msg=database\\sempty\\sresult\\sset");

        let response = session
            .execute_raw(&QueryBuilder::new("banlist"), None)
            .unwrap();
        assert_eq!(response.outcome().unwrap().code(), Some(1281));
    }

    #[test]
    fn ignored_outcome_ids() {
        let (session, server) = fake_session(test_config());
        server.send("error id=770 msg=already\\smember\\sof\\schannel");

        let query = QueryBuilder::new("clientmove").param("clid", 5).param("cid", 1);
        let response = session
            .execute_ignoring(&query, &[crate::response::ALREADY_MEMBER_OF_CHANNEL])
            .unwrap();
        assert_eq!(response.outcome().unwrap().id, "770");
    }

    #[test]
    fn event_then_response() {
        let (session, server) = fake_session(test_config());
        server.send("notifycliententerview cfid=0 ctid=1 clid=7 client_nickname=bob");

        let event = session
            .wait_for_event(Some(Duration::from_secs(5)))
            .unwrap();
        assert_eq!(event.name(), "notifycliententerview");
        assert_eq!(event.first().and_then(|r| r.get("clid")), Some("7"));

        server.send("virtualserver_status=online");
        server.send(ok_outcome());
        let response = session.execute(&QueryBuilder::new("serverinfo")).unwrap();
        assert_eq!(response.first().and_then(|r| r.get("virtualserver_status")), Some("online"));

        assert!(matches!(
            session.wait_for_event(Some(Duration::from_millis(50))),
            Err(QueryError::Timeout(_))
        ));
    }

    #[test]
    fn responses_match_commands_in_order() {
        let (session, server) = fake_session(test_config());
        for (cmd, body) in [("c1", "n=1"), ("c2", "n=2"), ("c3", "n=3")] {
            server.send(body);
            server.send(ok_outcome());
            server.send("notifytextmessage targetmode=3 msg=between");
            let response = session.execute(&QueryBuilder::new(cmd)).unwrap();
            assert_eq!(response.first().and_then(|r| r.get("n")), Some(&body[2..]));

            let event = session.wait_for_event(Some(Duration::from_secs(5))).unwrap();
            assert_eq!(event.name(), "notifytextmessage");
        }
    }

    #[test]
    fn notify_line_inside_response_stays_in_body() {
        let (session, server) = fake_session(test_config());
        server.send("notifysomething a=1");
        server.send(ok_outcome());

        let response = session.execute(&QueryBuilder::new("whoami")).unwrap();
        assert_eq!(response.lines().len(), 2);
        assert_eq!(session.anomalies(), 1);
        assert_eq!(session.queued_events(), 0);
    }

    #[test]
    fn stray_outcome_is_discarded() {
        let (session, server) = fake_session(test_config());
        server.send(ok_outcome());
        server.send("notifyserveredited reasonid=10");

        let event = session.wait_for_event(Some(Duration::from_secs(5))).unwrap();
        assert_eq!(event.name(), "notifyserveredited");
        assert_eq!(session.anomalies(), 1);
    }

    #[test]
    fn blank_lines_are_ignored() {
        let (session, server) = fake_session(test_config());
        server.send("");
        server.send("");
        server.send("version=3.13.7");
        server.send("");
        server.send(ok_outcome());

        let response = session.execute(&QueryBuilder::new("version")).unwrap();
        assert_eq!(response.lines().len(), 2);
        assert_eq!(session.anomalies(), 0);
    }

    #[test]
    fn late_response_of_timed_out_command_is_dropped() {
        let (session, server) = fake_session(test_config());

        let err = session
            .execute_timeout(&QueryBuilder::new("slow"), Some(Duration::from_millis(60)))
            .unwrap_err();
        assert!(matches!(err, QueryError::Timeout(d) if d == Duration::from_millis(60)));
        assert!(session.is_connected());
        assert_eq!(session.pending_commands(), 1);

        server.send("n=late");
        server.send(ok_outcome());
        server.send("n=fresh");
        server.send(ok_outcome());

        let response = session.execute(&QueryBuilder::new("fast")).unwrap();
        assert_eq!(response.first().and_then(|r| r.get("n")), Some("fresh"));
        assert_eq!(session.pending_commands(), 0);
    }

    #[test]
    fn timeout_with_partial_body_closes_session() {
        let (session, server) = fake_session(test_config());
        server.send("clid=1");

        let err = session
            .execute_timeout(&QueryBuilder::new("clientlist"), Some(Duration::from_millis(80)))
            .unwrap_err();
        assert!(matches!(err, QueryError::Timeout(_)));
        assert_eq!(session.state(), SessionState::Closed);
        assert!(matches!(
            session.execute(&QueryBuilder::new("whoami")),
            Err(QueryError::Closed)
        ));
    }

    #[test]
    fn transport_loss_closes_session() {
        let (session, server) = fake_session(test_config());
        drop(server.lines);

        let err = session.execute(&QueryBuilder::new("whoami")).unwrap_err();
        assert!(matches!(err, QueryError::Transport(TransportError::Closed)));
        assert!(err.is_fatal());
        assert_eq!(session.state(), SessionState::Closed);
        assert!(matches!(
            session.wait_for_event(None),
            Err(QueryError::Closed)
        ));
    }

    #[test]
    fn invalid_query_is_not_sent() {
        let (session, server) = fake_session(test_config());
        let err = session
            .execute(&QueryBuilder::new("use").param("s id", 1))
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidQuery(_)));
        assert!(server.written_so_far().is_empty());
        assert!(session.is_connected());
    }

    #[test]
    fn close_sends_quit_once() {
        let (session, server) = fake_session(test_config());
        session.close();
        session.close();

        assert_eq!(server.written_so_far(), vec![b"quit".to_vec()]);
        assert_eq!(session.state(), SessionState::Closed);
        assert!(matches!(session.send_keepalive(), Err(QueryError::Closed)));
    }

    #[test]
    fn close_waits_for_active_reader_to_send_quit() {
        let config = SessionConfig {
            poll_interval: Duration::from_millis(100),
            ..test_config()
        };
        let (session, server) = fake_session(config);

        std::thread::scope(|scope| {
            let waiter = scope.spawn(|| session.wait_for_event(Some(Duration::from_secs(5))));
            std::thread::sleep(Duration::from_millis(30));
            session.close();
            assert!(matches!(waiter.join().unwrap(), Err(QueryError::Closed)));
        });
        assert_eq!(server.written_so_far(), vec![b"quit".to_vec()]);
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn queued_command_honours_its_own_timeout() {
        let config = SessionConfig {
            command_timeout: None,
            ..test_config()
        };
        let (session, server) = fake_session(config);

        std::thread::scope(|scope| {
            let slow = scope.spawn(|| session.execute(&QueryBuilder::new("serversnapshotcreate")));
            assert_eq!(server.next_written(), b"serversnapshotcreate");

            let started = Instant::now();
            let err = session
                .execute_timeout(&QueryBuilder::new("whoami"), Some(Duration::from_millis(100)))
                .unwrap_err();
            assert!(matches!(err, QueryError::Timeout(_)));
            assert!(started.elapsed() < Duration::from_secs(2));
            // Never written, so nothing is left pending behind the slow command.
            assert!(server.written_so_far().is_empty());
            assert_eq!(session.pending_commands(), 1);

            server.send(ok_outcome());
            assert!(slow.join().unwrap().is_ok());
        });
        assert_eq!(session.pending_commands(), 0);
        assert!(session.is_connected());
    }

    #[test]
    fn drop_closes_session() {
        let (session, server) = fake_session(test_config());
        drop(session);
        assert_eq!(server.next_written(), b"quit");
    }

    #[test]
    fn keepalive_is_not_a_pending_command() {
        let (session, server) = fake_session(test_config());
        session.send_keepalive().unwrap();
        assert_eq!(server.next_written(), b"");
        assert_eq!(session.pending_commands(), 0);

        server.send("notifytalkstatuschange status=1 clid=2");
        let event = session.wait_for_event(Some(Duration::from_secs(5))).unwrap();
        assert_eq!(event.name(), "notifytalkstatuschange");
    }

    #[test]
    fn run_events_delivers_and_stops() {
        let (session, server) = fake_session(test_config());
        server.send("notifyclientmoved ctid=2 reasonid=0 clid=3");
        server.send("notifyclientleftview cfid=2 ctid=0 reasonid=8 clid=3");

        let stop = StopSignal::new();
        let mut names = Vec::new();
        session
            .run_events(&stop, |event| {
                names.push(event.name().to_string());
                if names.len() == 2 {
                    stop.request_stop();
                }
            })
            .unwrap();

        assert_eq!(names, vec!["notifyclientmoved", "notifyclientleftview"]);
        assert!(session.is_connected());
    }

    #[test]
    fn run_events_sends_keepalives() {
        let config = SessionConfig {
            keepalive_interval: Duration::from_millis(40),
            ..test_config()
        };
        let (session, server) = fake_session(config);
        let stop = StopSignal::new();
        let remote = stop.clone();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                std::thread::sleep(Duration::from_millis(200));
                remote.request_stop();
            });
            session.run_events(&stop, |_| {}).unwrap();
        });

        let written = server.written_so_far();
        assert!(!written.is_empty());
        assert!(written.iter().all(|line| line.is_empty()));
        assert_eq!(session.pending_commands(), 0);
    }

    #[test]
    fn event_waiter_and_command_share_the_reader() {
        let (session, server) = fake_session(test_config());

        std::thread::scope(|scope| {
            let waiter = scope.spawn(|| session.wait_for_event(Some(Duration::from_secs(5))));
            let command = scope.spawn(|| {
                session.execute(
                    &QueryBuilder::new("clientkick")
                        .param("reasonid", 4)
                        .pipe(Pipe::new().param("clid", 5))
                        .pipe(Pipe::new().param("clid", 6)),
                )
            });

            assert_eq!(server.next_written(), b"clientkick reasonid=4 clid=5|clid=6");
            server.send(ok_outcome());
            let response = command.join().unwrap().unwrap();
            assert!(response.outcome().unwrap().is_ok());

            server.send("notifyclientleftview clid=5");
            let event = waiter.join().unwrap().unwrap();
            assert_eq!(event.name(), "notifyclientleftview");
        });
    }

    #[test]
    fn event_queue_drops_oldest() {
        let mut inner = Inner::new(None, SessionState::Connected, 2);
        for clid in 1..=3 {
            inner.classify(Bytes::from(format!("notifyclientleftview clid={clid}\n\r")));
        }
        let kept: Vec<_> = inner
            .events
            .iter()
            .filter_map(|e| e.first().and_then(|r| r.get("clid")).map(str::to_string))
            .collect();
        assert_eq!(kept, vec!["2", "3"]);
    }

    #[test]
    fn classification_rules() {
        let mut inner = Inner::new(None, SessionState::Connected, 16);

        inner.classify(Bytes::from_static(b"notifyserveredited\n\r"));
        assert_eq!(inner.events.len(), 1);

        inner.pending.push_back(1);
        inner.classify(Bytes::from_static(b"cid=1 channel_name=Lobby\n\r"));
        inner.classify(Bytes::from_static(b"cid=2 channel_name=AFK\n\r"));
        assert_eq!(inner.body.len(), 2);
        assert_eq!(inner.events.len(), 1);

        inner.classify(Bytes::from_static(b"error id=0 msg=ok\n\r"));
        assert!(inner.body.is_empty());
        assert!(inner.pending.is_empty());
        let response = inner.ready.remove(&1).unwrap();
        assert_eq!(response.items().unwrap().len(), 2);
    }
}

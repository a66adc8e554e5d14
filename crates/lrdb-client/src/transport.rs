//! Newline-delimited JSON transport with request/response correlation.
//! - Client: owns the socket, assigns request ids, keeps the pending table
//! - reader thread: splits lines, resolves pending entries, forwards the rest
//! - Pending: blocking handle for one in-flight request

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::error::ClientError;
use crate::message::{Message, Notification, Request};

/// Upper bound on how long [`Pending::wait`] blocks for a response. The
/// protocol itself has no timeout; a hung debuggee would otherwise park the
/// caller forever.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Signals delivered on the event channel, in wire-arrival order.
#[derive(Debug)]
pub enum ClientEvent {
    Notify(Notification),
    Closed,
}

type PendingTable = Arc<Mutex<HashMap<u64, mpsc::Sender<Value>>>>;

/// One connection to a debuggable VM. Exclusively owned by a single session
/// or discovery probe; notifications and the close signal arrive on the
/// event channel handed to [`Client::connect`].
pub struct Client {
    stream: Mutex<TcpStream>,
    pending: PendingTable,
    next_id: AtomicU64,
}

impl Client {
    /// Connect to `host:port` and start the reader thread.
    pub fn connect(
        host: &str,
        port: u16,
        events: mpsc::Sender<ClientEvent>,
    ) -> Result<Self, ClientError> {
        let stream = TcpStream::connect((host, port)).map_err(ClientError::Connect)?;
        Self::from_stream(stream, events)
    }

    /// Like [`Client::connect`] but bounded by `timeout`, for discovery
    /// probes that must not hang on a dead port.
    pub fn connect_timeout(
        host: &str,
        port: u16,
        timeout: Duration,
        events: mpsc::Sender<ClientEvent>,
    ) -> Result<Self, ClientError> {
        let addr = resolve(host, port)?;
        let stream = TcpStream::connect_timeout(&addr, timeout).map_err(ClientError::Connect)?;
        Self::from_stream(stream, events)
    }

    fn from_stream(
        stream: TcpStream,
        events: mpsc::Sender<ClientEvent>,
    ) -> Result<Self, ClientError> {
        let pending: PendingTable = Arc::new(Mutex::new(HashMap::new()));
        let reader_stream = stream.try_clone()?;
        let reader_pending = Arc::clone(&pending);
        thread::spawn(move || read_loop(reader_stream, &reader_pending, &events));
        Ok(Self {
            stream: Mutex::new(stream),
            pending,
            next_id: AtomicU64::new(0),
        })
    }

    /// Send a request and return a handle for its response. The continuation
    /// is registered before the line is written, so a response can never
    /// race past its pending entry.
    pub fn call(&self, method: &str, param: Option<Value>) -> Result<Pending, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel();
        self.lock_pending().insert(id, tx);
        if let Err(err) = self.write_request(method, param, id) {
            self.lock_pending().remove(&id);
            return Err(err);
        }
        Ok(Pending {
            method: method.to_string(),
            rx,
        })
    }

    /// Fire-and-forget request. An id is still assigned (every request line
    /// carries one) but no continuation is registered; the eventual response
    /// is dispatched as a notification and ignored by anyone who does not
    /// recognize it.
    pub fn post(&self, method: &str, param: Option<Value>) -> Result<(), ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.write_request(method, param, id)
    }

    /// Shut the connection down. Idempotent; the reader thread notices the
    /// close and emits [`ClientEvent::Closed`]. Still-pending continuations
    /// are abandoned and their waiters observe [`ClientError::Closed`].
    pub fn close(&self) {
        if let Ok(stream) = self.stream.lock() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    fn write_request(
        &self,
        method: &str,
        param: Option<Value>,
        id: u64,
    ) -> Result<(), ClientError> {
        let request = Request {
            method: method.to_string(),
            param,
            id,
        };
        let mut line = serde_json::to_string(&request)
            .map_err(|err| ClientError::Malformed(err.to_string()))?;
        line.push('\n');
        let mut stream = self
            .stream
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        stream.write_all(line.as_bytes())?;
        stream.flush()?;
        Ok(())
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<u64, mpsc::Sender<Value>>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}

/// Response handle for one in-flight request.
pub struct Pending {
    method: String,
    rx: mpsc::Receiver<Value>,
}

impl Pending {
    /// Block until the response arrives, bounded by [`REQUEST_TIMEOUT`].
    pub fn wait(self) -> Result<Value, ClientError> {
        self.wait_timeout(REQUEST_TIMEOUT)
    }

    pub fn wait_timeout(self, timeout: Duration) -> Result<Value, ClientError> {
        match self.rx.recv_timeout(timeout) {
            Ok(value) => Ok(value),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(ClientError::Timeout {
                method: self.method,
                timeout,
            }),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(ClientError::Closed),
        }
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, ClientError> {
    (host, port)
        .to_socket_addrs()
        .map_err(ClientError::Connect)?
        .next()
        .ok_or_else(|| {
            ClientError::Malformed(format!("'{host}:{port}' did not resolve to an address"))
        })
}

fn read_loop(stream: TcpStream, pending: &PendingTable, events: &mpsc::Sender<ClientEvent>) {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            continue;
        }
        // One malformed line must not desynchronize the stream: drop it and
        // keep framing from the next newline.
        let message: Message = match serde_json::from_str(trimmed) {
            Ok(message) => message,
            Err(err) => {
                debug!(error = %err, "dropping malformed frame");
                continue;
            }
        };
        dispatch(message, pending, events);
    }
    // Abandon whatever is still pending so waiters see a disconnect rather
    // than hanging on a response that can no longer arrive.
    pending
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clear();
    let _ = events.send(ClientEvent::Closed);
}

fn dispatch(message: Message, pending: &PendingTable, events: &mpsc::Sender<ClientEvent>) {
    if let Some(id) = message.id {
        let continuation = pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&id);
        if let Some(tx) = continuation {
            let _ = tx.send(message.result.unwrap_or(Value::Null));
            return;
        }
    }
    let notification = Notification {
        method: message.method.unwrap_or_default(),
        param: message.param,
    };
    let _ = events.send(ClientEvent::Notify(notification));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;

    fn local_server<F>(serve: F) -> u16
    where
        F: FnOnce(TcpStream) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
        let port = listener.local_addr().expect("local addr").port();
        thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                serve(stream);
            }
        });
        port
    }

    #[test]
    fn responses_resolve_by_id_not_send_order() {
        let port = local_server(|stream| {
            let mut reader = BufReader::new(stream.try_clone().expect("clone"));
            let mut first = String::new();
            let mut second = String::new();
            reader.read_line(&mut first).expect("read first");
            reader.read_line(&mut second).expect("read second");
            let first: serde_json::Value = serde_json::from_str(&first).expect("parse first");
            let second: serde_json::Value = serde_json::from_str(&second).expect("parse second");
            // Answer the second request before the first.
            let mut stream = stream;
            writeln!(
                stream,
                "{}",
                serde_json::json!({"id": second["id"], "result": "second"})
            )
            .expect("write");
            writeln!(
                stream,
                "{}",
                serde_json::json!({"id": first["id"], "result": "first"})
            )
            .expect("write");
        });

        let (tx, _rx) = mpsc::channel();
        let client = Client::connect("127.0.0.1", port, tx).expect("connect");
        let first = client.call("get_stacktrace", None).expect("call");
        let second = client.call("get_global", None).expect("call");
        assert_eq!(first.wait().expect("first"), serde_json::json!("first"));
        assert_eq!(second.wait().expect("second"), serde_json::json!("second"));
    }

    #[test]
    fn malformed_line_is_skipped_without_breaking_framing() {
        let port = local_server(|mut stream| {
            writeln!(stream, "this is not json").expect("write");
            writeln!(
                stream,
                "{}",
                serde_json::json!({"method": "paused", "param": {"reason": "breakpoint"}})
            )
            .expect("write");
        });

        let (tx, rx) = mpsc::channel();
        let _client = Client::connect("127.0.0.1", port, tx).expect("connect");
        match rx.recv_timeout(Duration::from_secs(5)).expect("event") {
            ClientEvent::Notify(note) => {
                assert_eq!(note.method, "paused");
                assert_eq!(
                    note.param,
                    Some(serde_json::json!({"reason": "breakpoint"}))
                );
            }
            other => panic!("expected notification, got {other:?}"),
        }
    }

    #[test]
    fn plural_params_notification_still_carries_its_payload() {
        let port = local_server(|mut stream| {
            writeln!(
                stream,
                "{}",
                serde_json::json!({
                    "method": "connected",
                    "params": {"lua": {"version": "lua5.4"}, "protocolVersion": "3"}
                })
            )
            .expect("write");
        });

        let (tx, rx) = mpsc::channel();
        let _client = Client::connect("127.0.0.1", port, tx).expect("connect");
        match rx.recv_timeout(Duration::from_secs(5)).expect("event") {
            ClientEvent::Notify(note) => {
                assert_eq!(note.method, "connected");
                let param = note.param.expect("payload");
                assert_eq!(param["protocolVersion"], serde_json::json!("3"));
            }
            other => panic!("expected notification, got {other:?}"),
        }
    }

    #[test]
    fn close_abandons_pending_requests() {
        let port = local_server(|stream| {
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            let _ = reader.read_line(&mut line);
            // Drop the connection without answering.
        });

        let (tx, rx) = mpsc::channel();
        let client = Client::connect("127.0.0.1", port, tx).expect("connect");
        let pending = client.call("get_stacktrace", None).expect("call");
        match pending.wait() {
            Err(ClientError::Closed) => {}
            other => panic!("expected Closed, got {other:?}"),
        }
        match rx.recv_timeout(Duration::from_secs(5)).expect("event") {
            ClientEvent::Closed => {}
            other => panic!("expected Closed event, got {other:?}"),
        }
    }

    #[test]
    fn response_without_pending_entry_becomes_notification() {
        let port = local_server(|mut stream| {
            writeln!(stream, "{}", serde_json::json!({"id": 99, "result": "late"}))
                .expect("write");
        });

        let (tx, rx) = mpsc::channel();
        let _client = Client::connect("127.0.0.1", port, tx).expect("connect");
        match rx.recv_timeout(Duration::from_secs(5)).expect("event") {
            ClientEvent::Notify(note) => assert!(note.method.is_empty()),
            other => panic!("expected notification, got {other:?}"),
        }
    }
}

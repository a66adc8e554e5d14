//! Concurrent multi-port discovery of live debuggable VM instances.
//!
//! Each candidate port gets its own probe connection; a probe that sees the
//! `connected` handshake records the VM metadata, then pauses the debuggee
//! and closes. Probes are fully isolated: a hang or failure on one port
//! never blocks another.

use std::ops::Range;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::message::{ConnectedParams, CONNECTED_METHOD};
use crate::transport::{Client, ClientEvent};

/// Port range conventionally offered by debuggable VMs.
pub const DEFAULT_SCAN_PORTS: Range<u16> = 21110..21120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Unreachable,
    Available,
}

/// One scanned port.
#[derive(Debug, Clone)]
pub struct Instance {
    pub host: String,
    pub port: u16,
    pub state: InstanceState,
    pub metadata: Option<ConnectedParams>,
}

impl Instance {
    fn unreachable(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            state: InstanceState::Unreachable,
            metadata: None,
        }
    }
}

/// Probe every port in `ports` concurrently and return one [`Instance`] per
/// port, sorted by port number.
pub fn scan_range(host: &str, ports: Range<u16>, timeout: Duration) -> Vec<Instance> {
    let (tx, rx) = mpsc::channel();
    let mut workers = Vec::new();
    for port in ports {
        let tx = tx.clone();
        let host = host.to_string();
        workers.push(thread::spawn(move || {
            let _ = tx.send(probe(&host, port, timeout));
        }));
    }
    drop(tx);
    let mut instances: Vec<Instance> = rx.iter().collect();
    for worker in workers {
        let _ = worker.join();
    }
    instances.sort_by_key(|instance| instance.port);
    instances
}

fn probe(host: &str, port: u16, timeout: Duration) -> Instance {
    let (events_tx, events_rx) = mpsc::channel();
    let client = match Client::connect_timeout(host, port, timeout, events_tx) {
        Ok(client) => client,
        Err(err) => {
            debug!(host, port, error = %err, "probe failed to connect");
            return Instance::unreachable(host, port);
        }
    };

    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match events_rx.recv_timeout(remaining) {
            Ok(ClientEvent::Notify(note)) if note.method == CONNECTED_METHOD => {
                let metadata = note
                    .param
                    .and_then(|param| serde_json::from_value::<ConnectedParams>(param).ok());
                // The probed VM sits paused at its hook waiting for a
                // debugger; leave it paused instead of running unattended.
                let _ = client.post("pause", None);
                client.close();
                return Instance {
                    host: host.to_string(),
                    port,
                    state: InstanceState::Available,
                    metadata,
                };
            }
            Ok(ClientEvent::Notify(_)) => continue,
            Ok(ClientEvent::Closed) | Err(_) => break,
        }
    }
    client.close();
    Instance::unreachable(host, port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex};

    #[test]
    fn scan_finds_the_one_live_instance_and_closes_the_probe() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let live_port = listener.local_addr().expect("addr").port();
        let probe_closed = Arc::new(Mutex::new(false));
        let closed_flag = Arc::clone(&probe_closed);
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            writeln!(
                stream,
                "{}",
                serde_json::json!({
                    "method": "connected",
                    "param": {
                        "lua": {"version": "lua5.4"},
                        "protocolVersion": "3",
                        "workingDirectory": "/srv/game"
                    }
                })
            )
            .expect("write connected");
            // Drain until the probe hangs up; the pause request arrives here.
            let mut sink = Vec::new();
            let _ = stream.read_to_end(&mut sink);
            let text = String::from_utf8_lossy(&sink);
            assert!(text.contains("pause"), "probe should pause before closing");
            *closed_flag.lock().expect("flag") = true;
        });

        let instances = scan_range("127.0.0.1", live_port..live_port + 3, Duration::from_secs(5));
        assert_eq!(instances.len(), 3);

        let live = &instances[0];
        assert_eq!(live.port, live_port);
        assert_eq!(live.state, InstanceState::Available);
        let vm = live
            .metadata
            .as_ref()
            .and_then(|meta| meta.lua.as_ref())
            .expect("vm metadata");
        assert_eq!(vm.version, "lua5.4");

        let available = instances
            .iter()
            .filter(|instance| instance.state == InstanceState::Available)
            .count();
        assert_eq!(available, 1);

        // read_to_end returning means the probe connection was closed.
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if *probe_closed.lock().expect("flag") {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("probe connection never closed");
    }

    #[test]
    fn unreachable_ports_do_not_block_the_scan() {
        // Nothing listens here; every probe must come back promptly.
        let started = Instant::now();
        let instances = scan_range("127.0.0.1", 1..4, Duration::from_secs(2));
        assert_eq!(instances.len(), 3);
        assert!(instances
            .iter()
            .all(|instance| instance.state == InstanceState::Unreachable));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}

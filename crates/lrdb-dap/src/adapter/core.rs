//! Adapter core loop + request dispatch.
//! - DebugAdapter::new / run_stdio: protocol loop over stdio
//! - dispatch_request: route DAP requests
//! - handle_debuggee_event: translate debuggee notifications to DAP events
//! - response/event helpers

use std::io::{self, BufReader, BufWriter};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use lrdb_client::{
    Client, ClientError, ClientEvent, ConnectedParams, Notification, ProtocolVersion,
    CONNECTED_METHOD, HANDSHAKE_METHOD,
};

use crate::breakpoints::{BreakpointManager, FsSourceAccess, SourceAccess};
use crate::paths::SourcePathTranslator;
use crate::protocol::{
    ContinuedEventBody, Event, MessageType, OutputEventBody, Request, Response, StoppedEventBody,
    TerminatedEventBody,
};

use super::protocol_io::{read_message, write_message_locked};
use super::{
    CoordinateConverter, DebugAdapter, DispatchOutcome, Incoming, SessionState, VariableHandles,
    VirtualSources, THREAD_ID,
};

/// Newest line-protocol revision this adapter speaks.
const SUPPORTED_PROTOCOL_VERSION: &str = "3";

const CONNECT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(1);
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(100);

impl Default for DebugAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl DebugAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self::with_source_access(Box::new(FsSourceAccess))
    }

    pub(super) fn with_source_access(sources: Box<dyn SourceAccess>) -> Self {
        let (incoming_tx, incoming_rx) = mpsc::channel();
        Self {
            client: None,
            debuggee: None,
            incoming_tx,
            incoming_rx: Some(incoming_rx),
            next_seq: Arc::new(AtomicU32::new(1)),
            coordinate: CoordinateConverter::new(true, true),
            state: SessionState::Idle,
            protocol: ProtocolVersion::default(),
            stop_on_entry: false,
            entry_pause_handled: false,
            breakpoints: BreakpointManager::new(),
            translator: SourcePathTranslator::new(".", Vec::new()),
            handles: VariableHandles::default(),
            virtual_sources: VirtualSources::default(),
            sources,
            metadata: None,
            terminated_sent: false,
        }
    }

    /// Run a blocking stdio loop that processes DAP requests. Debuggee
    /// notifications and spawned-process output funnel into the same channel
    /// so the session only ever mutates on this thread.
    pub fn run_stdio(&mut self) -> io::Result<()> {
        let writer = Arc::new(Mutex::new(BufWriter::new(io::stdout())));
        let Some(incoming_rx) = self.incoming_rx.take() else {
            return Err(io::Error::other("session loop already consumed"));
        };

        let stdin_tx = self.incoming_tx.clone();
        // Not joined: after a disconnect-triggered exit the thread may still
        // be parked in a stdin read, and process exit reaps it anyway.
        thread::spawn(move || {
            let stdin = io::stdin();
            let mut reader = BufReader::new(stdin.lock());
            loop {
                match read_message(&mut reader) {
                    Ok(Some(payload)) => {
                        if stdin_tx.send(Incoming::Request(payload)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        let _ = stdin_tx.send(Incoming::StdinClosed);
                        break;
                    }
                    Err(err) => {
                        warn!(error = %err, "stdin framing error");
                        let _ = stdin_tx.send(Incoming::StdinClosed);
                        break;
                    }
                }
            }
        });

        while let Ok(incoming) = incoming_rx.recv() {
            let outcome = match incoming {
                Incoming::Request(payload) => match serde_json::from_str::<Request<Value>>(
                    &payload,
                ) {
                    Ok(request) => self.dispatch_request(request),
                    Err(err) => {
                        debug!(error = %err, "ignoring unparseable client message");
                        DispatchOutcome::default()
                    }
                },
                Incoming::Debuggee(event) => DispatchOutcome {
                    events: self.handle_debuggee_event(event),
                    ..DispatchOutcome::default()
                },
                Incoming::ChildOutput { line, category } => DispatchOutcome {
                    events: vec![self.output_text_event(&line, category)],
                    ..DispatchOutcome::default()
                },
                Incoming::StdinClosed => break,
            };
            for message in outcome.responses.iter().chain(outcome.events.iter()) {
                let serialized = serde_json::to_string(message)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
                write_message_locked(&writer, &serialized)?;
            }
            if outcome.should_exit {
                break;
            }
        }

        self.shutdown_debuggee();
        Ok(())
    }

    pub(super) fn dispatch_request(&mut self, request: Request<Value>) -> DispatchOutcome {
        if request.message_type != MessageType::Request {
            return DispatchOutcome::default();
        }
        debug!(seq = request.seq, command = %request.command, "dispatch");

        let command = request.command.clone();
        let mut outcome = match request.command.as_str() {
            "initialize" => self.handle_initialize(request),
            "launch" => self.handle_launch(request),
            "attach" => self.handle_attach(request),
            "configurationDone" => self.handle_configuration_done(request),
            "disconnect" => self.handle_disconnect(request),
            "setBreakpoints" => self.handle_set_breakpoints(request),
            "threads" => self.handle_threads(request),
            "stackTrace" => self.handle_stack_trace(request),
            "scopes" => self.handle_scopes(request),
            "variables" => self.handle_variables(request),
            "setVariable" => self.handle_set_variable(request),
            "source" => self.handle_source(request),
            "continue" => self.handle_continue(request),
            "pause" => self.handle_pause(request),
            "next" => self.handle_next(request),
            "stepIn" => self.handle_step_in(request),
            "stepOut" => self.handle_step_out(request),
            "evaluate" => self.handle_evaluate(request),
            _ => DispatchOutcome {
                responses: vec![self.error_response(&request, "unsupported command")],
                ..DispatchOutcome::default()
            },
        };

        // Failed responses are mirrored to the debug console; IDEs surface
        // the response message inconsistently.
        let failures: Vec<String> = outcome
            .responses
            .iter()
            .filter(|response| response.get("success").and_then(Value::as_bool) == Some(false))
            .filter_map(|response| {
                response
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .collect();
        for message in failures {
            outcome
                .events
                .push(self.console_message(format!("{command}: {message}")));
        }
        outcome
    }

    /// Spawn the event forwarder, connect with retries (the debuggee may
    /// still be opening its listener in launch mode), then announce the
    /// protocol version.
    pub(super) fn connect_debuggee(
        &mut self,
        host: &str,
        port: u16,
        window: Duration,
    ) -> Result<(), ClientError> {
        let (events_tx, events_rx) = mpsc::channel();
        let incoming = self.incoming_tx.clone();
        thread::spawn(move || {
            while let Ok(event) = events_rx.recv() {
                let closed = matches!(event, ClientEvent::Closed);
                if incoming.send(Incoming::Debuggee(event)).is_err() || closed {
                    break;
                }
            }
        });

        let deadline = Instant::now() + window;
        let client = loop {
            match Client::connect_timeout(host, port, CONNECT_ATTEMPT_TIMEOUT, events_tx.clone()) {
                Ok(client) => break client,
                Err(err) => {
                    if Instant::now() >= deadline {
                        return Err(err);
                    }
                    thread::sleep(CONNECT_RETRY_DELAY);
                }
            }
        };
        client.post(
            HANDSHAKE_METHOD,
            Some(json!({ "protocolVersion": SUPPORTED_PROTOCOL_VERSION })),
        )?;
        self.client = Some(client);
        self.state = SessionState::Connecting;
        self.entry_pause_handled = false;
        Ok(())
    }

    pub(super) fn handle_debuggee_event(&mut self, event: ClientEvent) -> Vec<Value> {
        match event {
            ClientEvent::Notify(note) => self.handle_debuggee_notify(note),
            ClientEvent::Closed => self.terminate_events(),
        }
    }

    pub(super) fn handle_debuggee_notify(&mut self, note: Notification) -> Vec<Value> {
        match note.method.as_str() {
            CONNECTED_METHOD => self.handle_connected(note.param),
            "paused" => self.handle_paused(note.param),
            "running" => {
                self.state = SessionState::Running;
                // Composite identities do not survive a resume; stale
                // references must fail instead of describing old data.
                self.handles.reset();
                vec![self.continued_event()]
            }
            "exit" => self.terminate_events(),
            "output" => self.handle_output(note.param),
            other => {
                debug!(method = other, "ignoring unrecognized notification");
                Vec::new()
            }
        }
    }

    fn handle_connected(&mut self, param: Option<Value>) -> Vec<Value> {
        let metadata = param
            .and_then(|value| serde_json::from_value::<ConnectedParams>(value).ok())
            .unwrap_or_default();
        self.protocol = ProtocolVersion::from_handshake(metadata.protocol_version.as_deref());
        let mut events = Vec::new();
        if let Some(vm) = &metadata.lua {
            events.push(self.console_message(format!("connected: {}", vm.version)));
        }
        self.metadata = Some(metadata);
        self.state = SessionState::Initialized;
        self.resend_breakpoints();
        events
    }

    fn handle_paused(&mut self, param: Option<Value>) -> Vec<Value> {
        let reason = param
            .as_ref()
            .and_then(|value| value.get("reason"))
            .and_then(Value::as_str)
            .unwrap_or("pause")
            .to_string();
        if reason == "entry" && !self.stop_on_entry && !self.entry_pause_handled {
            // The debuggee always pauses at its first instruction; without
            // stopOnEntry the IDE never learns about it.
            self.entry_pause_handled = true;
            self.post("continue", None);
            return Vec::new();
        }
        self.entry_pause_handled = true;
        self.state = SessionState::Paused;
        vec![self.stopped_event(&reason)]
    }

    fn handle_output(&mut self, param: Option<Value>) -> Vec<Value> {
        let text = match &param {
            Some(Value::String(text)) => text.clone(),
            Some(value) => value
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| value.to_string()),
            None => return Vec::new(),
        };
        vec![self.output_text_event(&text, "stdout")]
    }

    /// Exactly one `terminated` event per session, whatever arrives first:
    /// the `exit` notification, the transport close, or a disconnect.
    pub(super) fn terminate_events(&mut self) -> Vec<Value> {
        self.state = SessionState::Terminated;
        if self.terminated_sent {
            return Vec::new();
        }
        self.terminated_sent = true;
        vec![self.event(
            "terminated",
            Some(TerminatedEventBody { restart: None }),
        )]
    }

    pub(super) fn shutdown_debuggee(&mut self) {
        if let Some(client) = self.client.take() {
            client.close();
        }
        if let Some(mut child) = self.debuggee.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    /// Replay every registered breakpoint to a freshly connected debuggee.
    pub(super) fn resend_breakpoints(&mut self) {
        for source in self.breakpoints.sources() {
            self.transmit_breakpoints(&source);
        }
    }

    /// Clear then re-add the debuggee-side breakpoints for one source. Only
    /// verified breakpoints go on the wire.
    pub(super) fn transmit_breakpoints(&self, source: &Path) {
        let Some(client) = self.client.as_ref() else {
            return;
        };
        let file = self.translator.to_debuggee(source);
        if let Err(err) = client.post("clear_breakpoints", Some(json!({ "file": file }))) {
            warn!(error = %err, file, "failed to clear breakpoints");
            return;
        }
        for placed in self.breakpoints.for_source(source) {
            if !placed.verified {
                continue;
            }
            let mut param = json!({ "file": file, "line": placed.line });
            if let Some(condition) = &placed.condition {
                param["condition"] = Value::String(condition.clone());
            }
            if let Some(hit_condition) = &placed.hit_condition {
                param["hit_condition"] = Value::String(hit_condition.clone());
            }
            if let Err(err) = client.post("add_breakpoint", Some(param)) {
                warn!(error = %err, file, line = placed.line, "failed to add breakpoint");
            }
        }
    }

    /// Fire-and-forget request to the debuggee; a send failure is logged and
    /// surfaces later as a transport close.
    pub(super) fn post(&self, method: &str, param: Option<Value>) {
        let Some(client) = self.client.as_ref() else {
            warn!(method, "dropping request: not connected");
            return;
        };
        if let Err(err) = client.post(method, param) {
            warn!(method, error = %err, "request send failed");
        }
    }

    /// Round-trip request; errors come back as plain text for the failed
    /// DAP response.
    pub(super) fn call_rpc(&self, method: &str, param: Option<Value>) -> Result<Value, String> {
        let client = self.client.as_ref().ok_or("not connected to a debuggee")?;
        client
            .call(method, param)
            .and_then(|pending| pending.wait())
            .map_err(|err| err.to_string())
    }

    fn next_seq(&self) -> u32 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    pub(super) fn ok_response<T>(&self, request: &Request<Value>, body: Option<T>) -> Value
    where
        T: Serialize,
    {
        let body = body
            .map(|payload| serde_json::to_value(payload))
            .transpose()
            .unwrap_or(None);
        let response = Response {
            seq: self.next_seq(),
            message_type: MessageType::Response,
            request_seq: request.seq,
            success: true,
            command: request.command.clone(),
            message: None,
            body,
        };
        serde_json::to_value(response).unwrap_or(Value::Null)
    }

    pub(super) fn error_response(&self, request: &Request<Value>, message: &str) -> Value {
        let response: Response<Value> = Response {
            seq: self.next_seq(),
            message_type: MessageType::Response,
            request_seq: request.seq,
            success: false,
            command: request.command.clone(),
            message: Some(message.to_string()),
            body: None,
        };
        serde_json::to_value(response).unwrap_or(Value::Null)
    }

    pub(super) fn event<T>(&self, name: &str, body: Option<T>) -> Value
    where
        T: Serialize,
    {
        let body = body
            .map(|payload| serde_json::to_value(payload))
            .transpose()
            .unwrap_or(None);
        let event = Event {
            seq: self.next_seq(),
            message_type: MessageType::Event,
            event: name.to_string(),
            body,
        };
        serde_json::to_value(event).unwrap_or(Value::Null)
    }

    pub(super) fn console_message(&self, message: impl Into<String>) -> Value {
        self.output_text_event(&message.into(), "console")
    }

    pub(super) fn output_text_event(&self, text: &str, category: &str) -> Value {
        let output = if text.ends_with('\n') {
            text.to_string()
        } else {
            format!("{text}\n")
        };
        self.event(
            "output",
            Some(OutputEventBody {
                output,
                category: Some(category.to_string()),
                source: None,
                line: None,
            }),
        )
    }

    pub(super) fn stopped_event(&self, reason: &str) -> Value {
        self.event(
            "stopped",
            Some(StoppedEventBody {
                reason: reason.to_string(),
                thread_id: Some(THREAD_ID),
                all_threads_stopped: Some(true),
            }),
        )
    }

    pub(super) fn continued_event(&self) -> Value {
        self.event(
            "continued",
            Some(ContinuedEventBody {
                thread_id: THREAD_ID,
                all_threads_continued: Some(true),
            }),
        )
    }
}

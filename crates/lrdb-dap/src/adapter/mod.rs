//! Debug adapter module map.
//! - core: session loop, dispatch, debuggee notification handling
//! - handlers: DAP request handlers by area
//! - variables: variable/evaluate/set logic
//! - protocol_io: message framing
//! - tests: adapter unit tests

mod core;
mod handlers;
mod protocol_io;
mod variables;


use std::collections::HashMap;
use std::process::Child;
use std::sync::atomic::AtomicU32;
use std::sync::{mpsc, Arc};

use serde_json::Value;

use lrdb_client::{Client, ClientEvent, ConnectedParams, ProtocolVersion};

use crate::breakpoints::BreakpointManager;
use crate::paths::SourcePathTranslator;

/// The single logical debuggee thread reported to the IDE.
const THREAD_ID: u32 = 1;

/// First variable reference handed out; 0 is reserved for leaf values.
const FIRST_VARIABLE_REF: u32 = 1000;

/// Everything funneled into the single-threaded session loop.
#[derive(Debug)]
enum Incoming {
    Request(String),
    Debuggee(ClientEvent),
    ChildOutput { line: String, category: &'static str },
    StdinClosed,
}

/// Session lifecycle, driven by requests and debuggee notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Idle,
    Connecting,
    Initialized,
    Running,
    Paused,
    Terminated,
}

/// Name resolution flags forwarded with an eval. `None` leaves the
/// debuggee's default for that scope in place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct EvalScope {
    global: Option<bool>,
    local: Option<bool>,
    upvalue: Option<bool>,
}

impl EvalScope {
    /// Children of a local scope root: locals and the chunk environment,
    /// with globals and upvalues masked out.
    fn local() -> Self {
        Self {
            global: Some(false),
            local: None,
            upvalue: Some(false),
        }
    }

    fn upvalue() -> Self {
        Self {
            global: Some(false),
            local: Some(false),
            upvalue: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum VariableHandle {
    Local {
        frame: u32,
    },
    Upvalue {
        frame: u32,
    },
    Global,
    /// A composite reached by indexing; `expression` re-derives it on the
    /// debuggee because composite identities do not survive the wire.
    Eval {
        frame: u32,
        expression: String,
        scope: EvalScope,
    },
}

/// Variable reference table. References are never reused: `reset` drops the
/// entries but keeps counting, so a stale reference from before a resume can
/// never alias a fresh one.
#[derive(Debug)]
struct VariableHandles {
    map: HashMap<u32, VariableHandle>,
    next: u32,
}

impl Default for VariableHandles {
    fn default() -> Self {
        Self {
            map: HashMap::new(),
            next: FIRST_VARIABLE_REF,
        }
    }
}

impl VariableHandles {
    fn create(&mut self, handle: VariableHandle) -> u32 {
        let reference = self.next;
        self.next += 1;
        self.map.insert(reference, handle);
        reference
    }

    fn get(&self, reference: u32) -> Option<&VariableHandle> {
        self.map.get(&reference)
    }

    fn reset(&mut self) {
        self.map.clear();
    }
}

/// Debuggee chunk names with no backing file, served by reference through
/// the `source` request.
#[derive(Debug, Default)]
struct VirtualSources {
    by_reference: HashMap<u32, String>,
    by_name: HashMap<String, u32>,
    next: u32,
}

impl VirtualSources {
    fn intern(&mut self, name: &str) -> u32 {
        if let Some(reference) = self.by_name.get(name) {
            return *reference;
        }
        self.next += 1;
        let reference = self.next;
        self.by_name.insert(name.to_string(), reference);
        self.by_reference.insert(reference, name.to_string());
        reference
    }

    fn name(&self, reference: u32) -> Option<&str> {
        self.by_reference.get(&reference).map(String::as_str)
    }
}

/// Client lines may start at 0 or 1; debuggee lines always start at 0.
#[derive(Debug, Clone, Copy)]
struct CoordinateConverter {
    line_offset: u32,
    column_offset: u32,
}

impl CoordinateConverter {
    fn new(lines_start_at1: bool, columns_start_at1: bool) -> Self {
        Self {
            line_offset: if lines_start_at1 { 1 } else { 0 },
            column_offset: if columns_start_at1 { 1 } else { 0 },
        }
    }

    fn to_client_line(self, line: u32) -> u32 {
        line.saturating_add(self.line_offset)
    }

    fn to_debuggee_line(self, line: u32) -> Option<u32> {
        line.checked_sub(self.line_offset)
    }

    fn default_column(self) -> u32 {
        self.column_offset
    }
}

/// DAP bridge session: owns the debuggee connection, the spawned process in
/// launch mode, and every per-session table.
pub struct DebugAdapter {
    client: Option<Client>,
    debuggee: Option<Child>,
    incoming_tx: mpsc::Sender<Incoming>,
    incoming_rx: Option<mpsc::Receiver<Incoming>>,
    next_seq: Arc<AtomicU32>,
    coordinate: CoordinateConverter,
    state: SessionState,
    protocol: ProtocolVersion,
    stop_on_entry: bool,
    entry_pause_handled: bool,
    breakpoints: BreakpointManager,
    translator: SourcePathTranslator,
    handles: VariableHandles,
    virtual_sources: VirtualSources,
    sources: Box<dyn crate::breakpoints::SourceAccess>,
    metadata: Option<ConnectedParams>,
    terminated_sent: bool,
}

/// What one dispatched request produced.
#[derive(Debug, Default)]
struct DispatchOutcome {
    responses: Vec<Value>,
    events: Vec<Value>,
    should_exit: bool,
}

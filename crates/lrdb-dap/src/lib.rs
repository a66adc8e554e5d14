//! Debug Adapter Protocol (DAP) bridge for LRDB-compatible Lua debuggees.
//!
//! The adapter speaks Content-Length framed DAP over stdio to the IDE and
//! the line-delimited JSON debug protocol over TCP to the debuggee,
//! translating requests, breakpoints, source paths and variable references
//! between the two worlds.

mod adapter;
mod breakpoints;
mod launch;
mod paths;
mod protocol;

pub use adapter::DebugAdapter;
pub use breakpoints::{
    BreakpointManager, BreakpointRequest, FsSourceAccess, PlacedBreakpoint, SourceAccess,
};
pub use paths::{SourcePathTranslator, FILE_SENTINEL};
pub use protocol::{
    AttachArguments, Breakpoint, Capabilities, ContinueArguments,
    ContinueResponseBody, ContinuedEventBody, DisconnectArguments, EvaluateArguments,
    EvaluateResponseBody, Event, InitializeArguments, InitializeResponseBody, LaunchArguments,
    MessageType, NextArguments, OutputEventBody, PauseArguments, Request, Response, Scope,
    ScopesArguments, ScopesResponseBody, SetBreakpointsArguments, SetBreakpointsResponseBody,
    SetVariableArguments, SetVariableResponseBody, Source, SourceArguments, SourceBreakpoint,
    SourceResponseBody, StackFrame, StackTraceArguments, StackTraceResponseBody, StepInArguments,
    StepOutArguments, StoppedEventBody, TerminatedEventBody, Thread, ThreadsResponseBody,
    Variable, VariablesArguments, VariablesResponseBody,
};

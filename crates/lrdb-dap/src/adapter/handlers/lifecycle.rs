//! Launch/attach/disconnect handlers.

use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use serde_json::Value;

use crate::launch::{program_options, session_options_from_attach, session_options_from_launch};
use crate::paths::SourcePathTranslator;
use crate::protocol::{AttachArguments, DisconnectArguments, LaunchArguments, Request};

use super::super::{DebugAdapter, DispatchOutcome, Incoming, SessionState};

/// In launch mode the debuggee needs time to start its listener.
const LAUNCH_CONNECT_WINDOW: Duration = Duration::from_secs(5);
const ATTACH_CONNECT_WINDOW: Duration = Duration::from_secs(2);

impl DebugAdapter {
    pub(in crate::adapter) fn handle_launch(&mut self, request: Request<Value>) -> DispatchOutcome {
        if self.client.is_some() {
            return DispatchOutcome {
                responses: vec![self.error_response(&request, "session already started")],
                ..DispatchOutcome::default()
            };
        }
        let args = request
            .arguments
            .clone()
            .and_then(|value| serde_json::from_value::<LaunchArguments>(value).ok())
            .unwrap_or_default();
        let Some(program) = program_options(&args) else {
            return DispatchOutcome {
                responses: vec![self.error_response(&request, "launch requires a 'program'")],
                ..DispatchOutcome::default()
            };
        };
        let session = session_options_from_launch(&args);
        self.apply_session_options(&session.source_root, session.source_file_map.clone());
        self.stop_on_entry = session.stop_on_entry;

        let mut command = Command::new(&program.program);
        command
            .args(&program.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &program.cwd {
            command.current_dir(cwd);
        }
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                return DispatchOutcome {
                    responses: vec![self.error_response(
                        &request,
                        &format!("failed to start '{}': {err}", program.program),
                    )],
                    ..DispatchOutcome::default()
                };
            }
        };
        // The adapter owns stdout for the DAP stream, so the process pipes
        // are forwarded as output events instead.
        if let Some(stdout) = child.stdout.take() {
            self.forward_child_pipe(stdout, "stdout");
        }
        if let Some(stderr) = child.stderr.take() {
            self.forward_child_pipe(stderr, "stderr");
        }
        self.debuggee = Some(child);

        let mut events = vec![self.console_message(format!(
            "launching {} on {}:{}",
            program.program, session.host, session.port
        ))];
        if let Err(err) = self.connect_debuggee(&session.host, session.port, LAUNCH_CONNECT_WINDOW)
        {
            self.shutdown_debuggee();
            return DispatchOutcome {
                responses: vec![self.error_response(&request, &err.to_string())],
                events,
                ..DispatchOutcome::default()
            };
        }
        events.push(self.console_message("debuggee connected"));
        DispatchOutcome {
            responses: vec![self.ok_response::<Value>(&request, None)],
            events,
            should_exit: false,
        }
    }

    pub(in crate::adapter) fn handle_attach(&mut self, request: Request<Value>) -> DispatchOutcome {
        if self.client.is_some() {
            return DispatchOutcome {
                responses: vec![self.error_response(&request, "session already started")],
                ..DispatchOutcome::default()
            };
        }
        let args = request
            .arguments
            .clone()
            .and_then(|value| serde_json::from_value::<AttachArguments>(value).ok())
            .unwrap_or_default();
        let session = session_options_from_attach(&args);
        self.apply_session_options(&session.source_root, session.source_file_map.clone());
        self.stop_on_entry = session.stop_on_entry;

        if let Err(err) = self.connect_debuggee(&session.host, session.port, ATTACH_CONNECT_WINDOW)
        {
            return DispatchOutcome {
                responses: vec![self.error_response(&request, &err.to_string())],
                ..DispatchOutcome::default()
            };
        }
        DispatchOutcome {
            responses: vec![self.ok_response::<Value>(&request, None)],
            events: vec![self.console_message(format!(
                "attached to {}:{}",
                session.host, session.port
            ))],
            should_exit: false,
        }
    }

    pub(in crate::adapter) fn handle_disconnect(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        let _args = request
            .arguments
            .clone()
            .and_then(|value| serde_json::from_value::<DisconnectArguments>(value).ok())
            .unwrap_or_default();

        // An attached debuggee outlives the session; leave it running
        // instead of parked at a breakpoint.
        if self.debuggee.is_none() && self.state == SessionState::Paused {
            self.post("continue", None);
        }
        let mut events = self.terminate_events();
        self.shutdown_debuggee();
        events.push(self.console_message("session closed"));
        DispatchOutcome {
            responses: vec![self.ok_response::<Value>(&request, None)],
            events,
            should_exit: true,
        }
    }

    fn apply_session_options(
        &mut self,
        source_root: &std::path::Path,
        source_file_map: Vec<(std::path::PathBuf, std::path::PathBuf)>,
    ) {
        self.translator = SourcePathTranslator::new(source_root, source_file_map);
    }

    fn forward_child_pipe(&self, pipe: impl std::io::Read + Send + 'static, category: &'static str) {
        let incoming = self.incoming_tx.clone();
        thread::spawn(move || {
            let reader = BufReader::new(pipe);
            for line in reader.lines() {
                let Ok(line) = line else { break };
                if incoming
                    .send(Incoming::ChildOutput { line, category })
                    .is_err()
                {
                    break;
                }
            }
        });
    }
}

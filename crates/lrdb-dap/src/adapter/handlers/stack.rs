//! Threads/stackTrace/scopes/source handlers.

use serde_json::Value;

use crate::protocol::{
    Request, Scope, ScopesArguments, ScopesResponseBody, Source, SourceArguments,
    SourceResponseBody, StackFrame, StackTraceArguments, StackTraceResponseBody, Thread,
    ThreadsResponseBody,
};

use super::super::{DebugAdapter, DispatchOutcome, VariableHandle, THREAD_ID};

impl DebugAdapter {
    /// The debuggee exposes a single logical thread.
    pub(in crate::adapter) fn handle_threads(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        DispatchOutcome {
            responses: vec![self.ok_response(
                &request,
                Some(ThreadsResponseBody {
                    threads: vec![Thread {
                        id: THREAD_ID,
                        name: "main thread".to_string(),
                    }],
                }),
            )],
            ..DispatchOutcome::default()
        }
    }

    pub(in crate::adapter) fn handle_stack_trace(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        let args = request
            .arguments
            .clone()
            .and_then(|value| serde_json::from_value::<StackTraceArguments>(value).ok())
            .unwrap_or_default();

        let frames = match self.call_rpc("get_stacktrace", None) {
            Ok(Value::Array(frames)) => frames,
            Ok(_) => Vec::new(),
            Err(err) => {
                return DispatchOutcome {
                    responses: vec![self.error_response(&request, &err)],
                    ..DispatchOutcome::default()
                };
            }
        };

        let total = frames.len();
        let start = args.start_frame.unwrap_or(0) as usize;
        let levels = args.levels.map(|levels| levels as usize).unwrap_or(total);
        let end = total.min(start.saturating_add(levels));

        let mut stack_frames = Vec::new();
        for (index, frame) in frames.iter().enumerate().take(end).skip(start) {
            let file = frame.get("file").and_then(Value::as_str).unwrap_or("?");
            let name = frame
                .get("func")
                .and_then(Value::as_str)
                .unwrap_or("?")
                .to_string();
            let line = frame
                .get("line")
                .and_then(Value::as_u64)
                .and_then(|line| u32::try_from(line).ok())
                .unwrap_or(0);
            stack_frames.push(StackFrame {
                id: index as u32,
                name,
                source: Some(self.frame_source(file)),
                line: self.coordinate.to_client_line(line),
                column: self.coordinate.default_column(),
            });
        }

        DispatchOutcome {
            responses: vec![self.ok_response(
                &request,
                Some(StackTraceResponseBody {
                    stack_frames,
                    total_frames: Some(total as u32),
                }),
            )],
            ..DispatchOutcome::default()
        }
    }

    pub(in crate::adapter) fn handle_scopes(&mut self, request: Request<Value>) -> DispatchOutcome {
        let Some(args) = request
            .arguments
            .clone()
            .and_then(|value| serde_json::from_value::<ScopesArguments>(value).ok())
        else {
            return DispatchOutcome {
                responses: vec![self.error_response(&request, "invalid scopes args")],
                ..DispatchOutcome::default()
            };
        };
        let frame = args.frame_id;

        let scopes = vec![
            Scope {
                name: "Local".to_string(),
                variables_reference: self.handles.create(VariableHandle::Local { frame }),
                expensive: false,
            },
            Scope {
                name: "Upvalue".to_string(),
                variables_reference: self.handles.create(VariableHandle::Upvalue { frame }),
                expensive: false,
            },
            Scope {
                name: "Global".to_string(),
                variables_reference: self.handles.create(VariableHandle::Global),
                expensive: true,
            },
        ];

        DispatchOutcome {
            responses: vec![self.ok_response(&request, Some(ScopesResponseBody { scopes }))],
            ..DispatchOutcome::default()
        }
    }

    /// Serve the content of a virtual source, falling back to its chunk
    /// identifier when the debuggee cannot provide the text.
    pub(in crate::adapter) fn handle_source(&mut self, request: Request<Value>) -> DispatchOutcome {
        let Some(args) = request
            .arguments
            .clone()
            .and_then(|value| serde_json::from_value::<SourceArguments>(value).ok())
        else {
            return DispatchOutcome {
                responses: vec![self.error_response(&request, "invalid source args")],
                ..DispatchOutcome::default()
            };
        };
        let reference = if args.source_reference != 0 {
            args.source_reference
        } else {
            args.source
                .as_ref()
                .and_then(|source| source.source_reference)
                .unwrap_or(0)
        };
        let Some(name) = self.virtual_sources.name(reference).map(str::to_string) else {
            return DispatchOutcome {
                responses: vec![self.error_response(&request, "unknown source reference")],
                ..DispatchOutcome::default()
            };
        };

        let content = self
            .call_rpc("get_source", Some(serde_json::json!({ "file": name })))
            .ok()
            .and_then(|result| source_text(&result))
            .unwrap_or_else(|| name.clone());

        DispatchOutcome {
            responses: vec![self.ok_response(
                &request,
                Some(SourceResponseBody {
                    content,
                    mime_type: Some("text/x-lua".to_string()),
                }),
            )],
            ..DispatchOutcome::default()
        }
    }

    fn frame_source(&mut self, file: &str) -> Source {
        match self.translator.to_client(file) {
            Some(path) => Source {
                name: path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned()),
                path: Some(path.display().to_string()),
                source_reference: None,
            },
            None => Source {
                name: Some(file.to_string()),
                path: None,
                source_reference: Some(self.virtual_sources.intern(file)),
            },
        }
    }
}

fn source_text(result: &Value) -> Option<String> {
    match result {
        Value::String(text) => Some(text.clone()),
        Value::Object(map) => map.get("text").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

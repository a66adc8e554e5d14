//! setBreakpoints handler: validate against the file text, report back to
//! the IDE, and mirror the verified set onto the debuggee.

use std::path::PathBuf;

use serde_json::Value;

use crate::breakpoints::BreakpointRequest;
use crate::protocol::{
    Breakpoint, Request, SetBreakpointsArguments, SetBreakpointsResponseBody, Source,
};

use super::super::{DebugAdapter, DispatchOutcome};

impl DebugAdapter {
    pub(in crate::adapter) fn handle_set_breakpoints(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        let Some(args) = request
            .arguments
            .clone()
            .and_then(|value| serde_json::from_value::<SetBreakpointsArguments>(value).ok())
        else {
            return DispatchOutcome {
                responses: vec![self.error_response(&request, "invalid setBreakpoints args")],
                ..DispatchOutcome::default()
            };
        };
        let Some(path) = args.source.path.as_deref().map(PathBuf::from) else {
            return DispatchOutcome {
                responses: vec![self.error_response(&request, "source has no path")],
                ..DispatchOutcome::default()
            };
        };

        let requests = self.breakpoint_requests(&args);
        let text = self.sources.read(&path);
        let placed = self
            .breakpoints
            .replace_source(&path, requests, text.as_deref())
            .to_vec();

        // Wholesale replacement on the debuggee side as well.
        self.transmit_breakpoints(&path);

        let reported = placed
            .iter()
            .map(|bp| Breakpoint {
                id: Some(bp.id),
                verified: bp.verified,
                message: None,
                source: Some(Source {
                    name: file_name(&path),
                    path: Some(path.display().to_string()),
                    source_reference: None,
                }),
                line: Some(self.coordinate.to_client_line(bp.line)),
            })
            .collect();

        DispatchOutcome {
            responses: vec![self.ok_response(
                &request,
                Some(SetBreakpointsResponseBody {
                    breakpoints: reported,
                }),
            )],
            ..DispatchOutcome::default()
        }
    }

    /// Client lines become debuggee lines here; a line below the client
    /// base is dropped rather than wrapped.
    fn breakpoint_requests(&self, args: &SetBreakpointsArguments) -> Vec<BreakpointRequest> {
        if let Some(breakpoints) = &args.breakpoints {
            breakpoints
                .iter()
                .filter_map(|bp| {
                    Some(BreakpointRequest {
                        line: self.coordinate.to_debuggee_line(bp.line)?,
                        condition: bp.condition.clone(),
                        hit_condition: bp.hit_condition.clone(),
                    })
                })
                .collect()
        } else {
            args.lines
                .iter()
                .flatten()
                .filter_map(|line| {
                    Some(BreakpointRequest {
                        line: self.coordinate.to_debuggee_line(*line)?,
                        condition: None,
                        hit_condition: None,
                    })
                })
                .collect()
        }
    }
}

fn file_name(path: &std::path::Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

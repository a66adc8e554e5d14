//! Continue/pause/step handlers. All of these are fire-and-forget posts:
//! the resulting `running`/`paused` notification drives the session state,
//! not the request response.

use serde_json::Value;

use crate::protocol::{
    ContinueArguments, ContinueResponseBody, NextArguments, PauseArguments, Request,
    StepInArguments, StepOutArguments,
};

use super::super::{DebugAdapter, DispatchOutcome};

impl DebugAdapter {
    pub(in crate::adapter) fn handle_continue(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        let Some(_args) = request
            .arguments
            .clone()
            .and_then(|value| serde_json::from_value::<ContinueArguments>(value).ok())
        else {
            return DispatchOutcome {
                responses: vec![self.error_response(&request, "invalid continue args")],
                ..DispatchOutcome::default()
            };
        };

        self.post("continue", None);
        DispatchOutcome {
            responses: vec![self.ok_response(
                &request,
                Some(ContinueResponseBody {
                    all_threads_continued: Some(true),
                }),
            )],
            ..DispatchOutcome::default()
        }
    }

    pub(in crate::adapter) fn handle_pause(&mut self, request: Request<Value>) -> DispatchOutcome {
        let Some(_args) = request
            .arguments
            .clone()
            .and_then(|value| serde_json::from_value::<PauseArguments>(value).ok())
        else {
            return DispatchOutcome {
                responses: vec![self.error_response(&request, "invalid pause args")],
                ..DispatchOutcome::default()
            };
        };

        self.post("pause", None);
        DispatchOutcome {
            responses: vec![self.ok_response::<Value>(&request, None)],
            ..DispatchOutcome::default()
        }
    }

    pub(in crate::adapter) fn handle_next(&mut self, request: Request<Value>) -> DispatchOutcome {
        let Some(_args) = request
            .arguments
            .clone()
            .and_then(|value| serde_json::from_value::<NextArguments>(value).ok())
        else {
            return DispatchOutcome {
                responses: vec![self.error_response(&request, "invalid next args")],
                ..DispatchOutcome::default()
            };
        };

        self.post("step", None);
        DispatchOutcome {
            responses: vec![self.ok_response::<Value>(&request, None)],
            ..DispatchOutcome::default()
        }
    }

    pub(in crate::adapter) fn handle_step_in(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        let Some(_args) = request
            .arguments
            .clone()
            .and_then(|value| serde_json::from_value::<StepInArguments>(value).ok())
        else {
            return DispatchOutcome {
                responses: vec![self.error_response(&request, "invalid stepIn args")],
                ..DispatchOutcome::default()
            };
        };

        self.post("step_in", None);
        DispatchOutcome {
            responses: vec![self.ok_response::<Value>(&request, None)],
            ..DispatchOutcome::default()
        }
    }

    pub(in crate::adapter) fn handle_step_out(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        let Some(_args) = request
            .arguments
            .clone()
            .and_then(|value| serde_json::from_value::<StepOutArguments>(value).ok())
        else {
            return DispatchOutcome {
                responses: vec![self.error_response(&request, "invalid stepOut args")],
                ..DispatchOutcome::default()
            };
        };

        self.post("step_out", None);
        DispatchOutcome {
            responses: vec![self.ok_response::<Value>(&request, None)],
            ..DispatchOutcome::default()
        }
    }
}

//! Initialize/configurationDone handlers.

use serde_json::Value;

use crate::protocol::{
    Capabilities, InitializeArguments, InitializeResponseBody, Request,
};

use super::super::{CoordinateConverter, DebugAdapter, DispatchOutcome};

impl DebugAdapter {
    /// Breakpoints can be accepted at any time, so readiness is announced
    /// immediately; the client ends the configuration sequence with
    /// `configurationDone`.
    pub(in crate::adapter) fn handle_initialize(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        let args = request
            .arguments
            .clone()
            .and_then(|value| serde_json::from_value::<InitializeArguments>(value).ok())
            .unwrap_or_default();

        self.coordinate = CoordinateConverter::new(
            args.lines_start_at1.unwrap_or(true),
            args.columns_start_at1.unwrap_or(true),
        );

        let capabilities = Capabilities {
            supports_configuration_done_request: Some(true),
            supports_conditional_breakpoints: Some(true),
            supports_hit_conditional_breakpoints: Some(true),
            supports_evaluate_for_hovers: Some(true),
            supports_set_variable: Some(true),
            supports_pause_request: Some(true),
        };

        let response = self.ok_response(&request, Some(InitializeResponseBody { capabilities }));
        let initialized_event = self.event("initialized", Option::<Value>::None);

        DispatchOutcome {
            responses: vec![response],
            events: vec![initialized_event],
            should_exit: false,
        }
    }

    pub(in crate::adapter) fn handle_configuration_done(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        DispatchOutcome {
            responses: vec![self.ok_response::<Value>(&request, None)],
            ..DispatchOutcome::default()
        }
    }
}

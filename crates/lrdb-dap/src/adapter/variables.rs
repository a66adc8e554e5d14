//! Variable expansion, assignment, and expression evaluation.
//!
//! Composite values have no stable identity across the wire, so every
//! expandable node is re-derived on demand: scope roots through their
//! dedicated fetch requests, nested composites through an indexing
//! expression evaluated in the owning frame.

use serde_json::{json, Value};

use lrdb_client::value::{decode, display, type_name, DebuggeeValue};

use crate::protocol::{
    EvaluateArguments, EvaluateResponseBody, Request, SetVariableArguments,
    SetVariableResponseBody, Variable, VariablesArguments, VariablesResponseBody,
};

use super::{DebugAdapter, DispatchOutcome, EvalScope, VariableHandle};

impl DebugAdapter {
    pub(in crate::adapter) fn handle_variables(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        let Some(args) = request
            .arguments
            .clone()
            .and_then(|value| serde_json::from_value::<VariablesArguments>(value).ok())
        else {
            return DispatchOutcome {
                responses: vec![self.error_response(&request, "invalid variables args")],
                ..DispatchOutcome::default()
            };
        };
        let Some(handle) = self.handles.get(args.variables_reference).cloned() else {
            return DispatchOutcome {
                responses: vec![self.error_response(&request, "unknown variablesReference")],
                ..DispatchOutcome::default()
            };
        };

        let fetched = match &handle {
            VariableHandle::Local { frame } => {
                self.call_rpc("get_local_variable", Some(json!({ "stack_no": frame })))
            }
            VariableHandle::Upvalue { frame } => {
                self.call_rpc("get_upvalues", Some(json!({ "stack_no": frame })))
            }
            VariableHandle::Global => self.call_rpc("get_global", None),
            VariableHandle::Eval {
                frame,
                expression,
                scope,
            } => self
                .eval_expression(*frame, expression, *scope)
                .map(|value| value.unwrap_or(Value::Null)),
        };
        let wire = match fetched {
            Ok(wire) => wire,
            Err(err) => {
                return DispatchOutcome {
                    responses: vec![self.error_response(&request, &err)],
                    ..DispatchOutcome::default()
                };
            }
        };

        let decoded = decode(&wire, self.protocol);
        let variables = self.expand_entries(&handle, &decoded);
        DispatchOutcome {
            responses: vec![self.ok_response(&request, Some(VariablesResponseBody { variables }))],
            ..DispatchOutcome::default()
        }
    }

    pub(in crate::adapter) fn handle_set_variable(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        let Some(args) = request
            .arguments
            .clone()
            .and_then(|value| serde_json::from_value::<SetVariableArguments>(value).ok())
        else {
            return DispatchOutcome {
                responses: vec![self.error_response(&request, "invalid setVariable args")],
                ..DispatchOutcome::default()
            };
        };
        let Some(handle) = self.handles.get(args.variables_reference).cloned() else {
            return DispatchOutcome {
                responses: vec![self.error_response(&request, "unknown variablesReference")],
                ..DispatchOutcome::default()
            };
        };

        let value = coerce_value(&args.value);
        let result = match &handle {
            VariableHandle::Local { frame } => self.call_rpc(
                "set_local_variable",
                Some(json!({ "stack_no": frame, "name": args.name, "value": value })),
            ),
            VariableHandle::Upvalue { frame } => self.call_rpc(
                "set_upvalue",
                Some(json!({ "stack_no": frame, "name": args.name, "value": value })),
            ),
            VariableHandle::Global => self.call_rpc(
                "set_global",
                Some(json!({ "name": args.name, "value": value })),
            ),
            VariableHandle::Eval { .. } => {
                Err("only scope-level variables can be modified".to_string())
            }
        };
        if let Err(err) = result {
            return DispatchOutcome {
                responses: vec![self.error_response(&request, &err)],
                ..DispatchOutcome::default()
            };
        }

        let decoded = decode(&value, self.protocol);
        DispatchOutcome {
            responses: vec![self.ok_response(
                &request,
                Some(SetVariableResponseBody {
                    value: display(&decoded),
                    r#type: Some(type_name(&decoded).to_string()),
                    variables_reference: 0,
                }),
            )],
            ..DispatchOutcome::default()
        }
    }

    pub(in crate::adapter) fn handle_evaluate(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        let Some(args) = request
            .arguments
            .clone()
            .and_then(|value| serde_json::from_value::<EvaluateArguments>(value).ok())
        else {
            return DispatchOutcome {
                responses: vec![self.error_response(&request, "invalid evaluate args")],
                ..DispatchOutcome::default()
            };
        };

        // A leading backtick bypasses evaluation: the rest of the line goes
        // to the debuggee's console verbatim.
        if let Some(raw) = args.expression.strip_prefix('`') {
            self.post("console_input", Some(json!({ "text": raw })));
            return DispatchOutcome {
                responses: vec![self.ok_response(
                    &request,
                    Some(EvaluateResponseBody {
                        result: String::new(),
                        r#type: None,
                        variables_reference: 0,
                    }),
                )],
                ..DispatchOutcome::default()
            };
        }

        let frame = args.frame_id.unwrap_or(0);
        let expression = args.expression.trim().to_string();
        let first = match self.eval_expression(frame, &expression, EvalScope::default()) {
            Ok(first) => first,
            Err(err) => {
                return DispatchOutcome {
                    responses: vec![self.error_response(&request, &err)],
                    ..DispatchOutcome::default()
                };
            }
        };
        let Some(wire) = first else {
            return DispatchOutcome {
                responses: vec![self.error_response(&request, "expression produced no value")],
                ..DispatchOutcome::default()
            };
        };

        let decoded = decode(&wire, self.protocol);
        let reference = if decoded.is_composite() {
            self.handles.create(VariableHandle::Eval {
                frame,
                expression,
                scope: EvalScope::default(),
            })
        } else {
            0
        };
        DispatchOutcome {
            responses: vec![self.ok_response(
                &request,
                Some(EvaluateResponseBody {
                    result: display(&decoded),
                    r#type: Some(type_name(&decoded).to_string()),
                    variables_reference: reference,
                }),
            )],
            ..DispatchOutcome::default()
        }
    }

    /// Run `return <expression>` in `frame` and return the first value of
    /// the result list, if any.
    fn eval_expression(
        &self,
        frame: u32,
        expression: &str,
        scope: EvalScope,
    ) -> Result<Option<Value>, String> {
        let mut param = json!({
            "stack_no": frame,
            "chunk": format!("return {expression}"),
        });
        if let Some(global) = scope.global {
            param["global"] = Value::Bool(global);
        }
        if let Some(local) = scope.local {
            param["local"] = Value::Bool(local);
        }
        if let Some(upvalue) = scope.upvalue {
            param["upvalue"] = Value::Bool(upvalue);
        }
        let result = self.call_rpc("eval", Some(param))?;
        match result {
            Value::Array(values) => Ok(values.into_iter().next()),
            Value::Null => Ok(None),
            other => Ok(Some(other)),
        }
    }

    /// Turn the entries of a decoded composite into DAP variables, minting
    /// an eval handle for every expandable child.
    fn expand_entries(
        &mut self,
        parent: &VariableHandle,
        decoded: &DebuggeeValue,
    ) -> Vec<Variable> {
        decoded
            .entries()
            .into_iter()
            .map(|(key, value)| {
                let reference = if value.is_composite() {
                    let (frame, expression, scope) = self.child_locator(parent, &key);
                    self.handles.create(VariableHandle::Eval {
                        frame,
                        expression,
                        scope,
                    })
                } else {
                    0
                };
                Variable {
                    name: key,
                    value: display(value),
                    r#type: Some(type_name(value).to_string()),
                    variables_reference: reference,
                    evaluate_name: None,
                }
            })
            .collect()
    }

    /// Indexing expression that re-derives a child on the debuggee, plus the
    /// scope flags it must be evaluated under.
    fn child_locator(&self, parent: &VariableHandle, key: &str) -> (u32, String, EvalScope) {
        match parent {
            VariableHandle::Local { frame } => (
                *frame,
                format!("_ENV{}", index_accessor(key)),
                EvalScope::local(),
            ),
            VariableHandle::Upvalue { frame } => (
                *frame,
                format!("_ENV{}", index_accessor(key)),
                EvalScope::upvalue(),
            ),
            VariableHandle::Global => {
                (0, format!("_G{}", index_accessor(key)), EvalScope::default())
            }
            VariableHandle::Eval {
                frame,
                expression,
                scope,
            } => (*frame, format!("{expression}{}", index_accessor(key)), *scope),
        }
    }
}

/// `[n]` for integer keys, `["..."]` with JSON escaping for everything else.
fn index_accessor(key: &str) -> String {
    if key.parse::<i64>().is_ok() {
        format!("[{key}]")
    } else {
        format!(
            "[{}]",
            serde_json::to_string(key).unwrap_or_else(|_| "\"\"".to_string())
        )
    }
}

/// Interpret IDE-entered text: JSON literals (numbers, booleans, null,
/// quoted strings) pass through typed; anything else is a plain string.
fn coerce_value(text: &str) -> Value {
    let trimmed = text.trim();
    if trimmed == "nil" {
        return Value::Null;
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}

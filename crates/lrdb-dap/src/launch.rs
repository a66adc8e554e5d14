//! Typed views over the free-form launch/attach argument maps.

use std::path::PathBuf;

use serde_json::Value;

use crate::protocol::{AttachArguments, LaunchArguments};

const DEFAULT_PORT: u16 = 21110;
const DEFAULT_HOST: &str = "localhost";

/// Options shared by launch and attach sessions.
#[derive(Debug, Clone)]
pub(crate) struct SessionOptions {
    pub host: String,
    pub port: u16,
    pub stop_on_entry: bool,
    pub source_root: PathBuf,
    pub source_file_map: Vec<(PathBuf, PathBuf)>,
}

/// Launch-only process description.
#[derive(Debug, Clone)]
pub(crate) struct ProgramOptions {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

pub(crate) fn session_options_from_launch(args: &LaunchArguments) -> SessionOptions {
    session_options(&args.additional)
}

pub(crate) fn session_options_from_attach(args: &AttachArguments) -> SessionOptions {
    session_options(&args.additional)
}

pub(crate) fn program_options(args: &LaunchArguments) -> Option<ProgramOptions> {
    let program = text_field(&args.additional, "program")?;
    let arguments = args
        .additional
        .get("args")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let cwd = text_field(&args.additional, "cwd").map(PathBuf::from);
    Some(ProgramOptions {
        program,
        args: arguments,
        cwd,
    })
}

fn session_options(fields: &std::collections::BTreeMap<String, Value>) -> SessionOptions {
    let host = text_field(fields, "host").unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = fields
        .get("port")
        .and_then(Value::as_u64)
        .and_then(|port| u16::try_from(port).ok())
        .unwrap_or(DEFAULT_PORT);
    let stop_on_entry = fields
        .get("stopOnEntry")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let source_root = text_field(fields, "sourceRoot")
        .or_else(|| text_field(fields, "cwd"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    SessionOptions {
        host,
        port,
        stop_on_entry,
        source_root,
        source_file_map: source_file_map(fields),
    }
}

/// `sourceFileMap` is an ordered array of `{ "local": ..., "remote": ... }`
/// entries; order is significant, so an array is used instead of an object.
fn source_file_map(fields: &std::collections::BTreeMap<String, Value>) -> Vec<(PathBuf, PathBuf)> {
    let Some(entries) = fields.get("sourceFileMap").and_then(Value::as_array) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let local = entry.get("local")?.as_str()?;
            let remote = entry.get("remote")?.as_str()?;
            Some((PathBuf::from(local), PathBuf::from(remote)))
        })
        .collect()
}

fn text_field(fields: &std::collections::BTreeMap<String, Value>, name: &str) -> Option<String> {
    fields.get(name).and_then(Value::as_str).map(str::to_string)
}

//! DAP request handlers by area.
//! - initialize: capabilities + configuration sequence
//! - lifecycle: launch/attach/disconnect
//! - breakpoints: setBreakpoints validation and transmission
//! - run_control: continue/pause/step commands
//! - stack: threads/stackTrace/scopes/source

mod breakpoints;
mod initialize;
mod lifecycle;
mod run_control;
mod stack;

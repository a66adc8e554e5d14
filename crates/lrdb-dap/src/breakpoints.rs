//! Per-source breakpoint bookkeeping.
//!
//! The IDE replaces breakpoints for a source wholesale on every set request.
//! Requested lines are validated against the file text first: a line that is
//! blank or holds only a `--` comment cannot trap, so the breakpoint slides
//! forward to the next line that can. Lines here are debugger-indexed
//! (0-based); the session layer converts to and from client numbering.
//! Breakpoint ids are never reused within a session.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// First id handed out; leaves low numbers free for IDE-side markers.
const FIRST_BREAKPOINT_ID: u32 = 1000;

/// Read seam for breakpoint validation, so tests can inject file content.
pub trait SourceAccess: Send {
    fn read(&self, path: &Path) -> Option<String>;
}

/// Production source access backed by the local filesystem.
#[derive(Debug, Default)]
pub struct FsSourceAccess;

impl SourceAccess for FsSourceAccess {
    fn read(&self, path: &Path) -> Option<String> {
        std::fs::read_to_string(path).ok()
    }
}

/// A breakpoint as the IDE requested it and as it was actually planted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedBreakpoint {
    pub id: u32,
    /// Line the IDE asked for, 0-based.
    pub requested_line: u32,
    /// Line the breakpoint actually landed on after validation, 0-based.
    pub line: u32,
    pub condition: Option<String>,
    pub hit_condition: Option<String>,
    pub verified: bool,
}

#[derive(Debug, Default)]
struct SourceBreakpoints {
    placed: Vec<PlacedBreakpoint>,
}

/// Session-wide breakpoint table keyed by IDE source path.
#[derive(Debug)]
pub struct BreakpointManager {
    by_source: HashMap<PathBuf, SourceBreakpoints>,
    next_id: u32,
}

impl Default for BreakpointManager {
    fn default() -> Self {
        Self {
            by_source: HashMap::new(),
            next_id: FIRST_BREAKPOINT_ID,
        }
    }
}

impl BreakpointManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every breakpoint registered for `source`. The returned slice
    /// preserves request order.
    pub fn replace_source(
        &mut self,
        source: &Path,
        requests: Vec<BreakpointRequest>,
        text: Option<&str>,
    ) -> &[PlacedBreakpoint] {
        let lines: Option<Vec<&str>> = text.map(|text| text.lines().collect());
        let mut placed = Vec::with_capacity(requests.len());
        for request in requests {
            let (line, verified) = match &lines {
                Some(lines) => match slide_to_stoppable(lines, request.line) {
                    Some(line) => (line, true),
                    None => (request.line, false),
                },
                // Without the file text nothing can be validated; trust the
                // request and let the debuggee decide.
                None => (request.line, true),
            };
            placed.push(PlacedBreakpoint {
                id: self.next_id,
                requested_line: request.line,
                line,
                condition: request.condition,
                hit_condition: request.hit_condition,
                verified,
            });
            self.next_id += 1;
        }
        let entry = self.by_source.entry(source.to_path_buf()).or_default();
        entry.placed = placed;
        &entry.placed
    }

    pub fn for_source(&self, source: &Path) -> &[PlacedBreakpoint] {
        self.by_source
            .get(source)
            .map(|entry| entry.placed.as_slice())
            .unwrap_or(&[])
    }

    /// All sources currently holding breakpoints, for resending after a
    /// reconnect or late handshake.
    pub fn sources(&self) -> Vec<PathBuf> {
        self.by_source.keys().cloned().collect()
    }
}

/// A single line the IDE wants a breakpoint on, 0-based.
#[derive(Debug, Clone)]
pub struct BreakpointRequest {
    pub line: u32,
    pub condition: Option<String>,
    pub hit_condition: Option<String>,
}

/// Slide `requested` (0-based) forward past blank and comment-only lines.
/// Returns `None` when the request is out of range or no stoppable line
/// exists at or below it.
fn slide_to_stoppable(lines: &[&str], requested: u32) -> Option<u32> {
    let start = requested as usize;
    for (offset, line) in lines.get(start..)?.iter().enumerate() {
        let trimmed = line.trim();
        if !trimmed.is_empty() && !trimmed.starts_with("--") {
            return Some(requested + offset as u32);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(line: u32) -> BreakpointRequest {
        BreakpointRequest {
            line,
            condition: None,
            hit_condition: None,
        }
    }

    const SCRIPT: &str = "\
local counter = 0

-- advance the counter
local function tick()
    counter = counter + 1
end

tick()
";

    #[test]
    fn breakpoint_on_blank_line_slides_to_next_code_line() {
        let mut manager = BreakpointManager::new();
        let placed = manager.replace_source(
            Path::new("/proj/main.lua"),
            vec![request(1), request(2)],
            Some(SCRIPT),
        );
        // Line 1 is blank and line 2 is a comment; both land on line 3.
        assert_eq!(placed[0].line, 3);
        assert_eq!(placed[0].requested_line, 1);
        assert!(placed[0].verified);
        assert_eq!(placed[1].line, 3);
    }

    #[test]
    fn leading_blank_and_comment_lines_skip_to_first_statement() {
        let mut manager = BreakpointManager::new();
        let placed = manager.replace_source(
            Path::new("/proj/tiny.lua"),
            vec![request(0)],
            Some("\n-- comment\nx = 1\n"),
        );
        assert!(placed[0].verified);
        assert_eq!(placed[0].line, 2);
    }

    #[test]
    fn breakpoint_past_last_code_line_is_unverified() {
        let mut manager = BreakpointManager::new();
        let placed = manager.replace_source(
            Path::new("/proj/main.lua"),
            vec![request(40)],
            Some(SCRIPT),
        );
        assert!(!placed[0].verified);
        assert_eq!(placed[0].line, 40);
    }

    #[test]
    fn replacement_is_wholesale_per_source() {
        let mut manager = BreakpointManager::new();
        let source = Path::new("/proj/main.lua");
        manager.replace_source(source, vec![request(0), request(3)], Some(SCRIPT));
        manager.replace_source(source, vec![request(7)], Some(SCRIPT));
        let placed = manager.for_source(source);
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].line, 7);
    }

    #[test]
    fn ids_are_unique_across_sources_and_replacements() {
        let mut manager = BreakpointManager::new();
        let first = manager
            .replace_source(Path::new("/a.lua"), vec![request(0)], Some(SCRIPT))
            .to_vec();
        let second = manager
            .replace_source(Path::new("/b.lua"), vec![request(0)], Some(SCRIPT))
            .to_vec();
        let third = manager
            .replace_source(Path::new("/a.lua"), vec![request(0)], Some(SCRIPT))
            .to_vec();
        assert_eq!(first[0].id, 1000);
        assert_eq!(second[0].id, 1001);
        assert_eq!(third[0].id, 1002);
    }

    #[test]
    fn conditions_survive_validation() {
        let mut manager = BreakpointManager::new();
        let placed = manager.replace_source(
            Path::new("/proj/main.lua"),
            vec![BreakpointRequest {
                line: 4,
                condition: Some("counter > 3".to_string()),
                hit_condition: Some("2".to_string()),
            }],
            Some(SCRIPT),
        );
        assert_eq!(placed[0].condition.as_deref(), Some("counter > 3"));
        assert_eq!(placed[0].hit_condition.as_deref(), Some("2"));
    }

    #[test]
    fn missing_file_text_trusts_the_request() {
        let mut manager = BreakpointManager::new();
        let placed = manager.replace_source(Path::new("/gone.lua"), vec![request(7)], None);
        assert!(placed[0].verified);
        assert_eq!(placed[0].line, 7);
    }
}

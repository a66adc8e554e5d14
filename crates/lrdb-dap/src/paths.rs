//! Bidirectional IDE <-> debuggee source path translation.
//!
//! The debuggee names real files with a leading `@`, the Lua chunk-name
//! convention; an identifier without the sentinel is a virtual source that
//! must be fetched by content instead of by path. Translation is driven by
//! a source root plus an ordered list of prefix remaps.

use std::path::{Path, PathBuf};

/// Chunk-name sentinel marking a debuggee identifier that names a real file.
pub const FILE_SENTINEL: char = '@';

#[derive(Debug, Clone)]
pub struct SourcePathTranslator {
    root: PathBuf,
    remaps: Vec<(PathBuf, PathBuf)>,
}

impl SourcePathTranslator {
    /// `remaps` is an ordered list of `(local_prefix, remote_prefix)` pairs;
    /// the first matching prefix wins, so configured order must be
    /// preserved by the caller.
    pub fn new(root: impl Into<PathBuf>, remaps: Vec<(PathBuf, PathBuf)>) -> Self {
        Self {
            root: root.into(),
            remaps,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Translate an IDE-visible path into a debuggee identifier (without the
    /// sentinel). A remap applies only when the path is a descendant of its
    /// local prefix; otherwise the path falls back to root-relative form.
    pub fn to_debuggee(&self, client_path: &Path) -> String {
        for (local, remote) in &self.remaps {
            if let Ok(relative) = client_path.strip_prefix(local) {
                return path_text(&remote.join(relative));
            }
        }
        match client_path.strip_prefix(&self.root) {
            Ok(relative) => path_text(relative),
            Err(_) => path_text(client_path),
        }
    }

    /// Translate a debuggee identifier back into an IDE-visible path.
    /// Returns `None` for virtual sources (no `@` sentinel); those are
    /// served by source reference instead.
    pub fn to_client(&self, debuggee_path: &str) -> Option<PathBuf> {
        let real = debuggee_path.strip_prefix(FILE_SENTINEL)?;
        let real = Path::new(real);
        for (local, remote) in &self.remaps {
            if let Ok(relative) = real.strip_prefix(remote) {
                return Some(local.join(relative));
            }
        }
        if real.is_absolute() {
            return Some(real.to_path_buf());
        }
        Some(self.root.join(real))
    }
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translator() -> SourcePathTranslator {
        SourcePathTranslator::new(
            "/home/dev/project",
            vec![
                (
                    PathBuf::from("/home/dev/project/addons/tracker/lua"),
                    PathBuf::from("addons/tracker/lua"),
                ),
                (
                    PathBuf::from("/home/dev/shared"),
                    PathBuf::from("lua/shared"),
                ),
            ],
        )
    }

    #[test]
    fn remap_round_trip_restores_original_path() {
        let translator = translator();
        let client = Path::new("/home/dev/shared/util/math.lua");
        let remote = translator.to_debuggee(client);
        assert_eq!(remote, "lua/shared/util/math.lua");
        let back = translator.to_client(&format!("{FILE_SENTINEL}{remote}"));
        assert_eq!(back.as_deref(), Some(client));
    }

    #[test]
    fn first_matching_remap_wins() {
        let translator = translator();
        let client = Path::new("/home/dev/project/addons/tracker/lua/init.lua");
        assert_eq!(translator.to_debuggee(client), "addons/tracker/lua/init.lua");
    }

    #[test]
    fn unmatched_path_falls_back_to_source_root() {
        let translator = translator();
        let client = Path::new("/home/dev/project/main.lua");
        assert_eq!(translator.to_debuggee(client), "main.lua");
        assert_eq!(
            translator.to_client("@main.lua").as_deref(),
            Some(Path::new("/home/dev/project/main.lua"))
        );
    }

    #[test]
    fn sibling_of_local_prefix_does_not_match_the_remap() {
        let translator = translator();
        // Not a descendant of any remap prefix, only of the root.
        let client = Path::new("/home/dev/project/addons/other/init.lua");
        assert_eq!(translator.to_debuggee(client), "addons/other/init.lua");
    }

    #[test]
    fn absolute_debuggee_path_without_remap_is_returned_as_is() {
        let translator = translator();
        assert_eq!(
            translator.to_client("@/opt/engine/boot.lua").as_deref(),
            Some(Path::new("/opt/engine/boot.lua"))
        );
    }

    #[test]
    fn virtual_source_yields_none() {
        let translator = translator();
        assert_eq!(translator.to_client("=[C] stack trace"), None);
        assert_eq!(translator.to_client("loadstring chunk"), None);
    }
}

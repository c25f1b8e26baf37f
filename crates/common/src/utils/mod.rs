use std::path::{Path, PathBuf};

/// Cut `text` to at most `max_chars` characters, marking the cut. Works on
/// char boundaries so multi-byte text never splits mid-codepoint.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    const MARKER: &str = "...[truncated]";
    let keep = max_chars.saturating_sub(MARKER.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(MARKER);
    out
}

pub fn resolve_path(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

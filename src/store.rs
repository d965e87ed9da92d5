use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::parser::post::Post;

/// Pretty-printed JSON array, two-space indent.
pub fn render(posts: &[Post]) -> Result<String> {
    serde_json::to_string_pretty(posts).context("Failed to serialize posts")
}

/// Previously published posts, or nothing if the file is missing or unreadable.
pub fn load(path: &Path) -> Vec<Post> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!("Could not read {}: {}", path.display(), e);
            return Vec::new();
        }
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        warn!("Ignoring malformed {}: {}", path.display(), e);
        Vec::new()
    })
}

/// Write `posts` to `path` if the rendered JSON differs from what is there.
/// Returns whether the file was written.
pub fn write_if_changed(path: &Path, posts: &[Post]) -> Result<bool> {
    let rendered = render(posts)?;

    if let Ok(existing) = std::fs::read_to_string(path) {
        if existing == rendered {
            info!("{} is up to date", path.display());
            return Ok(false);
        }
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, rendered).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("{} updated ({} posts)", path.display(), posts.len());
    Ok(true)
}

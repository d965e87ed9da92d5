//! Runtime configuration for the `sync` pipeline.
//!
//! Everything is resolved once from CLI flags (with environment fallbacks) and
//! then passed down, so no module reads the environment on its own.

use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::git::GitIdentity;
use crate::parser::ParseOptions;
use crate::schedule::Gating;

pub const DEFAULT_DB_PATH: &str = "data/docpress.sqlite";
pub const DEFAULT_OUTPUT: &str = "blog/posts.json";
pub const DEFAULT_IMAGES_DIR: &str = "blog/images";
pub const DEFAULT_IMAGE_PREFIX: &str = "/images";

/// New documents are left alone for 5 minutes after creation.
pub const NEW_DOC_COOLDOWN_MS: i64 = 300_000;
/// Documents touched in the last 3 minutes are probably still being edited.
pub const RECENT_EDIT_MS: i64 = 180_000;

pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_GIT_NAME: &str = "docpress-bot";
pub const DEFAULT_GIT_EMAIL: &str = "docpress-bot@users.noreply.github.com";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub folder_id: String,
    pub access_token: String,
    pub output: PathBuf,
    pub images_dir: PathBuf,
    pub image_prefix: String,
    pub gating: Gating,
    pub concurrency: usize,
    pub parse: ParseOptions,
    pub publish: bool,
    pub git: GitIdentity,
}

impl SyncConfig {
    /// Reject settings the pipeline cannot run with.
    pub fn validate(self) -> Result<Self> {
        if self.folder_id.trim().is_empty() {
            bail!("folder id cannot be empty");
        }
        if self.access_token.trim().is_empty() {
            bail!("access token cannot be empty (set DOCPRESS_ACCESS_TOKEN)");
        }
        if self.concurrency == 0 {
            bail!("concurrency must be at least 1");
        }
        if self.gating.new_doc_cooldown_ms < 0 || self.gating.recent_edit_ms < 0 {
            bail!("eligibility windows cannot be negative");
        }
        Ok(self)
    }

    /// Public URL for a stored image file.
    pub fn image_url(&self, file_name: &str) -> String {
        format!("{}/{}", self.image_prefix.trim_end_matches('/'), file_name)
    }
}

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::{NEW_DOC_COOLDOWN_MS, RECENT_EDIT_MS};
use crate::db::{self, AttemptRow, Outcome};
use crate::drive::DocumentStore;
use crate::parser::post::{DriveFile, Post};
use crate::parser::{self, ParseOptions};

/// Time windows that keep half-written documents out of a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gating {
    pub new_doc_cooldown_ms: i64,
    pub recent_edit_ms: i64,
}

impl Default for Gating {
    fn default() -> Self {
        Self {
            new_doc_cooldown_ms: NEW_DOC_COOLDOWN_MS,
            recent_edit_ms: RECENT_EDIT_MS,
        }
    }
}

impl Gating {
    /// A file is eligible once it is older than the cool-down and has not
    /// been modified recently. Files with unreadable timestamps are not.
    pub fn is_eligible(&self, file: &DriveFile, now: DateTime<Utc>) -> bool {
        let (Some(created), Some(modified)) = (
            parse_time(file.created_time.as_deref()),
            parse_time(file.modified_time.as_deref()),
        ) else {
            warn!("Skipping {} ({}): missing or invalid timestamps", file.name, file.id);
            return false;
        };

        if (now - created).num_milliseconds() < self.new_doc_cooldown_ms {
            debug!("{} is too new", file.id);
            return false;
        }
        if (now - modified).num_milliseconds() < self.recent_edit_ms {
            debug!("{} was edited recently", file.id);
            return false;
        }
        true
    }
}

fn parse_time(ts: Option<&str>) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts?)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Results of one fetch round.
#[derive(Debug, Default)]
pub struct Collected {
    pub posts: HashMap<String, Post>,
    pub ok: usize,
    pub changed: usize,
    pub errors: usize,
}

struct Fetched {
    file: DriveFile,
    result: Result<Option<Post>>,
    latency_ms: i64,
}

/// Fetch and parse `files` concurrently, recording every attempt in the
/// ledger as it completes.
pub async fn collect_posts<S: DocumentStore>(
    conn: &Connection,
    store: Arc<S>,
    files: Vec<DriveFile>,
    concurrency: usize,
    options: ParseOptions,
) -> Result<Collected> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let (tx, mut rx) = tokio::sync::mpsc::channel::<Fetched>(concurrency.max(1) * 2);

    for file in files {
        let store = Arc::clone(&store);
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();

        tokio::spawn(async move {
            let Ok(_permit) = sem.acquire_owned().await else {
                return;
            };
            let start = Instant::now();
            let result = fetch_one(&*store, &file, options).await;
            let latency_ms = start.elapsed().as_millis() as i64;
            let _ = tx
                .send(Fetched {
                    file,
                    result,
                    latency_ms,
                })
                .await;
        });
    }

    // rx closes once every task has sent and dropped its sender
    drop(tx);

    let mut collected = Collected::default();
    while let Some(fetched) = rx.recv().await {
        let Fetched {
            file,
            result,
            latency_ms,
        } = fetched;

        let (outcome, error) = match result {
            Ok(Some(post)) => {
                collected.ok += 1;
                collected.posts.insert(file.id.clone(), post);
                (Outcome::Ok, None)
            }
            Ok(None) => {
                info!("Skipped {} ({}): changed during extraction", file.name, file.id);
                collected.changed += 1;
                (Outcome::Changed, None)
            }
            Err(e) => {
                warn!("Failed parsing {} ({}): {:#}", file.name, file.id, e);
                collected.errors += 1;
                (Outcome::Error, Some(format!("{e:#}")))
            }
        };

        db::record_attempt(
            conn,
            &AttemptRow {
                file_id: file.id,
                name: file.name,
                version: file.version,
                outcome,
                error,
                latency_ms: Some(latency_ms),
            },
        )?;
    }

    Ok(collected)
}

/// Fetch one document, parse it, then confirm its version did not move.
/// `Ok(None)` means the document changed while it was being read.
async fn fetch_one<S: DocumentStore>(
    store: &S,
    file: &DriveFile,
    options: ParseOptions,
) -> Result<Option<Post>> {
    let before = file.version.as_deref();
    let doc = store.get_document(&file.id).await?;
    let post = parser::parse_document(&doc, file, options)
        .with_context(|| format!("Document {} is malformed", file.id))?;

    let current = store.get_file_version(&file.id).await?;
    if current.as_deref() != before {
        return Ok(None);
    }
    Ok(Some(post))
}

/// Final post list in folder order: fresh results where available, otherwise
/// the previously published post for that document. Documents no longer in
/// the folder are dropped.
pub fn merge_with_previous(
    files: &[DriveFile],
    mut fresh: HashMap<String, Post>,
    previous: Vec<Post>,
) -> Vec<Post> {
    let mut previous: HashMap<String, Post> =
        previous.into_iter().map(|p| (p.id.clone(), p)).collect();

    files
        .iter()
        .filter_map(|f| fresh.remove(&f.id).or_else(|| previous.remove(&f.id)))
        .collect()
}

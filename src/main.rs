mod config;
mod db;
mod drive;
mod git;
mod images;
mod parser;
mod schedule;
mod store;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::warn;

use config::SyncConfig;
use parser::post::{DriveFile, Post};
use parser::{ImageHeuristic, ParseOptions};

#[derive(Parser)]
#[command(name = "docpress", about = "Turn Google Docs into blog post JSON")]
struct Cli {
    /// Sync ledger database
    #[arg(long, global = true, env = "DOCPRESS_DB", default_value = config::DEFAULT_DB_PATH)]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse one document JSON file and print the post
    Parse {
        /// Bare document JSON or an export with `file` and `document`
        file: PathBuf,
        /// Post id (bare documents only; defaults to the file stem)
        #[arg(long)]
        id: Option<String>,
        /// Creation timestamp (bare documents only)
        #[arg(long)]
        created: Option<String>,
        /// Modification timestamp (bare documents only)
        #[arg(long)]
        modified: Option<String>,
        #[command(flatten)]
        parse: ParseArgs,
    },
    /// Parse every export in a directory
    ParseDir {
        dir: PathBuf,
        /// Write the posts array here instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        parse: ParseArgs,
    },
    /// List, fetch, parse, localize images, write and publish
    Sync(SyncArgs),
    /// Show sync ledger statistics
    Stats,
}

#[derive(Clone, Copy, ValueEnum)]
enum HeuristicArg {
    /// A paragraph that is a single linked run
    SingleRun,
    /// Any linked paragraph with at most --max-words words
    ShortText,
}

#[derive(Args)]
struct ParseArgs {
    /// How image paragraphs are recognised
    #[arg(long, value_enum, default_value = "single-run")]
    image_heuristic: HeuristicArg,
    /// Word limit for the short-text heuristic
    #[arg(long, default_value = "3")]
    max_words: usize,
}

impl ParseArgs {
    fn options(&self) -> ParseOptions {
        let image_heuristic = match self.image_heuristic {
            HeuristicArg::SingleRun => ImageHeuristic::SingleLinkedRun,
            HeuristicArg::ShortText => ImageHeuristic::ShortLinkText {
                max_words: self.max_words,
            },
        };
        ParseOptions { image_heuristic }
    }
}

#[derive(Args)]
struct SyncArgs {
    /// Drive folder holding the post documents
    #[arg(long, env = "DOCPRESS_FOLDER_ID")]
    folder: String,
    /// OAuth access token for the Drive and Docs APIs
    #[arg(long, env = "DOCPRESS_ACCESS_TOKEN", hide_env_values = true)]
    access_token: String,
    #[arg(short, long, default_value = config::DEFAULT_OUTPUT)]
    output: PathBuf,
    #[arg(long, default_value = config::DEFAULT_IMAGES_DIR)]
    images_dir: PathBuf,
    /// Public URL prefix for stored images
    #[arg(long, default_value = config::DEFAULT_IMAGE_PREFIX)]
    image_prefix: String,
    /// Skip documents created less than this many ms ago
    #[arg(long, env = "DOCPRESS_NEW_DOC_COOLDOWN_MS", default_value_t = config::NEW_DOC_COOLDOWN_MS)]
    new_doc_cooldown_ms: i64,
    /// Skip documents modified less than this many ms ago
    #[arg(long, env = "DOCPRESS_RECENT_EDIT_MS", default_value_t = config::RECENT_EDIT_MS)]
    recent_edit_ms: i64,
    /// Documents fetched at once
    #[arg(short = 'j', long, default_value_t = config::DEFAULT_CONCURRENCY)]
    concurrency: usize,
    /// Write files but do not commit or push
    #[arg(long)]
    no_publish: bool,
    #[arg(long, env = "DOCPRESS_GIT_NAME", default_value = config::DEFAULT_GIT_NAME)]
    git_name: String,
    #[arg(long, env = "DOCPRESS_GIT_EMAIL", default_value = config::DEFAULT_GIT_EMAIL)]
    git_email: String,
    /// HTTPS token used when pushing
    #[arg(long, env = "DOCPRESS_GIT_TOKEN", hide_env_values = true)]
    git_token: Option<String>,
    #[command(flatten)]
    parse: ParseArgs,
}

impl SyncArgs {
    fn into_config(self) -> anyhow::Result<SyncConfig> {
        SyncConfig {
            parse: self.parse.options(),
            folder_id: self.folder,
            access_token: self.access_token,
            output: self.output,
            images_dir: self.images_dir,
            image_prefix: self.image_prefix,
            gating: schedule::Gating {
                new_doc_cooldown_ms: self.new_doc_cooldown_ms,
                recent_edit_ms: self.recent_edit_ms,
            },
            concurrency: self.concurrency,
            publish: !self.no_publish,
            git: git::GitIdentity {
                name: self.git_name,
                email: self.git_email,
                token: self.git_token,
            },
        }
        .validate()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Parse {
            file,
            id,
            created,
            modified,
            parse,
        } => {
            let post = parse_file(&file, id, created, modified, parse.options())?;
            println!("{}", serde_json::to_string_pretty(&post)?);
            Ok(())
        }
        Commands::ParseDir { dir, output, parse } => {
            let posts = parse_dir(&dir, parse.options())?;
            match output {
                Some(path) => {
                    let changed = store::write_if_changed(&path, &posts)?;
                    println!(
                        "{} posts {} {}",
                        posts.len(),
                        if changed { "written to" } else { "unchanged in" },
                        path.display()
                    );
                }
                None => println!("{}", store::render(&posts)?),
            }
            Ok(())
        }
        Commands::Sync(args) => {
            let cfg = args.into_config()?;
            let conn = db::connect(&cli.db)?;
            db::init_schema(&conn)?;
            sync(&conn, cfg).await
        }
        Commands::Stats => {
            let conn = db::connect(&cli.db)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Attempts:  {}", s.total);
            println!("Documents: {}", s.documents);
            println!("Ok:        {}", s.ok);
            println!("Skipped:   {}", s.skipped);
            println!("Changed:   {}", s.changed);
            println!("Errors:    {}", s.errors);
            if let Some(last) = s.last_attempt {
                println!("Last run:  {}", last);
            }
            let errors = db::recent_errors(&conn, 5)?;
            if !errors.is_empty() {
                println!("\n--- Recent errors ---");
                for (name, id, error) in errors {
                    println!("  {} ({}): {}", truncate(&name, 32), id, truncate(&error, 80));
                }
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

struct SyncCounts {
    listed: usize,
    waiting: usize,
    ok: usize,
    changed: usize,
    errors: usize,
    published: usize,
}

impl SyncCounts {
    fn print(&self) {
        println!(
            "{} documents: {} parsed, {} not ready, {} changed mid-read, {} errors; {} posts published.",
            self.listed, self.ok, self.waiting, self.changed, self.errors, self.published,
        );
    }
}

async fn sync(conn: &rusqlite::Connection, cfg: SyncConfig) -> anyhow::Result<()> {
    use indicatif::{ProgressBar, ProgressStyle};

    let client = Arc::new(drive::DriveClient::new(&cfg.access_token)?);
    let files = client.list_doc_files(&cfg.folder_id).await?;
    if files.is_empty() {
        warn!(
            "No documents found in folder {}; previously published posts will be removed",
            cfg.folder_id
        );
    }

    let now = Utc::now();
    let (eligible, waiting): (Vec<DriveFile>, Vec<DriveFile>) = files
        .iter()
        .cloned()
        .partition(|f| cfg.gating.is_eligible(f, now));
    let skipped: Vec<_> = waiting
        .iter()
        .map(|f| db::AttemptRow {
            file_id: f.id.clone(),
            name: f.name.clone(),
            version: f.version.clone(),
            outcome: db::Outcome::Skipped,
            error: None,
            latency_ms: None,
        })
        .collect();
    db::record_attempts(conn, &skipped)?;

    println!(
        "Fetching {} documents ({} not ready yet)...",
        eligible.len(),
        waiting.len()
    );
    let collected = schedule::collect_posts(
        conn,
        Arc::clone(&client),
        eligible,
        cfg.concurrency,
        cfg.parse,
    )
    .await?;

    let mut counts = SyncCounts {
        listed: files.len(),
        waiting: waiting.len(),
        ok: collected.ok,
        changed: collected.changed,
        errors: collected.errors,
        published: 0,
    };

    let posts = schedule::merge_with_previous(&files, collected.posts, store::load(&cfg.output));

    let pb = ProgressBar::new(posts.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} images")?
            .progress_chars("#>-"),
    );
    let mut localized = Vec::with_capacity(posts.len());
    for post in &posts {
        let local =
            images::localize_post(&*client, post, &cfg.images_dir, |f| cfg.image_url(f))
                .await;
        localized.push(local);
        pb.inc(1);
    }
    pb.finish_and_clear();

    counts.published = localized.len();
    let changed = store::write_if_changed(&cfg.output, &localized)?;
    counts.print();

    if !changed {
        println!("{} is up to date.", cfg.output.display());
        return Ok(());
    }
    if !cfg.publish {
        println!("{} updated; publishing disabled.", cfg.output.display());
        return Ok(());
    }

    let publisher = git::Publisher::discover(&cfg.output, cfg.git.clone())?;
    let message = format!("Update {} from Google Docs", cfg.output.display());
    match publisher.commit_paths(&[cfg.output.as_path(), cfg.images_dir.as_path()], &message)? {
        Some(oid) => {
            publisher.push()?;
            println!("Committed {} and pushed.", oid);
        }
        None => println!("No changes to commit."),
    }
    Ok(())
}

/// Read a bare document or an export envelope from disk and parse it.
fn parse_file(
    path: &Path,
    id: Option<String>,
    created: Option<String>,
    modified: Option<String>,
    options: ParseOptions,
) -> anyhow::Result<Post> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("{} is not JSON", path.display()))?;

    if value.get("document").is_some() {
        let export: parser::Export = serde_json::from_value(value)?;
        return Ok(parser::process_export(&export, options)?);
    }

    let doc: parser::document::Document = serde_json::from_value(value)?;
    let file = DriveFile {
        id: id.unwrap_or_else(|| file_stem(path)),
        name: file_stem(path),
        created_time: created,
        modified_time: modified,
        version: None,
    };
    Ok(parser::parse_document(&doc, &file, options)?)
}

fn parse_dir(dir: &Path, options: ParseOptions) -> anyhow::Result<Vec<Post>> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let pb = ProgressBar::new(paths.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let results: Vec<_> = paths
        .par_iter()
        .map(|path| {
            let result = parse_file(path, None, None, None, options);
            pb.inc(1);
            result
        })
        .collect();
    pb.finish_and_clear();

    let mut posts = Vec::with_capacity(results.len());
    for (path, result) in paths.iter().zip(results) {
        match result {
            Ok(post) => posts.push(post),
            Err(e) => warn!("Skipping {}: {:#}", path.display(), e),
        }
    }
    Ok(posts)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

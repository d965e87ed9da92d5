use std::cell::RefCell;
use std::path::{Component, Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use git2::{
    Cred, CredentialType, Index, IndexAddOption, Oid, PushOptions, RemoteCallbacks, Repository,
    Tree,
};
use tracing::{debug, info};

use crate::config::{DEFAULT_GIT_EMAIL, DEFAULT_GIT_NAME};

/// Author/committer used for automated commits, plus an optional HTTPS token
/// for pushing.
#[derive(Debug, Clone)]
pub struct GitIdentity {
    pub name: String,
    pub email: String,
    pub token: Option<String>,
}

impl Default for GitIdentity {
    fn default() -> Self {
        Self {
            name: DEFAULT_GIT_NAME.to_string(),
            email: DEFAULT_GIT_EMAIL.to_string(),
            token: None,
        }
    }
}

/// Commits generated files in the repository that contains them.
pub struct Publisher {
    repo: Repository,
    workdir: PathBuf,
    identity: GitIdentity,
}

impl Publisher {
    /// Find the repository containing `path` (or its parent directory).
    pub fn discover(path: &Path, identity: GitIdentity) -> Result<Self> {
        let start = if path.is_dir() {
            path.to_path_buf()
        } else {
            path.parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        };
        let repo = Repository::discover(&start)
            .with_context(|| format!("no git repository found from {}", start.display()))?;
        let workdir = repo
            .workdir()
            .ok_or_else(|| anyhow!("repository at {} is bare", repo.path().display()))?
            .canonicalize()?;
        Ok(Self {
            repo,
            workdir,
            identity,
        })
    }

    /// Stage `paths` (files or directories) and commit them.
    ///
    /// Returns `None` when the staged tree matches `HEAD`, i.e. there was
    /// nothing to commit.
    pub fn commit_paths(&self, paths: &[&Path], message: &str) -> Result<Option<Oid>> {
        let mut specs = Vec::new();
        for path in paths {
            if !path.exists() {
                debug!("Skipping missing path {}", path.display());
                continue;
            }
            specs.push(self.relative(path)?);
        }
        if specs.is_empty() {
            return Ok(None);
        }

        let parents = self.head_parents()?;
        let head_tree = parents.first().map(|c| c.tree()).transpose()?;

        let mut index = self.repo.index().context("failed to open git index")?;
        let foreign = self.staged_outside(head_tree.as_ref(), &index, &specs)?;
        if !foreign.is_empty() {
            bail!(
                "index already has staged changes outside the generated files: {}",
                foreign.join(", ")
            );
        }

        index
            .add_all(specs.iter().map(String::as_str), IndexAddOption::DEFAULT, None)
            .context("failed to stage files")?;
        index
            .update_all(specs.iter().map(String::as_str), None)
            .context("failed to stage removals")?;
        index.write().context("failed to write git index")?;

        let tree_id = index.write_tree().context("failed to write git tree")?;
        if let Some(head) = &head_tree {
            if head.id() == tree_id {
                info!("No changes to commit");
                return Ok(None);
            }
        }

        let tree = self.repo.find_tree(tree_id)?;
        let sig = git2::Signature::now(&self.identity.name, &self.identity.email)
            .context("failed to create git signature")?;
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
            .context("failed to create commit")?;
        info!("Committed {}", oid);
        Ok(Some(oid))
    }

    /// Push the current branch to `origin`.
    pub fn push(&self) -> Result<()> {
        let head = self.repo.head().context("failed to read HEAD")?;
        let refname = head
            .name()
            .ok_or_else(|| anyhow!("HEAD is not a valid UTF-8 reference"))?
            .to_string();
        let mut remote = self
            .repo
            .find_remote("origin")
            .context("no 'origin' remote configured")?;

        let config = self.repo.config()?;
        let token = self.identity.token.clone();
        let rejected = RefCell::new(Vec::new());
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(move |url, username, allowed| {
            if allowed.contains(CredentialType::SSH_KEY) {
                if let Some(user) = username {
                    return Cred::ssh_key_from_agent(user);
                }
            }
            if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
                if let Some(token) = &token {
                    return Cred::userpass_plaintext("x-access-token", token);
                }
                return Cred::credential_helper(&config, url, username);
            }
            Cred::default()
        });

        // the transport can succeed while the remote refuses a ref
        callbacks.push_update_reference(|name, status| {
            if let Some(msg) = status {
                rejected.borrow_mut().push(format!("{name}: {msg}"));
            }
            Ok(())
        });

        let mut options = PushOptions::new();
        options.remote_callbacks(callbacks);
        remote
            .push(&[format!("{refname}:{refname}")], Some(&mut options))
            .with_context(|| format!("failed to push {refname} to origin"))?;
        drop(options);

        ensure_accepted(&refname, &rejected.into_inner())?;
        info!("Pushed {}", refname);
        Ok(())
    }

    /// Paths staged relative to `head` that none of `specs` covers.
    fn staged_outside(
        &self,
        head: Option<&Tree<'_>>,
        index: &Index,
        specs: &[String],
    ) -> Result<Vec<String>> {
        let diff = self
            .repo
            .diff_tree_to_index(head, Some(index), None)
            .context("failed to compare index with HEAD")?;

        let mut paths = Vec::new();
        for delta in diff.deltas() {
            for path in [delta.old_file().path(), delta.new_file().path()]
                .into_iter()
                .flatten()
            {
                let path = path.to_string_lossy().replace('\\', "/");
                if !covered(&path, specs) && !paths.contains(&path) {
                    paths.push(path);
                }
            }
        }
        Ok(paths)
    }

    fn relative(&self, path: &Path) -> Result<String> {
        let absolute = path
            .canonicalize()
            .with_context(|| format!("failed to resolve {}", path.display()))?;
        let rel = absolute
            .strip_prefix(&self.workdir)
            .map_err(|_| anyhow!("{} is outside the repository", path.display()))?;
        if rel.components().any(|c| matches!(c, Component::ParentDir)) {
            bail!("{} escapes the repository", path.display());
        }
        Ok(rel.to_string_lossy().replace('\\', "/"))
    }

    fn head_parents(&self) -> Result<Vec<git2::Commit<'_>>> {
        match self.repo.head() {
            Ok(head) => Ok(vec![head.peel_to_commit().context("failed to peel HEAD")?]),
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => Ok(vec![]),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(vec![]),
            Err(e) => Err(e).context("failed to read HEAD"),
        }
    }
}

fn covered(path: &str, specs: &[String]) -> bool {
    specs.iter().any(|spec| {
        path == spec
            || path
                .strip_prefix(spec.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

fn ensure_accepted(refname: &str, rejected: &[String]) -> Result<()> {
    if rejected.is_empty() {
        return Ok(());
    }
    bail!("origin rejected {}: {}", refname, rejected.join("; "))
}

//! Local Git repository operations via `git2`.
//!
//! [`GitClient`] exposes only the narrow set of operations the sync
//! workflow consumes: dirty-check, branch resolution and checkout, staging,
//! filtered commits, stashing, and a force-push with upstream tracking.

use std::path::{Path, PathBuf};

use git2::{
    build::CheckoutBuilder, BranchType, Cred, ErrorCode, IndexAddOption, ObjectType, Oid,
    PushOptions, RemoteCallbacks, Repository, Signature, StashFlags, StatusOptions,
};
use tracing::{debug, info, instrument, warn};

use crate::errors::GitError;

/// Where the sync branch was resolved from.
///
/// The fallback from remote-tracking to local is an explicit two-step
/// resolution, not error recovery: callers branch on this result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchSource {
    /// `origin/<branch>` exists and no local branch shadows it; a fresh
    /// local branch is created from the remote-tracking ref.
    RemoteTracking,
    /// A local branch of the requested name already exists.
    LocalExisting,
    /// Neither exists - there is no safe place to stage the regenerated
    /// template.
    NotFound,
}

/// High-level Git client wrapping a `git2::Repository`.
pub struct GitClient {
    repo: Repository,
    repo_path: PathBuf,
}

impl GitClient {
    /// Open an existing Git repository at `repo_path`.
    pub fn open<P: AsRef<Path>>(repo_path: P) -> Result<Self, GitError> {
        let path = repo_path.as_ref();
        info!(path = %path.display(), "opening git repository");
        let repo = Repository::open(path)
            .map_err(|_| GitError::RepositoryNotFound(path.display().to_string()))?;
        Ok(Self {
            repo,
            repo_path: path.to_path_buf(),
        })
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Whether the working copy has uncommitted changes, including
    /// untracked files.
    pub fn is_dirty(&self) -> Result<bool, GitError> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true).recurse_untracked_dirs(true);
        let statuses = self.repo.statuses(Some(&mut opts))?;
        Ok(!statuses.is_empty())
    }

    /// Name of the currently checked-out branch.
    pub fn current_branch(&self) -> Result<String, GitError> {
        let head = self.repo.head()?;
        if !head.is_branch() {
            return Err(GitError::DetachedHead);
        }
        Ok(head.shorthand().unwrap_or("HEAD").to_string())
    }

    /// Resolve where the sync branch would be checked out from.
    pub fn resolve_sync_branch(&self, name: &str) -> BranchSource {
        let local = self.repo.find_branch(name, BranchType::Local).is_ok();
        let remote = self
            .repo
            .find_branch(&format!("origin/{}", name), BranchType::Remote)
            .is_ok();
        let source = match (remote, local) {
            (true, false) => BranchSource::RemoteTracking,
            (_, true) => BranchSource::LocalExisting,
            (false, false) => BranchSource::NotFound,
        };
        debug!(branch = name, ?source, "resolved sync branch");
        source
    }

    /// Check out the sync branch, creating it from `origin/<name>` when a
    /// remote-tracking ref exists and falling back to an existing local
    /// branch otherwise.
    #[instrument(skip(self))]
    pub fn checkout_sync_branch(&self, name: &str) -> Result<BranchSource, GitError> {
        let source = self.resolve_sync_branch(name);
        match source {
            BranchSource::RemoteTracking => {
                let remote_branch = self
                    .repo
                    .find_branch(&format!("origin/{}", name), BranchType::Remote)?;
                let commit = remote_branch.get().peel_to_commit()?;
                let mut branch = self.repo.branch(name, &commit, false)?;
                branch.set_upstream(Some(&format!("origin/{}", name)))?;
                self.checkout_branch(name)?;
                info!(branch = name, "checked out sync branch from remote-tracking ref");
            }
            BranchSource::LocalExisting => {
                self.checkout_branch(name)?;
                info!(branch = name, "checked out existing local sync branch");
            }
            BranchSource::NotFound => {
                return Err(GitError::SyncBranchNotFound {
                    branch: name.to_string(),
                });
            }
        }
        Ok(source)
    }

    /// Check out a local branch by name.
    pub fn checkout_branch(&self, name: &str) -> Result<(), GitError> {
        self.repo.set_head(&format!("refs/heads/{}", name))?;
        self.repo
            .checkout_head(Some(CheckoutBuilder::new().force()))?;
        Ok(())
    }

    /// Stage every change in the working copy, including deletions.
    pub fn stage_all(&self) -> Result<(), GitError> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;
        Ok(())
    }

    /// Relative paths of everything staged relative to HEAD.
    pub fn staged_paths(&self) -> Result<Vec<String>, GitError> {
        let head_tree = self.repo.head()?.peel_to_tree()?;
        let index = self.repo.index()?;
        let diff = self
            .repo
            .diff_tree_to_index(Some(&head_tree), Some(&index), None)?;
        let mut paths = Vec::new();
        for delta in diff.deltas() {
            if let Some(path) = delta.new_file().path().or_else(|| delta.old_file().path()) {
                paths.push(path.to_string_lossy().replace('\\', "/"));
            }
        }
        debug!(count = paths.len(), "collected staged paths");
        Ok(paths)
    }

    /// Reset the given paths in the index back to their HEAD state, leaving
    /// the working-copy files untouched.
    pub fn unstage_paths(&self, paths: &[String]) -> Result<(), GitError> {
        if paths.is_empty() {
            return Ok(());
        }
        let head = self.repo.head()?.peel(ObjectType::Commit)?;
        self.repo
            .reset_default(Some(&head), paths.iter().map(|p| p.as_str()))?;
        debug!(count = paths.len(), "unstaged blacklisted paths");
        Ok(())
    }

    /// Commit the current index onto HEAD.
    #[instrument(skip(self, message))]
    pub fn commit_staged(&self, message: &str) -> Result<Oid, GitError> {
        let mut index = self.repo.index()?;
        let tree_oid = index.write_tree()?;
        let tree = self.repo.find_tree(tree_oid)?;
        let sig = self.signature()?;
        let parent = self.repo.head()?.peel_to_commit()?;
        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])?;
        info!(sha = %oid, "created sync commit");
        Ok(oid)
    }

    /// Stash all remaining working-copy modifications, untracked files
    /// included. Returns `None` when there was nothing to stash.
    pub fn stash_worktree(&mut self, label: &str) -> Result<Option<Oid>, GitError> {
        let sig = self.signature()?;
        match self
            .repo
            .stash_save(&sig, label, Some(StashFlags::INCLUDE_UNTRACKED))
        {
            Ok(oid) => {
                info!(sha = %oid, "stashed remaining working-copy changes");
                Ok(Some(oid))
            }
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Force-push `branch` to `origin` and set upstream tracking to the
    /// remote branch of the same name.
    #[instrument(skip(self, token))]
    pub fn push_sync_branch(
        &self,
        branch: &str,
        username: &str,
        token: &str,
    ) -> Result<(), GitError> {
        info!(branch, "force-pushing sync branch to origin");
        let mut remote = self.repo.find_remote("origin")?;

        let mut callbacks = RemoteCallbacks::new();
        let (user, tok) = (username.to_string(), token.to_string());
        callbacks.credentials(move |_url, _username, _allowed| {
            Cred::userpass_plaintext(&user, &tok)
        });

        let push_error = std::sync::Arc::new(std::sync::Mutex::new(None::<String>));
        let push_error_clone = push_error.clone();
        callbacks.push_update_reference(move |refname, status| {
            if let Some(msg) = status {
                warn!(refname, msg, "push rejected");
                *push_error_clone.lock().unwrap() = Some(msg.to_string());
            }
            Ok(())
        });

        let mut push_opts = PushOptions::new();
        push_opts.remote_callbacks(callbacks);
        let refspec = format!("+refs/heads/{0}:refs/heads/{0}", branch);
        remote.push(&[&refspec], Some(&mut push_opts))?;

        if let Some(detail) = push_error.lock().unwrap().take() {
            return Err(GitError::PushRejected {
                branch: branch.to_string(),
                detail,
            });
        }

        // Tracking is a convenience for later pulls; the push itself already
        // succeeded, so failing to record it is not fatal.
        if let Ok(mut local) = self.repo.find_branch(branch, BranchType::Local) {
            if let Err(e) = local.set_upstream(Some(&format!("origin/{}", branch))) {
                warn!(branch, error = %e, "could not set upstream tracking branch");
            }
        }

        info!("push completed");
        Ok(())
    }

    fn signature(&self) -> Result<Signature<'static>, GitError> {
        if let Ok(sig) = self.repo.signature() {
            return Ok(sig);
        }
        Ok(Signature::now("forgesync", "forgesync@localhost")?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit_all(repo: &Repository, message: &str) -> Oid {
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .unwrap();
        index.update_all(["*"].iter(), None).unwrap();
        index.write().unwrap();
        let tree_oid = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_oid).unwrap();
        let sig = Signature::now("Test", "test@test.com").unwrap();
        let parent = repo.head().ok().map(|h| h.peel_to_commit().unwrap());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap()
    }

    fn init_repo(dir: &Path) -> Repository {
        let repo = Repository::init(dir).unwrap();
        std::fs::write(dir.join("README.md"), "hello").unwrap();
        commit_all(&repo, "initial commit");
        repo
    }

    #[test]
    fn test_open_missing_repository() {
        assert!(matches!(
            GitClient::open("/nonexistent"),
            Err(GitError::RepositoryNotFound(_))
        ));
    }

    #[test]
    fn test_dirty_detection_includes_untracked() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let client = GitClient::open(dir.path()).unwrap();
        assert!(!client.is_dirty().unwrap());

        std::fs::write(dir.path().join("untracked.txt"), "x").unwrap();
        assert!(client.is_dirty().unwrap());
    }

    #[test]
    fn test_current_branch() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        let commit = repo.head().unwrap().peel_to_commit().unwrap();
        repo.branch("development", &commit, false).unwrap();
        repo.set_head("refs/heads/development").unwrap();

        let client = GitClient::open(dir.path()).unwrap();
        assert_eq!(client.current_branch().unwrap(), "development");
    }

    #[test]
    fn test_resolve_sync_branch_not_found() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let client = GitClient::open(dir.path()).unwrap();
        assert_eq!(
            client.resolve_sync_branch("TEMPLATE"),
            BranchSource::NotFound
        );
        assert!(matches!(
            client.checkout_sync_branch("TEMPLATE"),
            Err(GitError::SyncBranchNotFound { .. })
        ));
    }

    #[test]
    fn test_checkout_existing_local_sync_branch() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        let commit = repo.head().unwrap().peel_to_commit().unwrap();
        repo.branch("TEMPLATE", &commit, false).unwrap();

        let client = GitClient::open(dir.path()).unwrap();
        assert_eq!(
            client.resolve_sync_branch("TEMPLATE"),
            BranchSource::LocalExisting
        );
        let source = client.checkout_sync_branch("TEMPLATE").unwrap();
        assert_eq!(source, BranchSource::LocalExisting);
        assert_eq!(client.current_branch().unwrap(), "TEMPLATE");
    }

    #[test]
    fn test_checkout_creates_branch_from_remote_tracking_ref() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        let oid = repo.head().unwrap().target().unwrap();
        repo.remote("origin", "https://example.com/repo.git").unwrap();
        repo.reference("refs/remotes/origin/TEMPLATE", oid, true, "test")
            .unwrap();

        let client = GitClient::open(dir.path()).unwrap();
        assert_eq!(
            client.resolve_sync_branch("TEMPLATE"),
            BranchSource::RemoteTracking
        );
        let source = client.checkout_sync_branch("TEMPLATE").unwrap();
        assert_eq!(source, BranchSource::RemoteTracking);
        assert_eq!(client.current_branch().unwrap(), "TEMPLATE");
    }

    #[test]
    fn test_local_branch_shadows_remote() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        let oid = repo.head().unwrap().target().unwrap();
        let commit = repo.find_commit(oid).unwrap();
        repo.remote("origin", "https://example.com/repo.git").unwrap();
        repo.reference("refs/remotes/origin/TEMPLATE", oid, true, "test")
            .unwrap();
        repo.branch("TEMPLATE", &commit, false).unwrap();

        let client = GitClient::open(dir.path()).unwrap();
        assert_eq!(
            client.resolve_sync_branch("TEMPLATE"),
            BranchSource::LocalExisting
        );
    }

    #[test]
    fn test_stage_filter_commit_flow() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        std::fs::write(dir.path().join("keep.txt"), "v2").unwrap();
        std::fs::write(dir.path().join("skip.md"), "v2").unwrap();
        commit_all(&repo, "baseline");

        // Modify both files, stage everything, then unstage one.
        std::fs::write(dir.path().join("keep.txt"), "v3").unwrap();
        std::fs::write(dir.path().join("skip.md"), "v3").unwrap();

        let client = GitClient::open(dir.path()).unwrap();
        client.stage_all().unwrap();
        let mut staged = client.staged_paths().unwrap();
        staged.sort();
        assert_eq!(staged, vec!["keep.txt".to_string(), "skip.md".to_string()]);

        client.unstage_paths(&["skip.md".to_string()]).unwrap();
        let staged = client.staged_paths().unwrap();
        assert_eq!(staged, vec!["keep.txt".to_string()]);

        let oid = client.commit_staged("sync commit").unwrap();
        let commit = repo.find_commit(oid).unwrap();
        assert_eq!(commit.message().unwrap(), "sync commit");

        // skip.md keeps its HEAD content in the commit, v3 on disk.
        let tree = commit.tree().unwrap();
        let entry = tree.get_path(Path::new("skip.md")).unwrap();
        let blob = repo.find_blob(entry.id()).unwrap();
        assert_eq!(blob.content(), b"v2");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("skip.md")).unwrap(),
            "v3"
        );
    }

    #[test]
    fn test_stage_all_records_deletions() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        std::fs::write(dir.path().join("gone.txt"), "x").unwrap();
        commit_all(&repo, "add file");

        std::fs::remove_file(dir.path().join("gone.txt")).unwrap();
        let client = GitClient::open(dir.path()).unwrap();
        client.stage_all().unwrap();
        assert_eq!(client.staged_paths().unwrap(), vec!["gone.txt".to_string()]);
    }

    #[test]
    fn test_stash_worktree() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let mut client = GitClient::open(dir.path()).unwrap();

        // Nothing to stash on a clean tree.
        assert!(client.stash_worktree("empty").unwrap().is_none());

        std::fs::write(dir.path().join("leftover.txt"), "x").unwrap();
        assert!(client.stash_worktree("leftovers").unwrap().is_some());
        assert!(!client.is_dirty().unwrap());
    }
}

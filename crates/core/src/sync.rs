//! Template synchronization orchestrator.
//!
//! [`TemplateSync`] drives one sync attempt as a state machine:
//!
//! `Inspecting → BranchCheckout → RegenerateTemplate → Committing →
//! {PushAndPr | NoChanges} → Restored`
//!
//! Inspecting validates the project and records the original branch before
//! any mutation. The Restored step runs on every terminal path, success or
//! failure, so the repository is never left stranded on the sync branch.

use std::fmt;
use std::path::PathBuf;

use tracing::{debug, error, info};

use crate::config::ProjectConfig;
use crate::errors::{GitError, GitHubError, ScaffoldError, SyncError};
use crate::git::client::GitClient;
use crate::git::github::{GitHubClient, PullRequest, DEFAULT_API_URL};
use crate::metadata::ProjectMetadata;
use crate::policy::{Blacklist, SyncPolicy};
use crate::scaffold::ScaffoldEngine;
use crate::version::{UpdateTier, VersionTriple};

/// Default name of the dedicated sync branch.
pub const DEFAULT_SYNC_BRANCH: &str = "TEMPLATE";

/// Default integration branch targeted by sync pull requests.
pub const DEFAULT_BASE_BRANCH: &str = "development";

/// Fixed message for sync commits.
pub const SYNC_COMMIT_MESSAGE: &str = "forgesync template sync";

/// Title prefix identifying sync pull requests. An open PR carrying this
/// prefix picks up new sync commits via the push alone.
pub const SYNC_PR_TITLE_PREFIX: &str = "Important forgesync template update";

const SYNC_PR_BODY: &str = "A new release of this project's template has been published. \
This automated pull request applies the template updates to the project.\n\n\
Please review and merge it as soon as possible. Once complete, make a new \
minor release of your project.\n\n\
For more information on the actual changes, read the template's changelog.";

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// States of a sync session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Inspecting,
    BranchCheckout,
    RegenerateTemplate,
    Committing,
    PushAndPr,
    NoChanges,
    Restored,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Inspecting => write!(f, "inspecting"),
            Self::BranchCheckout => write!(f, "branch_checkout"),
            Self::RegenerateTemplate => write!(f, "regenerate_template"),
            Self::Committing => write!(f, "committing"),
            Self::PushAndPr => write!(f, "push_and_pr"),
            Self::NoChanges => write!(f, "no_changes"),
            Self::Restored => write!(f, "restored"),
        }
    }
}

// ---------------------------------------------------------------------------
// Options & outcome
// ---------------------------------------------------------------------------

/// Inputs for one sync session. Credentials and identity are explicit
/// constructor inputs - nothing is looked up ambiently mid-workflow.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Path to the managed project.
    pub project_dir: PathBuf,
    /// Account used for API calls and pushes.
    pub username: String,
    /// Access token for the hosting service.
    pub token: String,
    /// Current version of the template, as reported by the generator.
    pub new_template_version: String,
    /// Dedicated sync branch name.
    pub sync_branch: String,
    /// Integration branch targeted by the pull request.
    pub base_branch: String,
    /// Hosting-service API base URL.
    pub api_url: String,
}

impl SyncOptions {
    pub fn new(
        project_dir: impl Into<PathBuf>,
        username: impl Into<String>,
        token: impl Into<String>,
        new_template_version: impl Into<String>,
    ) -> Self {
        Self {
            project_dir: project_dir.into(),
            username: username.into(),
            token: token.into(),
            new_template_version: new_template_version.into(),
            sync_branch: DEFAULT_SYNC_BRANCH.into(),
            base_branch: DEFAULT_BASE_BRANCH.into(),
            api_url: DEFAULT_API_URL.into(),
        }
    }
}

/// What a completed sync session did.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// Classified update tier for this sync.
    pub tier: UpdateTier,
    /// Whether a sync commit was created and pushed.
    pub made_changes: bool,
    /// SHA of the sync commit, when one was created.
    pub commit: Option<String>,
    /// Changed files committed to the sync branch.
    pub included: Vec<String>,
    /// Changed files excluded by the blacklist.
    pub excluded: Vec<String>,
    /// The pull request created by this session, if any.
    pub pull_request: Option<PullRequest>,
    /// An open sync PR already existed; the push updated it.
    pub pr_already_open: bool,
    /// The policy did not allow a PR for this update tier.
    pub pr_suppressed_by_policy: bool,
}

/// Everything Inspecting loads and validates before any mutation.
struct Inspected {
    git: GitClient,
    metadata: ProjectMetadata,
    policy: SyncPolicy,
    blacklist: Blacklist,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One template-sync attempt against a managed project.
pub struct TemplateSync {
    project_dir: PathBuf,
    username: String,
    token: String,
    new_template_version: String,
    sync_branch: String,
    base_branch: String,
    github: GitHubClient,
    state: SyncState,
    original_branch: Option<String>,
    tier: UpdateTier,
    made_changes: bool,
    pr_response: Option<PullRequest>,
}

impl TemplateSync {
    /// Create a new session. No repository access happens until
    /// [`run`](Self::run).
    pub fn new(options: SyncOptions) -> Self {
        let github = GitHubClient::new(&options.api_url, &options.username, &options.token);
        info!(project_dir = %options.project_dir.display(),
              version = %options.new_template_version, "created sync session");
        Self {
            project_dir: options.project_dir,
            username: options.username,
            token: options.token,
            new_template_version: options.new_template_version,
            sync_branch: options.sync_branch,
            base_branch: options.base_branch,
            github,
            state: SyncState::Idle,
            original_branch: None,
            tier: UpdateTier::None,
            made_changes: false,
            pr_response: None,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Branch recorded during Inspecting, restored at the end of the run.
    pub fn original_branch(&self) -> Option<&str> {
        self.original_branch.as_deref()
    }

    /// Execute the full sync workflow.
    ///
    /// Whatever happens after Inspecting - success, regeneration failure,
    /// push or PR failure - the original branch is checked out again before
    /// this returns.
    pub async fn run(&mut self, engine: &dyn ScaffoldEngine) -> Result<SyncOutcome, SyncError> {
        let mut ctx = self.inspect()?;

        let result = self.run_pipeline(&mut ctx, engine).await;

        match (result, self.restore(&ctx.git)) {
            (Ok(outcome), Ok(())) => Ok(outcome),
            (Ok(_), Err(restore_err)) => Err(restore_err.into()),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(restore_err)) => {
                // The pipeline error is the primary failure; the stranded
                // branch still has to be visible to the operator.
                error!(error = %restore_err, "could not restore original branch");
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Inspecting
    // -----------------------------------------------------------------------

    fn inspect(&mut self) -> Result<Inspected, SyncError> {
        self.set_state(SyncState::Inspecting);

        let metadata = ProjectMetadata::load(&self.project_dir)?;
        let (config, blacklist) = ProjectConfig::load_and_validate(&self.project_dir)?;

        let git = GitClient::open(&self.project_dir)?;
        if git.is_dirty()? {
            return Err(GitError::DirtyWorkingCopy(self.project_dir.display().to_string()).into());
        }

        let original = git.current_branch()?;
        info!(branch = %original, "recorded original project branch");
        self.original_branch = Some(original);

        let last_synced: VersionTriple = metadata.template_version.parse()?;
        let current: VersionTriple = self.new_template_version.parse()?;
        self.tier = UpdateTier::classify(&last_synced, &current);
        info!(last = %last_synced, current = %current, tier = %self.tier,
              "classified template update");

        Ok(Inspected {
            git,
            metadata,
            policy: config.sync.policy,
            blacklist,
        })
    }

    // -----------------------------------------------------------------------
    // BranchCheckout → RegenerateTemplate → Committing → PushAndPr
    // -----------------------------------------------------------------------

    async fn run_pipeline(
        &mut self,
        ctx: &mut Inspected,
        engine: &dyn ScaffoldEngine,
    ) -> Result<SyncOutcome, SyncError> {
        self.set_state(SyncState::BranchCheckout);
        ctx.git.checkout_sync_branch(&self.sync_branch)?;

        self.set_state(SyncState::RegenerateTemplate);
        self.regenerate(&ctx.metadata, engine)?;

        self.set_state(SyncState::Committing);
        if !ctx.git.is_dirty()? {
            self.set_state(SyncState::NoChanges);
            info!("regenerated template produced no changes - sync complete");
            return Ok(self.outcome(None, Vec::new(), Vec::new(), false, false));
        }

        ctx.git.stage_all()?;
        let changed = ctx.git.staged_paths()?;
        let (included, excluded) = ctx.blacklist.partition(&changed);
        if !excluded.is_empty() {
            debug!(files = ?excluded, "blacklisted files excluded from sync commit");
        }

        if included.is_empty() {
            // Only blacklisted files changed; keep them out of the branch
            // and report the run as a no-op.
            ctx.git.stash_worktree("forgesync: blacklisted template changes")?;
            self.set_state(SyncState::NoChanges);
            info!(excluded = excluded.len(),
                  "all changed files are blacklisted - no sync commit created");
            return Ok(self.outcome(None, Vec::new(), excluded, false, false));
        }

        ctx.git.unstage_paths(&excluded)?;
        let commit = ctx.git.commit_staged(SYNC_COMMIT_MESSAGE)?;
        ctx.git.stash_worktree("forgesync: blacklisted template changes")?;
        self.made_changes = true;
        info!(sha = %commit, files = included.len(), "committed template changes");

        self.set_state(SyncState::PushAndPr);
        ctx.git
            .push_sync_branch(&self.sync_branch, &self.username, &self.token)?;

        let mut pr_already_open = false;
        let mut pr_suppressed = false;
        if ctx.policy.allows(self.tier) {
            let owner = ctx.metadata.repo_owner(&self.username).to_string();
            match self
                .ensure_pull_request(&owner, &ctx.metadata.project_slug)
                .await
            {
                Ok(Some(pr)) => self.pr_response = Some(pr),
                Ok(None) => pr_already_open = true,
                Err(e) => return Err(SyncError::PullRequestAfterPush(e)),
            }
        } else {
            pr_suppressed = true;
            info!(policy = %ctx.policy, tier = %self.tier,
                  "sync policy suppresses a pull request for this update tier");
        }

        Ok(self.outcome(
            Some(commit.to_string()),
            included,
            excluded,
            pr_already_open,
            pr_suppressed,
        ))
    }

    /// Delete everything except `.git`, regenerate the template in a scratch
    /// directory, and copy the fresh project over the emptied root.
    fn regenerate(
        &self,
        metadata: &ProjectMetadata,
        engine: &dyn ScaffoldEngine,
    ) -> Result<(), SyncError> {
        let scratch = tempfile::tempdir()?;
        debug!(scratch = %scratch.path().display(), "regenerating template");

        self.clear_project_root()?;
        engine.generate(metadata, scratch.path())?;

        let generated = scratch.path().join(&metadata.project_slug);
        if !generated.is_dir() {
            return Err(ScaffoldError::OutputMissing(generated.display().to_string()).into());
        }

        let mut opts = fs_extra::dir::CopyOptions::new();
        opts.content_only = true;
        opts.overwrite = true;
        fs_extra::dir::copy(&generated, &self.project_dir, &opts)
            .map_err(|e| SyncError::CopyFailed(e.to_string()))?;
        info!("copied regenerated template into project root");
        Ok(())
    }

    fn clear_project_root(&self) -> Result<(), SyncError> {
        for entry in std::fs::read_dir(&self.project_dir)? {
            let entry = entry?;
            if entry.file_name() == ".git" {
                continue;
            }
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                std::fs::remove_dir_all(&path)?;
            } else {
                std::fs::remove_file(&path)?;
            }
        }
        debug!("cleared project root for regeneration");
        Ok(())
    }

    /// Create the sync PR unless an open one already carries the sync title
    /// prefix. Returns `None` when the push updated an existing PR.
    async fn ensure_pull_request(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<Option<PullRequest>, GitHubError> {
        let open = self.github.list_open_pull_requests(owner, repo).await?;
        if open.iter().any(|pr| pr.title.contains(SYNC_PR_TITLE_PREFIX)) {
            info!("an open sync pull request already exists - the push updated it");
            return Ok(None);
        }

        let title = format!(
            "{} {} released!",
            SYNC_PR_TITLE_PREFIX, self.new_template_version
        );
        let pr = self
            .github
            .create_pull_request(
                owner,
                repo,
                &title,
                SYNC_PR_BODY,
                &self.sync_branch,
                &self.base_branch,
            )
            .await?;
        info!(number = pr.number, url = %pr.html_url, "created sync pull request");
        Ok(Some(pr))
    }

    // -----------------------------------------------------------------------
    // Restored
    // -----------------------------------------------------------------------

    fn restore(&mut self, git: &GitClient) -> Result<(), GitError> {
        self.set_state(SyncState::Restored);
        match self.original_branch.clone() {
            Some(branch) => {
                info!(branch = %branch, "checking out original branch");
                git.checkout_branch(&branch)
            }
            None => Ok(()),
        }
    }

    fn outcome(
        &self,
        commit: Option<String>,
        included: Vec<String>,
        excluded: Vec<String>,
        pr_already_open: bool,
        pr_suppressed_by_policy: bool,
    ) -> SyncOutcome {
        SyncOutcome {
            tier: self.tier,
            made_changes: self.made_changes,
            commit,
            included,
            excluded,
            pull_request: self.pr_response.clone(),
            pr_already_open,
            pr_suppressed_by_policy,
        }
    }

    fn set_state(&mut self, new_state: SyncState) {
        info!(from = %self.state, to = %new_state, "state transition");
        self.state = new_state;
    }
}

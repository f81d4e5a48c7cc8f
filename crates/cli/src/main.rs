//! forgesync command-line tool.
//!
//! Provides subcommands for syncing a generated project with its template,
//! checking whether an update is pending, validating project files, and
//! generating a default configuration.

mod style;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use forgesync_core::config::ProjectConfig;
use forgesync_core::metadata::ProjectMetadata;
use forgesync_core::scaffold::{CommandScaffolder, ScaffoldEngine, DEFAULT_GENERATOR};
use forgesync_core::sync::{SyncOptions, TemplateSync};
use forgesync_core::version::{UpdateTier, VersionTriple};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Keep template-generated projects in sync with template updates.
#[derive(Parser, Debug)]
#[command(
    name = "forgesync",
    version,
    about = "Sync a generated project with updates to its template"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Regenerate the template on the sync branch and propose the changes
    /// as a pull request.
    Sync {
        /// Path to the managed project.
        #[arg(default_value = ".")]
        project_dir: PathBuf,

        /// Account used for API calls and pushes.
        #[arg(long)]
        username: String,

        /// Access token. Falls back to $GITHUB_TOKEN.
        #[arg(long)]
        token: Option<String>,

        /// Pin the current template version instead of querying the
        /// generator.
        #[arg(long)]
        template_version: Option<String>,

        /// Dedicated sync branch name.
        #[arg(long, default_value = "TEMPLATE")]
        sync_branch: String,

        /// Integration branch targeted by the pull request.
        #[arg(long, default_value = "development")]
        base_branch: String,

        /// Scaffold generator command.
        #[arg(long, default_value = DEFAULT_GENERATOR)]
        generator: String,
    },

    /// Report the pending update tier and what the sync policy would do,
    /// without touching the repository.
    Check {
        /// Path to the managed project.
        #[arg(default_value = ".")]
        project_dir: PathBuf,

        /// Pin the current template version instead of querying the
        /// generator.
        #[arg(long)]
        template_version: Option<String>,

        /// Scaffold generator command.
        #[arg(long, default_value = DEFAULT_GENERATOR)]
        generator: String,
    },

    /// Validate the project's metadata and configuration files.
    Validate {
        /// Path to the managed project.
        #[arg(default_value = ".")]
        project_dir: PathBuf,
    },

    /// Write a default forgesync.toml.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./forgesync.toml")]
        output: PathBuf,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .without_time()
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", style::error(&format!("{:#}", e)));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Sync {
            project_dir,
            username,
            token,
            template_version,
            sync_branch,
            base_branch,
            generator,
        } => {
            cmd_sync(
                project_dir,
                username,
                token,
                template_version,
                sync_branch,
                base_branch,
                generator,
            )
            .await
        }
        Commands::Check {
            project_dir,
            template_version,
            generator,
        } => cmd_check(&project_dir, template_version, &generator),
        Commands::Validate { project_dir } => cmd_validate(&project_dir),
        Commands::Init { output } => cmd_init(&output),
    }
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
async fn cmd_sync(
    project_dir: PathBuf,
    username: String,
    token: Option<String>,
    template_version: Option<String>,
    sync_branch: String,
    base_branch: String,
    generator: String,
) -> Result<()> {
    let token = token
        .or_else(|| std::env::var("GITHUB_TOKEN").ok())
        .context("no access token given: pass --token or set GITHUB_TOKEN")?;

    let engine = CommandScaffolder::new(&generator);
    let metadata = ProjectMetadata::load(&project_dir).context("failed to load project metadata")?;
    let version = resolve_template_version(&engine, &metadata, template_version)?;

    println!(
        "{}",
        style::header(&format!(
            "Syncing {} against template '{}' {}",
            project_dir.display(),
            metadata.template_handle,
            version
        ))
    );

    let mut options = SyncOptions::new(&project_dir, &username, &token, &version);
    options.sync_branch = sync_branch;
    options.base_branch = base_branch;

    let mut session = TemplateSync::new(options);
    let outcome = session.run(&engine).await?;

    if !outcome.made_changes {
        if outcome.excluded.is_empty() {
            println!("{}", style::success("No changes to the sync branch - sync complete"));
        } else {
            println!(
                "{}",
                style::success(&format!(
                    "Only blacklisted files changed ({}) - sync complete",
                    outcome.excluded.len()
                ))
            );
        }
        return Ok(());
    }

    println!(
        "{}",
        style::success(&format!(
            "Committed and pushed {} file(s) ({} update)",
            outcome.included.len(),
            outcome.tier
        ))
    );
    if !outcome.excluded.is_empty() {
        println!(
            "{}",
            style::dim(&format!(
                "Excluded {} blacklisted file(s): {}",
                outcome.excluded.len(),
                outcome.excluded.join(", ")
            ))
        );
    }

    if let Some(pr) = outcome.pull_request {
        println!(
            "{}",
            style::success(&format!("Created pull request #{}: {}", pr.number, pr.html_url))
        );
    } else if outcome.pr_already_open {
        println!(
            "{}",
            style::success("An open sync pull request already exists - it picked up the new commits")
        );
    } else if outcome.pr_suppressed_by_policy {
        println!(
            "{}",
            style::warn(&format!(
                "Sync policy suppressed the pull request for a {} update",
                outcome.tier
            ))
        );
    }

    Ok(())
}

fn cmd_check(
    project_dir: &PathBuf,
    template_version: Option<String>,
    generator: &str,
) -> Result<()> {
    let engine = CommandScaffolder::new(generator);
    let metadata = ProjectMetadata::load(project_dir).context("failed to load project metadata")?;
    let (config, _blacklist) = ProjectConfig::load_and_validate(project_dir)
        .context("failed to load project configuration")?;
    let current = resolve_template_version(&engine, &metadata, template_version)?;

    let last: VersionTriple = metadata
        .template_version
        .parse()
        .context("metadata records a malformed template version")?;
    let current_triple: VersionTriple = current
        .parse()
        .context("current template version is malformed")?;
    let tier = UpdateTier::classify(&last, &current_triple);

    println!("Template        : {}", metadata.template_handle);
    println!("Last synced     : {}", last);
    println!("Current version : {}", current_triple);
    println!("Update tier     : {}", tier);
    println!("Sync policy     : {}", config.sync.policy);
    println!();

    match tier {
        UpdateTier::None => {
            println!("{}", style::success("Project is up to date with its template"));
        }
        tier if config.sync.policy.allows(tier) => {
            println!(
                "{}",
                style::warn("A sync would commit the update and open a pull request")
            );
        }
        _ => {
            println!(
                "{}",
                style::dim(
                    "A sync would commit the update, but the policy suppresses a pull request"
                )
            );
        }
    }

    Ok(())
}

fn cmd_validate(project_dir: &PathBuf) -> Result<()> {
    println!("Validating project: {}", project_dir.display());
    println!();

    let metadata = ProjectMetadata::load(project_dir).context("metadata check failed")?;
    println!("  [OK] .forgesync.toml is present and well-formed");
    println!(
        "       template '{}', version {}",
        metadata.template_handle, metadata.template_version
    );

    metadata
        .template_version
        .parse::<VersionTriple>()
        .context("recorded template version is malformed")?;
    println!("  [OK] recorded template version parses");

    let (config, blacklist) =
        ProjectConfig::load_and_validate(project_dir).context("configuration check failed")?;
    println!("  [OK] forgesync.toml is present and well-formed");
    println!("       policy '{}'", config.sync.policy);
    println!(
        "  [OK] {} blacklist glob(s) compile",
        blacklist.patterns().len()
    );

    println!();
    println!("{}", style::success("Project files are valid"));
    Ok(())
}

fn cmd_init(output: &PathBuf) -> Result<()> {
    let default_config = r#"# forgesync project configuration
# See documentation for all available options.

[sync]
# Minimum update significance that opens a pull request:
#   patch - every template update opens a PR
#   minor - minor and major updates open a PR
#   major - only major updates open a PR
policy = "minor"

# Glob patterns excluded from sync commits. Matching files are still
# generated into new projects.
blacklisted_files = ["docs/**", "*.rst"]
"#;

    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, default_config).context("failed to write config file")?;

    println!("Default configuration written to {}", output.display());
    println!();
    println!("Next steps:");
    println!("  1. Adjust the sync policy and blacklist for your project");
    println!("  2. Validate with: forgesync validate");
    println!("  3. Run a sync with: forgesync sync --username <you>");

    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn resolve_template_version(
    engine: &CommandScaffolder,
    metadata: &ProjectMetadata,
    pinned: Option<String>,
) -> Result<String> {
    match pinned {
        Some(version) => Ok(version),
        None => engine
            .template_version(&metadata.template_handle)
            .context("failed to query the generator for the current template version"),
    }
}

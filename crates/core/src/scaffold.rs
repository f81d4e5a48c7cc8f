//! Scaffold-generation engine seam.
//!
//! Template rendering is an external collaborator: forgesync only needs to
//! ask it two things - "regenerate this project into that directory" and
//! "what is the current version of this template". [`ScaffoldEngine`] is
//! the trait seam; [`CommandScaffolder`] is the production implementation
//! that shells out to the generator binary.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::{debug, info, instrument};

use crate::errors::ScaffoldError;
use crate::metadata::ProjectMetadata;

/// Name of the generator binary invoked by default.
pub const DEFAULT_GENERATOR: &str = "forgesync-generate";

/// The narrow contract consumed from the scaffold-generation engine.
///
/// `generate` must be deterministic for identical metadata and fully
/// populate `dest` with `<dest>/<project_slug>/...`.
pub trait ScaffoldEngine {
    /// Generate a fresh project instance from the recorded parameters.
    fn generate(&self, metadata: &ProjectMetadata, dest: &Path) -> Result<(), ScaffoldError>;

    /// Current version of the template identified by `handle`.
    fn template_version(&self, handle: &str) -> Result<String, ScaffoldError>;
}

/// Engine implementation that invokes an external generator command.
///
/// Generation: `<program> generate --metadata <file> --output <dir>`, where
/// the metadata file is the project metadata re-encoded as JSON.
/// Version query: `<program> version <handle>`, version on stdout.
#[derive(Debug, Clone)]
pub struct CommandScaffolder {
    program: String,
}

impl CommandScaffolder {
    pub fn new(program: impl Into<String>) -> Self {
        let scaffolder = Self {
            program: program.into(),
        };
        info!(program = %scaffolder.program, "created CommandScaffolder");
        scaffolder
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn run(&self, args: &[&str]) -> Result<String, ScaffoldError> {
        debug!(program = %self.program, ?args, "running scaffold generator");
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ScaffoldError::BinaryNotFound(self.program.clone())
                } else {
                    ScaffoldError::IoError(e)
                }
            })?;

        if !output.status.success() {
            return Err(ScaffoldError::CommandFailed {
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl ScaffoldEngine for CommandScaffolder {
    #[instrument(skip(self, metadata), fields(handle = %metadata.template_handle))]
    fn generate(&self, metadata: &ProjectMetadata, dest: &Path) -> Result<(), ScaffoldError> {
        let mut params = tempfile::NamedTempFile::new()?;
        let json = serde_json::to_string_pretty(metadata)
            .expect("project metadata is always JSON-encodable");
        params.write_all(json.as_bytes())?;
        params.flush()?;

        let params_path = params.path().to_string_lossy().to_string();
        let dest_path = dest.to_string_lossy().to_string();
        self.run(&[
            "generate",
            "--metadata",
            &params_path,
            "--output",
            &dest_path,
        ])?;
        info!(dest = %dest.display(), "scaffold generation completed");
        Ok(())
    }

    #[instrument(skip(self))]
    fn template_version(&self, handle: &str) -> Result<String, ScaffoldError> {
        let stdout = self.run(&["version", handle])?;
        let version = stdout.trim().to_string();
        if version.is_empty() {
            return Err(ScaffoldError::VersionUnparseable(stdout));
        }
        debug!(handle, version = %version, "queried current template version");
        Ok(version)
    }
}

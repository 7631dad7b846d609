use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command as AsyncCommand;
use tracing::debug;

use crate::error::GitError;

/// The two git operations the sync engine needs
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GitBackend: Send + Sync {
    /// Clone `url` into a new directory inside `workdir`
    async fn clone_repository(&self, url: &str, workdir: &Path) -> Result<(), GitError>;

    /// Update the existing checkout at `repo_dir` from all of its remotes
    async fn pull_all(&self, repo_dir: &Path) -> Result<(), GitError>;
}

/// Runs the git command-line tool as a child process.
///
/// Output is not captured: the child writes straight to our stdout and
/// stderr, so concurrent runs interleave their progress on the terminal.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
}

impl GitCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, args: &[&str], workdir: &Path) -> Result<(), GitError> {
        debug!("Running {} {} in {}", self.program, args.join(" "), workdir.display());

        let status = AsyncCommand::new(&self.program)
            .args(args)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|source| GitError::Launch {
                program: self.program.clone(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(GitError::Exit {
                command: format!("{} {}", self.program, args.join(" ")),
                code: status.code(),
            })
        }
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new("git")
    }
}

#[async_trait]
impl GitBackend for GitCli {
    async fn clone_repository(&self, url: &str, workdir: &Path) -> Result<(), GitError> {
        self.run(&["clone", url], workdir).await
    }

    async fn pull_all(&self, repo_dir: &Path) -> Result<(), GitError> {
        self.run(&["pull", "--all"], repo_dir).await
    }
}

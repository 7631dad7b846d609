//! Sync Engine - clones or pulls every listed repository concurrently
//!
//! Each repository becomes one task. A task checks whether
//! `target_dir/<name>` exists and then either pulls it or clones it into
//! `target_dir`. Failures stay inside their task: they are logged, recorded
//! in the [`SyncSummary`], and never cancel the other tasks.

use futures::stream::{FuturesUnordered, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use crate::config::{SyncConfig, SyncRequest};
use crate::error::{Error, GitError, Result};
use crate::git::{GitBackend, GitCli};
use crate::github::GitHubClient;
use crate::repository::Repository;

/// Outcome of one repository task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncResult {
    /// Repository was not present locally and has been cloned
    Cloned { name: String, path: PathBuf },
    /// Repository was present locally and has been pulled
    Pulled { name: String, path: PathBuf },
    /// Clone or pull failed; the message names the repository and the cause
    Failed {
        name: String,
        path: PathBuf,
        error: String,
    },
}

impl SyncResult {
    pub fn name(&self) -> &str {
        match self {
            SyncResult::Cloned { name, .. }
            | SyncResult::Pulled { name, .. }
            | SyncResult::Failed { name, .. } => name,
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, SyncResult::Failed { .. })
    }
}

/// Results from a complete sync run
#[derive(Debug, Clone)]
pub struct SyncSummary {
    /// Repositories processed, successful or not
    pub total_repositories: usize,
    pub cloned: usize,
    pub pulled: usize,
    pub failed: usize,
    pub duration: Duration,
    /// One entry per repository, in completion order
    pub results: Vec<SyncResult>,
}

impl SyncSummary {
    fn from_results(results: Vec<SyncResult>, duration: Duration) -> Self {
        let mut cloned = 0;
        let mut pulled = 0;
        let mut failed = 0;

        for result in &results {
            match result {
                SyncResult::Cloned { .. } => cloned += 1,
                SyncResult::Pulled { .. } => pulled += 1,
                SyncResult::Failed { .. } => failed += 1,
            }
        }

        Self {
            total_repositories: results.len(),
            cloned,
            pulled,
            failed,
            duration,
            results,
        }
    }

    pub fn successful(&self) -> usize {
        self.cloned + self.pulled
    }

    pub fn failures(&self) -> impl Iterator<Item = &SyncResult> {
        self.results.iter().filter(|result| !result.is_success())
    }
}

/// Which git operation a task settled on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncAction {
    Clone,
    Pull,
}

impl SyncAction {
    fn verb(self) -> &'static str {
        match self {
            SyncAction::Clone => "clone",
            SyncAction::Pull => "pull",
        }
    }
}

/// Orchestrates clone-or-pull for a set of repositories
#[derive(Clone)]
pub struct SyncEngine {
    git: Arc<dyn GitBackend>,
    max_parallel: Option<usize>,
}

impl SyncEngine {
    /// Create an engine that drives `git`, limited to `max_parallel` concurrent
    /// tasks when set and unbounded otherwise
    pub fn new(git: Arc<dyn GitBackend>, max_parallel: Option<usize>) -> Self {
        Self {
            git,
            max_parallel: max_parallel.filter(|n| *n > 0),
        }
    }

    /// Create an engine that runs the configured git program
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(
            Arc::new(GitCli::new(config.git_program.clone())),
            config.max_parallel,
        )
    }

    /// List the requested owner's repositories and sync them into the target
    /// directory.
    ///
    /// Listing failures abort before anything touches the disk.
    pub async fn run(&self, request: &SyncRequest) -> Result<SyncSummary> {
        let client = GitHubClient::new(&request.api_base_url, &request.token)?;
        let repositories = client.list_repositories(&request.owner).await?;

        info!(
            "Clone or pull {} repositories into {}",
            repositories.len(),
            request.target_dir.display()
        );

        self.sync_all(&repositories, &request.target_dir).await
    }

    /// Clone or pull every repository into `target_dir`.
    ///
    /// Returns once every task has finished. Only a failure to create
    /// `target_dir` is returned as an error; per-repository failures are in
    /// the summary.
    pub async fn sync_all(&self, repositories: &[Repository], target_dir: &Path) -> Result<SyncSummary> {
        let start_time = Instant::now();

        ensure_directory(target_dir).await?;

        let semaphore = self.max_parallel.map(|n| Arc::new(Semaphore::new(n)));
        match self.max_parallel {
            Some(limit) => info!(
                "Syncing {} repositories, at most {} at a time",
                repositories.len(),
                limit
            ),
            None => info!("Syncing {} repositories", repositories.len()),
        }

        let mut tasks = FuturesUnordered::new();
        for repo in repositories {
            let semaphore = semaphore.clone();
            tasks.push(async move {
                // Only held while the git process runs.
                let _permit = match &semaphore {
                    Some(semaphore) => semaphore.acquire().await.ok(),
                    None => None,
                };
                self.sync_repository(repo, target_dir).await
            });
        }

        let mut results = Vec::with_capacity(repositories.len());
        while let Some(result) = tasks.next().await {
            results.push(result);
        }

        let summary = SyncSummary::from_results(results, start_time.elapsed());
        info!(
            "Sync completed in {:.2}s: {} cloned, {} pulled, {} failed",
            summary.duration.as_secs_f64(),
            summary.cloned,
            summary.pulled,
            summary.failed
        );

        Ok(summary)
    }

    /// Run one repository task to a terminal state
    async fn sync_repository(&self, repo: &Repository, target_dir: &Path) -> SyncResult {
        let path = target_dir.join(&repo.name);
        let action = if path.exists() {
            SyncAction::Pull
        } else {
            SyncAction::Clone
        };

        match self.perform(action, repo, &path, target_dir).await {
            Ok(()) => match action {
                SyncAction::Clone => {
                    info!(repo = %repo.name, "Cloned repository: {}", repo.name);
                    SyncResult::Cloned {
                        name: repo.name.clone(),
                        path,
                    }
                }
                SyncAction::Pull => {
                    info!(repo = %repo.name, "Pulled repository: {}", repo.name);
                    SyncResult::Pulled {
                        name: repo.name.clone(),
                        path,
                    }
                }
            },
            Err(source) => {
                let err = Error::RepoSync {
                    repo: repo.name.clone(),
                    action: action.verb(),
                    source,
                };
                error!(repo = %repo.name, "{}", err);
                SyncResult::Failed {
                    name: repo.name.clone(),
                    path,
                    error: err.to_string(),
                }
            }
        }
    }

    async fn perform(
        &self,
        action: SyncAction,
        repo: &Repository,
        path: &Path,
        target_dir: &Path,
    ) -> std::result::Result<(), GitError> {
        if !repo.has_valid_name() {
            return Err(GitError::Unusable(format!(
                "repository name {:?} is not a plain directory name",
                repo.name
            )));
        }

        match action {
            SyncAction::Pull => {
                info!(
                    repo = %repo.name,
                    "Repository {} already exists. Performing git pull...",
                    repo.name
                );
                self.git.pull_all(path).await
            }
            SyncAction::Clone => {
                let url = repo.preferred_clone_url().ok_or_else(|| {
                    GitError::Unusable("listing entry has no clone URL".to_string())
                })?;
                info!(repo = %repo.name, "Cloning repository {}...", repo.name);
                debug!(repo = %repo.name, "Clone URL: {}", url);
                self.git.clone_repository(url, target_dir).await
            }
        }
    }
}

/// Create `dir` and any missing parents
async fn ensure_directory(dir: &Path) -> Result<()> {
    let directory_error = |source: std::io::Error| Error::Directory {
        path: dir.to_path_buf(),
        source,
    };

    match tokio::fs::metadata(dir).await {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(directory_error(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "path exists and is not a directory",
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tokio::fs::create_dir_all(dir).await.map_err(directory_error)?;
            info!("Directory created successfully: {}", dir.display());
            Ok(())
        }
        Err(e) => Err(directory_error(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::MockGitBackend;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio::sync::Barrier;

    fn repo(name: &str) -> Repository {
        Repository::new(
            name,
            Some(format!("https://github.com/acme/{}.git", name)),
            Some(format!("git@github.com:acme/{}.git", name)),
        )
    }

    #[tokio::test]
    async fn test_absent_repositories_are_cloned_into_target() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("acme");
        let expected_workdir = target.clone();

        let mut git = MockGitBackend::new();
        git.expect_clone_repository()
            .withf(move |url, workdir| url.starts_with("git@github.com:acme/") && workdir == expected_workdir)
            .times(2)
            .returning(|_, _| Ok(()));
        git.expect_pull_all().never();

        let engine = SyncEngine::new(Arc::new(git), None);
        let summary = engine
            .sync_all(&[repo("repo1"), repo("repo2")], &target)
            .await
            .expect("sync succeeds");

        assert!(target.is_dir());
        assert_eq!(summary.total_repositories, 2);
        assert_eq!(summary.cloned, 2);
        assert_eq!(summary.failed, 0);
    }

    #[tokio::test]
    async fn test_existing_repository_is_pulled_in_place() {
        let temp = TempDir::new().unwrap();
        let existing = temp.path().join("repo1");
        std::fs::create_dir(&existing).unwrap();
        let expected_dir = existing.clone();

        let mut git = MockGitBackend::new();
        git.expect_pull_all()
            .withf(move |dir| dir == expected_dir)
            .times(1)
            .returning(|_| Ok(()));
        git.expect_clone_repository()
            .withf(|url, _| url == "git@github.com:acme/repo2.git")
            .times(1)
            .returning(|_, _| Ok(()));

        let engine = SyncEngine::new(Arc::new(git), None);
        let summary = engine
            .sync_all(&[repo("repo1"), repo("repo2")], temp.path())
            .await
            .unwrap();

        assert_eq!((summary.cloned, summary.pulled), (1, 1));
        let pulled = summary
            .results
            .iter()
            .find(|r| r.name() == "repo1")
            .unwrap();
        assert_eq!(
            pulled,
            &SyncResult::Pulled {
                name: "repo1".to_string(),
                path: existing,
            }
        );
    }

    #[tokio::test]
    async fn test_one_failure_does_not_stop_the_batch() {
        let temp = TempDir::new().unwrap();

        let mut git = MockGitBackend::new();
        git.expect_clone_repository().returning(|url, _| {
            if url.ends_with("/broken.git") {
                Err(GitError::Exit {
                    command: format!("git clone {}", url),
                    code: Some(128),
                })
            } else {
                Ok(())
            }
        });

        let engine = SyncEngine::new(Arc::new(git), None);
        let repos = [repo("repo1"), repo("broken"), repo("repo3")];
        let summary = engine.sync_all(&repos, temp.path()).await.unwrap();

        assert_eq!(summary.total_repositories, 3);
        assert_eq!(summary.successful(), 2);
        assert_eq!(summary.failed, 1);

        let failures: Vec<_> = summary.failures().collect();
        assert_matches!(
            failures.as_slice(),
            [SyncResult::Failed { name, error, .. }]
                if name == "broken" && error.contains("clone repository broken") && error.contains("status 128")
        );
    }

    #[tokio::test]
    async fn test_unusable_entries_fail_without_running_git() {
        let temp = TempDir::new().unwrap();

        let mut git = MockGitBackend::new();
        git.expect_clone_repository().never();
        git.expect_pull_all().never();

        let engine = SyncEngine::new(Arc::new(git), None);
        let repos = [
            Repository::new("no-urls", None, None),
            Repository::new("../escape", None, Some("git@github.com:acme/x.git".to_string())),
        ];
        let summary = engine.sync_all(&repos, temp.path()).await.unwrap();

        assert_eq!(summary.total_repositories, 2);
        assert_eq!(summary.failed, 2);
    }

    #[tokio::test]
    async fn test_target_that_is_a_file_is_fatal() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("not-a-dir");
        std::fs::write(&file, "x").unwrap();

        let mut git = MockGitBackend::new();
        git.expect_clone_repository().never();

        let engine = SyncEngine::new(Arc::new(git), None);
        let result = engine.sync_all(&[repo("repo1")], &file).await;
        assert_matches!(result, Err(Error::Directory { path, .. }) if path == file);
    }

    #[tokio::test]
    async fn test_empty_listing_still_creates_target() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("a").join("b");

        let engine = SyncEngine::new(Arc::new(MockGitBackend::new()), None);
        let summary = engine.sync_all(&[], &target).await.unwrap();

        assert!(target.is_dir());
        assert_eq!(summary.total_repositories, 0);
    }

    /// Clones block on a barrier sized to the whole batch, so the run only
    /// completes if every task is in flight at once.
    struct BarrierGit {
        barrier: Barrier,
    }

    #[async_trait]
    impl GitBackend for BarrierGit {
        async fn clone_repository(&self, _url: &str, _workdir: &Path) -> std::result::Result<(), GitError> {
            self.barrier.wait().await;
            Ok(())
        }

        async fn pull_all(&self, _repo_dir: &Path) -> std::result::Result<(), GitError> {
            self.barrier.wait().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_unbounded_tasks_all_run_concurrently() {
        let temp = TempDir::new().unwrap();
        let repos: Vec<_> = (0..25).map(|i| repo(&format!("repo{}", i))).collect();

        let git = BarrierGit {
            barrier: Barrier::new(repos.len()),
        };
        let engine = SyncEngine::new(Arc::new(git), None);

        let summary = tokio::time::timeout(
            Duration::from_secs(10),
            engine.sync_all(&repos, temp.path()),
        )
        .await
        .expect("all tasks run at the same time")
        .unwrap();

        assert_eq!(summary.cloned, 25);
    }

    /// Tracks how many clones are in flight at once.
    #[derive(Default)]
    struct CountingGit {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        finished: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl GitBackend for CountingGit {
        async fn clone_repository(&self, url: &str, _workdir: &Path) -> std::result::Result<(), GitError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.finished.lock().unwrap().push(url.to_string());
            Ok(())
        }

        async fn pull_all(&self, _repo_dir: &Path) -> std::result::Result<(), GitError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_max_parallel_caps_in_flight_tasks() {
        let temp = TempDir::new().unwrap();
        let repos: Vec<_> = (0..10).map(|i| repo(&format!("repo{}", i))).collect();

        let git = Arc::new(CountingGit::default());
        let engine = SyncEngine::new(git.clone(), Some(3));
        let summary = engine.sync_all(&repos, temp.path()).await.unwrap();

        assert_eq!(summary.cloned, 10);
        assert!(git.peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(git.in_flight.load(Ordering::SeqCst), 0);
        assert_eq!(git.finished.lock().unwrap().len(), 10);
    }

    #[test]
    fn test_zero_max_parallel_means_unbounded() {
        let engine = SyncEngine::new(Arc::new(MockGitBackend::new()), Some(0));
        assert_eq!(engine.max_parallel, None);
    }

    #[test]
    fn test_summary_counts() {
        let results = vec![
            SyncResult::Cloned {
                name: "repo1".to_string(),
                path: "/tmp/repo1".into(),
            },
            SyncResult::Pulled {
                name: "repo2".to_string(),
                path: "/tmp/repo2".into(),
            },
            SyncResult::Failed {
                name: "repo3".to_string(),
                path: "/tmp/repo3".into(),
                error: "Network error".to_string(),
            },
        ];

        let summary = SyncSummary::from_results(results, Duration::from_secs(1));
        assert_eq!(summary.total_repositories, 3);
        assert_eq!(summary.successful(), 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures().count(), 1);
    }
}

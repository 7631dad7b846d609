//! Common test utilities shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use repos::{GitBackend, GitError};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

/// One listing entry the way the GitHub API returns it
pub fn repo_json(owner: &str, name: &str) -> Value {
    json!({
        "id": 1,
        "name": name,
        "full_name": format!("{}/{}", owner, name),
        "private": false,
        "clone_url": format!("https://github.com/{}/{}.git", owner, name),
        "ssh_url": format!("git@github.com:{}/{}.git", owner, name),
    })
}

/// A listing page with repositories named `{prefix}{start}..{prefix}{start + count - 1}`
pub fn page_json(owner: &str, prefix: &str, start: usize, count: usize) -> Value {
    Value::Array(
        (start..start + count)
            .map(|i| repo_json(owner, &format!("{}{}", prefix, i)))
            .collect(),
    )
}

/// `Link` header value pointing at `next_page`
pub fn next_link(base: &str, next_page: u32) -> String {
    format!(
        r#"<{base}?per_page=100&page={next}>; rel="next", <{base}?per_page=100&page=99>; rel="last""#,
        base = base,
        next = next_page
    )
}

/// A git call recorded by [`RecordingGit`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitCall {
    Clone { url: String, workdir: PathBuf },
    Pull { repo_dir: PathBuf },
}

/// Git backend that records calls and fails for URLs or directories
/// containing any of `failing`
#[derive(Default)]
pub struct RecordingGit {
    pub calls: Mutex<Vec<GitCall>>,
    pub failing: Vec<String>,
}

impl RecordingGit {
    pub fn failing_on(names: &[&str]) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    pub fn calls(&self) -> Vec<GitCall> {
        self.calls.lock().unwrap().clone()
    }

    fn outcome(&self, subject: &str, command: String) -> Result<(), GitError> {
        if self.failing.iter().any(|name| subject.contains(name.as_str())) {
            Err(GitError::Exit {
                command,
                code: Some(1),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl GitBackend for RecordingGit {
    async fn clone_repository(&self, url: &str, workdir: &Path) -> Result<(), GitError> {
        self.calls.lock().unwrap().push(GitCall::Clone {
            url: url.to_string(),
            workdir: workdir.to_path_buf(),
        });
        self.outcome(url, format!("git clone {}", url))
    }

    async fn pull_all(&self, repo_dir: &Path) -> Result<(), GitError> {
        self.calls.lock().unwrap().push(GitCall::Pull {
            repo_dir: repo_dir.to_path_buf(),
        });
        self.outcome(&repo_dir.to_string_lossy(), "git pull --all".to_string())
    }
}

/// Whether a usable git binary is on PATH
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Run git in `dir` with a throwaway identity, panicking on failure
pub fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=repos test",
            "-c",
            "user.email=repos@example.com",
            "-c",
            "init.defaultBranch=main",
        ])
        .args(args)
        .current_dir(dir)
        .output()
        .expect("Failed to run git");

    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Create a repository with one commit at `dir` and return its path as a clone URL
pub fn create_source_repo(dir: &Path) -> String {
    std::fs::create_dir_all(dir).expect("Failed to create source dir");
    git(dir, &["init", "--quiet"]);
    std::fs::write(dir.join("README.md"), "hello\n").expect("Failed to write file");
    git(dir, &["add", "README.md"]);
    git(dir, &["commit", "--quiet", "-m", "initial"]);
    dir.to_string_lossy().into_owned()
}

//! repos - clone or pull every repository of a GitHub organization or user
//!
//! The library lists all repositories an owner has on a GitHub-compatible
//! host, following pagination, and then brings a local directory in sync:
//! missing repositories are cloned, existing ones are pulled. Every
//! repository is handled by its own concurrent task, and one failing
//! repository never stops the others.
//!
//! ## Modules
//!
//! - [`github`]: paginated repository listing and token resolution
//! - [`sync`]: concurrent clone-or-pull orchestration
//! - [`git`]: the git backend seam and its command-line implementation
//! - [`config`]: YAML configuration, stored owner/directory pairs, run requests
//! - [`repository`]: repository and owner types
//! - [`error`]: the error taxonomy

pub mod config;
pub mod error;
pub mod git;
pub mod github;
pub mod repository;
pub mod sync;

pub use config::{Config, SyncPair, SyncRequest};
pub use error::{Error, GitError, Result};
pub use git::{GitBackend, GitCli};
pub use github::GitHubClient;
pub use repository::{Owner, Repository};
pub use sync::{SyncEngine, SyncResult, SyncSummary};

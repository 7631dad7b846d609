//! Repository and owner types shared by the lister and the orchestrator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path};

use crate::error::{Error, Result};

/// One remote repository as returned by the listing API
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Repository {
    /// Repository name, used as the local directory name
    pub name: String,

    /// HTTPS clone URL
    #[serde(default)]
    pub clone_url: Option<String>,

    /// SSH clone URL
    #[serde(default)]
    pub ssh_url: Option<String>,
}

impl Repository {
    pub fn new(
        name: impl Into<String>,
        clone_url: Option<String>,
        ssh_url: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            clone_url,
            ssh_url,
        }
    }

    /// URL used for cloning: SSH when the listing has one, HTTPS otherwise
    pub fn preferred_clone_url(&self) -> Option<&str> {
        self.ssh_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .or_else(|| self.clone_url.as_deref().filter(|url| !url.is_empty()))
    }

    /// Whether `name` can safely be joined onto the target directory.
    ///
    /// The name has to be exactly one normal path component, so entries like
    /// `..` or `a/b` never escape or nest inside the target root.
    pub fn has_valid_name(&self) -> bool {
        let mut components = Path::new(&self.name).components();
        matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        )
    }
}

/// Whose repositories to list
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Owner {
    Organization(String),
    User(String),
}

impl Owner {
    /// Build an owner from the optional organization and user inputs.
    ///
    /// Exactly one of the two must be non-blank.
    pub fn from_parts(organization: Option<&str>, user: Option<&str>) -> Result<Self> {
        let organization = organization.map(str::trim).filter(|s| !s.is_empty());
        let user = user.map(str::trim).filter(|s| !s.is_empty());

        match (organization, user) {
            (Some(org), None) => Ok(Owner::Organization(org.to_string())),
            (None, Some(user)) => Ok(Owner::User(user.to_string())),
            (Some(_), Some(_)) => Err(Error::InvalidInput(
                "provide either an organization name or a username, not both".to_string(),
            )),
            (None, None) => Err(Error::InvalidInput(
                "an organization name or a username is required".to_string(),
            )),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Owner::Organization(name) | Owner::User(name) => name,
        }
    }

    /// Path segment of the listing endpoint (`orgs` or `users`)
    pub fn api_segment(&self) -> &'static str {
        match self {
            Owner::Organization(_) => "orgs",
            Owner::User(_) => "users",
        }
    }

    /// Short kind tag used in stored pairs (`org` or `user`)
    pub fn kind(&self) -> &'static str {
        match self {
            Owner::Organization(_) => "org",
            Owner::User(_) => "user",
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::Organization(name) => write!(f, "organization {}", name),
            Owner::User(name) => write!(f, "user {}", name),
        }
    }
}

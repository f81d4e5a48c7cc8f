//! Version-control and hosting-service clients.

pub mod client;
pub mod github;

pub use client::{BranchSource, GitClient};
pub use github::{GitHubClient, PullRequest};

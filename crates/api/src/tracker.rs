use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Issue, IssueUpdate};

/// The five issue operations, as a seam for callers that want to swap the
/// HTTP client for something else.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Persist a new issue and return it with its server-assigned key.
    async fn create_issue(&self, issue: &Issue) -> Result<Issue>;

    async fn get_issue(&self, key: &str) -> Result<Issue>;

    /// Apply only the fields present in `update`.
    async fn update_issue(&self, key: &str, update: &IssueUpdate) -> Result<Issue>;

    async fn delete_issue(&self, key: &str) -> Result<()>;

    /// All issues matching `jql`; empty when nothing matches.
    async fn search_issues(&self, jql: &str) -> Result<Vec<Issue>>;
}

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use issuetracker_api::{
    Issue, IssueTracker, IssueTrackerClient, IssueUpdate, JqlBuilder, Priority, Status,
};
use issuetracker_output::OutputRenderer;
use serde::Serialize;

#[derive(Subcommand, Debug, Clone)]
pub enum IssueCommand {
    /// Create a new issue
    Create(CreateArgs),
    /// Show a single issue
    Get {
        /// Issue key (e.g. PROJ-123)
        key: String,
    },
    /// Change fields of an existing issue
    Update(UpdateArgs),
    /// Delete an issue
    Delete {
        /// Issue key (e.g. PROJ-123)
        key: String,
    },
    /// Search issues with JQL or simple filters
    Search(SearchArgs),
    /// Move an issue through its workflow, or list available transitions
    Transition {
        /// Issue key (e.g. PROJ-123)
        key: String,
        /// Transition name, id or destination status
        target: Option<String>,
    },
    /// Assign an issue to an account, or clear the assignee
    Assign(AssignArgs),
    /// Add a comment to an issue
    Comment {
        /// Issue key (e.g. PROJ-123)
        key: String,
        /// Comment text
        body: String,
    },
    /// List comments on an issue
    Comments {
        /// Issue key (e.g. PROJ-123)
        key: String,
    },
    /// Log time spent on an issue
    Worklog(WorklogArgs),
    /// List time logged on an issue
    Worklogs {
        /// Issue key (e.g. PROJ-123)
        key: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct WorklogArgs {
    /// Issue key (e.g. PROJ-123)
    pub key: String,
    /// Time spent, e.g. `2h 30m` or `1d`
    #[arg(long = "time")]
    pub time_spent: String,
    #[arg(long)]
    pub comment: Option<String>,
    /// When the work started (RFC 3339); the tracker uses now when omitted
    #[arg(long)]
    pub started: Option<DateTime<Utc>>,
}

#[derive(Args, Debug, Clone)]
pub struct CreateArgs {
    /// Project key
    #[arg(long)]
    pub project: String,
    #[arg(long)]
    pub summary: String,
    #[arg(long)]
    pub description: Option<String>,
    /// High, Medium, Low or any priority name the tracker knows
    #[arg(long)]
    pub priority: Option<String>,
    /// Issue type name
    #[arg(long = "type", default_value = "Task")]
    pub issue_type: String,
    /// Labels, comma separated
    #[arg(long, value_delimiter = ',')]
    pub labels: Vec<String>,
}

impl CreateArgs {
    pub fn to_issue(&self) -> Issue {
        let mut issue = Issue::new(&self.project, &self.summary)
            .with_issue_type(&self.issue_type)
            .with_labels(self.labels.iter().map(|l| l.trim()).filter(|l| !l.is_empty()));
        if let Some(description) = &self.description {
            issue = issue.with_description(description);
        }
        if let Some(priority) = &self.priority {
            issue = issue.with_priority(Priority::from(priority.as_str()));
        }
        issue
    }
}

#[derive(Args, Debug, Clone)]
pub struct UpdateArgs {
    /// Issue key (e.g. PROJ-123)
    pub key: String,
    #[arg(long)]
    pub summary: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub priority: Option<String>,
    /// Replace all labels, comma separated
    #[arg(long, value_delimiter = ',')]
    pub labels: Option<Vec<String>>,
    /// Target status, applied through a workflow transition
    #[arg(long)]
    pub status: Option<String>,
}

impl UpdateArgs {
    pub fn to_update(&self) -> IssueUpdate {
        IssueUpdate {
            summary: self.summary.clone(),
            description: self.description.clone(),
            priority: self.priority.as_deref().map(Priority::from),
            labels: self.labels.clone(),
            status: self.status.as_deref().map(Status::from),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Raw JQL; the filter flags are ignored when this is given
    #[arg(long)]
    pub jql: Option<String>,
    #[arg(long)]
    pub project: Option<String>,
    #[arg(long)]
    pub status: Option<String>,
    /// Account, `@me` or `unassigned`
    #[arg(long)]
    pub assignee: Option<String>,
    /// Full-text match on summary and description
    #[arg(long)]
    pub text: Option<String>,
    /// Stop after this many issues
    #[arg(long)]
    pub limit: Option<usize>,
}

impl SearchArgs {
    pub fn to_jql(&self) -> String {
        if let Some(jql) = &self.jql {
            return jql.clone();
        }

        let mut builder = JqlBuilder::new();
        if let Some(project) = &self.project {
            builder = builder.eq("project", project);
        }
        if let Some(status) = &self.status {
            builder = builder.eq("status", status);
        }
        if let Some(assignee) = &self.assignee {
            builder = builder.eq("assignee", assignee);
        }
        if let Some(text) = &self.text {
            builder = builder.contains("text", text);
        }
        if builder.is_empty() {
            return String::new();
        }
        builder.order_by("created", true).finish()
    }
}

#[derive(Args, Debug, Clone)]
pub struct AssignArgs {
    /// Issue key (e.g. PROJ-123)
    pub key: String,
    /// Account id of the new assignee
    #[arg(required_unless_present = "unassign")]
    pub account_id: Option<String>,
    /// Remove the current assignee
    #[arg(long, conflicts_with = "account_id")]
    pub unassign: bool,
}

/// Compact listing shape for search results.
#[derive(Serialize)]
struct IssueRow<'a> {
    key: &'a str,
    summary: &'a str,
    status: &'a str,
    priority: &'a str,
    issue_type: &'a str,
    assignee: &'a str,
}

impl<'a> From<&'a Issue> for IssueRow<'a> {
    fn from(issue: &'a Issue) -> Self {
        Self {
            key: issue.key.as_deref().unwrap_or(""),
            summary: &issue.summary,
            status: issue.status.as_str(),
            priority: issue.priority.as_ref().map(Priority::as_str).unwrap_or(""),
            issue_type: &issue.issue_type,
            assignee: issue.assignee.as_deref().unwrap_or(""),
        }
    }
}

pub async fn execute(
    command: IssueCommand,
    client: &IssueTrackerClient,
    renderer: &OutputRenderer,
) -> Result<()> {
    match command {
        IssueCommand::Create(args) => create(client, &args, renderer).await,
        IssueCommand::Get { key } => get(client, &key, renderer).await,
        IssueCommand::Update(args) => update(client, &args, renderer).await,
        IssueCommand::Delete { key } => delete(client, &key, renderer).await,
        IssueCommand::Search(args) => search(client, &args, renderer).await,
        IssueCommand::Transition { key, target } => {
            transition(client, &key, target.as_deref(), renderer).await
        }
        IssueCommand::Assign(args) => assign(client, &args, renderer).await,
        IssueCommand::Comment { key, body } => {
            let comment = client
                .add_comment(&key, &body)
                .await
                .with_context(|| format!("Failed to comment on {key}"))?;
            renderer.success(&format!("Added comment {} to {key}", comment.id));
            renderer.render(&comment)
        }
        IssueCommand::Comments { key } => {
            let comments = client
                .comments(&key)
                .await
                .with_context(|| format!("Failed to fetch comments for {key}"))?;
            renderer.render(&comments)
        }
        IssueCommand::Worklog(args) => {
            let worklog = client
                .add_worklog(
                    &args.key,
                    &args.time_spent,
                    args.comment.as_deref(),
                    args.started,
                )
                .await
                .with_context(|| format!("Failed to log work on {}", args.key))?;
            renderer.success(&format!("Logged {} on {}", worklog.time_spent, args.key));
            renderer.render(&worklog)
        }
        IssueCommand::Worklogs { key } => {
            let worklogs = client
                .worklogs(&key)
                .await
                .with_context(|| format!("Failed to fetch worklogs for {key}"))?;
            renderer.render(&worklogs)
        }
    }
}

pub async fn create<T>(tracker: &T, args: &CreateArgs, renderer: &OutputRenderer) -> Result<()>
where
    T: IssueTracker + ?Sized,
{
    let created = tracker
        .create_issue(&args.to_issue())
        .await
        .context("Failed to create issue")?;

    renderer.success(&format!(
        "Created issue {}",
        created.key.as_deref().unwrap_or_default()
    ));
    renderer.render(&IssueRow::from(&created))
}

pub async fn get<T>(tracker: &T, key: &str, renderer: &OutputRenderer) -> Result<()>
where
    T: IssueTracker + ?Sized,
{
    let issue = tracker
        .get_issue(key)
        .await
        .with_context(|| format!("Failed to fetch issue {key}"))?;
    renderer.render(&issue)
}

pub async fn update<T>(tracker: &T, args: &UpdateArgs, renderer: &OutputRenderer) -> Result<()>
where
    T: IssueTracker + ?Sized,
{
    let issue = tracker
        .update_issue(&args.key, &args.to_update())
        .await
        .with_context(|| format!("Failed to update issue {}", args.key))?;

    renderer.success(&format!("Updated issue {}", args.key));
    renderer.render(&IssueRow::from(&issue))
}

pub async fn delete<T>(tracker: &T, key: &str, renderer: &OutputRenderer) -> Result<()>
where
    T: IssueTracker + ?Sized,
{
    tracker
        .delete_issue(key)
        .await
        .with_context(|| format!("Failed to delete issue {key}"))?;
    renderer.success(&format!("Deleted issue {key}"));
    Ok(())
}

/// `--limit` goes through the paged client directly; everything else uses
/// the plain search operation.
async fn search(
    client: &IssueTrackerClient,
    args: &SearchArgs,
    renderer: &OutputRenderer,
) -> Result<()> {
    let Some(limit) = args.limit else {
        return search_all(client, args, renderer).await;
    };

    let issues = client
        .search_issues_limited(&args.to_jql(), limit)
        .await
        .context("Failed to execute search")?;
    render_issues(&issues, renderer)
}

pub async fn search_all<T>(tracker: &T, args: &SearchArgs, renderer: &OutputRenderer) -> Result<()>
where
    T: IssueTracker + ?Sized,
{
    let issues = tracker
        .search_issues(&args.to_jql())
        .await
        .context("Failed to execute search")?;
    render_issues(&issues, renderer)
}

fn render_issues(issues: &[Issue], renderer: &OutputRenderer) -> Result<()> {
    let rows: Vec<IssueRow<'_>> = issues.iter().map(IssueRow::from).collect();
    renderer.render(&rows)
}

async fn transition(
    client: &IssueTrackerClient,
    key: &str,
    target: Option<&str>,
    renderer: &OutputRenderer,
) -> Result<()> {
    match target {
        Some(target) => {
            let applied = client
                .transition_issue(key, target)
                .await
                .with_context(|| format!("Failed to transition {key}"))?;
            renderer.success(&format!("Moved {key} via '{}'", applied.name));
            Ok(())
        }
        None => {
            let transitions = client
                .transitions(key)
                .await
                .with_context(|| format!("Failed to list transitions for {key}"))?;
            renderer.render(&transitions)
        }
    }
}

async fn assign(
    client: &IssueTrackerClient,
    args: &AssignArgs,
    renderer: &OutputRenderer,
) -> Result<()> {
    let account = if args.unassign {
        None
    } else {
        args.account_id.as_deref()
    };

    client
        .assign_issue(&args.key, account)
        .await
        .with_context(|| format!("Failed to assign {}", args.key))?;

    match account {
        Some(account) => renderer.success(&format!("Assigned {} to {account}", args.key)),
        None => renderer.success(&format!("Unassigned {}", args.key)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use issuetracker_api::{ApiError, Result as ApiResult};
    use issuetracker_output::OutputFormat;
    use std::sync::Mutex;

    /// In-memory tracker recording what the handlers ask of it.
    #[derive(Default)]
    struct MemoryTracker {
        issues: Mutex<Vec<Issue>>,
        queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl IssueTracker for MemoryTracker {
        async fn create_issue(&self, issue: &Issue) -> ApiResult<Issue> {
            issue.validate_new()?;
            let mut issues = self.issues.lock().unwrap();
            let mut created = issue.clone();
            created.key = Some(format!("{}-{}", issue.project_key, issues.len() + 1));
            issues.push(created.clone());
            Ok(created)
        }

        async fn get_issue(&self, key: &str) -> ApiResult<Issue> {
            self.issues
                .lock()
                .unwrap()
                .iter()
                .find(|issue| issue.key.as_deref() == Some(key))
                .cloned()
                .ok_or_else(|| ApiError::NotFound {
                    resource: key.to_string(),
                })
        }

        async fn update_issue(&self, key: &str, update: &IssueUpdate) -> ApiResult<Issue> {
            update.validate()?;
            let mut issues = self.issues.lock().unwrap();
            let issue = issues
                .iter_mut()
                .find(|issue| issue.key.as_deref() == Some(key))
                .ok_or_else(|| ApiError::NotFound {
                    resource: key.to_string(),
                })?;
            if let Some(summary) = &update.summary {
                issue.summary = summary.clone();
            }
            if let Some(description) = &update.description {
                issue.description = Some(description.clone());
            }
            if let Some(status) = &update.status {
                issue.status = status.clone();
            }
            Ok(issue.clone())
        }

        async fn delete_issue(&self, key: &str) -> ApiResult<()> {
            let mut issues = self.issues.lock().unwrap();
            let before = issues.len();
            issues.retain(|issue| issue.key.as_deref() != Some(key));
            if issues.len() == before {
                return Err(ApiError::NotFound {
                    resource: key.to_string(),
                });
            }
            Ok(())
        }

        async fn search_issues(&self, jql: &str) -> ApiResult<Vec<Issue>> {
            if jql.trim().is_empty() {
                return Err(ApiError::validation("JQL query must not be empty"));
            }
            self.queries.lock().unwrap().push(jql.to_string());
            Ok(self.issues.lock().unwrap().clone())
        }
    }

    fn quiet() -> OutputRenderer {
        OutputRenderer::new(OutputFormat::Quiet)
    }

    fn create_args(summary: &str) -> CreateArgs {
        CreateArgs {
            project: "PROJ".to_string(),
            summary: summary.to_string(),
            description: Some("details".to_string()),
            priority: Some("high".to_string()),
            issue_type: "Bug".to_string(),
            labels: vec!["ui".to_string(), " ".to_string()],
        }
    }

    fn search_args() -> SearchArgs {
        SearchArgs {
            jql: None,
            project: None,
            status: None,
            assignee: None,
            text: None,
            limit: None,
        }
    }

    #[test]
    fn test_create_args_to_issue() {
        let issue = create_args("Crash on save").to_issue();
        assert_eq!(issue.project_key, "PROJ");
        assert_eq!(issue.issue_type, "Bug");
        assert_eq!(issue.priority, Some(Priority::High));
        assert_eq!(issue.labels, vec!["ui".to_string()]);
        assert!(issue.key.is_none());
    }

    #[test]
    fn test_update_args_only_set_fields() {
        let args = UpdateArgs {
            key: "PROJ-1".to_string(),
            summary: None,
            description: Some("updated".to_string()),
            priority: None,
            labels: None,
            status: Some("in progress".to_string()),
        };

        let update = args.to_update();
        assert_eq!(update.description.as_deref(), Some("updated"));
        assert_eq!(update.status, Some(Status::InProgress));
        assert!(update.summary.is_none());
        assert!(update.priority.is_none());
    }

    #[test]
    fn test_search_args_to_jql() {
        let raw = SearchArgs {
            jql: Some("project = RAW".to_string()),
            project: Some("IGNORED".to_string()),
            ..search_args()
        };
        assert_eq!(raw.to_jql(), "project = RAW");

        let filters = SearchArgs {
            project: Some("PROJ".to_string()),
            assignee: Some("@me".to_string()),
            ..search_args()
        };
        assert_eq!(
            filters.to_jql(),
            r#"project = "PROJ" AND assignee = currentUser() ORDER BY created DESC"#
        );

        assert_eq!(search_args().to_jql(), "");
    }

    #[tokio::test]
    async fn test_handlers_drive_issue_lifecycle() {
        let tracker = MemoryTracker::default();
        let renderer = quiet();

        create(&tracker, &create_args("First"), &renderer)
            .await
            .unwrap();
        let stored = tracker.get_issue("PROJ-1").await.unwrap();
        assert_eq!(stored.summary, "First");

        let args = UpdateArgs {
            key: "PROJ-1".to_string(),
            summary: Some("Renamed".to_string()),
            description: None,
            priority: None,
            labels: None,
            status: None,
        };
        update(&tracker, &args, &renderer).await.unwrap();
        let stored = tracker.get_issue("PROJ-1").await.unwrap();
        assert_eq!(stored.summary, "Renamed");
        assert_eq!(stored.description.as_deref(), Some("details"));

        get(&tracker, "PROJ-1", &renderer).await.unwrap();
        delete(&tracker, "PROJ-1", &renderer).await.unwrap();

        let err = get(&tracker, "PROJ-1", &renderer).await.unwrap_err();
        assert!(err.to_string().contains("PROJ-1"));
        let api_err = err.downcast_ref::<ApiError>().unwrap();
        assert!(api_err.is_not_found());
    }

    #[tokio::test]
    async fn test_handlers_keep_validation_errors() {
        let tracker = MemoryTracker::default();
        let renderer = quiet();

        let err = create(&tracker, &create_args("  "), &renderer)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ApiError>(),
            Some(ApiError::Validation { .. })
        ));

        let err = search_all(&tracker, &search_args(), &renderer)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ApiError>(),
            Some(ApiError::Validation { .. })
        ));
        assert!(tracker.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_through_trait_object() {
        let tracker = MemoryTracker::default();
        let dyn_tracker: &dyn IssueTracker = &tracker;
        let args = SearchArgs {
            project: Some("PROJ".to_string()),
            ..search_args()
        };

        search_all(dyn_tracker, &args, &quiet()).await.unwrap();
        assert_eq!(
            tracker.queries.lock().unwrap().as_slice(),
            [r#"project = "PROJ" ORDER BY created DESC"#.to_string()]
        );
    }
}

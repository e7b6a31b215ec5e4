use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::error::{ApiError, Result};
use crate::model::{
    require_non_empty, validate_key, Comment, Issue, IssueUpdate, NamedEntity, Project,
    RawComment, RawIssue, RawTransition, RawWorklog, Status, Transition, User, Worklog,
};
use crate::pagination::{collect_pages, RawSearchPage, SearchPage, DEFAULT_PAGE_SIZE};
use crate::tracker::IssueTracker;
use crate::{adf, ApiClient, ApiVersion, Credentials};

/// Everything needed to build a client. Immutable once handed over.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub credentials: Credentials,
    pub api_version: ApiVersion,
    pub timeout: Duration,
}

impl ClientConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            api_version: ApiVersion::default(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    pub fn with_api_version(mut self, version: ApiVersion) -> Self {
        self.api_version = version;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Typed issue operations over the tracker's REST API.
///
/// Each operation validates its input locally, sends one request (update
/// additionally re-reads the issue) and maps the response to a typed result.
/// Failures surface immediately; there is no retry.
#[derive(Clone)]
pub struct IssueTrackerClient {
    api: ApiClient,
}

impl IssueTrackerClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let api = ApiClient::new(config.credentials, config.api_version, config.timeout)?;
        Ok(Self { api })
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    #[instrument(skip(self, issue), fields(project = %issue.project_key))]
    pub async fn create_issue(&self, issue: &Issue) -> Result<Issue> {
        issue.validate_new()?;

        #[derive(Deserialize)]
        struct CreateResponse {
            key: String,
            #[serde(default)]
            id: Option<String>,
        }

        let url = self.api.endpoint(&["issue"])?;
        let payload = issue.create_payload(self.api.version());
        let response: CreateResponse = self.api.post(url, &payload).await?;

        if response.key.trim().is_empty() {
            return Err(ApiError::InvalidResponse(
                "server did not assign an issue key".to_string(),
            ));
        }

        info!(key = %response.key, id = ?response.id, "Issue created");

        let mut created = issue.clone();
        created.key = Some(response.key);
        created.project_key = issue.project_key.trim().to_string();
        created.status = Status::default();
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get_issue(&self, key: &str) -> Result<Issue> {
        let key = validate_key(key)?;
        let url = self.api.endpoint(&["issue", key])?;
        let raw: RawIssue = self.api.get(url).await?;
        Ok(Issue::from(raw))
    }

    /// Content fields go through the edit endpoint; a status change is
    /// applied as a workflow transition afterwards. The transition is
    /// resolved before anything is written, so an unreachable status leaves
    /// the issue untouched. Returns the issue as the server now reports it.
    #[instrument(skip(self, update))]
    pub async fn update_issue(&self, key: &str, update: &IssueUpdate) -> Result<Issue> {
        let key = validate_key(key)?;
        update.validate()?;

        let transition = match &update.status {
            Some(status) => self.transition_towards(key, status).await?,
            None => None,
        };

        if update.has_field_changes() {
            let url = self.api.endpoint(&["issue", key])?;
            self.api
                .put_unit(url, &update.edit_payload(self.api.version()))
                .await?;
            info!(%key, "Issue fields updated");
        }

        if let Some(transition) = &transition {
            self.apply_transition(key, transition).await?;
        }

        self.get_issue(key).await
    }

    /// The transition reaching `status`, or `None` when the issue is already
    /// there.
    async fn transition_towards(&self, key: &str, status: &Status) -> Result<Option<Transition>> {
        let current = self.get_issue(key).await?;
        if current.status.as_str().eq_ignore_ascii_case(status.as_str()) {
            debug!(%key, status = %status, "Issue already in requested status");
            return Ok(None);
        }

        self.find_transition(key, status.as_str()).await.map(Some)
    }

    #[instrument(skip(self))]
    pub async fn delete_issue(&self, key: &str) -> Result<()> {
        let key = validate_key(key)?;
        let url = self.api.endpoint(&["issue", key])?;
        self.api.delete_unit(url).await?;
        info!(%key, "Issue deleted");
        Ok(())
    }

    /// Every issue matching `jql`, across all pages.
    pub async fn search_issues(&self, jql: &str) -> Result<Vec<Issue>> {
        collect_pages(self.search_stream(jql, DEFAULT_PAGE_SIZE), None).await
    }

    /// Like `search_issues` but stops after `limit` issues.
    pub async fn search_issues_limited(&self, jql: &str, limit: usize) -> Result<Vec<Issue>> {
        require_non_empty(jql, "search query")?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let page_size = u32::try_from(limit)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(DEFAULT_PAGE_SIZE);
        collect_pages(self.search_stream(jql, page_size), Some(limit)).await
    }

    #[instrument(skip(self))]
    pub async fn search_page(
        &self,
        jql: &str,
        start_at: u32,
        max_results: u32,
    ) -> Result<SearchPage> {
        let jql = require_non_empty(jql, "search query")?;

        let mut url = self.api.endpoint(&["search"])?;
        url.query_pairs_mut()
            .append_pair("jql", jql)
            .append_pair("startAt", &start_at.to_string())
            .append_pair("maxResults", &max_results.to_string());

        let raw: RawSearchPage = self.api.get(url).await?;
        let mut page = SearchPage::from(raw);
        // Paging follows the offset we asked for, not the one echoed back.
        if page.start_at != start_at {
            warn!(
                requested = start_at,
                echoed = page.start_at,
                "Server echoed a different startAt"
            );
            page.start_at = start_at;
        }
        debug!(
            start_at,
            returned = page.issues.len(),
            total = ?page.total,
            "Fetched search page"
        );
        Ok(page)
    }

    /// Lazily fetch search results one page at a time.
    pub fn search_stream<'a>(
        &'a self,
        jql: &'a str,
        page_size: u32,
    ) -> Pin<Box<dyn Stream<Item = Result<Vec<Issue>>> + Send + 'a>> {
        let page_size = page_size.max(1);

        Box::pin(async_stream::stream! {
            match require_non_empty(jql, "search query") {
                Err(err) => {
                    yield Err(err);
                }
                Ok(jql) => {
                    let mut start_at = 0;

                    loop {
                        match self.search_page(jql, start_at, page_size).await {
                            Ok(page) => {
                                let next_start = page.next_start();
                                yield Ok(page.issues);

                                match next_start {
                                    Some(next) => start_at = next,
                                    None => break,
                                }
                            }
                            Err(err) => {
                                yield Err(err);
                                break;
                            }
                        }
                    }
                }
            }
        })
    }

    #[instrument(skip(self))]
    pub async fn transitions(&self, key: &str) -> Result<Vec<Transition>> {
        #[derive(Deserialize)]
        struct TransitionsResponse {
            #[serde(default)]
            transitions: Vec<RawTransition>,
        }

        let key = validate_key(key)?;
        let url = self.api.endpoint(&["issue", key, "transitions"])?;
        let response: TransitionsResponse = self.api.get(url).await?;
        Ok(response
            .transitions
            .into_iter()
            .map(Transition::from)
            .collect())
    }

    /// Move an issue along its workflow. `target` may be a transition name,
    /// a transition id or the name of the destination status.
    #[instrument(skip(self))]
    pub async fn transition_issue(&self, key: &str, target: &str) -> Result<Transition> {
        let key = validate_key(key)?;
        let target = require_non_empty(target, "transition")?;

        let transition = self.find_transition(key, target).await?;
        self.apply_transition(key, &transition).await?;
        Ok(transition)
    }

    async fn find_transition(&self, key: &str, target: &str) -> Result<Transition> {
        let available = self.transitions(key).await?;
        if let Some(transition) = available.iter().find(|t| t.matches(target)) {
            return Ok(transition.clone());
        }

        warn!(%key, %target, "No matching transition");
        Err(ApiError::TransitionUnavailable {
            key: key.to_string(),
            target: target.to_string(),
            available: available.into_iter().map(|t| t.name).collect(),
        })
    }

    async fn apply_transition(&self, key: &str, transition: &Transition) -> Result<()> {
        let url = self.api.endpoint(&["issue", key, "transitions"])?;
        self.api
            .post_unit(url, &json!({ "transition": { "id": transition.id } }))
            .await?;

        info!(%key, transition = %transition.name, "Issue transitioned");
        Ok(())
    }

    /// Assign to `account_id`, or unassign with `None`.
    #[instrument(skip(self))]
    pub async fn assign_issue(&self, key: &str, account_id: Option<&str>) -> Result<()> {
        let key = validate_key(key)?;
        let account_id = account_id
            .map(|id| require_non_empty(id, "account id"))
            .transpose()?;

        let url = self.api.endpoint(&["issue", key, "assignee"])?;
        self.api
            .put_unit(url, &json!({ "accountId": account_id }))
            .await?;

        info!(%key, assignee = ?account_id, "Issue assignee changed");
        Ok(())
    }

    #[instrument(skip(self, body))]
    pub async fn add_comment(&self, key: &str, body: &str) -> Result<Comment> {
        let key = validate_key(key)?;
        let body = require_non_empty(body, "comment body")?;

        let url = self.api.endpoint(&["issue", key, "comment"])?;
        let payload = json!({ "body": adf::encode(body, self.api.version()) });
        let raw: RawComment = self.api.post(url, &payload).await?;
        let comment = Comment::from(raw);

        info!(%key, comment_id = %comment.id, "Comment added");
        Ok(comment)
    }

    #[instrument(skip(self))]
    pub async fn comments(&self, key: &str) -> Result<Vec<Comment>> {
        #[derive(Deserialize)]
        struct CommentsResponse {
            #[serde(default)]
            comments: Vec<RawComment>,
        }

        let key = validate_key(key)?;
        let url = self.api.endpoint(&["issue", key, "comment"])?;
        let response: CommentsResponse = self.api.get(url).await?;
        Ok(response.comments.into_iter().map(Comment::from).collect())
    }

    /// Log `time_spent` (tracker duration syntax such as `2h 15m`) against
    /// an issue.
    #[instrument(skip(self, comment))]
    pub async fn add_worklog(
        &self,
        key: &str,
        time_spent: &str,
        comment: Option<&str>,
        started: Option<DateTime<Utc>>,
    ) -> Result<Worklog> {
        let key = validate_key(key)?;
        let time_spent = require_non_empty(time_spent, "time spent")?;

        let mut payload = json!({ "timeSpent": time_spent });
        if let Some(comment) = comment.map(str::trim).filter(|c| !c.is_empty()) {
            payload["comment"] = adf::encode(comment, self.api.version());
        }
        if let Some(started) = started {
            payload["started"] = json!(started.format("%Y-%m-%dT%H:%M:%S%.3f%z").to_string());
        }

        let url = self.api.endpoint(&["issue", key, "worklog"])?;
        let raw: RawWorklog = self.api.post(url, &payload).await?;
        let worklog = Worklog::from(raw);

        info!(%key, worklog_id = %worklog.id, time_spent = %worklog.time_spent, "Work logged");
        Ok(worklog)
    }

    #[instrument(skip(self))]
    pub async fn worklogs(&self, key: &str) -> Result<Vec<Worklog>> {
        #[derive(Deserialize)]
        struct WorklogsResponse {
            #[serde(default)]
            worklogs: Vec<RawWorklog>,
        }

        let key = validate_key(key)?;
        let url = self.api.endpoint(&["issue", key, "worklog"])?;
        let response: WorklogsResponse = self.api.get(url).await?;
        Ok(response.worklogs.into_iter().map(Worklog::from).collect())
    }

    pub async fn issue_types(&self) -> Result<Vec<NamedEntity>> {
        let url = self.api.endpoint(&["issuetype"])?;
        self.api.get(url).await
    }

    pub async fn priorities(&self) -> Result<Vec<NamedEntity>> {
        let url = self.api.endpoint(&["priority"])?;
        self.api.get(url).await
    }

    pub async fn statuses(&self) -> Result<Vec<NamedEntity>> {
        let url = self.api.endpoint(&["status"])?;
        self.api.get(url).await
    }

    pub async fn projects(&self) -> Result<Vec<Project>> {
        let url = self.api.endpoint(&["project"])?;
        self.api.get(url).await
    }

    #[instrument(skip(self))]
    pub async fn get_project(&self, key: &str) -> Result<Project> {
        let key = require_non_empty(key, "project key")?;
        let url = self.api.endpoint(&["project", key])?;
        self.api.get(url).await
    }

    /// The account behind the configured credentials. Cheap way to check
    /// that they work.
    pub async fn myself(&self) -> Result<User> {
        let url = self.api.endpoint(&["myself"])?;
        self.api.get(url).await
    }
}

#[async_trait]
impl IssueTracker for IssueTrackerClient {
    async fn create_issue(&self, issue: &Issue) -> Result<Issue> {
        IssueTrackerClient::create_issue(self, issue).await
    }

    async fn get_issue(&self, key: &str) -> Result<Issue> {
        IssueTrackerClient::get_issue(self, key).await
    }

    async fn update_issue(&self, key: &str, update: &IssueUpdate) -> Result<Issue> {
        IssueTrackerClient::update_issue(self, key, update).await
    }

    async fn delete_issue(&self, key: &str) -> Result<()> {
        IssueTrackerClient::delete_issue(self, key).await
    }

    async fn search_issues(&self, jql: &str) -> Result<Vec<Issue>> {
        IssueTrackerClient::search_issues(self, jql).await
    }
}

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::adf;
use crate::error::{ApiError, Result};
use crate::ApiVersion;

const DEFAULT_ISSUE_TYPE: &str = "Task";

/// Workflow status. Server-controlled; `Other` keeps custom workflow names.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Open,
    InProgress,
    Closed,
    Other(String),
}

impl Status {
    pub fn as_str(&self) -> &str {
        match self {
            Status::Open => "Open",
            Status::InProgress => "In Progress",
            Status::Closed => "Closed",
            Status::Other(name) => name,
        }
    }
}

impl From<&str> for Status {
    fn from(name: &str) -> Self {
        let name = name.trim();
        if name.eq_ignore_ascii_case("open") {
            Status::Open
        } else if name.eq_ignore_ascii_case("in progress") {
            Status::InProgress
        } else if name.eq_ignore_ascii_case("closed") {
            Status::Closed
        } else {
            Status::Other(name.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Priority {
    High,
    Medium,
    Low,
    Other(String),
}

impl Priority {
    pub fn as_str(&self) -> &str {
        match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
            Priority::Other(name) => name,
        }
    }
}

impl From<&str> for Priority {
    fn from(name: &str) -> Self {
        let name = name.trim();
        if name.eq_ignore_ascii_case("high") {
            Priority::High
        } else if name.eq_ignore_ascii_case("medium") {
            Priority::Medium
        } else if name.eq_ignore_ascii_case("low") {
            Priority::Low
        } else {
            Priority::Other(name.to_string())
        }
    }
}

macro_rules! named_enum_serde {
    ($ty:ty) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let name = String::deserialize(deserializer)?;
                Ok(<$ty>::from(name.as_str()))
            }
        }
    };
}

named_enum_serde!(Status);
named_enum_serde!(Priority);

/// A unit of tracked work. `key` is `None` until the issue has been created
/// on the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub key: Option<String>,
    pub project_key: String,
    pub summary: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub status: Status,
    pub issue_type: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
}

impl Issue {
    pub fn new(project_key: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            key: None,
            project_key: project_key.into(),
            summary: summary.into(),
            description: None,
            priority: None,
            status: Status::default(),
            issue_type: DEFAULT_ISSUE_TYPE.to_string(),
            labels: Vec::new(),
            assignee: None,
            created: None,
            updated: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_issue_type(mut self, issue_type: impl Into<String>) -> Self {
        self.issue_type = issue_type.into();
        self
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_persisted(&self) -> bool {
        self.key.is_some()
    }

    /// Preconditions for `create_issue`.
    pub fn validate_new(&self) -> Result<()> {
        if self.key.is_some() {
            return Err(ApiError::validation("issue already has a key; it was created before"));
        }
        if self.project_key.trim().is_empty() {
            return Err(ApiError::validation("project key must not be empty"));
        }
        if self.summary.trim().is_empty() {
            return Err(ApiError::validation("summary must not be empty"));
        }
        if self.issue_type.trim().is_empty() {
            return Err(ApiError::validation("issue type must not be empty"));
        }
        Ok(())
    }

    pub(crate) fn create_payload(&self, version: ApiVersion) -> Value {
        let mut fields = Map::new();
        fields.insert("project".into(), json!({ "key": self.project_key.trim() }));
        fields.insert("summary".into(), json!(self.summary));
        fields.insert("issuetype".into(), json!({ "name": self.issue_type }));

        if let Some(description) = &self.description {
            fields.insert("description".into(), adf::encode(description, version));
        }
        if let Some(priority) = &self.priority {
            fields.insert("priority".into(), json!({ "name": priority.as_str() }));
        }
        if !self.labels.is_empty() {
            fields.insert("labels".into(), json!(self.labels));
        }

        json!({ "fields": fields })
    }
}

/// Partial update: only `Some` fields are changed on the server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IssueUpdate {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub labels: Option<Vec<String>>,
    pub status: Option<Status>,
}

impl IssueUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = Some(labels.into_iter().map(Into::into).collect());
        self
    }

    pub fn status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn is_empty(&self) -> bool {
        !self.has_field_changes() && self.status.is_none()
    }

    /// True when something other than the status changes. Status moves go
    /// through workflow transitions instead of the edit endpoint.
    pub fn has_field_changes(&self) -> bool {
        self.summary.is_some()
            || self.description.is_some()
            || self.priority.is_some()
            || self.labels.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(ApiError::validation("nothing to update"));
        }
        if matches!(&self.summary, Some(s) if s.trim().is_empty()) {
            return Err(ApiError::validation("summary must not be empty"));
        }
        if matches!(&self.status, Some(s) if s.as_str().is_empty()) {
            return Err(ApiError::validation("status must not be empty"));
        }
        Ok(())
    }

    pub(crate) fn edit_payload(&self, version: ApiVersion) -> Value {
        let mut fields = Map::new();

        if let Some(summary) = &self.summary {
            fields.insert("summary".into(), json!(summary));
        }
        if let Some(description) = &self.description {
            fields.insert("description".into(), adf::encode(description, version));
        }
        if let Some(priority) = &self.priority {
            fields.insert("priority".into(), json!({ "name": priority.as_str() }));
        }
        if let Some(labels) = &self.labels {
            fields.insert("labels".into(), json!(labels));
        }

        json!({ "fields": fields })
    }
}

/// Trims `key` and rejects keys that are empty or would not stay a single
/// path segment, before anything touches the network.
pub fn validate_key(key: &str) -> Result<&str> {
    let key = key.trim();
    if key.is_empty() {
        return Err(ApiError::validation("issue key must not be empty"));
    }
    if is_dot_segment(key) {
        return Err(ApiError::validation(format!("'{key}' is not a valid issue key")));
    }
    Ok(key)
}

/// `.` and `..` are dropped by URL path normalisation.
pub(crate) fn is_dot_segment(segment: &str) -> bool {
    matches!(segment, "." | "..")
}

pub(crate) fn require_non_empty<'a>(value: &'a str, what: &str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::validation(format!("{what} must not be empty")));
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub id: Option<String>,
    pub key: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "accountId", default)]
    pub account_id: Option<String>,
    #[serde(rename = "displayName")]
    pub display_name: String,
    #[serde(rename = "emailAddress", default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comment {
    pub id: String,
    pub author: Option<String>,
    pub body: String,
    pub created: Option<DateTime<Utc>>,
}

/// Time logged against an issue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Worklog {
    pub id: String,
    pub author: Option<String>,
    /// Duration as the tracker writes it, e.g. `1h 30m`.
    pub time_spent: String,
    pub time_spent_seconds: Option<u64>,
    pub comment: Option<String>,
    pub started: Option<DateTime<Utc>>,
}

/// An issue type, priority or status definition from the tracker's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedEntity {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub id: String,
    pub name: String,
    pub to_status: Option<String>,
}

impl Transition {
    pub fn matches(&self, target: &str) -> bool {
        self.name.eq_ignore_ascii_case(target)
            || self.id == target
            || self
                .to_status
                .as_deref()
                .is_some_and(|to| to.eq_ignore_ascii_case(target))
    }
}

// Wire shapes. Every field is optional because searches may restrict the
// returned field set.

#[derive(Deserialize)]
pub(crate) struct RawIssue {
    key: String,
    #[serde(default)]
    fields: RawFields,
}

#[derive(Deserialize, Default)]
struct RawFields {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    description: Value,
    #[serde(default)]
    status: Option<NamedField>,
    #[serde(default)]
    priority: Option<NamedField>,
    #[serde(default)]
    issuetype: Option<NamedField>,
    #[serde(default)]
    project: Option<ProjectRef>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    assignee: Option<UserRef>,
    #[serde(default)]
    created: Option<String>,
    #[serde(default)]
    updated: Option<String>,
}

#[derive(Deserialize)]
struct NamedField {
    name: String,
}

#[derive(Deserialize)]
struct ProjectRef {
    key: String,
}

#[derive(Deserialize)]
struct UserRef {
    #[serde(rename = "displayName")]
    display_name: String,
}

impl From<RawIssue> for Issue {
    fn from(raw: RawIssue) -> Self {
        let fields = raw.fields;
        let project_key = fields
            .project
            .map(|p| p.key)
            .or_else(|| raw.key.rsplit_once('-').map(|(prefix, _)| prefix.to_string()))
            .unwrap_or_default();

        Issue {
            project_key,
            summary: fields.summary.unwrap_or_default(),
            description: adf::decode(&fields.description),
            priority: fields.priority.map(|p| Priority::from(p.name.as_str())),
            status: fields
                .status
                .map(|s| Status::from(s.name.as_str()))
                .unwrap_or_default(),
            issue_type: fields
                .issuetype
                .map(|t| t.name)
                .unwrap_or_else(|| DEFAULT_ISSUE_TYPE.to_string()),
            labels: fields.labels,
            assignee: fields.assignee.map(|a| a.display_name),
            created: fields.created.as_deref().and_then(parse_timestamp),
            updated: fields.updated.as_deref().and_then(parse_timestamp),
            key: Some(raw.key),
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct RawComment {
    id: String,
    #[serde(default)]
    author: Option<UserRef>,
    #[serde(default)]
    body: Value,
    #[serde(default)]
    created: Option<String>,
}

impl From<RawComment> for Comment {
    fn from(raw: RawComment) -> Self {
        Comment {
            id: raw.id,
            author: raw.author.map(|a| a.display_name),
            body: adf::decode(&raw.body).unwrap_or_default(),
            created: raw.created.as_deref().and_then(parse_timestamp),
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct RawWorklog {
    id: String,
    #[serde(default)]
    author: Option<UserRef>,
    #[serde(rename = "timeSpent", default)]
    time_spent: Option<String>,
    #[serde(rename = "timeSpentSeconds", default)]
    time_spent_seconds: Option<u64>,
    #[serde(default)]
    comment: Value,
    #[serde(default)]
    started: Option<String>,
}

impl From<RawWorklog> for Worklog {
    fn from(raw: RawWorklog) -> Self {
        Worklog {
            id: raw.id,
            author: raw.author.map(|a| a.display_name),
            time_spent: raw.time_spent.unwrap_or_default(),
            time_spent_seconds: raw.time_spent_seconds,
            comment: adf::decode(&raw.comment).filter(|c| !c.is_empty()),
            started: raw.started.as_deref().and_then(parse_timestamp),
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct RawTransition {
    id: String,
    name: String,
    #[serde(default)]
    to: Option<NamedField>,
}

impl From<RawTransition> for Transition {
    fn from(raw: RawTransition) -> Self {
        Transition {
            id: raw.id,
            name: raw.name,
            to_status: raw.to.map(|t| t.name),
        }
    }
}

/// Jira emits `2025-01-01T10:00:00.000+0000`, which is not RFC 3339.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_new_issue_defaults() {
        let issue = Issue::new("PROJ", "Test issue");
        assert!(!issue.is_persisted());
        assert_eq!(issue.status, Status::Open);
        assert_eq!(issue.issue_type, "Task");
        assert!(issue.validate_new().is_ok());
    }

    #[test]
    fn test_validate_new_rejects_missing_fields() {
        assert!(Issue::new("", "summary").validate_new().is_err());
        assert!(Issue::new("PROJ", "   ").validate_new().is_err());

        let mut persisted = Issue::new("PROJ", "summary");
        persisted.key = Some("PROJ-1".to_string());
        assert!(persisted.validate_new().is_err());
    }

    #[test]
    fn test_empty_description_is_allowed() {
        let issue = Issue::new("PROJ", "summary").with_description("");
        assert!(issue.validate_new().is_ok());
        let payload = issue.create_payload(ApiVersion::V2);
        assert_eq!(payload["fields"]["description"], "");
    }

    #[test]
    fn test_create_payload_shape() {
        let issue = Issue::new("PROJ", "Crash on save")
            .with_description("steps")
            .with_priority(Priority::High)
            .with_issue_type("Bug")
            .with_labels(["backend"]);

        let payload = issue.create_payload(ApiVersion::V2);
        let fields = &payload["fields"];
        assert_eq!(fields["project"]["key"], "PROJ");
        assert_eq!(fields["summary"], "Crash on save");
        assert_eq!(fields["issuetype"]["name"], "Bug");
        assert_eq!(fields["priority"]["name"], "High");
        assert_eq!(fields["description"], "steps");
        assert_eq!(fields["labels"][0], "backend");
    }

    #[test]
    fn test_create_payload_omits_absent_fields() {
        let payload = Issue::new("PROJ", "x").create_payload(ApiVersion::V2);
        let fields = payload["fields"].as_object().unwrap();
        assert!(!fields.contains_key("description"));
        assert!(!fields.contains_key("priority"));
        assert!(!fields.contains_key("labels"));
    }

    #[test]
    fn test_update_validation() {
        assert!(IssueUpdate::new().validate().is_err());
        assert!(IssueUpdate::new().summary("").validate().is_err());
        assert!(IssueUpdate::new().description("").validate().is_ok());
        assert!(IssueUpdate::new().status(Status::Closed).validate().is_ok());
    }

    #[test]
    fn test_edit_payload_only_has_present_fields() {
        let update = IssueUpdate::new().description("updated");
        let payload = update.edit_payload(ApiVersion::V2);
        let fields = payload["fields"].as_object().unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["description"], "updated");
    }

    #[test]
    fn test_status_only_update_has_no_field_changes() {
        let update = IssueUpdate::new().status(Status::InProgress);
        assert!(!update.is_empty());
        assert!(!update.has_field_changes());
    }

    #[test]
    fn test_status_and_priority_names() {
        assert_eq!(Status::from("in progress"), Status::InProgress);
        assert_eq!(Status::from("To Do"), Status::Other("To Do".to_string()));
        assert_eq!(Status::InProgress.to_string(), "In Progress");
        assert_eq!(Priority::from("LOW"), Priority::Low);
        assert_eq!(Priority::from("Highest").as_str(), "Highest");
    }

    #[test]
    fn test_status_serde_as_name() {
        let json = serde_json::to_string(&Status::InProgress).unwrap();
        assert_eq!(json, "\"In Progress\"");
        let back: Status = serde_json::from_str("\"Closed\"").unwrap();
        assert_eq!(back, Status::Closed);
    }

    #[test]
    fn test_validate_key() {
        assert_eq!(validate_key(" PROJ-1 ").unwrap(), "PROJ-1");
        assert!(validate_key("").is_err());
        assert!(validate_key("   ").is_err());
        assert!(matches!(validate_key(".."), Err(ApiError::Validation { .. })));
        assert!(matches!(validate_key(" . "), Err(ApiError::Validation { .. })));
        assert_eq!(validate_key("...").unwrap(), "...");
    }

    #[test]
    fn test_raw_issue_conversion() {
        let raw: RawIssue = serde_json::from_value(json!({
            "id": "10001",
            "key": "TEST-123",
            "fields": {
                "summary": "Test issue summary",
                "description": "Test issue description",
                "status": {"name": "In Progress"},
                "priority": {"name": "High"},
                "issuetype": {"name": "Bug"},
                "project": {"key": "TEST"},
                "labels": ["ui"],
                "assignee": {"displayName": "Jane Doe", "accountId": "123abc"},
                "created": "2025-01-01T10:00:00.000+0000",
                "updated": "2025-01-15T15:30:00.000+0200"
            }
        }))
        .unwrap();

        let issue = Issue::from(raw);
        assert_eq!(issue.key.as_deref(), Some("TEST-123"));
        assert_eq!(issue.project_key, "TEST");
        assert_eq!(issue.description.as_deref(), Some("Test issue description"));
        assert_eq!(issue.status, Status::InProgress);
        assert_eq!(issue.priority, Some(Priority::High));
        assert_eq!(issue.issue_type, "Bug");
        assert_eq!(issue.assignee.as_deref(), Some("Jane Doe"));
        assert_eq!(issue.created.unwrap().year(), 2025);
        assert_eq!(issue.updated.unwrap().hour(), 13);
    }

    #[test]
    fn test_raw_issue_with_sparse_fields() {
        let raw: RawIssue = serde_json::from_value(json!({
            "key": "OPS-42",
            "fields": { "summary": "Rotate keys", "description": null, "assignee": null }
        }))
        .unwrap();

        let issue = Issue::from(raw);
        assert_eq!(issue.project_key, "OPS");
        assert_eq!(issue.description, None);
        assert_eq!(issue.status, Status::Open);
        assert!(issue.assignee.is_none());
    }

    #[test]
    fn test_raw_issue_with_adf_description() {
        let raw: RawIssue = serde_json::from_value(json!({
            "key": "DOC-1",
            "fields": {
                "summary": "Docs",
                "description": adf::encode("rich text", ApiVersion::V3)
            }
        }))
        .unwrap();

        assert_eq!(Issue::from(raw).description.as_deref(), Some("rich text"));
    }

    #[test]
    fn test_transition_matching() {
        let transition = Transition {
            id: "21".to_string(),
            name: "Start Progress".to_string(),
            to_status: Some("In Progress".to_string()),
        };

        assert!(transition.matches("start progress"));
        assert!(transition.matches("In Progress"));
        assert!(transition.matches("21"));
        assert!(!transition.matches("Done"));
    }

    #[test]
    fn test_raw_worklog_conversion() {
        let raw: RawWorklog = serde_json::from_value(json!({
            "id": "100",
            "author": { "displayName": "Jane" },
            "timeSpent": "1h 30m",
            "timeSpentSeconds": 5400,
            "comment": adf::encode("pairing", ApiVersion::V3),
            "started": "2025-01-01T09:00:00.000+0000"
        }))
        .unwrap();

        let worklog = Worklog::from(raw);
        assert_eq!(worklog.author.as_deref(), Some("Jane"));
        assert_eq!(worklog.time_spent, "1h 30m");
        assert_eq!(worklog.time_spent_seconds, Some(5400));
        assert_eq!(worklog.comment.as_deref(), Some("pairing"));
        assert!(worklog.started.is_some());

        let bare: RawWorklog = serde_json::from_value(json!({ "id": "101" })).unwrap();
        let bare = Worklog::from(bare);
        assert_eq!(bare.time_spent, "");
        assert_eq!(bare.comment, None);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2025-01-01T10:00:00.000+0000").is_some());
        assert!(parse_timestamp("2025-01-01T10:00:00Z").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }
}

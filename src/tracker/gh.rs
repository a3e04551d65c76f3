//! GitHub tracker backed by the `gh` CLI
//!
//! Issues are work items (`OPEN` → active, `CLOSED` → retired), issue
//! comments are annotations, and the issue-dependencies REST endpoints carry
//! native `blocked_by` links. `relates_to` has no GitHub counterpart.
//! Authentication is whatever `gh auth` is configured with.

use super::traits::{
    Annotation, AnnotationId, ItemId, ItemStatus, StatusFilter, Tracker, TrackerError,
    TrackerResult, WorkItem,
};
use crate::graph::RelationKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::process::Command;
use tracing::debug;

const LIST_LIMIT: &str = "200";

/// Tracker for one GitHub repository (`owner/name`)
pub struct GhTracker {
    repo: String,
    program: String,
    /// Issue number → REST database id, needed by the dependencies API
    database_ids: Mutex<HashMap<ItemId, u64>>,
}

#[derive(Debug, Deserialize)]
struct IssueRow {
    number: u64,
    title: String,
    state: String,
    #[serde(rename = "createdAt")]
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct CommentRow {
    id: u64,
    #[serde(default)]
    body: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct IdRow {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct NumberRow {
    number: u64,
}

impl GhTracker {
    pub fn new(repo: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            program: "gh".to_string(),
            database_ids: Mutex::new(HashMap::new()),
        }
    }

    /// Use a different executable (a wrapper script, a pinned gh path).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    async fn gh(&self, args: &[&str]) -> TrackerResult<Vec<u8>> {
        debug!(program = %self.program, ?args, "invoking gh");
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|e| TrackerError::Connectivity(format!("failed to run {}: {}", self.program, e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(stderr.trim()));
        }
        Ok(output.stdout)
    }

    async fn database_id(&self, id: ItemId) -> TrackerResult<u64> {
        if let Some(db_id) = self.cached_database_id(id) {
            return Ok(db_id);
        }
        let path = format!("repos/{}/issues/{}", self.repo, id.0);
        let row: IdRow = serde_json::from_slice(&self.gh(&["api", &path]).await?)?;
        self.database_ids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id, row.id);
        Ok(row.id)
    }

    fn cached_database_id(&self, id: ItemId) -> Option<u64> {
        self.database_ids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&id)
            .copied()
    }

    /// POST `blocked` ← blocked_by ← `blocker`.
    async fn add_blocked_by(&self, blocked: ItemId, blocker: ItemId) -> TrackerResult<bool> {
        let blocker_db = self.database_id(blocker).await?;
        let path = format!("repos/{}/issues/{}/dependencies/blocked_by", self.repo, blocked.0);
        let field = format!("issue_id={}", blocker_db);
        link_written(self.gh(&["api", "-X", "POST", &path, "-F", &field]).await)
    }
}

#[async_trait]
impl Tracker for GhTracker {
    async fn list_items(&self, title_filter: &str, status: StatusFilter) -> TrackerResult<Vec<WorkItem>> {
        let state = match status {
            StatusFilter::Any => "all",
            StatusFilter::Active => "open",
            StatusFilter::Retired => "closed",
        };
        let search = format!("\"{}\" in:title", title_filter.replace('"', ""));
        let out = self
            .gh(&[
                "issue", "list", "--repo", &self.repo, "--state", state, "--limit", LIST_LIMIT,
                "--search", &search, "--json", "number,title,state,createdAt",
            ])
            .await?;
        decode_issue_list(&out)
    }

    async fn create_item(&self, title: &str, body: &str, labels: &[String]) -> TrackerResult<ItemId> {
        let mut args: Vec<&str> = vec!["issue", "create", "--repo", &self.repo, "--title", title, "--body", body];
        for label in labels {
            args.push("--label");
            args.push(label);
        }
        let out = self.gh(&args).await?;
        let url = String::from_utf8_lossy(&out);
        parse_issue_url(&url)
            .ok_or_else(|| TrackerError::Command(format!("unexpected gh issue create output: {}", url.trim())))
    }

    async fn retire_item(&self, id: ItemId) -> TrackerResult<bool> {
        let number = id.0.to_string();
        match self
            .gh(&["issue", "close", &number, "--repo", &self.repo, "--reason", "not planned"])
            .await
        {
            Ok(_) => Ok(true),
            Err(TrackerError::Command(msg)) if msg.contains("already closed") => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_annotation(&self, item: ItemId, body: &str) -> TrackerResult<AnnotationId> {
        let path = format!("repos/{}/issues/{}/comments", self.repo, item.0);
        let field = format!("body={}", body);
        let row: IdRow = serde_json::from_slice(&self.gh(&["api", "-X", "POST", &path, "-f", &field]).await?)?;
        Ok(AnnotationId(row.id))
    }

    async fn edit_annotation(&self, id: AnnotationId, body: &str) -> TrackerResult<bool> {
        let path = format!("repos/{}/issues/comments/{}", self.repo, id.0);
        let field = format!("body={}", body);
        self.gh(&["api", "-X", "PATCH", &path, "-f", &field]).await?;
        Ok(true)
    }

    async fn list_annotations(&self, item: ItemId) -> TrackerResult<Vec<Annotation>> {
        let path = format!("repos/{}/issues/{}/comments?per_page=100", self.repo, item.0);
        let out = self.gh(&["api", "--paginate", &path]).await?;
        decode_comment_pages(item, &out)
    }

    async fn write_structured_relation(&self, from: ItemId, to: ItemId, kind: RelationKind) -> TrackerResult<bool> {
        match kind {
            RelationKind::DependsOn => self.add_blocked_by(from, to).await,
            RelationKind::Blocks => self.add_blocked_by(to, from).await,
            RelationKind::RelatesTo => Err(TrackerError::Unsupported(
                "GitHub has no native relates_to link".into(),
            )),
        }
    }

    async fn probe_structured_relations(&self) -> TrackerResult<bool> {
        let out = self
            .gh(&["issue", "list", "--repo", &self.repo, "--state", "all", "--limit", "1", "--json", "number"])
            .await?;
        let rows: Vec<NumberRow> = serde_json::from_slice(&out)?;
        let Some(sample) = rows.first() else {
            return Ok(false);
        };
        let path = format!("repos/{}/issues/{}/dependencies/blocked_by", self.repo, sample.number);
        match self.gh(&["api", &path]).await {
            Ok(_) => Ok(true),
            Err(TrackerError::NotFound(_)) | Err(TrackerError::Rejected(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Map `gh` stderr to the tracker error taxonomy.
fn classify_failure(stderr: &str) -> TrackerError {
    let lower = stderr.to_lowercase();
    let connectivity = [
        "could not resolve host",
        "connection refused",
        "connection reset",
        "network is unreachable",
        "timed out",
        "timeout",
        "http 502",
        "http 503",
        "http 504",
    ];
    if connectivity.iter().any(|needle| lower.contains(needle)) {
        TrackerError::Connectivity(stderr.to_string())
    } else if lower.contains("http 404") || lower.contains("could not resolve to") {
        TrackerError::NotFound(stderr.to_string())
    } else if lower.contains("http 401") || lower.contains("http 403") || lower.contains("http 422") {
        TrackerError::Rejected(stderr.to_string())
    } else {
        TrackerError::Command(stderr.to_string())
    }
}

/// Whether a `blocked_by` POST created a link. An existing link is
/// `Ok(false)`: `depends_on(A,B)` and `blocks(B,A)` write the same one.
fn link_written(result: TrackerResult<Vec<u8>>) -> TrackerResult<bool> {
    match result {
        Ok(_) => Ok(true),
        Err(TrackerError::Rejected(msg)) if msg.to_lowercase().contains("already") => Ok(false),
        Err(e) => Err(e),
    }
}

/// Extract the issue number from `gh issue create` output
/// (`https://github.com/owner/repo/issues/42`).
fn parse_issue_url(output: &str) -> Option<ItemId> {
    let url = output.lines().rev().find(|l| l.contains("/issues/"))?;
    url.trim()
        .rsplit('/')
        .next()
        .and_then(|n| n.parse::<u64>().ok())
        .map(ItemId)
}

fn decode_issue_list(bytes: &[u8]) -> TrackerResult<Vec<WorkItem>> {
    let rows: Vec<IssueRow> = serde_json::from_slice(bytes)?;
    Ok(rows
        .into_iter()
        .map(|row| WorkItem {
            id: ItemId(row.number),
            title: row.title,
            status: if row.state.eq_ignore_ascii_case("open") {
                ItemStatus::Active
            } else {
                ItemStatus::Retired
            },
            created_at: row.created_at,
        })
        .collect())
}

/// `gh api --paginate` prints one JSON array per page back to back.
fn decode_comment_pages(item: ItemId, bytes: &[u8]) -> TrackerResult<Vec<Annotation>> {
    let mut annotations = Vec::new();
    for page in serde_json::Deserializer::from_slice(bytes).into_iter::<Vec<CommentRow>>() {
        annotations.extend(page?.into_iter().map(|row| Annotation {
            id: AnnotationId(row.id),
            item_id: item,
            body: row.body.unwrap_or_default(),
            created_at: row.created_at,
        }));
    }
    Ok(annotations)
}

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TrackerError;

const TEMP_PREFIX: &str = "temp-";

/// Pipeline stage a tracked job sits in. Declaration order is board order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Column {
    Wishlist,
    Applied,
    Interview,
    Offer,
    Rejected,
}

impl Column {
    pub const ALL: [Column; 5] = [
        Column::Wishlist,
        Column::Applied,
        Column::Interview,
        Column::Offer,
        Column::Rejected,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            Column::Wishlist => "Wishlist",
            Column::Applied => "Applied",
            Column::Interview => "Interview",
            Column::Offer => "Offer",
            Column::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Column::Wishlist => write!(f, "wishlist"),
            Column::Applied => write!(f, "applied"),
            Column::Interview => write!(f, "interview"),
            Column::Offer => write!(f, "offer"),
            Column::Rejected => write!(f, "rejected"),
        }
    }
}

impl FromStr for Column {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wishlist" | "interested" => Ok(Column::Wishlist),
            "applied" => Ok(Column::Applied),
            "interview" | "interviewing" => Ok(Column::Interview),
            "offer" => Ok(Column::Offer),
            "rejected" => Ok(Column::Rejected),
            other => Err(TrackerError::Validation(format!("unknown column: {other}"))),
        }
    }
}

/// Identifier of a tracked job.
///
/// A `Temp` id is minted locally for an optimistic insert and lives only until
/// the create round-trip returns the server's id. It never reaches the gateway:
/// [`JobId::server_id`] is the only way to obtain a wire identifier.
///
/// Ids decoded from JSON always belong to the server. The `temp-` prefix is
/// only recognised by [`FromStr`], which handles ids typed by a user or taken
/// from a request path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum JobId {
    Temp(Uuid),
    Server(String),
}

impl JobId {
    pub fn temp() -> Self {
        JobId::Temp(Uuid::new_v4())
    }

    pub fn server(id: impl Into<String>) -> Self {
        JobId::Server(id.into())
    }

    pub fn is_temp(&self) -> bool {
        matches!(self, JobId::Temp(_))
    }

    pub fn server_id(&self) -> Option<&str> {
        match self {
            JobId::Temp(_) => None,
            JobId::Server(id) => Some(id),
        }
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobId::Temp(uuid) => write!(f, "{TEMP_PREFIX}{uuid}"),
            JobId::Server(id) => write!(f, "{id}"),
        }
    }
}

impl FromStr for JobId {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TrackerError::Validation("job id must not be empty".to_string()));
        }
        if let Some(rest) = s.strip_prefix(TEMP_PREFIX) {
            if let Ok(uuid) = Uuid::parse_str(rest) {
                return Ok(JobId::Temp(uuid));
            }
        }
        Ok(JobId::Server(s.to_string()))
    }
}

impl TryFrom<String> for JobId {
    type Error = TrackerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.trim().is_empty() {
            return Err(TrackerError::Validation("job id must not be empty".to_string()));
        }
        Ok(JobId::Server(value))
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.to_string()
    }
}

/// Descriptive fields of a job. Carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFields {
    pub title: String,
    pub company: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl JobFields {
    pub fn new(title: impl Into<String>, company: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            company: company.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if self.title.trim().is_empty() {
            return Err(TrackerError::Validation("title is required".to_string()));
        }
        if self.company.trim().is_empty() {
            return Err(TrackerError::Validation("company is required".to_string()));
        }
        Ok(())
    }
}

/// Input for creating a job: its fields plus the column it should land in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDraft {
    #[serde(flatten)]
    pub fields: JobFields,
    #[serde(rename = "status", default = "default_column")]
    pub column: Column,
}

fn default_column() -> Column {
    Column::Wishlist
}

impl JobDraft {
    pub fn new(title: impl Into<String>, company: impl Into<String>) -> Self {
        Self {
            fields: JobFields::new(title, company),
            column: Column::Wishlist,
        }
    }

    pub fn in_column(mut self, column: Column) -> Self {
        self.column = column;
        self
    }
}

/// Partial update of descriptive fields. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl JobPatch {
    pub fn is_empty(&self) -> bool {
        self == &JobPatch::default()
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if self.is_empty() {
            return Err(TrackerError::Validation("patch has no fields".to_string()));
        }
        if matches!(&self.title, Some(t) if t.trim().is_empty()) {
            return Err(TrackerError::Validation("title must not be blank".to_string()));
        }
        if matches!(&self.company, Some(c) if c.trim().is_empty()) {
            return Err(TrackerError::Validation("company must not be blank".to_string()));
        }
        Ok(())
    }

    pub fn apply_to(&self, fields: &mut JobFields) {
        if let Some(title) = &self.title {
            fields.title = title.clone();
        }
        if let Some(company) = &self.company {
            fields.company = company.clone();
        }
        if let Some(url) = &self.url {
            fields.url = Some(url.clone());
        }
        if let Some(source) = &self.source {
            fields.source = Some(source.clone());
        }
        if let Some(notes) = &self.notes {
            fields.notes = Some(notes.clone());
        }
        if let Some(salary) = &self.salary {
            fields.salary = Some(salary.clone());
        }
        if let Some(location) = &self.location {
            fields.location = Some(location.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedJob {
    pub id: JobId,
    #[serde(rename = "status")]
    pub column: Column,
    pub position: usize,
    #[serde(flatten)]
    pub fields: JobFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrackedJob {
    /// A locally created job with a temporary id. Position is assigned on insert.
    pub fn new(draft: JobDraft) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::temp(),
            column: draft.column,
            position: 0,
            fields: draft.fields,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(id: JobId, column: Column, position: usize, fields: JobFields) -> Self {
        let now = Utc::now();
        Self {
            id,
            column,
            position,
            fields,
            created_at: now,
            updated_at: now,
        }
    }

    /// Refresh `updated_at` without ever moving it backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_id_round_trips_through_string() {
        let id = JobId::temp();
        let rendered = id.to_string();
        assert!(rendered.starts_with("temp-"));
        assert_eq!(rendered.parse::<JobId>().unwrap(), id);
        assert!(id.server_id().is_none());
    }

    #[test]
    fn server_id_is_opaque() {
        let id: JobId = "64f1c0ffee".parse().unwrap();
        assert_eq!(id, JobId::server("64f1c0ffee"));
        assert_eq!(id.server_id(), Some("64f1c0ffee"));
        assert!(!id.is_temp());
    }

    #[test]
    fn empty_id_is_rejected() {
        assert!("  ".parse::<JobId>().is_err());
        assert!(serde_json::from_str::<JobId>("\"\"").is_err());
    }

    #[test]
    fn decoded_ids_are_server_ids() {
        let raw = format!("temp-{}", Uuid::new_v4());
        let id: JobId = serde_json::from_value(serde_json::Value::String(raw.clone())).unwrap();
        assert_eq!(id, JobId::server(raw.clone()));
        assert_eq!(id.server_id(), Some(raw.as_str()));

        let job: TrackedJob = serde_json::from_value(serde_json::json!({
            "id": raw,
            "status": "applied",
            "position": 0,
            "title": "Dev",
            "company": "Acme",
            "createdAt": "2026-01-05T09:00:00Z",
            "updatedAt": "2026-01-05T09:00:00Z",
        }))
        .unwrap();
        assert!(!job.id.is_temp());
    }

    #[test]
    fn column_parses_aliases() {
        assert_eq!("Interested".parse::<Column>().unwrap(), Column::Wishlist);
        assert_eq!("interview".parse::<Column>().unwrap(), Column::Interview);
        assert!("archived".parse::<Column>().is_err());
    }

    #[test]
    fn columns_are_in_pipeline_order() {
        let mut sorted = Column::ALL;
        sorted.sort();
        assert_eq!(sorted, Column::ALL);
        assert_eq!(Column::Offer.title(), "Offer");
    }

    #[test]
    fn tracked_job_wire_format() {
        let mut job = TrackedJob::with_id(
            JobId::server("12"),
            Column::Applied,
            3,
            JobFields::new("Backend Engineer", "Acme"),
        );
        job.fields.location = Some("Remote".to_string());

        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["id"], "12");
        assert_eq!(value["status"], "applied");
        assert_eq!(value["position"], 3);
        assert_eq!(value["title"], "Backend Engineer");
        assert_eq!(value["location"], "Remote");
        assert!(value.get("notes").is_none());
        assert!(value.get("createdAt").is_some());

        let back: TrackedJob = serde_json::from_value(value).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn patch_only_touches_given_fields() {
        let mut fields = JobFields::new("SRE", "Initech");
        fields.notes = Some("referral".to_string());
        let patch = JobPatch {
            salary: Some("120k".to_string()),
            ..Default::default()
        };
        patch.apply_to(&mut fields);
        assert_eq!(fields.title, "SRE");
        assert_eq!(fields.notes.as_deref(), Some("referral"));
        assert_eq!(fields.salary.as_deref(), Some("120k"));
    }

    #[test]
    fn blank_patch_and_draft_are_invalid() {
        assert!(JobPatch::default().validate().is_err());
        let blank_title = JobPatch {
            title: Some(" ".to_string()),
            ..Default::default()
        };
        assert!(blank_title.validate().is_err());
        assert!(JobFields::new("", "Acme").validate().is_err());
        assert!(JobFields::new("Dev", "Acme").validate().is_ok());
    }

    #[test]
    fn touch_never_moves_backwards() {
        let mut job = TrackedJob::new(JobDraft::new("Dev", "Acme"));
        let before = job.updated_at;
        job.touch(before - chrono::Duration::seconds(5));
        assert_eq!(job.updated_at, before);
        job.touch(before + chrono::Duration::seconds(5));
        assert!(job.updated_at > before);
    }
}

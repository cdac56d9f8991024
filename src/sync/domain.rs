use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifier of a posted job.
    JobId
);
string_id!(
    /// Identifier of a submitted application.
    ApplicationId
);
string_id!(
    /// Identifier of a notification record.
    NotificationId
);
string_id!(
    /// Identifier of a job seeker or recruiter account.
    UserId
);

/// Prefix of notifications generated on this client. They have no server copy.
pub const LOCAL_NOTIFICATION_PREFIX: &str = "local-";

impl NotificationId {
    pub fn local(suffix: impl fmt::Display) -> Self {
        Self(format!("{LOCAL_NOTIFICATION_PREFIX}{suffix}"))
    }

    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_NOTIFICATION_PREFIX)
    }
}

/// The two account roles the job board distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[serde(alias = "jobseeker", alias = "seeker", alias = "candidate")]
    JobSeeker,
    Recruiter,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::JobSeeker => "job_seeker",
            Role::Recruiter => "recruiter",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    FullTime,
    PartTime,
    Contract,
    Internship,
    Freelance,
}

impl JobType {
    pub const fn label(self) -> &'static str {
        match self {
            JobType::FullTime => "full-time",
            JobType::PartTime => "part-time",
            JobType::Contract => "contract",
            JobType::Internship => "internship",
            JobType::Freelance => "freelance",
        }
    }

    /// Lenient parse accepting `full-time`, `full_time`, `Full Time`, and `fulltime`.
    pub fn parse(raw: &str) -> Option<Self> {
        let compact: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match compact.as_str() {
            "fulltime" => Some(JobType::FullTime),
            "parttime" => Some(JobType::PartTime),
            "contract" => Some(JobType::Contract),
            "internship" | "intern" => Some(JobType::Internship),
            "freelance" => Some(JobType::Freelance),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Active,
    Closed,
}

/// Canonical salary representation. Payloads carry salary as an object, a number, or
/// free text; ingestion collapses all of them into this one shape.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Salary {
    Range {
        min: Option<u64>,
        max: Option<u64>,
        currency: Option<String>,
    },
    Amount(f64),
    Text(String),
    #[default]
    Unspecified,
}

impl fmt::Display for Salary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Salary::Range { min, max, currency } => {
                if let Some(currency) = currency {
                    write!(f, "{currency} ")?;
                }
                match (min, max) {
                    (Some(min), Some(max)) => write!(f, "{min}-{max}"),
                    (Some(min), None) => write!(f, "from {min}"),
                    (None, Some(max)) => write!(f, "up to {max}"),
                    (None, None) => write!(f, "negotiable"),
                }
            }
            Salary::Amount(amount) => write!(f, "{amount}"),
            Salary::Text(text) => f.write_str(text),
            Salary::Unspecified => f.write_str("not specified"),
        }
    }
}

/// A posted job as held in the client-side store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub title: String,
    pub company: String,
    pub location: String,
    pub job_type: JobType,
    pub remote: bool,
    pub salary: Salary,
    pub posted_at: Option<DateTime<Utc>>,
    pub owner: UserId,
    pub description: String,
    pub requirements: Vec<String>,
    pub skills: Vec<String>,
    pub status: JobStatus,
}

/// Recruiter-editable job fields sent on create and update.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDraft {
    pub title: String,
    pub company: String,
    pub location: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub remote: bool,
    pub salary: Salary,
    pub description: String,
    pub requirements: Vec<String>,
    pub skills: Vec<String>,
}

impl JobDraft {
    pub fn new(title: impl Into<String>, company: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            company: company.into(),
            location: String::new(),
            job_type: JobType::FullTime,
            remote: false,
            salary: Salary::Unspecified,
            description: String::new(),
            requirements: Vec::new(),
            skills: Vec::new(),
        }
    }
}

/// Application lifecycle status.
///
/// Legal moves form a DAG: pending may move to any later status, reviewing may move
/// to shortlisted or a decision, shortlisted only to a decision. `Accepted` and
/// `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Reviewing,
    Shortlisted,
    Accepted,
    Rejected,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 5] = [
        ApplicationStatus::Pending,
        ApplicationStatus::Reviewing,
        ApplicationStatus::Shortlisted,
        ApplicationStatus::Accepted,
        ApplicationStatus::Rejected,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Reviewing => "reviewing",
            ApplicationStatus::Shortlisted => "shortlisted",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(ApplicationStatus::Pending),
            "reviewing" | "reviewed" | "under_review" => Some(ApplicationStatus::Reviewing),
            "shortlisted" => Some(ApplicationStatus::Shortlisted),
            "accepted" | "hired" => Some(ApplicationStatus::Accepted),
            "rejected" | "declined" => Some(ApplicationStatus::Rejected),
            _ => None,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Accepted | ApplicationStatus::Rejected
        )
    }

    const fn rank(self) -> u8 {
        match self {
            ApplicationStatus::Pending => 0,
            ApplicationStatus::Reviewing => 1,
            ApplicationStatus::Shortlisted => 2,
            ApplicationStatus::Accepted | ApplicationStatus::Rejected => 3,
        }
    }

    /// True when `self -> target` is an edge of the status DAG.
    pub const fn can_transition_to(self, target: ApplicationStatus) -> bool {
        !self.is_terminal() && target.rank() > self.rank()
    }

    /// True when `target` equals `self` or lies downstream of it. The edge set is
    /// already transitively closed, so one edge check suffices.
    pub const fn reaches(self, target: ApplicationStatus) -> bool {
        self as u8 == target as u8 || self.can_transition_to(target)
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// An application as held in the client-side store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub job_id: JobId,
    pub applicant_id: UserId,
    /// Recruiter owning the referenced job, captured at ingestion so the record keeps
    /// its attribution after the job itself is deleted.
    pub job_owner: Option<UserId>,
    pub status: ApplicationStatus,
    pub applied_at: Option<DateTime<Utc>>,
    pub cover_letter: String,
    pub expected_salary: Salary,
    pub experience: Option<String>,
}

/// Seeker-provided fields sent when applying.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationDraft {
    pub cover_letter: String,
    pub expected_salary: Salary,
    pub experience: Option<String>,
}

/// Join between a seeker and a job they bookmarked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedJob {
    pub applicant_id: UserId,
    pub job_id: JobId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Application,
    Job,
    Profile,
    Message,
    Interview,
}

impl NotificationKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "application" => Some(NotificationKind::Application),
            "job" => Some(NotificationKind::Job),
            "profile" => Some(NotificationKind::Profile),
            "message" => Some(NotificationKind::Message),
            "interview" => Some(NotificationKind::Interview),
            _ => None,
        }
    }
}

/// Entity a notification points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum SubjectRef {
    Application(ApplicationId),
    Job(JobId),
    User(UserId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub kind: NotificationKind,
    pub subject: Option<SubjectRef>,
    pub title: String,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Query used for `GET /jobs`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct JobFilter {
    pub search: Option<String>,
    pub location: Option<String>,
    pub job_type: Option<JobType>,
    pub remote: Option<bool>,
}

impl JobFilter {
    /// Query parameters in a fixed order so equal filters produce equal request keys.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(search) = self.search.as_deref().filter(|s| !s.trim().is_empty()) {
            pairs.push(("search", search.trim().to_string()));
        }
        if let Some(location) = self.location.as_deref().filter(|s| !s.trim().is_empty()) {
            pairs.push(("location", location.trim().to_string()));
        }
        if let Some(job_type) = self.job_type {
            pairs.push(("type", job_type.label().to_string()));
        }
        if let Some(remote) = self.remote {
            pairs.push(("remote", remote.to_string()));
        }
        pairs
    }

    pub fn is_unfiltered(&self) -> bool {
        self.query_pairs().is_empty()
    }

    pub fn matches(&self, job: &Job) -> bool {
        let search_ok = self.search.as_deref().map_or(true, |needle| {
            let needle = needle.trim().to_lowercase();
            job.title.to_lowercase().contains(&needle)
                || job.company.to_lowercase().contains(&needle)
                || job.skills.iter().any(|s| s.to_lowercase().contains(&needle))
        });
        let location_ok = self.location.as_deref().map_or(true, |location| {
            job.location
                .to_lowercase()
                .contains(&location.trim().to_lowercase())
        });
        let type_ok = self.job_type.map_or(true, |t| t == job.job_type);
        let remote_ok = self.remote.map_or(true, |r| r == job.remote);
        search_ok && location_ok && type_ok && remote_ok
    }
}

/// Aggregate counters reported by `GET /stats/recruiter`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStats {
    #[serde(default)]
    pub active_jobs: u64,
    #[serde(default, alias = "totalCandidates")]
    pub candidates: u64,
    #[serde(default)]
    pub success_rate: f64,
}

//! Seed data for demo and test wiring. Production state only ever comes from the API.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

use super::domain::{
    Job, JobId, JobStatus, JobType, Notification, NotificationId, NotificationKind, SubjectRef,
    UserId,
};
use super::ingest::{normalize_list, normalize_salary, parse_timestamp};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to open seed file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid seed csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("seed row {row}: {message}")]
    InvalidRow { row: usize, message: String },
}

/// Counts inserted by [`crate::sync::AppState::apply_seed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeedSummary {
    pub jobs: usize,
    pub notifications: usize,
}

pub trait SeedProvider {
    fn jobs(&self) -> Result<Vec<Job>, SeedError>;

    fn notifications(&self) -> Result<Vec<Notification>, SeedError> {
        Ok(Vec::new())
    }
}

/// Small fixed catalogue owned by one recruiter.
#[derive(Debug, Clone)]
pub struct DemoSeed {
    recruiter: UserId,
}

impl DemoSeed {
    pub fn new(recruiter: UserId) -> Self {
        Self { recruiter }
    }

    fn job(&self, id: &str, title: &str, company: &str, location: &str, job_type: JobType) -> Job {
        Job {
            id: JobId::new(id),
            title: title.to_string(),
            company: company.to_string(),
            location: location.to_string(),
            job_type,
            remote: location.eq_ignore_ascii_case("remote"),
            salary: Default::default(),
            posted_at: Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).single(),
            owner: self.recruiter.clone(),
            description: String::new(),
            requirements: Vec::new(),
            skills: Vec::new(),
            status: JobStatus::Active,
        }
    }
}

impl SeedProvider for DemoSeed {
    fn jobs(&self) -> Result<Vec<Job>, SeedError> {
        Ok(vec![
            self.job("seed-frontend", "Frontend Developer", "Acme Corp", "Remote", JobType::FullTime),
            self.job("seed-data", "Data Analyst", "Northwind", "Berlin", JobType::Contract),
            self.job("seed-intern", "Platform Intern", "Acme Corp", "Lisbon", JobType::Internship),
        ])
    }

    fn notifications(&self) -> Result<Vec<Notification>, SeedError> {
        Ok(vec![Notification {
            id: NotificationId::local("welcome"),
            kind: NotificationKind::Profile,
            subject: Some(SubjectRef::User(self.recruiter.clone())),
            title: "Welcome".to_string(),
            message: "Complete your company profile to attract candidates".to_string(),
            read: false,
            created_at: Utc::now(),
        }])
    }
}

/// Jobs read from a CSV file with a header row:
/// `id,title,company,location,type,remote,salary,owner,skills,posted_at`.
/// Only `id`, `title`, and `owner` are required.
#[derive(Debug, Clone)]
pub struct CsvJobSeed {
    path: PathBuf,
}

impl CsvJobSeed {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl SeedProvider for CsvJobSeed {
    fn jobs(&self) -> Result<Vec<Job>, SeedError> {
        let file = File::open(&self.path).map_err(|source| SeedError::Io {
            path: self.path.clone(),
            source,
        })?;
        parse_jobs(file)
    }
}

pub(crate) fn parse_jobs<R: Read>(reader: R) -> Result<Vec<Job>, SeedError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut jobs = Vec::new();

    for (index, record) in csv_reader.deserialize::<JobRow>().enumerate() {
        let row = record?;
        jobs.push(row.into_job(index + 1)?);
    }

    Ok(jobs)
}

#[derive(Debug, Deserialize)]
struct JobRow {
    id: String,
    title: String,
    #[serde(default)]
    company: String,
    #[serde(default)]
    location: String,
    #[serde(rename = "type", default, deserialize_with = "empty_string_as_none")]
    job_type: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    remote: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    salary: Option<String>,
    owner: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    skills: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    posted_at: Option<String>,
}

impl JobRow {
    fn into_job(self, row: usize) -> Result<Job, SeedError> {
        let invalid = |message: String| SeedError::InvalidRow { row, message };
        if self.id.is_empty() || self.title.is_empty() || self.owner.is_empty() {
            return Err(invalid("id, title and owner are required".to_string()));
        }
        let job_type = match self.job_type.as_deref() {
            Some(raw) => JobType::parse(raw).ok_or_else(|| invalid(format!("unknown job type {raw:?}")))?,
            None => JobType::FullTime,
        };
        let remote = match self.remote.as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("false" | "no" | "0") => false,
            Some("true" | "yes" | "1") => true,
            Some(other) => return Err(invalid(format!("remote must be true or false, got {other:?}"))),
        };
        let salary = self.salary.map(Value::String);
        let skills = self.skills.map(Value::String);

        Ok(Job {
            id: JobId(self.id),
            title: self.title,
            company: self.company,
            remote: remote || self.location.eq_ignore_ascii_case("remote"),
            location: self.location,
            job_type,
            salary: normalize_salary(salary.as_ref()),
            posted_at: self.posted_at.as_deref().and_then(parse_timestamp),
            owner: UserId(self.owner),
            description: String::new(),
            requirements: Vec::new(),
            skills: normalize_list(skills.as_ref()),
            status: JobStatus::Active,
        })
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

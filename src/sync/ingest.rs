//! Normalization of loosely-typed API payloads into store entities.
//!
//! The backend is inconsistent about shapes: ids arrive as `_id` or `id`, references
//! arrive either as a bare id or as a populated object, `salary` may be an object, a
//! number, or text, and `skills` may be a list or a comma-joined string. Everything is
//! resolved here so store readers only ever see one canonical shape.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};

use super::domain::{
    Application, ApplicationId, ApplicationStatus, Job, JobId, JobStatus, JobType, Notification,
    NotificationId, NotificationKind, Salary, SubjectRef, UserId,
};
use super::error::SyncError;

/// An ingested application plus the job payload it was populated with, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationRecord {
    pub application: Application,
    pub job: Option<Job>,
}

struct Fields<'a> {
    entity: &'static str,
    map: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    fn new(entity: &'static str, value: &'a Value) -> Result<Self, SyncError> {
        match value {
            Value::Object(map) => Ok(Self { entity, map }),
            other => Err(SyncError::MalformedResponse(format!(
                "expected {entity} object, found {}",
                type_name(other)
            ))),
        }
    }

    fn first(&self, keys: &[&str]) -> Option<&'a Value> {
        keys.iter()
            .filter_map(|key| self.map.get(*key))
            .find(|value| !value.is_null())
    }

    fn text(&self, keys: &[&str]) -> Option<String> {
        self.first(keys).and_then(scalar_text)
    }

    fn text_or_default(&self, keys: &[&str]) -> String {
        self.text(keys).unwrap_or_default()
    }

    fn reference(&self, keys: &[&str]) -> Option<String> {
        self.first(keys).and_then(reference_id)
    }

    fn required_reference(&self, keys: &[&str]) -> Result<String, SyncError> {
        self.reference(keys).ok_or_else(|| {
            SyncError::MalformedResponse(format!("{} missing `{}`", self.entity, keys[0]))
        })
    }

    fn flag(&self, keys: &[&str]) -> Option<bool> {
        self.first(keys).and_then(|value| match value {
            Value::Bool(flag) => Some(*flag),
            Value::String(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            Value::Number(n) => n.as_i64().map(|n| n != 0),
            _ => None,
        })
    }

    fn timestamp(&self, keys: &[&str]) -> Option<DateTime<Utc>> {
        self.text(keys).as_deref().and_then(parse_timestamp)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// A reference is either the id itself or a populated object carrying `_id`/`id`.
fn reference_id(value: &Value) -> Option<String> {
    let id = match value {
        Value::Object(map) => map
            .get("_id")
            .or_else(|| map.get("id"))
            .and_then(scalar_text),
        other => scalar_text(other),
    };
    id.filter(|id| !id.is_empty())
}

/// RFC 3339 timestamps or bare `YYYY-MM-DD` dates.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Plain amounts with an optional short currency prefix (`$`, `USD `) and thousands
/// separators. Anything else is not an amount.
fn parse_amount(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let digits_at = trimmed.find(|c: char| c.is_ascii_digit())?;
    if trimmed[..digits_at].trim().chars().count() > 3 {
        return None;
    }
    let cleaned: String = trimmed[digits_at..]
        .chars()
        .filter(|c| *c != ',' && *c != '_')
        .collect();
    cleaned.parse().ok()
}

fn amount_of(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_f64().map(|f| f.max(0.0).round() as u64),
        Value::String(raw) => parse_amount(raw).map(|f| f.round() as u64),
        _ => None,
    }
}

/// Collapse every observed salary shape into [`Salary`].
pub fn normalize_salary(value: Option<&Value>) -> Salary {
    match value {
        None | Some(Value::Null) => Salary::Unspecified,
        Some(Value::Number(n)) => n.as_f64().map_or(Salary::Unspecified, Salary::Amount),
        Some(Value::Object(map)) => {
            let min = map.get("min").and_then(amount_of);
            let max = map.get("max").and_then(amount_of);
            let currency = map
                .get("currency")
                .and_then(scalar_text)
                .filter(|c| !c.is_empty());
            if min.is_none() && max.is_none() && currency.is_none() {
                Salary::Unspecified
            } else {
                Salary::Range { min, max, currency }
            }
        }
        Some(Value::String(raw)) => normalize_salary_text(raw),
        Some(other) => Salary::Text(other.to_string()),
    }
}

fn normalize_salary_text(raw: &str) -> Salary {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Salary::Unspecified;
    }
    if let Some(amount) = parse_amount(trimmed) {
        return Salary::Amount(amount);
    }
    if let Some((low, high)) = trimmed.split_once('-') {
        if let (Some(min), Some(max)) = (parse_amount(low), parse_amount(high)) {
            return Salary::Range {
                min: Some(min.round() as u64),
                max: Some(max.round() as u64),
                currency: None,
            };
        }
    }
    Salary::Text(trimmed.to_string())
}

/// Lists arrive as arrays or comma/newline-joined strings.
pub fn normalize_list(value: Option<&Value>) -> Vec<String> {
    let items: Vec<String> = match value {
        Some(Value::Array(items)) => items.iter().filter_map(scalar_text).collect(),
        Some(Value::String(raw)) => raw
            .split(|c: char| c == ',' || c == '\n')
            .map(|item| item.trim().to_string())
            .collect(),
        _ => Vec::new(),
    };
    items.into_iter().filter(|item| !item.is_empty()).collect()
}

pub fn job_from_value(value: &Value) -> Result<Job, SyncError> {
    let fields = Fields::new("job", value)?;
    let id = fields.required_reference(&["_id", "id"])?;
    let owner = fields.required_reference(&["postedBy", "owner", "recruiter", "recruiterId"])?;

    let job_type = fields
        .text(&["type", "jobType", "job_type"])
        .and_then(|raw| JobType::parse(&raw))
        .unwrap_or(JobType::FullTime);
    let status = match fields.text(&["status"]).as_deref() {
        Some("closed") | Some("inactive") => JobStatus::Closed,
        _ => JobStatus::Active,
    };
    let company = match fields.first(&["company"]) {
        Some(Value::Object(map)) => map.get("name").and_then(scalar_text).unwrap_or_default(),
        Some(other) => scalar_text(other).unwrap_or_default(),
        None => String::new(),
    };

    Ok(Job {
        id: JobId(id),
        title: fields.text_or_default(&["title"]),
        company,
        location: fields.text_or_default(&["location"]),
        job_type,
        remote: fields.flag(&["remote", "isRemote"]).unwrap_or(false),
        salary: normalize_salary(fields.first(&["salary"])),
        posted_at: fields.timestamp(&["postedDate", "createdAt", "posted_at"]),
        owner: UserId(owner),
        description: fields.text_or_default(&["description"]),
        requirements: normalize_list(fields.first(&["requirements"])),
        skills: normalize_list(fields.first(&["skills"])),
        status,
    })
}

pub fn application_from_value(value: &Value) -> Result<ApplicationRecord, SyncError> {
    let fields = Fields::new("application", value)?;
    let id = fields.required_reference(&["_id", "id"])?;
    let job_value = fields.first(&["job", "jobId"]);
    let job_id = job_value.and_then(reference_id).ok_or_else(|| {
        SyncError::MalformedResponse("application missing `job`".to_string())
    })?;
    let applicant = fields.required_reference(&["applicant", "applicantId", "user"])?;

    let raw_status = fields.text(&["status"]).unwrap_or_else(|| "pending".to_string());
    let status = ApplicationStatus::parse(&raw_status).ok_or_else(|| {
        SyncError::MalformedResponse(format!("unknown application status `{raw_status}`"))
    })?;

    let job = match job_value {
        Some(populated @ Value::Object(_)) => job_from_value(populated).ok(),
        _ => None,
    };
    let job_owner = job
        .as_ref()
        .map(|job| job.owner.clone())
        .or_else(|| fields.reference(&["recruiter", "jobOwner"]).map(UserId));

    Ok(ApplicationRecord {
        application: Application {
            id: ApplicationId(id),
            job_id: JobId(job_id),
            applicant_id: UserId(applicant),
            job_owner,
            status,
            applied_at: fields.timestamp(&["appliedDate", "appliedAt", "createdAt"]),
            cover_letter: fields.text_or_default(&["coverLetter", "cover_letter"]),
            expected_salary: normalize_salary(fields.first(&["expectedSalary"])),
            experience: fields.text(&["experience"]).filter(|e| !e.is_empty()),
        },
        job,
    })
}

pub fn notification_from_value(value: &Value) -> Result<Notification, SyncError> {
    let fields = Fields::new("notification", value)?;
    let id = fields.required_reference(&["_id", "id"])?;
    let kind = fields
        .text(&["type", "kind"])
        .and_then(|raw| NotificationKind::parse(&raw))
        .unwrap_or(NotificationKind::Message);

    let subject = if let Some(app) = fields.reference(&["applicationId", "application"]) {
        Some(SubjectRef::Application(ApplicationId(app)))
    } else if let Some(job) = fields.reference(&["jobId", "job"]) {
        Some(SubjectRef::Job(JobId(job)))
    } else {
        fields
            .reference(&["userId", "relatedUser"])
            .map(|user| SubjectRef::User(UserId(user)))
    };

    Ok(Notification {
        id: NotificationId(id),
        kind,
        subject,
        title: fields.text_or_default(&["title"]),
        message: fields.text_or_default(&["message", "body"]),
        read: fields.flag(&["read", "isRead"]).unwrap_or(false),
        created_at: fields
            .timestamp(&["createdAt", "created_at", "time"])
            .unwrap_or_else(Utc::now),
    })
}

/// Unwrap a list payload: either a bare array or an object holding one under `key`.
pub fn list_items<'a>(value: &'a Value, key: &str) -> Result<&'a [Value], SyncError> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(map) => match map.get(key).or_else(|| map.get("items")) {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(SyncError::MalformedResponse(format!(
                "expected `{key}` list in response"
            ))),
        },
        Value::Null => Ok(&[]),
        other => Err(SyncError::MalformedResponse(format!(
            "expected {key} list, found {}",
            type_name(other)
        ))),
    }
}

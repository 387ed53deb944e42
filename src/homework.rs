use chrono::{DateTime, Days, Local, NaiveDate};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::AggregationError;
use crate::models::{AggregateResult, AssignmentRecord, MethodTag, Stats, StudentInfo, NOT_AVAILABLE};
use crate::portal::{PortalError, PortalSession, RawRecord};

const UNKNOWN_SUBJECT: &str = "Unknown subject";
const NO_DESCRIPTION: &str = "No description";

/// Number of calendar days to query, starting today. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayCount(u32);

impl DayCount {
    pub fn new(n: u32) -> Option<DayCount> {
        (n > 0).then_some(DayCount(n))
    }

    /// Read the `days` query value: absent means `default`, anything above
    /// `max` is clamped, zero or non-numeric input is rejected.
    pub fn parse(input: Option<&str>, default: u32, max: u32) -> Result<DayCount, AggregationError> {
        let invalid = |s: &str| AggregationError::InvalidDayCount { input: s.to_string() };
        let n = match input.map(str::trim) {
            None | Some("") => default,
            Some(s) => s.parse::<u32>().map_err(|_| invalid(s))?,
        };
        DayCount::new(n.min(max.max(1))).ok_or_else(|| invalid(input.unwrap_or_default()))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

/// A single day's query failed; the rest of the window is unaffected.
#[derive(Error, Debug)]
#[error("homework query for {date} failed: {cause}")]
pub struct DayQueryFailed {
    pub date: NaiveDate,
    pub cause: PortalError,
}

pub fn student_info(session: &dyn PortalSession) -> StudentInfo {
    let raw = session.student_info();
    StudentInfo {
        name: raw.name.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        class_name: raw.class_name.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
    }
}

pub async fn aggregate(session: &dyn PortalSession, days: DayCount, method: MethodTag) -> AggregateResult {
    aggregate_at(session, days, method, Local::now()).await
}

/// Collect `days` worth of homework, with `anchor` as "now" for every date
/// computed during the run.
pub async fn aggregate_at(
    session: &dyn PortalSession,
    days: DayCount,
    method: MethodTag,
    anchor: DateTime<Local>,
) -> AggregateResult {
    let today = anchor.date_naive();
    let student = student_info(session);
    let mut records: Vec<AssignmentRecord> = Vec::new();
    let mut failed = 0u32;

    for i in 0..days.get() {
        let Some(date) = today.checked_add_days(Days::new(u64::from(i))) else {
            break;
        };
        match session.fetch_assignments(date).await {
            Ok(raw) => {
                debug!(%date, count = raw.len(), "homework fetched");
                for rec in raw {
                    let next = normalize(rec, i, records.len(), date, Local::now());
                    records.push(next);
                }
            }
            Err(cause) => {
                failed += 1;
                let failure = DayQueryFailed { date, cause };
                warn!(error = %failure, "skipping day");
            }
        }
    }

    let stats = compute_stats(&records, today);
    info!(total = stats.total, failed_days = failed, method = %method, "homework sync done");

    AggregateResult {
        success: true,
        student,
        records,
        stats,
        sync_date: anchor,
        days_requested: days.get(),
        connection_method: method,
    }
}

fn parse_due_date(raw: Option<&str>) -> Option<NaiveDate> {
    let s = raw?.trim();
    NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d").ok()
}

pub fn normalize(
    raw: RawRecord,
    day_index: u32,
    running_count: usize,
    queried: NaiveDate,
    retrieved_at: DateTime<Local>,
) -> AssignmentRecord {
    let subject = raw.subject.unwrap_or_default();
    AssignmentRecord {
        id: raw
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("hw_{}_{}", day_index, running_count)),
        subject: subject.name.unwrap_or_else(|| UNKNOWN_SUBJECT.to_string()),
        description: raw.description.unwrap_or_else(|| NO_DESCRIPTION.to_string()),
        date: parse_due_date(raw.date.as_deref()).unwrap_or(queried),
        done: raw.done.unwrap_or(false),
        difficulty: raw.difficulty,
        color: subject.color,
        teacher: subject.teacher.and_then(|t| t.name).unwrap_or_default(),
        retrieved_at,
    }
}

pub fn compute_stats(records: &[AssignmentRecord], today: NaiveDate) -> Stats {
    let total = records.len();
    let completed = records.iter().filter(|r| r.done).count();
    Stats {
        total,
        completed,
        pending: total - completed,
        urgent: records.iter().filter(|r| r.date == today).count(),
    }
}

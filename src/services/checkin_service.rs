use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::ticket::normalize_ticket_code;
use crate::handler::errors::ServiceError;
use crate::repository::{
    CheckinCandidate, CheckinKind, CheckinRepository, NewCheckin, OrderRepository, SubjectStatus,
};

pub const MIN_QUERY_LEN: usize = 2;
pub const MAX_RESULTS: usize = 50;
const PER_KIND_LIMIT: i64 = 25;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckinOutcome {
    CheckedIn { checked_in_at: DateTime<Utc> },
    AlreadyCheckedIn { checked_in_at: DateTime<Utc> },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckinStats {
    pub event_id: i64,
    pub by_kind: BTreeMap<String, i64>,
    pub total: i64,
    pub tickets_issued: i64,
}

pub struct CheckinService<C: CheckinRepository, O: OrderRepository> {
    pub checkin_repo: Arc<C>,
    pub order_repo: Arc<O>,
}

impl<C: CheckinRepository, O: OrderRepository> CheckinService<C, O> {
    pub fn new(checkin_repo: Arc<C>, order_repo: Arc<O>) -> Self {
        Self {
            checkin_repo,
            order_repo,
        }
    }

    /// Searches tickets, speakers, exhibitors, visitors and accounts at once
    /// and returns one ranked list.
    pub async fn search(&self, event_id: i64, query: &str) -> Result<Vec<CheckinCandidate>> {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_LEN {
            return Ok(Vec::new());
        }

        let pattern = like_pattern(query);
        let code = normalize_ticket_code(query);
        let repo = &self.checkin_repo;

        let (tickets, speakers, exhibitors, visitors, users) = tokio::try_join!(
            repo.search_tickets(event_id, &pattern, code.as_deref(), PER_KIND_LIMIT),
            repo.search_speakers(event_id, &pattern, PER_KIND_LIMIT),
            repo.search_exhibitors(event_id, &pattern, PER_KIND_LIMIT),
            repo.search_visitors(event_id, &pattern, PER_KIND_LIMIT),
            repo.search_users(event_id, &pattern, PER_KIND_LIMIT),
        )?;

        let mut merged: Vec<CheckinCandidate> = tickets
            .into_iter()
            .chain(speakers)
            .chain(exhibitors)
            .chain(visitors)
            .chain(users)
            .collect();

        rank(&mut merged, query, code.as_deref());
        merged.truncate(MAX_RESULTS);

        tracing::debug!(event_id, results = merged.len(), "check-in search");
        Ok(merged)
    }

    pub async fn check_in(
        &self,
        event_id: i64,
        kind: CheckinKind,
        subject_id: i64,
        staff_user_id: Option<i64>,
    ) -> Result<CheckinOutcome> {
        match self
            .checkin_repo
            .subject_status(event_id, kind, subject_id)
            .await?
        {
            None => {
                return Err(ServiceError::not_found(format!(
                    "{} {} not found for this event",
                    kind.label(),
                    subject_id
                )));
            }
            Some(SubjectStatus::Void) => {
                return Err(ServiceError::validation("ticket is void"));
            }
            Some(SubjectStatus::Active) => {}
        }

        let inserted = self
            .checkin_repo
            .insert_checkin(NewCheckin {
                event_id,
                subject_kind: kind,
                subject_id,
                checked_in_by: staff_user_id,
            })
            .await?;

        if let Some(checkin) = inserted {
            tracing::info!(event_id, kind = kind.label(), subject_id, "checked in");
            return Ok(CheckinOutcome::CheckedIn {
                checked_in_at: checkin.checked_in_at,
            });
        }

        let existing = self
            .checkin_repo
            .find_checkin(event_id, kind, subject_id)
            .await?
            .ok_or_else(|| ServiceError::conflict("check-in changed concurrently, retry"))?;

        Ok(CheckinOutcome::AlreadyCheckedIn {
            checked_in_at: existing.checked_in_at,
        })
    }

    pub async fn undo_check_in(
        &self,
        event_id: i64,
        kind: CheckinKind,
        subject_id: i64,
    ) -> Result<()> {
        if !self
            .checkin_repo
            .delete_checkin(event_id, kind, subject_id)
            .await?
        {
            return Err(ServiceError::not_found("no check-in to undo"));
        }
        tracing::info!(event_id, kind = kind.label(), subject_id, "check-in undone");
        Ok(())
    }

    pub async fn stats(&self, event_id: i64) -> Result<CheckinStats> {
        let counts = self.checkin_repo.count_by_kind(event_id).await?;
        let sales = self.order_repo.sales_summary(event_id).await?;

        let mut by_kind: BTreeMap<String, i64> = CheckinKind::ALL
            .iter()
            .map(|k| (k.label().to_string(), 0))
            .collect();
        for count in &counts {
            by_kind.insert(count.subject_kind.label().to_string(), count.total);
        }

        Ok(CheckinStats {
            event_id,
            total: counts.iter().map(|c| c.total).sum(),
            by_kind,
            tickets_issued: sales.tickets_issued,
        })
    }
}

/// Lowercase `LIKE` pattern matching `query` anywhere, with wildcards in the
/// input escaped.
pub fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Exact ticket code, then exact email, then kind order, then name.
pub fn rank(candidates: &mut [CheckinCandidate], query: &str, code: Option<&str>) {
    let query = query.trim().to_lowercase();
    let score = |c: &CheckinCandidate| -> u8 {
        if code.is_some() && c.code.as_deref() == code {
            0
        } else if c.email.as_deref().map(str::to_lowercase).as_deref() == Some(query.as_str()) {
            1
        } else {
            2
        }
    };

    candidates.sort_by(|a, b| {
        score(a)
            .cmp(&score(b))
            .then_with(|| a.kind.cmp(&b.kind))
            .then_with(|| compare_names(&a.name, &b.name))
            .then_with(|| a.id.cmp(&b.id))
    });
}

fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

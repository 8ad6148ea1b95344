use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::{Email, Phone, slugify};
use crate::handler::errors::ServiceError;
use crate::repository::{
    ConferenceSession, Event, EventInput, Exhibitor, ExhibitorInput, Pass, PassInput,
    ProgramRepository, ScheduleEntry, SessionInput, Speaker, SpeakerInput, Visitor, VisitorInput,
};

/// Event form as submitted by the back-office. The slug is derived from the
/// name when left blank.
#[derive(Debug, Clone, Deserialize)]
pub struct EventForm {
    #[serde(default)]
    pub slug: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub venue: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default)]
    pub is_published: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleDay {
    pub date: NaiveDate,
    pub sessions: Vec<ScheduleEntry>,
}

pub struct ProgramService<R: ProgramRepository> {
    pub program_repo: Arc<R>,
}

impl<R: ProgramRepository> ProgramService<R> {
    pub fn new(program_repo: Arc<R>) -> Self {
        Self { program_repo }
    }

    // ============= Events =============

    pub async fn list_events(&self, include_unpublished: bool) -> Result<Vec<Event>> {
        self.program_repo.list_events(include_unpublished).await
    }

    pub async fn current_event(&self) -> Result<Option<Event>> {
        self.program_repo.find_current_event(Utc::now()).await
    }

    pub async fn get_event(&self, event_id: i64) -> Result<Event> {
        self.program_repo
            .find_event_by_id(event_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("event not found"))
    }

    /// Public lookup: unpublished events are hidden.
    pub async fn get_published_event(&self, slug: &str) -> Result<Event> {
        self.program_repo
            .find_event_by_slug(slug)
            .await?
            .filter(|e| e.is_published)
            .ok_or_else(|| ServiceError::not_found("event not found"))
    }

    pub async fn create_event(&self, form: EventForm) -> Result<Event> {
        let input = event_input(form)?;
        if self
            .program_repo
            .find_event_by_slug(&input.slug)
            .await?
            .is_some()
        {
            return Err(ServiceError::conflict(format!(
                "an event already uses the slug `{}`",
                input.slug
            )));
        }
        let event = self.program_repo.insert_event(input).await?;
        tracing::info!(event_id = event.event_id, slug = %event.slug, "event created");
        Ok(event)
    }

    pub async fn update_event(&self, event_id: i64, form: EventForm) -> Result<Event> {
        let input = event_input(form)?;
        if let Some(other) = self.program_repo.find_event_by_slug(&input.slug).await? {
            if other.event_id != event_id {
                return Err(ServiceError::conflict(format!(
                    "an event already uses the slug `{}`",
                    input.slug
                )));
            }
        }
        self.program_repo
            .update_event(event_id, input)
            .await?
            .ok_or_else(|| ServiceError::not_found("event not found"))
    }

    pub async fn delete_event(&self, event_id: i64) -> Result<()> {
        if !self.program_repo.delete_event(event_id).await? {
            return Err(ServiceError::not_found("event not found"));
        }
        Ok(())
    }

    // ============= Passes =============

    pub async fn list_passes(&self, event_id: i64) -> Result<Vec<Pass>> {
        self.program_repo.list_passes(event_id).await
    }

    pub async fn create_pass(&self, input: PassInput) -> Result<Pass> {
        let input = clean_pass(input)?;
        self.get_event(input.event_id).await?;
        self.program_repo.insert_pass(input).await
    }

    pub async fn update_pass(&self, pass_id: i64, input: PassInput) -> Result<Pass> {
        let input = clean_pass(input)?;
        let current = self
            .program_repo
            .find_pass(pass_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("pass not found"))?;

        if let Some(capacity) = input.capacity {
            if capacity < current.sold {
                return Err(ServiceError::validation(format!(
                    "capacity cannot drop below the {} seats already sold",
                    current.sold
                )));
            }
        }

        self.program_repo
            .update_pass(pass_id, input)
            .await?
            .ok_or_else(|| ServiceError::conflict("seats were sold meanwhile, retry"))
    }

    pub async fn delete_pass(&self, pass_id: i64) -> Result<()> {
        if self.program_repo.find_pass(pass_id).await?.is_none() {
            return Err(ServiceError::not_found("pass not found"));
        }
        if !self.program_repo.delete_pass(pass_id).await? {
            return Err(ServiceError::conflict(
                "pass has sold seats; close sales instead of deleting",
            ));
        }
        Ok(())
    }

    // ============= Speakers =============

    pub async fn list_speakers(&self, event_id: i64) -> Result<Vec<Speaker>> {
        self.program_repo.list_speakers(event_id).await
    }

    pub async fn get_speaker(&self, speaker_id: i64) -> Result<Speaker> {
        self.program_repo
            .find_speaker(speaker_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("speaker not found"))
    }

    pub async fn create_speaker(&self, input: SpeakerInput) -> Result<Speaker> {
        let input = clean_speaker(input)?;
        self.get_event(input.event_id).await?;
        self.program_repo.insert_speaker(input).await
    }

    pub async fn update_speaker(&self, speaker_id: i64, input: SpeakerInput) -> Result<Speaker> {
        let input = clean_speaker(input)?;
        self.program_repo
            .update_speaker(speaker_id, input)
            .await?
            .ok_or_else(|| ServiceError::not_found("speaker not found"))
    }

    pub async fn delete_speaker(&self, speaker_id: i64) -> Result<()> {
        if !self.program_repo.delete_speaker(speaker_id).await? {
            return Err(ServiceError::not_found("speaker not found"));
        }
        Ok(())
    }

    // ============= Exhibitors =============

    pub async fn list_exhibitors(&self, event_id: i64) -> Result<Vec<Exhibitor>> {
        self.program_repo.list_exhibitors(event_id).await
    }

    pub async fn create_exhibitor(&self, input: ExhibitorInput) -> Result<Exhibitor> {
        let input = clean_exhibitor(input)?;
        self.get_event(input.event_id).await?;
        self.program_repo.insert_exhibitor(input).await
    }

    pub async fn update_exhibitor(
        &self,
        exhibitor_id: i64,
        input: ExhibitorInput,
    ) -> Result<Exhibitor> {
        let input = clean_exhibitor(input)?;
        self.program_repo
            .update_exhibitor(exhibitor_id, input)
            .await?
            .ok_or_else(|| ServiceError::not_found("exhibitor not found"))
    }

    pub async fn delete_exhibitor(&self, exhibitor_id: i64) -> Result<()> {
        if !self.program_repo.delete_exhibitor(exhibitor_id).await? {
            return Err(ServiceError::not_found("exhibitor not found"));
        }
        Ok(())
    }

    // ============= Visitors =============

    pub async fn list_visitors(&self, event_id: i64) -> Result<Vec<Visitor>> {
        self.program_repo.list_visitors(event_id).await
    }

    /// Walk-in registration, from the public form or the desk.
    pub async fn register_visitor(&self, input: VisitorInput) -> Result<Visitor> {
        let input = clean_visitor(input)?;
        let event = self.get_event(input.event_id).await?;
        if !event.is_published {
            return Err(ServiceError::not_found("event not found"));
        }
        let visitor = self.program_repo.insert_visitor(input).await?;
        tracing::info!(
            event_id = visitor.event_id,
            visitor_id = visitor.visitor_id,
            "visitor registered"
        );
        Ok(visitor)
    }

    pub async fn update_visitor(&self, visitor_id: i64, input: VisitorInput) -> Result<Visitor> {
        let input = clean_visitor(input)?;
        self.program_repo
            .update_visitor(visitor_id, input)
            .await?
            .ok_or_else(|| ServiceError::not_found("visitor not found"))
    }

    pub async fn delete_visitor(&self, visitor_id: i64) -> Result<()> {
        if !self.program_repo.delete_visitor(visitor_id).await? {
            return Err(ServiceError::not_found("visitor not found"));
        }
        Ok(())
    }

    // ============= Sessions =============

    pub async fn list_sessions(&self, event_id: i64) -> Result<Vec<ConferenceSession>> {
        self.program_repo.list_sessions(event_id).await
    }

    pub async fn create_session(&self, input: SessionInput) -> Result<ConferenceSession> {
        let input = self.check_session(input).await?;
        self.program_repo.insert_session(input).await
    }

    pub async fn update_session(
        &self,
        session_id: i64,
        input: SessionInput,
    ) -> Result<ConferenceSession> {
        let stored = self
            .program_repo
            .find_session(session_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("session not found"))?;
        if input.event_id != stored.event_id {
            return Err(ServiceError::validation(
                "a session cannot move to another event",
            ));
        }

        let input = self.check_session(input).await?;
        self.program_repo
            .update_session(session_id, input)
            .await?
            .ok_or_else(|| ServiceError::not_found("session not found"))
    }

    pub async fn delete_session(&self, session_id: i64) -> Result<()> {
        if !self.program_repo.delete_session(session_id).await? {
            return Err(ServiceError::not_found("session not found"));
        }
        Ok(())
    }

    async fn check_session(&self, mut input: SessionInput) -> Result<SessionInput> {
        input.title = input.title.trim().to_string();
        if input.title.is_empty() {
            return Err(ServiceError::validation("session title is required"));
        }
        if input.ends_at <= input.starts_at {
            return Err(ServiceError::validation("session must end after it starts"));
        }
        self.get_event(input.event_id).await?;

        if let Some(speaker_id) = input.speaker_id {
            let speaker = self.get_speaker(speaker_id).await?;
            if speaker.event_id != input.event_id {
                return Err(ServiceError::validation(
                    "speaker belongs to another event",
                ));
            }
        }

        input.summary = clean_optional(input.summary);
        input.room = clean_optional(input.room);
        input.track = clean_optional(input.track);
        Ok(input)
    }

    /// Sessions grouped by calendar day (UTC), each day ordered by start time.
    pub async fn schedule(&self, event_id: i64) -> Result<Vec<ScheduleDay>> {
        let entries = self.program_repo.list_schedule(event_id).await?;
        Ok(group_by_day(entries))
    }
}

pub fn group_by_day(mut entries: Vec<ScheduleEntry>) -> Vec<ScheduleDay> {
    entries.sort_by(|a, b| {
        a.starts_at
            .cmp(&b.starts_at)
            .then_with(|| a.room.cmp(&b.room))
    });

    let mut days: Vec<ScheduleDay> = Vec::new();
    for entry in entries {
        let date = entry.starts_at.date_naive();
        match days.last_mut() {
            Some(day) if day.date == date => day.sessions.push(entry),
            _ => days.push(ScheduleDay {
                date,
                sessions: vec![entry],
            }),
        }
    }
    days
}

fn event_input(form: EventForm) -> Result<EventInput> {
    let name = form.name.trim().to_string();
    if name.is_empty() {
        return Err(ServiceError::validation("event name is required"));
    }
    if form.ends_at <= form.starts_at {
        return Err(ServiceError::validation("event must end after it starts"));
    }

    let slug = match clean_optional(form.slug) {
        Some(slug) => slugify(&slug),
        None => slugify(&name),
    };
    if slug.is_empty() {
        return Err(ServiceError::validation("event slug is empty"));
    }

    Ok(EventInput {
        slug,
        name,
        description: clean_optional(form.description),
        venue: clean_optional(form.venue),
        starts_at: form.starts_at,
        ends_at: form.ends_at,
        is_published: form.is_published,
    })
}

fn clean_pass(mut input: PassInput) -> Result<PassInput> {
    input.name = input.name.trim().to_string();
    if input.name.is_empty() {
        return Err(ServiceError::validation("pass name is required"));
    }
    if input.price < 0 {
        return Err(ServiceError::validation("price cannot be negative"));
    }
    if input.capacity.is_some_and(|c| c < 0) {
        return Err(ServiceError::validation("capacity cannot be negative"));
    }
    input.currency = input.currency.trim().to_ascii_uppercase();
    if input.currency.is_empty() {
        input.currency = "XOF".to_string();
    }
    input.description = clean_optional(input.description);
    Ok(input)
}

fn clean_speaker(mut input: SpeakerInput) -> Result<SpeakerInput> {
    input.full_name = required_name(&input.full_name, "speaker name")?;
    input.email = clean_email(input.email)?;
    input.company = clean_optional(input.company);
    input.job_title = clean_optional(input.job_title);
    input.bio = clean_optional(input.bio);
    input.photo_url = clean_optional(input.photo_url);
    Ok(input)
}

fn clean_exhibitor(mut input: ExhibitorInput) -> Result<ExhibitorInput> {
    input.company_name = required_name(&input.company_name, "company name")?;
    input.contact_email = clean_email(input.contact_email)?;
    input.contact_name = clean_optional(input.contact_name);
    input.booth = clean_optional(input.booth);
    input.website = clean_optional(input.website);
    Ok(input)
}

fn clean_visitor(mut input: VisitorInput) -> Result<VisitorInput> {
    input.full_name = required_name(&input.full_name, "name")?;
    input.email = clean_email(input.email)?;
    input.phone = match clean_optional(input.phone) {
        Some(p) => Some(
            Phone::try_from(p.as_str())
                .map_err(|e| ServiceError::validation(e.to_string()))?
                .to_string(),
        ),
        None => None,
    };
    input.company = clean_optional(input.company);
    Ok(input)
}

fn required_name(value: &str, what: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ServiceError::validation(format!("{what} is required")));
    }
    Ok(value.to_string())
}

fn clean_email(value: Option<String>) -> Result<Option<String>> {
    match clean_optional(value) {
        Some(e) => Ok(Some(
            Email::try_from(e.as_str())
                .map_err(|err| ServiceError::validation(err.to_string()))?
                .to_string(),
        )),
        None => Ok(None),
    }
}

/// Blank form fields become `None`.
pub fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

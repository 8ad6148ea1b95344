use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::Role;

// ============= Users =============

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    pub user_id: i64,
    pub external_id: Uuid,
    pub email: String,
    pub username: String,
    pub full_name: String,
    pub phone: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub first_login: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub external_id: Uuid,
    pub email: String,
    pub username: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub password_hash: String,
    pub role: Role,
    pub first_login: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PasswordResetToken {
    pub token_id: i64,
    pub user_id: i64,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPasswordResetToken {
    pub user_id: i64,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait UserRepository: Send + Sync + 'static {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn find_by_id(&self, user_id: i64) -> Result<Option<User>>;
    async fn insert_user(&self, new_user: NewUser) -> Result<User>;
    async fn update_user_password(&self, user_id: i64, new_password_hash: &str) -> Result<()>;
    async fn set_first_login(&self, user_id: i64, first_login: bool) -> Result<()>;
    async fn set_role(&self, user_id: i64, role: Role) -> Result<bool>;
    async fn list_users(&self, limit: i64, offset: i64) -> Result<Vec<User>>;
    async fn count_users(&self) -> Result<i64>;
}

#[async_trait]
pub trait PasswordResetRepository: Send + Sync + 'static {
    async fn create_reset_token(&self, token: NewPasswordResetToken) -> Result<PasswordResetToken>;
    async fn find_valid_token(&self, token: &str) -> Result<Option<PasswordResetToken>>;
    async fn mark_token_used(&self, token_id: i64) -> Result<()>;
    async fn cleanup_expired_tokens(&self) -> Result<u64>;
}

// ============= Program: events, passes, sessions, people =============

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct Event {
    pub event_id: i64,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub venue: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventInput {
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub venue: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub is_published: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct Pass {
    pub pass_id: i64,
    pub event_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub currency: String,
    pub capacity: Option<i32>,
    pub sold: i32,
    pub sales_open: bool,
    pub created_at: DateTime<Utc>,
}

impl Pass {
    pub fn remaining(&self) -> Option<i32> {
        self.capacity.map(|c| (c - self.sold).max(0))
    }

    pub fn is_sold_out(&self) -> bool {
        self.remaining() == Some(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassInput {
    pub event_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub currency: String,
    pub capacity: Option<i32>,
    pub sales_open: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct Speaker {
    pub speaker_id: i64,
    pub event_id: i64,
    pub full_name: String,
    pub email: Option<String>,
    pub company: Option<String>,
    pub job_title: Option<String>,
    pub bio: Option<String>,
    pub photo_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerInput {
    pub event_id: i64,
    pub full_name: String,
    pub email: Option<String>,
    pub company: Option<String>,
    pub job_title: Option<String>,
    pub bio: Option<String>,
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct Exhibitor {
    pub exhibitor_id: i64,
    pub event_id: i64,
    pub company_name: String,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub booth: Option<String>,
    pub website: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExhibitorInput {
    pub event_id: i64,
    pub company_name: String,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub booth: Option<String>,
    pub website: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct Visitor {
    pub visitor_id: i64,
    pub event_id: i64,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitorInput {
    pub event_id: i64,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct ConferenceSession {
    pub session_id: i64,
    pub event_id: i64,
    pub speaker_id: Option<i64>,
    pub title: String,
    pub summary: Option<String>,
    pub room: Option<String>,
    pub track: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInput {
    pub event_id: i64,
    pub speaker_id: Option<i64>,
    pub title: String,
    pub summary: Option<String>,
    pub room: Option<String>,
    pub track: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

/// A session joined with its speaker's name, as listed on the schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct ScheduleEntry {
    pub session_id: i64,
    pub title: String,
    pub summary: Option<String>,
    pub room: Option<String>,
    pub track: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub speaker_id: Option<i64>,
    pub speaker_name: Option<String>,
}

#[async_trait]
pub trait ProgramRepository: Send + Sync + 'static {
    async fn list_events(&self, include_unpublished: bool) -> Result<Vec<Event>>;
    async fn find_event_by_id(&self, event_id: i64) -> Result<Option<Event>>;
    async fn find_event_by_slug(&self, slug: &str) -> Result<Option<Event>>;
    /// Published event that is ongoing or starts next, relative to `now`.
    async fn find_current_event(&self, now: DateTime<Utc>) -> Result<Option<Event>>;
    async fn insert_event(&self, input: EventInput) -> Result<Event>;
    async fn update_event(&self, event_id: i64, input: EventInput) -> Result<Option<Event>>;
    async fn delete_event(&self, event_id: i64) -> Result<bool>;

    async fn list_passes(&self, event_id: i64) -> Result<Vec<Pass>>;
    async fn find_pass(&self, pass_id: i64) -> Result<Option<Pass>>;
    async fn find_passes(&self, pass_ids: &[i64]) -> Result<Vec<Pass>>;
    async fn insert_pass(&self, input: PassInput) -> Result<Pass>;
    async fn update_pass(&self, pass_id: i64, input: PassInput) -> Result<Option<Pass>>;
    async fn delete_pass(&self, pass_id: i64) -> Result<bool>;

    async fn list_speakers(&self, event_id: i64) -> Result<Vec<Speaker>>;
    async fn find_speaker(&self, speaker_id: i64) -> Result<Option<Speaker>>;
    async fn insert_speaker(&self, input: SpeakerInput) -> Result<Speaker>;
    async fn update_speaker(&self, speaker_id: i64, input: SpeakerInput) -> Result<Option<Speaker>>;
    async fn delete_speaker(&self, speaker_id: i64) -> Result<bool>;

    async fn list_exhibitors(&self, event_id: i64) -> Result<Vec<Exhibitor>>;
    async fn find_exhibitor(&self, exhibitor_id: i64) -> Result<Option<Exhibitor>>;
    async fn insert_exhibitor(&self, input: ExhibitorInput) -> Result<Exhibitor>;
    async fn update_exhibitor(
        &self,
        exhibitor_id: i64,
        input: ExhibitorInput,
    ) -> Result<Option<Exhibitor>>;
    async fn delete_exhibitor(&self, exhibitor_id: i64) -> Result<bool>;

    async fn list_visitors(&self, event_id: i64) -> Result<Vec<Visitor>>;
    async fn find_visitor(&self, visitor_id: i64) -> Result<Option<Visitor>>;
    async fn insert_visitor(&self, input: VisitorInput) -> Result<Visitor>;
    async fn update_visitor(&self, visitor_id: i64, input: VisitorInput) -> Result<Option<Visitor>>;
    async fn delete_visitor(&self, visitor_id: i64) -> Result<bool>;

    async fn list_sessions(&self, event_id: i64) -> Result<Vec<ConferenceSession>>;
    async fn find_session(&self, session_id: i64) -> Result<Option<ConferenceSession>>;
    async fn insert_session(&self, input: SessionInput) -> Result<ConferenceSession>;
    async fn update_session(
        &self,
        session_id: i64,
        input: SessionInput,
    ) -> Result<Option<ConferenceSession>>;
    async fn delete_session(&self, session_id: i64) -> Result<bool>;
    async fn list_schedule(&self, event_id: i64) -> Result<Vec<ScheduleEntry>>;
}

// ============= Orders & tickets =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Failed,
    Cancelled,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Failed => "failed",
            OrderStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "paid" => Ok(OrderStatus::Paid),
            "failed" => Ok(OrderStatus::Failed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => anyhow::bail!("unknown order status `{}`", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct Order {
    pub order_id: i64,
    pub external_id: Uuid,
    pub event_id: i64,
    pub user_id: Option<i64>,
    pub buyer_name: String,
    pub buyer_email: String,
    pub buyer_phone: Option<String>,
    pub status: OrderStatus,
    pub total_amount: i64,
    pub currency: String,
    pub payment_reference: Option<String>,
    pub checkout_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct OrderItem {
    pub order_item_id: i64,
    pub order_id: i64,
    pub pass_id: i64,
    pub pass_name: String,
    pub quantity: i32,
    pub unit_price: i64,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub external_id: Uuid,
    pub event_id: i64,
    pub user_id: Option<i64>,
    pub buyer_name: String,
    pub buyer_email: String,
    pub buyer_phone: Option<String>,
    pub total_amount: i64,
    pub currency: String,
    pub items: Vec<NewOrderItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub pass_id: i64,
    pub quantity: i32,
    pub unit_price: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ticket_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Valid,
    Void,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct Ticket {
    pub ticket_id: i64,
    pub code: String,
    pub order_id: i64,
    pub pass_id: i64,
    pub event_id: i64,
    pub holder_name: String,
    pub holder_email: String,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTicket {
    pub code: String,
    pub pass_id: i64,
    pub event_id: i64,
    pub holder_name: String,
    pub holder_email: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct SalesSummary {
    pub paid_orders: i64,
    pub pending_orders: i64,
    pub revenue: i64,
    pub tickets_issued: i64,
}

#[async_trait]
pub trait OrderRepository: Send + Sync + 'static {
    /// Inserts the order and its items and bumps `passes.sold` in one
    /// transaction. Fails with a conflict when a pass lacks capacity.
    async fn create_order(&self, new_order: NewOrder) -> Result<Order>;
    async fn find_by_external_id(&self, external_id: Uuid) -> Result<Option<Order>>;
    async fn find_by_reference(&self, reference: &str) -> Result<Option<Order>>;
    async fn list_items(&self, order_id: i64) -> Result<Vec<OrderItem>>;
    async fn set_payment_reference(
        &self,
        order_id: i64,
        reference: &str,
        checkout_url: &str,
    ) -> Result<()>;
    /// Pending -> paid plus ticket insertion. `None` when the order was no
    /// longer pending.
    async fn mark_paid(&self, order_id: i64, tickets: Vec<NewTicket>)
    -> Result<Option<Vec<Ticket>>>;
    /// Pending -> `status`, giving the reserved seats back. `false` when the
    /// order was no longer pending.
    async fn close_pending(&self, order_id: i64, status: OrderStatus) -> Result<bool>;
    async fn list_tickets(&self, order_id: i64) -> Result<Vec<Ticket>>;
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Order>>;
    async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Order>>;
    async fn sales_summary(&self, event_id: i64) -> Result<SalesSummary>;
}

// ============= Check-in =============

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "checkin_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CheckinKind {
    Ticket,
    Speaker,
    Exhibitor,
    Visitor,
    User,
}

impl CheckinKind {
    pub const ALL: [CheckinKind; 5] = [
        CheckinKind::Ticket,
        CheckinKind::Speaker,
        CheckinKind::Exhibitor,
        CheckinKind::Visitor,
        CheckinKind::User,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            CheckinKind::Ticket => "ticket",
            CheckinKind::Speaker => "speaker",
            CheckinKind::Exhibitor => "exhibitor",
            CheckinKind::Visitor => "visitor",
            CheckinKind::User => "user",
        }
    }
}

impl std::str::FromStr for CheckinKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CheckinKind::ALL
            .into_iter()
            .find(|k| k.label() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| anyhow::anyhow!("unknown check-in kind `{}`", s))
    }
}

/// One row of a check-in search, whatever table it came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct CheckinCandidate {
    pub kind: CheckinKind,
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    /// Pass name, company, booth: whatever identifies the person at the desk.
    pub detail: Option<String>,
    /// Ticket code for tickets.
    pub code: Option<String>,
    pub checked_in_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct Checkin {
    pub checkin_id: i64,
    pub event_id: i64,
    pub subject_kind: CheckinKind,
    pub subject_id: i64,
    pub checked_in_by: Option<i64>,
    pub checked_in_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCheckin {
    pub event_id: i64,
    pub subject_kind: CheckinKind,
    pub subject_id: i64,
    pub checked_in_by: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectStatus {
    Active,
    Void,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct CheckinCount {
    pub subject_kind: CheckinKind,
    pub total: i64,
}

#[async_trait]
pub trait CheckinRepository: Send + Sync + 'static {
    /// `pattern` is a lowercase `LIKE` pattern; `code` an exact normalized ticket code.
    async fn search_tickets(
        &self,
        event_id: i64,
        pattern: &str,
        code: Option<&str>,
        limit: i64,
    ) -> Result<Vec<CheckinCandidate>>;
    async fn search_users(
        &self,
        event_id: i64,
        pattern: &str,
        limit: i64,
    ) -> Result<Vec<CheckinCandidate>>;
    async fn search_speakers(
        &self,
        event_id: i64,
        pattern: &str,
        limit: i64,
    ) -> Result<Vec<CheckinCandidate>>;
    async fn search_exhibitors(
        &self,
        event_id: i64,
        pattern: &str,
        limit: i64,
    ) -> Result<Vec<CheckinCandidate>>;
    async fn search_visitors(
        &self,
        event_id: i64,
        pattern: &str,
        limit: i64,
    ) -> Result<Vec<CheckinCandidate>>;
    async fn subject_status(
        &self,
        event_id: i64,
        kind: CheckinKind,
        subject_id: i64,
    ) -> Result<Option<SubjectStatus>>;
    /// `None` when the subject was already checked in.
    async fn insert_checkin(&self, checkin: NewCheckin) -> Result<Option<Checkin>>;
    async fn find_checkin(
        &self,
        event_id: i64,
        kind: CheckinKind,
        subject_id: i64,
    ) -> Result<Option<Checkin>>;
    async fn delete_checkin(&self, event_id: i64, kind: CheckinKind, subject_id: i64)
    -> Result<bool>;
    async fn count_by_kind(&self, event_id: i64) -> Result<Vec<CheckinCount>>;
}

// ============= Blog =============

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct BlogPost {
    pub post_id: i64,
    pub slug: String,
    pub title: String,
    pub excerpt: Option<String>,
    pub body: String,
    pub author_id: Option<i64>,
    pub published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewBlogPost {
    pub slug: String,
    pub title: String,
    pub excerpt: Option<String>,
    pub body: String,
    pub author_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct BlogPostUpdate {
    pub slug: String,
    pub title: String,
    pub excerpt: Option<String>,
    pub body: String,
}

#[async_trait]
pub trait BlogRepository: Send + Sync + 'static {
    async fn insert_post(&self, post: NewBlogPost) -> Result<BlogPost>;
    async fn update_post(&self, post_id: i64, update: BlogPostUpdate) -> Result<Option<BlogPost>>;
    async fn delete_post(&self, post_id: i64) -> Result<bool>;
    async fn find_post_by_id(&self, post_id: i64) -> Result<Option<BlogPost>>;
    async fn find_post_by_slug(&self, slug: &str) -> Result<Option<BlogPost>>;
    /// Slugs equal to `base` or of the form `base-N`.
    async fn slugs_with_prefix(&self, base: &str) -> Result<Vec<String>>;
    async fn set_published(
        &self,
        post_id: i64,
        published: bool,
        published_at: Option<DateTime<Utc>>,
    ) -> Result<Option<BlogPost>>;
    async fn list_published(&self, limit: i64, offset: i64) -> Result<Vec<BlogPost>>;
    async fn count_published(&self) -> Result<i64>;
    async fn list_all(&self) -> Result<Vec<BlogPost>>;
}

pub mod sqlx_impl;

//! In-memory stand-ins for the Postgres repositories and the payment gateway.
//!
//! One [`MemoryStore`] implements every repository trait over a single locked
//! state, so seats reserved by an order are visible to the program side the
//! same way they are in the database.
#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use uuid::Uuid;

use confhub::handler::errors::ServiceError;
use confhub::repository::*;
use confhub::services::naboopay::{
    CheckoutRequest, CheckoutSession, GatewayError, PaymentGateway, PaymentNotification,
    TransactionStatus,
};

#[derive(Default)]
pub struct State {
    next_id: i64,
    pub events: Vec<Event>,
    pub passes: Vec<Pass>,
    pub speakers: Vec<Speaker>,
    pub exhibitors: Vec<Exhibitor>,
    pub visitors: Vec<Visitor>,
    pub sessions: Vec<ConferenceSession>,
    pub orders: Vec<Order>,
    pub items: Vec<OrderItem>,
    pub tickets: Vec<Ticket>,
    pub checkins: Vec<Checkin>,
    pub posts: Vec<BlogPost>,
    pub users: Vec<User>,
}

impl State {
    fn id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    pub state: Mutex<State>,
    /// Makes `set_payment_reference` fail, as a dropped connection would.
    pub reference_write_fails: AtomicBool,
    /// Number of upcoming slug lookups that miss every existing post, as a
    /// read racing a concurrent insert would.
    pub stale_slug_reads: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Published event starting tomorrow.
    pub fn seed_event(&self, name: &str) -> Event {
        let mut s = self.state.lock().unwrap();
        let now = Utc::now();
        let event = Event {
            event_id: s.id(),
            slug: confhub::domain::slugify(name),
            name: name.to_string(),
            description: None,
            venue: Some("CICAD, Diamniadio".to_string()),
            starts_at: now + Duration::days(1),
            ends_at: now + Duration::days(2),
            is_published: true,
            created_at: now,
            updated_at: now,
        };
        s.events.push(event.clone());
        event
    }

    pub fn seed_pass(&self, event_id: i64, name: &str, price: i64, capacity: Option<i32>) -> Pass {
        let mut s = self.state.lock().unwrap();
        let pass = Pass {
            pass_id: s.id(),
            event_id,
            name: name.to_string(),
            description: None,
            price,
            currency: "XOF".to_string(),
            capacity,
            sold: 0,
            sales_open: true,
            created_at: Utc::now(),
        };
        s.passes.push(pass.clone());
        pass
    }

    pub fn seed_speaker(&self, event_id: i64, full_name: &str, email: Option<&str>) -> Speaker {
        let mut s = self.state.lock().unwrap();
        let speaker = Speaker {
            speaker_id: s.id(),
            event_id,
            full_name: full_name.to_string(),
            email: email.map(str::to_string),
            company: Some("Wave".to_string()),
            job_title: None,
            bio: None,
            photo_url: None,
            created_at: Utc::now(),
        };
        s.speakers.push(speaker.clone());
        speaker
    }

    pub fn seed_visitor(&self, event_id: i64, full_name: &str, email: Option<&str>) -> Visitor {
        let mut s = self.state.lock().unwrap();
        let visitor = Visitor {
            visitor_id: s.id(),
            event_id,
            full_name: full_name.to_string(),
            email: email.map(str::to_string),
            phone: None,
            company: None,
            created_at: Utc::now(),
        };
        s.visitors.push(visitor.clone());
        visitor
    }

    pub fn pass(&self, pass_id: i64) -> Pass {
        let s = self.state.lock().unwrap();
        s.passes.iter().find(|p| p.pass_id == pass_id).cloned().unwrap()
    }

    pub fn order(&self, external_id: Uuid) -> Order {
        let s = self.state.lock().unwrap();
        s.orders
            .iter()
            .find(|o| o.external_id == external_id)
            .cloned()
            .unwrap()
    }

    pub fn void_ticket(&self, ticket_id: i64) {
        let mut s = self.state.lock().unwrap();
        if let Some(t) = s.tickets.iter_mut().find(|t| t.ticket_id == ticket_id) {
            t.status = TicketStatus::Void;
        }
    }
}

fn matches(pattern: &str, fields: &[Option<&str>]) -> bool {
    let needle = pattern.trim_matches('%').to_lowercase();
    fields
        .iter()
        .flatten()
        .any(|f| f.to_lowercase().contains(&needle))
}

// ============= Program =============

#[async_trait]
impl ProgramRepository for MemoryStore {
    async fn list_events(&self, include_unpublished: bool) -> Result<Vec<Event>> {
        let s = self.state.lock().unwrap();
        Ok(s.events
            .iter()
            .filter(|e| include_unpublished || e.is_published)
            .cloned()
            .collect())
    }

    async fn find_event_by_id(&self, event_id: i64) -> Result<Option<Event>> {
        let s = self.state.lock().unwrap();
        Ok(s.events.iter().find(|e| e.event_id == event_id).cloned())
    }

    async fn find_event_by_slug(&self, slug: &str) -> Result<Option<Event>> {
        let s = self.state.lock().unwrap();
        Ok(s.events.iter().find(|e| e.slug == slug).cloned())
    }

    async fn find_current_event(&self, now: DateTime<Utc>) -> Result<Option<Event>> {
        let s = self.state.lock().unwrap();
        Ok(s.events
            .iter()
            .filter(|e| e.is_published && e.ends_at >= now)
            .min_by_key(|e| e.starts_at)
            .cloned())
    }

    async fn insert_event(&self, input: EventInput) -> Result<Event> {
        let mut s = self.state.lock().unwrap();
        if s.events.iter().any(|e| e.slug == input.slug) {
            return Err(ServiceError::conflict("event slug already used"));
        }
        let now = Utc::now();
        let event = Event {
            event_id: s.id(),
            slug: input.slug,
            name: input.name,
            description: input.description,
            venue: input.venue,
            starts_at: input.starts_at,
            ends_at: input.ends_at,
            is_published: input.is_published,
            created_at: now,
            updated_at: now,
        };
        s.events.push(event.clone());
        Ok(event)
    }

    async fn update_event(&self, event_id: i64, input: EventInput) -> Result<Option<Event>> {
        let mut s = self.state.lock().unwrap();
        Ok(s.events.iter_mut().find(|e| e.event_id == event_id).map(|e| {
            e.slug = input.slug;
            e.name = input.name;
            e.description = input.description;
            e.venue = input.venue;
            e.starts_at = input.starts_at;
            e.ends_at = input.ends_at;
            e.is_published = input.is_published;
            e.updated_at = Utc::now();
            e.clone()
        }))
    }

    async fn delete_event(&self, event_id: i64) -> Result<bool> {
        let mut s = self.state.lock().unwrap();
        let before = s.events.len();
        s.events.retain(|e| e.event_id != event_id);
        Ok(s.events.len() != before)
    }

    async fn list_passes(&self, event_id: i64) -> Result<Vec<Pass>> {
        let s = self.state.lock().unwrap();
        Ok(s.passes.iter().filter(|p| p.event_id == event_id).cloned().collect())
    }

    async fn find_pass(&self, pass_id: i64) -> Result<Option<Pass>> {
        let s = self.state.lock().unwrap();
        Ok(s.passes.iter().find(|p| p.pass_id == pass_id).cloned())
    }

    async fn find_passes(&self, pass_ids: &[i64]) -> Result<Vec<Pass>> {
        let s = self.state.lock().unwrap();
        Ok(s.passes
            .iter()
            .filter(|p| pass_ids.contains(&p.pass_id))
            .cloned()
            .collect())
    }

    async fn insert_pass(&self, input: PassInput) -> Result<Pass> {
        let mut s = self.state.lock().unwrap();
        let pass = Pass {
            pass_id: s.id(),
            event_id: input.event_id,
            name: input.name,
            description: input.description,
            price: input.price,
            currency: input.currency,
            capacity: input.capacity,
            sold: 0,
            sales_open: input.sales_open,
            created_at: Utc::now(),
        };
        s.passes.push(pass.clone());
        Ok(pass)
    }

    async fn update_pass(&self, pass_id: i64, input: PassInput) -> Result<Option<Pass>> {
        let mut s = self.state.lock().unwrap();
        Ok(s.passes.iter_mut().find(|p| p.pass_id == pass_id).map(|p| {
            p.name = input.name;
            p.description = input.description;
            p.price = input.price;
            p.currency = input.currency;
            p.capacity = input.capacity;
            p.sales_open = input.sales_open;
            p.clone()
        }))
    }

    async fn delete_pass(&self, pass_id: i64) -> Result<bool> {
        let mut s = self.state.lock().unwrap();
        let before = s.passes.len();
        s.passes.retain(|p| p.pass_id != pass_id || p.sold > 0);
        Ok(s.passes.len() != before)
    }

    async fn list_speakers(&self, event_id: i64) -> Result<Vec<Speaker>> {
        let s = self.state.lock().unwrap();
        Ok(s.speakers.iter().filter(|x| x.event_id == event_id).cloned().collect())
    }

    async fn find_speaker(&self, speaker_id: i64) -> Result<Option<Speaker>> {
        let s = self.state.lock().unwrap();
        Ok(s.speakers.iter().find(|x| x.speaker_id == speaker_id).cloned())
    }

    async fn insert_speaker(&self, input: SpeakerInput) -> Result<Speaker> {
        let mut s = self.state.lock().unwrap();
        let speaker = Speaker {
            speaker_id: s.id(),
            event_id: input.event_id,
            full_name: input.full_name,
            email: input.email,
            company: input.company,
            job_title: input.job_title,
            bio: input.bio,
            photo_url: input.photo_url,
            created_at: Utc::now(),
        };
        s.speakers.push(speaker.clone());
        Ok(speaker)
    }

    async fn update_speaker(&self, speaker_id: i64, input: SpeakerInput) -> Result<Option<Speaker>> {
        let mut s = self.state.lock().unwrap();
        Ok(s.speakers.iter_mut().find(|x| x.speaker_id == speaker_id).map(|x| {
            x.full_name = input.full_name;
            x.email = input.email;
            x.company = input.company;
            x.job_title = input.job_title;
            x.bio = input.bio;
            x.photo_url = input.photo_url;
            x.clone()
        }))
    }

    async fn delete_speaker(&self, speaker_id: i64) -> Result<bool> {
        let mut s = self.state.lock().unwrap();
        let before = s.speakers.len();
        s.speakers.retain(|x| x.speaker_id != speaker_id);
        Ok(s.speakers.len() != before)
    }

    async fn list_exhibitors(&self, event_id: i64) -> Result<Vec<Exhibitor>> {
        let s = self.state.lock().unwrap();
        Ok(s.exhibitors.iter().filter(|x| x.event_id == event_id).cloned().collect())
    }

    async fn find_exhibitor(&self, exhibitor_id: i64) -> Result<Option<Exhibitor>> {
        let s = self.state.lock().unwrap();
        Ok(s.exhibitors.iter().find(|x| x.exhibitor_id == exhibitor_id).cloned())
    }

    async fn insert_exhibitor(&self, input: ExhibitorInput) -> Result<Exhibitor> {
        let mut s = self.state.lock().unwrap();
        let exhibitor = Exhibitor {
            exhibitor_id: s.id(),
            event_id: input.event_id,
            company_name: input.company_name,
            contact_name: input.contact_name,
            contact_email: input.contact_email,
            booth: input.booth,
            website: input.website,
            created_at: Utc::now(),
        };
        s.exhibitors.push(exhibitor.clone());
        Ok(exhibitor)
    }

    async fn update_exhibitor(
        &self,
        exhibitor_id: i64,
        input: ExhibitorInput,
    ) -> Result<Option<Exhibitor>> {
        let mut s = self.state.lock().unwrap();
        Ok(s.exhibitors.iter_mut().find(|x| x.exhibitor_id == exhibitor_id).map(|x| {
            x.company_name = input.company_name;
            x.contact_name = input.contact_name;
            x.contact_email = input.contact_email;
            x.booth = input.booth;
            x.website = input.website;
            x.clone()
        }))
    }

    async fn delete_exhibitor(&self, exhibitor_id: i64) -> Result<bool> {
        let mut s = self.state.lock().unwrap();
        let before = s.exhibitors.len();
        s.exhibitors.retain(|x| x.exhibitor_id != exhibitor_id);
        Ok(s.exhibitors.len() != before)
    }

    async fn list_visitors(&self, event_id: i64) -> Result<Vec<Visitor>> {
        let s = self.state.lock().unwrap();
        Ok(s.visitors.iter().filter(|x| x.event_id == event_id).cloned().collect())
    }

    async fn find_visitor(&self, visitor_id: i64) -> Result<Option<Visitor>> {
        let s = self.state.lock().unwrap();
        Ok(s.visitors.iter().find(|x| x.visitor_id == visitor_id).cloned())
    }

    async fn insert_visitor(&self, input: VisitorInput) -> Result<Visitor> {
        let mut s = self.state.lock().unwrap();
        let visitor = Visitor {
            visitor_id: s.id(),
            event_id: input.event_id,
            full_name: input.full_name,
            email: input.email,
            phone: input.phone,
            company: input.company,
            created_at: Utc::now(),
        };
        s.visitors.push(visitor.clone());
        Ok(visitor)
    }

    async fn update_visitor(&self, visitor_id: i64, input: VisitorInput) -> Result<Option<Visitor>> {
        let mut s = self.state.lock().unwrap();
        Ok(s.visitors.iter_mut().find(|x| x.visitor_id == visitor_id).map(|x| {
            x.full_name = input.full_name;
            x.email = input.email;
            x.phone = input.phone;
            x.company = input.company;
            x.clone()
        }))
    }

    async fn delete_visitor(&self, visitor_id: i64) -> Result<bool> {
        let mut s = self.state.lock().unwrap();
        let before = s.visitors.len();
        s.visitors.retain(|x| x.visitor_id != visitor_id);
        Ok(s.visitors.len() != before)
    }

    async fn list_sessions(&self, event_id: i64) -> Result<Vec<ConferenceSession>> {
        let s = self.state.lock().unwrap();
        Ok(s.sessions.iter().filter(|x| x.event_id == event_id).cloned().collect())
    }

    async fn find_session(&self, session_id: i64) -> Result<Option<ConferenceSession>> {
        let s = self.state.lock().unwrap();
        Ok(s.sessions.iter().find(|x| x.session_id == session_id).cloned())
    }

    async fn insert_session(&self, input: SessionInput) -> Result<ConferenceSession> {
        let mut s = self.state.lock().unwrap();
        let session = ConferenceSession {
            session_id: s.id(),
            event_id: input.event_id,
            speaker_id: input.speaker_id,
            title: input.title,
            summary: input.summary,
            room: input.room,
            track: input.track,
            starts_at: input.starts_at,
            ends_at: input.ends_at,
            created_at: Utc::now(),
        };
        s.sessions.push(session.clone());
        Ok(session)
    }

    async fn update_session(
        &self,
        session_id: i64,
        input: SessionInput,
    ) -> Result<Option<ConferenceSession>> {
        let mut s = self.state.lock().unwrap();
        Ok(s.sessions.iter_mut().find(|x| x.session_id == session_id).map(|x| {
            x.speaker_id = input.speaker_id;
            x.title = input.title;
            x.summary = input.summary;
            x.room = input.room;
            x.track = input.track;
            x.starts_at = input.starts_at;
            x.ends_at = input.ends_at;
            x.clone()
        }))
    }

    async fn delete_session(&self, session_id: i64) -> Result<bool> {
        let mut s = self.state.lock().unwrap();
        let before = s.sessions.len();
        s.sessions.retain(|x| x.session_id != session_id);
        Ok(s.sessions.len() != before)
    }

    async fn list_schedule(&self, event_id: i64) -> Result<Vec<ScheduleEntry>> {
        let s = self.state.lock().unwrap();
        Ok(s.sessions
            .iter()
            .filter(|x| x.event_id == event_id)
            .map(|x| ScheduleEntry {
                session_id: x.session_id,
                title: x.title.clone(),
                summary: x.summary.clone(),
                room: x.room.clone(),
                track: x.track.clone(),
                starts_at: x.starts_at,
                ends_at: x.ends_at,
                speaker_id: x.speaker_id,
                speaker_name: x.speaker_id.and_then(|id| {
                    s.speakers
                        .iter()
                        .find(|sp| sp.speaker_id == id)
                        .map(|sp| sp.full_name.clone())
                }),
            })
            .collect())
    }
}

// ============= Orders =============

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn create_order(&self, new_order: NewOrder) -> Result<Order> {
        let mut s = self.state.lock().unwrap();

        for item in &new_order.items {
            let pass = s
                .passes
                .iter()
                .find(|p| p.pass_id == item.pass_id)
                .ok_or_else(|| ServiceError::not_found("pass not found"))?;
            let fits = pass.capacity.map_or(true, |c| pass.sold + item.quantity <= c);
            if !pass.sales_open || !fits {
                return Err(ServiceError::conflict(format!("{} is sold out", pass.name)));
            }
        }
        for item in &new_order.items {
            if let Some(p) = s.passes.iter_mut().find(|p| p.pass_id == item.pass_id) {
                p.sold += item.quantity;
            }
        }

        let order = Order {
            order_id: s.id(),
            external_id: new_order.external_id,
            event_id: new_order.event_id,
            user_id: new_order.user_id,
            buyer_name: new_order.buyer_name,
            buyer_email: new_order.buyer_email,
            buyer_phone: new_order.buyer_phone,
            status: OrderStatus::Pending,
            total_amount: new_order.total_amount,
            currency: new_order.currency,
            payment_reference: None,
            checkout_url: None,
            created_at: Utc::now(),
            paid_at: None,
        };
        for item in new_order.items {
            let pass_name = s
                .passes
                .iter()
                .find(|p| p.pass_id == item.pass_id)
                .map(|p| p.name.clone())
                .unwrap_or_default();
            let order_item_id = s.id();
            s.items.push(OrderItem {
                order_item_id,
                order_id: order.order_id,
                pass_id: item.pass_id,
                pass_name,
                quantity: item.quantity,
                unit_price: item.unit_price,
            });
        }
        s.orders.push(order.clone());
        Ok(order)
    }

    async fn find_by_external_id(&self, external_id: Uuid) -> Result<Option<Order>> {
        let s = self.state.lock().unwrap();
        Ok(s.orders.iter().find(|o| o.external_id == external_id).cloned())
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Order>> {
        let s = self.state.lock().unwrap();
        Ok(s.orders
            .iter()
            .find(|o| o.payment_reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn list_items(&self, order_id: i64) -> Result<Vec<OrderItem>> {
        let s = self.state.lock().unwrap();
        Ok(s.items.iter().filter(|i| i.order_id == order_id).cloned().collect())
    }

    async fn set_payment_reference(
        &self,
        order_id: i64,
        reference: &str,
        checkout_url: &str,
    ) -> Result<()> {
        if self.reference_write_fails.load(Ordering::SeqCst) {
            anyhow::bail!("connection reset while storing the payment reference");
        }
        let mut s = self.state.lock().unwrap();
        if let Some(o) = s.orders.iter_mut().find(|o| o.order_id == order_id) {
            o.payment_reference = Some(reference.to_string());
            o.checkout_url = Some(checkout_url.to_string());
        }
        Ok(())
    }

    async fn mark_paid(
        &self,
        order_id: i64,
        tickets: Vec<NewTicket>,
    ) -> Result<Option<Vec<Ticket>>> {
        let mut s = self.state.lock().unwrap();
        let Some(order) = s
            .orders
            .iter_mut()
            .find(|o| o.order_id == order_id && o.status == OrderStatus::Pending)
        else {
            return Ok(None);
        };
        order.status = OrderStatus::Paid;
        order.paid_at = Some(Utc::now());

        let mut issued = Vec::new();
        for t in tickets {
            let ticket = Ticket {
                ticket_id: s.id(),
                code: t.code,
                order_id,
                pass_id: t.pass_id,
                event_id: t.event_id,
                holder_name: t.holder_name,
                holder_email: t.holder_email,
                status: TicketStatus::Valid,
                created_at: Utc::now(),
            };
            s.tickets.push(ticket.clone());
            issued.push(ticket);
        }
        Ok(Some(issued))
    }

    async fn close_pending(&self, order_id: i64, status: OrderStatus) -> Result<bool> {
        let mut s = self.state.lock().unwrap();
        let Some(order) = s
            .orders
            .iter_mut()
            .find(|o| o.order_id == order_id && o.status == OrderStatus::Pending)
        else {
            return Ok(false);
        };
        order.status = status;

        let released: Vec<(i64, i32)> = s
            .items
            .iter()
            .filter(|i| i.order_id == order_id)
            .map(|i| (i.pass_id, i.quantity))
            .collect();
        for (pass_id, quantity) in released {
            if let Some(p) = s.passes.iter_mut().find(|p| p.pass_id == pass_id) {
                p.sold = (p.sold - quantity).max(0);
            }
        }
        Ok(true)
    }

    async fn list_tickets(&self, order_id: i64) -> Result<Vec<Ticket>> {
        let s = self.state.lock().unwrap();
        Ok(s.tickets.iter().filter(|t| t.order_id == order_id).cloned().collect())
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Order>> {
        let s = self.state.lock().unwrap();
        Ok(s.orders
            .iter()
            .filter(|o| o.user_id == Some(user_id))
            .cloned()
            .collect())
    }

    async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Order>> {
        let s = self.state.lock().unwrap();
        Ok(s.orders
            .iter()
            .rev()
            .filter(|o| status.map_or(true, |st| o.status == st))
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn sales_summary(&self, event_id: i64) -> Result<SalesSummary> {
        let s = self.state.lock().unwrap();
        let orders: Vec<&Order> = s.orders.iter().filter(|o| o.event_id == event_id).collect();
        Ok(SalesSummary {
            paid_orders: orders.iter().filter(|o| o.status == OrderStatus::Paid).count() as i64,
            pending_orders: orders
                .iter()
                .filter(|o| o.status == OrderStatus::Pending)
                .count() as i64,
            revenue: orders
                .iter()
                .filter(|o| o.status == OrderStatus::Paid)
                .map(|o| o.total_amount)
                .sum(),
            tickets_issued: s
                .tickets
                .iter()
                .filter(|t| t.event_id == event_id && t.status == TicketStatus::Valid)
                .count() as i64,
        })
    }
}

// ============= Check-in =============

impl MemoryStore {
    fn checked_in_at(s: &State, event_id: i64, kind: CheckinKind, id: i64) -> Option<DateTime<Utc>> {
        s.checkins
            .iter()
            .find(|c| c.event_id == event_id && c.subject_kind == kind && c.subject_id == id)
            .map(|c| c.checked_in_at)
    }
}

#[async_trait]
impl CheckinRepository for MemoryStore {
    async fn search_tickets(
        &self,
        event_id: i64,
        pattern: &str,
        code: Option<&str>,
        limit: i64,
    ) -> Result<Vec<CheckinCandidate>> {
        let s = self.state.lock().unwrap();
        Ok(s.tickets
            .iter()
            .filter(|t| t.event_id == event_id && t.status == TicketStatus::Valid)
            .filter(|t| {
                let pass_name = s
                    .passes
                    .iter()
                    .find(|p| p.pass_id == t.pass_id)
                    .map(|p| p.name.as_str());
                code == Some(t.code.as_str())
                    || matches(
                        pattern,
                        &[Some(t.holder_name.as_str()), Some(t.holder_email.as_str()), pass_name],
                    )
            })
            .take(limit as usize)
            .map(|t| CheckinCandidate {
                kind: CheckinKind::Ticket,
                id: t.ticket_id,
                name: t.holder_name.clone(),
                email: Some(t.holder_email.clone()),
                detail: s
                    .passes
                    .iter()
                    .find(|p| p.pass_id == t.pass_id)
                    .map(|p| p.name.clone()),
                code: Some(t.code.clone()),
                checked_in_at: Self::checked_in_at(&s, event_id, CheckinKind::Ticket, t.ticket_id),
            })
            .collect())
    }

    async fn search_users(
        &self,
        event_id: i64,
        pattern: &str,
        limit: i64,
    ) -> Result<Vec<CheckinCandidate>> {
        let s = self.state.lock().unwrap();
        Ok(s.users
            .iter()
            .filter(|u| matches(pattern, &[Some(u.full_name.as_str()), Some(u.email.as_str()), Some(u.username.as_str())]))
            .take(limit as usize)
            .map(|u| CheckinCandidate {
                kind: CheckinKind::User,
                id: u.user_id,
                name: u.full_name.clone(),
                email: Some(u.email.clone()),
                detail: Some(u.role.to_string()),
                code: None,
                checked_in_at: Self::checked_in_at(&s, event_id, CheckinKind::User, u.user_id),
            })
            .collect())
    }

    async fn search_speakers(
        &self,
        event_id: i64,
        pattern: &str,
        limit: i64,
    ) -> Result<Vec<CheckinCandidate>> {
        let s = self.state.lock().unwrap();
        Ok(s.speakers
            .iter()
            .filter(|x| x.event_id == event_id)
            .filter(|x| {
                matches(
                    pattern,
                    &[Some(x.full_name.as_str()), x.email.as_deref(), x.company.as_deref()],
                )
            })
            .take(limit as usize)
            .map(|x| CheckinCandidate {
                kind: CheckinKind::Speaker,
                id: x.speaker_id,
                name: x.full_name.clone(),
                email: x.email.clone(),
                detail: x.company.clone(),
                code: None,
                checked_in_at: Self::checked_in_at(&s, event_id, CheckinKind::Speaker, x.speaker_id),
            })
            .collect())
    }

    async fn search_exhibitors(
        &self,
        event_id: i64,
        pattern: &str,
        limit: i64,
    ) -> Result<Vec<CheckinCandidate>> {
        let s = self.state.lock().unwrap();
        Ok(s.exhibitors
            .iter()
            .filter(|x| x.event_id == event_id)
            .filter(|x| {
                matches(
                    pattern,
                    &[
                        Some(x.company_name.as_str()),
                        x.contact_name.as_deref(),
                        x.contact_email.as_deref(),
                    ],
                )
            })
            .take(limit as usize)
            .map(|x| CheckinCandidate {
                kind: CheckinKind::Exhibitor,
                id: x.exhibitor_id,
                name: x.company_name.clone(),
                email: x.contact_email.clone(),
                detail: x.booth.clone(),
                code: None,
                checked_in_at: Self::checked_in_at(
                    &s,
                    event_id,
                    CheckinKind::Exhibitor,
                    x.exhibitor_id,
                ),
            })
            .collect())
    }

    async fn search_visitors(
        &self,
        event_id: i64,
        pattern: &str,
        limit: i64,
    ) -> Result<Vec<CheckinCandidate>> {
        let s = self.state.lock().unwrap();
        Ok(s.visitors
            .iter()
            .filter(|x| x.event_id == event_id)
            .filter(|x| {
                matches(
                    pattern,
                    &[
                        Some(x.full_name.as_str()),
                        x.email.as_deref(),
                        x.phone.as_deref(),
                        x.company.as_deref(),
                    ],
                )
            })
            .take(limit as usize)
            .map(|x| CheckinCandidate {
                kind: CheckinKind::Visitor,
                id: x.visitor_id,
                name: x.full_name.clone(),
                email: x.email.clone(),
                detail: x.company.clone(),
                code: None,
                checked_in_at: Self::checked_in_at(&s, event_id, CheckinKind::Visitor, x.visitor_id),
            })
            .collect())
    }

    async fn subject_status(
        &self,
        event_id: i64,
        kind: CheckinKind,
        subject_id: i64,
    ) -> Result<Option<SubjectStatus>> {
        let s = self.state.lock().unwrap();
        let status = match kind {
            CheckinKind::Ticket => s
                .tickets
                .iter()
                .find(|t| t.ticket_id == subject_id && t.event_id == event_id)
                .map(|t| match t.status {
                    TicketStatus::Valid => SubjectStatus::Active,
                    TicketStatus::Void => SubjectStatus::Void,
                }),
            CheckinKind::Speaker => s
                .speakers
                .iter()
                .any(|x| x.speaker_id == subject_id && x.event_id == event_id)
                .then_some(SubjectStatus::Active),
            CheckinKind::Exhibitor => s
                .exhibitors
                .iter()
                .any(|x| x.exhibitor_id == subject_id && x.event_id == event_id)
                .then_some(SubjectStatus::Active),
            CheckinKind::Visitor => s
                .visitors
                .iter()
                .any(|x| x.visitor_id == subject_id && x.event_id == event_id)
                .then_some(SubjectStatus::Active),
            CheckinKind::User => s
                .users
                .iter()
                .any(|u| u.user_id == subject_id)
                .then_some(SubjectStatus::Active),
        };
        Ok(status)
    }

    async fn insert_checkin(&self, checkin: NewCheckin) -> Result<Option<Checkin>> {
        let mut s = self.state.lock().unwrap();
        if Self::checked_in_at(&s, checkin.event_id, checkin.subject_kind, checkin.subject_id)
            .is_some()
        {
            return Ok(None);
        }
        let row = Checkin {
            checkin_id: s.id(),
            event_id: checkin.event_id,
            subject_kind: checkin.subject_kind,
            subject_id: checkin.subject_id,
            checked_in_by: checkin.checked_in_by,
            checked_in_at: Utc::now(),
        };
        s.checkins.push(row.clone());
        Ok(Some(row))
    }

    async fn find_checkin(
        &self,
        event_id: i64,
        kind: CheckinKind,
        subject_id: i64,
    ) -> Result<Option<Checkin>> {
        let s = self.state.lock().unwrap();
        Ok(s.checkins
            .iter()
            .find(|c| c.event_id == event_id && c.subject_kind == kind && c.subject_id == subject_id)
            .cloned())
    }

    async fn delete_checkin(
        &self,
        event_id: i64,
        kind: CheckinKind,
        subject_id: i64,
    ) -> Result<bool> {
        let mut s = self.state.lock().unwrap();
        let before = s.checkins.len();
        s.checkins.retain(|c| {
            !(c.event_id == event_id && c.subject_kind == kind && c.subject_id == subject_id)
        });
        Ok(s.checkins.len() != before)
    }

    async fn count_by_kind(&self, event_id: i64) -> Result<Vec<CheckinCount>> {
        let s = self.state.lock().unwrap();
        let mut counts: HashMap<CheckinKind, i64> = HashMap::new();
        for c in s.checkins.iter().filter(|c| c.event_id == event_id) {
            *counts.entry(c.subject_kind).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .map(|(subject_kind, total)| CheckinCount {
                subject_kind,
                total,
            })
            .collect())
    }
}

// ============= Blog =============

#[async_trait]
impl BlogRepository for MemoryStore {
    async fn insert_post(&self, post: NewBlogPost) -> Result<BlogPost> {
        let mut s = self.state.lock().unwrap();
        if s.posts.iter().any(|p| p.slug == post.slug) {
            return Err(ServiceError::conflict("slug already used"));
        }
        let now = Utc::now();
        let row = BlogPost {
            post_id: s.id(),
            slug: post.slug,
            title: post.title,
            excerpt: post.excerpt,
            body: post.body,
            author_id: post.author_id,
            published: false,
            published_at: None,
            created_at: now,
            updated_at: now,
        };
        s.posts.push(row.clone());
        Ok(row)
    }

    async fn update_post(&self, post_id: i64, update: BlogPostUpdate) -> Result<Option<BlogPost>> {
        let mut s = self.state.lock().unwrap();
        Ok(s.posts.iter_mut().find(|p| p.post_id == post_id).map(|p| {
            p.slug = update.slug;
            p.title = update.title;
            p.excerpt = update.excerpt;
            p.body = update.body;
            p.updated_at = Utc::now();
            p.clone()
        }))
    }

    async fn delete_post(&self, post_id: i64) -> Result<bool> {
        let mut s = self.state.lock().unwrap();
        let before = s.posts.len();
        s.posts.retain(|p| p.post_id != post_id);
        Ok(s.posts.len() != before)
    }

    async fn find_post_by_id(&self, post_id: i64) -> Result<Option<BlogPost>> {
        let s = self.state.lock().unwrap();
        Ok(s.posts.iter().find(|p| p.post_id == post_id).cloned())
    }

    async fn find_post_by_slug(&self, slug: &str) -> Result<Option<BlogPost>> {
        let s = self.state.lock().unwrap();
        Ok(s.posts.iter().find(|p| p.slug == slug).cloned())
    }

    async fn slugs_with_prefix(&self, base: &str) -> Result<Vec<String>> {
        let stale = self
            .stale_slug_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stale {
            return Ok(Vec::new());
        }
        let s = self.state.lock().unwrap();
        let prefix = format!("{base}-");
        Ok(s.posts
            .iter()
            .filter(|p| p.slug == base || p.slug.starts_with(&prefix))
            .map(|p| p.slug.clone())
            .collect())
    }

    async fn set_published(
        &self,
        post_id: i64,
        published: bool,
        published_at: Option<DateTime<Utc>>,
    ) -> Result<Option<BlogPost>> {
        let mut s = self.state.lock().unwrap();
        Ok(s.posts.iter_mut().find(|p| p.post_id == post_id).map(|p| {
            p.published = published;
            p.published_at = published_at;
            p.clone()
        }))
    }

    async fn list_published(&self, limit: i64, offset: i64) -> Result<Vec<BlogPost>> {
        let s = self.state.lock().unwrap();
        let mut posts: Vec<BlogPost> = s.posts.iter().filter(|p| p.published).cloned().collect();
        posts.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        Ok(posts
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn count_published(&self) -> Result<i64> {
        let s = self.state.lock().unwrap();
        Ok(s.posts.iter().filter(|p| p.published).count() as i64)
    }

    async fn list_all(&self) -> Result<Vec<BlogPost>> {
        let s = self.state.lock().unwrap();
        Ok(s.posts.clone())
    }
}

// ============= Payment gateway =============

/// Records checkout requests and answers transaction lookups from a
/// configurable remote status.
pub struct MockGateway {
    pub fail_checkout: bool,
    pub remote_status: Mutex<TransactionStatus>,
    pub remote_amount: Mutex<Option<i64>>,
    pub checkouts: Mutex<Vec<CheckoutRequest>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            fail_checkout: false,
            remote_status: Mutex::new(TransactionStatus::Pending),
            remote_amount: Mutex::new(None),
            checkouts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_checkout: true,
            ..Self::new()
        }
    }

    pub fn set_remote(&self, status: TransactionStatus, amount: Option<i64>) {
        *self.remote_status.lock().unwrap() = status;
        *self.remote_amount.lock().unwrap() = amount;
    }
}

pub fn reference_for(order_external_id: Uuid) -> String {
    format!("naboo-{}", order_external_id.simple())
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_checkout(&self, req: CheckoutRequest) -> Result<CheckoutSession, GatewayError> {
        if self.fail_checkout {
            return Err(GatewayError::InvalidResponse("sandbox down".to_string()));
        }
        let reference = reference_for(req.order_external_id);
        self.checkouts.lock().unwrap().push(req);
        Ok(CheckoutSession {
            checkout_url: format!("https://checkout.naboopay.test/{reference}"),
            reference,
            status: TransactionStatus::Pending,
        })
    }

    async fn fetch_transaction(
        &self,
        reference: &str,
    ) -> Result<PaymentNotification, GatewayError> {
        Ok(PaymentNotification {
            reference: reference.to_string(),
            status: *self.remote_status.lock().unwrap(),
            amount: *self.remote_amount.lock().unwrap(),
        })
    }
}

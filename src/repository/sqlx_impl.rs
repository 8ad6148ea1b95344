use super::*;
use crate::handler::errors::ServiceError;
use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;

/// Turns a unique-index violation into a conflict the handlers report as 409.
fn unique_conflict(err: sqlx::Error, message: &str) -> anyhow::Error {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => ServiceError::conflict(message),
        _ => err.into(),
    }
}

// ============= Users =============

pub struct PgUserRepository {
    pub pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let rec = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(rec)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let rec = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(rec)
    }

    async fn find_by_id(&self, user_id: i64) -> Result<Option<User>> {
        let rec = sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(rec)
    }

    async fn insert_user(&self, new_user: NewUser) -> Result<User> {
        let rec = sqlx::query_as::<_, User>(
            r#"INSERT INTO users (external_id, email, username, full_name, phone, password_hash, role, first_login)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               RETURNING *"#,
        )
        .bind(new_user.external_id)
        .bind(new_user.email)
        .bind(new_user.username)
        .bind(new_user.full_name)
        .bind(new_user.phone)
        .bind(new_user.password_hash)
        .bind(new_user.role)
        .bind(new_user.first_login)
        .fetch_one(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn update_user_password(&self, user_id: i64, new_password_hash: &str) -> Result<()> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE user_id = $1")
            .bind(user_id)
            .bind(new_password_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_first_login(&self, user_id: i64, first_login: bool) -> Result<()> {
        sqlx::query("UPDATE users SET first_login = $2, updated_at = now() WHERE user_id = $1")
            .bind(user_id)
            .bind(first_login)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_role(&self, user_id: i64, role: Role) -> Result<bool> {
        let result =
            sqlx::query("UPDATE users SET role = $2, updated_at = now() WHERE user_id = $1")
                .bind(user_id)
                .bind(role)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_users(&self, limit: i64, offset: i64) -> Result<Vec<User>> {
        let recs = sqlx::query_as::<_, User>(
            "SELECT * FROM users ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }

    async fn count_users(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

pub struct PgPasswordResetRepository {
    pub pool: PgPool,
}

impl PgPasswordResetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PasswordResetRepository for PgPasswordResetRepository {
    async fn create_reset_token(&self, token: NewPasswordResetToken) -> Result<PasswordResetToken> {
        let rec = sqlx::query_as::<_, PasswordResetToken>(
            r#"INSERT INTO password_reset_tokens (user_id, token, expires_at)
               VALUES ($1, $2, $3)
               RETURNING *"#,
        )
        .bind(token.user_id)
        .bind(token.token)
        .bind(token.expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn find_valid_token(&self, token: &str) -> Result<Option<PasswordResetToken>> {
        let rec = sqlx::query_as::<_, PasswordResetToken>(
            r#"SELECT * FROM password_reset_tokens
               WHERE token = $1 AND used_at IS NULL AND expires_at > now()"#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn mark_token_used(&self, token_id: i64) -> Result<()> {
        sqlx::query("UPDATE password_reset_tokens SET used_at = now() WHERE token_id = $1")
            .bind(token_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn cleanup_expired_tokens(&self) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM password_reset_tokens WHERE expires_at < now() OR used_at IS NOT NULL",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

// ============= Program =============

pub struct PgProgramRepository {
    pub pool: PgPool,
}

impl PgProgramRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn delete_by_id(&self, sql: &str, id: i64) -> Result<bool> {
        let result = sqlx::query(sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ProgramRepository for PgProgramRepository {
    async fn list_events(&self, include_unpublished: bool) -> Result<Vec<Event>> {
        let recs = sqlx::query_as::<_, Event>(
            "SELECT * FROM events WHERE is_published OR $1 ORDER BY starts_at DESC",
        )
        .bind(include_unpublished)
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }

    async fn find_event_by_id(&self, event_id: i64) -> Result<Option<Event>> {
        let rec = sqlx::query_as::<_, Event>("SELECT * FROM events WHERE event_id = $1")
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(rec)
    }

    async fn find_event_by_slug(&self, slug: &str) -> Result<Option<Event>> {
        let rec = sqlx::query_as::<_, Event>("SELECT * FROM events WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(rec)
    }

    async fn find_current_event(&self, now: DateTime<Utc>) -> Result<Option<Event>> {
        let rec = sqlx::query_as::<_, Event>(
            r#"SELECT * FROM events
               WHERE is_published AND ends_at >= $1
               ORDER BY starts_at ASC
               LIMIT 1"#,
        )
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn insert_event(&self, input: EventInput) -> Result<Event> {
        let rec = sqlx::query_as::<_, Event>(
            r#"INSERT INTO events (slug, name, description, venue, starts_at, ends_at, is_published)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING *"#,
        )
        .bind(input.slug)
        .bind(input.name)
        .bind(input.description)
        .bind(input.venue)
        .bind(input.starts_at)
        .bind(input.ends_at)
        .bind(input.is_published)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_conflict(e, "an event already uses this slug"))?;
        Ok(rec)
    }

    async fn update_event(&self, event_id: i64, input: EventInput) -> Result<Option<Event>> {
        let rec = sqlx::query_as::<_, Event>(
            r#"UPDATE events
               SET slug = $2, name = $3, description = $4, venue = $5,
                   starts_at = $6, ends_at = $7, is_published = $8, updated_at = now()
               WHERE event_id = $1
               RETURNING *"#,
        )
        .bind(event_id)
        .bind(input.slug)
        .bind(input.name)
        .bind(input.description)
        .bind(input.venue)
        .bind(input.starts_at)
        .bind(input.ends_at)
        .bind(input.is_published)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| unique_conflict(e, "an event already uses this slug"))?;
        Ok(rec)
    }

    async fn delete_event(&self, event_id: i64) -> Result<bool> {
        self.delete_by_id("DELETE FROM events WHERE event_id = $1", event_id)
            .await
    }

    async fn list_passes(&self, event_id: i64) -> Result<Vec<Pass>> {
        let recs = sqlx::query_as::<_, Pass>(
            "SELECT * FROM passes WHERE event_id = $1 ORDER BY price ASC, pass_id ASC",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }

    async fn find_pass(&self, pass_id: i64) -> Result<Option<Pass>> {
        let rec = sqlx::query_as::<_, Pass>("SELECT * FROM passes WHERE pass_id = $1")
            .bind(pass_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(rec)
    }

    async fn find_passes(&self, pass_ids: &[i64]) -> Result<Vec<Pass>> {
        let recs = sqlx::query_as::<_, Pass>("SELECT * FROM passes WHERE pass_id = ANY($1)")
            .bind(pass_ids.to_vec())
            .fetch_all(&self.pool)
            .await?;
        Ok(recs)
    }

    async fn insert_pass(&self, input: PassInput) -> Result<Pass> {
        let rec = sqlx::query_as::<_, Pass>(
            r#"INSERT INTO passes (event_id, name, description, price, currency, capacity, sales_open)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING *"#,
        )
        .bind(input.event_id)
        .bind(input.name)
        .bind(input.description)
        .bind(input.price)
        .bind(input.currency)
        .bind(input.capacity)
        .bind(input.sales_open)
        .fetch_one(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn update_pass(&self, pass_id: i64, input: PassInput) -> Result<Option<Pass>> {
        let rec = sqlx::query_as::<_, Pass>(
            r#"UPDATE passes
               SET name = $2, description = $3, price = $4, currency = $5,
                   capacity = $6, sales_open = $7
               WHERE pass_id = $1 AND ($6::INT IS NULL OR sold <= $6)
               RETURNING *"#,
        )
        .bind(pass_id)
        .bind(input.name)
        .bind(input.description)
        .bind(input.price)
        .bind(input.currency)
        .bind(input.capacity)
        .bind(input.sales_open)
        .fetch_optional(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn delete_pass(&self, pass_id: i64) -> Result<bool> {
        self.delete_by_id("DELETE FROM passes WHERE pass_id = $1 AND sold = 0", pass_id)
            .await
    }

    async fn list_speakers(&self, event_id: i64) -> Result<Vec<Speaker>> {
        let recs = sqlx::query_as::<_, Speaker>(
            "SELECT * FROM speakers WHERE event_id = $1 ORDER BY full_name ASC",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }

    async fn find_speaker(&self, speaker_id: i64) -> Result<Option<Speaker>> {
        let rec = sqlx::query_as::<_, Speaker>("SELECT * FROM speakers WHERE speaker_id = $1")
            .bind(speaker_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(rec)
    }

    async fn insert_speaker(&self, input: SpeakerInput) -> Result<Speaker> {
        let rec = sqlx::query_as::<_, Speaker>(
            r#"INSERT INTO speakers (event_id, full_name, email, company, job_title, bio, photo_url)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING *"#,
        )
        .bind(input.event_id)
        .bind(input.full_name)
        .bind(input.email)
        .bind(input.company)
        .bind(input.job_title)
        .bind(input.bio)
        .bind(input.photo_url)
        .fetch_one(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn update_speaker(&self, speaker_id: i64, input: SpeakerInput) -> Result<Option<Speaker>> {
        let rec = sqlx::query_as::<_, Speaker>(
            r#"UPDATE speakers
               SET full_name = $2, email = $3, company = $4, job_title = $5, bio = $6, photo_url = $7
               WHERE speaker_id = $1
               RETURNING *"#,
        )
        .bind(speaker_id)
        .bind(input.full_name)
        .bind(input.email)
        .bind(input.company)
        .bind(input.job_title)
        .bind(input.bio)
        .bind(input.photo_url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn delete_speaker(&self, speaker_id: i64) -> Result<bool> {
        self.delete_by_id("DELETE FROM speakers WHERE speaker_id = $1", speaker_id)
            .await
    }

    async fn list_exhibitors(&self, event_id: i64) -> Result<Vec<Exhibitor>> {
        let recs = sqlx::query_as::<_, Exhibitor>(
            "SELECT * FROM exhibitors WHERE event_id = $1 ORDER BY company_name ASC",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }

    async fn find_exhibitor(&self, exhibitor_id: i64) -> Result<Option<Exhibitor>> {
        let rec =
            sqlx::query_as::<_, Exhibitor>("SELECT * FROM exhibitors WHERE exhibitor_id = $1")
                .bind(exhibitor_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(rec)
    }

    async fn insert_exhibitor(&self, input: ExhibitorInput) -> Result<Exhibitor> {
        let rec = sqlx::query_as::<_, Exhibitor>(
            r#"INSERT INTO exhibitors (event_id, company_name, contact_name, contact_email, booth, website)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING *"#,
        )
        .bind(input.event_id)
        .bind(input.company_name)
        .bind(input.contact_name)
        .bind(input.contact_email)
        .bind(input.booth)
        .bind(input.website)
        .fetch_one(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn update_exhibitor(
        &self,
        exhibitor_id: i64,
        input: ExhibitorInput,
    ) -> Result<Option<Exhibitor>> {
        let rec = sqlx::query_as::<_, Exhibitor>(
            r#"UPDATE exhibitors
               SET company_name = $2, contact_name = $3, contact_email = $4, booth = $5, website = $6
               WHERE exhibitor_id = $1
               RETURNING *"#,
        )
        .bind(exhibitor_id)
        .bind(input.company_name)
        .bind(input.contact_name)
        .bind(input.contact_email)
        .bind(input.booth)
        .bind(input.website)
        .fetch_optional(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn delete_exhibitor(&self, exhibitor_id: i64) -> Result<bool> {
        self.delete_by_id("DELETE FROM exhibitors WHERE exhibitor_id = $1", exhibitor_id)
            .await
    }

    async fn list_visitors(&self, event_id: i64) -> Result<Vec<Visitor>> {
        let recs = sqlx::query_as::<_, Visitor>(
            "SELECT * FROM visitors WHERE event_id = $1 ORDER BY created_at DESC",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }

    async fn find_visitor(&self, visitor_id: i64) -> Result<Option<Visitor>> {
        let rec = sqlx::query_as::<_, Visitor>("SELECT * FROM visitors WHERE visitor_id = $1")
            .bind(visitor_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(rec)
    }

    async fn insert_visitor(&self, input: VisitorInput) -> Result<Visitor> {
        let rec = sqlx::query_as::<_, Visitor>(
            r#"INSERT INTO visitors (event_id, full_name, email, phone, company)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING *"#,
        )
        .bind(input.event_id)
        .bind(input.full_name)
        .bind(input.email)
        .bind(input.phone)
        .bind(input.company)
        .fetch_one(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn update_visitor(&self, visitor_id: i64, input: VisitorInput) -> Result<Option<Visitor>> {
        let rec = sqlx::query_as::<_, Visitor>(
            r#"UPDATE visitors
               SET full_name = $2, email = $3, phone = $4, company = $5
               WHERE visitor_id = $1
               RETURNING *"#,
        )
        .bind(visitor_id)
        .bind(input.full_name)
        .bind(input.email)
        .bind(input.phone)
        .bind(input.company)
        .fetch_optional(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn delete_visitor(&self, visitor_id: i64) -> Result<bool> {
        self.delete_by_id("DELETE FROM visitors WHERE visitor_id = $1", visitor_id)
            .await
    }

    async fn list_sessions(&self, event_id: i64) -> Result<Vec<ConferenceSession>> {
        let recs = sqlx::query_as::<_, ConferenceSession>(
            "SELECT * FROM conference_sessions WHERE event_id = $1 ORDER BY starts_at ASC",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }

    async fn find_session(&self, session_id: i64) -> Result<Option<ConferenceSession>> {
        let rec = sqlx::query_as::<_, ConferenceSession>(
            "SELECT * FROM conference_sessions WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn insert_session(&self, input: SessionInput) -> Result<ConferenceSession> {
        let rec = sqlx::query_as::<_, ConferenceSession>(
            r#"INSERT INTO conference_sessions
                   (event_id, speaker_id, title, summary, room, track, starts_at, ends_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               RETURNING *"#,
        )
        .bind(input.event_id)
        .bind(input.speaker_id)
        .bind(input.title)
        .bind(input.summary)
        .bind(input.room)
        .bind(input.track)
        .bind(input.starts_at)
        .bind(input.ends_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn update_session(
        &self,
        session_id: i64,
        input: SessionInput,
    ) -> Result<Option<ConferenceSession>> {
        let rec = sqlx::query_as::<_, ConferenceSession>(
            r#"UPDATE conference_sessions
               SET speaker_id = $2, title = $3, summary = $4, room = $5, track = $6,
                   starts_at = $7, ends_at = $8
               WHERE session_id = $1
               RETURNING *"#,
        )
        .bind(session_id)
        .bind(input.speaker_id)
        .bind(input.title)
        .bind(input.summary)
        .bind(input.room)
        .bind(input.track)
        .bind(input.starts_at)
        .bind(input.ends_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn delete_session(&self, session_id: i64) -> Result<bool> {
        self.delete_by_id(
            "DELETE FROM conference_sessions WHERE session_id = $1",
            session_id,
        )
        .await
    }

    async fn list_schedule(&self, event_id: i64) -> Result<Vec<ScheduleEntry>> {
        let recs = sqlx::query_as::<_, ScheduleEntry>(
            r#"SELECT s.session_id, s.title, s.summary, s.room, s.track, s.starts_at, s.ends_at,
                      s.speaker_id, sp.full_name AS speaker_name
               FROM conference_sessions s
               LEFT JOIN speakers sp ON sp.speaker_id = s.speaker_id
               WHERE s.event_id = $1
               ORDER BY s.starts_at ASC, s.room ASC NULLS LAST"#,
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }
}

// ============= Orders =============

pub struct PgOrderRepository {
    pub pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn create_order(&self, new_order: NewOrder) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        for item in &new_order.items {
            let reserved = sqlx::query(
                r#"UPDATE passes SET sold = sold + $2
                   WHERE pass_id = $1 AND sales_open
                     AND (capacity IS NULL OR sold + $2 <= capacity)"#,
            )
            .bind(item.pass_id)
            .bind(item.quantity)
            .execute(&mut *tx)
            .await?;

            if reserved.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(ServiceError::conflict(format!(
                    "pass {} is sold out or no longer on sale",
                    item.pass_id
                )));
            }
        }

        let order = sqlx::query_as::<_, Order>(
            r#"INSERT INTO orders
                   (external_id, event_id, user_id, buyer_name, buyer_email, buyer_phone,
                    status, total_amount, currency)
               VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7, $8)
               RETURNING *"#,
        )
        .bind(new_order.external_id)
        .bind(new_order.event_id)
        .bind(new_order.user_id)
        .bind(&new_order.buyer_name)
        .bind(&new_order.buyer_email)
        .bind(&new_order.buyer_phone)
        .bind(new_order.total_amount)
        .bind(&new_order.currency)
        .fetch_one(&mut *tx)
        .await?;

        for item in &new_order.items {
            sqlx::query(
                r#"INSERT INTO order_items (order_id, pass_id, quantity, unit_price)
                   VALUES ($1, $2, $3, $4)"#,
            )
            .bind(order.order_id)
            .bind(item.pass_id)
            .bind(item.quantity)
            .bind(item.unit_price)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(order)
    }

    async fn find_by_external_id(&self, external_id: Uuid) -> Result<Option<Order>> {
        let rec = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE external_id = $1")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(rec)
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Order>> {
        let rec = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE payment_reference = $1")
            .bind(reference)
            .fetch_optional(&self.pool)
            .await?;
        Ok(rec)
    }

    async fn list_items(&self, order_id: i64) -> Result<Vec<OrderItem>> {
        let recs = sqlx::query_as::<_, OrderItem>(
            r#"SELECT oi.order_item_id, oi.order_id, oi.pass_id, p.name AS pass_name,
                      oi.quantity, oi.unit_price
               FROM order_items oi
               JOIN passes p ON p.pass_id = oi.pass_id
               WHERE oi.order_id = $1
               ORDER BY oi.order_item_id ASC"#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }

    async fn set_payment_reference(
        &self,
        order_id: i64,
        reference: &str,
        checkout_url: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE orders SET payment_reference = $2, checkout_url = $3 WHERE order_id = $1",
        )
        .bind(order_id)
        .bind(reference)
        .bind(checkout_url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_paid(
        &self,
        order_id: i64,
        tickets: Vec<NewTicket>,
    ) -> Result<Option<Vec<Ticket>>> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"UPDATE orders SET status = 'paid', paid_at = now()
               WHERE order_id = $1 AND status = 'pending'"#,
        )
        .bind(order_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let mut issued = Vec::with_capacity(tickets.len());
        for ticket in tickets {
            let rec = sqlx::query_as::<_, Ticket>(
                r#"INSERT INTO tickets (code, order_id, pass_id, event_id, holder_name, holder_email)
                   VALUES ($1, $2, $3, $4, $5, $6)
                   RETURNING *"#,
            )
            .bind(ticket.code)
            .bind(order_id)
            .bind(ticket.pass_id)
            .bind(ticket.event_id)
            .bind(ticket.holder_name)
            .bind(ticket.holder_email)
            .fetch_one(&mut *tx)
            .await?;
            issued.push(rec);
        }

        tx.commit().await?;
        Ok(Some(issued))
    }

    async fn close_pending(&self, order_id: i64, status: OrderStatus) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let updated =
            sqlx::query("UPDATE orders SET status = $2 WHERE order_id = $1 AND status = 'pending'")
                .bind(order_id)
                .bind(status)
                .execute(&mut *tx)
                .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"UPDATE passes p SET sold = GREATEST(p.sold - oi.quantity, 0)
               FROM order_items oi
               WHERE oi.order_id = $1 AND oi.pass_id = p.pass_id"#,
        )
        .bind(order_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn list_tickets(&self, order_id: i64) -> Result<Vec<Ticket>> {
        let recs = sqlx::query_as::<_, Ticket>(
            "SELECT * FROM tickets WHERE order_id = $1 ORDER BY ticket_id ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Order>> {
        let recs = sqlx::query_as::<_, Order>(
            "SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }

    async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Order>> {
        let recs = sqlx::query_as::<_, Order>(
            r#"SELECT * FROM orders
               WHERE ($1::order_status IS NULL OR status = $1)
               ORDER BY created_at DESC
               LIMIT $2 OFFSET $3"#,
        )
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }

    async fn sales_summary(&self, event_id: i64) -> Result<SalesSummary> {
        let rec = sqlx::query_as::<_, SalesSummary>(
            r#"SELECT
                   COUNT(*) FILTER (WHERE status = 'paid') AS paid_orders,
                   COUNT(*) FILTER (WHERE status = 'pending') AS pending_orders,
                   COALESCE(SUM(total_amount) FILTER (WHERE status = 'paid'), 0)::BIGINT AS revenue,
                   (SELECT COUNT(*) FROM tickets t
                     WHERE t.event_id = $1 AND t.status = 'valid') AS tickets_issued
               FROM orders
               WHERE event_id = $1"#,
        )
        .bind(event_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(rec)
    }
}

// ============= Check-in =============

pub struct PgCheckinRepository {
    pub pool: PgPool,
}

impl PgCheckinRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn exists(&self, sql: &str, subject_id: i64, event_id: i64) -> Result<bool> {
        let found = sqlx::query_scalar::<_, i32>(sql)
            .bind(subject_id)
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl CheckinRepository for PgCheckinRepository {
    async fn search_tickets(
        &self,
        event_id: i64,
        pattern: &str,
        code: Option<&str>,
        limit: i64,
    ) -> Result<Vec<CheckinCandidate>> {
        let recs = sqlx::query_as::<_, CheckinCandidate>(
            r#"SELECT 'ticket'::checkin_kind AS kind, t.ticket_id AS id, t.holder_name AS name,
                      t.holder_email AS email, p.name AS detail, t.code AS code, c.checked_in_at
               FROM tickets t
               JOIN passes p ON p.pass_id = t.pass_id
               LEFT JOIN checkins c
                      ON c.event_id = t.event_id AND c.subject_kind = 'ticket'
                     AND c.subject_id = t.ticket_id
               WHERE t.event_id = $1 AND t.status = 'valid'
                 AND (t.code = $2
                      OR lower(t.holder_name) LIKE $3
                      OR lower(t.holder_email) LIKE $3
                      OR lower(p.name) LIKE $3)
               ORDER BY t.holder_name ASC
               LIMIT $4"#,
        )
        .bind(event_id)
        .bind(code)
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }

    async fn search_users(
        &self,
        event_id: i64,
        pattern: &str,
        limit: i64,
    ) -> Result<Vec<CheckinCandidate>> {
        let recs = sqlx::query_as::<_, CheckinCandidate>(
            r#"SELECT 'user'::checkin_kind AS kind, u.user_id AS id, u.full_name AS name,
                      u.email AS email, u.username AS detail, NULL::TEXT AS code, c.checked_in_at
               FROM users u
               LEFT JOIN checkins c
                      ON c.event_id = $1 AND c.subject_kind = 'user' AND c.subject_id = u.user_id
               WHERE lower(u.full_name) LIKE $2
                  OR lower(u.email) LIKE $2
                  OR lower(u.username) LIKE $2
               ORDER BY u.full_name ASC
               LIMIT $3"#,
        )
        .bind(event_id)
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }

    async fn search_speakers(
        &self,
        event_id: i64,
        pattern: &str,
        limit: i64,
    ) -> Result<Vec<CheckinCandidate>> {
        let recs = sqlx::query_as::<_, CheckinCandidate>(
            r#"SELECT 'speaker'::checkin_kind AS kind, s.speaker_id AS id, s.full_name AS name,
                      s.email AS email, s.company AS detail, NULL::TEXT AS code, c.checked_in_at
               FROM speakers s
               LEFT JOIN checkins c
                      ON c.event_id = s.event_id AND c.subject_kind = 'speaker'
                     AND c.subject_id = s.speaker_id
               WHERE s.event_id = $1
                 AND (lower(s.full_name) LIKE $2
                      OR lower(coalesce(s.email, '')) LIKE $2
                      OR lower(coalesce(s.company, '')) LIKE $2)
               ORDER BY s.full_name ASC
               LIMIT $3"#,
        )
        .bind(event_id)
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }

    async fn search_exhibitors(
        &self,
        event_id: i64,
        pattern: &str,
        limit: i64,
    ) -> Result<Vec<CheckinCandidate>> {
        let recs = sqlx::query_as::<_, CheckinCandidate>(
            r#"SELECT 'exhibitor'::checkin_kind AS kind, e.exhibitor_id AS id,
                      e.company_name AS name, e.contact_email AS email,
                      concat_ws(' / ', e.contact_name, e.booth) AS detail,
                      NULL::TEXT AS code, c.checked_in_at
               FROM exhibitors e
               LEFT JOIN checkins c
                      ON c.event_id = e.event_id AND c.subject_kind = 'exhibitor'
                     AND c.subject_id = e.exhibitor_id
               WHERE e.event_id = $1
                 AND (lower(e.company_name) LIKE $2
                      OR lower(coalesce(e.contact_name, '')) LIKE $2
                      OR lower(coalesce(e.contact_email, '')) LIKE $2)
               ORDER BY e.company_name ASC
               LIMIT $3"#,
        )
        .bind(event_id)
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }

    async fn search_visitors(
        &self,
        event_id: i64,
        pattern: &str,
        limit: i64,
    ) -> Result<Vec<CheckinCandidate>> {
        let recs = sqlx::query_as::<_, CheckinCandidate>(
            r#"SELECT 'visitor'::checkin_kind AS kind, v.visitor_id AS id, v.full_name AS name,
                      v.email AS email, v.company AS detail, NULL::TEXT AS code, c.checked_in_at
               FROM visitors v
               LEFT JOIN checkins c
                      ON c.event_id = v.event_id AND c.subject_kind = 'visitor'
                     AND c.subject_id = v.visitor_id
               WHERE v.event_id = $1
                 AND (lower(v.full_name) LIKE $2
                      OR lower(coalesce(v.email, '')) LIKE $2
                      OR coalesce(v.phone, '') LIKE $2
                      OR lower(coalesce(v.company, '')) LIKE $2)
               ORDER BY v.full_name ASC
               LIMIT $3"#,
        )
        .bind(event_id)
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }

    async fn subject_status(
        &self,
        event_id: i64,
        kind: CheckinKind,
        subject_id: i64,
    ) -> Result<Option<SubjectStatus>> {
        let found = match kind {
            CheckinKind::Ticket => {
                let status = sqlx::query_scalar::<_, TicketStatus>(
                    "SELECT status FROM tickets WHERE ticket_id = $1 AND event_id = $2",
                )
                .bind(subject_id)
                .bind(event_id)
                .fetch_optional(&self.pool)
                .await?;
                return Ok(status.map(|s| match s {
                    TicketStatus::Valid => SubjectStatus::Active,
                    TicketStatus::Void => SubjectStatus::Void,
                }));
            }
            CheckinKind::Speaker => {
                self.exists(
                    "SELECT 1 FROM speakers WHERE speaker_id = $1 AND event_id = $2",
                    subject_id,
                    event_id,
                )
                .await?
            }
            CheckinKind::Exhibitor => {
                self.exists(
                    "SELECT 1 FROM exhibitors WHERE exhibitor_id = $1 AND event_id = $2",
                    subject_id,
                    event_id,
                )
                .await?
            }
            CheckinKind::Visitor => {
                self.exists(
                    "SELECT 1 FROM visitors WHERE visitor_id = $1 AND event_id = $2",
                    subject_id,
                    event_id,
                )
                .await?
            }
            CheckinKind::User => {
                // users are not scoped to an event; $2 only keeps the bind arity
                self.exists(
                    "SELECT 1 FROM users WHERE user_id = $1 AND $2::BIGINT IS NOT NULL",
                    subject_id,
                    event_id,
                )
                .await?
            }
        };
        Ok(found.then_some(SubjectStatus::Active))
    }

    async fn insert_checkin(&self, checkin: NewCheckin) -> Result<Option<Checkin>> {
        let rec = sqlx::query_as::<_, Checkin>(
            r#"INSERT INTO checkins (event_id, subject_kind, subject_id, checked_in_by)
               VALUES ($1, $2, $3, $4)
               ON CONFLICT (event_id, subject_kind, subject_id) DO NOTHING
               RETURNING *"#,
        )
        .bind(checkin.event_id)
        .bind(checkin.subject_kind)
        .bind(checkin.subject_id)
        .bind(checkin.checked_in_by)
        .fetch_optional(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn find_checkin(
        &self,
        event_id: i64,
        kind: CheckinKind,
        subject_id: i64,
    ) -> Result<Option<Checkin>> {
        let rec = sqlx::query_as::<_, Checkin>(
            r#"SELECT * FROM checkins
               WHERE event_id = $1 AND subject_kind = $2 AND subject_id = $3"#,
        )
        .bind(event_id)
        .bind(kind)
        .bind(subject_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn delete_checkin(
        &self,
        event_id: i64,
        kind: CheckinKind,
        subject_id: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM checkins WHERE event_id = $1 AND subject_kind = $2 AND subject_id = $3",
        )
        .bind(event_id)
        .bind(kind)
        .bind(subject_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_by_kind(&self, event_id: i64) -> Result<Vec<CheckinCount>> {
        let recs = sqlx::query_as::<_, CheckinCount>(
            r#"SELECT subject_kind, COUNT(*) AS total
               FROM checkins
               WHERE event_id = $1
               GROUP BY subject_kind"#,
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }
}

// ============= Blog =============

pub struct PgBlogRepository {
    pub pool: PgPool,
}

impl PgBlogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BlogRepository for PgBlogRepository {
    async fn insert_post(&self, post: NewBlogPost) -> Result<BlogPost> {
        let rec = sqlx::query_as::<_, BlogPost>(
            r#"INSERT INTO blog_posts (slug, title, excerpt, body, author_id)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING *"#,
        )
        .bind(post.slug)
        .bind(post.title)
        .bind(post.excerpt)
        .bind(post.body)
        .bind(post.author_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_conflict(e, "a post already uses this slug"))?;
        Ok(rec)
    }

    async fn update_post(&self, post_id: i64, update: BlogPostUpdate) -> Result<Option<BlogPost>> {
        let rec = sqlx::query_as::<_, BlogPost>(
            r#"UPDATE blog_posts
               SET slug = $2, title = $3, excerpt = $4, body = $5, updated_at = now()
               WHERE post_id = $1
               RETURNING *"#,
        )
        .bind(post_id)
        .bind(update.slug)
        .bind(update.title)
        .bind(update.excerpt)
        .bind(update.body)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| unique_conflict(e, "a post already uses this slug"))?;
        Ok(rec)
    }

    async fn delete_post(&self, post_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM blog_posts WHERE post_id = $1")
            .bind(post_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_post_by_id(&self, post_id: i64) -> Result<Option<BlogPost>> {
        let rec = sqlx::query_as::<_, BlogPost>("SELECT * FROM blog_posts WHERE post_id = $1")
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(rec)
    }

    async fn find_post_by_slug(&self, slug: &str) -> Result<Option<BlogPost>> {
        let rec = sqlx::query_as::<_, BlogPost>("SELECT * FROM blog_posts WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(rec)
    }

    async fn slugs_with_prefix(&self, base: &str) -> Result<Vec<String>> {
        let recs = sqlx::query_scalar::<_, String>(
            "SELECT slug FROM blog_posts WHERE slug = $1 OR slug LIKE $2",
        )
        .bind(base)
        .bind(format!("{base}-%"))
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }

    async fn set_published(
        &self,
        post_id: i64,
        published: bool,
        published_at: Option<DateTime<Utc>>,
    ) -> Result<Option<BlogPost>> {
        let rec = sqlx::query_as::<_, BlogPost>(
            r#"UPDATE blog_posts
               SET published = $2, published_at = $3, updated_at = now()
               WHERE post_id = $1
               RETURNING *"#,
        )
        .bind(post_id)
        .bind(published)
        .bind(published_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn list_published(&self, limit: i64, offset: i64) -> Result<Vec<BlogPost>> {
        let recs = sqlx::query_as::<_, BlogPost>(
            r#"SELECT * FROM blog_posts
               WHERE published
               ORDER BY published_at DESC
               LIMIT $1 OFFSET $2"#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }

    async fn count_published(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM blog_posts WHERE published")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn list_all(&self) -> Result<Vec<BlogPost>> {
        let recs =
            sqlx::query_as::<_, BlogPost>("SELECT * FROM blog_posts ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?;
        Ok(recs)
    }
}

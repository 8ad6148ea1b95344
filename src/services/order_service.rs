use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{Email, Phone, generate_ticket_code};
use crate::handler::errors::ServiceError;
use crate::repository::{
    NewOrder, NewOrderItem, NewTicket, Order, OrderItem, OrderRepository, OrderStatus, Pass,
    ProgramRepository, SalesSummary, Ticket,
};
use crate::services::naboopay::{
    CheckoutProduct, CheckoutRequest, PaymentGateway, PaymentNotification, TransactionStatus,
};

pub const MAX_QUANTITY_PER_PASS: i32 = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct OrderLine {
    pub pass_id: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderLine>,
    pub buyer_name: String,
    pub buyer_email: String,
    #[serde(default)]
    pub buyer_phone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderDetails {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub tickets: Vec<Ticket>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckoutOutcome {
    /// Nothing to pay; tickets were issued right away.
    Completed { order: OrderDetails },
    /// The buyer must be sent to the hosted payment page.
    Redirect {
        order_external_id: Uuid,
        checkout_url: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NotificationOutcome {
    Paid { tickets_issued: usize },
    Unchanged,
    Cancelled,
    Ignored,
}

pub struct OrderService<O: OrderRepository, R: ProgramRepository> {
    pub order_repo: Arc<O>,
    pub program_repo: Arc<R>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub public_base_url: String,
}

impl<O: OrderRepository, R: ProgramRepository> OrderService<O, R> {
    pub fn new(
        order_repo: Arc<O>,
        program_repo: Arc<R>,
        gateway: Arc<dyn PaymentGateway>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            order_repo,
            program_repo,
            gateway,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn create_order(
        &self,
        req: CreateOrderRequest,
        user_id: Option<i64>,
    ) -> Result<CheckoutOutcome> {
        let buyer_name = req.buyer_name.trim().to_string();
        if buyer_name.is_empty() {
            return Err(ServiceError::validation("buyer name is required"));
        }
        let buyer_email = Email::try_from(req.buyer_email.as_str())
            .map_err(|_| ServiceError::validation("invalid buyer email"))?;
        let buyer_phone = match req.buyer_phone.as_deref().map(str::trim) {
            Some(p) if !p.is_empty() => Some(
                Phone::try_from(p)
                    .map_err(|_| ServiceError::validation("invalid buyer phone"))?
                    .to_string(),
            ),
            _ => None,
        };

        validate_lines(&req.items)?;

        let pass_ids: Vec<i64> = req.items.iter().map(|l| l.pass_id).collect();
        let passes = self.program_repo.find_passes(&pass_ids).await?;
        let (event_id, currency, items, total) = price_lines(&req.items, &passes)?;

        let event = self
            .program_repo
            .find_event_by_id(event_id)
            .await?
            .filter(|e| e.is_published)
            .ok_or_else(|| ServiceError::not_found("event not found"))?;

        let order = self
            .order_repo
            .create_order(NewOrder {
                external_id: Uuid::new_v4(),
                event_id,
                user_id,
                buyer_name,
                buyer_email: buyer_email.to_string(),
                buyer_phone,
                total_amount: total,
                currency,
                items: items.clone(),
            })
            .await?;

        tracing::info!(
            order_id = order.order_id,
            external_id = %order.external_id,
            total = order.total_amount,
            "order created"
        );

        if order.total_amount == 0 {
            self.settle(&order).await?;
            let details = self.details(order.external_id).await?;
            return Ok(CheckoutOutcome::Completed { order: details });
        }

        let products = items
            .iter()
            .filter_map(|item| {
                passes.iter().find(|p| p.pass_id == item.pass_id).map(|p| CheckoutProduct {
                    name: p.name.clone(),
                    category: "ticket".to_string(),
                    amount: item.unit_price,
                    quantity: item.quantity,
                    description: event.name.clone(),
                })
            })
            .collect();

        let checkout = CheckoutRequest {
            order_external_id: order.external_id,
            products,
            success_url: format!(
                "{}/checkout/success?order={}",
                self.public_base_url, order.external_id
            ),
            error_url: format!(
                "{}/checkout/error?order={}",
                self.public_base_url, order.external_id
            ),
        };

        let session = match self.gateway.create_checkout(checkout).await {
            Ok(session) => session,
            Err(err) => {
                tracing::error!(order_id = order.order_id, error = %err, "checkout creation failed");
                self.order_repo
                    .close_pending(order.order_id, OrderStatus::Failed)
                    .await?;
                return Err(ServiceError::gateway(err.to_string()));
            }
        };

        if let Err(err) = self
            .order_repo
            .set_payment_reference(order.order_id, &session.reference, &session.checkout_url)
            .await
        {
            tracing::error!(
                order_id = order.order_id,
                reference = %session.reference,
                error = %err,
                "failed to store payment reference"
            );
            self.order_repo
                .close_pending(order.order_id, OrderStatus::Failed)
                .await?;
            return Err(err);
        }

        Ok(CheckoutOutcome::Redirect {
            order_external_id: order.external_id,
            checkout_url: session.checkout_url,
        })
    }

    pub async fn handle_payment_notification(
        &self,
        notification: PaymentNotification,
    ) -> Result<NotificationOutcome> {
        let order = self
            .order_repo
            .find_by_reference(&notification.reference)
            .await?
            .ok_or_else(|| ServiceError::not_found("unknown payment reference"))?;

        self.apply(&order, notification.status, notification.amount)
            .await
    }

    /// Re-reads the remote transaction and applies its status.
    pub async fn reconcile(&self, external_id: Uuid) -> Result<NotificationOutcome> {
        let order = self
            .order_repo
            .find_by_external_id(external_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("order not found"))?;

        let Some(reference) = order.payment_reference.as_deref() else {
            return Ok(NotificationOutcome::Ignored);
        };

        let remote = self
            .gateway
            .fetch_transaction(reference)
            .await
            .map_err(|e| ServiceError::gateway(e.to_string()))?;

        self.apply(&order, remote.status, remote.amount).await
    }

    async fn apply(
        &self,
        order: &Order,
        status: TransactionStatus,
        amount: Option<i64>,
    ) -> Result<NotificationOutcome> {
        if status.is_settled() {
            if let Some(amount) = amount {
                if amount != order.total_amount {
                    tracing::warn!(
                        order_id = order.order_id,
                        expected = order.total_amount,
                        received = amount,
                        "payment amount mismatch"
                    );
                    return Err(ServiceError::validation("payment amount does not match order"));
                }
            }

            return match order.status {
                OrderStatus::Pending => match self.settle(order).await? {
                    Some(count) => Ok(NotificationOutcome::Paid {
                        tickets_issued: count,
                    }),
                    None => Ok(NotificationOutcome::Unchanged),
                },
                OrderStatus::Paid => Ok(NotificationOutcome::Unchanged),
                OrderStatus::Failed | OrderStatus::Cancelled => {
                    tracing::warn!(
                        order_id = order.order_id,
                        status = %order.status,
                        "payment received for a closed order"
                    );
                    Ok(NotificationOutcome::Ignored)
                }
            };
        }

        if status.is_cancelled() {
            if order.status == OrderStatus::Pending
                && self
                    .order_repo
                    .close_pending(order.order_id, OrderStatus::Cancelled)
                    .await?
            {
                tracing::info!(order_id = order.order_id, "order cancelled by gateway");
                return Ok(NotificationOutcome::Cancelled);
            }
            return Ok(NotificationOutcome::Unchanged);
        }

        Ok(NotificationOutcome::Ignored)
    }

    /// Marks a pending order paid and issues one ticket per seat. `None`
    /// when another notification got there first.
    async fn settle(&self, order: &Order) -> Result<Option<usize>> {
        let items = self.order_repo.list_items(order.order_id).await?;
        let tickets = build_tickets(order, &items);

        match self.order_repo.mark_paid(order.order_id, tickets).await? {
            Some(issued) => {
                tracing::info!(
                    order_id = order.order_id,
                    tickets = issued.len(),
                    "order paid"
                );
                Ok(Some(issued.len()))
            }
            None => Ok(None),
        }
    }

    pub async fn get_order(&self, external_id: Uuid) -> Result<OrderDetails> {
        self.details(external_id).await
    }

    async fn details(&self, external_id: Uuid) -> Result<OrderDetails> {
        let order = self
            .order_repo
            .find_by_external_id(external_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("order not found"))?;
        let items = self.order_repo.list_items(order.order_id).await?;
        let tickets = self.order_repo.list_tickets(order.order_id).await?;
        Ok(OrderDetails {
            order,
            items,
            tickets,
        })
    }

    pub async fn list_orders_for_user(&self, user_id: i64) -> Result<Vec<Order>> {
        self.order_repo.list_for_user(user_id).await
    }

    pub async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        page: i64,
        per_page: i64,
    ) -> Result<Vec<Order>> {
        let per_page = per_page.clamp(1, 200);
        let offset = (page.max(1) - 1).saturating_mul(per_page);
        self.order_repo.list_orders(status, per_page, offset).await
    }

    pub async fn sales_summary(&self, event_id: i64) -> Result<SalesSummary> {
        self.order_repo.sales_summary(event_id).await
    }

    /// Admin cancellation of an unpaid order.
    pub async fn cancel_order(&self, external_id: Uuid) -> Result<()> {
        let order = self
            .order_repo
            .find_by_external_id(external_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("order not found"))?;

        if !self
            .order_repo
            .close_pending(order.order_id, OrderStatus::Cancelled)
            .await?
        {
            return Err(ServiceError::conflict("only pending orders can be cancelled"));
        }
        tracing::info!(order_id = order.order_id, "order cancelled by admin");
        Ok(())
    }
}

fn validate_lines(lines: &[OrderLine]) -> Result<()> {
    if lines.is_empty() {
        return Err(ServiceError::validation("order has no items"));
    }
    let mut seen = HashSet::new();
    for line in lines {
        if !(1..=MAX_QUANTITY_PER_PASS).contains(&line.quantity) {
            return Err(ServiceError::validation(format!(
                "quantity must be between 1 and {MAX_QUANTITY_PER_PASS}"
            )));
        }
        if !seen.insert(line.pass_id) {
            return Err(ServiceError::validation("duplicate pass in order"));
        }
    }
    Ok(())
}

/// Prices the order from current pass data: `(event_id, currency, items, total)`.
fn price_lines(
    lines: &[OrderLine],
    passes: &[Pass],
) -> Result<(i64, String, Vec<NewOrderItem>, i64)> {
    let mut event_id = None;
    let mut currency: Option<&str> = None;
    let mut items = Vec::with_capacity(lines.len());
    let mut total: i64 = 0;

    for line in lines {
        let pass = passes
            .iter()
            .find(|p| p.pass_id == line.pass_id)
            .ok_or_else(|| ServiceError::not_found(format!("pass {} not found", line.pass_id)))?;

        if !pass.sales_open {
            return Err(ServiceError::conflict(format!(
                "{} is no longer on sale",
                pass.name
            )));
        }
        if *event_id.get_or_insert(pass.event_id) != pass.event_id {
            return Err(ServiceError::validation("passes belong to different events"));
        }
        if *currency.get_or_insert(pass.currency.as_str()) != pass.currency {
            return Err(ServiceError::validation("passes use different currencies"));
        }

        let line_total = pass
            .price
            .checked_mul(i64::from(line.quantity))
            .and_then(|v| total.checked_add(v))
            .ok_or_else(|| ServiceError::validation("order total overflows"))?;
        total = line_total;

        items.push(NewOrderItem {
            pass_id: pass.pass_id,
            quantity: line.quantity,
            unit_price: pass.price,
        });
    }

    let event_id = event_id.ok_or_else(|| ServiceError::validation("order has no items"))?;
    let currency = currency.unwrap_or("XOF").to_string();
    Ok((event_id, currency, items, total))
}

fn build_tickets(order: &Order, items: &[OrderItem]) -> Vec<NewTicket> {
    items
        .iter()
        .flat_map(|item| {
            (0..item.quantity).map(move |_| NewTicket {
                code: generate_ticket_code(),
                pass_id: item.pass_id,
                event_id: order.event_id,
                holder_name: order.buyer_name.clone(),
                holder_email: order.buyer_email.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::errors::status_for;
    use axum::http::StatusCode;
    use chrono::Utc;
    use rstest::rstest;

    fn pass(pass_id: i64, event_id: i64, price: i64) -> Pass {
        Pass {
            pass_id,
            event_id,
            name: format!("Pass {pass_id}"),
            description: None,
            price,
            currency: "XOF".to_string(),
            capacity: Some(100),
            sold: 0,
            sales_open: true,
            created_at: Utc::now(),
        }
    }

    fn line(pass_id: i64, quantity: i32) -> OrderLine {
        OrderLine { pass_id, quantity }
    }

    #[rstest]
    #[case(vec![], "no items")]
    #[case(vec![line(1, 0)], "quantity")]
    #[case(vec![line(1, 11)], "quantity")]
    #[case(vec![line(1, 1), line(1, 2)], "duplicate")]
    fn test_validate_lines_rejects(#[case] lines: Vec<OrderLine>, #[case] needle: &str) {
        let err = validate_lines(&lines).unwrap_err();
        assert_eq!(status_for(&err), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains(needle), "{err}");
    }

    #[test]
    fn test_price_lines_totals() {
        let passes = vec![pass(1, 7, 25_000), pass(2, 7, 10_000)];
        let (event_id, currency, items, total) =
            price_lines(&[line(1, 2), line(2, 1)], &passes).unwrap();

        assert_eq!(event_id, 7);
        assert_eq!(currency, "XOF");
        assert_eq!(total, 60_000);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].unit_price, 25_000);
    }

    #[test]
    fn test_price_lines_rejects_mixed_events_and_closed_sales() {
        let passes = vec![pass(1, 7, 1_000), pass(2, 8, 1_000)];
        let err = price_lines(&[line(1, 1), line(2, 1)], &passes).unwrap_err();
        assert_eq!(status_for(&err), StatusCode::BAD_REQUEST);

        let mut closed = pass(3, 7, 1_000);
        closed.sales_open = false;
        let err = price_lines(&[line(3, 1)], &[closed]).unwrap_err();
        assert_eq!(status_for(&err), StatusCode::CONFLICT);

        let err = price_lines(&[line(9, 1)], &passes).unwrap_err();
        assert_eq!(status_for(&err), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_build_tickets_one_per_seat() {
        let order = Order {
            order_id: 1,
            external_id: Uuid::new_v4(),
            event_id: 7,
            user_id: None,
            buyer_name: "Awa Ndiaye".to_string(),
            buyer_email: "awa@example.sn".to_string(),
            buyer_phone: None,
            status: OrderStatus::Pending,
            total_amount: 0,
            currency: "XOF".to_string(),
            payment_reference: None,
            checkout_url: None,
            created_at: Utc::now(),
            paid_at: None,
        };
        let items = vec![
            OrderItem {
                order_item_id: 1,
                order_id: 1,
                pass_id: 1,
                pass_name: "Standard".to_string(),
                quantity: 3,
                unit_price: 0,
            },
            OrderItem {
                order_item_id: 2,
                order_id: 1,
                pass_id: 2,
                pass_name: "VIP".to_string(),
                quantity: 1,
                unit_price: 0,
            },
        ];

        let tickets = build_tickets(&order, &items);
        assert_eq!(tickets.len(), 4);
        assert_eq!(tickets.iter().filter(|t| t.pass_id == 1).count(), 3);
        let codes: HashSet<_> = tickets.iter().map(|t| t.code.clone()).collect();
        assert_eq!(codes.len(), 4);
    }
}

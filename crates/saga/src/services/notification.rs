//! Notification service trait and in-memory implementation.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use async_trait::async_trait;
use common::{IdempotencyKey, OrderPayload};
use tracing::info;

use super::{FailureMode, Fault, inject};
use crate::error::SagaError;
use crate::order_fulfillment::Step;

/// Sends the order confirmation.
#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn notify(&self, order: &OrderPayload, key: &IdempotencyKey) -> Result<(), SagaError>;
}

#[async_trait]
impl<T: NotificationService + ?Sized> NotificationService for Arc<T> {
    async fn notify(&self, order: &OrderPayload, key: &IdempotencyKey) -> Result<(), SagaError> {
        (**self).notify(order, key).await
    }
}

/// A rendered confirmation email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Renders the confirmation email for an order.
pub fn render_confirmation(order: &OrderPayload) -> ConfirmationEmail {
    let mut body = String::from(
        "Dear user,\n\nYour order has been confirmed.\n\nOrder Details:\n",
    );
    for item in &order.cart {
        body.push_str(&format!(
            "Product ID: {}, Quantity: {}\n",
            item.product_id, item.quantity
        ));
    }
    body.push_str("\nThank you for your purchase!");

    ConfirmationEmail {
        to: order.email_id.clone(),
        subject: "Order Confirmation".to_string(),
        body,
    }
}

#[derive(Debug, Default)]
struct InMemoryNotificationState {
    calls: u32,
    sent_keys: HashSet<String>,
    outbox: Vec<ConfirmationEmail>,
    fault: Fault,
}

/// Notifier that renders the confirmation and keeps it in an outbox
/// instead of delivering it.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationService {
    state: Arc<RwLock<InMemoryNotificationState>>,
}

impl InMemoryNotificationService {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryNotificationState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_fail_on_notify(&self, fail: bool) {
        let mode = if fail { FailureMode::Reject } else { FailureMode::None };
        self.write().fault.set(mode, None);
    }

    pub fn fail_with(&self, mode: FailureMode, times: Option<u32>) {
        self.write().fault.set(mode, times);
    }

    pub fn calls(&self) -> u32 {
        self.write().calls
    }

    /// Returns the emails sent so far.
    pub fn outbox(&self) -> Vec<ConfirmationEmail> {
        self.write().outbox.clone()
    }
}

#[async_trait]
impl NotificationService for InMemoryNotificationService {
    async fn notify(&self, order: &OrderPayload, key: &IdempotencyKey) -> Result<(), SagaError> {
        let mode = {
            let mut state = self.write();
            state.calls += 1;
            state.fault.next()
        };
        inject(mode, Step::SendNotification.name()).await?;

        let email = render_confirmation(order);
        let mut state = self.write();
        if state.sent_keys.insert(key.to_string()) {
            info!(to = %email.to, subject = %email.subject, "Notification sent successfully");
            state.outbox.push(email);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use common::CartItem;

    use super::*;

    #[test]
    fn test_render_lists_every_line() {
        let order = OrderPayload::new(
            1,
            "buyer@example.com",
            vec![CartItem::new(1, 2), CartItem::new(7, 1)],
        );
        let email = render_confirmation(&order);

        assert_eq!(email.to, "buyer@example.com");
        assert_eq!(email.subject, "Order Confirmation");
        assert_eq!(
            email.body,
            "Dear user,\n\nYour order has been confirmed.\n\nOrder Details:\n\
             Product ID: 1, Quantity: 2\nProduct ID: 7, Quantity: 1\n\
             \nThank you for your purchase!"
        );
    }

    #[tokio::test]
    async fn test_notify_sends_once_per_key() {
        let service = InMemoryNotificationService::new();
        let order = OrderPayload::new(1, "a@b.c", vec![CartItem::new(1, 2)]);
        let key = IdempotencyKey::new("s:send_notification");

        service.notify(&order, &key).await.unwrap();
        service.notify(&order, &key).await.unwrap();
        assert_eq!(service.outbox().len(), 1);
    }

    #[tokio::test]
    async fn test_fail_on_notify() {
        let service = InMemoryNotificationService::new();
        service.set_fail_on_notify(true);
        let order = OrderPayload::new(1, "a@b.c", vec![CartItem::new(1, 2)]);

        assert!(service.notify(&order, &IdempotencyKey::new("k")).await.is_err());
        assert!(service.outbox().is_empty());
    }
}

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the checkout and payment core.
///
/// Emission is fire-and-forget: a full or closed channel is logged and
/// never fails the operation that produced the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        customer_id: Uuid,
        total_amount: Decimal,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderCancelled(Uuid),
    CartItemAdded {
        cart_id: Uuid,
        product_id: Uuid,
    },
    CheckoutCompleted {
        customer_id: Uuid,
        order_id: Uuid,
    },
    PaymentCreated {
        payment_id: Uuid,
        order_id: Uuid,
        method: String,
    },
    PaymentSucceeded {
        payment_id: Uuid,
        order_id: Uuid,
        transaction_id: Option<String>,
    },
    PaymentFailed {
        payment_id: Uuid,
        order_id: Uuid,
    },
    PaymentRefunded(Uuid),
}

/// Notification rendered for the admin back-office sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminNotification {
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub reference_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, reporting failure as a string error. Callers on
    /// the checkout path log and continue; delivery is best-effort.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("failed to send event: {}", e))
    }
}

/// Creates a connected sender/receiver pair with a bounded buffer.
pub fn channel(buffer: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(buffer);
    (EventSender::new(tx), rx)
}

/// Consumes events and dispatches them to the admin notification sink.
/// Runs until the channel closes; spawn it on the host runtime.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated {
                order_id,
                total_amount,
                ..
            } => {
                let notification = AdminNotification {
                    title: "New order".to_string(),
                    message: format!(
                        "Order {} was just placed. Total: {}",
                        order_id, total_amount
                    ),
                    kind: "order".to_string(),
                    reference_id: *order_id,
                    created_at: Utc::now(),
                };
                deliver_notification(&notification);
            }
            Event::PaymentFailed {
                payment_id,
                order_id,
            } => {
                warn!(%payment_id, %order_id, "payment failed");
            }
            other => {
                info!(event = ?other, "event received");
            }
        }
    }

    info!("event channel closed, stopping event processing loop");
}

/// Hands a notification to the admin-facing sink. The sink is an
/// external collaborator; here delivery is a structured log record that
/// a forwarder tails. Failure to deliver must never propagate.
fn deliver_notification(notification: &AdminNotification) {
    let payload = json!(notification);
    info!(target: "grocermart::notifications", %payload, "admin notification");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn send_delivers_to_receiver() {
        let (sender, mut rx) = channel(8);
        let order_id = Uuid::new_v4();
        sender
            .send(Event::OrderCreated {
                order_id,
                customer_id: Uuid::new_v4(),
                total_amount: dec!(50000),
            })
            .await
            .expect("send should succeed");

        match rx.recv().await {
            Some(Event::OrderCreated {
                order_id: got,
                total_amount,
                ..
            }) => {
                assert_eq!(got, order_id);
                assert_eq!(total_amount, dec!(50000));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_on_closed_channel_reports_error() {
        let (sender, rx) = channel(1);
        drop(rx);
        let result = sender.send(Event::PaymentRefunded(Uuid::new_v4())).await;
        assert!(result.is_err());
    }
}

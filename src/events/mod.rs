use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::order::OrderStatus;

/// Events emitted by the checkout workflow. Consumed by the in-process
/// `process_events` loop; persistence and delivery guarantees are the
/// consumer's concern, not the emitter's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Cart events
    CartItemAdded {
        cart_id: Uuid,
        variant_id: Uuid,
    },
    CartItemUpdated {
        cart_id: Uuid,
        item_id: Uuid,
    },
    CartItemRemoved {
        cart_id: Uuid,
        item_id: Uuid,
    },
    CartCleared(Uuid),

    // Order events
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    OrderCancelled(Uuid),

    // Settlement events
    PaymentRecorded {
        order_id: Uuid,
        payment_id: Uuid,
    },
    StockDecremented {
        variant_id: Uuid,
        quantity: i32,
    },

    // PayPal events
    PayPalOrderCreated {
        paypal_order_id: String,
    },
    PayPalPaymentCaptured {
        order_id: Uuid,
        transaction_id: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, failing if the channel is closed or full.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Fire-and-forget send. Settlement must never fail because the event
    /// channel is down, so callers on the transaction path use this.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event.clone()).await {
            warn!(error = %e, ?event, "Failed to publish event");
        }
    }
}

/// Drains the event channel, logging each event. Runs for the lifetime of
/// the process; exits when every sender is dropped.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderCreated(order_id) => info!(%order_id, "order created"),
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => info!(%order_id, %old_status, %new_status, "order status changed"),
            Event::PaymentRecorded {
                order_id,
                payment_id,
            } => info!(%order_id, %payment_id, "payment recorded"),
            Event::PayPalPaymentCaptured {
                order_id,
                transaction_id,
            } => info!(%order_id, %transaction_id, "paypal payment captured"),
            other => info!(event = ?other, "event"),
        }
    }
    info!("event channel closed; event processor exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_or_log_swallows_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        // Must not panic or error out.
        sender.send_or_log(Event::CartCleared(Uuid::new_v4())).await;
    }

    #[tokio::test]
    async fn events_round_trip_through_channel() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        let order_id = Uuid::new_v4();
        sender.send(Event::OrderCreated(order_id)).await.unwrap();

        match rx.recv().await {
            Some(Event::OrderCreated(id)) => assert_eq!(id, order_id),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}

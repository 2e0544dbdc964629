use anyhow::anyhow;
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::errors::ServiceError;
use crate::models::order::OrderState;
use crate::repositories::OrderStore;
use crate::services::notification::{AcceptedNotification, PaymentStatus};

/// Attempts before giving up on an order whose state keeps changing underneath us.
const MAX_ATTEMPTS: usize = 3;

/// What the caller has to do after a notification was reconciled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// This delivery moved the order to paid; tell the chat session.
    NotifyUser(String),
    AlreadyReconciled,
    Canceled,
    NoChange,
}

/// Applies accepted notifications to order state, at most once per order
#[derive(Clone)]
pub struct Reconciler {
    orders: Arc<dyn OrderStore>,
}

impl Reconciler {
    pub fn new(orders: Arc<dyn OrderStore>) -> Self {
        Self { orders }
    }

    #[instrument(skip(self, accepted), fields(status = %accepted.status().as_str()))]
    pub async fn reconcile(
        &self,
        order_id: &str,
        accepted: &AcceptedNotification,
    ) -> Result<Effect, ServiceError> {
        if order_id != accepted.order_id() {
            return Err(ServiceError::MalformedPayload(format!(
                "notification for {} applied to order {}",
                accepted.order_id(),
                order_id
            )));
        }

        let target = match accepted.status() {
            PaymentStatus::Complete => OrderState::Paid,
            PaymentStatus::Cancelled => OrderState::Canceled,
            PaymentStatus::Other(status) => {
                debug!(%status, "Payment status needs no transition");
                return Ok(Effect::NoChange);
            }
        };

        for attempt in 1..=MAX_ATTEMPTS {
            let Some(order) = self.orders.get_order(order_id).await? else {
                warn!(order_id, "Accepted notification for unknown order");
                return Err(ServiceError::UnknownOrder(order_id.to_string()));
            };

            if order.state.is_terminal() {
                debug!(order_id, "Order already reconciled");
                return Ok(Effect::AlreadyReconciled);
            }
            if order.state == target {
                return Ok(Effect::NoChange);
            }

            if self.orders.set_state(order_id, order.state, target).await? {
                return Ok(match target {
                    OrderState::Paid => {
                        counter!("payments.orders.reconciled", 1);
                        info!(
                            order_id,
                            from = %order.state,
                            amount = %accepted.amount(),
                            gateway_payment_id = accepted.gateway_payment_id().unwrap_or("-"),
                            "Order paid"
                        );
                        Effect::NotifyUser(order.chat_session_id)
                    }
                    _ => {
                        counter!("payments.orders.canceled", 1);
                        info!(order_id, from = %order.state, "Order canceled by gateway");
                        Effect::Canceled
                    }
                });
            }

            debug!(order_id, attempt, "Order state changed concurrently, re-reading");
        }

        Err(ServiceError::Other(anyhow!(
            "order {} kept changing state during reconciliation",
            order_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::OrderRecord;
    use crate::repositories::InMemoryOrderStore;
    use crate::services::notification::PaymentNotification;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use mockall::mock;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    mock! {
        pub Store {}

        #[async_trait]
        impl OrderStore for Store {
            async fn get_order(&self, order_id: &str) -> Result<Option<OrderRecord>, ServiceError>;
            async fn create_order(&self, record: OrderRecord) -> Result<OrderRecord, ServiceError>;
            async fn set_state(
                &self,
                order_id: &str,
                expected: OrderState,
                new: OrderState,
            ) -> Result<bool, ServiceError>;
        }
    }

    fn order() -> OrderRecord {
        OrderRecord::awaiting_payment("ORD-42", "27820000000", dec!(100.00))
    }

    fn accepted(status: &str) -> AcceptedNotification {
        let body = format!(
            "m_payment_id=ORD-42&amount_gross=100.00&payment_status={}&signature=x",
            status
        );
        let notification = PaymentNotification::from_form(body.as_bytes()).unwrap();
        AcceptedNotification::for_tests(notification, order())
    }

    async fn store() -> Arc<InMemoryOrderStore> {
        let store = Arc::new(InMemoryOrderStore::new());
        store.create_order(order()).await.unwrap();
        store
    }

    #[tokio::test]
    async fn complete_moves_order_to_paid_once() {
        let store = store().await;
        let reconciler = Reconciler::new(store.clone());
        let accepted = accepted("COMPLETE");

        assert_eq!(
            reconciler.reconcile("ORD-42", &accepted).await.unwrap(),
            Effect::NotifyUser("27820000000".to_string())
        );
        assert_eq!(
            reconciler.reconcile("ORD-42", &accepted).await.unwrap(),
            Effect::AlreadyReconciled
        );
        assert_eq!(
            store.get_order("ORD-42").await.unwrap().unwrap().state,
            OrderState::Paid
        );
    }

    #[tokio::test]
    async fn concurrent_deliveries_notify_exactly_once() {
        let store = store().await;
        let reconciler = Reconciler::new(store.clone());
        let accepted = accepted("COMPLETE");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reconciler = reconciler.clone();
                let accepted = accepted.clone();
                tokio::spawn(async move { reconciler.reconcile("ORD-42", &accepted).await })
            })
            .collect();

        let mut notified = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                Effect::NotifyUser(_) => notified += 1,
                Effect::AlreadyReconciled => {}
                other => panic!("unexpected effect {:?}", other),
            }
        }
        assert_eq!(notified, 1);
    }

    #[tokio::test]
    async fn cancelled_moves_unpaid_order_to_canceled() {
        let store = store().await;
        let reconciler = Reconciler::new(store.clone());

        assert_eq!(
            reconciler
                .reconcile("ORD-42", &accepted("CANCELLED"))
                .await
                .unwrap(),
            Effect::Canceled
        );
        assert_eq!(
            store.get_order("ORD-42").await.unwrap().unwrap().state,
            OrderState::Canceled
        );
    }

    #[tokio::test]
    async fn cancelled_never_overrides_paid() {
        let store = store().await;
        let reconciler = Reconciler::new(store.clone());
        reconciler
            .reconcile("ORD-42", &accepted("COMPLETE"))
            .await
            .unwrap();

        assert_eq!(
            reconciler
                .reconcile("ORD-42", &accepted("CANCELLED"))
                .await
                .unwrap(),
            Effect::AlreadyReconciled
        );
    }

    #[tokio::test]
    async fn other_statuses_change_nothing() {
        let store = store().await;
        let reconciler = Reconciler::new(store.clone());

        assert_eq!(
            reconciler
                .reconcile("ORD-42", &accepted("PENDING"))
                .await
                .unwrap(),
            Effect::NoChange
        );
        assert_eq!(
            store.get_order("ORD-42").await.unwrap().unwrap().state,
            OrderState::AwaitingPayment
        );
    }

    #[tokio::test]
    async fn missing_record_is_unknown_order() {
        let reconciler = Reconciler::new(Arc::new(InMemoryOrderStore::new()));
        assert_matches!(
            reconciler.reconcile("ORD-42", &accepted("COMPLETE")).await,
            Err(ServiceError::UnknownOrder(id)) if id == "ORD-42"
        );
    }

    #[tokio::test]
    async fn lost_race_rereads_and_reports_already_reconciled() {
        let reads = Arc::new(AtomicUsize::new(0));
        let mut store = MockStore::new();
        let counter = reads.clone();
        store.expect_get_order().times(2).returning(move |_| {
            let mut record = order();
            if counter.fetch_add(1, Ordering::SeqCst) > 0 {
                record.state = OrderState::Paid;
            }
            Ok(Some(record))
        });
        store
            .expect_set_state()
            .times(1)
            .returning(|_, _, _| Ok(false));

        let reconciler = Reconciler::new(Arc::new(store));
        assert_eq!(
            reconciler
                .reconcile("ORD-42", &accepted("COMPLETE"))
                .await
                .unwrap(),
            Effect::AlreadyReconciled
        );
        assert_eq!(reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn persistent_contention_gives_up() {
        let mut store = MockStore::new();
        store
            .expect_get_order()
            .times(MAX_ATTEMPTS)
            .returning(|_| Ok(Some(order())));
        store
            .expect_set_state()
            .times(MAX_ATTEMPTS)
            .returning(|_, _, _| Ok(false));

        let reconciler = Reconciler::new(Arc::new(store));
        assert_matches!(
            reconciler.reconcile("ORD-42", &accepted("COMPLETE")).await,
            Err(ServiceError::Other(_))
        );
    }
}

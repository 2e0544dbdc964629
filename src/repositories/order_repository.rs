use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::entities::chat_order::{
    ActiveModel as ChatOrderActiveModel, Column, Entity as ChatOrder, Model as ChatOrderModel,
};
use crate::errors::ServiceError;
use crate::models::order::{OrderRecord, OrderState};

/// Correlation state for orders handed to the gateway
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get_order(&self, order_id: &str) -> Result<Option<OrderRecord>, ServiceError>;

    /// Puts an order on file unless one with the same id already exists; returns what is stored.
    async fn create_order(&self, record: OrderRecord) -> Result<OrderRecord, ServiceError>;

    /// Moves `order_id` from `expected` to `new` atomically.
    ///
    /// Returns `false` when the order is missing or no longer in `expected`.
    async fn set_state(
        &self,
        order_id: &str,
        expected: OrderState,
        new: OrderState,
    ) -> Result<bool, ServiceError>;
}

impl TryFrom<ChatOrderModel> for OrderRecord {
    type Error = ServiceError;

    fn try_from(model: ChatOrderModel) -> Result<Self, Self::Error> {
        let state = model
            .state
            .parse::<OrderState>()
            .map_err(|e| ServiceError::DatabaseError(DbErr::Custom(e)))?;

        Ok(OrderRecord {
            order_id: model.order_id,
            chat_session_id: model.chat_session_id,
            amount: model.amount,
            state,
            created_at: model.created_at,
        })
    }
}

/// Order store backed by the `chat_orders` table
#[derive(Debug, Clone)]
pub struct OrderRepository {
    db: Arc<DatabaseConnection>,
}

impl OrderRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OrderStore for OrderRepository {
    async fn get_order(&self, order_id: &str) -> Result<Option<OrderRecord>, ServiceError> {
        ChatOrder::find_by_id(order_id.to_string())
            .one(&*self.db)
            .await?
            .map(OrderRecord::try_from)
            .transpose()
    }

    #[instrument(skip(self, record), fields(order_id = %record.order_id))]
    async fn create_order(&self, record: OrderRecord) -> Result<OrderRecord, ServiceError> {
        let model = ChatOrderActiveModel {
            order_id: Set(record.order_id.clone()),
            chat_session_id: Set(record.chat_session_id.clone()),
            amount: Set(record.amount),
            state: Set(record.state.as_str().to_string()),
            created_at: Set(record.created_at),
            updated_at: Set(None),
        };

        let inserted = ChatOrder::insert(model)
            .on_conflict(OnConflict::column(Column::OrderId).do_nothing().to_owned())
            .exec_without_returning(&*self.db)
            .await?;
        debug!(inserted, "Order put on file");

        self.get_order(&record.order_id).await?.ok_or_else(|| {
            ServiceError::DatabaseError(DbErr::RecordNotFound(record.order_id.clone()))
        })
    }

    #[instrument(skip(self))]
    async fn set_state(
        &self,
        order_id: &str,
        expected: OrderState,
        new: OrderState,
    ) -> Result<bool, ServiceError> {
        // Compare-and-set: the WHERE clause on the current state makes the update the lock
        let result = ChatOrder::update_many()
            .col_expr(Column::State, Expr::value(new.as_str()))
            .col_expr(Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(Column::OrderId.eq(order_id))
            .filter(Column::State.eq(expected.as_str()))
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected == 1)
    }
}

/// Process-local order store used by tests and single-instance development runs
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderStore(Arc<DashMap<String, OrderRecord>>);

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn get_order(&self, order_id: &str) -> Result<Option<OrderRecord>, ServiceError> {
        Ok(self.0.get(order_id).map(|r| r.clone()))
    }

    async fn create_order(&self, record: OrderRecord) -> Result<OrderRecord, ServiceError> {
        let entry = self
            .0
            .entry(record.order_id.clone())
            .or_insert(record);
        Ok(entry.clone())
    }

    async fn set_state(
        &self,
        order_id: &str,
        expected: OrderState,
        new: OrderState,
    ) -> Result<bool, ServiceError> {
        // The shard write lock is held for the whole check-and-write
        match self.0.get_mut(order_id) {
            Some(mut record) if record.state == expected => {
                record.state = new;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn in_memory_compare_and_set_applies_once() {
        let store = InMemoryOrderStore::new();
        store
            .create_order(OrderRecord::awaiting_payment("ORD-1", "2782", dec!(10.00)))
            .await
            .unwrap();

        assert!(store
            .set_state("ORD-1", OrderState::AwaitingPayment, OrderState::Paid)
            .await
            .unwrap());
        assert!(!store
            .set_state("ORD-1", OrderState::AwaitingPayment, OrderState::Paid)
            .await
            .unwrap());
        assert!(!store
            .set_state("ORD-404", OrderState::AwaitingPayment, OrderState::Paid)
            .await
            .unwrap());

        let stored = store.get_order("ORD-1").await.unwrap().unwrap();
        assert_eq!(stored.state, OrderState::Paid);
    }

    #[tokio::test]
    async fn in_memory_create_keeps_first_record() {
        let store = InMemoryOrderStore::new();
        let first = OrderRecord::awaiting_payment("ORD-1", "2782", dec!(10.00));
        store.create_order(first.clone()).await.unwrap();
        let again = store
            .create_order(OrderRecord::awaiting_payment("ORD-1", "other", dec!(99.00)))
            .await
            .unwrap();
        assert_eq!(again, first);
    }
}

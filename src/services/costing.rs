use crate::{
    db::DbPool,
    entities::inventory_lot::{self, Entity as InventoryLot},
    errors::ServiceError,
    services::settings::{PricingMethod, SettingsService},
};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// A quoted consumer/store price pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPrice {
    pub consumer: Decimal,
    pub store: Decimal,
}

impl ProductPrice {
    /// The "no stock" quote. Absence of candidate lots is a normal
    /// zero-price case, not an error.
    pub fn zero() -> Self {
        Self {
            consumer: Decimal::ZERO,
            store: Decimal::ZERO,
        }
    }
}

/// Quotes a product's current unit price from its lots under one of the
/// four costing policies. Read-only; quotes are advisory snapshots.
#[derive(Clone)]
pub struct CostingService {
    db_pool: Arc<DbPool>,
    settings: SettingsService,
}

impl CostingService {
    pub fn new(db_pool: Arc<DbPool>, settings: SettingsService) -> Self {
        Self { db_pool, settings }
    }

    /// Quotes under the policy configured in settings.
    #[instrument(skip(self))]
    pub async fn product_price(&self, product_id: Uuid) -> Result<ProductPrice, ServiceError> {
        let method = self.settings.pricing_method().await?;
        self.product_price_by(product_id, method).await
    }

    /// Quotes under an explicit policy.
    #[instrument(skip(self))]
    pub async fn product_price_by(
        &self,
        product_id: Uuid,
        method: PricingMethod,
    ) -> Result<ProductPrice, ServiceError> {
        match method {
            PricingMethod::Fifo => self.price_by_fifo(product_id).await,
            PricingMethod::Lifo => self.price_by_lifo(product_id).await,
            PricingMethod::Max => self.price_by_max(product_id).await,
            PricingMethod::WeightedAverage => self.price_by_weighted_average(product_id).await,
        }
    }

    /// Oldest in-stock lot wins.
    async fn price_by_fifo(&self, product_id: Uuid) -> Result<ProductPrice, ServiceError> {
        let db = &*self.db_pool;

        let lot = InventoryLot::find()
            .filter(inventory_lot::Column::ProductId.eq(product_id))
            .filter(inventory_lot::Column::Quantity.gt(0))
            .order_by_asc(inventory_lot::Column::TransactedAt)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(Self::quote_from(lot))
    }

    /// Newest in-stock lot wins.
    async fn price_by_lifo(&self, product_id: Uuid) -> Result<ProductPrice, ServiceError> {
        let db = &*self.db_pool;

        let lot = InventoryLot::find()
            .filter(inventory_lot::Column::ProductId.eq(product_id))
            .filter(inventory_lot::Column::Quantity.gt(0))
            .order_by_desc(inventory_lot::Column::TransactedAt)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(Self::quote_from(lot))
    }

    /// Highest purchase price among in-stock lots wins.
    async fn price_by_max(&self, product_id: Uuid) -> Result<ProductPrice, ServiceError> {
        let db = &*self.db_pool;

        let lot = InventoryLot::find()
            .filter(inventory_lot::Column::ProductId.eq(product_id))
            .filter(inventory_lot::Column::Quantity.gt(0))
            .order_by_desc(inventory_lot::Column::PurchasePrice)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(Self::quote_from(lot))
    }

    /// Quantity-weighted mean of consumer prices over ALL lots of the
    /// product, rounded up; zero-quantity lots are included (they weigh
    /// nothing but the filter is deliberately absent).
    async fn price_by_weighted_average(
        &self,
        product_id: Uuid,
    ) -> Result<ProductPrice, ServiceError> {
        let db = &*self.db_pool;

        let lots = InventoryLot::find()
            .filter(inventory_lot::Column::ProductId.eq(product_id))
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let weights: Vec<(i32, Decimal)> = lots
            .iter()
            .map(|lot| (lot.quantity, lot.consumer_price))
            .collect();

        Ok(weighted_average_price(&weights))
    }

    fn quote_from(lot: Option<inventory_lot::Model>) -> ProductPrice {
        match lot {
            Some(lot) => ProductPrice {
                consumer: lot.consumer_price,
                store: lot.store_price,
            },
            None => ProductPrice::zero(),
        }
    }
}

/// `ceil(Σ(count × consumer) / Σ count)`, applied to both consumer and
/// store; a zero total count quotes zero.
pub(crate) fn weighted_average_price(weights: &[(i32, Decimal)]) -> ProductPrice {
    let total_count: i64 = weights.iter().map(|(count, _)| *count as i64).sum();

    if total_count == 0 {
        return ProductPrice::zero();
    }

    let total_price: Decimal = weights
        .iter()
        .map(|(count, price)| Decimal::from(*count) * *price)
        .sum();

    let price = (total_price / Decimal::from(total_count)).ceil();

    ProductPrice {
        consumer: price,
        store: price,
    }
}

use crate::{
    db::DbPool,
    entities::{
        commodity_profit::SaleKind,
        inventory_lot::{self, Entity as InventoryLot},
        warehouse::{self, Entity as Warehouse},
    },
    errors::ServiceError,
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseStock {
    pub warehouse_id: Uuid,
    pub quantity: i64,
}

/// On-hand totals for one product, overall and per warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSummary {
    pub product_id: Uuid,
    pub total: i64,
    pub warehouses: Vec<WarehouseStock>,
}

impl StockSummary {
    pub fn warehouse_quantity(&self, warehouse_id: Uuid) -> i64 {
        self.warehouses
            .iter()
            .find(|w| w.warehouse_id == warehouse_id)
            .map(|w| w.quantity)
            .unwrap_or(0)
    }
}

/// Availability sums over a product's lots, optionally restricted to the
/// warehouses enabled for a sale channel.
#[derive(Clone)]
pub struct StockLevelService {
    db_pool: Arc<DbPool>,
}

impl StockLevelService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self))]
    pub async fn product_stock(
        &self,
        product_id: Uuid,
        sale_kind: Option<SaleKind>,
    ) -> Result<StockSummary, ServiceError> {
        let db = &*self.db_pool;

        // Channel scoping first: a retail sale only sees retail warehouses.
        let allowed: Option<HashSet<Uuid>> = match sale_kind {
            Some(kind) => {
                let channel_column = match kind {
                    SaleKind::Retail => warehouse::Column::Retail,
                    SaleKind::OnlineSales => warehouse::Column::OnlineSales,
                };
                let warehouses = Warehouse::find()
                    .filter(channel_column.eq(true))
                    .all(db)
                    .await
                    .map_err(ServiceError::DatabaseError)?;
                Some(warehouses.into_iter().map(|w| w.id).collect())
            }
            None => None,
        };

        let lots = InventoryLot::find()
            .filter(inventory_lot::Column::ProductId.eq(product_id))
            .filter(inventory_lot::Column::Quantity.gt(0))
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let mut by_warehouse: BTreeMap<Uuid, i64> = BTreeMap::new();
        for lot in &lots {
            if let Some(allowed) = &allowed {
                if !allowed.contains(&lot.warehouse_id) {
                    continue;
                }
            }
            *by_warehouse.entry(lot.warehouse_id).or_insert(0) += lot.quantity as i64;
        }

        let total = by_warehouse.values().sum();
        let warehouses = by_warehouse
            .into_iter()
            .map(|(warehouse_id, quantity)| WarehouseStock {
                warehouse_id,
                quantity,
            })
            .collect();

        Ok(StockSummary {
            product_id,
            total,
            warehouses,
        })
    }

    /// Total units available, within one warehouse when scoped.
    #[instrument(skip(self))]
    pub async fn available_quantity(
        &self,
        product_id: Uuid,
        sale_kind: Option<SaleKind>,
        warehouse_id: Option<Uuid>,
    ) -> Result<i64, ServiceError> {
        let summary = self.product_stock(product_id, sale_kind).await?;
        Ok(match warehouse_id {
            Some(id) => summary.warehouse_quantity(id),
            None => summary.total,
        })
    }
}

use crate::{
    db::DatabaseAccess,
    entities::commodity_profit::{self, Entity as CommodityProfit, SaleKind},
    errors::ServiceError,
    services::{
        allocation::{AllocationService, SaleAllocation},
        costing::ProductPrice,
        rollback::RollbackService,
        stock_levels::StockLevelService,
    },
};
use async_trait::async_trait;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// One product line of a sales invoice.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SalesLine {
    pub product_id: Uuid,
    /// Sell out of this warehouse only; `None` draws product-wide.
    pub warehouse_id: Option<Uuid>,
    #[validate(range(min = 1))]
    pub quantity: i32,
    /// The price the line sold at, recorded on profit rows.
    pub price: ProductPrice,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SalesInvoiceDoc {
    pub id: Uuid,
    #[validate]
    pub lines: Vec<SalesLine>,
    pub created_by: Uuid,
}

/// The ledger entry recorded for one sales line, to be written back onto
/// the document by the caller.
#[derive(Debug, Clone)]
pub struct SalesLineAllocation {
    pub product_id: Uuid,
    pub ledger_entry_id: Uuid,
    pub profits: Vec<commodity_profit::Model>,
}

/// External lookup of sales documents.
#[async_trait]
pub trait SalesDocumentProvider: Send + Sync {
    async fn sales_invoice(&self, id: Uuid) -> Result<SalesInvoiceDoc, ServiceError>;
}

/// Drives consuming allocations for sales documents and reverses them when
/// a document is edited or cancelled.
#[derive(Clone)]
pub struct SalesSyncService {
    db: DatabaseAccess,
    provider: Arc<dyn SalesDocumentProvider>,
    stock_levels: StockLevelService,
    allocation: AllocationService,
    rollback: RollbackService,
}

impl SalesSyncService {
    pub fn new(
        db: DatabaseAccess,
        provider: Arc<dyn SalesDocumentProvider>,
        stock_levels: StockLevelService,
        allocation: AllocationService,
        rollback: RollbackService,
    ) -> Self {
        Self {
            db,
            provider,
            stock_levels,
            allocation,
            rollback,
        }
    }

    /// Allocates stock for every line of the invoice, insufficiency-checked
    /// per line before the allocator runs. Returns one ledger entry id per
    /// line for the caller to store on the document.
    #[instrument(skip(self))]
    pub async fn apply_created(
        &self,
        invoice_id: Uuid,
        sale_kind: SaleKind,
    ) -> Result<Vec<SalesLineAllocation>, ServiceError> {
        let doc = self.provider.sales_invoice(invoice_id).await?;
        doc.validate()
            .map_err(|e| ServiceError::ValidationError(format!("Invalid sales invoice: {}", e)))?;

        let mut allocations = Vec::with_capacity(doc.lines.len());

        for line in &doc.lines {
            // Advisory pre-check with channel scoping; the allocator
            // re-checks inside its serialized section.
            let summary = self
                .stock_levels
                .product_stock(line.product_id, Some(sale_kind))
                .await?;
            if (line.quantity as i64) > summary.total {
                return Err(ServiceError::InsufficientStock {
                    product_id: line.product_id,
                    requested: line.quantity,
                    available: summary.total.try_into().unwrap_or(i32::MAX),
                });
            }
            if let Some(warehouse_id) = line.warehouse_id {
                let in_warehouse = summary.warehouse_quantity(warehouse_id);
                if (line.quantity as i64) > in_warehouse {
                    return Err(ServiceError::InsufficientStock {
                        product_id: line.product_id,
                        requested: line.quantity,
                        available: in_warehouse.try_into().unwrap_or(i32::MAX),
                    });
                }
            }

            let outcome = self
                .allocation
                .allocate_sale(SaleAllocation {
                    product_id: line.product_id,
                    warehouse_id: line.warehouse_id,
                    quantity: line.quantity,
                    sale_price: line.price,
                    sale_kind,
                    reference_id: doc.id,
                    created_by: doc.created_by,
                })
                .await?;

            allocations.push(SalesLineAllocation {
                product_id: line.product_id,
                ledger_entry_id: outcome.ledger_entry_id,
                profits: outcome.profits,
            });
        }

        info!(
            invoice_id = %invoice_id,
            lines_allocated = %allocations.len(),
            "Sales invoice allocated"
        );

        Ok(allocations)
    }

    /// Undoes one line's allocation via its stored ledger entry.
    #[instrument(skip(self))]
    pub async fn apply_reversed(&self, ledger_entry_id: Uuid) -> Result<(), ServiceError> {
        self.rollback.rollback(ledger_entry_id).await
    }

    /// Deletes the profit rows recorded for a sales document. Called
    /// before re-allocating an edited document so margins are not counted
    /// twice; rollback itself never touches profit rows (the ledger does
    /// not describe them).
    #[instrument(skip(self))]
    pub async fn remove_profit_entries(&self, reference_id: Uuid) -> Result<u64, ServiceError> {
        let result = CommodityProfit::delete_many()
            .filter(commodity_profit::Column::ReferenceId.eq(reference_id))
            .exec(self.db.get_pool())
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(result.rows_affected)
    }
}

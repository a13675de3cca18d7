use crate::{
    errors::ServiceError,
    services::{
        allocation::{AllocationService, TransferAllocation, TransferAllocationOutcome},
        rollback::RollbackService,
        stock_levels::StockLevelService,
    },
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// A stock transfer document as seen by the lot engine.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StockTransferDoc {
    pub id: Uuid,
    pub source_warehouse_id: Uuid,
    pub destination_warehouse_id: Uuid,
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub created_by: Uuid,
}

/// External lookup of stock-transfer documents.
#[async_trait]
pub trait StockTransferProvider: Send + Sync {
    async fn stock_transfer(&self, id: Uuid) -> Result<StockTransferDoc, ServiceError>;
}

/// Executes stock transfers against the lot set and reverses them when the
/// transfer document is cancelled.
#[derive(Clone)]
pub struct TransferSyncService {
    provider: Arc<dyn StockTransferProvider>,
    stock_levels: StockLevelService,
    allocation: AllocationService,
    rollback: RollbackService,
}

impl TransferSyncService {
    pub fn new(
        provider: Arc<dyn StockTransferProvider>,
        stock_levels: StockLevelService,
        allocation: AllocationService,
        rollback: RollbackService,
    ) -> Self {
        Self {
            provider,
            stock_levels,
            allocation,
            rollback,
        }
    }

    /// Runs the transferring allocation for the document, pre-validating
    /// source-warehouse availability. Returns the ledger entry id for the
    /// caller to store on the transfer document.
    #[instrument(skip(self))]
    pub async fn execute(&self, transfer_id: Uuid) -> Result<TransferAllocationOutcome, ServiceError> {
        let doc = self.provider.stock_transfer(transfer_id).await?;
        doc.validate()
            .map_err(|e| ServiceError::ValidationError(format!("Invalid stock transfer: {}", e)))?;

        let available = self
            .stock_levels
            .available_quantity(doc.product_id, None, Some(doc.source_warehouse_id))
            .await?;
        if (doc.quantity as i64) > available {
            return Err(ServiceError::InsufficientStock {
                product_id: doc.product_id,
                requested: doc.quantity,
                available: available.try_into().unwrap_or(i32::MAX),
            });
        }

        let outcome = self
            .allocation
            .allocate_transfer(TransferAllocation {
                product_id: doc.product_id,
                source_warehouse_id: doc.source_warehouse_id,
                destination_warehouse_id: doc.destination_warehouse_id,
                quantity: doc.quantity,
                reference_id: doc.id,
                created_by: doc.created_by,
            })
            .await?;

        info!(
            transfer_id = %transfer_id,
            transferred = %outcome.transferred,
            ledger_entry_id = %outcome.ledger_entry_id,
            "Stock transfer executed"
        );

        Ok(outcome)
    }

    /// Undoes a previously executed transfer via its stored ledger entry.
    #[instrument(skip(self))]
    pub async fn apply_reversed(&self, ledger_entry_id: Uuid) -> Result<(), ServiceError> {
        self.rollback.rollback(ledger_entry_id).await
    }
}

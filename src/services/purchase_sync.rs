use crate::{
    db::DatabaseAccess,
    entities::inventory_lot::{self, Entity as InventoryLot, LotStatus},
    errors::ServiceError,
    events::{Event, EventSender},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Purchase/consumer/store price triple carried on an invoice line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotPrice {
    pub purchase: Decimal,
    pub consumer: Decimal,
    pub store: Decimal,
}

impl LotPrice {
    fn validate_non_negative(&self) -> Result<(), ServiceError> {
        if self.purchase.is_sign_negative()
            || self.consumer.is_sign_negative()
            || self.store.is_sign_negative()
        {
            return Err(ServiceError::ValidationError(
                "Lot prices must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// One product line of a purchase invoice.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PurchaseLine {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub price: LotPrice,
}

/// A completed purchase invoice as seen by the lot engine.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PurchaseInvoiceDoc {
    pub id: Uuid,
    pub warehouse_id: Uuid,
    pub transacted_at: DateTime<Utc>,
    #[validate]
    pub lines: Vec<PurchaseLine>,
    pub created_by: Uuid,
}

/// The line state before and after an invoice edit; the lot deltas are
/// computed against `previous_lines`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PurchaseInvoiceUpdate {
    pub invoice_id: Uuid,
    pub warehouse_id: Uuid,
    pub transacted_at: DateTime<Utc>,
    pub previous_lines: Vec<PurchaseLine>,
    #[validate]
    pub lines: Vec<PurchaseLine>,
    pub created_by: Uuid,
}

/// Counts of what a reconciliation run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub updated: usize,
    pub deleted: usize,
    pub created: usize,
}

/// External lookup of purchase documents; the document store itself lives
/// outside this crate.
#[async_trait]
pub trait PurchaseDocumentProvider: Send + Sync {
    async fn purchase_invoice(&self, id: Uuid) -> Result<PurchaseInvoiceDoc, ServiceError>;
}

/// Reconciles inventory lots with purchase-invoice lifecycle events:
/// completion inserts lots, edits adjust or delete them, deletion removes
/// them wholesale.
#[derive(Clone)]
pub struct PurchaseSyncService {
    db: DatabaseAccess,
    provider: Arc<dyn PurchaseDocumentProvider>,
    event_sender: EventSender,
}

impl PurchaseSyncService {
    pub fn new(
        db: DatabaseAccess,
        provider: Arc<dyn PurchaseDocumentProvider>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            provider,
            event_sender,
        }
    }

    /// Fetches the invoice and inserts its lots.
    #[instrument(skip(self))]
    pub async fn apply_created(
        &self,
        invoice_id: Uuid,
    ) -> Result<Vec<inventory_lot::Model>, ServiceError> {
        let doc = self.provider.purchase_invoice(invoice_id).await?;
        self.apply_invoice(doc).await
    }

    /// Inserts one new lot per invoice line. Always inserts, never merges
    /// with an existing lot, so each purchase event stays independently
    /// traceable for FIFO/LIFO.
    #[instrument(skip(self, doc), fields(invoice_id = %doc.id))]
    pub async fn apply_invoice(
        &self,
        doc: PurchaseInvoiceDoc,
    ) -> Result<Vec<inventory_lot::Model>, ServiceError> {
        doc.validate()
            .map_err(|e| ServiceError::ValidationError(format!("Invalid purchase invoice: {}", e)))?;
        for line in &doc.lines {
            line.price.validate_non_negative()?;
        }

        let doc_for_txn = doc.clone();

        let lots = self
            .db
            .transaction::<_, Vec<inventory_lot::Model>, ServiceError>(move |txn| {
                Box::pin(async move {
                    let mut lots = Vec::with_capacity(doc_for_txn.lines.len());
                    for line in &doc_for_txn.lines {
                        lots.push(
                            insert_lot(
                                txn,
                                &doc_for_txn,
                                line,
                                doc_for_txn.transacted_at,
                            )
                            .await?,
                        );
                    }
                    Ok(lots)
                })
            })
            .await?;

        info!(
            invoice_id = %doc.id,
            lots_created = %lots.len(),
            "Purchase invoice applied"
        );

        for lot in &lots {
            if let Err(e) = self
                .event_sender
                .send(Event::LotReceived {
                    lot_id: lot.id,
                    product_id: lot.product_id,
                    warehouse_id: lot.warehouse_id,
                    quantity: lot.quantity,
                })
                .await
            {
                warn!("Failed to publish lot-received event: {}", e);
            }
        }
        if let Err(e) = self
            .event_sender
            .send(Event::PurchaseInvoiceApplied {
                invoice_id: doc.id,
                lots_created: lots.len(),
            })
            .await
        {
            warn!("Failed to publish purchase-invoice event: {}", e);
        }

        Ok(lots)
    }

    /// Reconciles lots after an invoice edit: surviving lines update their
    /// lot in place (price, warehouse, timestamp, and the count moved by
    /// the line delta), removed lines delete their lot outright, and new
    /// lines insert fresh lots.
    #[instrument(skip(self, update), fields(invoice_id = %update.invoice_id))]
    pub async fn apply_updated(
        &self,
        update: PurchaseInvoiceUpdate,
    ) -> Result<ReconcileSummary, ServiceError> {
        update.validate().map_err(|e| {
            ServiceError::ValidationError(format!("Invalid purchase invoice update: {}", e))
        })?;
        for line in &update.lines {
            line.price.validate_non_negative()?;
        }

        let update_for_txn = update.clone();

        let summary = self
            .db
            .transaction::<_, ReconcileSummary, ServiceError>(move |txn| {
                Box::pin(async move {
                    let update = update_for_txn;
                    let mut summary = ReconcileSummary::default();

                    let lots = InventoryLot::find()
                        .filter(
                            inventory_lot::Column::PurchaseInvoiceId.eq(update.invoice_id),
                        )
                        .all(txn)
                        .await
                        .map_err(ServiceError::DatabaseError)?;

                    let mut pending_lines = update.lines.clone();

                    for lot in lots {
                        let position = pending_lines
                            .iter()
                            .position(|line| line.product_id == lot.product_id);

                        match position {
                            Some(idx) => {
                                let line = pending_lines.remove(idx);
                                let previous_quantity = update
                                    .previous_lines
                                    .iter()
                                    .find(|prev| prev.product_id == lot.product_id)
                                    .map(|prev| prev.quantity)
                                    .unwrap_or(0);

                                // Move the lot's count by the line delta so
                                // units already allocated stay accounted for.
                                let quantity = lot.quantity - previous_quantity + line.quantity;
                                if quantity < 0 {
                                    return Err(ServiceError::InvalidOperation(format!(
                                        "Invoice update would drive lot {} of product {} to {} units",
                                        lot.id, lot.product_id, quantity
                                    )));
                                }

                                let mut active: inventory_lot::ActiveModel = lot.into();
                                active.quantity = Set(quantity);
                                active.purchase_price = Set(line.price.purchase);
                                active.consumer_price = Set(line.price.consumer);
                                active.store_price = Set(line.price.store);
                                active.warehouse_id = Set(update.warehouse_id);
                                active.transacted_at = Set(update.transacted_at);
                                active.updated_at = Set(Utc::now());
                                active
                                    .update(txn)
                                    .await
                                    .map_err(ServiceError::DatabaseError)?;
                                summary.updated += 1;
                            }
                            None => {
                                // The product line was removed from the
                                // invoice; its lot goes with it.
                                let lot_id = lot.id;
                                let result = InventoryLot::delete_by_id(lot_id)
                                    .exec(txn)
                                    .await
                                    .map_err(ServiceError::DatabaseError)?;
                                if result.rows_affected == 0 {
                                    return Err(ServiceError::Inconsistency(format!(
                                        "Lot {} vanished during invoice reconciliation",
                                        lot_id
                                    )));
                                }
                                summary.deleted += 1;
                            }
                        }
                    }

                    // Brand-new lines get fresh lots.
                    let doc = PurchaseInvoiceDoc {
                        id: update.invoice_id,
                        warehouse_id: update.warehouse_id,
                        transacted_at: update.transacted_at,
                        lines: Vec::new(),
                        created_by: update.created_by,
                    };
                    for line in &pending_lines {
                        insert_lot(txn, &doc, line, update.transacted_at).await?;
                        summary.created += 1;
                    }

                    Ok(summary)
                })
            })
            .await?;

        info!(
            invoice_id = %update.invoice_id,
            updated = %summary.updated,
            deleted = %summary.deleted,
            created = %summary.created,
            "Purchase invoice reconciled"
        );

        if let Err(e) = self
            .event_sender
            .send(Event::PurchaseInvoiceReconciled {
                invoice_id: update.invoice_id,
                lots_updated: summary.updated,
                lots_deleted: summary.deleted,
                lots_created: summary.created,
            })
            .await
        {
            warn!("Failed to publish reconciliation event: {}", e);
        }

        Ok(summary)
    }

    /// Deletes every lot the invoice brought into stock. Finding nothing
    /// to delete is an inconsistency, not a success.
    #[instrument(skip(self))]
    pub async fn apply_deleted(&self, invoice_id: Uuid) -> Result<u64, ServiceError> {
        let result = InventoryLot::delete_many()
            .filter(inventory_lot::Column::PurchaseInvoiceId.eq(invoice_id))
            .exec(self.db.get_pool())
            .await
            .map_err(ServiceError::DatabaseError)?;

        if result.rows_affected == 0 {
            return Err(ServiceError::Inconsistency(format!(
                "No lots found for deleted purchase invoice {}",
                invoice_id
            )));
        }

        info!(
            invoice_id = %invoice_id,
            lots_deleted = %result.rows_affected,
            "Purchase invoice lots removed"
        );

        if let Err(e) = self
            .event_sender
            .send(Event::PurchaseInvoiceLotsRemoved {
                invoice_id,
                lots_deleted: result.rows_affected,
            })
            .await
        {
            warn!("Failed to publish lot-removal event: {}", e);
        }

        Ok(result.rows_affected)
    }
}

async fn insert_lot(
    txn: &DatabaseTransaction,
    doc: &PurchaseInvoiceDoc,
    line: &PurchaseLine,
    transacted_at: DateTime<Utc>,
) -> Result<inventory_lot::Model, ServiceError> {
    let lot = inventory_lot::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(line.product_id),
        warehouse_id: Set(doc.warehouse_id),
        purchase_invoice_id: Set(doc.id),
        quantity: Set(line.quantity),
        purchase_price: Set(line.price.purchase),
        consumer_price: Set(line.price.consumer),
        store_price: Set(line.price.store),
        transacted_at: Set(transacted_at),
        status: Set(LotStatus::Active.as_str().to_string()),
        created_by: Set(doc.created_by),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
    };

    lot.insert(txn).await.map_err(ServiceError::DatabaseError)
}

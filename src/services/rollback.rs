use crate::{
    db::DatabaseAccess,
    entities::{
        inventory_change::{Entity as InventoryChange, LotChange},
        inventory_lot::{self, Entity as InventoryLot},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::allocation::ProductLocks,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Replays a recorded change-ledger entry in reverse to restore the lot
/// state an allocation run mutated.
#[derive(Clone)]
pub struct RollbackService {
    db: DatabaseAccess,
    event_sender: EventSender,
    locks: ProductLocks,
}

impl RollbackService {
    pub fn new(db: DatabaseAccess, event_sender: EventSender, locks: ProductLocks) -> Self {
        Self {
            db,
            event_sender,
            locks,
        }
    }

    /// Undoes the allocation run that produced `ledger_entry_id`.
    ///
    /// Records replay in reverse stored order inside one transaction:
    /// count records reverse as algebraic deltas (`quantity - new + old`,
    /// exact even if the count moved in between), warehouse records
    /// restore the old value, and inserted lots are deleted. Runs under
    /// the product's allocation lock.
    #[instrument(skip(self))]
    pub async fn rollback(&self, ledger_entry_id: Uuid) -> Result<(), ServiceError> {
        let entry = InventoryChange::find_by_id(ledger_entry_id)
            .one(self.db.get_pool())
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Change ledger entry {} not found",
                    ledger_entry_id
                ))
            })?;

        let changes = entry.decode_changes().map_err(|e| {
            ServiceError::InternalError(format!(
                "Failed to decode change records of ledger entry {}: {}",
                ledger_entry_id, e
            ))
        })?;

        let lock = self.locks.lock_for(entry.product_id);
        let _guard = lock.lock().await;

        let records_reversed = changes.len();
        self.rollback_in_db(changes).await?;

        info!(
            ledger_entry_id = %ledger_entry_id,
            reference_id = %entry.reference_id,
            records_reversed = %records_reversed,
            "Allocation rolled back"
        );

        if let Err(e) = self
            .event_sender
            .send(Event::AllocationRolledBack {
                ledger_entry_id,
                reference_id: entry.reference_id,
                records_reversed,
            })
            .await
        {
            warn!("Failed to publish rollback event: {}", e);
        }

        Ok(())
    }

    async fn rollback_in_db(&self, changes: Vec<LotChange>) -> Result<(), ServiceError> {
        self.db.transaction::<_, (), ServiceError>(move |txn| {
            Box::pin(async move {
                for change in changes.iter().rev() {
                    match change {
                        LotChange::Count { lot_id, old, new } => {
                            let lot = InventoryLot::find_by_id(*lot_id)
                                .one(txn)
                                .await
                                .map_err(ServiceError::DatabaseError)?
                                .ok_or_else(|| {
                                    ServiceError::NotFound(format!(
                                        "Lot {} referenced by change record not found",
                                        lot_id
                                    ))
                                })?;

                            let restored = lot.quantity - new + old;
                            let mut active: inventory_lot::ActiveModel = lot.into();
                            active.quantity = Set(restored);
                            active.updated_at = Set(Utc::now());
                            active
                                .update(txn)
                                .await
                                .map_err(ServiceError::DatabaseError)?;
                        }
                        LotChange::Warehouse { lot_id, old, .. } => {
                            let lot = InventoryLot::find_by_id(*lot_id)
                                .one(txn)
                                .await
                                .map_err(ServiceError::DatabaseError)?
                                .ok_or_else(|| {
                                    ServiceError::NotFound(format!(
                                        "Lot {} referenced by change record not found",
                                        lot_id
                                    ))
                                })?;

                            let mut active: inventory_lot::ActiveModel = lot.into();
                            active.warehouse_id = Set(*old);
                            active.updated_at = Set(Utc::now());
                            active
                                .update(txn)
                                .await
                                .map_err(ServiceError::DatabaseError)?;
                        }
                        LotChange::Inserted { lot_id } => {
                            let result = InventoryLot::delete_by_id(*lot_id)
                                .exec(txn)
                                .await
                                .map_err(ServiceError::DatabaseError)?;
                            if result.rows_affected == 0 {
                                return Err(ServiceError::Inconsistency(format!(
                                    "Lot {} created by the allocation run no longer exists",
                                    lot_id
                                )));
                            }
                        }
                    }
                }

                Ok(())
            })
        })
        .await
    }
}

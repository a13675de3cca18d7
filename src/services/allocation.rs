use crate::{
    db::DatabaseAccess,
    entities::{
        commodity_profit::{self, SaleKind},
        inventory_change::{self, encode_changes, ChangeType, LotChange},
        inventory_lot::{self, Entity as InventoryLot, LotStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::costing::{CostingService, ProductPrice},
};
use chrono::Utc;
use dashmap::DashMap;
use lazy_static::lazy_static;
use prometheus::{IntCounterVec, Opts};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

lazy_static! {
    static ref ALLOCATION_RUNS: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "lotledger_allocation_runs_total",
            "Total number of completed allocation runs"
        ),
        &["mode"]
    )
    .expect("metric can be created");
    static ref ALLOCATION_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "lotledger_allocation_failures_total",
            "Total number of failed allocation runs"
        ),
        &["error_type"]
    )
    .expect("metric can be created");
    static ref ALLOCATED_QUANTITY: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "lotledger_allocated_quantity_total",
            "Total quantity of inventory allocated"
        ),
        &["mode"]
    )
    .expect("metric can be created");
}

/// Per-product async mutexes serializing allocation and rollback runs.
///
/// An allocation run holds its product's mutex across the whole
/// read-candidates, plan, write-changes, append-ledger sequence; together
/// with the surrounding database transaction this closes the
/// read-then-write race two concurrent runs would otherwise have.
#[derive(Clone, Default)]
pub struct ProductLocks {
    inner: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl ProductLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, product_id: Uuid) -> Arc<Mutex<()>> {
        self.inner
            .entry(product_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// A consuming allocation request: quantity leaves the system.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SaleAllocation {
    pub product_id: Uuid,
    /// Restrict the walk to one warehouse; `None` draws product-wide.
    pub warehouse_id: Option<Uuid>,
    #[validate(range(min = 1))]
    pub quantity: i32,
    /// Sale price recorded on each profit row.
    pub sale_price: ProductPrice,
    pub sale_kind: SaleKind,
    /// Triggering sales document.
    pub reference_id: Uuid,
    pub created_by: Uuid,
}

/// A transferring allocation request: quantity moves between warehouses.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TransferAllocation {
    pub product_id: Uuid,
    pub source_warehouse_id: Uuid,
    pub destination_warehouse_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    /// Triggering stock-transfer document.
    pub reference_id: Uuid,
    pub created_by: Uuid,
}

#[derive(Debug, Clone)]
pub struct SaleAllocationOutcome {
    pub ledger_entry_id: Uuid,
    pub profits: Vec<commodity_profit::Model>,
}

#[derive(Debug, Clone)]
pub struct TransferAllocationOutcome {
    pub ledger_entry_id: Uuid,
    /// Units actually moved; less than requested when candidates ran dry.
    pub transferred: i32,
}

/// Quantity drawn from one lot during a consuming walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LotDraw {
    pub lot_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct ConsumptionPlan {
    /// Change records in application order.
    pub changes: Vec<LotChange>,
    /// One draw per touched lot, for profit reporting.
    pub draws: Vec<LotDraw>,
    /// Units the candidates could not cover.
    pub unfulfilled: i32,
}

/// Walks candidate lots (caller supplies them oldest-first) and plans the
/// count mutations for a consuming allocation. Pure; the transactional
/// apply step executes the plan.
pub(crate) fn plan_consumption(
    lots: &[inventory_lot::Model],
    requested: i32,
) -> ConsumptionPlan {
    let mut plan = ConsumptionPlan::default();
    let mut remaining = requested;

    for lot in lots {
        if remaining <= 0 {
            break;
        }

        if remaining >= lot.quantity {
            // The whole lot leaves the system. Capture the drawn quantity
            // before the count reaches zero.
            let drawn = lot.quantity;
            plan.changes.push(LotChange::Count {
                lot_id: lot.id,
                old: lot.quantity,
                new: 0,
            });
            plan.draws.push(LotDraw {
                lot_id: lot.id,
                quantity: drawn,
            });
            remaining -= drawn;
        } else {
            plan.changes.push(LotChange::Count {
                lot_id: lot.id,
                old: lot.quantity,
                new: lot.quantity - remaining,
            });
            plan.draws.push(LotDraw {
                lot_id: lot.id,
                quantity: remaining,
            });
            remaining = 0;
        }
    }

    plan.unfulfilled = remaining;
    plan
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TransferStep {
    /// The whole lot changes warehouse.
    Move {
        lot_id: Uuid,
        from: Uuid,
        quantity: i32,
    },
    /// The lot is split: its count shrinks and a new lot of `quantity`
    /// units is created at the destination.
    Split {
        source_lot_id: Uuid,
        old_quantity: i32,
        quantity: i32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct TransferPlan {
    pub steps: Vec<TransferStep>,
    pub unfulfilled: i32,
}

/// Plans a transferring allocation over candidates from the source
/// warehouse, oldest-first.
pub(crate) fn plan_transfer(lots: &[inventory_lot::Model], requested: i32) -> TransferPlan {
    let mut plan = TransferPlan::default();
    let mut remaining = requested;

    for lot in lots {
        if remaining <= 0 {
            break;
        }

        if remaining >= lot.quantity {
            plan.steps.push(TransferStep::Move {
                lot_id: lot.id,
                from: lot.warehouse_id,
                quantity: lot.quantity,
            });
            remaining -= lot.quantity;
        } else {
            plan.steps.push(TransferStep::Split {
                source_lot_id: lot.id,
                old_quantity: lot.quantity,
                quantity: remaining,
            });
            remaining = 0;
        }
    }

    plan.unfulfilled = remaining;
    plan
}

/// Allocates stock out of (sale) or across (transfer) a product's lots,
/// recording every mutation in the change ledger.
#[derive(Clone)]
pub struct AllocationService {
    db: DatabaseAccess,
    costing: CostingService,
    event_sender: EventSender,
    locks: ProductLocks,
}

impl AllocationService {
    pub fn new(
        db: DatabaseAccess,
        costing: CostingService,
        event_sender: EventSender,
        locks: ProductLocks,
    ) -> Self {
        Self {
            db,
            costing,
            event_sender,
            locks,
        }
    }

    /// Runs a consuming allocation: draws `quantity` units from the
    /// product's lots oldest-first, zeroing and splitting as needed, and
    /// records a `stock-sales` ledger entry plus one profit row per lot
    /// touched. Sufficiency is re-checked inside the serialized section,
    /// so concurrent sales cannot drive counts negative.
    #[instrument(skip(self, request), fields(product_id = %request.product_id, quantity = %request.quantity))]
    pub async fn allocate_sale(
        &self,
        request: SaleAllocation,
    ) -> Result<SaleAllocationOutcome, ServiceError> {
        request.validate().map_err(|e| {
            ALLOCATION_FAILURES
                .with_label_values(&["validation_error"])
                .inc();
            ServiceError::ValidationError(format!("Invalid sale allocation: {}", e))
        })?;

        let lock = self.locks.lock_for(request.product_id);
        let _guard = lock.lock().await;

        let outcome = self.allocate_sale_in_db(&request).await.map_err(|e| {
            let label = match &e {
                ServiceError::InsufficientStock { .. } => "insufficient_stock",
                ServiceError::DatabaseError(_) => "database_error",
                _ => "other",
            };
            ALLOCATION_FAILURES.with_label_values(&[label]).inc();
            e
        })?;

        ALLOCATION_RUNS.with_label_values(&["sale"]).inc();
        ALLOCATED_QUANTITY
            .with_label_values(&["sale"])
            .inc_by(request.quantity as u64);

        info!(
            product_id = %request.product_id,
            reference_id = %request.reference_id,
            quantity = %request.quantity,
            ledger_entry_id = %outcome.ledger_entry_id,
            lots_touched = %outcome.profits.len(),
            "Sale allocation completed"
        );

        if let Err(e) = self
            .event_sender
            .send(Event::StockSold {
                product_id: request.product_id,
                quantity: request.quantity,
                reference_id: request.reference_id,
                ledger_entry_id: outcome.ledger_entry_id,
                lots_touched: outcome.profits.len(),
            })
            .await
        {
            warn!("Failed to publish stock-sold event: {}", e);
        }

        Ok(outcome)
    }

    async fn allocate_sale_in_db(
        &self,
        request: &SaleAllocation,
    ) -> Result<SaleAllocationOutcome, ServiceError> {
        let request = request.clone();

        self.db
            .transaction::<_, SaleAllocationOutcome, ServiceError>(move |txn| {
                Box::pin(async move {
                    let mut query = InventoryLot::find()
                        .filter(inventory_lot::Column::ProductId.eq(request.product_id))
                        .filter(inventory_lot::Column::Quantity.gt(0));
                    if let Some(warehouse_id) = request.warehouse_id {
                        query = query.filter(inventory_lot::Column::WarehouseId.eq(warehouse_id));
                    }

                    let candidates = query
                        .order_by_asc(inventory_lot::Column::TransactedAt)
                        .all(txn)
                        .await
                        .map_err(ServiceError::DatabaseError)?;

                    let available: i64 = candidates.iter().map(|l| l.quantity as i64).sum();
                    if (request.quantity as i64) > available {
                        return Err(ServiceError::InsufficientStock {
                            product_id: request.product_id,
                            requested: request.quantity,
                            available: available.try_into().unwrap_or(i32::MAX),
                        });
                    }

                    let plan = plan_consumption(&candidates, request.quantity);
                    let by_id: HashMap<Uuid, &inventory_lot::Model> =
                        candidates.iter().map(|l| (l.id, l)).collect();

                    for change in &plan.changes {
                        if let LotChange::Count { lot_id, new, .. } = change {
                            let model = by_id.get(lot_id).ok_or_else(|| {
                                ServiceError::InternalError(
                                    "Planned lot missing from candidate snapshot".to_string(),
                                )
                            })?;
                            let mut active: inventory_lot::ActiveModel = (*model).clone().into();
                            active.quantity = Set(*new);
                            active.updated_at = Set(Utc::now());
                            active
                                .update(txn)
                                .await
                                .map_err(ServiceError::DatabaseError)?;
                        }
                    }

                    let mut profits = Vec::with_capacity(plan.draws.len());
                    for draw in &plan.draws {
                        let profit = commodity_profit::ActiveModel {
                            id: Set(Uuid::new_v4()),
                            sale_kind: Set(request.sale_kind.to_string()),
                            reference_id: Set(request.reference_id),
                            lot_id: Set(draw.lot_id),
                            consumer_price: Set(request.sale_price.consumer),
                            store_price: Set(request.sale_price.store),
                            quantity: Set(draw.quantity),
                            created_at: Set(Utc::now()),
                        };
                        profits.push(
                            profit
                                .insert(txn)
                                .await
                                .map_err(ServiceError::DatabaseError)?,
                        );
                    }

                    let entry = inventory_change::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        change_type: Set(ChangeType::StockSales.as_str().to_string()),
                        reference_id: Set(request.reference_id),
                        product_id: Set(request.product_id),
                        changes: Set(encode_changes(&plan.changes).map_err(|e| {
                            ServiceError::InternalError(format!(
                                "Failed to encode change records: {}",
                                e
                            ))
                        })?),
                        created_at: Set(Utc::now()),
                    };
                    let entry = entry
                        .insert(txn)
                        .await
                        .map_err(ServiceError::DatabaseError)?;

                    Ok(SaleAllocationOutcome {
                        ledger_entry_id: entry.id,
                        profits,
                    })
                })
            })
            .await
    }

    /// Runs a transferring allocation: moves `quantity` units from the
    /// source warehouse to the destination, rehoming whole lots and
    /// splitting the last one when needed. Moves as much as candidates
    /// allow (callers pre-validate sufficiency) and records a
    /// `stock-transfer` ledger entry.
    #[instrument(skip(self, request), fields(product_id = %request.product_id, quantity = %request.quantity))]
    pub async fn allocate_transfer(
        &self,
        request: TransferAllocation,
    ) -> Result<TransferAllocationOutcome, ServiceError> {
        request.validate().map_err(|e| {
            ALLOCATION_FAILURES
                .with_label_values(&["validation_error"])
                .inc();
            ServiceError::ValidationError(format!("Invalid transfer allocation: {}", e))
        })?;
        if request.source_warehouse_id == request.destination_warehouse_id {
            return Err(ServiceError::ValidationError(
                "Transfer source and destination warehouses must differ".to_string(),
            ));
        }

        let lock = self.locks.lock_for(request.product_id);
        let _guard = lock.lock().await;

        // Split lots take the product's current quote for consumer/store
        // prices. Quoted up front so the transaction below never waits on
        // a second pool connection.
        let quote = self.costing.product_price(request.product_id).await?;

        let outcome = self
            .allocate_transfer_in_db(&request, quote)
            .await
            .map_err(|e| {
                let label = match &e {
                    ServiceError::DatabaseError(_) => "database_error",
                    _ => "other",
                };
                ALLOCATION_FAILURES.with_label_values(&[label]).inc();
                e
            })?;

        ALLOCATION_RUNS.with_label_values(&["transfer"]).inc();
        ALLOCATED_QUANTITY
            .with_label_values(&["transfer"])
            .inc_by(outcome.transferred as u64);

        info!(
            product_id = %request.product_id,
            reference_id = %request.reference_id,
            requested = %request.quantity,
            transferred = %outcome.transferred,
            ledger_entry_id = %outcome.ledger_entry_id,
            "Transfer allocation completed"
        );

        if let Err(e) = self
            .event_sender
            .send(Event::StockTransferred {
                product_id: request.product_id,
                quantity: outcome.transferred,
                source_warehouse_id: request.source_warehouse_id,
                destination_warehouse_id: request.destination_warehouse_id,
                reference_id: request.reference_id,
                ledger_entry_id: outcome.ledger_entry_id,
            })
            .await
        {
            warn!("Failed to publish stock-transferred event: {}", e);
        }

        Ok(outcome)
    }

    async fn allocate_transfer_in_db(
        &self,
        request: &TransferAllocation,
        quote: ProductPrice,
    ) -> Result<TransferAllocationOutcome, ServiceError> {
        let request = request.clone();

        self.db
            .transaction::<_, TransferAllocationOutcome, ServiceError>(move |txn| {
                Box::pin(async move {
                    let candidates = InventoryLot::find()
                        .filter(inventory_lot::Column::ProductId.eq(request.product_id))
                        .filter(inventory_lot::Column::WarehouseId.eq(request.source_warehouse_id))
                        .filter(inventory_lot::Column::Quantity.gt(0))
                        .order_by_asc(inventory_lot::Column::TransactedAt)
                        .all(txn)
                        .await
                        .map_err(ServiceError::DatabaseError)?;

                    let plan = plan_transfer(&candidates, request.quantity);
                    let by_id: HashMap<Uuid, &inventory_lot::Model> =
                        candidates.iter().map(|l| (l.id, l)).collect();

                    let mut changes: Vec<LotChange> = Vec::new();

                    for step in &plan.steps {
                        match step {
                            TransferStep::Move { lot_id, from, .. } => {
                                let model = by_id.get(lot_id).ok_or_else(|| {
                                    ServiceError::InternalError(
                                        "Planned lot missing from candidate snapshot".to_string(),
                                    )
                                })?;
                                changes.push(LotChange::Warehouse {
                                    lot_id: *lot_id,
                                    old: *from,
                                    new: request.destination_warehouse_id,
                                });
                                let mut active: inventory_lot::ActiveModel =
                                    (*model).clone().into();
                                active.warehouse_id = Set(request.destination_warehouse_id);
                                active.updated_at = Set(Utc::now());
                                active
                                    .update(txn)
                                    .await
                                    .map_err(ServiceError::DatabaseError)?;
                            }
                            TransferStep::Split {
                                source_lot_id,
                                old_quantity,
                                quantity,
                            } => {
                                let model = by_id.get(source_lot_id).ok_or_else(|| {
                                    ServiceError::InternalError(
                                        "Planned lot missing from candidate snapshot".to_string(),
                                    )
                                })?;

                                changes.push(LotChange::Count {
                                    lot_id: *source_lot_id,
                                    old: *old_quantity,
                                    new: old_quantity - quantity,
                                });
                                let mut active: inventory_lot::ActiveModel =
                                    (*model).clone().into();
                                active.quantity = Set(old_quantity - quantity);
                                active.updated_at = Set(Utc::now());
                                active
                                    .update(txn)
                                    .await
                                    .map_err(ServiceError::DatabaseError)?;

                                // The split lot lands at the destination with the
                                // source's purchase lineage and a fresh quote.
                                let new_lot = inventory_lot::ActiveModel {
                                    id: Set(Uuid::new_v4()),
                                    product_id: Set(request.product_id),
                                    warehouse_id: Set(request.destination_warehouse_id),
                                    purchase_invoice_id: Set(model.purchase_invoice_id),
                                    quantity: Set(*quantity),
                                    purchase_price: Set(model.purchase_price),
                                    consumer_price: Set(quote.consumer),
                                    store_price: Set(quote.store),
                                    transacted_at: Set(Utc::now()),
                                    status: Set(LotStatus::Active.as_str().to_string()),
                                    created_by: Set(request.created_by),
                                    created_at: Set(Utc::now()),
                                    updated_at: Set(Utc::now()),
                                };
                                let new_lot = new_lot
                                    .insert(txn)
                                    .await
                                    .map_err(ServiceError::DatabaseError)?;
                                changes.push(LotChange::Inserted { lot_id: new_lot.id });
                            }
                        }
                    }

                    let entry = inventory_change::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        change_type: Set(ChangeType::StockTransfer.as_str().to_string()),
                        reference_id: Set(request.reference_id),
                        product_id: Set(request.product_id),
                        changes: Set(encode_changes(&changes).map_err(|e| {
                            ServiceError::InternalError(format!(
                                "Failed to encode change records: {}",
                                e
                            ))
                        })?),
                        created_at: Set(Utc::now()),
                    };
                    let entry = entry
                        .insert(txn)
                        .await
                        .map_err(ServiceError::DatabaseError)?;

                    Ok(TransferAllocationOutcome {
                        ledger_entry_id: entry.id,
                        transferred: request.quantity - plan.unfulfilled,
                    })
                })
            })
            .await
    }
}

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

// Define the various events that can occur in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Lot lifecycle
    LotReceived {
        lot_id: Uuid,
        product_id: Uuid,
        warehouse_id: Uuid,
        quantity: i32,
    },
    LotDeleted {
        lot_id: Uuid,
    },

    // Allocation runs
    StockSold {
        product_id: Uuid,
        quantity: i32,
        reference_id: Uuid,
        ledger_entry_id: Uuid,
        lots_touched: usize,
    },
    StockTransferred {
        product_id: Uuid,
        quantity: i32,
        source_warehouse_id: Uuid,
        destination_warehouse_id: Uuid,
        reference_id: Uuid,
        ledger_entry_id: Uuid,
    },
    AllocationRolledBack {
        ledger_entry_id: Uuid,
        reference_id: Uuid,
        records_reversed: usize,
    },

    // Purchase invoice reconciliation
    PurchaseInvoiceApplied {
        invoice_id: Uuid,
        lots_created: usize,
    },
    PurchaseInvoiceReconciled {
        invoice_id: Uuid,
        lots_updated: usize,
        lots_deleted: usize,
        lots_created: usize,
    },
    PurchaseInvoiceLotsRemoved {
        invoice_id: Uuid,
        lots_deleted: u64,
    },
}

/// Drains the event channel, logging each event.
///
/// Downstream consumers (projections, notifications) hang off this loop in
/// the deploying application; the library itself only observes.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::StockSold {
                product_id,
                quantity,
                ledger_entry_id,
                ..
            } => {
                info!(
                    product_id = %product_id,
                    quantity = %quantity,
                    ledger_entry_id = %ledger_entry_id,
                    "Stock sold"
                );
            }
            Event::StockTransferred {
                product_id,
                quantity,
                source_warehouse_id,
                destination_warehouse_id,
                ..
            } => {
                info!(
                    product_id = %product_id,
                    quantity = %quantity,
                    source = %source_warehouse_id,
                    destination = %destination_warehouse_id,
                    "Stock transferred"
                );
            }
            Event::AllocationRolledBack {
                ledger_entry_id,
                records_reversed,
                ..
            } => {
                info!(
                    ledger_entry_id = %ledger_entry_id,
                    records_reversed = %records_reversed,
                    "Allocation rolled back"
                );
            }
            other => {
                info!("Received event: {:?}", other);
            }
        }
    }

    warn!("Event channel closed; stopping event processing loop");
}

//! LotLedger
//!
//! Inventory lot costing, allocation, and reversible change-ledger engine.
//! Tracks movable inventory lots for products across warehouses and answers,
//! consistently and reversibly: what a product currently costs under the
//! configured costing policy, how a requested quantity is deducted from
//! existing lots on sale or transfer, and how any such deduction is undone
//! when the triggering business document is edited or cancelled.
//!
//! The crate is a library; HTTP routing, authentication, and presentation
//! formatting belong to the consuming application.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod services;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use services::{
    allocation::ProductLocks, purchase_sync::PurchaseDocumentProvider,
    sales_sync::SalesDocumentProvider, transfer_sync::StockTransferProvider, AllocationService,
    CostingService, PurchaseSyncService, RollbackService, SalesSyncService, SettingsService,
    StockLevelService, TransferSyncService,
};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub settings: SettingsService,
    pub costing: CostingService,
    pub stock_levels: StockLevelService,
    pub allocation: AllocationService,
    pub rollback: RollbackService,
}

impl AppState {
    /// Wires the service graph over one connection pool and event channel.
    /// Allocation and rollback share the per-product lock table.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
    ) -> Self {
        let locks = ProductLocks::new();
        let db_access = db::DatabaseAccess::new(db.clone());
        let settings = SettingsService::new(db.clone());
        let costing = CostingService::new(db.clone(), settings.clone());
        let stock_levels = StockLevelService::new(db.clone());
        let allocation = AllocationService::new(
            db_access.clone(),
            costing.clone(),
            event_sender.clone(),
            locks.clone(),
        );
        let rollback = RollbackService::new(db_access, event_sender.clone(), locks);

        Self {
            db,
            config,
            event_sender,
            settings,
            costing,
            stock_levels,
            allocation,
            rollback,
        }
    }

    /// Purchase-document synchronizer over the given document provider.
    pub fn purchase_sync(
        &self,
        provider: Arc<dyn PurchaseDocumentProvider>,
    ) -> PurchaseSyncService {
        PurchaseSyncService::new(
            db::DatabaseAccess::new(self.db.clone()),
            provider,
            self.event_sender.clone(),
        )
    }

    /// Sales-document synchronizer over the given document provider.
    pub fn sales_sync(&self, provider: Arc<dyn SalesDocumentProvider>) -> SalesSyncService {
        SalesSyncService::new(
            db::DatabaseAccess::new(self.db.clone()),
            provider,
            self.stock_levels.clone(),
            self.allocation.clone(),
            self.rollback.clone(),
        )
    }

    /// Stock-transfer synchronizer over the given document provider.
    pub fn transfer_sync(&self, provider: Arc<dyn StockTransferProvider>) -> TransferSyncService {
        TransferSyncService::new(
            provider,
            self.stock_levels.clone(),
            self.allocation.clone(),
            self.rollback.clone(),
        )
    }
}

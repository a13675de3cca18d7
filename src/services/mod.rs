pub mod allocation;
pub mod costing;
pub mod purchase_sync;
pub mod rollback;
pub mod sales_sync;
pub mod settings;
pub mod stock_levels;
pub mod transfer_sync;

pub use allocation::{AllocationService, ProductLocks, SaleAllocation, TransferAllocation};
pub use costing::{CostingService, ProductPrice};
pub use purchase_sync::PurchaseSyncService;
pub use rollback::RollbackService;
pub use sales_sync::SalesSyncService;
pub use settings::{PricingMethod, SettingsService};
pub use stock_levels::{StockLevelService, StockSummary};
pub use transfer_sync::TransferSyncService;

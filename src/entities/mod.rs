pub mod commodity_profit;
pub mod inventory_change;
pub mod inventory_lot;
pub mod setting;
pub mod warehouse;

pub use commodity_profit::SaleKind;
pub use inventory_change::{ChangeType, LotChange};
pub use inventory_lot::LotStatus;

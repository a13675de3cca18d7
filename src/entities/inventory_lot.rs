use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_lots")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    /// Purchase document that brought this lot into stock. Transfer splits
    /// inherit the source lot's reference so FIFO/LIFO traceability survives
    /// warehouse moves.
    pub purchase_invoice_id: Uuid,
    /// On-hand count. Never negative; a zero lot stays addressable for audit
    /// but is excluded from allocation candidate sets.
    pub quantity: i32,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub purchase_price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub consumer_price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub store_price: Decimal,
    /// Business timestamp of the purchase; FIFO/LIFO candidate ordering key.
    pub transacted_at: DateTime<Utc>,
    pub status: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::warehouse::Entity",
        from = "Column::WarehouseId",
        to = "super::warehouse::Column::Id"
    )]
    Warehouse,
}

impl Related<super::warehouse::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Warehouse.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

// Helper enums
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LotStatus {
    Active,
    Inactive,
}

impl LotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LotStatus::Active => "active",
            LotStatus::Inactive => "inactive",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(LotStatus::Active),
            "inactive" => Some(LotStatus::Inactive),
            _ => None,
        }
    }
}

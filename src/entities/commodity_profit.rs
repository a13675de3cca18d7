use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-lot sale record used downstream for margin reporting: one row per lot
/// a consuming allocation drew from.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "commodity_profits")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub sale_kind: String,
    /// Triggering sales document.
    pub reference_id: Uuid,
    pub lot_id: Uuid,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub consumer_price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub store_price: Decimal,
    /// Units drawn from this lot.
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::inventory_lot::Entity",
        from = "Column::LotId",
        to = "super::inventory_lot::Column::Id"
    )]
    InventoryLot,
}

impl Related<super::inventory_lot::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InventoryLot.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Sale channel a consuming allocation was made for.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum SaleKind {
    Retail,
    OnlineSales,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn sale_kind_serializes_as_kebab_case() {
        assert_eq!(SaleKind::Retail.to_string(), "retail");
        assert_eq!(SaleKind::OnlineSales.to_string(), "online-sales");
        assert_eq!(
            SaleKind::from_str("online-sales").unwrap(),
            SaleKind::OnlineSales
        );
        assert!(SaleKind::from_str("wholesale").is_err());
    }
}

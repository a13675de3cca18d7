use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "warehouses")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub title: String,
    /// Sale-channel flags: whether lots in this warehouse count toward
    /// retail / online availability.
    pub retail: bool,
    pub online_sales: bool,
    pub status: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::inventory_lot::Entity")]
    InventoryLots,
}

impl Related<super::inventory_lot::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InventoryLots.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether this warehouse serves the given sale channel.
    pub fn serves(&self, kind: super::commodity_profit::SaleKind) -> bool {
        match kind {
            super::commodity_profit::SaleKind::Retail => self.retail,
            super::commodity_profit::SaleKind::OnlineSales => self.online_sales,
        }
    }
}

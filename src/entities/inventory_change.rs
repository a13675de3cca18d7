use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One reversible mutation performed during an allocation run.
///
/// Count records carry the full old/new pair rather than a delta so reversal
/// stays exact regardless of intervening reads; tagged variants keep the
/// rollback match exhaustive at compile time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LotChange {
    Count { lot_id: Uuid, old: i32, new: i32 },
    Warehouse { lot_id: Uuid, old: Uuid, new: Uuid },
    Inserted { lot_id: Uuid },
}

impl LotChange {
    pub fn lot_id(&self) -> Uuid {
        match self {
            LotChange::Count { lot_id, .. } => *lot_id,
            LotChange::Warehouse { lot_id, .. } => *lot_id,
            LotChange::Inserted { lot_id } => *lot_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_changes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub change_type: String,
    /// Triggering document (sales invoice or stock transfer).
    pub reference_id: Uuid,
    pub product_id: Uuid,
    /// Ordered `Vec<LotChange>`; order is application order, rollback replays
    /// it in reverse.
    #[sea_orm(column_type = "JsonBinary")]
    pub changes: Json,
    pub created_at: DateTime<Utc>,
}

impl Model {
    pub fn decode_changes(&self) -> Result<Vec<LotChange>, serde_json::Error> {
        serde_json::from_value(self.changes.clone())
    }
}

pub fn encode_changes(changes: &[LotChange]) -> Result<Json, serde_json::Error> {
    serde_json::to_value(changes)
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

// Helper enums
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeType {
    StockSales,
    StockTransfer,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::StockSales => "stock-sales",
            ChangeType::StockTransfer => "stock-transfer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "stock-sales" => Some(ChangeType::StockSales),
            "stock-transfer" => Some(ChangeType::StockTransfer),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_payload_round_trips_in_order() {
        let changes = vec![
            LotChange::Count {
                lot_id: Uuid::new_v4(),
                old: 5,
                new: 0,
            },
            LotChange::Warehouse {
                lot_id: Uuid::new_v4(),
                old: Uuid::new_v4(),
                new: Uuid::new_v4(),
            },
            LotChange::Inserted {
                lot_id: Uuid::new_v4(),
            },
        ];

        let encoded = encode_changes(&changes).unwrap();
        let decoded: Vec<LotChange> = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, changes);
    }

    #[test]
    fn change_type_tags_match_the_ledger_wire_values() {
        assert_eq!(ChangeType::StockSales.as_str(), "stock-sales");
        assert_eq!(ChangeType::StockTransfer.as_str(), "stock-transfer");
        assert_eq!(
            ChangeType::from_str("stock-transfer"),
            Some(ChangeType::StockTransfer)
        );
        assert_eq!(ChangeType::from_str("stock-burn"), None);
    }
}

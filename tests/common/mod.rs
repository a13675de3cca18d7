//! Shared harness for integration tests: an in-memory SQLite database with
//! the schema built from the entities, plus seeding helpers.
#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use lotledger::{
    config::AppConfig,
    entities::{commodity_profit, inventory_change, inventory_lot, setting, warehouse},
    events::{process_events, EventSender},
    AppState,
};
use lotledger::db::{establish_connection_with_config, DbConfig};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectionTrait, DatabaseConnection, Schema, Set};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Connects an in-memory SQLite database and creates the schema.
///
/// A single pooled connection keeps every handle on the same in-memory
/// database.
pub async fn setup_db() -> DatabaseConnection {
    let config = DbConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        min_connections: 1,
        ..Default::default()
    };

    let db = establish_connection_with_config(&config)
        .await
        .expect("failed to connect");
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let statements = [
        schema.create_table_from_entity(inventory_lot::Entity),
        schema.create_table_from_entity(inventory_change::Entity),
        schema.create_table_from_entity(commodity_profit::Entity),
        schema.create_table_from_entity(warehouse::Entity),
        schema.create_table_from_entity(setting::Entity),
    ];
    // The entities declare Postgres-oriented `decimal(19, 4)` money columns.
    // sea-query's SQLite column-type formatter panics on any decimal precision
    // larger than 16, so render the DDL with the Postgres builder instead and
    // execute the resulting string directly. The other Postgres type names
    // (uuid, timestamptz, jsonb, varchar) are all accepted by SQLite as
    // column-affinity hints and round-trip correctly.
    //
    // The one exception is the decimal columns: `decimal(19, 4)` carries NUMERIC
    // affinity, so whole-number prices get stored as INTEGER and then fail to
    // decode as the `REAL` that sea-orm's SQLite decimal codec expects. Mapping
    // them to bare `real` reproduces the REAL affinity the native SQLite backend
    // would have emitted (`real(19, 4)`), which is what the codec reads back.
    for statement in statements {
        let sql = statement
            .to_string(sea_orm::sea_query::PostgresQueryBuilder)
            .replace("decimal(19, 4)", "real");
        db.execute_unprepared(&sql)
            .await
            .expect("failed to create table");
    }

    db
}

/// Builds an [`AppState`] over a fresh in-memory database, with the event
/// channel drained in the background.
pub async fn test_state() -> AppState {
    let db = Arc::new(setup_db().await);
    let config = AppConfig::new("sqlite::memory:".into(), "test".into());

    let (tx, rx) = mpsc::channel(64);
    let sender = EventSender::new(tx);
    tokio::spawn(process_events(rx));

    AppState::new(db, config, sender)
}

pub async fn seed_pricing_method(state: &AppState, method: &str) {
    state
        .settings
        .set("pricingMethod", method)
        .await
        .expect("failed to seed pricing method");
}

pub async fn seed_warehouse(
    db: &DatabaseConnection,
    retail: bool,
    online_sales: bool,
) -> Uuid {
    let id = Uuid::new_v4();
    warehouse::ActiveModel {
        id: Set(id),
        title: Set(format!("warehouse-{}", &id.to_string()[..8])),
        retail: Set(retail),
        online_sales: Set(online_sales),
        status: Set("active".to_string()),
        created_by: Set(Uuid::nil()),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("failed to seed warehouse");
    id
}

pub struct LotSeed {
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    pub purchase_invoice_id: Uuid,
    pub quantity: i32,
    pub purchase_price: Decimal,
    pub consumer_price: Decimal,
    pub store_price: Decimal,
    pub transacted_at: DateTime<Utc>,
}

impl LotSeed {
    pub fn new(product_id: Uuid, warehouse_id: Uuid, quantity: i32) -> Self {
        Self {
            product_id,
            warehouse_id,
            purchase_invoice_id: Uuid::new_v4(),
            quantity,
            purchase_price: Decimal::from(90),
            consumer_price: Decimal::from(100),
            store_price: Decimal::from(95),
            transacted_at: Utc::now(),
        }
    }

    pub fn price(mut self, purchase: i64, consumer: i64, store: i64) -> Self {
        self.purchase_price = Decimal::from(purchase);
        self.consumer_price = Decimal::from(consumer);
        self.store_price = Decimal::from(store);
        self
    }

    pub fn aged_minutes(mut self, minutes: i64) -> Self {
        self.transacted_at = Utc::now() - Duration::minutes(minutes);
        self
    }

    pub fn from_invoice(mut self, invoice_id: Uuid) -> Self {
        self.purchase_invoice_id = invoice_id;
        self
    }

    pub async fn insert(self, db: &DatabaseConnection) -> inventory_lot::Model {
        inventory_lot::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(self.product_id),
            warehouse_id: Set(self.warehouse_id),
            purchase_invoice_id: Set(self.purchase_invoice_id),
            quantity: Set(self.quantity),
            purchase_price: Set(self.purchase_price),
            consumer_price: Set(self.consumer_price),
            store_price: Set(self.store_price),
            transacted_at: Set(self.transacted_at),
            status: Set("active".to_string()),
            created_by: Set(Uuid::nil()),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(db)
        .await
        .expect("failed to seed lot")
    }
}

/// Total on-hand quantity of a product across all lots.
pub async fn total_quantity(db: &DatabaseConnection, product_id: Uuid) -> i64 {
    use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

    inventory_lot::Entity::find()
        .filter(inventory_lot::Column::ProductId.eq(product_id))
        .all(db)
        .await
        .expect("failed to list lots")
        .iter()
        .map(|lot| lot.quantity as i64)
        .sum()
}

/// Reloads one lot by id.
pub async fn reload_lot(db: &DatabaseConnection, lot_id: Uuid) -> inventory_lot::Model {
    use sea_orm::EntityTrait;

    inventory_lot::Entity::find_by_id(lot_id)
        .one(db)
        .await
        .expect("failed to load lot")
        .expect("lot not found")
}

mod common;

use common::{seed_warehouse, test_state, total_quantity, LotSeed};
use lotledger::{
    entities::{inventory_change, SaleKind},
    errors::ServiceError,
    services::{allocation::SaleAllocation, ProductPrice},
};
use rust_decimal::Decimal;
use sea_orm::EntityTrait;
use uuid::Uuid;

fn sale_request(product_id: Uuid, quantity: i32) -> SaleAllocation {
    SaleAllocation {
        product_id,
        warehouse_id: None,
        quantity,
        sale_price: ProductPrice {
            consumer: Decimal::from(120),
            store: Decimal::from(110),
        },
        sale_kind: SaleKind::Retail,
        reference_id: Uuid::new_v4(),
        created_by: Uuid::new_v4(),
    }
}

#[tokio::test]
async fn concurrent_sales_over_shared_stock_leave_exactly_one_winner() {
    let state = test_state().await;
    let product = Uuid::new_v4();
    let warehouse = seed_warehouse(&state.db, true, true).await;

    // Stock for one request, not both.
    LotSeed::new(product, warehouse, 8).insert(&state.db).await;

    let first = {
        let state = state.clone();
        tokio::spawn(async move { state.allocation.allocate_sale(sale_request(product, 5)).await })
    };
    let second = {
        let state = state.clone();
        tokio::spawn(async move { state.allocation.allocate_sale(sale_request(product, 5)).await })
    };

    let results = [first.await.unwrap(), second.await.unwrap()];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    let insufficiencies = results
        .iter()
        .filter(|r| matches!(r, Err(ServiceError::InsufficientStock { .. })))
        .count();

    assert_eq!(successes, 1, "exactly one sale must win");
    assert_eq!(insufficiencies, 1, "the loser must see insufficiency");

    // Quantity never went negative and only the winner was recorded.
    assert_eq!(total_quantity(&state.db, product).await, 3);
    assert_eq!(
        inventory_change::Entity::find()
            .all(&*state.db)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn many_single_unit_sales_stop_at_the_available_total() {
    let state = test_state().await;
    let product = Uuid::new_v4();
    let warehouse = seed_warehouse(&state.db, true, true).await;

    LotSeed::new(product, warehouse, 10).insert(&state.db).await;

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let state = state.clone();
        tasks.push(tokio::spawn(async move {
            state
                .allocation
                .allocate_sale(sale_request(product, 1))
                .await
                .is_ok()
        }));
    }

    let mut successes = 0;
    for task in tasks {
        if task.await.unwrap_or(false) {
            successes += 1;
        }
    }

    assert_eq!(
        successes, 10,
        "exactly 10 single-unit sales should succeed; got {}",
        successes
    );
    assert_eq!(total_quantity(&state.db, product).await, 0);
}

#[tokio::test]
async fn sales_on_distinct_products_do_not_contend() {
    let state = test_state().await;
    let warehouse = seed_warehouse(&state.db, true, true).await;

    let product_a = Uuid::new_v4();
    let product_b = Uuid::new_v4();
    LotSeed::new(product_a, warehouse, 5).insert(&state.db).await;
    LotSeed::new(product_b, warehouse, 5).insert(&state.db).await;

    let first = {
        let state = state.clone();
        tokio::spawn(async move { state.allocation.allocate_sale(sale_request(product_a, 5)).await })
    };
    let second = {
        let state = state.clone();
        tokio::spawn(async move { state.allocation.allocate_sale(sale_request(product_b, 5)).await })
    };

    assert!(first.await.unwrap().is_ok());
    assert!(second.await.unwrap().is_ok());
    assert_eq!(total_quantity(&state.db, product_a).await, 0);
    assert_eq!(total_quantity(&state.db, product_b).await, 0);
}

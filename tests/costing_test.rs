mod common;

use assert_matches::assert_matches;
use common::{seed_pricing_method, seed_warehouse, test_state, LotSeed};
use lotledger::{
    errors::ServiceError,
    services::{PricingMethod, ProductPrice},
};
use rust_decimal::Decimal;
use uuid::Uuid;

#[tokio::test]
async fn fifo_and_lifo_quote_the_oldest_and_newest_in_stock_lot() {
    let state = test_state().await;
    let product = Uuid::new_v4();
    let warehouse = seed_warehouse(&state.db, true, true).await;

    LotSeed::new(product, warehouse, 2)
        .aged_minutes(60)
        .price(80, 120, 110)
        .insert(&state.db)
        .await;
    LotSeed::new(product, warehouse, 3)
        .aged_minutes(10)
        .price(99, 100, 95)
        .insert(&state.db)
        .await;

    let fifo = state
        .costing
        .product_price_by(product, PricingMethod::Fifo)
        .await
        .unwrap();
    assert_eq!(fifo.consumer, Decimal::from(120));
    assert_eq!(fifo.store, Decimal::from(110));

    let lifo = state
        .costing
        .product_price_by(product, PricingMethod::Lifo)
        .await
        .unwrap();
    assert_eq!(lifo.consumer, Decimal::from(100));
    assert_eq!(lifo.store, Decimal::from(95));
}

#[tokio::test]
async fn exhausted_lots_are_not_costing_candidates() {
    let state = test_state().await;
    let product = Uuid::new_v4();
    let warehouse = seed_warehouse(&state.db, true, true).await;

    // The newest and highest-priced lot is empty; every picking policy
    // must skip it.
    LotSeed::new(product, warehouse, 0)
        .aged_minutes(1)
        .price(999, 500, 500)
        .insert(&state.db)
        .await;
    LotSeed::new(product, warehouse, 4)
        .aged_minutes(30)
        .price(90, 100, 95)
        .insert(&state.db)
        .await;

    for method in [PricingMethod::Fifo, PricingMethod::Lifo, PricingMethod::Max] {
        let quote = state
            .costing
            .product_price_by(product, method)
            .await
            .unwrap();
        assert_eq!(quote.consumer, Decimal::from(100), "policy {:?}", method);
    }
}

#[tokio::test]
async fn max_quotes_the_highest_purchase_price_lot() {
    let state = test_state().await;
    let product = Uuid::new_v4();
    let warehouse = seed_warehouse(&state.db, true, true).await;

    LotSeed::new(product, warehouse, 2)
        .aged_minutes(60)
        .price(95, 130, 125)
        .insert(&state.db)
        .await;
    LotSeed::new(product, warehouse, 2)
        .aged_minutes(30)
        .price(90, 100, 95)
        .insert(&state.db)
        .await;

    let quote = state
        .costing
        .product_price_by(product, PricingMethod::Max)
        .await
        .unwrap();
    assert_eq!(quote.consumer, Decimal::from(130));
    assert_eq!(quote.store, Decimal::from(125));
}

#[tokio::test]
async fn weighted_average_rounds_up_and_covers_both_prices() {
    let state = test_state().await;
    let product = Uuid::new_v4();
    let warehouse = seed_warehouse(&state.db, true, true).await;

    // (3 x 100 + 2 x 101) / 5 = 100.4, rounded up to 101.
    LotSeed::new(product, warehouse, 3)
        .price(90, 100, 95)
        .insert(&state.db)
        .await;
    LotSeed::new(product, warehouse, 2)
        .price(91, 101, 96)
        .insert(&state.db)
        .await;

    let quote = state
        .costing
        .product_price_by(product, PricingMethod::WeightedAverage)
        .await
        .unwrap();
    assert_eq!(quote.consumer, Decimal::from(101));
    assert_eq!(quote.store, Decimal::from(101));
}

#[tokio::test]
async fn zero_inventory_quotes_zero_under_every_policy() {
    let state = test_state().await;
    let product = Uuid::new_v4();

    for method in [
        PricingMethod::Fifo,
        PricingMethod::Lifo,
        PricingMethod::Max,
        PricingMethod::WeightedAverage,
    ] {
        let quote = state
            .costing
            .product_price_by(product, method)
            .await
            .unwrap();
        assert_eq!(quote, ProductPrice::zero(), "policy {:?}", method);
    }
}

#[tokio::test]
async fn configured_policy_drives_the_default_quote() {
    let state = test_state().await;
    let product = Uuid::new_v4();
    let warehouse = seed_warehouse(&state.db, true, true).await;

    LotSeed::new(product, warehouse, 2)
        .aged_minutes(60)
        .price(80, 120, 110)
        .insert(&state.db)
        .await;
    LotSeed::new(product, warehouse, 3)
        .aged_minutes(10)
        .price(99, 100, 95)
        .insert(&state.db)
        .await;

    seed_pricing_method(&state, "lifo").await;
    let quote = state.costing.product_price(product).await.unwrap();
    assert_eq!(quote.consumer, Decimal::from(100));

    seed_pricing_method(&state, "fifo").await;
    let quote = state.costing.product_price(product).await.unwrap();
    assert_eq!(quote.consumer, Decimal::from(120));
}

#[tokio::test]
async fn missing_pricing_method_is_an_error_not_a_default() {
    let state = test_state().await;
    let product = Uuid::new_v4();

    let result = state.costing.product_price(product).await;
    assert_matches!(result, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn unknown_pricing_method_is_rejected() {
    let state = test_state().await;
    let product = Uuid::new_v4();

    seed_pricing_method(&state, "weighted_average").await;
    let result = state.costing.product_price(product).await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));
}

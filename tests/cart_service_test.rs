mod common;

use assert_matches::assert_matches;
use barista_api::{errors::ServiceError, services::carts::AddToCartInput};
use common::{product_of, setup_named_variant, setup_variant, TestApp};
use rust_decimal_macros::dec;
use uuid::Uuid;

#[tokio::test]
async fn first_add_creates_cart_lazily() {
    let app = TestApp::new().await;
    let variant_id = setup_variant(&app, dec!(120.00), 8).await;
    let product_id = product_of(&app, variant_id).await;
    let customer_id = Uuid::new_v4();

    // No cart yet: listing is simply empty.
    assert!(app.services.cart.list_items(customer_id).await.unwrap().is_empty());

    let outcome = app
        .services
        .cart
        .add_item(
            customer_id,
            AddToCartInput {
                product_id,
                variant_id,
                quantity: 2,
            },
        )
        .await
        .unwrap();
    assert!(!outcome.updated_existing);

    let items = app.services.cart.list_items(customer_id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].quantity, 2);
    assert_eq!(items[0].unit_price, dec!(120.00));
    assert_eq!(items[0].line_total, dec!(240.00));
    assert!(!items[0].insufficient_stock);
}

#[tokio::test]
async fn adding_same_selection_increments_quantity() {
    let app = TestApp::new().await;
    let variant_id = setup_variant(&app, dec!(120.00), 8).await;
    let product_id = product_of(&app, variant_id).await;
    let customer_id = Uuid::new_v4();

    let input = || AddToCartInput {
        product_id,
        variant_id,
        quantity: 2,
    };

    let first = app.services.cart.add_item(customer_id, input()).await.unwrap();
    let second = app.services.cart.add_item(customer_id, input()).await.unwrap();

    assert!(!first.updated_existing);
    assert!(second.updated_existing);
    assert_eq!(first.item_id, second.item_id);

    let items = app.services.cart.list_items(customer_id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].quantity, 4);
}

#[tokio::test]
async fn different_variants_get_separate_rows() {
    let app = TestApp::new().await;
    let small = setup_named_variant(&app, "Latte Beans", "250g", dec!(180.00), 5).await;
    let large = setup_named_variant(&app, "Latte Beans XL", "500g", dec!(320.00), 5).await;
    let customer_id = Uuid::new_v4();

    for variant_id in [small, large] {
        let product_id = product_of(&app, variant_id).await;
        app.services
            .cart
            .add_item(
                customer_id,
                AddToCartInput {
                    product_id,
                    variant_id,
                    quantity: 1,
                },
            )
            .await
            .unwrap();
    }

    let items = app.services.cart.list_items(customer_id).await.unwrap();
    assert_eq!(items.len(), 2);
}

#[tokio::test]
async fn add_rejects_zero_quantity_and_unknown_variant() {
    let app = TestApp::new().await;
    let variant_id = setup_variant(&app, dec!(120.00), 8).await;
    let product_id = product_of(&app, variant_id).await;
    let customer_id = Uuid::new_v4();

    let err = app
        .services
        .cart
        .add_item(
            customer_id,
            AddToCartInput {
                product_id,
                variant_id,
                quantity: 0,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let err = app
        .services
        .cart
        .add_item(
            customer_id,
            AddToCartInput {
                product_id,
                variant_id: Uuid::new_v4(),
                quantity: 1,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn update_quantity_validates_ownership_and_bounds() {
    let app = TestApp::new().await;
    let variant_id = setup_variant(&app, dec!(120.00), 8).await;
    let product_id = product_of(&app, variant_id).await;
    let owner = Uuid::new_v4();
    let stranger = Uuid::new_v4();

    let outcome = app
        .services
        .cart
        .add_item(
            owner,
            AddToCartInput {
                product_id,
                variant_id,
                quantity: 1,
            },
        )
        .await
        .unwrap();

    app.services
        .cart
        .update_item_quantity(owner, outcome.item_id, 5)
        .await
        .unwrap();
    let items = app.services.cart.list_items(owner).await.unwrap();
    assert_eq!(items[0].quantity, 5);

    // Another customer cannot touch the item.
    let err = app
        .services
        .cart
        .update_item_quantity(stranger, outcome.item_id, 2)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    let err = app
        .services
        .cart
        .update_item_quantity(owner, outcome.item_id, 0)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn remove_item_checks_ownership() {
    let app = TestApp::new().await;
    let variant_id = setup_variant(&app, dec!(120.00), 8).await;
    let product_id = product_of(&app, variant_id).await;
    let owner = Uuid::new_v4();
    let stranger = Uuid::new_v4();

    let outcome = app
        .services
        .cart
        .add_item(
            owner,
            AddToCartInput {
                product_id,
                variant_id,
                quantity: 1,
            },
        )
        .await
        .unwrap();

    let err = app
        .services
        .cart
        .remove_item(stranger, outcome.item_id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    app.services.cart.remove_item(owner, outcome.item_id).await.unwrap();
    assert!(app.services.cart.list_items(owner).await.unwrap().is_empty());

    // Removing again: gone.
    let err = app
        .services
        .cart
        .remove_item(owner, outcome.item_id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn clear_is_idempotent() {
    let app = TestApp::new().await;
    let variant_id = setup_variant(&app, dec!(120.00), 8).await;
    let product_id = product_of(&app, variant_id).await;
    let customer_id = Uuid::new_v4();

    // Clearing a cart that was never created succeeds.
    app.services.cart.clear(customer_id).await.unwrap();

    app.services
        .cart
        .add_item(
            customer_id,
            AddToCartInput {
                product_id,
                variant_id,
                quantity: 2,
            },
        )
        .await
        .unwrap();

    app.services.cart.clear(customer_id).await.unwrap();
    assert!(app.services.cart.list_items(customer_id).await.unwrap().is_empty());

    // And clearing the now-empty cart succeeds again.
    app.services.cart.clear(customer_id).await.unwrap();
}

#[tokio::test]
async fn list_flags_selections_exceeding_live_stock() {
    let app = TestApp::new().await;
    let variant_id = setup_variant(&app, dec!(120.00), 2).await;
    let product_id = product_of(&app, variant_id).await;
    let customer_id = Uuid::new_v4();

    // Overselling into the cart is allowed; the flag warns at listing time.
    app.services
        .cart
        .add_item(
            customer_id,
            AddToCartInput {
                product_id,
                variant_id,
                quantity: 5,
            },
        )
        .await
        .unwrap();

    let items = app.services.cart.list_items(customer_id).await.unwrap();
    assert_eq!(items[0].stock_quantity, 2);
    assert!(items[0].insufficient_stock);
}

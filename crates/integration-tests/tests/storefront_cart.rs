//! Cart flows through the storefront's HTTP surface.
//!
//! Each test drives the real router in-process with an in-memory store, so
//! no server or Firestore project is needed.

use axum::http::StatusCode;
use cartwheel_core::{Cart, CartProduct, ProductId, UserId};
use cartwheel_integration_tests::{TestApp, product};
use cartwheel_storefront::store::{CartStore, MemoryStore, ProductCatalog};

fn user(id: &str) -> UserId {
    UserId::parse(id).expect("valid user id")
}

fn pid(id: &str) -> ProductId {
    ProductId::parse(id).expect("valid product id")
}

// ============================================================================
// Identity
// ============================================================================

#[tokio::test]
async fn test_first_visit_issues_identity_cookie() {
    let mut app = TestApp::new();

    let resp = app.get("/products").await;
    assert_eq!(resp.status, StatusCode::OK);
    let set_cookie = resp.header("set-cookie").expect("identity cookie");
    assert!(set_cookie.starts_with("store_user_id=user_"));
    assert!(set_cookie.contains("Max-Age="));

    let identity = app.identity().expect("identity recorded").to_string();
    let resp = app.get("/cart").await;
    assert!(resp.header("set-cookie").is_none());
    assert_eq!(app.identity(), Some(identity.as_str()));
}

#[tokio::test]
async fn test_cookieless_browser_gets_fresh_cart_each_request() {
    let mut app = TestApp::new();
    app.add("tea", "Tea", "3.00", "products").await;

    app.forget_identity();
    let resp = app.get("/cart/count").await;
    assert_eq!(resp.body.trim(), "0");
}

#[tokio::test]
async fn test_first_page_views_touch_no_store() {
    let store = MemoryStore::with_products([product("tea", "Tea", "3.00", 1)]);
    let mut app = TestApp::with_store(store);

    assert_eq!(app.get("/products").await.status, StatusCode::OK);
    app.forget_identity();
    assert_eq!(app.get("/cart").await.status, StatusCode::OK);
    app.forget_identity();
    assert_eq!(app.get("/cart/count").await.body.trim(), "0");

    assert_eq!(app.store.fetch_count(), 0);
    assert_eq!(app.store.save_count(), 0);
}

#[tokio::test]
async fn test_root_redirects_to_products() {
    let mut app = TestApp::new();
    let resp = app.get("/").await;
    assert!(resp.status.is_redirection());
    assert_eq!(resp.header("location"), Some("/products"));
}

// ============================================================================
// Add to Cart
// ============================================================================

#[tokio::test]
async fn test_add_twice_counts_two_and_subtotals() {
    let mut app = TestApp::new();

    let first = app.add("a", "Item A", "9.99", "products").await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.slot("cart-counter").map(str::trim), Some("1"));

    let second = app.add("a", "Item A", "9.99", "products").await;
    assert_eq!(second.slot("cart-counter").map(str::trim), Some("2"));
    assert_eq!(second.notice().as_deref(), Some("Item A added to cart!"));
    assert!(second.triggers().get("cart-updated").is_some());

    let page = app.get("/cart").await;
    assert!(page.body.contains("$19.98"));
    assert!(page.body.contains("$9.99"));
}

#[tokio::test]
async fn test_add_updates_only_the_counter() {
    let mut app = TestApp::new();

    // Even from the cart page, an add doesn't re-render the cart rows.
    let resp = app.add("a", "Item A", "1.00", "cart").await;
    assert!(resp.slot("cart-counter").is_some());
    assert!(resp.slot("cart-container").is_none());
    assert!(resp.slot("cart-total").is_none());
}

#[tokio::test]
async fn test_add_from_unknown_page_has_no_fragments() {
    let mut app = TestApp::new();
    let resp = app.add("a", "Item A", "1.00", "blog").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.body.is_empty());
    assert!(resp.notice().is_some());
}

#[tokio::test]
async fn test_add_rejects_malformed_input() {
    let mut app = TestApp::new();

    let resp = app.add("a", "Item A", "nine", "products").await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let resp = app.add("a/b", "Item A", "1.00", "products").await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let resp = app.post_form("/cart/add", &[("id", "a")]).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// Cart Controls
// ============================================================================

#[tokio::test]
async fn test_increase_and_decrease() {
    let mut app = TestApp::new();
    app.add("a", "Item A", "2.50", "products").await;

    let resp = app.update("increase", "a").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.slot("cart-counter").map(str::trim), Some("2"));
    assert!(resp.slot("cart-total").is_some_and(|t| t.contains("$5.00")));
    assert!(resp.triggers().get("cart-updated").is_some());
    assert!(resp.notice().is_none());

    let resp = app.update("decrease", "a").await;
    assert_eq!(resp.slot("cart-counter").map(str::trim), Some("1"));
}

#[tokio::test]
async fn test_decrease_to_zero_removes_item() {
    let mut app = TestApp::new();
    app.add("a", "Item A", "2.50", "products").await;

    let resp = app.update("decrease", "a").await;
    let container = resp.slot("cart-container").expect("container update");
    assert!(container.contains("Your cart is empty."));
    assert!(resp.slot("cart-total").is_some_and(|t| t.contains("$0.00")));
    assert!(
        resp.slot("checkout-button")
            .is_some_and(|b| b.contains("disabled"))
    );
}

#[tokio::test]
async fn test_delete_removes_row() {
    let mut app = TestApp::new();
    app.add("a", "Item A", "1.00", "products").await;
    app.add("b", "Item B", "2.00", "products").await;

    let resp = app.update("delete", "a").await;
    let container = resp.slot("cart-container").expect("container update");
    assert!(!container.contains("Item A"));
    assert!(container.contains("Item B"));
    assert_eq!(resp.slot("cart-counter").map(str::trim), Some("1"));
}

#[tokio::test]
async fn test_delete_missing_item_leaves_cart() {
    let mut app = TestApp::new();
    app.add("a", "Item A", "1.00", "products").await;

    let resp = app.update("delete", "ghost").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.slot("cart-counter").map(str::trim), Some("1"));
}

#[tokio::test]
async fn test_unknown_action_is_bad_request() {
    let mut app = TestApp::new();
    let resp = app.update("explode", "a").await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// Checkout
// ============================================================================

#[tokio::test]
async fn test_checkout_clears_and_persists_empty_cart() {
    let mut app = TestApp::new();
    app.add("a", "Item A", "10.00", "products").await;
    app.add("a", "Item A", "10.00", "products").await;
    app.add("b", "Item B", "5.50", "products").await;

    let page = app.get("/cart").await;
    assert!(page.body.contains("$25.50"));

    let resp = app.checkout().await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(
        resp.notice().as_deref(),
        Some("Proceeding to checkout for $25.50.")
    );
    assert_eq!(resp.slot("cart-counter").map(str::trim), Some("0"));
    assert!(
        resp.slot("cart-container")
            .is_some_and(|c| c.contains("Your cart is empty."))
    );

    // A page load is ordered after every queued save.
    app.get("/cart").await;
    let identity = user(app.identity().expect("identity"));
    let stored = app.store.fetch(&identity).await.expect("store available");
    assert!(stored.expect("document written").cart.is_empty());
}

#[tokio::test]
async fn test_checkout_on_empty_cart_is_noop() {
    let mut app = TestApp::new();
    app.get("/cart").await;

    let resp = app.checkout().await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);
    assert!(resp.notice().is_none());
    assert_eq!(app.store.save_count(), 0);
}

// ============================================================================
// Persistence
// ============================================================================

#[tokio::test]
async fn test_cart_survives_restart() {
    let store = MemoryStore::new();
    let mut app = TestApp::with_store(store.clone());
    app.add("a", "Item A", "9.99", "products").await;
    app.add("a", "Item A", "9.99", "products").await;
    app.get("/cart").await;
    let identity = app.identity().expect("identity").to_string();

    let mut restarted = TestApp::with_store(store);
    restarted.set_identity(identity);
    let page = restarted.get("/cart").await;
    assert!(page.body.contains("$19.98"));
    assert!(page.body.contains("Item A"));
}

#[tokio::test]
async fn test_page_load_picks_up_other_device() {
    let mut app = TestApp::new();
    app.add("a", "Item A", "1.00", "products").await;
    app.get("/cart").await;
    let identity = user(app.identity().expect("identity"));

    let mut elsewhere = Cart::new();
    elsewhere.add_or_increment(CartProduct {
        id: pid("z"),
        name: "Item Z".to_string(),
        price: "4.00".parse().expect("price"),
        image: String::new(),
    });
    app.store
        .save(&identity, &elsewhere)
        .await
        .expect("store available");

    let page = app.get("/cart").await;
    assert!(page.body.contains("Item Z"));
    assert!(!page.body.contains("Item A"));
}

#[tokio::test]
async fn test_store_outage_is_invisible_to_shopper() {
    let mut app = TestApp::new();
    app.store.set_unavailable(true);

    let resp = app.add("a", "Item A", "1.00", "products").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.slot("cart-counter").map(str::trim), Some("1"));

    let resp = app.update("increase", "a").await;
    assert_eq!(resp.slot("cart-counter").map(str::trim), Some("2"));

    // The failed reload keeps the in-memory cart.
    let page = app.get("/cart").await;
    assert_eq!(page.status, StatusCode::OK);
    assert!(page.body.contains("Item A"));
    assert_eq!(app.store.save_count(), 0);
}

#[tokio::test]
async fn test_price_beyond_limit_is_rejected_and_cart_survives() {
    let mut app = TestApp::new();
    app.add("tea", "Tea", "3.00", "products").await;

    for _ in 0..2 {
        let resp = app
            .add("gold", "Gold Bar", "79228162514264337593543950335", "products")
            .await;
        assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    }

    let page = app.get("/cart").await;
    assert_eq!(page.status, StatusCode::OK);
    assert!(page.body.contains("$3.00"));
    assert!(!page.body.contains("Gold Bar"));
    assert_eq!(app.checkout().await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_price_at_limit_adds_up() {
    let mut app = TestApp::new();

    for _ in 0..2 {
        let resp = app.add("yacht", "Yacht", "1000000.00", "cart").await;
        assert_eq!(resp.status, StatusCode::OK);
    }

    let page = app.get("/cart").await;
    assert!(page.body.contains("$1000000.00"));
    assert!(page.body.contains("$2000000.00"));
}

// ============================================================================
// Products
// ============================================================================

#[tokio::test]
async fn test_products_page_lists_newest_first() {
    let store = MemoryStore::with_products([
        product("old", "Old Faithful", "3.00", 1),
        product("new", "New Arrival", "12.50", 20),
    ]);
    let mut app = TestApp::with_store(store);

    let resp = app.get("/products").await;
    assert_eq!(resp.status, StatusCode::OK);
    let body = &resp.body;
    assert!(body.contains("id=\"products-grid\""));
    assert!(body.contains("data-id=\"new\""));
    assert!(body.contains("data-name=\"New Arrival\""));
    assert!(body.contains("data-price=\"12.5\""));
    assert!(body.contains("data-image=\"/images/new.jpg\""));
    let new_at = body.find("data-id=\"new\"").expect("new card");
    let old_at = body.find("data-id=\"old\"").expect("old card");
    assert!(new_at < old_at);
}

#[tokio::test]
async fn test_grid_refresh_swaps_in_current_catalog() {
    let store = MemoryStore::with_products([product("old", "Old Faithful", "3.00", 1)]);
    let mut app = TestApp::with_store(store.clone());

    let page = app.get("/products").await;
    assert!(page.body.contains("hx-get=\"/products/grid\""));
    assert!(page.body.contains("every 300s"));

    store
        .put_product(&product("new", "New Arrival", "12.50", 20))
        .await
        .expect("catalog write");
    let resp = app.get("/products/grid").await;
    assert_eq!(resp.status, StatusCode::OK);
    let grid = resp.slot("products-grid").expect("grid fragment");
    let new_at = grid.find("data-id=\"new\"").expect("new card");
    let old_at = grid.find("data-id=\"old\"").expect("old card");
    assert!(new_at < old_at);
    assert!(resp.slot("cart-counter").is_none());
}

#[tokio::test]
async fn test_products_page_shows_cart_count() {
    let mut app = TestApp::with_store(MemoryStore::with_products([product(
        "tea", "Tea", "3.00", 1,
    )]));
    app.add("tea", "Tea", "3.00", "products").await;
    app.add("tea", "Tea", "3.00", "products").await;

    let resp = app.get("/products").await;
    assert!(resp.body.contains("<span id=\"cart-counter\">2"));
}

#[tokio::test]
async fn test_catalog_outage_renders_empty_grid() {
    let store = MemoryStore::with_products([product("tea", "Tea", "3.00", 1)]);
    store.set_unavailable(true);
    let mut app = TestApp::with_store(store);

    let resp = app.get("/products").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.body.contains("No products available"));
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_endpoints() {
    let mut app = TestApp::new();
    let resp = app.get("/health").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body, "ok");

    let resp = app.get("/health/ready").await;
    assert_eq!(resp.status, StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let mut app = TestApp::new();
    let resp = app.get("/nope").await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert!(resp.header("x-request-id").is_some());
}

//! The JSON API end to end, driven through the router.

use axum::http::StatusCode;
use serde_json::{Value, json};

use mercado_integration_tests::{ADMIN_TOKEN, ALICE_TOKEN, BOB_TOKEN, TestApp, cents};

async fn create_product(app: &TestApp, name: &str, price: &str, stock: i32) -> String {
    let (status, body) = app
        .send(
            "POST",
            "/api/products",
            Some(ADMIN_TOKEN),
            Some(json!({
                "name": name,
                "description": format!("{name} description"),
                "price": price,
                "category": "Kitchen",
                "stock": stock,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().expect("product id").to_string()
}

// ============================================================================
// Health & Auth
// ============================================================================

#[tokio::test]
async fn test_health_endpoints() {
    let app = TestApp::new();

    let (status, body) = app.send("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".to_string()));

    let (status, _) = app.send("GET", "/health/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_missing_or_unknown_token_is_unauthorized() {
    let app = TestApp::new();

    let (status, _) = app.send("GET", "/api/cart", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.send("GET", "/api/cart", Some("forged"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_routes_refuse_customers() {
    let app = TestApp::new();

    let (status, _) = app
        .send("GET", "/api/reports/order-status", Some(ALICE_TOKEN), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(
            "POST",
            "/api/products",
            Some(ALICE_TOKEN),
            Some(json!({"name": "x"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// ============================================================================
// Checkout Flow
// ============================================================================

#[tokio::test]
async fn test_cart_to_order_flow() {
    let app = TestApp::new();
    let product_id = create_product(&app, "Kettle", "20.00", 5).await;

    let (status, cart) = app
        .send(
            "POST",
            "/api/cart",
            Some(ALICE_TOKEN),
            Some(json!({"product_id": product_id, "quantity": 2})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{cart}");
    assert_eq!(cart["items"].as_array().map(Vec::len), Some(1));

    let (status, order) = app.send("POST", "/api/orders", Some(ALICE_TOKEN), None).await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    assert_eq!(order["total"], "40.00");
    assert_eq!(order["status"], "PENDING");
    let order_id = order["id"].as_str().expect("order id").to_string();

    let (_, cart) = app.send("GET", "/api/cart", Some(ALICE_TOKEN), None).await;
    assert_eq!(cart["items"].as_array().map(Vec::len), Some(0));

    let (status, product) = app
        .send("GET", &format!("/api/products/{product_id}"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(product["stock"], 3);

    let (status, orders) = app.send("GET", "/api/orders", Some(ALICE_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(orders.as_array().map(Vec::len), Some(1));
    assert_eq!(orders[0]["items"][0]["product"]["availability"], "available");
    assert_eq!(orders[0]["items"][0]["product"]["name"], "Kettle");

    // Bob may not read Alice's order; an admin may.
    let path = format!("/api/orders/{order_id}");
    let (status, _) = app.send("GET", &path, Some(BOB_TOKEN), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.send("GET", &path, Some(ADMIN_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_checkout_errors_map_to_statuses() {
    let app = TestApp::new();

    let (status, body) = app.send("POST", "/api/orders", Some(ALICE_TOKEN), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "cart is empty");

    let lamp = app.product("Lamp", "Lighting", cents(4500), 1).await;
    app.add_to_cart(app.alice, &lamp, 1).await;
    app.add_to_cart(app.bob, &lamp, 1).await;

    let (status, _) = app.send("POST", "/api/orders", Some(BOB_TOKEN), None).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = app.send("POST", "/api/orders", Some(ALICE_TOKEN), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(
        body["error"]
            .as_str()
            .is_some_and(|message| message.contains("insufficient stock"))
    );
}

#[tokio::test]
async fn test_partial_commit_hides_details() {
    let app = TestApp::new();
    let lamp = app.product("Lamp", "Lighting", cents(4500), 3).await;
    app.add_to_cart(app.alice, &lamp, 1).await;
    app.faults.fail_debit_of(lamp.id).await;

    let (status, body) = app.send("POST", "/api/orders", Some(ALICE_TOKEN), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Internal server error");
}

#[tokio::test]
async fn test_cart_validation() {
    let app = TestApp::new();
    let product_id = create_product(&app, "Kettle", "20.00", 2).await;

    let (status, _) = app
        .send(
            "POST",
            "/api/cart",
            Some(ALICE_TOKEN),
            Some(json!({"product_id": product_id, "quantity": 0})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(
            "POST",
            "/api/cart",
            Some(ALICE_TOKEN),
            Some(json!({"product_id": product_id, "quantity": 3})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, cart) = app
        .send(
            "POST",
            "/api/cart",
            Some(ALICE_TOKEN),
            Some(json!({"product_id": product_id, "quantity": 1})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let item_id = cart["items"][0]["id"].as_str().expect("item id").to_string();

    let (status, cart) = app
        .send(
            "PUT",
            &format!("/api/cart/{item_id}"),
            Some(ALICE_TOKEN),
            Some(json!({"quantity": 2})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["items"][0]["quantity"], 2);

    let (status, cart) = app
        .send("DELETE", &format!("/api/cart/{item_id}"), Some(ALICE_TOKEN), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["items"].as_array().map(Vec::len), Some(0));

    let (status, _) = app.send("DELETE", "/api/cart", Some(ALICE_TOKEN), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

// ============================================================================
// Admin
// ============================================================================

#[tokio::test]
async fn test_order_status_update() {
    let app = TestApp::new();
    let lamp = app.product("Lamp", "Lighting", cents(4500), 3).await;
    app.add_to_cart(app.alice, &lamp, 1).await;
    let order = app
        .state
        .checkout()
        .commit_order(app.alice)
        .await
        .expect("commit");
    let path = format!("/api/orders/{}/status", order.id);

    let (status, _) = app
        .send("PUT", &path, Some(ALICE_TOKEN), Some(json!({"status": "SHIPPED"})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send("PUT", &path, Some(ADMIN_TOKEN), Some(json!({"status": "LOST"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, body) = app
        .send("PUT", &path, Some(ADMIN_TOKEN), Some(json!({"status": "SHIPPED"})))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "SHIPPED");

    let (status, _) = app
        .send("PUT", &path, Some(ADMIN_TOKEN), Some(json!({"status": "CANCELLED"})))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send("PUT", &path, Some(ADMIN_TOKEN), Some(json!({"status": "DELIVERED"})))
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    assert_eq!(body["error"], format!("order {} is cancelled", order.id));
}

#[tokio::test]
async fn test_deleted_product_shows_as_unavailable() {
    let app = TestApp::new();
    let product_id = create_product(&app, "Kettle", "20.00", 5).await;
    let (status, _) = app
        .send(
            "POST",
            "/api/cart",
            Some(ALICE_TOKEN),
            Some(json!({"product_id": product_id, "quantity": 1})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.send("POST", "/api/orders", Some(ALICE_TOKEN), None).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app
        .send(
            "DELETE",
            &format!("/api/products/{product_id}"),
            Some(ADMIN_TOKEN),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, orders) = app.send("GET", "/api/orders", Some(ALICE_TOKEN), None).await;
    let line = &orders[0]["items"][0];
    assert_eq!(line["product"]["availability"], "unavailable");
    assert_eq!(line["price"], "20.00");
    assert_eq!(line["quantity"], 1);
}

#[tokio::test]
async fn test_reports() {
    let app = TestApp::new();
    let lamp = app.product("Lamp", "Lighting", cents(4500), 12).await;
    let mug = app.product("Mug", "Kitchen", cents(1200), 3).await;
    app.add_to_cart(app.alice, &lamp, 2).await;
    app.add_to_cart(app.bob, &mug, 1).await;
    app.state.checkout().commit_order(app.alice).await.expect("alice");
    app.state.checkout().commit_order(app.bob).await.expect("bob");

    let (status, revenue) = app
        .send("GET", "/api/reports/daily-revenue?range=7days", Some(ADMIN_TOKEN), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(revenue[0]["revenue"], "102.00");
    assert_eq!(revenue[0]["orders"], 2);

    let (status, top) = app
        .send("GET", "/api/reports/top-customers?limit=1", Some(ADMIN_TOKEN), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(top.as_array().map(Vec::len), Some(1));
    assert_eq!(top[0]["user_id"], app.alice.to_string());

    let (status, _) = app
        .send("GET", "/api/reports/top-customers?limit=0", Some(ADMIN_TOKEN), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, categories) = app
        .send("GET", "/api/reports/sales-by-category", Some(ADMIN_TOKEN), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(categories[0]["category"], "Lighting");
    assert_eq!(categories[1]["category"], "Kitchen");

    let (status, statuses) = app
        .send("GET", "/api/reports/order-status", Some(ADMIN_TOKEN), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(statuses[0]["status"], "PENDING");
    assert_eq!(statuses[0]["count"], 2);

    // Lamp has 10 left, mug has 2; the default threshold is 10.
    let (status, low) = app
        .send("GET", "/api/reports/low-stock", Some(ADMIN_TOKEN), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(low.as_array().map(Vec::len), Some(2));
    assert_eq!(low[0]["name"], "Mug");

    let (status, low) = app
        .send("GET", "/api/reports/low-stock?threshold=5", Some(ADMIN_TOKEN), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(low.as_array().map(Vec::len), Some(1));
}

//! Order status changes, tracking, cancellation, ratings and notifications.

use axum::http::StatusCode;
use cravecart_integration_tests::{TestApp, TestResponse};
use serde_json::json;

/// Place a cash order of one dish and return its id.
async fn cash_order(app: &TestApp, admin: &str, user: &str) -> i64 {
    let food = app.food(admin, "Paneer Roll", "120").await;
    app.add_to_cart(user, food, 1).await;
    let placed = app.place(user, "cash_on_delivery", None).await;
    assert_eq!(placed.status, StatusCode::CREATED, "{:?}", placed.body);
    placed.data()["orderId"].as_i64().expect("order id")
}

async fn deliver(app: &TestApp, admin: &str, order_id: i64) {
    for status in ["preparing", "out_for_delivery", "delivered"] {
        let response = app.set_status(admin, order_id, status).await;
        assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
    }
}

async fn rate(app: &TestApp, user: &str, order_id: i64, rating: i64) -> TestResponse {
    app.post(
        &format!("/api/order/{order_id}/rate"),
        user,
        json!({ "rating": rating, "review": "Hot and fresh" }),
    )
    .await
}

#[tokio::test]
async fn order_moves_through_the_kitchen() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let user = app.customer("diner@example.com").await;
    let order_id = cash_order(&app, &admin, &user).await;

    let skipped = app.set_status(&admin, order_id, "delivered").await;
    assert_eq!(skipped.status, StatusCode::CONFLICT);
    assert_eq!(skipped.code(), "invalid_transition");

    deliver(&app, &admin, order_id).await;

    let tracking = app
        .get(&format!("/api/order/{order_id}/track"), &user)
        .await;
    assert_eq!(tracking.status, StatusCode::OK);
    let data = tracking.data();
    assert_eq!(data["currentStatus"], json!("delivered"));
    assert_eq!(data["currentStatusLabel"], json!("Delivered"));
    let statuses: Vec<&str> = data["trackingUpdates"]
        .as_array()
        .expect("updates")
        .iter()
        .filter_map(|e| e["status"].as_str())
        .collect();
    assert_eq!(
        statuses,
        ["delivered", "out_for_delivery", "preparing", "confirmed"]
    );
}

#[tokio::test]
async fn delivered_orders_cannot_be_cancelled() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let user = app.customer("diner@example.com").await;
    let order_id = cash_order(&app, &admin, &user).await;
    deliver(&app, &admin, order_id).await;

    let response = app
        .post(&format!("/api/order/{order_id}/cancel"), &user, json!({}))
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.code(), "invalid_transition");

    let order = app.get(&format!("/api/order/{order_id}"), &user).await;
    assert_eq!(order.data()["status"], json!("delivered"));
    assert_eq!(
        order.data()["statusHistory"].as_array().map(Vec::len),
        Some(4)
    );
}

#[tokio::test]
async fn customer_cancels_with_a_reason() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let user = app.customer("diner@example.com").await;
    let order_id = cash_order(&app, &admin, &user).await;

    let response = app
        .post(
            &format!("/api/order/{order_id}/cancel"),
            &user,
            json!({ "reason": "Ordered by mistake" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
    assert_eq!(response.data()["status"], json!("cancelled"));
    let history = response.data()["statusHistory"].as_array().expect("history");
    assert_eq!(
        history.last().map(|e| e["message"].clone()),
        Some(json!("Ordered by mistake"))
    );

    // Cancelled is terminal.
    let again = app
        .post(&format!("/api/order/{order_id}/cancel"), &user, json!({}))
        .await;
    assert_eq!(again.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn orders_are_private_to_their_owner() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let owner = app.customer("owner@example.com").await;
    let stranger = app.customer("stranger@example.com").await;
    let order_id = cash_order(&app, &admin, &owner).await;

    let peek = app.get(&format!("/api/order/{order_id}"), &stranger).await;
    assert_eq!(peek.status, StatusCode::FORBIDDEN);

    let cancel = app
        .post(&format!("/api/order/{order_id}/cancel"), &stranger, json!({}))
        .await;
    assert_eq!(cancel.status, StatusCode::FORBIDDEN);

    let as_admin = app.get(&format!("/api/order/{order_id}"), &admin).await;
    assert_eq!(as_admin.status, StatusCode::OK);

    let all = app.get("/api/order", &owner).await;
    assert_eq!(all.status, StatusCode::FORBIDDEN);
    let all = app.get("/api/order?status=confirmed", &admin).await;
    assert_eq!(all.body["pagination"]["total"], json!(1));

    let missing = app.get("/api/order/4242", &owner).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn ratings_follow_delivery() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let user = app.customer("diner@example.com").await;
    let order_id = cash_order(&app, &admin, &user).await;

    let early = rate(&app, &user, order_id, 5).await;
    assert_eq!(early.status, StatusCode::CONFLICT);
    assert_eq!(early.code(), "invalid_state");

    deliver(&app, &admin, order_id).await;

    let out_of_range = rate(&app, &user, order_id, 6).await;
    assert_eq!(out_of_range.status, StatusCode::BAD_REQUEST);

    let rated = rate(&app, &user, order_id, 4).await;
    assert_eq!(rated.status, StatusCode::OK, "{:?}", rated.body);
    assert_eq!(rated.data()["rating"], json!(4));
    assert_eq!(rated.data()["review"], json!("Hot and fresh"));

    let twice = rate(&app, &user, order_id, 5).await;
    assert_eq!(twice.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn status_changes_reach_the_notification_feed() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let user = app.customer("diner@example.com").await;
    let order_id = cash_order(&app, &admin, &user).await;
    deliver(&app, &admin, order_id).await;

    let unread = app.get("/api/notifications/unread-count", &user).await;
    // Placed, preparing, out for delivery, delivered.
    assert_eq!(unread.data()["unreadCount"], json!(4));

    let feed = app.get("/api/notifications?limit=2", &user).await;
    assert_eq!(feed.body["pagination"]["total"], json!(4));
    let newest = &feed.data()[0];
    assert_eq!(newest["title"], json!("Order Delivered"));
    assert_eq!(newest["type"], json!("delivery"));
    let newest_id = newest["id"].as_i64().expect("notification id");

    let stranger = app.customer("stranger@example.com").await;
    let forbidden = app
        .put(
            &format!("/api/notifications/{newest_id}/read"),
            &stranger,
            json!({}),
        )
        .await;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);

    let read = app
        .put(
            &format!("/api/notifications/{newest_id}/read"),
            &user,
            json!({}),
        )
        .await;
    assert_eq!(read.data()["read"], json!(true));

    let all = app
        .put("/api/notifications/read-all", &user, json!({}))
        .await;
    assert_eq!(all.data()["updatedCount"], json!(3));

    let unread = app.get("/api/notifications/unread-count", &user).await;
    assert_eq!(unread.data()["unreadCount"], json!(0));
}

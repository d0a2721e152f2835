//! Placing orders: pricing, promo discounts and the card hand-off.

use axum::http::StatusCode;
use cravecart_core::UserId;
use cravecart_integration_tests::{TestApp, address, dec, money};
use cravecart_server::db::CartRepository;
use serde_json::json;

// ============================================================================
// Cash on delivery
// ============================================================================

#[tokio::test]
async fn cash_order_is_priced_from_the_cart() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let user = app.customer("diner@example.com").await;
    let food_a = app.food(&admin, "Masala Dosa", "100").await;
    app.add_to_cart(&user, food_a, 2).await;

    let response = app.place(&user, "cash_on_delivery", None).await;
    assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);

    let order = &response.data()["order"];
    assert_eq!(money(&order["subtotal"]), dec("200"));
    assert_eq!(money(&order["tax"]), dec("10"));
    assert_eq!(money(&order["deliveryFee"]), dec("50"));
    assert_eq!(money(&order["discount"]), dec("0"));
    assert_eq!(money(&response.data()["amount"]), dec("260"));
    assert_eq!(response.data()["status"], json!("confirmed"));
    assert!(response.data().get("paymentUrl").is_none());

    // The cart is emptied by placement.
    let cart = app.get("/api/cart", &user).await;
    assert_eq!(cart.data()["itemCount"], json!(0));
}

#[tokio::test]
async fn flat_promo_is_taken_off_the_total() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let user = app.customer("diner@example.com").await;
    let food_a = app.food(&admin, "Masala Dosa", "100").await;
    app.promo(
        &admin,
        json!({
            "code": "flat50",
            "description": "Rs 50 off",
            "discountType": "fixed",
            "discountValue": "50",
            "minOrderAmount": "100",
        }),
    )
    .await;
    app.add_to_cart(&user, food_a, 2).await;

    let response = app.place(&user, "cod", Some("FLAT50")).await;
    assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
    let order = &response.data()["order"];
    assert_eq!(money(&order["discount"]), dec("50"));
    assert_eq!(order["promoCode"], json!("FLAT50"));
    assert_eq!(money(&response.data()["amount"]), dec("210"));
}

#[tokio::test]
async fn deleted_dish_blocks_placement_and_keeps_the_cart() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let user = app.customer("diner@example.com").await;
    let food_a = app.food(&admin, "Masala Dosa", "100").await;
    let food_b = app.food(&admin, "Filter Coffee", "40").await;
    app.add_to_cart(&user, food_a, 1).await;
    app.add_to_cart(&user, food_b, 1).await;

    let deleted = app.delete(&format!("/api/food/{food_b}"), &admin).await;
    assert_eq!(deleted.status, StatusCode::OK);

    let response = app.place(&user, "cash_on_delivery", None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let orders = app.get("/api/order/user", &user).await;
    assert_eq!(orders.data(), &json!([]));

    let profile = app.get("/api/user/profile", &user).await;
    let user_id = profile.data()["id"]
        .as_i64()
        .and_then(|id| i32::try_from(id).ok())
        .map(UserId::new)
        .expect("user id");
    let entries = app.store.cart_entries(user_id).await.expect("cart entries");
    assert_eq!(entries.len(), 2);
}

#[tokio::test]
async fn placement_validates_the_request() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let user = app.customer("diner@example.com").await;
    let food_a = app.food(&admin, "Masala Dosa", "100").await;

    let empty = app.place(&user, "cash_on_delivery", None).await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);

    app.add_to_cart(&user, food_a, 1).await;

    let mut incomplete = address();
    incomplete["phone"] = json!("");
    let response = app
        .post(
            "/api/order/place",
            &user,
            json!({ "address": incomplete, "paymentMethod": "cash_on_delivery" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    // A client view that disagrees with the stored cart.
    let response = app
        .post(
            "/api/order/place",
            &user,
            json!({
                "address": address(),
                "paymentMethod": "cash_on_delivery",
                "items": [{ "foodId": food_a, "quantity": 3 }],
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);

    let unknown = app.place(&user, "cash_on_delivery", Some("NOPE")).await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
    assert_eq!(unknown.code(), "promo_not_found");

    // Nothing above consumed the cart.
    let response = app
        .post(
            "/api/order/place",
            &user,
            json!({
                "address": address(),
                "paymentMethod": "cash_on_delivery",
                "items": [{ "foodId": food_a, "quantity": 1 }],
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
}

#[tokio::test]
async fn simultaneous_checkouts_place_one_order() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let user = app.customer("diner@example.com").await;
    let food_a = app.food(&admin, "Masala Dosa", "100").await;
    app.add_to_cart(&user, food_a, 2).await;

    let (first, second) = tokio::join!(
        app.place(&user, "cash_on_delivery", None),
        app.place(&user, "cash_on_delivery", None),
    );
    let mut statuses = [first.status, second.status];
    statuses.sort_by_key(|s| s.as_u16());
    assert_eq!(statuses[0], StatusCode::CREATED, "{first:?} {second:?}");
    assert!(statuses[1].is_client_error(), "{first:?} {second:?}");

    let orders = app.get("/api/order/user", &user).await;
    assert_eq!(orders.data().as_array().map(Vec::len), Some(1));
    assert_eq!(money(&orders.data()[0]["amount"]), dec("260"));
}

// ============================================================================
// Card payments
// ============================================================================

#[tokio::test]
async fn card_order_waits_for_payment() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let user = app.customer("diner@example.com").await;
    let food_a = app.food(&admin, "Masala Dosa", "100").await;
    app.add_to_cart(&user, food_a, 2).await;

    let response = app.place(&user, "card", None).await;
    assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
    let order_id = response.data()["orderId"].as_i64().expect("order id");
    assert_eq!(response.data()["status"], json!("pending"));
    assert_eq!(
        response.data()["paymentUrl"],
        json!(format!("https://checkout.test/pay/{order_id}"))
    );

    let requests = app.gateway.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.total.to_string(), "260.00");
    assert!(
        request
            .success_url
            .as_str()
            .starts_with("http://localhost:5173/verify?success=true")
    );

    app.gateway.complete_payment(order_id);
    let verified = app
        .post(
            "/api/order/verify-payment",
            &user,
            json!({ "orderId": order_id, "success": "true" }),
        )
        .await;
    assert_eq!(verified.status, StatusCode::OK, "{:?}", verified.body);
    assert_eq!(verified.data()["status"], json!("confirmed"));
    assert_eq!(verified.data()["paymentConfirmed"], json!(true));

    // Reporting success twice changes nothing.
    let again = app
        .post(
            "/api/order/verify-payment",
            &user,
            json!({ "orderId": order_id, "success": true }),
        )
        .await;
    assert_eq!(again.status, StatusCode::OK);
    let history = again.data()["statusHistory"].as_array().expect("history");
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn failed_payment_leaves_the_order_pending() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let user = app.customer("diner@example.com").await;
    let food_a = app.food(&admin, "Masala Dosa", "100").await;
    app.add_to_cart(&user, food_a, 1).await;

    let placed = app.place(&user, "card", None).await;
    let order_id = placed.data()["orderId"].as_i64().expect("order id");

    let failed = app
        .post(
            "/api/order/verify-payment",
            &user,
            json!({ "orderId": order_id, "success": false }),
        )
        .await;
    assert_eq!(failed.status, StatusCode::BAD_REQUEST);
    assert_eq!(failed.code(), "payment_failed");

    let order = app.get(&format!("/api/order/{order_id}"), &user).await;
    assert_eq!(order.data()["status"], json!("pending"));
    assert_eq!(order.data()["paymentConfirmed"], json!(false));

    let feed = app.get("/api/notifications", &user).await;
    let titles: Vec<&str> = feed
        .data()
        .as_array()
        .expect("feed")
        .iter()
        .filter_map(|n| n["title"].as_str())
        .collect();
    assert!(titles.contains(&"Payment Failed"), "{titles:?}");
}

#[tokio::test]
async fn gateway_outage_is_retried_later() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let user = app.customer("diner@example.com").await;
    let food_a = app.food(&admin, "Masala Dosa", "100").await;
    app.add_to_cart(&user, food_a, 1).await;

    app.gateway.fail_next();
    let placed = app.place(&user, "card", None).await;
    assert_eq!(placed.status, StatusCode::CREATED);
    assert!(placed.data().get("paymentUrl").is_none());
    let order_id = placed.data()["orderId"].as_i64().expect("order id");

    let retry = app
        .post(&format!("/api/order/{order_id}/pay"), &user, json!({}))
        .await;
    assert_eq!(retry.status, StatusCode::BAD_GATEWAY);

    app.gateway.recover();
    let retry = app
        .post(&format!("/api/order/{order_id}/pay"), &user, json!({}))
        .await;
    assert_eq!(retry.status, StatusCode::OK, "{:?}", retry.body);
    assert_eq!(
        retry.data()["paymentUrl"],
        json!(format!("https://checkout.test/pay/{order_id}"))
    );
}

#[tokio::test]
async fn card_orders_need_a_gateway() {
    let app = TestApp::without_payments();
    let admin = app.admin().await;
    let user = app.customer("diner@example.com").await;
    let food_a = app.food(&admin, "Masala Dosa", "100").await;
    app.add_to_cart(&user, food_a, 1).await;

    let response = app.place(&user, "card", None).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    // Refused before anything was written.
    let cart = app.get("/api/cart", &user).await;
    assert_eq!(cart.data()["itemCount"], json!(1));
}

#[tokio::test]
async fn unpaid_session_is_not_confirmed() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let user = app.customer("diner@example.com").await;
    let food_a = app.food(&admin, "Masala Dosa", "100").await;
    app.add_to_cart(&user, food_a, 1).await;

    let placed = app.place(&user, "card", None).await;
    let order_id = placed.data()["orderId"].as_i64().expect("order id");

    // The customer never finished the hosted page.
    let claimed = app
        .post(
            "/api/order/verify-payment",
            &user,
            json!({ "orderId": order_id, "success": true }),
        )
        .await;
    assert_eq!(claimed.status, StatusCode::BAD_REQUEST);
    assert_eq!(claimed.code(), "payment_failed");

    let order = app.get(&format!("/api/order/{order_id}"), &user).await;
    assert_eq!(order.data()["status"], json!("pending"));
    assert_eq!(order.data()["paymentConfirmed"], json!(false));

    app.gateway.complete_payment(order_id);
    let verified = app
        .post(
            "/api/order/verify-payment",
            &user,
            json!({ "orderId": order_id, "success": true }),
        )
        .await;
    assert_eq!(verified.status, StatusCode::OK, "{:?}", verified.body);
    assert_eq!(verified.data()["status"], json!("confirmed"));

    // A late failure report for a paid order is refused and sends nothing.
    let late = app
        .post(
            "/api/order/verify-payment",
            &user,
            json!({ "orderId": order_id, "success": false }),
        )
        .await;
    assert_eq!(late.status, StatusCode::CONFLICT);
    let feed = app.get("/api/notifications", &user).await;
    let titles: Vec<&str> = feed
        .data()
        .as_array()
        .expect("feed")
        .iter()
        .filter_map(|n| n["title"].as_str())
        .collect();
    assert!(!titles.contains(&"Payment Failed"), "{titles:?}");
}

#[tokio::test]
async fn cash_orders_cannot_report_card_payments() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let user = app.customer("diner@example.com").await;
    let food_a = app.food(&admin, "Masala Dosa", "100").await;
    app.add_to_cart(&user, food_a, 1).await;

    let placed = app.place(&user, "cash_on_delivery", None).await;
    let order_id = placed.data()["orderId"].as_i64().expect("order id");

    let reported = app
        .post(
            "/api/order/verify-payment",
            &user,
            json!({ "orderId": order_id, "success": true }),
        )
        .await;
    assert_eq!(reported.status, StatusCode::CONFLICT);
    assert_eq!(reported.code(), "invalid_state");
}

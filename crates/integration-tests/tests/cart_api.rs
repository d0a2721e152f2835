//! Cart endpoints through the full router.

use axum::http::{Method, StatusCode};
use cravecart_integration_tests::{TestApp, dec, money};
use serde_json::json;

#[tokio::test]
async fn health_endpoints_answer() {
    let app = TestApp::new();

    let live = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(live.status, StatusCode::OK);
    let ready = app.request(Method::GET, "/health/ready", None, None).await;
    assert_eq!(ready.status, StatusCode::OK);

    let missing = app
        .request(Method::GET, "/api/nothing-here", None, None)
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cart_requires_a_token() {
    let app = TestApp::new();

    let response = app.request(Method::GET, "/api/cart", None, None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["success"], json!(false));
    assert_eq!(response.code(), "unauthorized");

    let response = app.get("/api/cart", "not-a-jwt").await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn adding_accumulates_and_defaults_to_one() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let user = app.customer("diner@example.com").await;
    let biryani = app.food(&admin, "Biryani", "100").await;

    let first = app
        .post("/api/cart/add", &user, json!({ "foodId": biryani }))
        .await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.data()["quantity"], json!(1));

    let second = app.add_to_cart(&user, biryani, 2).await;
    assert_eq!(second.data()["quantity"], json!(3));
    assert_eq!(second.data()["itemCount"], json!(1));
    assert_eq!(money(&second.data()["cartTotal"]), dec("300"));
}

#[tokio::test]
async fn non_positive_quantities_are_rejected() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let user = app.customer("diner@example.com").await;
    let dosa = app.food(&admin, "Dosa", "60").await;

    for quantity in [0, -2] {
        let response = app.add_to_cart(&user, dosa, quantity).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.code(), "invalid_input");
    }
}

#[tokio::test]
async fn unknown_and_unavailable_dishes_cannot_be_added() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let user = app.customer("diner@example.com").await;
    let idli = app.food(&admin, "Idli", "40").await;

    let missing = app.add_to_cart(&user, 9_999, 1).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);

    let hidden = app
        .put(
            &format!("/api/food/{idli}"),
            &admin,
            json!({ "available": false }),
        )
        .await;
    assert_eq!(hidden.status, StatusCode::OK);

    let response = app.add_to_cart(&user, idli, 1).await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.code(), "unavailable");
}

#[tokio::test]
async fn set_quantity_and_remove() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let user = app.customer("diner@example.com").await;
    let naan = app.food(&admin, "Naan", "30").await;
    let dal = app.food(&admin, "Dal", "90").await;
    app.add_to_cart(&user, naan, 2).await;
    app.add_to_cart(&user, dal, 1).await;

    let updated = app
        .put(&format!("/api/cart/{naan}"), &user, json!({ "quantity": 5 }))
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(money(&updated.data()["subtotal"]), dec("240"));

    // Zero removes the line.
    let updated = app
        .put(&format!("/api/cart/{naan}"), &user, json!({ "quantity": 0 }))
        .await;
    assert_eq!(updated.data()["itemCount"], json!(1));

    let removed = app
        .post("/api/cart/remove", &user, json!({ "foodId": dal }))
        .await;
    assert_eq!(removed.status, StatusCode::OK);
    assert_eq!(removed.data()["itemCount"], json!(0));

    let again = app
        .post("/api/cart/remove", &user, json!({ "foodId": dal }))
        .await;
    assert_eq!(again.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn summary_prices_the_cart() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let user = app.customer("diner@example.com").await;
    let thali = app.food(&admin, "Thali", "100").await;
    app.add_to_cart(&user, thali, 2).await;

    let summary = app.get("/api/cart/summary", &user).await;
    assert_eq!(summary.status, StatusCode::OK);
    let data = summary.data();
    assert_eq!(money(&data["subtotal"]), dec("200"));
    assert_eq!(money(&data["tax"]), dec("10"));
    assert_eq!(money(&data["deliveryFee"]), dec("50"));
    assert_eq!(money(&data["total"]), dec("260"));

    let cleared = app.delete("/api/cart", &user).await;
    assert_eq!(cleared.status, StatusCode::OK);
    let summary = app.get("/api/cart/summary", &user).await;
    assert_eq!(money(&summary.data()["total"]), dec("0"));
}

#[tokio::test]
async fn carts_are_per_user() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let alice = app.customer("alice@example.com").await;
    let bob = app.customer("bob@example.com").await;
    let vada = app.food(&admin, "Vada", "25").await;

    app.add_to_cart(&alice, vada, 4).await;

    let bobs = app.get("/api/cart", &bob).await;
    assert_eq!(bobs.data()["itemCount"], json!(0));
    let alices = app.get("/api/cart", &alice).await;
    assert_eq!(alices.data()["items"][0]["quantity"], json!(4));
}

#[tokio::test]
async fn dishes_need_a_positive_price_in_cents() {
    let app = TestApp::new();
    let admin = app.admin().await;

    for price in ["0", "-5", "10.005"] {
        let response = app
            .post(
                "/api/food",
                &admin,
                json!({
                    "name": "Free Lunch",
                    "description": "Too good to be true",
                    "price": price,
                    "category": "Mains",
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "price {price}");
    }

    let chai = app.food(&admin, "Chai", "15.50").await;
    let zeroed = app
        .put(&format!("/api/food/{chai}"), &admin, json!({ "price": "0" }))
        .await;
    assert_eq!(zeroed.status, StatusCode::BAD_REQUEST);

    let listed = app
        .request(Method::GET, &format!("/api/food/{chai}"), None, None)
        .await;
    assert_eq!(money(&listed.data()["price"]), dec("15.50"));
}

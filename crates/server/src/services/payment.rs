//! Payment gateway hand-off.
//!
//! Card orders are paid on a hosted checkout page. The order workflow only
//! sees the [`PaymentGateway`] trait; [`StripeCheckout`] implements it over
//! the Stripe Checkout Sessions form API with `reqwest`.
//!
//! The gateway redirects the customer back to the web client, which reports
//! the outcome through `POST /api/order/verify-payment`. A reported success is
//! only trusted once [`PaymentGateway::session_paid`] agrees.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;
use url::Url;

use cravecart_core::{Money, MoneyError, OrderId, UserId};

use crate::config::PaymentConfig;
use crate::models::Order;

/// Errors talking to the payment gateway.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Gateway answered with a non-success status.
    #[error("gateway rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Gateway did not answer in time.
    #[error("gateway timed out")]
    Timeout,

    /// Response had no checkout URL.
    #[error("gateway returned no checkout URL")]
    MissingUrl,

    /// An amount could not be expressed in minor units.
    #[error("invalid amount: {0}")]
    Amount(#[from] MoneyError),
}

/// One priced component of a checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutLine {
    pub name: String,
    pub description: Option<String>,
    pub unit_amount: Money,
    pub quantity: u32,
}

/// What the gateway needs to build a hosted checkout page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub order_id: OrderId,
    pub user_id: UserId,
    /// Dishes, one line per order line.
    pub lines: Vec<CheckoutLine>,
    pub tax: Money,
    pub delivery_fee: Money,
    pub discount: Money,
    /// What the customer pays; equals lines + tax + delivery fee - discount.
    pub total: Money,
    pub success_url: Url,
    pub cancel_url: Url,
}

impl CheckoutRequest {
    /// Build a request for `order`, redirecting back to `client_url`.
    #[must_use]
    pub fn for_order(order: &Order, client_url: &Url) -> Self {
        let lines = order
            .items
            .iter()
            .map(|item| CheckoutLine {
                name: item.name.clone(),
                description: Some(item.category.clone()).filter(|c| !c.is_empty()),
                unit_amount: item.unit_price,
                quantity: item.quantity,
            })
            .collect();

        Self {
            order_id: order.id,
            user_id: order.user_id,
            lines,
            tax: order.tax,
            delivery_fee: order.delivery_fee,
            discount: order.discount,
            total: order.amount,
            success_url: verify_url(client_url, true, order.id),
            cancel_url: verify_url(client_url, false, order.id),
        }
    }
}

/// `{client_url}/verify?success=…&orderId=…`, keeping any path prefix of
/// the client URL.
#[must_use]
pub fn verify_url(client_url: &Url, success: bool, order_id: OrderId) -> Url {
    let mut url = client_url.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push("verify");
    }
    url.query_pairs_mut()
        .clear()
        .append_pair("success", if success { "true" } else { "false" })
        .append_pair("orderId", &order_id.to_string());
    url
}

/// A created hosted checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// External payment collaborator.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a hosted checkout page for an order.
    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError>;

    /// Whether the customer completed payment for a session.
    async fn session_paid(&self, session_id: &str) -> Result<bool, PaymentError>;
}

// =============================================================================
// Stripe Checkout
// =============================================================================

/// [`PaymentGateway`] backed by Stripe Checkout Sessions.
#[derive(Clone)]
pub struct StripeCheckout {
    inner: Arc<StripeCheckoutInner>,
}

struct StripeCheckoutInner {
    client: reqwest::Client,
    endpoint: Url,
    secret_key: SecretString,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl StripeCheckout {
    /// Create a client from payment configuration.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Http` if the HTTP client cannot be built.
    pub fn new(config: &PaymentConfig) -> Result<Self, PaymentError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        let mut endpoint = config.api_base.clone();
        endpoint.set_path("/v1/checkout/sessions");

        Ok(Self {
            inner: Arc::new(StripeCheckoutInner {
                client,
                endpoint,
                secret_key: config.secret_key.clone(),
                currency: config.currency.clone(),
            }),
        })
    }
}

/// Form fields for a Checkout Session.
///
/// Stripe does not accept negative line items, so a discounted order is sent
/// as a single line for the total. Otherwise dishes, tax and delivery fee are
/// separate lines.
fn session_form(
    request: &CheckoutRequest,
    currency: &str,
) -> Result<Vec<(String, String)>, PaymentError> {
    let mut lines: Vec<CheckoutLine> = Vec::new();
    if request.discount.is_zero() {
        lines.extend(request.lines.iter().cloned());
        lines.push(CheckoutLine {
            name: "Tax (5%)".to_string(),
            description: None,
            unit_amount: request.tax,
            quantity: 1,
        });
        lines.push(CheckoutLine {
            name: "Delivery Fee".to_string(),
            description: None,
            unit_amount: request.delivery_fee,
            quantity: 1,
        });
    } else {
        lines.push(CheckoutLine {
            name: format!("CraveCart order #{}", request.order_id),
            description: Some(format!(
                "Includes tax, delivery fee and a discount of {}",
                request.discount
            )),
            unit_amount: request.total,
            quantity: 1,
        });
    }

    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        ("success_url".to_string(), request.success_url.to_string()),
        ("cancel_url".to_string(), request.cancel_url.to_string()),
        ("metadata[orderId]".to_string(), request.order_id.to_string()),
        ("metadata[userId]".to_string(), request.user_id.to_string()),
    ];
    for (i, line) in lines.iter().enumerate() {
        let prefix = format!("line_items[{i}]");
        form.push((
            format!("{prefix}[price_data][currency]"),
            currency.to_string(),
        ));
        form.push((
            format!("{prefix}[price_data][product_data][name]"),
            line.name.clone(),
        ));
        if let Some(description) = &line.description {
            form.push((
                format!("{prefix}[price_data][product_data][description]"),
                description.clone(),
            ));
        }
        form.push((
            format!("{prefix}[price_data][unit_amount]"),
            line.unit_amount.to_minor_units()?.to_string(),
        ));
        form.push((format!("{prefix}[quantity]"), line.quantity.to_string()));
    }
    Ok(form)
}

#[async_trait]
impl PaymentGateway for StripeCheckout {
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let form = session_form(request, &self.inner.currency)?;

        let response = self
            .inner
            .client
            .post(self.inner.endpoint.clone())
            .bearer_auth(self.inner.secret_key.expose_secret())
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PaymentError::Timeout
                } else {
                    PaymentError::Http(e)
                }
            })?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body).map_or_else(
                |_| body.chars().take(200).collect::<String>(),
                |e| e.error.message,
            );
            tracing::error!(
                status = %status,
                message = %message,
                "Payment gateway rejected checkout session"
            );
            return Err(PaymentError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let session = read_session(status, &body)?;
        let url = session.url.ok_or(PaymentError::MissingUrl)?;

        tracing::info!(session_id = %session.id, "Checkout session created");
        Ok(CheckoutSession {
            id: session.id,
            url,
        })
    }

    #[instrument(skip(self))]
    async fn session_paid(&self, session_id: &str) -> Result<bool, PaymentError> {
        let response = self
            .inner
            .client
            .get(session_url(&self.inner.endpoint, session_id))
            .bearer_auth(self.inner.secret_key.expose_secret())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PaymentError::Timeout
                } else {
                    PaymentError::Http(e)
                }
            })?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body).map_or_else(
                |_| body.chars().take(200).collect::<String>(),
                |e| e.error.message,
            );
            tracing::error!(
                status = %status,
                message = %message,
                "Payment gateway rejected session lookup"
            );
            return Err(PaymentError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let session = read_session(status, &body)?;
        let paid = session.payment_status.as_deref() == Some("paid");
        tracing::info!(session_id = %session.id, paid, "Checkout session looked up");
        Ok(paid)
    }
}

fn read_session(status: reqwest::StatusCode, body: &str) -> Result<SessionResponse, PaymentError> {
    serde_json::from_str(body).map_err(|e| PaymentError::Rejected {
        status: status.as_u16(),
        message: format!("unreadable response: {e}"),
    })
}

/// `{endpoint}/{session_id}`, with the id percent-encoded as one segment.
fn session_url(endpoint: &Url, session_id: &str) -> Url {
    let mut url = endpoint.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.push(session_id);
    }
    url
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn money(units: i64) -> Money {
        Money::new(Decimal::from(units))
    }

    fn request(discount: i64) -> CheckoutRequest {
        let client = Url::parse("http://localhost:5173").unwrap();
        CheckoutRequest {
            order_id: OrderId::new(42),
            user_id: UserId::new(7),
            lines: vec![CheckoutLine {
                name: "Paneer Tikka".to_string(),
                description: Some("Starters".to_string()),
                unit_amount: money(100),
                quantity: 2,
            }],
            tax: money(10),
            delivery_fee: money(50),
            discount: money(discount),
            total: money(260 - discount),
            success_url: verify_url(&client, true, OrderId::new(42)),
            cancel_url: verify_url(&client, false, OrderId::new(42)),
        }
    }

    fn field<'a>(form: &'a [(String, String)], key: &str) -> Option<&'a str> {
        form.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn redirect_urls_point_at_verify() {
        let client = Url::parse("https://cravecart.example").unwrap();
        let url = verify_url(&client, false, OrderId::new(9));
        assert_eq!(
            url.as_str(),
            "https://cravecart.example/verify?success=false&orderId=9"
        );
    }

    #[test]
    fn redirect_urls_keep_the_client_path() {
        for base in ["https://cravecart.example/app", "https://cravecart.example/app/"] {
            let client = Url::parse(base).unwrap();
            let url = verify_url(&client, true, OrderId::new(3));
            assert_eq!(
                url.as_str(),
                "https://cravecart.example/app/verify?success=true&orderId=3"
            );
        }
    }

    #[test]
    fn session_lookup_url_appends_the_id() {
        let endpoint = Url::parse("https://api.stripe.com/v1/checkout/sessions").unwrap();
        assert_eq!(
            session_url(&endpoint, "cs_test_a1").as_str(),
            "https://api.stripe.com/v1/checkout/sessions/cs_test_a1"
        );
        assert_eq!(
            session_url(&endpoint, "cs/1").as_str(),
            "https://api.stripe.com/v1/checkout/sessions/cs%2F1"
        );
    }

    #[test]
    fn only_paid_sessions_count() {
        let ok = reqwest::StatusCode::OK;
        let paid = read_session(ok, r#"{"id":"cs_1","url":null,"payment_status":"paid"}"#).unwrap();
        assert_eq!(paid.payment_status.as_deref(), Some("paid"));
        let open = read_session(ok, r#"{"id":"cs_2","payment_status":"unpaid"}"#).unwrap();
        assert_ne!(open.payment_status.as_deref(), Some("paid"));
        assert!(read_session(ok, "not json").is_err());
    }

    #[test]
    fn undiscounted_orders_are_itemized() {
        let form = session_form(&request(0), "usd").unwrap();
        assert_eq!(field(&form, "mode"), Some("payment"));
        assert_eq!(field(&form, "metadata[orderId]"), Some("42"));
        assert_eq!(
            field(&form, "line_items[0][price_data][unit_amount]"),
            Some("10000")
        );
        assert_eq!(field(&form, "line_items[0][quantity]"), Some("2"));
        assert_eq!(
            field(&form, "line_items[1][price_data][product_data][name]"),
            Some("Tax (5%)")
        );
        assert_eq!(
            field(&form, "line_items[2][price_data][unit_amount]"),
            Some("5000")
        );
        assert_eq!(field(&form, "line_items[3][quantity]"), None);
    }

    #[test]
    fn discounted_orders_are_one_line_for_the_total() {
        let form = session_form(&request(50), "inr").unwrap();
        assert_eq!(
            field(&form, "line_items[0][price_data][currency]"),
            Some("inr")
        );
        assert_eq!(
            field(&form, "line_items[0][price_data][unit_amount]"),
            Some("21000")
        );
        assert_eq!(field(&form, "line_items[1][quantity]"), None);
    }
}

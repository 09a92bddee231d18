//! Checkout-session client for the payment processor.

use async_trait::async_trait;
use derive_more::From;
use serde::Deserialize;

use crate::{config, workflow};

const API_URL: &str = "https://api.stripe.com/v1/checkout/sessions";

const PRODUCT_NAME: &str = "TicketSolver Legal Service";

/// Fixed service fee, in cents.
pub const SERVICE_FEE_CENTS: u32 = 9999;

pub struct Client {
    http: reqwest::Client,
    secret_key: String,
    success_url: String,
    cancel_url: String,
}

impl Client {
    pub fn new(config: config::Payment) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key: config.secret_key,
            success_url: config.success_url,
            cancel_url: config.cancel_url,
        }
    }

    /// Creates a single-use checkout session and returns its redirect URL.
    ///
    /// No idempotency key is sent: a retried call creates a new distinct
    /// session.
    pub async fn create_checkout_session(
        &self,
        email: Option<&str>,
    ) -> Result<String, Error> {
        let res = self
            .http
            .post(API_URL)
            .bearer_auth(&self.secret_key)
            .form(&self.session_params(email))
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(Error::Api {
                status: res.status().as_u16(),
            });
        }

        res.json::<Session>().await?.url.ok_or(Error::NoRedirectUrl)
    }

    fn session_params(
        &self,
        email: Option<&str>,
    ) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("mode", "payment".to_owned()),
            ("payment_method_types[0]", "card".to_owned()),
            ("line_items[0][price_data][currency]", "usd".to_owned()),
            (
                "line_items[0][price_data][product_data][name]",
                PRODUCT_NAME.to_owned(),
            ),
            (
                "line_items[0][price_data][unit_amount]",
                SERVICE_FEE_CENTS.to_string(),
            ),
            ("line_items[0][quantity]", "1".to_owned()),
            ("success_url", self.success_url.clone()),
            ("cancel_url", self.cancel_url.clone()),
        ];
        if let Some(email) = email {
            params.push(("customer_email", email.to_owned()));
        }
        params
    }
}

#[async_trait]
impl workflow::PaymentGateway for Client {
    async fn create_checkout_session(
        &self,
        email: Option<&str>,
    ) -> Result<String, Error> {
        Client::create_checkout_session(self, email).await
    }
}

#[derive(Deserialize)]
struct Session {
    url: Option<String>,
}

#[derive(Debug, From)]
pub enum Error {
    #[from]
    Http(reqwest::Error),
    Api {
        status: u16,
    },
    /// The processor created a session but returned no redirect URL.
    NoRedirectUrl,
}

#[cfg(test)]
mod tests {
    use super::Client;
    use crate::config;

    fn client() -> Client {
        Client::new(config::Payment {
            secret_key: "sk_test".to_owned(),
            success_url: "https://example.com/success".to_owned(),
            cancel_url: "https://example.com/".to_owned(),
        })
    }

    #[test]
    fn charges_the_fixed_fee_for_one_item() {
        let params = client().session_params(None);
        assert!(params.contains(&(
            "line_items[0][price_data][unit_amount]",
            "9999".to_owned()
        )));
        assert!(params.contains(&("line_items[0][quantity]", "1".to_owned())));
        assert!(params.contains(&("mode", "payment".to_owned())));
        assert!(!params.iter().any(|(k, _)| *k == "customer_email"));
    }

    #[test]
    fn prefills_the_customer_email_when_given() {
        let params = client().session_params(Some("a@x.com"));
        assert!(params.contains(&("customer_email", "a@x.com".to_owned())));
    }
}

//! Stripe-compatible payment confirmation over REST.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::instrument;

use atelier_core::PaymentIntentStatus;

use super::{ConfirmOptions, PaymentError, PaymentIntent, PaymentProcessor, intent_id};
use crate::config::PaymentConfig;

const USER_AGENT_VALUE: &str = concat!("atelier-storefront/", env!("CARGO_PKG_VERSION"));

const TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct IntentResponse {
    id: String,
    status: PaymentIntentStatus,
    next_action: Option<NextAction>,
}

#[derive(Deserialize)]
struct NextAction {
    redirect_to_url: Option<RedirectToUrl>,
}

#[derive(Deserialize)]
struct RedirectToUrl {
    url: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ProcessorError,
}

#[derive(Deserialize)]
struct ProcessorError {
    code: Option<String>,
    decline_code: Option<String>,
    message: Option<String>,
}

/// Confirms payment intents with a Stripe-compatible API.
#[derive(Clone)]
pub struct StripeClient {
    inner: Arc<StripeClientInner>,
}

struct StripeClientInner {
    client: reqwest::Client,
    api_url: String,
    publishable_key: SecretString,
}

impl StripeClient {
    /// Create a client from payment configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::NotConfigured`] without a publishable key,
    /// or an HTTP error if the client cannot be built.
    pub fn new(config: &PaymentConfig) -> Result<Self, PaymentError> {
        let publishable_key = config
            .publishable_key
            .clone()
            .ok_or(PaymentError::NotConfigured)?;

        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let client = reqwest::Client::builder()
            .timeout(TIMEOUT)
            .default_headers(default_headers)
            .build()?;

        Ok(Self {
            inner: Arc::new(StripeClientInner {
                client,
                api_url: config.api_url.trim_end_matches('/').to_string(),
                publishable_key,
            }),
        })
    }
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    #[instrument(skip(self, client_secret, options))]
    async fn confirm_payment(
        &self,
        client_secret: &str,
        options: &ConfirmOptions,
    ) -> Result<PaymentIntent, PaymentError> {
        let id = intent_id(client_secret)?;
        let url = format!("{}/v1/payment_intents/{id}/confirm", self.inner.api_url);

        let mut form = vec![
            ("key", self.inner.publishable_key.expose_secret().to_string()),
            ("client_secret", client_secret.to_string()),
        ];
        if let Some(return_url) = &options.return_url {
            form.push(("return_url", return_url.clone()));
        }
        if let Some(payment_method) = &options.payment_method {
            form.push(("payment_method", payment_method.clone()));
        }

        let response = self.inner.client.post(&url).form(&form).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let error = serde_json::from_str::<ErrorEnvelope>(&text)
                .map_err(|e| PaymentError::Parse(e.to_string()))?
                .error;
            tracing::warn!(
                status = status.as_u16(),
                code = ?error.code,
                decline_code = ?error.decline_code,
                "Payment confirmation rejected"
            );
            return Err(PaymentError::Declined {
                code: error.decline_code.or(error.code),
                message: error
                    .message
                    .unwrap_or_else(|| "Your payment could not be processed.".to_string()),
            });
        }

        let intent: IntentResponse =
            serde_json::from_str(&text).map_err(|e| PaymentError::Parse(e.to_string()))?;
        tracing::info!(payment_intent = %intent.id, status = %intent.status, "Payment confirmed");

        Ok(PaymentIntent {
            id: intent.id,
            status: intent.status,
            next_action_url: intent
                .next_action
                .and_then(|action| action.redirect_to_url)
                .and_then(|redirect| redirect.url),
        })
    }
}

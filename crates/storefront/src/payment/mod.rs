//! Payment processor integration.
//!
//! The backend creates a payment session holding a processor client
//! secret; the client then confirms the payment directly with the
//! processor using its publishable key. [`PaymentProcessor`] is that
//! confirmation step; [`StripeClient`] implements it over REST.
//!
//! Processor errors are surfaced verbatim and never retried.

mod stripe;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use atelier_core::PaymentIntentStatus;

pub use stripe::StripeClient;

/// Errors from the payment processor.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Transport failure talking to the processor.
    #[error("Payment HTTP error: {0}")]
    Http(String),

    /// The processor refused the payment.
    #[error("{message}")]
    Declined {
        code: Option<String>,
        message: String,
    },

    /// The payment session carried no usable client secret.
    #[error("Invalid payment client secret")]
    InvalidClientSecret,

    /// No publishable key is configured for the processor.
    #[error("Payment processor not configured")]
    NotConfigured,

    /// Processor response could not be decoded.
    #[error("Payment response parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for PaymentError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Http(err.to_string())
        }
    }
}

/// Options passed along with a confirmation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfirmOptions {
    /// Where the processor sends the customer after an off-site step.
    pub return_url: Option<String>,
    /// Saved or freshly tokenized payment method.
    pub payment_method: Option<String>,
}

/// Processor view of a payment after confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub status: PaymentIntentStatus,
    /// Redirect for an additional customer step (3-D Secure, bank redirect).
    #[serde(default)]
    pub next_action_url: Option<String>,
}

/// Confirms payments with the processor.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Confirm the payment identified by `client_secret`.
    async fn confirm_payment(
        &self,
        client_secret: &str,
        options: &ConfirmOptions,
    ) -> Result<PaymentIntent, PaymentError>;
}

/// Extract the payment intent ID from a client secret
/// (`pi_123_secret_abc` → `pi_123`).
///
/// # Errors
///
/// Returns [`PaymentError::InvalidClientSecret`] if the secret has no
/// `_secret_` separator or an empty ID.
pub fn intent_id(client_secret: &str) -> Result<&str, PaymentError> {
    match client_secret.split_once("_secret_") {
        Some((id, secret)) if !id.is_empty() && !secret.is_empty() => Ok(id),
        _ => Err(PaymentError::InvalidClientSecret),
    }
}

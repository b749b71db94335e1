//! Unified error handling with Sentry integration.
//!
//! Every service operation returns `Result<T, StorefrontError>`.
//! [`StorefrontError::user_message`] is the inline string shown next to the
//! control that triggered the operation; it never leaks internal details.
//! [`StorefrontError::report`] sends server-class failures to Sentry.

use thiserror::Error;

use crate::backend::BackendError;
use crate::config::ConfigError;
use crate::payment::PaymentError;
use crate::services::CheckoutError;
use crate::storage::StorageError;

/// Application-level error type for the storefront client.
#[derive(Debug, Error)]
pub enum StorefrontError {
    /// Commerce backend request failed.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Payment processor rejected or failed the payment.
    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    /// Local persistence failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Checkout precondition failed.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Caller supplied invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl StorefrontError {
    /// Whether this is a server-class failure worth reporting.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        match self {
            Self::Backend(err) => match err {
                BackendError::Api { status, .. } => *status >= 500,
                BackendError::InvalidResponse(_) | BackendError::InvalidRequest(_) => true,
                _ => false,
            },
            Self::Storage(_) | Self::Config(_) => true,
            Self::Payment(err) => {
                matches!(err, PaymentError::Parse(_) | PaymentError::NotConfigured)
            }
            Self::Checkout(_) | Self::InvalidInput(_) => false,
        }
    }

    /// Whether the backend rejected the bearer token.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Backend(BackendError::Unauthorized))
    }

    /// Message suitable for inline display.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Backend(err) => match err {
                BackendError::Network { .. } => {
                    "Unable to reach the store. Please check your connection and try again."
                        .to_string()
                }
                BackendError::Unauthorized => "Please sign in to continue.".to_string(),
                BackendError::NotFound(_) => "This item is no longer available.".to_string(),
                BackendError::RateLimited(_) => {
                    "Too many requests. Please wait a moment and try again.".to_string()
                }
                BackendError::Api { status, message } if *status < 500 && !message.is_empty() => {
                    message.clone()
                }
                BackendError::Api { .. } => {
                    "The store is temporarily unavailable. Please try again shortly.".to_string()
                }
                BackendError::InvalidResponse(_) | BackendError::InvalidRequest(_) => {
                    "Something went wrong. Please try again.".to_string()
                }
            },
            Self::Payment(err) => match err {
                PaymentError::Declined { message, .. } => message.clone(),
                PaymentError::InvalidClientSecret | PaymentError::NotConfigured => {
                    "Payment could not be started. Please try again.".to_string()
                }
                PaymentError::Http(_) | PaymentError::Parse(_) => {
                    "The payment service is unavailable. Please try again.".to_string()
                }
            },
            Self::Checkout(err) => err.to_string(),
            Self::Storage(_) => "Your changes could not be saved on this device.".to_string(),
            Self::InvalidInput(message) => message.clone(),
            Self::Config(_) => "Something went wrong. Please try again.".to_string(),
        }
    }

    /// Log the error and capture server-class failures to Sentry.
    pub fn report(&self) {
        if self.is_server_error() {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Storefront operation failed"
            );
        } else {
            tracing::warn!(error = %self, "Storefront operation rejected");
        }
    }
}

/// Result type alias for `StorefrontError`.
pub type Result<T> = std::result::Result<T, StorefrontError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added line item", Some(&[("variant_id", "variant_123")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

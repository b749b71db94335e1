//! Status enums shared between the checkout flow and the payment processor.

use serde::{Deserialize, Serialize};

/// Payment intent status as reported by the payment processor.
///
/// Wire values are `snake_case` (`"requires_action"`). Unknown values from a
/// newer processor API deserialize to [`PaymentIntentStatus::Unknown`]
/// instead of failing the whole response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentIntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    #[serde(other)]
    Unknown,
}

impl PaymentIntentStatus {
    /// Whether the payment is far enough along for the order to be placed.
    ///
    /// `requires_capture` covers manual-capture setups and `processing`
    /// covers asynchronous methods (bank debits) that settle later.
    #[must_use]
    pub const fn allows_order_completion(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::RequiresCapture | Self::Processing
        )
    }
}

impl std::fmt::Display for PaymentIntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::RequiresPaymentMethod => "requires_payment_method",
            Self::RequiresConfirmation => "requires_confirmation",
            Self::RequiresAction => "requires_action",
            Self::Processing => "processing",
            Self::RequiresCapture => "requires_capture",
            Self::Canceled => "canceled",
            Self::Succeeded => "succeeded",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Steps of the checkout flow, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStep {
    #[default]
    Address,
    Delivery,
    Payment,
    Review,
}

impl CheckoutStep {
    /// The step after this one, or `None` from `Review`.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Address => Some(Self::Delivery),
            Self::Delivery => Some(Self::Payment),
            Self::Payment => Some(Self::Review),
            Self::Review => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_status_wire_format() {
        let status: PaymentIntentStatus = serde_json::from_str("\"requires_action\"").unwrap();
        assert_eq!(status, PaymentIntentStatus::RequiresAction);
        assert_eq!(status.to_string(), "requires_action");

        let unknown: PaymentIntentStatus = serde_json::from_str("\"brand_new\"").unwrap();
        assert_eq!(unknown, PaymentIntentStatus::Unknown);
    }

    #[test]
    fn test_allows_order_completion() {
        assert!(PaymentIntentStatus::Succeeded.allows_order_completion());
        assert!(PaymentIntentStatus::RequiresCapture.allows_order_completion());
        assert!(PaymentIntentStatus::Processing.allows_order_completion());
        assert!(!PaymentIntentStatus::RequiresAction.allows_order_completion());
        assert!(!PaymentIntentStatus::Canceled.allows_order_completion());
    }

    #[test]
    fn test_checkout_step_order() {
        assert_eq!(CheckoutStep::Address.next(), Some(CheckoutStep::Delivery));
        assert_eq!(CheckoutStep::Review.next(), None);
        assert!(CheckoutStep::Address < CheckoutStep::Review);
    }
}

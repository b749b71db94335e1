//! Checkout flow and order placement.
//!
//! # Flow
//!
//! 1. Address - email and shipping address on the cart
//! 2. Delivery - a shipping method selected
//! 3. Payment - a payment session is initiated and confirmed with the
//!    processor
//! 4. Review - the cart is completed into an order
//!
//! Order placement is single-flight: a second call while one is running
//! fails with [`CheckoutError::AlreadySubmitting`]. Payment failures are
//! surfaced as-is and never retried.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::instrument;

use atelier_core::{CheckoutStep, PaymentIntentStatus};

use super::action::{ActionState, ActionStatus};
use super::cart::CartService;
use crate::backend::{Cart, CartCompletion, CommerceApi, Order, PaymentCollection};
use crate::error::{Result, StorefrontError, add_breadcrumb};
use crate::payment::{ConfirmOptions, PaymentError, PaymentProcessor};

/// Checkout precondition failures.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Your order is already being placed.")]
    AlreadySubmitting,

    #[error("Your bag is empty.")]
    EmptyCart,

    #[error("There is no active bag.")]
    NoCart,

    #[error("Please complete the {0:?} step first.")]
    StepIncomplete(CheckoutStep),

    #[error("Payment could not be started for this order.")]
    MissingPaymentSession,

    #[error("Payment was not completed (status: {status}).")]
    PaymentIncomplete { status: PaymentIntentStatus },

    #[error("{0}")]
    CompletionFailed(String),
}

/// Result of placing an order.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderOutcome {
    /// The cart became an order.
    Placed(Order),
    /// The customer must finish an off-site payment step, then call
    /// [`CheckoutService::complete_order`].
    RedirectRequired { url: String, payment_intent: String },
}

/// Step tracker for the checkout UI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckoutFlow {
    step: CheckoutStep,
}

impl CheckoutFlow {
    #[must_use]
    pub const fn step(&self) -> CheckoutStep {
        self.step
    }

    /// Whether `cart` satisfies everything `step` requires before moving on.
    #[must_use]
    pub fn is_complete(step: CheckoutStep, cart: &Cart) -> bool {
        match step {
            CheckoutStep::Address => cart.email.is_some() && cart.shipping_address.is_some(),
            CheckoutStep::Delivery => !cart.shipping_methods.is_empty(),
            CheckoutStep::Payment | CheckoutStep::Review => true,
        }
    }

    /// Move to the next step if the current one is complete.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::StepIncomplete`] if the current step's
    /// requirements are not met, or [`CheckoutError::EmptyCart`].
    pub fn advance(&mut self, cart: &Cart) -> std::result::Result<CheckoutStep, CheckoutError> {
        if cart.items.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        if !Self::is_complete(self.step, cart) {
            return Err(CheckoutError::StepIncomplete(self.step));
        }
        if let Some(next) = self.step.next() {
            self.step = next;
        }
        Ok(self.step)
    }

    /// Jump back to an earlier step. Moving forward must go through
    /// [`Self::advance`].
    pub fn go_back_to(&mut self, step: CheckoutStep) {
        if step < self.step {
            self.step = step;
        }
    }
}

/// Order placement. Cheap to clone.
#[derive(Clone)]
pub struct CheckoutService {
    inner: Arc<CheckoutServiceInner>,
}

struct CheckoutServiceInner {
    api: Arc<dyn CommerceApi>,
    payments: Option<Arc<dyn PaymentProcessor>>,
    cart: CartService,
    submitting: AtomicBool,
    action: ActionState,
}

/// Clears the submission flag when dropped.
struct SubmissionGuard<'a>(&'a AtomicBool);

impl Drop for SubmissionGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl CheckoutService {
    #[must_use]
    pub fn new(
        api: Arc<dyn CommerceApi>,
        payments: Option<Arc<dyn PaymentProcessor>>,
        cart: CartService,
    ) -> Self {
        Self {
            inner: Arc::new(CheckoutServiceInner {
                api,
                payments,
                cart,
                submitting: AtomicBool::new(false),
                action: ActionState::default(),
            }),
        }
    }

    #[must_use]
    pub fn status(&self) -> ActionStatus {
        self.inner.action.status()
    }

    /// Whether an order submission is in flight.
    #[must_use]
    pub fn is_submitting(&self) -> bool {
        self.inner.submitting.load(Ordering::Acquire)
    }

    /// Pay for and place the active cart.
    ///
    /// Initiates a payment session with `provider_id`, confirms it with the
    /// processor when the session carries a client secret, and completes
    /// the cart once the payment allows it.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::AlreadySubmitting`] if a placement is in
    /// flight, a payment error (verbatim) if the processor refuses, or a
    /// backend error.
    #[instrument(skip(self))]
    pub async fn place_order(
        &self,
        provider_id: &str,
        return_url: Option<&str>,
    ) -> Result<OrderOutcome> {
        let _guard = self.begin_submission()?;

        self.inner
            .action
            .track(async {
                let cart = self
                    .inner
                    .cart
                    .current()
                    .await?
                    .ok_or(CheckoutError::NoCart)?;
                if cart.items.is_empty() {
                    return Err(CheckoutError::EmptyCart.into());
                }
                add_breadcrumb(
                    "checkout",
                    "Placing order",
                    Some(&[("cart_id", cart.id.as_str())]),
                );

                let collection = self.payment_collection(&cart).await?;
                let collection = self
                    .inner
                    .api
                    .initiate_payment_session(&collection.id, provider_id)
                    .await?;
                let session = collection
                    .payment_sessions
                    .iter()
                    .find(|session| session.provider_id == provider_id)
                    .ok_or(CheckoutError::MissingPaymentSession)?;

                if let Some(client_secret) = session.client_secret() {
                    let payments = self
                        .inner
                        .payments
                        .as_ref()
                        .ok_or(PaymentError::NotConfigured)?;
                    let options = ConfirmOptions {
                        return_url: return_url.map(String::from),
                        payment_method: None,
                    };
                    let intent = payments.confirm_payment(client_secret, &options).await?;
                    tracing::info!(
                        cart_id = %cart.id,
                        payment_intent = %intent.id,
                        status = %intent.status,
                        "Payment confirmed"
                    );

                    if !intent.status.allows_order_completion() {
                        return match (intent.status, intent.next_action_url) {
                            (PaymentIntentStatus::RequiresAction, Some(url)) => {
                                Ok(OrderOutcome::RedirectRequired {
                                    url,
                                    payment_intent: intent.id,
                                })
                            }
                            (status, _) => {
                                Err(CheckoutError::PaymentIncomplete { status }.into())
                            }
                        };
                    }
                }

                self.complete(&cart).await.map(OrderOutcome::Placed)
            })
            .await
    }

    /// Complete the active cart after an off-site payment step.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::AlreadySubmitting`] if a placement is in
    /// flight, or the backend's completion error.
    #[instrument(skip(self))]
    pub async fn complete_order(&self) -> Result<Order> {
        let _guard = self.begin_submission()?;

        self.inner
            .action
            .track(async {
                let cart = self
                    .inner
                    .cart
                    .current()
                    .await?
                    .ok_or(CheckoutError::NoCart)?;
                self.complete(&cart).await
            })
            .await
    }

    fn begin_submission(&self) -> Result<SubmissionGuard<'_>> {
        if self.inner.submitting.swap(true, Ordering::AcqRel) {
            tracing::debug!("Order submission already in flight");
            return Err(CheckoutError::AlreadySubmitting.into());
        }
        Ok(SubmissionGuard(&self.inner.submitting))
    }

    async fn payment_collection(&self, cart: &Cart) -> Result<PaymentCollection> {
        if let Some(collection) = &cart.payment_collection {
            return Ok(collection.clone());
        }
        Ok(self.inner.api.create_payment_collection(&cart.id).await?)
    }

    async fn complete(&self, cart: &Cart) -> Result<Order> {
        match self.inner.api.complete_cart(&cart.id).await? {
            CartCompletion::Order { order } => {
                tracing::info!(cart_id = %cart.id, order_id = %order.id, "Order placed");
                add_breadcrumb(
                    "checkout",
                    "Order placed",
                    Some(&[("order_id", order.id.as_str())]),
                );
                self.inner.cart.forget().await;
                Ok(order)
            }
            CartCompletion::Cart { cart, error } => {
                let message = error.map_or_else(
                    || "Your order could not be completed.".to_string(),
                    |e| e.message,
                );
                tracing::warn!(cart_id = %cart.id, message = %message, "Cart completion failed");
                self.inner.cart.adopt(*cart).await;
                Err(StorefrontError::Checkout(CheckoutError::CompletionFailed(
                    message,
                )))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use atelier_core::VariantId;

    use super::*;
    use crate::payment::PaymentIntent;
    use crate::services::LineItemDraft;
    use crate::testing::{Harness, cart};

    const PROVIDER: &str = "pp_stripe_stripe";

    async fn harness_with_item() -> Harness {
        let harness = Harness::new();
        harness
            .cart_service()
            .add_item(LineItemDraft {
                variant_id: VariantId::new("variant_bag"),
                product_id: None,
                quantity: 1,
                title: "Quilted Bag".to_string(),
                thumbnail: None,
                unit_price: Decimal::from(2450),
            })
            .await
            .unwrap();
        harness
    }

    #[tokio::test]
    async fn test_successful_payment_places_order_and_forgets_cart() {
        let harness = harness_with_item().await;
        let checkout = harness.checkout_service();

        let outcome = checkout.place_order(PROVIDER, None).await.unwrap();

        assert!(matches!(outcome, OrderOutcome::Placed(_)));
        assert_eq!(harness.payments.calls(), 1);
        assert_eq!(harness.cart_service().cart_id(), None);
        assert!(!checkout.is_submitting());
    }

    #[tokio::test]
    async fn test_processing_and_requires_capture_complete_the_cart() {
        for status in [
            PaymentIntentStatus::Processing,
            PaymentIntentStatus::RequiresCapture,
        ] {
            let harness = harness_with_item().await;
            harness.payments.respond_with(Ok(PaymentIntent {
                id: "pi_1".to_string(),
                status,
                next_action_url: None,
            }));

            let outcome = harness
                .checkout_service()
                .place_order(PROVIDER, None)
                .await
                .unwrap();
            assert!(matches!(outcome, OrderOutcome::Placed(_)));
        }
    }

    #[tokio::test]
    async fn test_requires_action_returns_redirect() {
        let harness = harness_with_item().await;
        harness.payments.respond_with(Ok(PaymentIntent {
            id: "pi_3ds".to_string(),
            status: PaymentIntentStatus::RequiresAction,
            next_action_url: Some("https://bank.example/3ds".to_string()),
        }));
        let checkout = harness.checkout_service();

        let outcome = checkout
            .place_order(PROVIDER, Some("https://shop.example/checkout"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            OrderOutcome::RedirectRequired {
                url: "https://bank.example/3ds".to_string(),
                payment_intent: "pi_3ds".to_string(),
            }
        );
        assert_eq!(harness.api.calls("complete_cart"), 0);
        assert!(harness.cart_service().cart_id().is_some());

        let order = checkout.complete_order().await.unwrap();
        assert_eq!(order.items.len(), 1);
        assert_eq!(harness.cart_service().cart_id(), None);
    }

    #[tokio::test]
    async fn test_decline_is_surfaced_and_not_retried() {
        let harness = harness_with_item().await;
        harness.payments.respond_with(Err(PaymentError::Declined {
            code: Some("card_declined".to_string()),
            message: "Your card was declined.".to_string(),
        }));
        let checkout = harness.checkout_service();

        let err = checkout.place_order(PROVIDER, None).await.unwrap_err();

        assert_eq!(err.user_message(), "Your card was declined.");
        assert_eq!(harness.payments.calls(), 1);
        assert_eq!(harness.api.calls("complete_cart"), 0);
        assert_eq!(
            checkout.status().error.as_deref(),
            Some("Your card was declined.")
        );
    }

    #[tokio::test]
    async fn test_unfinished_payment_is_an_error() {
        let harness = harness_with_item().await;
        harness.payments.respond_with(Ok(PaymentIntent {
            id: "pi_1".to_string(),
            status: PaymentIntentStatus::RequiresPaymentMethod,
            next_action_url: None,
        }));

        let err = harness
            .checkout_service()
            .place_order(PROVIDER, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorefrontError::Checkout(CheckoutError::PaymentIncomplete {
                status: PaymentIntentStatus::RequiresPaymentMethod
            })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_submission_is_rejected() {
        let harness = harness_with_item().await;
        let gate = harness.payments.hold();
        let checkout = harness.checkout_service();

        let (first, second) = tokio::join!(checkout.place_order(PROVIDER, None), async {
            let second = checkout.place_order(PROVIDER, None).await;
            gate.notify_one();
            second
        });

        assert!(matches!(first.unwrap(), OrderOutcome::Placed(_)));
        assert!(matches!(
            second,
            Err(StorefrontError::Checkout(CheckoutError::AlreadySubmitting))
        ));
        assert_eq!(harness.payments.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_cart_is_rejected() {
        let harness = Harness::new();
        harness.cart_service().ensure_cart().await.unwrap();

        let err = harness
            .checkout_service()
            .place_order(PROVIDER, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorefrontError::Checkout(CheckoutError::EmptyCart)
        ));
    }

    #[tokio::test]
    async fn test_completion_failure_keeps_cart() {
        let harness = harness_with_item().await;
        harness.api.fail_completion("Item is out of stock");

        let err = harness
            .checkout_service()
            .place_order(PROVIDER, None)
            .await
            .unwrap_err();

        assert_eq!(err.user_message(), "Item is out of stock");
        assert!(harness.cart_service().cart_id().is_some());
    }

    #[tokio::test]
    async fn test_session_without_secret_skips_processor() {
        let harness = harness_with_item().await;

        let outcome = harness
            .checkout_service()
            .place_order("pp_system_default", None)
            .await
            .unwrap();

        assert!(matches!(outcome, OrderOutcome::Placed(_)));
        assert_eq!(harness.payments.calls(), 0);
    }

    #[test]
    fn test_flow_requires_each_step() {
        let mut flow = CheckoutFlow::default();
        let mut cart = cart("cart_01", &[("item_1", "variant_bag", 1)]);

        assert!(matches!(
            flow.advance(&cart),
            Err(CheckoutError::StepIncomplete(CheckoutStep::Address))
        ));

        cart.email = Some("ines@example.com".to_string());
        cart.shipping_address = Some(crate::backend::Address::default());
        assert_eq!(flow.advance(&cart).unwrap(), CheckoutStep::Delivery);
        assert!(flow.advance(&cart).is_err());

        cart.shipping_methods.push(crate::backend::ShippingMethod {
            id: "sm_1".to_string(),
            shipping_option_id: None,
            name: "Express".to_string(),
            amount: Decimal::from(25),
        });
        assert_eq!(flow.advance(&cart).unwrap(), CheckoutStep::Payment);
        assert_eq!(flow.advance(&cart).unwrap(), CheckoutStep::Review);
        assert_eq!(flow.advance(&cart).unwrap(), CheckoutStep::Review);

        flow.go_back_to(CheckoutStep::Address);
        assert_eq!(flow.step(), CheckoutStep::Address);
    }

    #[test]
    fn test_flow_rejects_empty_cart() {
        let mut flow = CheckoutFlow::default();
        let cart = cart("cart_01", &[]);
        assert!(matches!(flow.advance(&cart), Err(CheckoutError::EmptyCart)));
    }
}

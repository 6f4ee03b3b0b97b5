//! Premium subscriptions through Stripe.

pub mod stripe;
pub mod webhook;

pub use stripe::{CheckoutSession, StripeClient, StripeGateway, Subscription};
pub use webhook::{
    apply_event, signature_header, verify_signature, SignatureError, WebhookEvent,
    WebhookOutcome,
};

//! Shared constants for end-to-end tests
//!
//! This module contains all constants used across the test suite.
//! When test data changes (user credentials, fake upstream data, etc.),
//! update only this file.

// ============================================================================
// Test User Credentials
// ============================================================================

/// Free tier test user name
pub const TEST_USER: &str = "testuser";

/// Free tier test user email
pub const TEST_EMAIL: &str = "testuser@example.com";

/// Free tier test user password
pub const TEST_PASS: &str = "testpass123";

/// Premium test user name
pub const PREMIUM_USER: &str = "premiumuser";

/// Premium test user email
pub const PREMIUM_EMAIL: &str = "premium@example.com";

/// Premium test user password
pub const PREMIUM_PASS: &str = "premiumpass123";

// ============================================================================
// Server Secrets
// ============================================================================

/// Secret used to sign access tokens
pub const JWT_SECRET: &str = "e2e-jwt-secret";

/// Value expected in the `x-admin-api-key` header
pub const ADMIN_API_KEY: &str = "e2e-admin-key";

/// Secret used to sign Stripe webhooks
pub const STRIPE_WEBHOOK_SECRET: &str = "whsec_e2e";

// ============================================================================
// Fake Upstream Data
// ============================================================================

/// Checkout session ids starting with this prefix are reported as paid.
/// The rest of the id is the paying user's id.
pub const PAID_CHECKOUT_PREFIX: &str = "cs_paid_";

/// Checkout session ids starting with this prefix are reported as unpaid.
pub const UNPAID_CHECKOUT_PREFIX: &str = "cs_unpaid_";

/// Fake subscription ids are this prefix followed by the user id.
pub const SUBSCRIPTION_PREFIX: &str = "sub_";

/// Period end reported for every fake subscription (2030-01-01T00:00:00Z)
pub const SUBSCRIPTION_PERIOD_END: i64 = 1_893_456_000;

/// Id of the only video the fake YouTube backend knows about
pub const KNOWN_VIDEO_ID: &str = "dQw4w9WgXcQ";

// ============================================================================
// Test Timeouts and Configuration
// ============================================================================

/// Maximum time to wait for server to become ready (milliseconds)
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Timeout for individual HTTP requests (seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Polling interval when waiting for server ready (milliseconds)
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 50;

// ============================================================================
// Test Files
// ============================================================================

/// A tiny payload recognised as MP3 by its ID3 header
pub const TEST_MP3_BYTES: &[u8] = &[
    0x49, 0x44, 0x33, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0a, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00,
];

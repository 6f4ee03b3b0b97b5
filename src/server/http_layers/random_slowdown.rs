//! Artificial latency, for exercising clients against a slow backend.

use axum::body::Body;
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::IntoResponse;
use rand_distr::{Distribution, Normal};
use std::time::Duration;

const MEAN_DELAY_MS: f64 = 800.0;
const DELAY_STD_DEV_MS: f64 = 600.0;

fn sample_delay() -> Duration {
    let millis = Normal::new(MEAN_DELAY_MS, DELAY_STD_DEV_MS)
        .map(|normal| normal.sample(&mut rand::rng()))
        .unwrap_or(MEAN_DELAY_MS);
    Duration::from_millis(millis.max(0.0) as u64)
}

/// Delays each request by a normally distributed amount of time.
pub async fn slowdown_request(request: Request<Body>, next: Next) -> impl IntoResponse {
    tokio::time::sleep(sample_delay()).await;
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_are_never_negative() {
        for _ in 0..100 {
            assert!(sample_delay() < Duration::from_secs(60));
        }
    }
}

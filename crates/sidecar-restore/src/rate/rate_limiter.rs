//! Byte-permit rate limiter shared by every download of a client.

use std::num::NonZeroU32;

use governor::{DefaultDirectRateLimiter, Quota};

use crate::TRACING_TARGET_DOWNLOAD;

/// Bounds aggregate download throughput to a number of bytes per second.
///
/// One permit corresponds to one byte. Acquiring permits suspends only
/// the calling task until capacity is available. A limiter created with a
/// non-positive rate is unlimited and never blocks.
///
/// A new limiter holds no stored permits, so `S` bytes take at least
/// `S / rate` seconds from construction. Idle time refills at most one
/// second worth of permits; larger requests are split into burst-sized
/// acquisitions.
pub struct RateLimiter {
    inner: Option<(DefaultDirectRateLimiter, NonZeroU32)>,
}

impl RateLimiter {
    /// Creates a limiter allowing `permits_per_second` bytes per second.
    ///
    /// Values `<= 0` mean unlimited; values above `u32::MAX` are clamped.
    pub fn new(permits_per_second: i64) -> Self {
        let rate = u32::try_from(permits_per_second.max(0)).unwrap_or(u32::MAX);
        let Some(rate) = NonZeroU32::new(rate) else {
            tracing::debug!(target: TRACING_TARGET_DOWNLOAD, "Download rate limiting disabled");
            return Self::unlimited();
        };

        tracing::debug!(
            target: TRACING_TARGET_DOWNLOAD,
            bytes_per_sec = rate.get(),
            "Download rate limiter initialized"
        );

        let limiter = governor::RateLimiter::direct(Quota::per_second(rate));
        // Start empty: the initial burst would otherwise pass unthrottled.
        let _ = limiter.check_n(rate);

        Self {
            inner: Some((limiter, rate)),
        }
    }

    /// Creates a limiter that never blocks.
    pub fn unlimited() -> Self {
        Self { inner: None }
    }

    /// Returns the configured rate, or `None` when unlimited.
    #[must_use]
    pub fn rate(&self) -> Option<NonZeroU32> {
        self.inner.as_ref().map(|(_, rate)| *rate)
    }

    /// Returns whether the limiter never blocks.
    #[must_use]
    pub fn is_unlimited(&self) -> bool {
        self.inner.is_none()
    }

    /// Waits until `permits` bytes may be consumed.
    pub async fn acquire(&self, permits: usize) {
        let Some((limiter, burst)) = &self.inner else {
            return;
        };

        let mut remaining = permits;
        while remaining > 0 {
            // Never more than the burst, so the cast and the readiness check cannot fail.
            let step = remaining.min(burst.get() as usize);
            let Some(batch) = NonZeroU32::new(step as u32) else {
                break;
            };

            if let Err(error) = limiter.until_n_ready(batch).await {
                tracing::warn!(
                    target: TRACING_TARGET_DOWNLOAD,
                    error = %error,
                    permits = step,
                    "Rate limiter rejected permit batch"
                );
                break;
            }
            remaining -= step;
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("bytes_per_sec", &self.rate().map(NonZeroU32::get))
            .finish()
    }
}

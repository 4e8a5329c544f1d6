use std::time::Duration;
use tracing::warn;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;

/// Exponential reconnect schedule: `base * 2^(attempt - 1)`, at most
/// `max_attempts` tries in total.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
        }
    }
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(base_delay_ms),
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(exponent)
    }
}

fn retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

/// Sends `request`, reconnecting on connect or timeout failures and retryable
/// statuses until the policy runs out. The last response or error is
/// returned as-is.
pub async fn send_with_reconnect(
    request: reqwest::RequestBuilder,
    policy: &ReconnectPolicy,
) -> Result<reqwest::Response, reqwest::Error> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let Some(cloned) = request.try_clone() else {
            return request.send().await;
        };

        match cloned.send().await {
            Ok(response) if retryable_status(response.status()) && attempt < attempts => {
                let delay = policy.delay(attempt);
                warn!(
                    attempt,
                    attempts,
                    status = %response.status(),
                    ?delay,
                    "service unavailable, retrying"
                );

                tokio::time::sleep(delay).await;
            }
            Ok(response) => return Ok(response),
            Err(err) if (err.is_connect() || err.is_timeout()) && attempt < attempts => {
                let delay = policy.delay(attempt);
                warn!(attempt, attempts, error = %err, ?delay, "connection failed, reconnecting");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
        attempt += 1;
    }
}

use rand;
use std::time::Duration;

#[derive(Clone)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter_max: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_millis(500),
            jitter_max: Some(Duration::from_millis(50)),
        }
    }
}

impl RetryConfig {
    /// Profile for writes that must not lose updates under contention, like
    /// the versioned stats and session upserts.
    pub fn aggressive() -> Self {
        Self {
            max_attempts: 7,
            base_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_millis(1000),
            jitter_max: Some(Duration::from_millis(100)),
        }
    }
}

/// Retry `f` with exponential backoff and jitter until it succeeds or the
/// attempt budget runs out. The closure is rebuilt per attempt, so
/// compare-and-set loops re-read their document on every pass.
pub async fn retry_async_with_config<F, Fut, T, E>(config: RetryConfig, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempts_left = config.max_attempts;
    let mut backoff = config.base_backoff;

    loop {
        let res = f().await;
        match res {
            Ok(v) => return Ok(v),
            Err(e) => {
                attempts_left = attempts_left.saturating_sub(1);
                if attempts_left == 0 {
                    return Err(e);
                }

                if let Some(jitter_max) = config.jitter_max {
                    let jitter_ms = jitter_max.as_millis() as u64;
                    let extra = if jitter_ms == 0 {
                        0
                    } else {
                        rand::random::<u64>() % (jitter_ms + 1)
                    };
                    let wait = backoff + Duration::from_millis(extra);
                    tokio::time::sleep(wait).await;
                } else {
                    tokio::time::sleep(backoff).await;
                }

                backoff = std::cmp::min(backoff * 2, config.max_backoff);
            }
        }
    }
}

use super::client::HttpClient;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::warn;

/// Exponential backoff schedule: `min(base * 2^attempt, max)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub max_retries: u32,
    pub base: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base: Duration::from_secs(1),
            max: Duration::from_secs(60),
        }
    }
}

impl Backoff {
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base.saturating_mul(factor).min(self.max)
    }
}

/// An [`HttpClient`] wrapper that retries transport failures and
/// throttled/5xx responses according to a [`Backoff`] schedule.
pub struct Retry<C> {
    inner: C,
    backoff: Backoff,
}

impl<C> Retry<C> {
    pub fn new(inner: C, backoff: Backoff) -> Self {
        Self { inner, backoff }
    }
}

fn retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn transient(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

#[async_trait]
impl<C: HttpClient> HttpClient for Retry<C> {
    async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        let mut attempt = 0;
        loop {
            // Streaming bodies can't be replayed; send once.
            let Some(this_try) = req.try_clone() else {
                return self.inner.execute(req).await;
            };
            let last = attempt + 1 >= self.backoff.max_retries;

            match self.inner.execute(this_try).await {
                Ok(resp) if !last && retryable_status(resp.status()) => {
                    warn!(
                        attempt = attempt + 1,
                        status = %resp.status(),
                        url = %req.url(),
                        "Retryable status, backing off"
                    );
                }
                Ok(resp) => return Ok(resp),
                Err(e) if !last && transient(&e) => {
                    warn!(attempt = attempt + 1, error = %e, url = %req.url(), "Request failed, backing off");
                }
                Err(e) => return Err(e),
            }

            tokio::time::sleep(self.backoff.delay(attempt)).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Replies with the queued statuses in order, then 200.
    struct Scripted {
        statuses: Mutex<Vec<u16>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(mut statuses: Vec<u16>) -> Self {
            statuses.reverse();
            Self {
                statuses: Mutex::new(statuses),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl HttpClient for Scripted {
        async fn execute(&self, _req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            *self.calls.lock().unwrap() += 1;
            let status = self.statuses.lock().unwrap().pop().unwrap_or(200);
            let resp = http::Response::builder()
                .status(status)
                .body("{}")
                .unwrap();
            Ok(reqwest::Response::from(resp))
        }
    }

    fn instant() -> Backoff {
        Backoff {
            max_retries: 3,
            base: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    fn get() -> reqwest::Request {
        reqwest::Request::new(
            reqwest::Method::GET,
            "https://example.test/projections".parse().unwrap(),
        )
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let b = Backoff::default();
        assert_eq!(b.delay(0), Duration::from_secs(1));
        assert_eq!(b.delay(1), Duration::from_secs(2));
        assert_eq!(b.delay(2), Duration::from_secs(4));
        assert_eq!(b.delay(10), Duration::from_secs(60));
        assert_eq!(b.delay(40), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_retries_server_errors_then_succeeds() {
        let client = Retry::new(Scripted::new(vec![503, 502]), instant());
        let resp = client.execute(get()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(client.inner.calls(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let client = Retry::new(Scripted::new(vec![500, 500, 500, 500]), instant());
        let resp = client.execute(get()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(client.inner.calls(), 3);
    }

    /// Fails every call with an error that is neither a timeout nor a connect failure.
    struct Broken {
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl HttpClient for Broken {
        async fn execute(&self, _req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            *self.calls.lock().unwrap() += 1;
            Err(reqwest::Client::new()
                .get("not a url")
                .build()
                .unwrap_err())
        }
    }

    #[tokio::test]
    async fn test_malformed_requests_are_not_retried() {
        let client = Retry::new(
            Broken {
                calls: Mutex::new(0),
            },
            instant(),
        );
        let err = client.execute(get()).await.unwrap_err();
        assert!(!transient(&err));
        assert_eq!(*client.inner.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let client = Retry::new(Scripted::new(vec![403]), instant());
        let resp = client.execute(get()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(client.inner.calls(), 1);
    }
}

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::Client;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("request failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else if let Some(status) = e.status() {
            TransportError::Status(status.as_u16())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("Gave up on {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: String,
    },
}

/// A single GET against the network, without any retry behaviour.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn get(&self, url: &str) -> Result<String, TransportError>;
}

impl<T: Transport> Transport for &T {
    async fn get(&self, url: &str) -> Result<String, TransportError> {
        (**self).get(url).await
    }
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<String, TransportError> {
        let html = self
            .client
            .get(url)
            .send()
            .await
            .inspect_err(|e| log::debug!("HTTP error: {e:?}"))?
            .error_for_status()?
            .text()
            .await
            .inspect_err(|e| log::debug!("Decode error: {e:?}"))?;
        Ok(html)
    }
}

/// Process-wide request counters. Reporting only; never consulted for control flow.
#[derive(Debug, Default)]
pub struct FetchStats {
    requests_made: AtomicU64,
    requests_failed: AtomicU64,
}

impl FetchStats {
    pub fn requests_made(&self) -> u64 {
        self.requests_made.load(Ordering::Relaxed)
    }

    pub fn requests_failed(&self) -> u64 {
        self.requests_failed.load(Ordering::Relaxed)
    }

    fn record_attempt(&self) {
        self.requests_made.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub timeout_multiplier: u32,
    pub connect_multiplier: u32,
    /// Bodies shorter than this are rendered-but-empty pages and are retried.
    pub min_body_bytes: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            timeout_multiplier: 3,
            connect_multiplier: 1,
            min_body_bytes: 1000,
        }
    }
}

#[derive(Debug)]
enum AttemptFailure {
    Transport(TransportError),
    ShortBody(usize),
}

impl std::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptFailure::Transport(e) => write!(f, "{}", e),
            AttemptFailure::ShortBody(len) => write!(f, "response body too short ({len} bytes)"),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32, failure: &AttemptFailure) -> Duration {
        let multiplier = match failure {
            AttemptFailure::Transport(TransportError::Timeout) => self.timeout_multiplier,
            AttemptFailure::Transport(TransportError::Connect(_)) => self.connect_multiplier,
            _ => 1,
        };
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .saturating_mul(multiplier)
    }
}

#[derive(Debug, Clone)]
pub struct Fetcher<T = HttpTransport> {
    transport: T,
    policy: RetryPolicy,
    stats: Arc<FetchStats>,
}

impl Fetcher<HttpTransport> {
    pub fn new(policy: RetryPolicy, stats: Arc<FetchStats>) -> Result<Self, FetchError> {
        Ok(Self::with_transport(HttpTransport::new()?, policy, stats))
    }
}

impl<T: Transport> Fetcher<T> {
    pub fn with_transport(transport: T, policy: RetryPolicy, stats: Arc<FetchStats>) -> Self {
        Self {
            transport,
            policy,
            stats,
        }
    }

    pub fn stats(&self) -> &Arc<FetchStats> {
        &self.stats
    }

    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let attempts = self.policy.max_retries + 1;
        let mut last_failure = None;

        for attempt in 0..attempts {
            log::debug!("Requesting {} (attempt {}/{})", url, attempt + 1, attempts);
            self.stats.record_attempt();

            let failure = match self.transport.get(url).await {
                Ok(body) if body.len() >= self.policy.min_body_bytes => return Ok(body),
                Ok(body) => AttemptFailure::ShortBody(body.len()),
                Err(e) => AttemptFailure::Transport(e),
            };

            self.stats.record_failure();
            log::warn!(
                "Request for {} failed (attempt {}/{}): {}",
                url,
                attempt + 1,
                attempts,
                failure
            );

            if attempt + 1 < attempts {
                let wait = self.policy.delay_for(attempt, &failure);
                log::info!("Waiting {:?} before retry...", wait);
                tokio::time::sleep(wait).await;
            }
            last_failure = Some(failure);
        }

        log::error!("Failed to fetch {} after {} attempts", url, attempts);
        Err(FetchError::Exhausted {
            url: url.to_string(),
            attempts,
            last: last_failure
                .map(|f| f.to_string())
                .unwrap_or_else(|| "no attempts made".to_string()),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a fixed script of responses, one per request.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedTransport {
        script: Mutex<VecDeque<Result<String, TransportError>>>,
        pub(crate) calls: AtomicU64,
    }

    impl ScriptedTransport {
        pub(crate) fn new(script: Vec<Result<String, TransportError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicU64::new(0),
            }
        }
    }

    impl Transport for ScriptedTransport {
        async fn get(&self, _url: &str) -> Result<String, TransportError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(TransportError::Other("script exhausted".to_string())))
        }
    }

    pub(crate) fn instant_policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::ZERO,
            ..RetryPolicy::default()
        }
    }

    fn page() -> String {
        format!("<html><body>{}</body></html>", "x".repeat(2000))
    }

    #[tokio::test]
    async fn test_fetch_succeeds_on_fourth_attempt() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::Timeout),
            Err(TransportError::Connect("refused".to_string())),
            Err(TransportError::Status(503)),
            Ok(page()),
        ]);
        let stats = Arc::new(FetchStats::default());
        let fetcher = Fetcher::with_transport(transport, instant_policy(), stats.clone());

        let body = fetcher.fetch("http://test/yearly/yr1927a.shtml").await.unwrap();

        assert_eq!(body, page());
        assert_eq!(stats.requests_made(), 4);
        assert_eq!(stats.requests_failed(), 3);
    }

    #[tokio::test]
    async fn test_fetch_exhausted_after_four_failures() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::Timeout),
            Err(TransportError::Timeout),
            Err(TransportError::Timeout),
            Err(TransportError::Timeout),
            Ok(page()),
        ]);
        let stats = Arc::new(FetchStats::default());
        let fetcher = Fetcher::with_transport(transport, instant_policy(), stats.clone());

        let err = fetcher.fetch("http://test/yearly/yr1927a.shtml").await.unwrap_err();

        match err {
            FetchError::Exhausted { attempts, last, .. } => {
                assert_eq!(attempts, 4);
                assert!(last.contains("timed out"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fetcher.transport.calls.load(Ordering::Relaxed), 4);
        assert_eq!(stats.requests_failed(), 4);
    }

    #[tokio::test]
    async fn test_short_body_is_retried() {
        let transport = ScriptedTransport::new(vec![Ok("<html></html>".to_string()), Ok(page())]);
        let fetcher =
            Fetcher::with_transport(transport, instant_policy(), Arc::new(FetchStats::default()));

        let body = fetcher.fetch("http://test").await.unwrap();

        assert_eq!(body.len(), page().len());
        assert_eq!(fetcher.stats().requests_failed(), 1);
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        let connect = AttemptFailure::Transport(TransportError::Connect("refused".to_string()));
        let timeout = AttemptFailure::Transport(TransportError::Timeout);
        let short = AttemptFailure::ShortBody(10);

        assert_eq!(policy.delay_for(0, &connect), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1, &connect), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2, &short), Duration::from_secs(4));
        assert_eq!(policy.delay_for(0, &timeout), Duration::from_secs(3));
        assert_eq!(policy.delay_for(2, &timeout), Duration::from_secs(12));
        assert!(policy.delay_for(1, &timeout) > policy.delay_for(1, &connect));
    }
}

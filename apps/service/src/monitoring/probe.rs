use std::time::{Duration, Instant};

/// Why a probe came back down. Kept on the outcome so callers can log the
/// reason even though the uptime log only persists the boolean.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeFailure {
    #[error("request timed out")]
    Timeout,
    #[error("request failed: {0}")]
    Transport(String),
    #[error("unexpected status {0}")]
    Status(u16),
}

/// Typed outcome of a single reachability check. Never an Err: network
/// errors, timeouts and bad statuses are all data here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Up { latency_ms: u64, status_code: u16 },
    Down { reason: ProbeFailure },
}

impl ProbeOutcome {
    pub fn is_up(&self) -> bool {
        matches!(self, ProbeOutcome::Up { .. })
    }
}

/// A single reachability check against a url with a bounded timeout.
#[async_trait::async_trait]
pub trait Probe: Send + Sync {
    async fn check(&self, url: &str) -> ProbeOutcome;
}

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

/// HTTP(S) probe backed by a shared reqwest client.
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(timeout_seconds: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Probe for HttpProbe {
    async fn check(&self, url: &str) -> ProbeOutcome {
        let start = Instant::now();

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return ProbeOutcome::Down { reason: ProbeFailure::Timeout };
            }
            Err(e) => {
                return ProbeOutcome::Down { reason: ProbeFailure::Transport(e.to_string()) };
            }
        };

        let status = response.status();
        if status.is_success() {
            ProbeOutcome::Up {
                latency_ms: start.elapsed().as_millis() as u64,
                status_code: status.as_u16(),
            }
        } else {
            ProbeOutcome::Down { reason: ProbeFailure::Status(status.as_u16()) }
        }
    }
}

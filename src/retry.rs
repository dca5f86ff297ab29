//! Retry logic with exponential backoff
//!
//! Every request the mirror makes goes through [`send_with_backoff`]. Each attempt's
//! outcome is classified into a [`Verdict`]:
//! - [`Verdict::Retry`] for rate limiting and momentary server failures (by default
//!   HTTP 403, 429, 502, 504) and for a peer that closed the connection mid-request
//! - [`Verdict::Succeed`] for a successful response
//! - [`Verdict::Fail`] for everything else
//!
//! Retryable outcomes are retried without limit. The delay starts at
//! [`RetryConfig::initial_delay`], is multiplied after each wait and is capped at
//! [`RetryConfig::max_delay`]; with the defaults the waits are 8, 16, 32, 60, 60, ... seconds.
//!
//! # Example
//!
//! ```no_run
//! use release_mirror::config::RetryConfig;
//! use release_mirror::retry::send_with_backoff;
//!
//! # async fn example() -> release_mirror::Result<()> {
//! let config = RetryConfig::default();
//! let client = reqwest::Client::new();
//! let url = "https://api.github.com/rate_limit";
//! let response = send_with_backoff(&config, url, || client.get(url).send()).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use rand::Rng;
use reqwest::StatusCode;
use std::future::Future;
use std::io::{IsTerminal, Write};
use std::time::Duration;

/// What to do after a single attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Transient failure: wait, then try again
    Retry,
    /// Done, hand the outcome to the caller
    Succeed,
    /// Done, the caller receives an error
    Fail,
}

/// Outcomes that can be sorted into a [`Verdict`]
pub trait Classify {
    /// Classify this outcome given the statuses configured as transient
    fn classify(&self, retryable_statuses: &[u16]) -> Verdict;
}

impl Classify for std::result::Result<reqwest::Response, reqwest::Error> {
    fn classify(&self, retryable_statuses: &[u16]) -> Verdict {
        match self {
            Ok(response) => classify_status(response.status(), retryable_statuses),
            Err(e) if is_peer_disconnect(e) => Verdict::Retry,
            Err(_) => Verdict::Fail,
        }
    }
}

/// Classify an HTTP status
pub fn classify_status(status: StatusCode, retryable_statuses: &[u16]) -> Verdict {
    if retryable_statuses.contains(&status.as_u16()) {
        Verdict::Retry
    } else if status.is_client_error() || status.is_server_error() {
        Verdict::Fail
    } else {
        Verdict::Succeed
    }
}

/// Returns true if the error chain shows the remote closed the connection on us
pub fn is_peer_disconnect(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>()
            && matches!(
                io.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            )
        {
            return true;
        }
        // hyper reports a silently dropped keep-alive connection only through its message
        if e.to_string()
            .contains("connection closed before message completed")
        {
            return true;
        }
        current = e.source();
    }
    false
}

/// Backoff state for one request
#[derive(Clone, Debug)]
pub struct Backoff {
    delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    waits: u32,
}

impl Backoff {
    /// Fresh state seeded from the configuration
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            delay: config.initial_delay.min(config.max_delay),
            max_delay: config.max_delay,
            multiplier: config.backoff_multiplier,
            waits: 0,
        }
    }

    /// Delay for the upcoming wait; advances the state
    pub fn next_delay(&mut self) -> Duration {
        let current = self.delay;
        // an overflowing product is past any ceiling
        let next = Duration::try_from_secs_f64(current.as_secs_f64() * self.multiplier)
            .unwrap_or(self.max_delay);
        self.delay = next.min(self.max_delay);
        self.waits += 1;
        current
    }

    /// Number of waits handed out so far
    pub fn waits(&self) -> u32 {
        self.waits
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        Some(self.next_delay())
    }
}

const SPINNER_FRAMES: [&str; 5] = ["zzzz", "Zzzz", "zZzz", "zzZz", "zzzZ"];

/// Sleeps in small steps, drawing a spinner when stdout is a terminal
///
/// The spinner is cosmetic: the total time slept is the same either way.
#[derive(Debug)]
pub struct Sleeper {
    poll_interval: Duration,
    interactive: bool,
    did_sleep: bool,
    frame: usize,
}

impl Sleeper {
    /// Sleeper that draws only if stdout is a terminal
    pub fn new(poll_interval: Duration) -> Self {
        Self::with_interactive(poll_interval, std::io::stdout().is_terminal())
    }

    fn with_interactive(poll_interval: Duration, interactive: bool) -> Self {
        Self {
            poll_interval,
            interactive,
            did_sleep: false,
            frame: 0,
        }
    }

    /// Sleep for `duration`
    pub async fn sleep(&mut self, duration: Duration) {
        self.did_sleep = true;
        let mut remaining = duration;
        while !remaining.is_zero() {
            if self.interactive {
                self.draw();
            }
            let step = remaining.min(self.poll_interval);
            tokio::time::sleep(step).await;
            remaining -= step;
        }
    }

    /// Whether any sleep happened
    pub fn did_sleep(&self) -> bool {
        self.did_sleep
    }

    /// Return the cursor to the start of the line if the spinner was drawn
    pub fn finalize(&self) {
        if self.did_sleep && self.interactive {
            let mut out = std::io::stdout().lock();
            let _ = write!(out, "\r");
            let _ = out.flush();
        }
    }

    fn draw(&mut self) {
        let mut out = std::io::stdout().lock();
        let _ = write!(out, "\r{}", SPINNER_FRAMES[self.frame]);
        let _ = out.flush();
        self.frame = (self.frame + 1) % SPINNER_FRAMES.len();
    }
}

/// Run `attempt` until its outcome is not [`Verdict::Retry`], backing off between tries
///
/// Returns the first non-retryable outcome unchanged.
pub async fn retry_with_backoff<F, Fut, T>(config: &RetryConfig, url: &str, mut attempt: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = T>,
    T: Classify,
{
    let mut backoff = Backoff::new(config);
    let mut sleeper = Sleeper::new(config.poll_interval);

    loop {
        let outcome = attempt().await;
        match outcome.classify(&config.retryable_statuses) {
            Verdict::Retry => {
                let delay = backoff.next_delay();
                tracing::warn!(
                    url = %url,
                    attempt = backoff.waits(),
                    delay_secs = delay.as_secs_f64(),
                    "Transient failure, backing off"
                );
                let delay = if config.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };
                sleeper.sleep(delay).await;
            }
            Verdict::Succeed | Verdict::Fail => {
                sleeper.finalize();
                if backoff.waits() > 0 {
                    tracing::info!(
                        url = %url,
                        attempts = backoff.waits() + 1,
                        "Request settled after backoff"
                    );
                }
                return outcome;
            }
        }
    }
}

/// Send a request with backoff and turn a terminal outcome into an error
///
/// `attempt` is called once per try and must build a fresh request each time,
/// headers included.
pub async fn send_with_backoff<F, Fut>(
    config: &RetryConfig,
    url: &str,
    attempt: F,
) -> Result<reqwest::Response>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<reqwest::Response, reqwest::Error>>,
{
    let outcome = retry_with_backoff(config, url, attempt).await;
    match outcome.classify(&config.retryable_statuses) {
        Verdict::Succeed => outcome.map_err(Error::Network),
        _ => match outcome {
            Ok(response) => {
                let status = response.status();
                tracing::error!(url = %url, status = %status, "Request failed");
                Err(Error::Http {
                    status,
                    url: url.to_string(),
                })
            }
            Err(e) => {
                tracing::error!(url = %url, error = %e, "Request failed");
                Err(Error::Network(e))
            }
        },
    }
}

/// Add random jitter to a delay
///
/// The result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::try_from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor)).unwrap_or(delay)
}

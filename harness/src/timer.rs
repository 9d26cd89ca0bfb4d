// SPDX-FileCopyrightText: OLM e2e harness contributors
//
// SPDX-License-Identifier: MIT

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use log::debug;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Bounded retry loop with a fixed interval.
///
/// The first attempt runs immediately; later attempts are spaced by the
/// interval until the timeout elapses. The last attempt never starts after
/// the deadline.
#[derive(Clone, Debug)]
pub struct Poller {
    timeout: Duration,
    interval: Duration,
    error_message: String,
    cancel: Option<CancellationToken>,
}

impl Default for Poller {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            interval: Duration::from_secs(5),
            error_message: "condition not met".to_string(),
            cancel: None,
        }
    }
}

impl Poller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = message.into();
        self
    }

    /// Stop polling early once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Retry `f` until it returns `Ok`. Every `Err` counts as "not yet".
    pub async fn poll_async<F, Fut, T, E>(&self, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Display,
    {
        self.run(|| {
            let attempt = f();
            async move {
                Ok::<_, Error>(match attempt.await {
                    Ok(value) => Ok(value),
                    Err(e) => Err(e.to_string()),
                })
            }
        })
        .await
    }

    /// Retry `f` until it returns `Ok(Some(_))`. `Ok(None)` means "not yet";
    /// an `Err` aborts the loop and is returned as is.
    pub async fn poll_until<F, Fut, T>(&self, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        self.run(|| {
            let attempt = f();
            async move {
                Ok::<_, Error>(match attempt.await? {
                    Some(value) => Ok(value),
                    None => Err("condition not reached yet".to_string()),
                })
            }
        })
        .await
    }

    async fn run<F, Fut, T>(&self, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<std::result::Result<T, String>>>,
    {
        let deadline = Instant::now() + self.timeout;
        let mut attempts = 0u32;

        loop {
            if self.is_cancelled() {
                return Err(self.cancelled());
            }

            attempts += 1;
            let last_error = match attempt().await? {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let now = Instant::now();
            if now >= deadline {
                return Err(Error::Timeout {
                    message: self.error_message.clone(),
                    timeout: self.timeout,
                    attempts,
                    last_error,
                });
            }
            debug!(
                "{}: attempt {attempts} failed ({last_error}), retrying",
                self.error_message
            );

            let wait = self.interval.min(deadline - now);
            match &self.cancel {
                Some(token) => {
                    tokio::select! {
                        _ = sleep(wait) => {}
                        _ = token.cancelled() => return Err(self.cancelled()),
                    }
                }
                None => sleep(wait).await,
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    fn cancelled(&self) -> Error {
        Error::Cancelled {
            message: self.error_message.clone(),
        }
    }
}

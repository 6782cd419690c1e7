use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::{Instant, sleep, timeout_at};
use tokio_util::sync::CancellationToken;

use crate::error::IdeError;

/// How the manager waits for a launched ide server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessOptions {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for ReadinessOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(30),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Poll `addr` with TCP connects until one succeeds.
///
/// Returns the time spent waiting. Gives up with [`IdeError::LaunchTimeout`]
/// once `options.timeout` has elapsed and with [`IdeError::Cancelled`] as soon
/// as `cancel` fires.
pub async fn wait_until_reachable(
    addr: &str,
    options: ReadinessOptions,
    cancel: &CancellationToken,
) -> Result<Duration, IdeError> {
    let started = Instant::now();
    let deadline = started + options.timeout;
    let mut attempts: u64 = 0;

    loop {
        attempts += 1;
        let attempt = tokio::select! {
            _ = cancel.cancelled() => return Err(IdeError::Cancelled),
            res = timeout_at(deadline, TcpStream::connect(addr)) => res,
        };
        match attempt {
            Ok(Ok(_stream)) => {
                let waited = started.elapsed();
                tracing::debug!("{addr} reachable after {attempts} attempts");
                return Ok(waited);
            }
            Ok(Err(e)) => tracing::trace!("{addr} not reachable yet: {e}"),
            Err(_) => break,
        }

        if Instant::now() + options.interval >= deadline {
            break;
        }
        tokio::select! {
            _ = cancel.cancelled() => return Err(IdeError::Cancelled),
            _ = sleep(options.interval) => {}
        }
    }

    Err(IdeError::LaunchTimeout {
        addr: addr.to_string(),
        waited: started.elapsed(),
    })
}

use dashmap::DashMap;
use std::hash::Hash;
use std::net::IpAddr;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

/// How often the background sweeper runs by default
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Per-key counter for the current window
#[derive(Debug, Clone, Copy)]
pub struct RateLimitWindow {
    pub count: u32,
    pub window_start: Instant,
}

/// Fixed-window rate limiter for SIP requests
///
/// Tracks requests per source (IP by default) per window. The reset-or-
/// increment sequence runs under the DashMap entry lock, so two concurrent
/// requests for the same key can never both observe `limit - 1`.
#[derive(Clone)]
pub struct RateLimiter<K = IpAddr>
where
    K: Eq + Hash,
{
    windows: Arc<DashMap<K, RateLimitWindow>>,
    limit: u32,
    window: Duration,
}

impl<K> RateLimiter<K>
where
    K: Eq + Hash + Send + Sync + 'static,
{
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            windows: Arc::new(DashMap::new()),
            limit,
            window,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a request for `key`.
    /// Returns true if allowed, false if the window is exhausted
    pub fn allow(&self, key: K) -> bool {
        if self.limit == 0 {
            return true; // Unlimited
        }

        let now = Instant::now();
        let mut entry = self.windows.entry(key).or_insert(RateLimitWindow {
            count: 0,
            window_start: now,
        });
        let window = entry.value_mut();

        if window.count == 0 || now.duration_since(window.window_start) > self.window {
            // New window
            window.count = 1;
            window.window_start = now;
            return true;
        }

        window.count = window.count.saturating_add(1);
        window.count <= self.limit
    }

    /// Number of keys currently tracked
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    /// Drop windows idle for more than twice the window length
    pub fn sweep(&self) {
        sweep_windows(&self.windows, self.window);
    }

    /// Run [`sweep`](Self::sweep) every `every` on the tokio runtime.
    ///
    /// The task holds only a weak reference and exits once every clone of
    /// the limiter is dropped.
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let windows: Weak<DashMap<K, RateLimitWindow>> = Arc::downgrade(&self.windows);
        let window = self.window;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(windows) = windows.upgrade() else {
                    debug!("Rate limiter dropped, stopping sweeper");
                    break;
                };
                sweep_windows(&windows, window);
            }
        })
    }
}

fn sweep_windows<K: Eq + Hash>(windows: &DashMap<K, RateLimitWindow>, window: Duration) {
    let now = Instant::now();
    let max_idle = window * 2;
    let before = windows.len();
    windows.retain(|_, w| now.duration_since(w.window_start) <= max_idle);
    let removed = before.saturating_sub(windows.len());
    if removed > 0 {
        debug!("Swept {} idle rate limit windows", removed);
    }
}

//! Prometheus-compatible metrics endpoint
//!
//! Per-peer session counters, rendered as Prometheus text or JSON.
//! Default endpoint: http://localhost:<METRICS_PORT>/metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

#[cfg(feature = "metrics_server")]
use std::sync::Arc;
#[cfg(feature = "metrics_server")]
use tokio::io::{AsyncReadExt, AsyncWriteExt};
#[cfg(feature = "metrics_server")]
use tokio::net::TcpListener;
#[cfg(feature = "metrics_server")]
use tracing::{debug, info};

const TICK_HISTORY: usize = 1000;

/// Metrics registry for one peer session
#[derive(Debug)]
pub struct Metrics {
    // Network stats
    pub messages_sent: AtomicU64,
    pub messages_received: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub decode_failures: AtomicU64,

    // Match flow
    pub rounds_started: AtomicU64,
    pub goals: AtomicU64,
    pub matches_completed: AtomicU64,
    pub forfeits: AtomicU64,
    /// Host-only operations attempted on a guest
    pub authority_suppressed: AtomicU64,

    // Tick timing (microseconds)
    pub tick_count: AtomicU64,
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_p99_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,

    start_time: Instant,

    tick_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            rounds_started: AtomicU64::new(0),
            goals: AtomicU64::new(0),
            matches_completed: AtomicU64::new(0),
            forfeits: AtomicU64::new(0),
            authority_suppressed: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_p99_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(TICK_HISTORY)),
        }
    }

    #[inline]
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    pub fn record_sent(&self, bytes: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record a tick time and update percentiles
    pub fn record_tick_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        history.push_back(us);
        while history.len() > TICK_HISTORY {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;

            self.tick_time_p95_us.store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_p99_us.store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_max_us.store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("portal_ball_messages_sent_total", "Total messages sent", "counter",
            Self::get(&self.messages_sent));
        metric!("portal_ball_messages_received_total", "Total messages received", "counter",
            Self::get(&self.messages_received));
        metric!("portal_ball_bytes_sent_total", "Total encoded bytes sent", "counter",
            Self::get(&self.bytes_sent));
        metric!("portal_ball_decode_failures_total", "Inbound frames dropped as undecodable", "counter",
            Self::get(&self.decode_failures));

        metric!("portal_ball_rounds_started_total", "Rounds started by this peer as host", "counter",
            Self::get(&self.rounds_started));
        metric!("portal_ball_goals_total", "Goals applied", "counter",
            Self::get(&self.goals));
        metric!("portal_ball_matches_completed_total", "Matches that reached a result", "counter",
            Self::get(&self.matches_completed));
        metric!("portal_ball_forfeits_total", "Matches ended by a peer leaving", "counter",
            Self::get(&self.forfeits));
        metric!("portal_ball_authority_suppressed_total", "Host-only operations suppressed", "counter",
            Self::get(&self.authority_suppressed));

        metric!("portal_ball_tick_count", "Total ticks processed", "counter",
            Self::get(&self.tick_count));
        metric!("portal_ball_tick_time_microseconds", "Current tick time in microseconds", "gauge",
            Self::get(&self.tick_time_us));
        metric!("portal_ball_tick_time_p95_microseconds", "95th percentile tick time", "gauge",
            Self::get(&self.tick_time_p95_us));
        metric!("portal_ball_tick_time_p99_microseconds", "99th percentile tick time", "gauge",
            Self::get(&self.tick_time_p99_us));
        metric!("portal_ball_tick_time_max_microseconds", "Maximum tick time", "gauge",
            Self::get(&self.tick_time_max_us));
        metric!("portal_ball_uptime_seconds", "Peer uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// JSON rendering for direct API access
    pub fn to_json(&self) -> String {
        serde_json::json!({
            "network": {
                "messages_sent": Self::get(&self.messages_sent),
                "messages_received": Self::get(&self.messages_received),
                "bytes_sent": Self::get(&self.bytes_sent),
                "decode_failures": Self::get(&self.decode_failures),
            },
            "match": {
                "rounds_started": Self::get(&self.rounds_started),
                "goals": Self::get(&self.goals),
                "matches_completed": Self::get(&self.matches_completed),
                "forfeits": Self::get(&self.forfeits),
                "authority_suppressed": Self::get(&self.authority_suppressed),
            },
            "performance": {
                "tick_count": Self::get(&self.tick_count),
                "tick_time_us": Self::get(&self.tick_time_us),
                "tick_time_p95_us": Self::get(&self.tick_time_p95_us),
                "tick_time_p99_us": Self::get(&self.tick_time_p99_us),
                "tick_time_max_us": Self::get(&self.tick_time_max_us),
            },
            "uptime_seconds": self.uptime_seconds(),
        })
        .to_string()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the metrics HTTP server
#[cfg(feature = "metrics_server")]
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);
                    let response = http_response(&metrics, &request);
                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}

/// Build the HTTP response for a raw request
#[cfg(feature = "metrics_server")]
fn http_response(metrics: &Metrics, request: &str) -> String {
    let (content_type, body) = if request.starts_with("GET /metrics/json") {
        ("application/json", metrics.to_json())
    } else if request.starts_with("GET /metrics") {
        ("text/plain; version=0.0.4", metrics.to_prometheus())
    } else if request.starts_with("GET /health") {
        ("text/plain", "OK".to_string())
    } else {
        return "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string();
    };
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        content_type,
        body.len(),
        body
    )
}

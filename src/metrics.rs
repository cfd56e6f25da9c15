//! In-process metrics registry (spec §4.K, ambient). No metrics crate
//! appears anywhere in the retrieved corpus, so this is hand-rolled on
//! `std::sync::atomic`, the same primitive the pack reaches for when it
//! needs small concurrent counters (cf. the idempotency plugin's
//! `AtomicBool` in-flight markers).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

const BUCKETS_SECONDS: &[f64] = &[0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0];

#[derive(Default)]
struct Histogram {
    buckets: Vec<AtomicU64>,
    sum_micros: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    fn new() -> Self {
        Self {
            buckets: BUCKETS_SECONDS.iter().map(|_| AtomicU64::new(0)).collect(),
            sum_micros: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    fn observe(&self, duration: Duration) {
        let seconds = duration.as_secs_f64();
        for (bucket, &le) in self.buckets.iter().zip(BUCKETS_SECONDS) {
            if seconds <= le {
                bucket.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.sum_micros
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    fn render(&self, name: &str, labels: &str, out: &mut String) {
        let mut cumulative = 0u64;
        for (bucket, &le) in self.buckets.iter().zip(BUCKETS_SECONDS) {
            cumulative += bucket.load(Ordering::Relaxed);
            let label_sep = if labels.is_empty() { "" } else { "," };
            out.push_str(&format!(
                "{name}_bucket{{{labels}{label_sep}le=\"{le}\"}} {cumulative}\n"
            ));
        }
        let label_sep = if labels.is_empty() { "" } else { "," };
        out.push_str(&format!(
            "{name}_bucket{{{labels}{label_sep}le=\"+Inf\"}} {}\n",
            self.count.load(Ordering::Relaxed)
        ));
        out.push_str(&format!(
            "{name}_sum{{{labels}}} {}\n",
            self.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0
        ));
        out.push_str(&format!(
            "{name}_count{{{labels}}} {}\n",
            self.count.load(Ordering::Relaxed)
        ));
    }
}

/// Process-wide metrics registry, constructed once in `main` and shared
/// via `Arc` the way the teacher shares its `State`.
pub struct Metrics {
    version: String,
    http_duration: Mutex<HashMap<String, Histogram>>,
    request_duration: Mutex<HashMap<String, Histogram>>,
    missing_topology: AtomicU64,
    validation_error_total: AtomicU64,
}

impl Metrics {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            http_duration: Mutex::new(HashMap::new()),
            request_duration: Mutex::new(HashMap::new()),
            missing_topology: AtomicU64::new(0),
            validation_error_total: AtomicU64::new(0),
        }
    }

    pub fn observe_http(&self, method: &str, path: &str, proto: &str, from: &str, status: u16, duration: Duration) {
        let labels = format!(
            "method=\"{method}\",path=\"{path}\",proto=\"{proto}\",from=\"{from}\",status=\"{status}\""
        );
        self.http_duration
            .lock()
            .unwrap()
            .entry(labels)
            .or_insert_with(Histogram::new)
            .observe(duration);
    }

    pub fn observe_request(&self, provider: &str, engine: &str, status: u16, duration: Duration) {
        let labels = format!("provider=\"{provider}\",engine=\"{engine}\",status=\"{status}\"");
        self.request_duration
            .lock()
            .unwrap()
            .entry(labels)
            .or_insert_with(Histogram::new)
            .observe(duration);
    }

    pub fn missing_topology(&self, count: u64) {
        self.missing_topology.store(count, Ordering::Relaxed);
    }

    pub fn validation_error(&self) {
        self.validation_error_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push_str("# HELP topograph_http_request_duration_seconds HTTP handler latency.\n");
        out.push_str("# TYPE topograph_http_request_duration_seconds histogram\n");
        for (labels, histogram) in self.http_duration.lock().unwrap().iter() {
            histogram.render("topograph_http_request_duration_seconds", labels, &mut out);
        }

        out.push_str("# HELP topograph_request_duration_seconds Topology regeneration latency.\n");
        out.push_str("# TYPE topograph_request_duration_seconds histogram\n");
        for (labels, histogram) in self.request_duration.lock().unwrap().iter() {
            histogram.render("topograph_request_duration_seconds", labels, &mut out);
        }

        out.push_str("# HELP topograph_missing_topology Nodes with no discovered topology in the last run.\n");
        out.push_str("# TYPE topograph_missing_topology gauge\n");
        out.push_str(&format!(
            "topograph_missing_topology {}\n",
            self.missing_topology.load(Ordering::Relaxed)
        ));

        out.push_str("# HELP topograph_validation_error_total Non-fatal validation errors encountered.\n");
        out.push_str("# TYPE topograph_validation_error_total counter\n");
        out.push_str(&format!(
            "topograph_validation_error_total {}\n",
            self.validation_error_total.load(Ordering::Relaxed)
        ));

        out.push_str("# HELP topograph_version Build version.\n");
        out.push_str("# TYPE topograph_version gauge\n");
        out.push_str(&format!("topograph_version{{version=\"{}\"}} 1\n", self.version));

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_increments_counter() {
        let metrics = Metrics::new("test");
        metrics.validation_error();
        metrics.validation_error();
        let rendered = metrics.render();
        assert!(rendered.contains("topograph_validation_error_total 2"));
    }

    #[test]
    fn http_histogram_appears_after_observation() {
        let metrics = Metrics::new("test");
        metrics.observe_http("GET", "/healthz", "HTTP/1.1", "127.0.0.1", 200, Duration::from_millis(5));
        let rendered = metrics.render();
        assert!(rendered.contains("topograph_http_request_duration_seconds_bucket"));
        assert!(rendered.contains("status=\"200\""));
    }
}

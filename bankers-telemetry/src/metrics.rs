//! ## bankers-telemetry::metrics
//! **Prometheus counters for banker transactions**

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub grants: IntCounter,
    pub denials: IntCounterVec,
    pub releases: IntCounter,
    pub consumers_done: IntCounter,
    pub denials_per_grant: Histogram,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let grants = IntCounter::new("bankers_grants_total", "Granted resource requests")?;
        let denials = IntCounterVec::new(
            Opts::new("bankers_denials_total", "Denied resource requests"),
            &["reason"],
        )?;
        let releases = IntCounter::new("bankers_releases_total", "Completed releases")?;
        let consumers_done =
            IntCounter::new("bankers_consumers_done_total", "Consumers that reached Done")?;
        let denials_per_grant = Histogram::with_opts(
            HistogramOpts::new(
                "bankers_denials_per_grant",
                "Denied attempts before a request was granted",
            )
            .buckets(vec![0.0, 1.0, 4.0, 16.0, 64.0, 256.0]),
        )?;

        registry.register(Box::new(grants.clone()))?;
        registry.register(Box::new(denials.clone()))?;
        registry.register(Box::new(releases.clone()))?;
        registry.register(Box::new(consumers_done.clone()))?;
        registry.register(Box::new(denials_per_grant.clone()))?;

        Ok(Self {
            registry,
            grants,
            denials,
            releases,
            consumers_done,
            denials_per_grant,
        })
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn record_grant(&self, denials: u64) {
        self.grants.inc();
        self.denials_per_grant.observe(denials as f64);
    }

    /// `reason` is `unavailable` or `unsafe`.
    pub fn record_denial(&self, reason: &str) {
        self.denials.with_label_values(&[reason]).inc();
    }

    pub fn record_release(&self) {
        self.releases.inc();
    }

    pub fn record_consumer_done(&self) {
        self.consumers_done.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_render_in_text_format() {
        let metrics = MetricsRecorder::new().unwrap();
        metrics.record_grant(2);
        metrics.record_denial("unsafe");
        metrics.record_denial("unsafe");
        metrics.record_release();

        let text = metrics.gather_metrics().unwrap();
        assert!(text.contains("bankers_grants_total 1"));
        assert!(text.contains(r#"bankers_denials_total{reason="unsafe"} 2"#));
        assert!(text.contains("bankers_releases_total 1"));
        assert_eq!(metrics.denials_per_grant.get_sample_count(), 1);
    }
}

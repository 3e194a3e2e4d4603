use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default)]
pub struct RetrievalCounters {
    pub total_queries: u64,
    pub cache_hits: u64,
    pub history_hits: u64,
    pub ann_fallbacks: u64,
    pub validation_retries: u64,
    pub validation_refusals: u64,
    pub latencies_us: VecDeque<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct GeneratorCounters {
    pub total_calls: u64,
    pub respawns: u64,
    pub timeouts: u64,
}

pub struct MetricsCollector {
    state: Arc<Mutex<MetricsState>>,
}

struct MetricsState {
    retrieval: RetrievalCounters,
    generator: GeneratorCounters,
    max_history: usize,
}

impl MetricsCollector {
    pub fn new(max_history: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(MetricsState {
                retrieval: RetrievalCounters::default(),
                generator: GeneratorCounters::default(),
                max_history,
            })),
        }
    }

    pub fn record_query(&self, latency_us: u64, source: &str) {
        let mut state = self.state.lock().unwrap();
        state.retrieval.total_queries += 1;
        match source {
            "cache" => state.retrieval.cache_hits += 1,
            "history" => state.retrieval.history_hits += 1,
            "ann" => state.retrieval.ann_fallbacks += 1,
            _ => {}
        }
        state.retrieval.latencies_us.push_back(latency_us);
        if state.retrieval.latencies_us.len() > state.max_history {
            state.retrieval.latencies_us.pop_front();
        }
    }

    pub fn record_validation_retry(&self) {
        self.state.lock().unwrap().retrieval.validation_retries += 1;
    }

    pub fn record_validation_refusal(&self) {
        self.state.lock().unwrap().retrieval.validation_refusals += 1;
    }

    pub fn record_generator_call(&self) {
        self.state.lock().unwrap().generator.total_calls += 1;
    }

    pub fn record_generator_respawn(&self) {
        self.state.lock().unwrap().generator.respawns += 1;
    }

    pub fn record_generator_timeout(&self) {
        self.state.lock().unwrap().generator.timeouts += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.state.lock().unwrap();
        let r = &state.retrieval;
        let g = &state.generator;

        let mut sorted_latencies: Vec<u64> = r.latencies_us.iter().copied().collect();
        sorted_latencies.sort_unstable();

        let p50 = percentile(&sorted_latencies, 50.0);
        let p95 = percentile(&sorted_latencies, 95.0);
        let p99 = percentile(&sorted_latencies, 99.0);

        let hit_rate = if r.total_queries > 0 {
            (r.cache_hits + r.history_hits) as f32 / r.total_queries as f32
        } else {
            0.0
        };

        MetricsSnapshot {
            total_queries: r.total_queries,
            hit_rate,
            p50,
            p95,
            p99,
            validation_retries: r.validation_retries,
            validation_refusals: r.validation_refusals,
            generator_calls: g.total_calls,
            generator_respawns: g.respawns,
            generator_timeouts: g.timeouts,
        }
    }
}

fn percentile(sorted: &[u64], p: f32) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let idx = ((p / 100.0) * (sorted.len() as f32)).ceil() as usize;
    sorted[idx.saturating_sub(1).min(sorted.len() - 1)]
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MetricsSnapshot {
    pub total_queries: u64,
    pub hit_rate: f32,
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
    pub validation_retries: u64,
    pub validation_refusals: u64,
    pub generator_calls: u64,
    pub generator_respawns: u64,
    pub generator_timeouts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_counts_cache_and_history_as_hits() {
        let m = MetricsCollector::new(100);
        m.record_query(10, "cache");
        m.record_query(20, "history");
        m.record_query(30, "ann");
        let snap = m.snapshot();
        assert_eq!(snap.total_queries, 3);
        assert!((snap.hit_rate - (2.0 / 3.0)).abs() < 1e-6);
    }

    #[test]
    fn latency_history_is_bounded() {
        let m = MetricsCollector::new(2);
        m.record_query(1, "ann");
        m.record_query(2, "ann");
        m.record_query(3, "ann");
        let snap = m.snapshot();
        assert_eq!(snap.p50, 3);
    }
}

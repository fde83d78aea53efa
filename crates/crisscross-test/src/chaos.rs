//! Chaos network for broadcast testing
//!
//! Simulates hostile links:
//! - Latency and jitter
//! - Loss
//! - Reordering
//! - Duplication
//!
//! Everything is driven by a seeded `StdRng`, so a failing seed replays
//! exactly.

use std::time::Duration;

use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Jitter distribution type
#[derive(Clone, Debug)]
pub enum JitterDistribution {
    /// Uniform distribution
    Uniform { min_ms: u32, max_ms: u32 },
    /// Pareto distribution (heavy tail), capped at one second
    Pareto { scale_ms: f64, shape: f64 },
}

impl JitterDistribution {
    pub fn sample(&self, rng: &mut StdRng) -> Duration {
        match self {
            JitterDistribution::Uniform { min_ms, max_ms } => {
                if max_ms <= min_ms {
                    return Duration::from_millis(*min_ms as u64);
                }
                let dist = Uniform::new(*min_ms, *max_ms);
                Duration::from_millis(dist.sample(rng) as u64)
            }
            JitterDistribution::Pareto { scale_ms, shape } => {
                let u: f64 = rng.gen_range(f64::EPSILON..1.0);
                let value = scale_ms / u.powf(1.0 / shape);
                Duration::from_millis(value.min(1000.0) as u64)
            }
        }
    }
}

/// Link conditions
#[derive(Clone, Debug)]
pub struct ChaosConfig {
    pub base_latency: Duration,
    pub jitter: JitterDistribution,
    /// Loss rate (0.0 - 1.0)
    pub loss_rate: f64,
    /// Probability that an item overtakes up to `reorder_depth` earlier items
    pub reorder_prob: f64,
    pub reorder_depth: u32,
    /// Probability that an item arrives twice
    pub duplicate_prob: f64,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        ChaosConfig {
            base_latency: Duration::from_millis(20),
            jitter: JitterDistribution::Uniform {
                min_ms: 0,
                max_ms: 30,
            },
            loss_rate: 0.0,
            reorder_prob: 0.1,
            reorder_depth: 3,
            duplicate_prob: 0.05,
        }
    }
}

impl ChaosConfig {
    /// Instant, in-order, lossless
    pub fn perfect() -> Self {
        ChaosConfig {
            base_latency: Duration::ZERO,
            jitter: JitterDistribution::Uniform { min_ms: 0, max_ms: 0 },
            loss_rate: 0.0,
            reorder_prob: 0.0,
            reorder_depth: 0,
            duplicate_prob: 0.0,
        }
    }

    /// Lossless but heavily reordered and duplicated
    ///
    /// Causal delivery has no retransmission, so this is the harshest link
    /// under which every message must still be delivered.
    pub fn scrambled() -> Self {
        ChaosConfig {
            base_latency: Duration::from_millis(10),
            jitter: JitterDistribution::Pareto {
                scale_ms: 20.0,
                shape: 1.5,
            },
            loss_rate: 0.0,
            reorder_prob: 0.4,
            reorder_depth: 8,
            duplicate_prob: 0.2,
        }
    }

    /// Lossy link, for failure paths
    pub fn lossy(loss_rate: f64) -> Self {
        ChaosConfig {
            loss_rate,
            ..Self::default()
        }
    }
}

/// Item in flight
#[derive(Clone, Debug)]
struct InFlight<T> {
    item: T,
    delivery_time: Duration,
    send_time: Duration,
    /// Tie-break among equal delivery times: `(seq, 1)`, or
    /// `(overtaken seq, 0)` for an item that overtook another
    rank: (u64, u8),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChaosStats {
    pub sent: u64,
    pub delivered: u64,
    pub lost: u64,
    pub reordered: u64,
    pub duplicated: u64,
    pub total_latency_ms: u64,
    pub max_latency_ms: u64,
}

impl ChaosStats {
    pub fn loss_rate(&self) -> f64 {
        if self.sent == 0 {
            0.0
        } else {
            self.lost as f64 / self.sent as f64
        }
    }

    pub fn avg_latency_ms(&self) -> f64 {
        if self.delivered == 0 {
            0.0
        } else {
            self.total_latency_ms as f64 / self.delivered as f64
        }
    }
}

/// One simulated link
pub struct ChaosNetwork<T> {
    config: ChaosConfig,
    rng: StdRng,
    in_flight: Vec<InFlight<T>>,
    current_time: Duration,
    next_seq: u64,
    stats: ChaosStats,
}

impl<T: Clone> ChaosNetwork<T> {
    pub fn new(config: ChaosConfig, seed: u64) -> Self {
        ChaosNetwork {
            config,
            rng: StdRng::seed_from_u64(seed),
            in_flight: Vec::new(),
            current_time: Duration::ZERO,
            next_seq: 0,
            stats: ChaosStats::default(),
        }
    }

    /// Put an item on the link
    pub fn send(&mut self, item: T) {
        self.stats.sent += 1;
        let seq = self.next_seq;
        self.next_seq += 1;

        if self.rng.gen::<f64>() < self.config.loss_rate {
            self.stats.lost += 1;
            return;
        }

        let latency = self.config.base_latency + self.config.jitter.sample(&mut self.rng);
        let mut delivery_time = self.current_time + latency;
        let mut rank = (seq, 1);

        // Overtake: arrive no later than one of the last few items
        if self.rng.gen::<f64>() < self.config.reorder_prob && !self.in_flight.is_empty() {
            let depth = (self.config.reorder_depth as usize).min(self.in_flight.len()).max(1);
            let back = self.rng.gen_range(1..=depth);
            let target = &self.in_flight[self.in_flight.len() - back];
            if target.delivery_time <= delivery_time {
                delivery_time = target.delivery_time;
                rank = (target.rank.0, 0);
                self.stats.reordered += 1;
            }
        }

        if self.rng.gen::<f64>() < self.config.duplicate_prob {
            let extra = self.config.jitter.sample(&mut self.rng);
            self.in_flight.push(InFlight {
                item: item.clone(),
                delivery_time: delivery_time + extra,
                send_time: self.current_time,
                rank: (seq, 1),
            });
            self.stats.duplicated += 1;
        }

        self.in_flight.push(InFlight {
            item,
            delivery_time,
            send_time: self.current_time,
            rank,
        });
    }

    /// Advance time and collect arrivals, earliest first
    pub fn tick(&mut self, dt: Duration) -> Vec<T> {
        self.current_time += dt;
        let now = self.current_time;

        let (mut due, pending): (Vec<_>, Vec<_>) = self
            .in_flight
            .drain(..)
            .partition(|f| f.delivery_time <= now);
        self.in_flight = pending;

        due.sort_by_key(|f| (f.delivery_time, f.rank));

        due.into_iter()
            .map(|f| {
                let latency = (f.delivery_time - f.send_time).as_millis() as u64;
                self.stats.delivered += 1;
                self.stats.total_latency_ms += latency;
                self.stats.max_latency_ms = self.stats.max_latency_ms.max(latency);
                f.item
            })
            .collect()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn stats(&self) -> &ChaosStats {
        &self.stats
    }

    pub fn current_time(&self) -> Duration {
        self.current_time
    }
}

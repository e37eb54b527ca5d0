// IN-MEMORY CHANNEL PAIR
// Deterministic lossy channels for tests and simulation. Each direction has
// its own fault configuration and statistics; behavior is reproducible from
// the seed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use log::trace;
use tokio::sync::mpsc;

use crate::contract::{Transport, TransportError};

/// Fault injection for one direction of a channel.
///
/// Probabilities are clamped to [0, 1] at the point of use.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaultConfig {
    /// Probability that a submitted frame is silently dropped
    pub loss_rate: f64,

    /// Probability that a frame is held back and overtaken by a later one
    pub reorder_probability: f64,

    /// Probability that a frame is delivered twice
    pub duplicate_probability: f64,
}

impl FaultConfig {
    /// Every frame delivered, in order, exactly once.
    pub fn perfect() -> Self {
        Self {
            loss_rate: 0.0,
            reorder_probability: 0.0,
            duplicate_probability: 0.0,
        }
    }

    /// Random loss at the given rate, no reordering or duplication.
    pub fn lossy(loss_rate: f64) -> Self {
        Self {
            loss_rate,
            ..Self::perfect()
        }
    }

    /// Nothing ever arrives. Models a permanent one-way partition.
    pub fn blackhole() -> Self {
        Self::lossy(1.0)
    }
}

/// Per-direction delivery counters.
#[derive(Debug, Default)]
pub struct ChannelStats {
    sent: AtomicU64,
    lost: AtomicU64,
    duplicated: AtomicU64,
    delivered: AtomicU64,
}

/// A point-in-time copy of [`ChannelStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub sent: u64,
    pub lost: u64,
    pub duplicated: u64,
    pub delivered: u64,
}

impl ChannelStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sent: self.sent.load(Ordering::Relaxed),
            lost: self.lost.load(Ordering::Relaxed),
            duplicated: self.duplicated.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
        }
    }
}

/// Send-side state for one direction: fault decisions share one seeded RNG
/// per direction, so a run is reproducible from the pair's seed.
struct SendSide {
    config: FaultConfig,
    rng: Mutex<StdRng>,
    /// Frame held back by a reorder decision, delivered after a later frame.
    held_back: Mutex<Option<Vec<u8>>>,
    stats: Arc<ChannelStats>,
}

impl SendSide {
    fn submit(
        &self,
        tx: &mpsc::UnboundedSender<Vec<u8>>,
        frame: Vec<u8>,
    ) -> Result<(), TransportError> {
        self.stats.sent.fetch_add(1, Ordering::Relaxed);

        let (lose, duplicate, reorder) = {
            let mut rng = self.rng.lock().unwrap();
            (
                rng.gen::<f64>() < self.config.loss_rate.clamp(0.0, 1.0),
                rng.gen::<f64>() < self.config.duplicate_probability.clamp(0.0, 1.0),
                rng.gen::<f64>() < self.config.reorder_probability.clamp(0.0, 1.0),
            )
        };

        if lose {
            self.stats.lost.fetch_add(1, Ordering::Relaxed);
            trace!("in-memory channel dropped a {}-octet frame", frame.len());
            return Ok(());
        }

        if reorder {
            // Hold this frame back; it is released behind the next one.
            let prior = self.held_back.lock().unwrap().replace(frame);
            if let Some(prior) = prior {
                self.deliver(tx, prior)?;
            }
            return Ok(());
        }

        if duplicate {
            self.stats.duplicated.fetch_add(1, Ordering::Relaxed);
            self.deliver(tx, frame.clone())?;
        }
        self.deliver(tx, frame)?;

        if let Some(held) = self.held_back.lock().unwrap().take() {
            self.deliver(tx, held)?;
        }
        Ok(())
    }

    fn deliver(
        &self,
        tx: &mpsc::UnboundedSender<Vec<u8>>,
        frame: Vec<u8>,
    ) -> Result<(), TransportError> {
        tx.send(frame)
            .map_err(|_| TransportError::Closed("peer endpoint dropped".into()))
    }
}

/// One endpoint of an in-memory channel pair.
pub struct InMemoryTransport {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    send_side: Arc<SendSide>,
    recv_stats: Arc<ChannelStats>,
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn send(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        self.send_side.submit(&self.tx, frame)
    }

    async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        match self.rx.recv().await {
            Some(frame) => {
                self.recv_stats.delivered.fetch_add(1, Ordering::Relaxed);
                Ok(frame)
            }
            None => Err(TransportError::Closed("peer endpoint dropped".into())),
        }
    }
}

/// A bidirectional in-memory channel between two endpoints, with independent
/// fault injection and statistics per direction.
pub struct ChannelPair {
    pub alice: InMemoryTransport,
    pub bob: InMemoryTransport,
    pub alice_to_bob: Arc<ChannelStats>,
    pub bob_to_alice: Arc<ChannelStats>,
}

impl ChannelPair {
    /// Build a pair with direction-specific fault configs. All randomness
    /// derives from `seed`.
    pub fn new(a_to_b: FaultConfig, b_to_a: FaultConfig, seed: u64) -> Self {
        let (tx_ab, rx_ab) = mpsc::unbounded_channel();
        let (tx_ba, rx_ba) = mpsc::unbounded_channel();

        let stats_ab = Arc::new(ChannelStats::default());
        let stats_ba = Arc::new(ChannelStats::default());

        let alice_send = Arc::new(SendSide {
            config: a_to_b,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            held_back: Mutex::new(None),
            stats: stats_ab.clone(),
        });
        let bob_send = Arc::new(SendSide {
            config: b_to_a,
            rng: Mutex::new(StdRng::seed_from_u64(seed.wrapping_add(1))),
            held_back: Mutex::new(None),
            stats: stats_ba.clone(),
        });

        let alice = InMemoryTransport {
            tx: tx_ab,
            rx: rx_ba,
            send_side: alice_send,
            recv_stats: stats_ba.clone(),
        };
        let bob = InMemoryTransport {
            tx: tx_ba,
            rx: rx_ab,
            send_side: bob_send,
            recv_stats: stats_ab.clone(),
        };

        Self {
            alice,
            bob,
            alice_to_bob: stats_ab,
            bob_to_alice: stats_ba,
        }
    }

    /// Same faults in both directions.
    pub fn symmetric(config: FaultConfig, seed: u64) -> Self {
        Self::new(config, config, seed)
    }

    /// No faults at all.
    pub fn perfect() -> Self {
        Self::symmetric(FaultConfig::perfect(), 0)
    }
}

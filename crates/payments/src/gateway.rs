//! Payment gateway trait, the simulated gateway and an in-memory gateway for tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::{Payment, PaymentOutcome, TransactionId};
use rand::Rng;
use tokio::sync::{RwLock, watch};

/// Reason recorded when the simulated gateway declines a payment.
pub const SIMULATED_DECLINE_REASON: &str = "Payment declined by gateway (simulated)";

/// Trait for settling payments with an external gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Settles a payment and returns its terminal outcome.
    ///
    /// May take arbitrarily long; callers hold no lock or transaction while
    /// waiting.
    async fn settle(&self, payment: &Payment) -> PaymentOutcome;
}

/// Gateway that waits a random delay and approves with a fixed probability.
#[derive(Debug, Clone)]
pub struct SimulatedGateway {
    min_delay: Duration,
    max_delay: Duration,
    success_rate: f64,
}

impl SimulatedGateway {
    /// Creates a gateway. A `max_delay` below `min_delay` is raised to it and
    /// the success rate is clamped to `0.0..=1.0`.
    pub fn new(min_delay: Duration, max_delay: Duration, success_rate: f64) -> Self {
        Self {
            min_delay,
            max_delay: max_delay.max(min_delay),
            success_rate: if success_rate.is_nan() {
                0.0
            } else {
                success_rate.clamp(0.0, 1.0)
            },
        }
    }

    pub fn success_rate(&self) -> f64 {
        self.success_rate
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(5), 0.9)
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn settle(&self, payment: &Payment) -> PaymentOutcome {
        let (delay, approved) = {
            let mut rng = rand::thread_rng();
            (
                rng.gen_range(self.min_delay..=self.max_delay),
                rng.gen_bool(self.success_rate),
            )
        };

        tracing::debug!(
            transaction_id = %payment.transaction_id,
            delay_ms = delay.as_millis() as u64,
            "gateway processing payment"
        );
        tokio::time::sleep(delay).await;

        if approved {
            PaymentOutcome::Success
        } else {
            PaymentOutcome::failed(SIMULATED_DECLINE_REASON)
        }
    }
}

#[derive(Debug)]
struct InMemoryGatewayState {
    outcome: PaymentOutcome,
    settled: Vec<TransactionId>,
}

/// In-memory gateway for testing.
///
/// Returns a configurable outcome immediately, unless held: a held gateway
/// parks every settlement until [`InMemoryGateway::release`] is called.
#[derive(Debug, Clone)]
pub struct InMemoryGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
    open: Arc<watch::Sender<bool>>,
}

impl InMemoryGateway {
    /// Creates a gateway that approves every payment.
    pub fn new() -> Self {
        let (open, _) = watch::channel(true);
        Self {
            state: Arc::new(RwLock::new(InMemoryGatewayState {
                outcome: PaymentOutcome::Success,
                settled: Vec::new(),
            })),
            open: Arc::new(open),
        }
    }

    /// Sets the outcome returned for subsequent settlements.
    pub async fn set_outcome(&self, outcome: PaymentOutcome) {
        self.state.write().await.outcome = outcome;
    }

    /// Parks settlements until released.
    pub fn hold(&self) {
        self.open.send_replace(false);
    }

    /// Lets parked and future settlements through.
    pub fn release(&self) {
        self.open.send_replace(true);
    }

    /// Transaction ids of the payments that passed through the gateway.
    pub async fn settled(&self) -> Vec<TransactionId> {
        self.state.read().await.settled.clone()
    }
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryGateway {
    async fn settle(&self, payment: &Payment) -> PaymentOutcome {
        let mut open = self.open.subscribe();
        // The sender lives as long as self, so this only returns once open.
        let _ = open.wait_for(|open| *open).await;

        let mut state = self.state.write().await;
        state.settled.push(payment.transaction_id.clone());
        state.outcome.clone()
    }
}

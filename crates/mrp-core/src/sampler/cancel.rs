//! Cooperative cancellation shared by the chain threads.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Flag checked by every chain between iterations.
///
/// Clones share the flag and the set of individually cancelled chains.
/// A deadline, when set, trips the token on its own.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    chains: Arc<Mutex<BTreeSet<usize>>>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same flag, additionally cancelled once `timeout` has elapsed from now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        CancellationToken {
            flag: Arc::clone(&self.flag),
            chains: Arc::clone(&self.chains),
            deadline: Some(self.deadline.map_or(deadline, |d| d.min(deadline))),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Stop chain `chain` only; the other chains keep running.
    pub fn cancel_chain(&self, chain: usize) {
        if let Ok(mut chains) = self.chains.lock() {
            chains.insert(chain);
        }
    }

    /// Whether chain `chain` should stop, either on its own or with the run.
    pub fn is_chain_cancelled(&self, chain: usize) -> bool {
        self.is_cancelled()
            || self
                .chains
                .lock()
                .map(|chains| chains.contains(&chain))
                .unwrap_or(false)
    }

    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::Relaxed) {
            return true;
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.flag.store(true, Ordering::SeqCst);
                true
            }
            _ => false,
        }
    }
}

//! Sticky record of whether the privileged avatar lookup is usable.

use std::sync::atomic::{AtomicU8, Ordering};

use log::info;

use crate::types::CapabilityState;

const UNKNOWN: u8 = 0;
const AVAILABLE: u8 = 1;
const UNAVAILABLE: u8 = 2;

/// Remembers the outcome of privileged lookups for the lifetime of its owner.
///
/// Once marked unavailable the state never changes back.
#[derive(Debug, Default)]
pub struct CapabilityProber {
    state: AtomicU8,
}

impl CapabilityProber {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> CapabilityState {
        match self.state.load(Ordering::Acquire) {
            AVAILABLE => CapabilityState::Available,
            UNAVAILABLE => CapabilityState::Unavailable,
            _ => CapabilityState::Unknown,
        }
    }

    /// Whether a privileged lookup should be tried at all.
    #[must_use]
    pub fn should_attempt(&self) -> bool {
        self.state() != CapabilityState::Unavailable
    }

    pub fn mark_available(&self) {
        if self
            .state
            .compare_exchange(UNKNOWN, AVAILABLE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            info!("Privileged avatar lookup is available");
        }
    }

    pub fn mark_unavailable(&self) {
        if self.state.swap(UNAVAILABLE, Ordering::AcqRel) != UNAVAILABLE {
            info!("Privileged avatar lookup marked unavailable; using direct reads from now on");
        }
    }
}

//! Non-reentrant critical section held for the duration of every public entry point.

use defi_agg_domain::{AggregatorError, AggregatorResult};

#[derive(Debug, Clone, Copy, Default)]
pub struct ReentrancyGuard {
    entered: bool,
}

impl ReentrancyGuard {
    /// Enters the critical section, failing if it is already held.
    pub fn enter(&mut self) -> AggregatorResult<()> {
        if self.entered {
            return Err(AggregatorError::Reentrancy);
        }
        self.entered = true;
        Ok(())
    }

    pub fn exit(&mut self) {
        self.entered = false;
    }

    #[must_use]
    pub fn is_entered(&self) -> bool {
        self.entered
    }
}

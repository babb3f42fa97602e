//! # Shared Engine
//!
//! Cloneable handle for concurrent callers. Every call holds one
//! `parking_lot::Mutex` for its whole duration, so operations are strictly
//! serialized in lock-acquisition order and callers only ever observe
//! committed states. The lock is never held across anything but the
//! closure passed in.

use std::sync::Arc;

use parking_lot::Mutex;

use regtoken_core::{Clock, SystemClock};

use crate::engine::Engine;

/// Thread-safe handle to one [`Engine`].
#[derive(Debug)]
pub struct SharedEngine<C: Clock = SystemClock> {
    inner: Arc<Mutex<Engine<C>>>,
}

impl<C: Clock> Clone for SharedEngine<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Clock> SharedEngine<C> {
    /// Wrap an engine.
    pub fn new(engine: Engine<C>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    /// Run one step with exclusive access.
    pub fn with<R>(&self, f: impl FnOnce(&mut Engine<C>) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// Run a read-only step. Still exclusive: reads never interleave with
    /// a step in progress.
    pub fn read<R>(&self, f: impl FnOnce(&Engine<C>) -> R) -> R {
        f(&self.inner.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regtoken_core::{Address, FixedClock, TokenId};

    #[test]
    fn test_concurrent_steps_are_serialized() {
        let mut engine = Engine::with_clock(FixedClock::at_epoch(1_000).unwrap());
        let owner = Address::derive("owner");
        let issuer = engine.create_issuer(&[owner.clone()], 1).unwrap();
        let module = Address::derive("mint-burn");
        engine.attach_module(&owner, &issuer, &module).unwrap();
        let token: TokenId = engine
            .add_token(&owner, &issuer, "Fund", "FND", 0)
            .unwrap()
            .executed()
            .unwrap();

        let shared = SharedEngine::new(engine);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let shared = shared.clone();
                let module = module.clone();
                let token = token.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        shared.with(|e| e.mint(&module, &token, 2)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(shared.read(|e| e.total_supply(&token)).unwrap(), 400);
        assert_eq!(shared.read(|e| e.treasury_supply(&token)).unwrap(), 400);
    }
}

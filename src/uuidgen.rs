//! Shared PRNG for `{uuid}` template substitution.
//!
//! Only URLs containing `{uuid}` placeholders pay the synchronization
//! cost; everyone else never touches this mutex.

use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::SeedableRng;
use uuid::Uuid;

#[derive(Clone)]
pub struct SharedUuidSource(Arc<Mutex<StdRng>>);

impl SharedUuidSource {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(StdRng::from_entropy())))
    }

    pub fn next(&self) -> Uuid {
        let mut rng = self.0.lock().unwrap();
        let mut bytes = [0u8; 16];
        rand::RngCore::fill_bytes(&mut *rng, &mut bytes);
        uuid::Builder::from_random_bytes(bytes).into_uuid()
    }
}

impl Default for SharedUuidSource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_source_produces_distinct_v4_uuids() {
        let src = SharedUuidSource::new();
        let a = src.next();
        let b = src.next();
        assert_ne!(a, b);
        assert_eq!(a.get_version_num(), 4);
    }
}

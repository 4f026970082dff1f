//! Randomness for SRTP keying material and SSRCs.

/// Source of the random values a new SRTP endpoint needs.
///
/// The default [`ThreadRandom`] draws from the thread-local CSPRNG; tests
/// substitute a deterministic source.
pub trait RandomSource: Send + Sync {
    fn master_key(&self) -> [u8; 16];
    fn master_salt(&self) -> [u8; 14];
    /// Per RFC 3550 §8.1, chosen randomly to avoid collisions.
    fn ssrc(&self) -> u32;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn master_key(&self) -> [u8; 16] {
        rand::random()
    }

    fn master_salt(&self) -> [u8; 14] {
        rand::random()
    }

    fn ssrc(&self) -> u32 {
        rand::random()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_random_differs() {
        let r = ThreadRandom;
        assert_ne!(r.master_key(), r.master_key());
        assert_ne!(r.ssrc(), r.ssrc());
    }
}

//! Correlated randomness for the additive protocol.
//!
//! Simulates a trusted dealer: both parties derive the same seed for every
//! request from the session id and a request counter, expand the full
//! correlated values from it, and keep only their own share.

use super::*;
use crate::computation::SessionId;
use aes_prng::AesRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicU64, Ordering};

pub(crate) struct Dealer {
    derived_key: [u8; 32],
    party: usize,
    counter: AtomicU64,
}

impl Dealer {
    pub(crate) fn new(session_id: &SessionId, party: usize) -> Dealer {
        let derived_key = blake3::derive_key("secquery dealer seed", session_id.as_bytes());
        Dealer {
            derived_key,
            party,
            counter: AtomicU64::new(0),
        }
    }

    fn next_rng(&self) -> AesRng {
        let nonce = self.counter.fetch_add(1, Ordering::SeqCst);
        let mut keyed_hash = blake3::Hasher::new_keyed(&self.derived_key);
        keyed_hash.update(&nonce.to_le_bytes());
        let mut digest = keyed_hash.finalize_xof();

        let mut seed = <AesRng as SeedableRng>::Seed::default();
        digest.fill(seed.as_mut());
        AesRng::from_seed(seed)
    }

    /// This party's share of `x`, using `rng` for the share of party 0.
    fn share_of(&self, rng: &mut AesRng, x: &RingTensor) -> RingTensor {
        let x0 = random_ring(rng, x.len());
        if self.party == 0 {
            x0
        } else {
            ring_sub(x, &x0)
        }
    }

    /// Shares of a multiplication triple `(a, b, a * b)`.
    pub(crate) fn beaver_triple(&self, len: usize) -> (RingTensor, RingTensor, RingTensor) {
        let mut rng = self.next_rng();
        let a = random_ring(&mut rng, len);
        let b = random_ring(&mut rng, len);
        let c = ring_mul(&a, &b);
        (
            self.share_of(&mut rng, &a),
            self.share_of(&mut rng, &b),
            self.share_of(&mut rng, &c),
        )
    }

    /// Shares of a random fixed-point mask in `[1, 2)`.
    pub(crate) fn positive_mask(&self, len: usize, precision: u32) -> RingTensor {
        let mut rng = self.next_rng();
        let low_bits = (1_u128 << precision) - 1;
        let values: Vec<RingElement> = (0..len)
            .map(|_| Wrapping((1_u128 << precision) | (random_u128(&mut rng) & low_bits)))
            .collect();
        let r = Array1::from(values).into_shared();
        self.share_of(&mut rng, &r)
    }

    /// Shares of `r_top << precision` and `r_top` for a random `r_top` of
    /// `mask_bits` bits.
    pub(crate) fn floor_mask(
        &self,
        len: usize,
        precision: u32,
        mask_bits: u32,
    ) -> (RingTensor, RingTensor) {
        let mut rng = self.next_rng();
        let top_bits = (1_u128 << mask_bits) - 1;
        let values: Vec<RingElement> = (0..len)
            .map(|_| Wrapping(random_u128(&mut rng) & top_bits))
            .collect();
        let r_top = Array1::from(values).into_shared();
        let r = ring_map(&r_top, |v| Wrapping(v.0 << precision));
        (
            self.share_of(&mut rng, &r),
            self.share_of(&mut rng, &r_top),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::TryFrom;

    fn dealers() -> (Dealer, Dealer) {
        let sid = SessionId::try_from("dealer-test").unwrap();
        (Dealer::new(&sid, 0), Dealer::new(&sid, 1))
    }

    #[test]
    fn beaver_triple_is_consistent() {
        let (d0, d1) = dealers();
        let (a0, b0, c0) = d0.beaver_triple(4);
        let (a1, b1, c1) = d1.beaver_triple(4);
        let a = ring_add(&a0, &a1);
        let b = ring_add(&b0, &b1);
        assert_eq!(ring_add(&c0, &c1), ring_mul(&a, &b));
    }

    #[test]
    fn positive_mask_in_range() {
        let (d0, d1) = dealers();
        let r = ring_add(&d0.positive_mask(16, 18), &d1.positive_mask(16, 18));
        assert!(r.iter().all(|v| v.0 >= 1 << 18 && v.0 < 1 << 19));
    }

    #[test]
    fn floor_mask_is_consistent() {
        let (d0, d1) = dealers();
        let (r0, t0) = d0.floor_mask(8, 18, 96);
        let (r1, t1) = d1.floor_mask(8, 18, 96);
        let r = ring_add(&r0, &r1);
        let r_top = ring_add(&t0, &t1);
        for (r, r_top) in r.iter().zip(r_top.iter()) {
            assert_eq!(r.0, r_top.0 << 18);
            assert!(r_top.0 < 1 << 96);
        }
    }

    #[test]
    fn requests_use_fresh_randomness() {
        let (d0, _) = dealers();
        let (a, _, _) = d0.beaver_triple(4);
        let (b, _, _) = d0.beaver_triple(4);
        assert_ne!(a, b);
    }
}

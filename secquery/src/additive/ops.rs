//! Secure arithmetic on additive shares.

use super::*;
use crate::computation::{RendezvousKey, SessionId};
use crate::config::ProtocolConfig;
use crate::networking::AsyncNetworkingImpl;
use crate::types::Role;
use aes_prng::AesRng;
use ndarray::s;
use std::sync::atomic::{AtomicU64, Ordering};

/// Upper bound on the fractional bits of public reciprocals used during
/// division.
const RECIPROCAL_BITS: u32 = 64;

/// Bit length of the statistical mask used to open a quotient for flooring.
const FLOOR_MASK_BITS: u32 = 96;

/// Largest bit length of a scaled quotient before truncation.
const SAFE_RING_BITS: u32 = 104;

const NEGATIVE: RingElement = Wrapping(u128::MAX);

/// Per-party handle to the two-party additive protocol.
///
/// Both parties must call the same sequence of operations on their handles;
/// rendezvous keys and dealer randomness are derived from per-handle counters.
pub struct AdditiveProtocol {
    session_id: SessionId,
    role: Role,
    peer: Role,
    party: usize,
    fraction_bits: u32,
    division_bias_bits: u32,
    networking: AsyncNetworkingImpl,
    dealer: Dealer,
    rendezvous_counter: AtomicU64,
}

impl AdditiveProtocol {
    pub fn new(
        session_id: SessionId,
        config: &ProtocolConfig,
        role: &Role,
        networking: AsyncNetworkingImpl,
    ) -> Result<Self> {
        config.validate()?;
        let party = config.party_index(role)?;
        let peer = config.parties[1 - party].clone();
        let dealer = Dealer::new(&session_id, party);
        Ok(AdditiveProtocol {
            session_id,
            role: role.clone(),
            peer,
            party,
            fraction_bits: config.fraction_bits,
            division_bias_bits: config.division_bias_bits,
            networking,
            dealer,
            rendezvous_counter: AtomicU64::new(0),
        })
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn fraction_bits(&self) -> u32 {
        self.fraction_bits
    }

    fn next_rendezvous_key(&self) -> RendezvousKey {
        RendezvousKey::from(self.rendezvous_counter.fetch_add(1, Ordering::SeqCst) as u128)
    }

    /// Send `value` to the peer and receive the peer's counterpart.
    async fn exchange(&self, value: &RingTensor) -> Result<RingTensor> {
        let first = self.next_rendezvous_key();
        let second = self.next_rendezvous_key();
        let (outgoing, incoming) = if self.party == 0 {
            (first, second)
        } else {
            (second, first)
        };
        self.networking
            .send(value, &self.peer, &outgoing, &self.session_id)
            .await?;
        self.networking
            .receive(&self.peer, &incoming, &self.session_id)
            .await
    }

    async fn open_ring(&self, x: &RingTensor) -> Result<RingTensor> {
        let other = self.exchange(x).await?;
        check_same_len(x, &other)?;
        Ok(ring_add(x, &other))
    }

    /// Reveal a secret to both parties.
    pub async fn open(&self, x: &AdtShare) -> Result<HostColumn> {
        tracing::debug!("Opening secret of {} elements to {}", x.len(), self.peer);
        let opened = self.open_ring(&x.share).await?;
        decode(&opened, x.dtype, x.precision)
    }

    /// Promote a value both parties know; party 0 holds it, party 1 holds zero.
    pub fn share_public(&self, column: &HostColumn) -> Result<AdtShare> {
        let (encoded, precision) = encode(column, self.fraction_bits)?;
        let share = if self.party == 0 {
            encoded
        } else {
            ring_map(&encoded, |_| Wrapping(0))
        };
        Ok(AdtShare {
            share,
            dtype: column.data_type(),
            precision,
        })
    }

    /// Promote a value held only by this party.
    ///
    /// Must be matched by `receive_private` on the peer.
    pub async fn share_private(&self, column: &HostColumn) -> Result<AdtShare> {
        let (encoded, precision) = encode(column, self.fraction_bits)?;
        let mut rng = AesRng::from_random_seed();
        let mask = random_ring(&mut rng, encoded.len());
        let key = self.next_rendezvous_key();
        self.networking
            .send(&mask, &self.peer, &key, &self.session_id)
            .await?;
        Ok(AdtShare {
            share: ring_sub(&encoded, &mask),
            dtype: column.data_type(),
            precision,
        })
    }

    /// Receive this party's share of a value private to `owner`.
    pub async fn receive_private(&self, dtype: DataType, owner: &Role) -> Result<AdtShare> {
        let precision = precision_for(dtype, self.fraction_bits)?;
        let key = self.next_rendezvous_key();
        let share = self
            .networking
            .receive(owner, &key, &self.session_id)
            .await?;
        Ok(AdtShare {
            share,
            dtype,
            precision,
        })
    }

    pub fn add(&self, x: &AdtShare, y: &AdtShare) -> Result<AdtShare> {
        let dtype = common_dtype(x, y)?;
        let (xs, ys, precision) = align(x, y)?;
        Ok(AdtShare {
            share: ring_add(&xs, &ys),
            dtype,
            precision,
        })
    }

    pub fn sub(&self, x: &AdtShare, y: &AdtShare) -> Result<AdtShare> {
        let dtype = common_dtype(x, y)?;
        let (xs, ys, precision) = align(x, y)?;
        Ok(AdtShare {
            share: ring_sub(&xs, &ys),
            dtype,
            precision,
        })
    }

    pub async fn mul(&self, x: &AdtShare, y: &AdtShare) -> Result<AdtShare> {
        let dtype = common_dtype(x, y)?;
        check_same_len(&x.share, &y.share)?;
        let z = self.mul_raw(&x.share, &y.share).await?;
        let precision = u32::max(x.precision, y.precision);
        let share = self.trunc(&z, x.precision + y.precision - precision);
        Ok(AdtShare {
            share,
            dtype,
            precision,
        })
    }

    /// Re-encode an integer secret as a fixed-point value of float type `to`.
    pub fn cast_fixedpoint(&self, x: &AdtShare, to: DataType) -> Result<AdtShare> {
        if !to.is_float() {
            return Err(Error::KernelError(format!(
                "Fixed-point cast target must be a float type, found {}",
                to
            )));
        }
        if x.precision > self.fraction_bits {
            return Err(Error::KernelError(format!(
                "Cannot cast secret with {} fractional bits down to {}",
                x.precision, self.fraction_bits
            )));
        }
        Ok(AdtShare {
            share: upscale(&x.share, self.fraction_bits - x.precision),
            dtype: to,
            precision: self.fraction_bits,
        })
    }

    /// Element-wise secure division.
    ///
    /// The divisor is blinded by a random positive mask and opened; the
    /// quotient follows from multiplying the dividend by the mask and by the
    /// public reciprocal. The dividend is opened under a second positive mask
    /// to bound the magnitude of the quotient, which fixes the precision of
    /// each reciprocal. Operands whose quotient would not fit the ring fail
    /// with a kernel error. When both operands are integers the quotient is
    /// truncated toward zero.
    pub async fn div(&self, x: &AdtShare, y: &AdtShare) -> Result<AdtShare> {
        let dtype = common_dtype(x, y)?;
        check_same_len(&x.share, &y.share)?;
        let len = x.len();
        let f = self.fraction_bits;

        let r = self.dealer.positive_mask(len, f);
        let blinded = self.mul_raw(&y.share, &r).await?;
        let w = self.open_ring(&blinded).await?;
        if w.iter().any(|v| v.0 == 0) {
            return Err(Error::KernelError("divide by zero".to_string()));
        }

        let v = self.open_blinded(&x.share).await?;
        let bits = reciprocal_bits(
            &v,
            x.precision + f,
            &w,
            y.precision + f,
            SAFE_RING_BITS - f,
            self.division_bias_bits + 2,
        )?;

        let w_scale = (1_u128 << (y.precision + f)) as f64;
        let reciprocal: Vec<RingElement> = w
            .iter()
            .zip(&bits)
            .map(|(v, &k)| encode_f64(w_scale / (v.0 as i128) as f64, k))
            .collect::<Result<_>>()?;
        let reciprocal = Array1::from(reciprocal).into_shared();

        let xr = self.mul_raw(&x.share, &r).await?;
        let xr = self.trunc(&xr, x.precision);
        let q = self.trunc_each(&ring_mul(&xr, &reciprocal), &bits);

        if x.dtype.is_integer() && y.dtype.is_integer() {
            let share = self.trunc_toward_zero(&q, &x.share, &y.share).await?;
            Ok(AdtShare {
                share,
                dtype,
                precision: 0,
            })
        } else {
            Ok(AdtShare {
                share: q,
                dtype,
                precision: f,
            })
        }
    }

    /// Integer quotient of `x` by `y`, rounded toward zero, from its
    /// fixed-point approximation `q`.
    ///
    /// Opens the sign of `q` and the fractional bits of `|q|`; the biased
    /// magnitude absorbs the approximation error of the division, so its
    /// floor is either the exact quotient or one above it. The overshoot
    /// shows up as a remainder `x - t * y` whose sign differs from `x`.
    async fn trunc_toward_zero(
        &self,
        q: &RingTensor,
        x: &RingTensor,
        y: &RingTensor,
    ) -> Result<RingTensor> {
        let len = q.len();
        let f = self.fraction_bits;

        let signs = self.open_signs(q).await?;
        let magnitude = ring_mul(q, &signs);
        let bias = Wrapping(1_u128 << (f - self.division_bias_bits));
        let biased = self.add_public(&magnitude, bias);

        let (r, r_top) = self.dealer.floor_mask(len, f, FLOOR_MASK_BITS);
        let c = self.open_ring(&ring_add(&biased, &r)).await?;
        let floor = if self.party == 0 {
            let c_top = ring_map(&c, |v| Wrapping(v.0 >> f));
            ring_sub(&c_top, &r_top)
        } else {
            ring_map(&r_top, |v| -v)
        };
        let candidate = ring_mul(&floor, &signs);

        let remainder = ring_sub(x, &self.mul_raw(&candidate, y).await?);
        let remainder_signs = self.open_signs(&self.mul_raw(&remainder, x).await?).await?;
        let overshoot = Zip::from(&signs)
            .and(&remainder_signs)
            .map_collect(|&s, &rs| if rs == NEGATIVE { s } else { Wrapping(0) })
            .into_shared();
        Ok(self.sub_public(&candidate, &overshoot))
    }

    /// Multiply a secret by a fresh positive mask and open the product.
    ///
    /// The result keeps the sign of each element and its magnitude within a
    /// factor of two.
    async fn open_blinded(&self, x: &RingTensor) -> Result<RingTensor> {
        let mask = self.dealer.positive_mask(x.len(), self.fraction_bits);
        let blinded = self.mul_raw(x, &mask).await?;
        self.open_ring(&blinded).await
    }

    /// Public sign of each element of a secret, as the ring values 1 or -1.
    async fn open_signs(&self, x: &RingTensor) -> Result<RingTensor> {
        let opened = self.open_blinded(x).await?;
        Ok(ring_map(&opened, |v| {
            if (v.0 as i128) < 0 {
                NEGATIVE
            } else {
                Wrapping(1)
            }
        }))
    }

    /// Beaver multiplication without any rescaling of the product.
    async fn mul_raw(&self, x: &RingTensor, y: &RingTensor) -> Result<RingTensor> {
        check_same_len(x, y)?;
        let len = x.len();
        let (a, b, c) = self.dealer.beaver_triple(len);

        let masked: Vec<RingElement> = ring_sub(x, &a)
            .iter()
            .chain(ring_sub(y, &b).iter())
            .cloned()
            .collect();
        let opened = self.open_ring(&Array1::from(masked).into_shared()).await?;
        let e = opened.slice(s![..len]).to_owned().into_shared();
        let d = opened.slice(s![len..]).to_owned().into_shared();

        let z = ring_add(&ring_add(&c, &ring_mul(&e, &b)), &ring_mul(&d, &a));
        if self.party == 0 {
            Ok(ring_add(&z, &ring_mul(&e, &d)))
        } else {
            Ok(z)
        }
    }

    /// Local probabilistic truncation by `amount` bits.
    ///
    /// Correct up to one unit in the last place except with probability
    /// proportional to the magnitude of the secret over 2^127.
    pub(crate) fn trunc(&self, x: &RingTensor, amount: u32) -> RingTensor {
        if amount == 0 {
            return x.clone();
        }
        ring_map(x, |v| self.trunc_element(v, amount))
    }

    /// Truncation by a separate amount for every element.
    fn trunc_each(&self, x: &RingTensor, amounts: &[u32]) -> RingTensor {
        let values: Vec<RingElement> = x
            .iter()
            .zip(amounts)
            .map(|(&v, &amount)| self.trunc_element(v, amount))
            .collect();
        Array1::from(values).into_shared()
    }

    fn trunc_element(&self, v: RingElement, amount: u32) -> RingElement {
        if self.party == 0 {
            Wrapping(((v.0 as i128) >> amount) as u128)
        } else {
            -Wrapping((((-v).0 as i128) >> amount) as u128)
        }
    }

    fn add_public(&self, x: &RingTensor, c: RingElement) -> RingTensor {
        if self.party == 0 {
            ring_map(x, |v| v + c)
        } else {
            x.clone()
        }
    }

    fn sub_public(&self, x: &RingTensor, c: &RingTensor) -> RingTensor {
        if self.party == 0 {
            ring_sub(x, c)
        } else {
            x.clone()
        }
    }
}

/// Fractional bits of the public reciprocal of every element.
///
/// `v` and `w` are the dividend and divisor multiplied by masks in `[1, 2)`,
/// with `v_precision` and `w_precision` fractional bits. The bits keep the
/// scaled quotient below `2^headroom_bits` and the rounding error of the
/// quotient below `2^-error_bits`.
fn reciprocal_bits(
    v: &RingTensor,
    v_precision: u32,
    w: &RingTensor,
    w_precision: u32,
    headroom_bits: u32,
    error_bits: u32,
) -> Result<Vec<u32>> {
    v.iter()
        .zip(w.iter())
        .map(|(v, w)| {
            let dividend = magnitude(*v) / 2_f64.powi(v_precision as i32);
            let divisor = magnitude(*w) / 2_f64.powi(w_precision as i32 + 1);
            let highest = headroom_bits as i32 - ceil_log2(dividend / divisor);
            let lowest = ceil_log2(dividend) + error_bits as i32;
            let bits = i32::min(highest, RECIPROCAL_BITS as i32);
            if bits < lowest {
                return Err(Error::KernelError(
                    "Division operands exceed the range of the secure protocol".to_string(),
                ));
            }
            Ok(bits as u32)
        })
        .collect()
}

fn magnitude(v: RingElement) -> f64 {
    (v.0 as i128).unsigned_abs() as f64
}

/// Smallest non-negative `k` with `x <= 2^k`.
fn ceil_log2(x: f64) -> i32 {
    if x <= 1.0 {
        0
    } else {
        x.log2().ceil() as i32
    }
}

fn common_dtype(x: &AdtShare, y: &AdtShare) -> Result<DataType> {
    DataType::common_numeric(x.dtype, y.dtype).ok_or_else(|| {
        Error::KernelError(format!(
            "No secure kernel for input types ({}, {})",
            x.dtype, y.dtype
        ))
    })
}

fn upscale(x: &RingTensor, bits: u32) -> RingTensor {
    ring_map(x, |v| Wrapping(v.0 << bits))
}

/// Bring both operands to the larger of their precisions.
fn align(x: &AdtShare, y: &AdtShare) -> Result<(RingTensor, RingTensor, u32)> {
    check_same_len(&x.share, &y.share)?;
    let precision = u32::max(x.precision, y.precision);
    Ok((
        upscale(&x.share, precision - x.precision),
        upscale(&y.share, precision - y.precision),
        precision,
    ))
}

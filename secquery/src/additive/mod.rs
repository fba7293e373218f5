//! Two-party additive secret sharing over the ring Z_2^128.
//!
//! Integers are embedded with scale one; floats are encoded as fixed-point
//! values with a configurable number of fractional bits.

use crate::error::{Error, Result};
use crate::host::{ArcArray1, HostColumn};
use crate::types::DataType;
use ndarray::{Array1, Zip};
use rand::RngCore;
use std::num::Wrapping;

mod dealer;
mod ops;
pub(crate) use dealer::Dealer;
pub use ops::AdditiveProtocol;

pub type RingElement = Wrapping<u128>;
pub type RingTensor = ArcArray1<RingElement>;

/// One party's share of a secret column.
///
/// `precision` is the number of fractional bits of the encoding: zero for
/// integer secrets, the session's fraction bits for floats.
#[derive(Clone, Debug, PartialEq)]
pub struct AdtShare {
    pub(crate) share: RingTensor,
    pub(crate) dtype: DataType,
    pub(crate) precision: u32,
}

impl AdtShare {
    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }

    pub fn len(&self) -> usize {
        self.share.len()
    }

    pub fn is_empty(&self) -> bool {
        self.share.is_empty()
    }

    /// Split a plaintext column into two fresh shares.
    pub fn split<R: RngCore>(
        column: &HostColumn,
        fraction_bits: u32,
        rng: &mut R,
    ) -> Result<[AdtShare; 2]> {
        let (encoded, precision) = encode(column, fraction_bits)?;
        let mask: RingTensor = random_ring(rng, encoded.len());
        let masked = ring_sub(&encoded, &mask);
        let dtype = column.data_type();
        Ok([
            AdtShare {
                share: masked,
                dtype,
                precision,
            },
            AdtShare {
                share: mask,
                dtype,
                precision,
            },
        ])
    }

    /// Combine the two shares of a secret into its plaintext.
    pub fn reveal(x0: &AdtShare, x1: &AdtShare) -> Result<HostColumn> {
        if x0.dtype != x1.dtype || x0.precision != x1.precision {
            return Err(Error::KernelError(format!(
                "Shares do not belong to the same secret ({}/{} vs {}/{})",
                x0.dtype, x0.precision, x1.dtype, x1.precision
            )));
        }
        check_same_len(&x0.share, &x1.share)?;
        decode(&ring_add(&x0.share, &x1.share), x0.dtype, x0.precision)
    }
}

pub(crate) fn precision_for(dtype: DataType, fraction_bits: u32) -> Result<u32> {
    match dtype {
        DataType::Int32 | DataType::Int64 => Ok(0),
        DataType::Float32 | DataType::Float64 => Ok(fraction_bits),
        DataType::Bool => Err(Error::KernelError(
            "Secret sharing of bool columns is not supported".to_string(),
        )),
    }
}

pub(crate) fn encode_i64(x: i64) -> RingElement {
    Wrapping(x as i128 as u128)
}

pub(crate) fn encode_f64(x: f64, precision: u32) -> Result<RingElement> {
    if !x.is_finite() {
        return Err(Error::KernelError(format!(
            "Cannot encode non-finite value {} as fixed-point",
            x
        )));
    }
    let scaled = (x * (1_u128 << precision) as f64).round();
    if scaled.abs() >= 2_f64.powi(100) {
        return Err(Error::KernelError(format!(
            "Value {} is too large for fixed-point encoding",
            x
        )));
    }
    Ok(Wrapping(scaled as i128 as u128))
}

/// Ring encoding of a plaintext column, together with its precision.
pub(crate) fn encode(column: &HostColumn, fraction_bits: u32) -> Result<(RingTensor, u32)> {
    let precision = precision_for(column.data_type(), fraction_bits)?;
    let values = match column {
        HostColumn::Int32(xs) => xs.iter().map(|&x| encode_i64(x as i64)).collect(),
        HostColumn::Int64(xs) => xs.iter().map(|&x| encode_i64(x)).collect(),
        HostColumn::Float32(xs) => xs
            .iter()
            .map(|&x| encode_f64(x as f64, precision))
            .collect::<Result<Vec<_>>>()?,
        HostColumn::Float64(xs) => xs
            .iter()
            .map(|&x| encode_f64(x, precision))
            .collect::<Result<Vec<_>>>()?,
        HostColumn::Bool(_) => Vec::new(),
    };
    Ok((Array1::from(values).into_shared(), precision))
}

pub(crate) fn decode(ring: &RingTensor, dtype: DataType, precision: u32) -> Result<HostColumn> {
    let signed = ring.iter().map(|x| x.0 as i128);
    let scale = (1_u128 << precision) as f64;
    match dtype {
        DataType::Int32 => Ok(HostColumn::from(
            signed.map(|x| x as i32).collect::<Vec<_>>(),
        )),
        DataType::Int64 => Ok(HostColumn::from(
            signed.map(|x| x as i64).collect::<Vec<_>>(),
        )),
        DataType::Float32 => Ok(HostColumn::from(
            signed.map(|x| (x as f64 / scale) as f32).collect::<Vec<_>>(),
        )),
        DataType::Float64 => Ok(HostColumn::from(
            signed.map(|x| x as f64 / scale).collect::<Vec<_>>(),
        )),
        DataType::Bool => Err(Error::KernelError(
            "Secret sharing of bool columns is not supported".to_string(),
        )),
    }
}

pub(crate) fn random_ring<R: RngCore>(rng: &mut R, len: usize) -> RingTensor {
    let values: Vec<RingElement> = (0..len).map(|_| Wrapping(random_u128(rng))).collect();
    Array1::from(values).into_shared()
}

pub(crate) fn random_u128<R: RngCore>(rng: &mut R) -> u128 {
    ((rng.next_u64() as u128) << 64) | rng.next_u64() as u128
}

pub(crate) fn check_same_len(x: &RingTensor, y: &RingTensor) -> Result<()> {
    if x.len() != y.len() {
        return Err(Error::KernelError(format!(
            "Secret operands must have the same length ({} vs {})",
            x.len(),
            y.len()
        )));
    }
    Ok(())
}

pub(crate) fn ring_add(x: &RingTensor, y: &RingTensor) -> RingTensor {
    Zip::from(x).and(y).map_collect(|&a, &b| a + b).into_shared()
}

pub(crate) fn ring_sub(x: &RingTensor, y: &RingTensor) -> RingTensor {
    Zip::from(x).and(y).map_collect(|&a, &b| a - b).into_shared()
}

pub(crate) fn ring_mul(x: &RingTensor, y: &RingTensor) -> RingTensor {
    Zip::from(x).and(y).map_collect(|&a, &b| a * b).into_shared()
}

pub(crate) fn ring_map<F>(x: &RingTensor, f: F) -> RingTensor
where
    F: Fn(RingElement) -> RingElement,
{
    x.map(|&a| f(a)).into_shared()
}

//! Plaintext columnar values held by a single party

use crate::error::{Error, Result};
use crate::types::DataType;
use ndarray::prelude::*;
use num_traits::{NumCast, ToPrimitive};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt::Display;

pub mod ops;

pub type ArcArray1<A> = ArcArray<A, Ix1>;

/// A single plaintext column.
///
/// Backed by reference-counted arrays so that tensors can be cloned out of a
/// tensor table without copying their payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ColumnLiteral", into = "ColumnLiteral")]
pub enum HostColumn {
    Bool(ArcArray1<bool>),
    Int32(ArcArray1<i32>),
    Int64(ArcArray1<i64>),
    Float32(ArcArray1<f32>),
    Float64(ArcArray1<f64>),
}

macro_rules! host_column_from {
    ($t:ty, $variant:ident) => {
        impl From<Vec<$t>> for HostColumn {
            fn from(values: Vec<$t>) -> HostColumn {
                HostColumn::$variant(Array1::from(values).into_shared())
            }
        }

        impl From<Array1<$t>> for HostColumn {
            fn from(values: Array1<$t>) -> HostColumn {
                HostColumn::$variant(values.into_shared())
            }
        }
    };
}

host_column_from!(bool, Bool);
host_column_from!(i32, Int32);
host_column_from!(i64, Int64);
host_column_from!(f32, Float32);
host_column_from!(f64, Float64);

impl HostColumn {
    pub fn data_type(&self) -> DataType {
        match self {
            HostColumn::Bool(_) => DataType::Bool,
            HostColumn::Int32(_) => DataType::Int32,
            HostColumn::Int64(_) => DataType::Int64,
            HostColumn::Float32(_) => DataType::Float32,
            HostColumn::Float64(_) => DataType::Float64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            HostColumn::Bool(xs) => xs.len(),
            HostColumn::Int32(xs) => xs.len(),
            HostColumn::Int64(xs) => xs.len(),
            HostColumn::Float32(xs) => xs.len(),
            HostColumn::Float64(xs) => xs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Safe cast to another element type.
    ///
    /// Fails instead of truncating a float with a fractional part,
    /// overflowing the target integer type or rounding an integer that the
    /// target float type cannot represent exactly.
    pub fn cast(&self, to: DataType) -> Result<HostColumn> {
        if self.data_type() == to {
            return Ok(self.clone());
        }
        match self {
            HostColumn::Int32(xs) => cast_to(xs, false, to),
            HostColumn::Int64(xs) => cast_to(xs, false, to),
            HostColumn::Float32(xs) => cast_to(xs, true, to),
            HostColumn::Float64(xs) => cast_to(xs, true, to),
            HostColumn::Bool(_) => Err(Error::KernelError(format!(
                "Unsupported cast from bool to {}",
                to
            ))),
        }
    }

    /// Values widened to `f64`, booleans as 0 and 1.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            HostColumn::Bool(xs) => xs.iter().map(|&x| if x { 1.0 } else { 0.0 }).collect(),
            HostColumn::Int32(xs) => xs.iter().map(|&x| x as f64).collect(),
            HostColumn::Int64(xs) => xs.iter().map(|&x| x as f64).collect(),
            HostColumn::Float32(xs) => xs.iter().map(|&x| x as f64).collect(),
            HostColumn::Float64(xs) => xs.to_vec(),
        }
    }

    /// Element-wise comparison with absolute tolerance `atol`.
    ///
    /// Both columns must have the same length and the same type family
    /// (integer, float or bool); widths may differ.
    pub fn approx_eq(&self, other: &HostColumn, atol: f64) -> bool {
        let (lty, rty) = (self.data_type(), other.data_type());
        let same_family = (lty.is_integer() && rty.is_integer())
            || (lty.is_float() && rty.is_float())
            || lty == rty;
        if !same_family || self.len() != other.len() {
            return false;
        }
        self.to_f64_vec()
            .iter()
            .zip(other.to_f64_vec().iter())
            .all(|(x, y)| {
                if x.is_nan() || y.is_nan() {
                    x.is_nan() && y.is_nan()
                } else if x.is_infinite() || y.is_infinite() {
                    x == y
                } else {
                    (x - y).abs() <= atol
                }
            })
    }
}

impl Display for HostColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            HostColumn::Bool(xs) => write!(f, "bool{}", xs),
            HostColumn::Int32(xs) => write!(f, "int32{}", xs),
            HostColumn::Int64(xs) => write!(f, "int64{}", xs),
            HostColumn::Float32(xs) => write!(f, "float32{}", xs),
            HostColumn::Float64(xs) => write!(f, "float64{}", xs),
        }
    }
}

fn cast_to<S>(xs: &ArcArray1<S>, from_float: bool, to: DataType) -> Result<HostColumn>
where
    S: ToPrimitive + Copy + Display,
{
    match to {
        DataType::Int32 => Ok(HostColumn::Int32(safe_cast(xs, from_float, to)?)),
        DataType::Int64 => Ok(HostColumn::Int64(safe_cast(xs, from_float, to)?)),
        DataType::Float32 => Ok(HostColumn::Float32(safe_cast(xs, from_float, to)?)),
        DataType::Float64 => Ok(HostColumn::Float64(safe_cast(xs, from_float, to)?)),
        DataType::Bool => Err(Error::KernelError(
            "Unsupported cast from numeric to bool".to_string(),
        )),
    }
}

fn safe_cast<S, T>(xs: &ArcArray1<S>, from_float: bool, to: DataType) -> Result<ArcArray1<T>>
where
    S: ToPrimitive + Copy + Display,
    T: NumCast,
{
    let values = xs
        .iter()
        .map(|&x| {
            if from_float && to.is_integer() {
                if let Some(v) = x.to_f64() {
                    if v.fract() != 0.0 {
                        return Err(Error::KernelError(format!(
                            "Float value {} was truncated converting to {}",
                            x, to
                        )));
                    }
                }
            }
            let cast = T::from(x).ok_or_else(|| {
                Error::KernelError(format!("Value {} not in range for {}", x, to))
            })?;
            if !from_float && to.is_float() && cast.to_i128() != x.to_i128() {
                return Err(Error::KernelError(format!(
                    "Integer value {} cannot be represented exactly as {}",
                    x, to
                )));
            }
            Ok(cast)
        })
        .collect::<Result<Vec<T>>>()?;
    Ok(Array1::from(values).into_shared())
}

/// Serialized form of a column: an explicit element type plus a list of values.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct ColumnLiteral {
    dtype: DataType,
    values: LiteralValues,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum LiteralValues {
    Bool(Vec<bool>),
    Int(Vec<i64>),
    Float(Vec<f64>),
}

impl TryFrom<ColumnLiteral> for HostColumn {
    type Error = Error;

    fn try_from(literal: ColumnLiteral) -> Result<HostColumn> {
        let column = match literal.values {
            LiteralValues::Bool(values) => HostColumn::from(values),
            LiteralValues::Int(values) => HostColumn::from(values),
            LiteralValues::Float(values) => HostColumn::from(values),
        };
        column.cast(literal.dtype)
    }
}

impl From<HostColumn> for ColumnLiteral {
    fn from(column: HostColumn) -> ColumnLiteral {
        let dtype = column.data_type();
        let values = match column {
            HostColumn::Bool(xs) => LiteralValues::Bool(xs.to_vec()),
            HostColumn::Int32(xs) => LiteralValues::Int(xs.iter().map(|&x| x as i64).collect()),
            HostColumn::Int64(xs) => LiteralValues::Int(xs.to_vec()),
            HostColumn::Float32(xs) => {
                LiteralValues::Float(xs.iter().map(|&x| x as f64).collect())
            }
            HostColumn::Float64(xs) => LiteralValues::Float(xs.to_vec()),
        };
        ColumnLiteral { dtype, values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_cast_int_to_float() {
        let x = HostColumn::from(vec![7_i32, -2]);
        assert_eq!(
            x.cast(DataType::Float64).unwrap(),
            HostColumn::from(vec![7.0_f64, -2.0])
        );
    }

    #[test]
    fn safe_cast_rejects_truncation() {
        let x = HostColumn::from(vec![1.5_f64]);
        let err = x.cast(DataType::Int64).unwrap_err();
        assert!(matches!(err, Error::KernelError(msg) if msg.contains("truncated")));

        let x = HostColumn::from(vec![3.0_f64]);
        assert_eq!(x.cast(DataType::Int64).unwrap(), HostColumn::from(vec![3_i64]));
    }

    #[test]
    fn safe_cast_rejects_overflow() {
        let x = HostColumn::from(vec![i64::MAX]);
        assert!(x.cast(DataType::Int32).is_err());
    }

    #[test]
    fn safe_cast_rejects_inexact_floats() {
        let x = HostColumn::from(vec![9_007_199_254_740_993_i64]);
        let err = x.cast(DataType::Float64).unwrap_err();
        assert!(matches!(err, Error::KernelError(msg) if msg.contains("exactly")));

        let x = HostColumn::from(vec![1_i64 << 53, -(1_i64 << 53)]);
        assert_eq!(
            x.cast(DataType::Float64).unwrap(),
            HostColumn::from(vec![9_007_199_254_740_992.0_f64, -9_007_199_254_740_992.0])
        );

        let x = HostColumn::from(vec![16_777_217_i32]);
        assert!(x.cast(DataType::Float32).is_err());
        let x = HostColumn::from(vec![16_777_216_i32]);
        assert_eq!(
            x.cast(DataType::Float32).unwrap(),
            HostColumn::from(vec![16_777_216.0_f32])
        );
    }

    #[test]
    fn approx_eq_checks_family() {
        let ints = HostColumn::from(vec![2_i32, 2]);
        let wide_ints = HostColumn::from(vec![2_i64, 2]);
        let floats = HostColumn::from(vec![2.0_f64, 2.0]);
        assert!(ints.approx_eq(&wide_ints, 0.0));
        assert!(!ints.approx_eq(&floats, 0.05));
        assert!(floats.approx_eq(&HostColumn::from(vec![2.04_f64, 1.97]), 0.05));
        assert!(!floats.approx_eq(&HostColumn::from(vec![2.1_f64, 2.0]), 0.05));
    }

    #[test]
    fn column_literal_serde() {
        let column: HostColumn =
            serde_json::from_str(r#"{"dtype": "int32", "values": [10, 20]}"#).unwrap();
        assert_eq!(column, HostColumn::from(vec![10_i32, 20]));

        let column: HostColumn =
            serde_json::from_str(r#"{"dtype": "float64", "values": [1, 2.5]}"#).unwrap();
        assert_eq!(column, HostColumn::from(vec![1.0_f64, 2.5]));

        let json = serde_json::to_string(&HostColumn::from(vec![3_i64])).unwrap();
        assert_eq!(json, r#"{"dtype":"int64","values":[3]}"#);
    }
}

//! Vectorized plaintext kernels over host columns.
//!
//! Operands are first promoted to their common numeric type; integer
//! arithmetic wraps on overflow and integer division truncates toward zero.

use super::*;

/// Scalar arithmetic used by the element-wise kernels.
trait NumericScalar: Copy {
    fn add(self, other: Self) -> Self;
    fn sub(self, other: Self) -> Self;
    fn mul(self, other: Self) -> Self;
    fn div(self, other: Self) -> Result<Self>;
}

macro_rules! integer_scalar {
    ($t:ty) => {
        impl NumericScalar for $t {
            fn add(self, other: Self) -> Self {
                self.wrapping_add(other)
            }

            fn sub(self, other: Self) -> Self {
                self.wrapping_sub(other)
            }

            fn mul(self, other: Self) -> Self {
                self.wrapping_mul(other)
            }

            fn div(self, other: Self) -> Result<Self> {
                if other == 0 {
                    Err(Error::KernelError("divide by zero".to_string()))
                } else {
                    Ok(self.wrapping_div(other))
                }
            }
        }
    };
}

macro_rules! float_scalar {
    ($t:ty) => {
        impl NumericScalar for $t {
            fn add(self, other: Self) -> Self {
                self + other
            }

            fn sub(self, other: Self) -> Self {
                self - other
            }

            fn mul(self, other: Self) -> Self {
                self * other
            }

            fn div(self, other: Self) -> Result<Self> {
                Ok(self / other)
            }
        }
    };
}

integer_scalar!(i32);
integer_scalar!(i64);
float_scalar!(f32);
float_scalar!(f64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ArithmeticKernel {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl ArithmeticKernel {
    fn name(&self) -> &'static str {
        match self {
            ArithmeticKernel::Add => "add",
            ArithmeticKernel::Subtract => "subtract",
            ArithmeticKernel::Multiply => "multiply",
            ArithmeticKernel::Divide => "divide",
        }
    }

    fn apply<T: NumericScalar>(&self, x: T, y: T) -> Result<T> {
        match self {
            ArithmeticKernel::Add => Ok(x.add(y)),
            ArithmeticKernel::Subtract => Ok(x.sub(y)),
            ArithmeticKernel::Multiply => Ok(x.mul(y)),
            ArithmeticKernel::Divide => x.div(y),
        }
    }

    fn zip_with<T: NumericScalar>(
        &self,
        xs: &ArcArray1<T>,
        ys: &ArcArray1<T>,
    ) -> Result<ArcArray1<T>> {
        let values = xs
            .iter()
            .zip(ys.iter())
            .map(|(&x, &y)| self.apply(x, y))
            .collect::<Result<Vec<T>>>()?;
        Ok(Array1::from(values).into_shared())
    }

    fn call(&self, lhs: &HostColumn, rhs: &HostColumn) -> Result<HostColumn> {
        let (lhs, rhs) = promote(self.name(), lhs, rhs)?;
        match (&lhs, &rhs) {
            (HostColumn::Int32(x), HostColumn::Int32(y)) => {
                Ok(HostColumn::Int32(self.zip_with(x, y)?))
            }
            (HostColumn::Int64(x), HostColumn::Int64(y)) => {
                Ok(HostColumn::Int64(self.zip_with(x, y)?))
            }
            (HostColumn::Float32(x), HostColumn::Float32(y)) => {
                Ok(HostColumn::Float32(self.zip_with(x, y)?))
            }
            (HostColumn::Float64(x), HostColumn::Float64(y)) => {
                Ok(HostColumn::Float64(self.zip_with(x, y)?))
            }
            _ => Err(no_matching_kernel(
                self.name(),
                lhs.data_type(),
                rhs.data_type(),
            )),
        }
    }
}

fn no_matching_kernel(name: &str, lhs: DataType, rhs: DataType) -> Error {
    Error::KernelError(format!(
        "Function '{}' has no kernel matching input types ({}, {})",
        name, lhs, rhs
    ))
}

/// Cast both operands to their common numeric type.
fn promote(name: &str, lhs: &HostColumn, rhs: &HostColumn) -> Result<(HostColumn, HostColumn)> {
    if lhs.len() != rhs.len() {
        return Err(Error::KernelError(format!(
            "Array arguments to '{}' must all be the same length ({} vs {})",
            name,
            lhs.len(),
            rhs.len()
        )));
    }
    let (lty, rty) = (lhs.data_type(), rhs.data_type());
    let common =
        DataType::common_numeric(lty, rty).ok_or_else(|| no_matching_kernel(name, lty, rty))?;
    Ok((lhs.cast(common)?, rhs.cast(common)?))
}

pub fn add(lhs: &HostColumn, rhs: &HostColumn) -> Result<HostColumn> {
    ArithmeticKernel::Add.call(lhs, rhs)
}

pub fn subtract(lhs: &HostColumn, rhs: &HostColumn) -> Result<HostColumn> {
    ArithmeticKernel::Subtract.call(lhs, rhs)
}

pub fn multiply(lhs: &HostColumn, rhs: &HostColumn) -> Result<HostColumn> {
    ArithmeticKernel::Multiply.call(lhs, rhs)
}

/// Element-wise division.
///
/// Integer operands give a truncated integer quotient and fail on a zero
/// divisor; float operands follow IEEE semantics.
pub fn divide(lhs: &HostColumn, rhs: &HostColumn) -> Result<HostColumn> {
    ArithmeticKernel::Divide.call(lhs, rhs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn add_promotes_to_common_type() {
        let x = HostColumn::from(vec![1_i32, 2]);
        let y = HostColumn::from(vec![10_i64, 20]);
        assert_eq!(add(&x, &y).unwrap(), HostColumn::from(vec![11_i64, 22]));

        let z = HostColumn::from(vec![0.5_f32, 0.25]);
        assert_eq!(add(&x, &z).unwrap(), HostColumn::from(vec![1.5_f32, 2.25]));
    }

    #[test]
    fn integer_divide_truncates_toward_zero() {
        let x = HostColumn::from(vec![7_i64, -7, 6]);
        let y = HostColumn::from(vec![2_i64, 2, -4]);
        assert_eq!(divide(&x, &y).unwrap(), HostColumn::from(vec![3_i64, -3, -1]));
    }

    #[test]
    fn integer_divide_by_zero_fails() {
        let x = HostColumn::from(vec![5_i32]);
        let y = HostColumn::from(vec![0_i32]);
        let err = divide(&x, &y).unwrap_err();
        assert_eq!(err, Error::KernelError("divide by zero".to_string()));
    }

    #[test]
    fn float_divide_by_zero_is_infinite() {
        let x = HostColumn::from(vec![1.0_f64, -1.0]);
        let y = HostColumn::from(vec![0.0_f64, 0.0]);
        assert_eq!(
            divide(&x, &y).unwrap(),
            HostColumn::from(vec![f64::INFINITY, f64::NEG_INFINITY])
        );
    }

    #[test]
    fn length_mismatch_fails() {
        let x = HostColumn::from(vec![1_i64, 2]);
        let y = HostColumn::from(vec![1_i64]);
        assert!(matches!(multiply(&x, &y), Err(Error::KernelError(_))));
    }

    #[test]
    fn bool_operands_have_no_kernel() {
        let x = HostColumn::from(vec![true]);
        let y = HostColumn::from(vec![1_i64]);
        let err = add(&x, &y).unwrap_err();
        assert!(matches!(err, Error::KernelError(msg) if msg.contains("no kernel")));
    }

    #[test]
    fn integer_arithmetic_wraps() {
        let x = HostColumn::from(vec![i32::MAX]);
        let y = HostColumn::from(vec![1_i32]);
        assert_eq!(add(&x, &y).unwrap(), HostColumn::from(vec![i32::MIN]));
    }

    proptest! {
        #[test]
        fn add_sub_mul_are_elementwise(
            pairs in proptest::collection::vec((-1000_i64..1000, -1000_i64..1000), 1..32)
        ) {
            let (xs, ys): (Vec<i64>, Vec<i64>) = pairs.into_iter().unzip();
            let x = HostColumn::from(xs.clone());
            let y = HostColumn::from(ys.clone());

            let sums: Vec<i64> = xs.iter().zip(&ys).map(|(a, b)| a + b).collect();
            let diffs: Vec<i64> = xs.iter().zip(&ys).map(|(a, b)| a - b).collect();
            let prods: Vec<i64> = xs.iter().zip(&ys).map(|(a, b)| a * b).collect();

            prop_assert_eq!(add(&x, &y).unwrap(), HostColumn::from(sums));
            prop_assert_eq!(subtract(&x, &y).unwrap(), HostColumn::from(diffs));
            prop_assert_eq!(multiply(&x, &y).unwrap(), HostColumn::from(prods));
        }
    }
}

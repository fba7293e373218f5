//! Element-wise arithmetic operators.

use super::*;
use crate::host::ops;

/// Addition
#[derive(Clone, Copy, Debug, Default)]
pub struct Add;

#[async_trait]
impl BinaryOperator for Add {
    const OP_TYPE: &'static str = "Add";

    async fn compute_secure(
        &self,
        protocol: &AdditiveProtocol,
        lhs: &AdtShare,
        rhs: &AdtShare,
    ) -> Result<AdtShare> {
        protocol.add(lhs, rhs)
    }

    fn compute_plain(&self, lhs: &HostColumn, rhs: &HostColumn) -> Result<HostColumn> {
        ops::add(lhs, rhs)
    }
}

/// Subtraction
#[derive(Clone, Copy, Debug, Default)]
pub struct Minus;

#[async_trait]
impl BinaryOperator for Minus {
    const OP_TYPE: &'static str = "Minus";

    async fn compute_secure(
        &self,
        protocol: &AdditiveProtocol,
        lhs: &AdtShare,
        rhs: &AdtShare,
    ) -> Result<AdtShare> {
        protocol.sub(lhs, rhs)
    }

    fn compute_plain(&self, lhs: &HostColumn, rhs: &HostColumn) -> Result<HostColumn> {
        ops::subtract(lhs, rhs)
    }
}

/// Multiplication
#[derive(Clone, Copy, Debug, Default)]
pub struct Mul;

#[async_trait]
impl BinaryOperator for Mul {
    const OP_TYPE: &'static str = "Mul";

    async fn compute_secure(
        &self,
        protocol: &AdditiveProtocol,
        lhs: &AdtShare,
        rhs: &AdtShare,
    ) -> Result<AdtShare> {
        protocol.mul(lhs, rhs).await
    }

    fn compute_plain(&self, lhs: &HostColumn, rhs: &HostColumn) -> Result<HostColumn> {
        ops::multiply(lhs, rhs)
    }
}

/// True division.
///
/// An integer dividend over an integer divisor is first promoted to
/// `Float64`, so the quotient keeps its fractional part.
#[derive(Clone, Copy, Debug, Default)]
pub struct Div;

fn both_integer(lhs: DataType, rhs: DataType) -> bool {
    lhs.is_integer() && rhs.is_integer()
}

#[async_trait]
impl BinaryOperator for Div {
    const OP_TYPE: &'static str = "Div";

    fn output_type(&self, lhs: DataType, rhs: DataType) -> Result<DataType> {
        if both_integer(lhs, rhs) {
            Ok(DataType::Float64)
        } else {
            common_output_type(Self::OP_TYPE, lhs, rhs)
        }
    }

    async fn compute_secure(
        &self,
        protocol: &AdditiveProtocol,
        lhs: &AdtShare,
        rhs: &AdtShare,
    ) -> Result<AdtShare> {
        if both_integer(lhs.dtype(), rhs.dtype()) {
            let lhs = protocol.cast_fixedpoint(lhs, DataType::Float64)?;
            protocol.div(&lhs, rhs).await
        } else {
            protocol.div(lhs, rhs).await
        }
    }

    fn compute_plain(&self, lhs: &HostColumn, rhs: &HostColumn) -> Result<HostColumn> {
        if both_integer(lhs.data_type(), rhs.data_type()) {
            ops::divide(&lhs.cast(DataType::Float64)?, rhs)
        } else {
            ops::divide(lhs, rhs)
        }
    }
}

/// Integer division.
///
/// No promotion takes place: both backends truncate the quotient of two
/// integers toward zero, while any float operand gives a true quotient.
#[derive(Clone, Copy, Debug, Default)]
pub struct IntDiv;

#[async_trait]
impl BinaryOperator for IntDiv {
    const OP_TYPE: &'static str = "IntDiv";

    async fn compute_secure(
        &self,
        protocol: &AdditiveProtocol,
        lhs: &AdtShare,
        rhs: &AdtShare,
    ) -> Result<AdtShare> {
        protocol.div(lhs, rhs).await
    }

    fn compute_plain(&self, lhs: &HostColumn, rhs: &HostColumn) -> Result<HostColumn> {
        ops::divide(lhs, rhs)
    }
}

/// Modulo; registered but has no implementation on either path.
#[derive(Clone, Copy, Debug, Default)]
pub struct Mod;

impl Mod {
    fn unimplemented() -> Error {
        Error::Unimplemented(format!("{} is not implemented", Self::OP_TYPE))
    }
}

#[async_trait]
impl BinaryOperator for Mod {
    const OP_TYPE: &'static str = "Mod";

    fn ensure_implemented(&self) -> Result<()> {
        Err(Self::unimplemented())
    }

    async fn compute_secure(
        &self,
        _protocol: &AdditiveProtocol,
        _lhs: &AdtShare,
        _rhs: &AdtShare,
    ) -> Result<AdtShare> {
        Err(Self::unimplemented())
    }

    fn compute_plain(&self, _lhs: &HostColumn, _rhs: &HostColumn) -> Result<HostColumn> {
        Err(Self::unimplemented())
    }
}

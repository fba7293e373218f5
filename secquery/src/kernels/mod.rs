//! Operators and the process-wide operator registry.

use crate::additive::{AdditiveProtocol, AdtShare};
use crate::error::{Error, Result};
use crate::execution::ExecContext;
use crate::host::HostColumn;
use crate::types::DataType;
use async_trait::async_trait;
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::Arc;

pub mod arithmetic;
mod binary;

pub use arithmetic::{Add, Div, IntDiv, Minus, Mod, Mul};
pub use binary::{dispatch, ExecutionPath};

/// An operator that can be invoked on an execution context.
#[async_trait]
pub trait Operator: Send + Sync {
    fn op_type(&self) -> &'static str;

    async fn run(&self, ctx: &mut ExecContext<'_>) -> Result<()>;
}

/// Two-operand element-wise operator with a secure and a plaintext path.
///
/// Implementors only supply the per-path computations and their typing
/// rules; slot resolution, validation and path selection are shared.
#[async_trait]
pub trait BinaryOperator: Send + Sync {
    const OP_TYPE: &'static str;

    /// Element type of the result, or an error if no kernel matches.
    fn output_type(&self, lhs: DataType, rhs: DataType) -> Result<DataType> {
        common_output_type(Self::OP_TYPE, lhs, rhs)
    }

    /// Fails if the operator has no working implementation.
    fn ensure_implemented(&self) -> Result<()> {
        Ok(())
    }

    async fn compute_secure(
        &self,
        protocol: &AdditiveProtocol,
        lhs: &AdtShare,
        rhs: &AdtShare,
    ) -> Result<AdtShare>;

    fn compute_plain(&self, lhs: &HostColumn, rhs: &HostColumn) -> Result<HostColumn>;
}

pub(crate) fn common_output_type(op_type: &str, lhs: DataType, rhs: DataType) -> Result<DataType> {
    DataType::common_numeric(lhs, rhs).ok_or_else(|| {
        Error::Validation(format!(
            "{} has no kernel for input types ({}, {})",
            op_type, lhs, rhs
        ))
    })
}

/// Mapping from operator type name to operator.
#[derive(Default)]
pub struct OpRegistry {
    ops: HashMap<&'static str, Arc<dyn Operator>>,
}

impl OpRegistry {
    pub fn add_op<O: Operator + 'static>(&mut self, op: O) {
        self.ops.insert(op.op_type(), Arc::new(op));
    }

    pub fn get_operator(&self, op_type: &str) -> Result<Arc<dyn Operator>> {
        self.ops
            .get(op_type)
            .cloned()
            .ok_or_else(|| Error::UnknownOperator(op_type.to_string()))
    }

    pub fn op_types(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.ops.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

fn register_arithmetic_ops(registry: &mut OpRegistry) {
    registry.add_op(Add);
    registry.add_op(Minus);
    registry.add_op(Mul);
    registry.add_op(Div);
    registry.add_op(IntDiv);
    registry.add_op(Mod);
}

lazy_static! {
    static ref OP_REGISTRY: OpRegistry = {
        let mut registry = OpRegistry::default();
        register_arithmetic_ops(&mut registry);
        registry
    };
}

/// Populate the process-wide registry. Safe to call any number of times.
pub fn register_all_ops() {
    lazy_static::initialize(&OP_REGISTRY);
}

pub fn get_op_registry() -> &'static OpRegistry {
    &OP_REGISTRY
}

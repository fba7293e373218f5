use super::Session;
use crate::computation::{ExecNode, Tensor};
use crate::error::{Error, Result};
use crate::kernels::get_op_registry;
use std::collections::HashMap;

/// Named tensors owned by one party.
#[derive(Clone, Debug, Default)]
pub struct TensorTable {
    tensors: HashMap<String, Tensor>,
}

impl TensorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `tensor` to `name`; names cannot be rebound.
    pub fn add_tensor<S: Into<String>>(&mut self, name: S, tensor: Tensor) -> Result<()> {
        let name = name.into();
        if self.tensors.contains_key(&name) {
            return Err(Error::Validation(format!(
                "Tensor '{}' already exists in the tensor table",
                name
            )));
        }
        self.tensors.insert(name, tensor);
        Ok(())
    }

    pub fn get_tensor(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tensors.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

/// Scope of a single operator invocation on one party.
pub struct ExecContext<'a> {
    node: &'a ExecNode,
    session: &'a Session,
    table: &'a mut TensorTable,
}

impl<'a> ExecContext<'a> {
    pub fn new(node: &'a ExecNode, session: &'a Session, table: &'a mut TensorTable) -> Self {
        ExecContext {
            node,
            session,
            table,
        }
    }

    pub fn node(&self) -> &'a ExecNode {
        self.node
    }

    pub fn session(&self) -> &'a Session {
        self.session
    }

    pub fn table(&self) -> &TensorTable {
        self.table
    }

    pub fn table_mut(&mut self) -> &mut TensorTable {
        self.table
    }

    /// Look up the node's operator in the registry and run it.
    pub async fn execute(&mut self) -> Result<()> {
        let op = get_op_registry().get_operator(&self.node.op_type)?;
        tracing::debug!(
            "Party {} executing node '{}' ({})",
            self.session.role(),
            self.node.node_name,
            self.node.op_type
        );
        op.run(self).await.map_err(|e| {
            tracing::warn!(
                "Node '{}' failed on party {}: {}",
                self.node.node_name,
                self.session.role(),
                e
            );
            e
        })
    }
}

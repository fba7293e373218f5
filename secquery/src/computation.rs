//! Operator invocation descriptors and tensors.

use crate::additive::AdtShare;
use crate::error::{Error, Result};
use crate::host::HostColumn;
use crate::types::{DataType, Visibility};
use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::convert::TryFrom;

pub const TAG_BYTES: usize = 128 / 8;

/// Tag matching up a send with its receive inside a session.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Eq, Hash)]
pub struct RendezvousKey(pub(crate) [u8; TAG_BYTES]);

impl std::fmt::Display for RendezvousKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for byte in self.0 {
            write!(f, "{:02X}", byte)?
        }
        Ok(())
    }
}

impl From<u128> for RendezvousKey {
    fn from(v: u128) -> RendezvousKey {
        let mut raw = [0; TAG_BYTES];
        LittleEndian::write_u128(&mut raw, v);
        RendezvousKey(raw)
    }
}

/// Identifier shared by all parties taking part in one run.
///
/// Carries the human readable form it was created from plus a fixed-size
/// digest used to derive correlated randomness.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionId {
    logical: String,
    secure: [u8; TAG_BYTES],
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.logical)
    }
}

impl TryFrom<&str> for SessionId {
    type Error = Error;
    fn try_from(s: &str) -> Result<SessionId> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(s.as_bytes());
        let mut digest = hasher.finalize_xof();

        let mut raw_hash = [0u8; TAG_BYTES];
        digest.fill(&mut raw_hash);

        Ok(SessionId {
            logical: s.to_string(),
            secure: raw_hash,
        })
    }
}

impl SessionId {
    pub fn as_bytes(&self) -> &[u8; TAG_BYTES] {
        &self.secure
    }

    pub fn random() -> Self {
        use rand::RngCore;
        let mut raw = [0; TAG_BYTES];
        rand::thread_rng().fill_bytes(&mut raw);

        let hex_string: String = raw.iter().map(|byte| format!("{:02X}", byte)).collect();
        SessionId {
            logical: hex_string,
            secure: raw,
        }
    }
}

/// Declaration of a tensor before any data is bound to it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TensorRef {
    pub name: String,
    pub dtype: DataType,
    pub visibility: Visibility,
}

pub fn make_tensor_reference<S: Into<String>>(
    name: S,
    dtype: DataType,
    visibility: Visibility,
) -> TensorRef {
    TensorRef {
        name: name.into(),
        dtype,
        visibility,
    }
}

/// A named input or output of a node, holding a batch of tensors.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NamedSlot {
    pub name: String,
    pub tensors: Vec<TensorRef>,
}

/// One operator invocation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ExecNode {
    pub node_name: String,
    pub op_type: String,
    pub inputs: Vec<NamedSlot>,
    pub outputs: Vec<NamedSlot>,
}

impl ExecNode {
    pub fn input(&self, name: &str) -> Option<&[TensorRef]> {
        find_slot(&self.inputs, name)
    }

    pub fn output(&self, name: &str) -> Option<&[TensorRef]> {
        find_slot(&self.outputs, name)
    }

    /// Input slot that must be present.
    pub fn required_input(&self, name: &str) -> Result<&[TensorRef]> {
        self.input(name).ok_or_else(|| {
            Error::Validation(format!(
                "Node '{}' is missing input slot '{}'",
                self.node_name, name
            ))
        })
    }

    /// Output slot that must be present.
    pub fn required_output(&self, name: &str) -> Result<&[TensorRef]> {
        self.output(name).ok_or_else(|| {
            Error::Validation(format!(
                "Node '{}' is missing output slot '{}'",
                self.node_name, name
            ))
        })
    }

    /// Check structural well-formedness.
    ///
    /// Slot names must be unique within inputs and within outputs, and an
    /// output tensor name may appear only once across the node's outputs.
    pub fn validate(&self) -> Result<()> {
        if self.op_type.is_empty() {
            return Err(Error::Validation(format!(
                "Node '{}' has no operator type",
                self.node_name
            )));
        }
        for (kind, slots) in [("input", &self.inputs), ("output", &self.outputs)] {
            let mut seen = HashSet::new();
            for slot in slots.iter() {
                if !seen.insert(slot.name.as_str()) {
                    return Err(Error::Validation(format!(
                        "Node '{}' declares {} slot '{}' more than once",
                        self.node_name, kind, slot.name
                    )));
                }
            }
        }
        let mut out_names = HashSet::new();
        for tensor in self.outputs.iter().flat_map(|slot| slot.tensors.iter()) {
            if !out_names.insert(tensor.name.as_str()) {
                return Err(Error::Validation(format!(
                    "Node '{}' writes output tensor '{}' more than once",
                    self.node_name, tensor.name
                )));
            }
        }
        Ok(())
    }
}

fn find_slot<'a>(slots: &'a [NamedSlot], name: &str) -> Option<&'a [TensorRef]> {
    slots
        .iter()
        .find(|slot| slot.name == name)
        .map(|slot| slot.tensors.as_slice())
}

#[derive(Default)]
pub struct ExecNodeBuilder {
    node_name: String,
    op_type: String,
    inputs: Vec<NamedSlot>,
    outputs: Vec<NamedSlot>,
}

impl ExecNodeBuilder {
    pub fn new<S: Into<String>>(op_type: S) -> Self {
        ExecNodeBuilder {
            op_type: op_type.into(),
            ..Default::default()
        }
    }

    pub fn set_node_name<S: Into<String>>(mut self, name: S) -> Self {
        self.node_name = name.into();
        self
    }

    pub fn add_input<S: Into<String>>(mut self, name: S, tensors: Vec<TensorRef>) -> Self {
        self.inputs.push(NamedSlot {
            name: name.into(),
            tensors,
        });
        self
    }

    pub fn add_output<S: Into<String>>(mut self, name: S, tensors: Vec<TensorRef>) -> Self {
        self.outputs.push(NamedSlot {
            name: name.into(),
            tensors,
        });
        self
    }

    pub fn build(self) -> Result<ExecNode> {
        let node_name = if self.node_name.is_empty() {
            format!("{}_node", self.op_type.to_lowercase())
        } else {
            self.node_name
        };
        let node = ExecNode {
            node_name,
            op_type: self.op_type,
            inputs: self.inputs,
            outputs: self.outputs,
        };
        node.validate()?;
        Ok(node)
    }
}

/// Payload of a tensor.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum TensorData {
    Plain(HostColumn),
    Shared(AdtShare),
}

/// Immutable value stored in a tensor table.
///
/// Plain payloads are public or private; shared payloads are always secret.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    visibility: Visibility,
    data: TensorData,
}

impl Tensor {
    pub fn plain(column: HostColumn, visibility: Visibility) -> Result<Tensor> {
        if visibility.is_secret() {
            return Err(Error::Validation(
                "Plaintext column cannot be tagged as secret".to_string(),
            ));
        }
        Ok(Tensor {
            visibility,
            data: TensorData::Plain(column),
        })
    }

    pub fn secret(share: AdtShare) -> Tensor {
        Tensor {
            visibility: Visibility::Secret,
            data: TensorData::Shared(share),
        }
    }

    pub fn visibility(&self) -> &Visibility {
        &self.visibility
    }

    pub fn dtype(&self) -> DataType {
        match &self.data {
            TensorData::Plain(column) => column.data_type(),
            TensorData::Shared(share) => share.dtype(),
        }
    }

    pub fn len(&self) -> usize {
        match &self.data {
            TensorData::Plain(column) => column.len(),
            TensorData::Shared(share) => share.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_plain(&self) -> Option<&HostColumn> {
        match &self.data {
            TensorData::Plain(column) => Some(column),
            TensorData::Shared(_) => None,
        }
    }

    pub fn as_shared(&self) -> Option<&AdtShare> {
        match &self.data {
            TensorData::Shared(share) => Some(share),
            TensorData::Plain(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn node_with_outputs(outputs: Vec<TensorRef>) -> Result<ExecNode> {
        ExecNodeBuilder::new("Add")
            .add_input(
                "left",
                vec![make_tensor_reference("x", DataType::Int64, Visibility::Public)],
            )
            .add_input(
                "right",
                vec![make_tensor_reference("y", DataType::Int64, Visibility::Public)],
            )
            .add_output("out", outputs)
            .build()
    }

    #[test]
    fn builder_names_node() {
        let node = node_with_outputs(vec![make_tensor_reference(
            "z",
            DataType::Int64,
            Visibility::Public,
        )])
        .unwrap();
        assert_eq!(node.node_name, "add_node");
        assert_eq!(node.required_input("left").unwrap()[0].name, "x");
        assert!(node.required_input("middle").is_err());
    }

    #[test]
    fn duplicate_output_names_rejected() {
        let z = make_tensor_reference("z", DataType::Int64, Visibility::Public);
        let err = node_with_outputs(vec![z.clone(), z]).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn duplicate_slot_names_rejected() {
        let x = make_tensor_reference("x", DataType::Int64, Visibility::Public);
        let err = ExecNodeBuilder::new("Add")
            .add_input("left", vec![x.clone()])
            .add_input("left", vec![x])
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn plain_tensor_cannot_be_secret() {
        let column = HostColumn::from(vec![1_i64]);
        assert!(Tensor::plain(column.clone(), Visibility::Secret).is_err());
        let tensor = Tensor::plain(column, Visibility::Private(Role::from("alice"))).unwrap();
        assert_eq!(tensor.dtype(), DataType::Int64);
        assert!(tensor.as_shared().is_none());
    }

    #[test]
    fn session_id_is_deterministic() {
        let a = SessionId::try_from("abc").unwrap();
        let b = SessionId::try_from("abc").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "abc");
        assert_ne!(a.as_bytes(), SessionId::try_from("abd").unwrap().as_bytes());
    }

    #[test]
    fn rendezvous_key_display() {
        let key = RendezvousKey::from(1);
        assert_eq!(key.to_string(), "01000000000000000000000000000000");
    }
}

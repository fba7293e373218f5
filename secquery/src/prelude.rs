pub use crate::{
    additive::{AdditiveProtocol, AdtShare},
    computation::{
        make_tensor_reference, ExecNode, ExecNodeBuilder, NamedSlot, RendezvousKey, SessionId,
        Tensor, TensorRef,
    },
    config::ProtocolConfig,
    error::{Error, ErrorKind, Result},
    execution::{ExecContext, Session, TensorTable},
    host::HostColumn,
    kernels::*,
    networking::{AsyncNetworking, AsyncNetworkingImpl},
    types::*,
};

//! Shared validation and path selection for two-operand operators.

use super::*;
use crate::computation::{Tensor, TensorRef};
use crate::types::{Role, Visibility};
use derive_more::Display;
use itertools::izip;

pub const IN_LEFT: &str = "left";
pub const IN_RIGHT: &str = "right";
pub const OUT: &str = "out";

/// Which implementation of an operator an invocation runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum ExecutionPath {
    /// Directly on plaintext columns.
    Plain,
    /// On secret shares through the secure backend.
    Secure,
}

/// Choose the path for operands of the given visibilities.
///
/// Secret operands, and private operands of two different owners, need the
/// secure path; anything else is computed in the clear.
pub fn dispatch(lhs: &Visibility, rhs: &Visibility) -> ExecutionPath {
    match Visibility::most_restrictive(lhs, rhs) {
        Visibility::Secret => ExecutionPath::Secure,
        _ => ExecutionPath::Plain,
    }
}

/// One validated element of a batched invocation.
struct Invocation<'n> {
    lhs: &'n TensorRef,
    rhs: &'n TensorRef,
    out: &'n TensorRef,
    path: ExecutionPath,
}

#[async_trait]
impl<O: BinaryOperator + 'static> Operator for O {
    fn op_type(&self) -> &'static str {
        O::OP_TYPE
    }

    async fn run(&self, ctx: &mut ExecContext<'_>) -> Result<()> {
        run_binary(self, ctx).await
    }
}

#[tracing::instrument(
    level = "debug",
    skip_all,
    fields(op = O::OP_TYPE, party = %ctx.session().role())
)]
async fn run_binary<O: BinaryOperator>(op: &O, ctx: &mut ExecContext<'_>) -> Result<()> {
    let invocations = validate(op, ctx)?;

    let mut results = Vec::with_capacity(invocations.len());
    for invocation in invocations.iter() {
        let me = ctx.session().role();
        tracing::debug!(
            "{} {} {} -> {} on {} path",
            invocation.lhs.name,
            O::OP_TYPE,
            invocation.rhs.name,
            invocation.out.name,
            invocation.path
        );
        let tensor = match invocation.path {
            ExecutionPath::Plain if !sees_plaintext(me, &invocation.out.visibility) => {
                tracing::debug!("Party {} does not hold {}", me, invocation.out.name);
                continue;
            }
            ExecutionPath::Plain => compute_plain(op, ctx, invocation),
            ExecutionPath::Secure => compute_secure(op, ctx, invocation).await,
        }
        .map_err(|e| e.into_compute(O::OP_TYPE))?;
        results.push((invocation.out.name.clone(), tensor));
    }

    for (name, tensor) in results {
        ctx.table_mut().add_tensor(name, tensor)?;
    }
    Ok(())
}

fn sees_plaintext(me: &Role, visibility: &Visibility) -> bool {
    match visibility {
        Visibility::Private(owner) => owner == me,
        _ => true,
    }
}

/// Check the node and the tensor table before anything is computed.
fn validate<'n, O: BinaryOperator>(op: &O, ctx: &ExecContext<'n>) -> Result<Vec<Invocation<'n>>> {
    let node = ctx.node();
    if node.op_type != O::OP_TYPE {
        return Err(Error::Validation(format!(
            "Node '{}' has type {} but was dispatched to {}",
            node.node_name,
            node.op_type,
            O::OP_TYPE
        )));
    }
    node.validate()?;

    let lefts = node.required_input(IN_LEFT)?;
    let rights = node.required_input(IN_RIGHT)?;
    let outs = node.required_output(OUT)?;
    if lefts.len() != rights.len() || lefts.len() != outs.len() {
        return Err(Error::Validation(format!(
            "Node '{}' has {} left, {} right and {} output tensors",
            node.node_name,
            lefts.len(),
            rights.len(),
            outs.len()
        )));
    }

    op.ensure_implemented()?;

    izip!(lefts, rights, outs)
        .map(|(lhs, rhs, out)| {
            for operand in [lhs, rhs] {
                if !operand.dtype.is_numeric() {
                    return Err(Error::Validation(format!(
                        "{} operand '{}' has non-numeric type {}",
                        O::OP_TYPE,
                        operand.name,
                        operand.dtype
                    )));
                }
                check_operand(ctx, operand)?;
            }

            let visibility = Visibility::most_restrictive(&lhs.visibility, &rhs.visibility);
            if out.visibility != visibility {
                return Err(Error::Validation(format!(
                    "Output '{}' is declared {} but its inputs give {}",
                    out.name, out.visibility, visibility
                )));
            }
            let dtype = op.output_type(lhs.dtype, rhs.dtype)?;
            if out.dtype != dtype {
                return Err(Error::Validation(format!(
                    "Output '{}' is declared {} but {} produces {}",
                    out.name,
                    out.dtype,
                    O::OP_TYPE,
                    dtype
                )));
            }
            if ctx.table().contains(&out.name) {
                return Err(Error::Validation(format!(
                    "Output '{}' already exists in the tensor table",
                    out.name
                )));
            }

            Ok(Invocation {
                lhs,
                rhs,
                out,
                path: dispatch(&lhs.visibility, &rhs.visibility),
            })
        })
        .collect()
}

/// Bound tensors must match their declaration; only private tensors of
/// another party may be absent.
fn check_operand(ctx: &ExecContext<'_>, operand: &TensorRef) -> Result<()> {
    match ctx.table().get_tensor(&operand.name) {
        Some(tensor) => {
            if tensor.visibility() != &operand.visibility || tensor.dtype() != operand.dtype {
                return Err(Error::Validation(format!(
                    "Tensor '{}' is {} {} but declared {} {}",
                    operand.name,
                    tensor.visibility(),
                    tensor.dtype(),
                    operand.visibility,
                    operand.dtype
                )));
            }
            Ok(())
        }
        None if !sees_plaintext(ctx.session().role(), &operand.visibility) => Ok(()),
        None => Err(Error::Validation(format!(
            "Input tensor '{}' not found",
            operand.name
        ))),
    }
}

fn plain_operand<'a>(ctx: &'a ExecContext<'_>, operand: &TensorRef) -> Result<&'a HostColumn> {
    ctx.table()
        .get_tensor(&operand.name)
        .and_then(Tensor::as_plain)
        .ok_or_else(|| {
            Error::Validation(format!(
                "Input tensor '{}' has no plaintext on party {}",
                operand.name,
                ctx.session().role()
            ))
        })
}

fn compute_plain<O: BinaryOperator>(
    op: &O,
    ctx: &ExecContext<'_>,
    invocation: &Invocation<'_>,
) -> Result<Tensor> {
    let lhs = plain_operand(ctx, invocation.lhs)?;
    let rhs = plain_operand(ctx, invocation.rhs)?;
    let column = op.compute_plain(lhs, rhs)?;
    Tensor::plain(column, invocation.out.visibility.clone())
}

/// Secret-share an operand for the secure path.
async fn to_secret(ctx: &ExecContext<'_>, operand: &TensorRef) -> Result<AdtShare> {
    let protocol = ctx.session().protocol();
    match &operand.visibility {
        Visibility::Secret => ctx
            .table()
            .get_tensor(&operand.name)
            .and_then(Tensor::as_shared)
            .cloned()
            .ok_or_else(|| {
                Error::Validation(format!("Input tensor '{}' is not shared", operand.name))
            }),
        Visibility::Public => protocol.share_public(plain_operand(ctx, operand)?),
        Visibility::Private(owner) if owner == ctx.session().role() => {
            protocol.share_private(plain_operand(ctx, operand)?).await
        }
        Visibility::Private(owner) => protocol.receive_private(operand.dtype, owner).await,
    }
}

async fn compute_secure<O: BinaryOperator>(
    op: &O,
    ctx: &ExecContext<'_>,
    invocation: &Invocation<'_>,
) -> Result<Tensor> {
    let lhs = to_secret(ctx, invocation.lhs).await?;
    let rhs = to_secret(ctx, invocation.rhs).await?;
    let share = op
        .compute_secure(ctx.session().protocol(), &lhs, &rhs)
        .await?;
    Ok(Tensor::secret(share))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::computation::{make_tensor_reference, ExecNode, ExecNodeBuilder, SessionId};
    use crate::config::ProtocolConfig;
    use crate::error::ErrorKind;
    use crate::execution::TensorTable;
    use crate::testing::make_2pc_sessions;
    use rstest::rstest;

    fn private(owner: &str) -> Visibility {
        Visibility::Private(Role::from(owner))
    }

    #[rstest]
    #[case(Visibility::Public, Visibility::Public, ExecutionPath::Plain)]
    #[case(Visibility::Public, private("alice"), ExecutionPath::Plain)]
    #[case(private("alice"), private("alice"), ExecutionPath::Plain)]
    #[case(private("alice"), private("bob"), ExecutionPath::Secure)]
    #[case(Visibility::Secret, Visibility::Public, ExecutionPath::Secure)]
    #[case(private("bob"), Visibility::Secret, ExecutionPath::Secure)]
    #[case(Visibility::Secret, Visibility::Secret, ExecutionPath::Secure)]
    fn dispatch_by_visibility(
        #[case] lhs: Visibility,
        #[case] rhs: Visibility,
        #[case] expected: ExecutionPath,
    ) {
        assert_eq!(dispatch(&lhs, &rhs), expected);
        assert_eq!(dispatch(&rhs, &lhs), expected);
    }

    fn public_i64(name: &str) -> TensorRef {
        make_tensor_reference(name, DataType::Int64, Visibility::Public)
    }

    fn binary_node(
        op_type: &str,
        lefts: Vec<TensorRef>,
        rights: Vec<TensorRef>,
        outs: Vec<TensorRef>,
    ) -> ExecNode {
        ExecNodeBuilder::new(op_type)
            .add_input(IN_LEFT, lefts)
            .add_input(IN_RIGHT, rights)
            .add_output(OUT, outs)
            .build()
            .unwrap()
    }

    fn table_with(values: Vec<(&str, HostColumn, Visibility)>) -> TensorTable {
        let mut table = TensorTable::new();
        for (name, column, visibility) in values {
            table
                .add_tensor(name, Tensor::plain(column, visibility).unwrap())
                .unwrap();
        }
        table
    }

    async fn run_on_alice(node: &ExecNode, table: &mut TensorTable) -> Result<()> {
        let sid = SessionId::try_from("binary-contract-test").unwrap();
        let [alice, _bob] = make_2pc_sessions(&ProtocolConfig::default(), sid).unwrap();
        let mut ctx = ExecContext::new(node, &alice, table);
        ctx.execute().await
    }

    #[tokio::test]
    async fn plain_path_writes_output() {
        let node = binary_node(
            "Add",
            vec![public_i64("x")],
            vec![public_i64("y")],
            vec![public_i64("z")],
        );
        let mut table = table_with(vec![
            ("x", HostColumn::from(vec![1_i64, 2]), Visibility::Public),
            ("y", HostColumn::from(vec![3_i64, 4]), Visibility::Public),
        ]);
        run_on_alice(&node, &mut table).await.unwrap();
        let z = table.get_tensor("z").unwrap();
        assert_eq!(z.visibility(), &Visibility::Public);
        assert_eq!(z.as_plain().unwrap(), &HostColumn::from(vec![4_i64, 6]));
    }

    #[tokio::test]
    async fn bystander_skips_private_plain_computation() {
        let x = make_tensor_reference("x", DataType::Int64, private("bob"));
        let z = make_tensor_reference("z", DataType::Int64, private("bob"));
        let node = binary_node("Mul", vec![x], vec![public_i64("y")], vec![z]);
        let mut table = table_with(vec![("y", HostColumn::from(vec![3_i64]), Visibility::Public)]);
        run_on_alice(&node, &mut table).await.unwrap();
        assert!(!table.contains("z"));
    }

    #[tokio::test]
    async fn missing_slot_is_a_validation_error() {
        let node = ExecNodeBuilder::new("Add")
            .add_input(IN_LEFT, vec![public_i64("x")])
            .add_output(OUT, vec![public_i64("z")])
            .build()
            .unwrap();
        let mut table = TensorTable::new();
        let err = run_on_alice(&node, &mut table).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn batch_lengths_must_agree() {
        let node = binary_node(
            "Add",
            vec![public_i64("x"), public_i64("x2")],
            vec![public_i64("y")],
            vec![public_i64("z")],
        );
        let mut table = TensorTable::new();
        let err = run_on_alice(&node, &mut table).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[rstest]
    #[case::wrong_visibility(make_tensor_reference("z", DataType::Int64, Visibility::Secret))]
    #[case::wrong_dtype(make_tensor_reference("z", DataType::Float64, Visibility::Public))]
    #[case::existing_output(make_tensor_reference("x", DataType::Int64, Visibility::Public))]
    #[tokio::test]
    async fn output_declaration_is_checked(#[case] out: TensorRef) {
        let node = binary_node("Minus", vec![public_i64("x")], vec![public_i64("y")], vec![out]);
        let mut table = table_with(vec![
            ("x", HostColumn::from(vec![1_i64]), Visibility::Public),
            ("y", HostColumn::from(vec![1_i64]), Visibility::Public),
        ]);
        let err = run_on_alice(&node, &mut table).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(table.len(), 2);
    }

    #[tokio::test]
    async fn operand_must_match_declaration() {
        let node = binary_node(
            "Add",
            vec![public_i64("x")],
            vec![public_i64("y")],
            vec![public_i64("z")],
        );
        let mut table = table_with(vec![
            ("x", HostColumn::from(vec![1_i32]), Visibility::Public),
            ("y", HostColumn::from(vec![1_i64]), Visibility::Public),
        ]);
        let err = run_on_alice(&node, &mut table).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let bools = make_tensor_reference("b", DataType::Bool, Visibility::Public);
        let node = binary_node("Add", vec![bools], vec![public_i64("y")], vec![public_i64("z")]);
        let err = run_on_alice(&node, &mut table).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn kernel_failure_leaves_table_untouched() {
        let node = binary_node(
            "IntDiv",
            vec![public_i64("a"), public_i64("b")],
            vec![public_i64("c"), public_i64("d")],
            vec![public_i64("q1"), public_i64("q2")],
        );
        let mut table = table_with(vec![
            ("a", HostColumn::from(vec![7_i64]), Visibility::Public),
            ("b", HostColumn::from(vec![7_i64]), Visibility::Public),
            ("c", HostColumn::from(vec![2_i64]), Visibility::Public),
            ("d", HostColumn::from(vec![0_i64]), Visibility::Public),
        ]);
        let err = run_on_alice(&node, &mut table).await.unwrap_err();
        assert_eq!(
            err,
            Error::Compute {
                op: "IntDiv".to_string(),
                message: "divide by zero".to_string()
            }
        );
        assert!(!table.contains("q1"));
        assert!(!table.contains("q2"));
    }

    #[tokio::test]
    async fn unknown_operator_fails_lookup() {
        let node = binary_node(
            "Pow",
            vec![public_i64("x")],
            vec![public_i64("y")],
            vec![public_i64("z")],
        );
        let mut table = TensorTable::new();
        let err = run_on_alice(&node, &mut table).await.unwrap_err();
        assert_eq!(err, Error::UnknownOperator("Pow".to_string()));
    }
}

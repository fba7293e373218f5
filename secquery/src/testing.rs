//! Two-party runtime for exercising operators end to end.
//!
//! Both parties run in the same process, on their own tokio task, talking
//! over a shared [`LocalAsyncNetworking`]. Every party is bounded by a
//! timeout so that a protocol mismatch shows up as an error instead of a
//! hang.

use crate::additive::AdtShare;
use crate::computation::{
    make_tensor_reference, ExecNode, ExecNodeBuilder, SessionId, Tensor, TensorRef,
};
use crate::config::ProtocolConfig;
use crate::error::{Error, Result};
use crate::execution::{ExecContext, Session, TensorTable};
use crate::host::HostColumn;
use crate::kernels::register_all_ops;
use crate::networking::local::LocalAsyncNetworking;
use crate::networking::AsyncNetworkingImpl;
use crate::types::{DataType, Role, Visibility};
use aes_prng::AesRng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Tolerance used when comparing a revealed secret against its expectation.
pub const DEFAULT_SECRET_ATOL: f64 = 0.05;

/// Sessions of both parties, connected through one in-memory network.
pub fn make_2pc_sessions(
    config: &ProtocolConfig,
    session_id: SessionId,
) -> Result<[Arc<Session>; 2]> {
    config.validate()?;
    let networking: AsyncNetworkingImpl = Arc::new(LocalAsyncNetworking::default());
    let make = |role: &Role| {
        Session::new(
            session_id.clone(),
            role.clone(),
            config.clone(),
            Arc::clone(&networking),
        )
        .map(Arc::new)
    };
    Ok([make(&config.parties[0])?, make(&config.parties[1])?])
}

fn paired<'a>(
    refs: &'a [TensorRef],
    values: &'a [HostColumn],
) -> Result<impl Iterator<Item = (&'a TensorRef, &'a HostColumn)>> {
    if refs.len() != values.len() {
        return Err(Error::TestRuntime(format!(
            "{} tensor references but {} values",
            refs.len(),
            values.len()
        )));
    }
    for (tensor_ref, value) in refs.iter().zip(values) {
        if tensor_ref.dtype != value.data_type() {
            return Err(Error::TestRuntime(format!(
                "Tensor '{}' is declared {} but fed {}",
                tensor_ref.name,
                tensor_ref.dtype,
                value.data_type()
            )));
        }
    }
    Ok(refs.iter().zip(values))
}

/// Bind public values on both parties.
pub fn feed_inputs_as_public(
    tables: &mut [TensorTable; 2],
    refs: &[TensorRef],
    values: &[HostColumn],
) -> Result<()> {
    for (tensor_ref, value) in paired(refs, values)? {
        for table in tables.iter_mut() {
            table.add_tensor(
                tensor_ref.name.clone(),
                Tensor::plain(value.clone(), Visibility::Public)?,
            )?;
        }
    }
    Ok(())
}

/// Bind private values on the table of their owner.
pub fn feed_inputs_as_private(
    table: &mut TensorTable,
    refs: &[TensorRef],
    values: &[HostColumn],
) -> Result<()> {
    for (tensor_ref, value) in paired(refs, values)? {
        table.add_tensor(
            tensor_ref.name.clone(),
            Tensor::plain(value.clone(), tensor_ref.visibility.clone())?,
        )?;
    }
    Ok(())
}

/// Secret-share values between both parties.
pub fn feed_inputs_as_secret(
    tables: &mut [TensorTable; 2],
    refs: &[TensorRef],
    values: &[HostColumn],
    fraction_bits: u32,
) -> Result<()> {
    let mut rng = AesRng::from_random_seed();
    for (tensor_ref, value) in paired(refs, values)? {
        let [x0, x1] = AdtShare::split(value, fraction_bits, &mut rng)?;
        tables[0].add_tensor(tensor_ref.name.clone(), Tensor::secret(x0))?;
        tables[1].add_tensor(tensor_ref.name.clone(), Tensor::secret(x1))?;
    }
    Ok(())
}

/// Recombine secret tensors held by both parties.
pub fn reveal_secret(tables: &[TensorTable; 2], refs: &[TensorRef]) -> Result<Vec<HostColumn>> {
    fn share<'t>(table: &'t TensorTable, tensor_ref: &TensorRef) -> Result<&'t AdtShare> {
        table
            .get_tensor(&tensor_ref.name)
            .and_then(Tensor::as_shared)
            .ok_or_else(|| {
                Error::TestRuntime(format!("No share of secret '{}' found", tensor_ref.name))
            })
    }

    refs.iter()
        .map(|tensor_ref| {
            AdtShare::reveal(
                share(&tables[0], tensor_ref)?,
                share(&tables[1], tensor_ref)?,
            )
        })
        .collect()
}

/// What one party ended up with after running a node.
#[derive(Debug)]
pub struct PartyOutcome {
    pub role: Role,
    pub table: TensorTable,
    pub result: Result<()>,
}

/// Run `node` on every party concurrently, each on its own task and each
/// bounded by `timeout`.
///
/// Outcomes are returned in the order the parties were given.
pub async fn run_parties(
    node: &ExecNode,
    parties: Vec<(Arc<Session>, TensorTable)>,
    timeout: Duration,
) -> Result<Vec<PartyOutcome>> {
    register_all_ops();
    let tasks = parties.into_iter().map(|(session, mut table)| {
        let node = node.clone();
        tokio::spawn(async move {
            let role = session.role().clone();
            let result = {
                let mut ctx = ExecContext::new(&node, &session, &mut table);
                let outcome = tokio::time::timeout(timeout, ctx.execute()).await;
                outcome.unwrap_or_else(|_| {
                    Err(Error::TestRuntime(format!(
                        "Party {} did not finish within {:?}",
                        role, timeout
                    )))
                })
            };
            PartyOutcome {
                role,
                table,
                result,
            }
        })
    });

    futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.map_err(|e| Error::TestRuntime(e.to_string())))
        .collect()
}

/// Drives both parties of a session through operator invocations.
pub struct TwoPartyHarness {
    config: ProtocolConfig,
    sessions: [Arc<Session>; 2],
    tables: [TensorTable; 2],
    timeout: Duration,
}

impl TwoPartyHarness {
    pub fn new(config: ProtocolConfig) -> Result<Self> {
        let sessions = make_2pc_sessions(&config, SessionId::random())?;
        Ok(TwoPartyHarness {
            config,
            sessions,
            tables: Default::default(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Replace the sessions with ones bound to `session_id`.
    pub fn with_session_id(mut self, session_id: SessionId) -> Result<Self> {
        self.sessions = make_2pc_sessions(&self.config, session_id)?;
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn session(&self, party: usize) -> &Session {
        &self.sessions[party]
    }

    pub fn table(&self, party: usize) -> &TensorTable {
        &self.tables[party]
    }

    pub fn table_mut(&mut self, party: usize) -> &mut TensorTable {
        &mut self.tables[party]
    }

    /// Bind each value according to the visibility of its reference.
    pub fn feed(&mut self, refs: &[TensorRef], values: &[HostColumn]) -> Result<()> {
        for (tensor_ref, value) in paired(refs, values)? {
            let tensor_ref = std::slice::from_ref(tensor_ref);
            let value = std::slice::from_ref(value);
            match &tensor_ref[0].visibility {
                Visibility::Public => feed_inputs_as_public(&mut self.tables, tensor_ref, value)?,
                Visibility::Private(owner) => {
                    let party = self.config.party_index(owner)?;
                    feed_inputs_as_private(&mut self.tables[party], tensor_ref, value)?
                }
                Visibility::Secret => feed_inputs_as_secret(
                    &mut self.tables,
                    tensor_ref,
                    value,
                    self.config.fraction_bits,
                )?,
            }
        }
        Ok(())
    }

    /// Run `node` on both parties and return the result of each.
    pub async fn run_each(&mut self, node: &ExecNode) -> Result<Vec<Result<()>>> {
        let parties = self
            .sessions
            .iter()
            .zip(self.tables.iter_mut())
            .map(|(session, table)| (Arc::clone(session), std::mem::take(table)))
            .collect();
        let outcomes = run_parties(node, parties, self.timeout).await?;

        let mut results = Vec::with_capacity(outcomes.len());
        for (slot, outcome) in self.tables.iter_mut().zip(outcomes) {
            tracing::debug!(
                "Party {} finished {}: {:?}",
                outcome.role,
                node.node_name,
                outcome.result
            );
            *slot = outcome.table;
            results.push(outcome.result);
        }
        Ok(results)
    }

    /// Run `node` on both parties, failing with the first party error.
    pub async fn run(&mut self, node: &ExecNode) -> Result<()> {
        self.run_each(node).await?.into_iter().collect()
    }

    /// Plaintext of the given output tensors, revealing secrets.
    pub fn outputs(&self, refs: &[TensorRef]) -> Result<Vec<HostColumn>> {
        refs.iter()
            .map(|tensor_ref| {
                let party = match &tensor_ref.visibility {
                    Visibility::Secret => {
                        let mut revealed =
                            reveal_secret(&self.tables, std::slice::from_ref(tensor_ref))?;
                        return Ok(revealed.remove(0));
                    }
                    Visibility::Public => 0,
                    Visibility::Private(owner) => self.config.party_index(owner)?,
                };
                self.tables[party]
                    .get_tensor(&tensor_ref.name)
                    .and_then(Tensor::as_plain)
                    .cloned()
                    .ok_or_else(|| {
                        Error::TestRuntime(format!("Output '{}' not found", tensor_ref.name))
                    })
            })
            .collect()
    }

    /// Feed, run and check a scenario.
    pub async fn run_scenario(&mut self, scenario: &Scenario) -> Result<ScenarioReport> {
        let (left_refs, left_values) = ScenarioInput::unzip(&scenario.left);
        let (right_refs, right_values) = ScenarioInput::unzip(&scenario.right);
        self.feed(&left_refs, &left_values)?;
        self.feed(&right_refs, &right_values)?;

        let node = scenario.node()?;
        self.run(&node).await?;

        let out_refs = scenario.output_refs();
        let values = self.outputs(&out_refs)?;

        let mut report = ScenarioReport::default();
        for (output, actual) in scenario.out.iter().zip(values) {
            if let Some(expected) = &output.expected {
                let atol = output.atol.unwrap_or(if output.visibility.is_secret() {
                    DEFAULT_SECRET_ATOL
                } else {
                    0.0
                });
                if !actual.approx_eq(expected, atol) {
                    report.mismatches.push(format!(
                        "{}: expected {}, got {} (atol {})",
                        output.name, expected, actual, atol
                    ));
                }
            }
            report.outputs.push((output.name.clone(), actual));
        }
        Ok(report)
    }
}

/// A single operator invocation together with its inputs and expected
/// outputs, as loaded from a TOML or JSON file.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub op_type: String,
    #[serde(default)]
    pub node_name: Option<String>,
    pub left: Vec<ScenarioInput>,
    pub right: Vec<ScenarioInput>,
    pub out: Vec<ScenarioOutput>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ScenarioInput {
    pub name: String,
    pub visibility: Visibility,
    pub data: HostColumn,
}

impl ScenarioInput {
    fn unzip(inputs: &[ScenarioInput]) -> (Vec<TensorRef>, Vec<HostColumn>) {
        inputs
            .iter()
            .map(|input| {
                (
                    make_tensor_reference(
                        input.name.clone(),
                        input.data.data_type(),
                        input.visibility.clone(),
                    ),
                    input.data.clone(),
                )
            })
            .unzip()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ScenarioOutput {
    pub name: String,
    pub dtype: DataType,
    pub visibility: Visibility,
    #[serde(default)]
    pub expected: Option<HostColumn>,
    #[serde(default)]
    pub atol: Option<f64>,
}

impl Scenario {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn from_json_str(source: &str) -> Result<Self> {
        serde_json::from_str(source).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load from a `.json` file, or TOML for any other extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&source),
            _ => Self::from_toml_str(&source),
        }
    }

    pub fn output_refs(&self) -> Vec<TensorRef> {
        self.out
            .iter()
            .map(|out| make_tensor_reference(out.name.clone(), out.dtype, out.visibility.clone()))
            .collect()
    }

    pub fn node(&self) -> Result<ExecNode> {
        let mut builder = ExecNodeBuilder::new(self.op_type.clone())
            .add_input("left", ScenarioInput::unzip(&self.left).0)
            .add_input("right", ScenarioInput::unzip(&self.right).0)
            .add_output("out", self.output_refs());
        if let Some(name) = &self.node_name {
            builder = builder.set_node_name(name.clone());
        }
        builder.build()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScenarioReport {
    pub outputs: Vec<(String, HostColumn)>,
    pub mismatches: Vec<String>,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty()
    }
}

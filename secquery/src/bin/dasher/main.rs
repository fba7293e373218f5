use anyhow::Context;
use clap::Parser;
use secquery::config::ProtocolConfig;
use secquery::prelude::*;
use secquery::testing::{Scenario, TwoPartyHarness};
use std::convert::TryFrom;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser, Clone)]
#[clap(about = "Run a single operator scenario locally, simulating both parties")]
struct Opt {
    /// Scenario file (TOML, or JSON with a .json extension)
    scenario: PathBuf,

    /// Protocol configuration file
    #[clap(short, long, env = "SECQUERY_CONFIG")]
    config: Option<PathBuf>,

    #[clap(short, long, default_value = "dasher-session")]
    session_id: String,

    /// Per-party timeout
    #[clap(long, default_value = "30")]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let opt = Opt::parse();

    let config = match &opt.config {
        Some(path) => ProtocolConfig::from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ProtocolConfig::default(),
    };
    let scenario = Scenario::from_path(&opt.scenario)
        .with_context(|| format!("loading scenario {}", opt.scenario.display()))?;
    let session_id = SessionId::try_from(opt.session_id.as_str())?;

    tracing::info!(
        "Running {} with parties {:?}",
        scenario.op_type,
        config.parties.iter().map(|role| &role.0).collect::<Vec<_>>()
    );

    let mut harness = TwoPartyHarness::new(config)?
        .with_session_id(session_id)?
        .with_timeout(Duration::from_secs(opt.timeout_secs));
    let report = harness.run_scenario(&scenario).await?;

    for (name, value) in report.outputs.iter() {
        println!("Output '{}': {}", name, value);
    }
    for mismatch in report.mismatches.iter() {
        println!("Mismatch {}", mismatch);
    }
    if !report.passed() {
        anyhow::bail!("{} output(s) did not match", report.mismatches.len());
    }
    println!("All outputs match");
    Ok(())
}

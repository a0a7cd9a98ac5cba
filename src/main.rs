use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use coin_ops_pipeline::config::PipelineConfig;
use coin_ops_pipeline::contract::parse_request_bytes;
use coin_ops_pipeline::delegate::ProcessDelegate;
use coin_ops_pipeline::plan_utils::planner::{plan_coin_ops, PlannerInput};
use coin_ops_pipeline::stages::{run_stage, StageContext, StageKind};

const EXIT_MALFORMED_INPUT: i32 = 2;

#[derive(Parser, Debug)]
#[clap(version)]
pub struct Cli {
    /// path to config file
    #[clap(long, value_parser, global = true)]
    config_path: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// dispatch a request to the executor for its key source
    Route,
    /// bind the request to its signer selection
    Worker,
    /// prepare the signing backend request
    Signer,
    /// attach a coin selection to the plan
    Builder,
    /// compute additions from the plan and selection
    RawEngine,
    /// relay the final request for signing and submission
    Submit,
    /// produce split/combine plans from bucket state
    Plan,
}

impl Command {
    fn stage(&self) -> Option<StageKind> {
        match self {
            Command::Route => Some(StageKind::Route),
            Command::Worker => Some(StageKind::Worker),
            Command::Signer => Some(StageKind::Signer),
            Command::Builder => Some(StageKind::Builder),
            Command::RawEngine => Some(StageKind::RawEngine),
            Command::Submit => Some(StageKind::Submit),
            Command::Plan => None,
        }
    }
}

#[tokio::main]
async fn main() {
    let code = match _main().await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{:?}", err);
            1
        }
    };
    std::process::exit(code);
}

async fn _main() -> anyhow::Result<i32> {
    // stdout carries the result object, so logs go to stderr
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();

    let Cli {
        config_path,
        command,
    } = Cli::parse();

    let mut raw = vec![];
    std::io::stdin()
        .read_to_end(&mut raw)
        .context("Cannot read request from stdin")?;
    let Some(request) = parse_request_bytes(&raw) else {
        tracing::warn!("stdin is not a UTF-8 JSON object");
        return Ok(EXIT_MALFORMED_INPUT);
    };

    let output = match command.stage() {
        Some(kind) => {
            let config = PipelineConfig::from_process_env(config_path.as_deref())?;
            let ctx = StageContext::new(config, Arc::new(ProcessDelegate));
            tracing::info!("running {} stage", kind.subcommand());
            run_stage(kind, &ctx, &request).await.to_value()
        }
        None => {
            let input: PlannerInput = match serde_json::from_value(Value::Object(request)) {
                Ok(input) => input,
                Err(err) => {
                    tracing::warn!("invalid planner input: {}", err);
                    return Ok(EXIT_MALFORMED_INPUT);
                }
            };
            json!({ "plans": plan_coin_ops(&input) })
        }
    };

    println!(
        "{}",
        serde_json::to_string(&output).context("Cannot serialize result")?
    );
    Ok(0)
}

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::config::{Hop, PipelineConfig};
use crate::contract::{Request, StageResult};
use crate::delegate::{classify_response, Delegate};
use crate::validation::Rejection;

pub mod builder;
pub mod raw_engine;
pub mod routing;
pub mod signer;
pub mod submit;
pub mod worker;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageKind {
    Route,
    Worker,
    Signer,
    Builder,
    RawEngine,
    Submit,
}

impl StageKind {
    pub fn subcommand(&self) -> &'static str {
        match self {
            StageKind::Route => "route",
            StageKind::Worker => "worker",
            StageKind::Signer => "signer",
            StageKind::Builder => "builder",
            StageKind::RawEngine => "raw-engine",
            StageKind::Submit => "submit",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "route" => Some(StageKind::Route),
            "worker" => Some(StageKind::Worker),
            "signer" => Some(StageKind::Signer),
            "builder" => Some(StageKind::Builder),
            "raw-engine" => Some(StageKind::RawEngine),
            "submit" => Some(StageKind::Submit),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HopFailure {
    NotConfigured,
    Failed(String),
}

#[derive(Clone)]
pub struct StageContext {
    pub config: Arc<PipelineConfig>,
    pub delegate: Arc<dyn Delegate>,
}

impl StageContext {
    pub fn new(config: PipelineConfig, delegate: Arc<dyn Delegate>) -> Self {
        Self {
            config: Arc::new(config),
            delegate,
        }
    }

    pub async fn invoke_hop(&self, hop: Hop, request: &Value) -> Result<Map<String, Value>, HopFailure> {
        let command = match self.config.resolve(hop) {
            Ok(Some(command)) => command,
            Ok(None) => return Err(HopFailure::NotConfigured),
            Err(err) => return Err(HopFailure::Failed(err.reason(hop.tag()))),
        };
        tracing::debug!("delegating {} to {}", hop.tag(), command);
        self.delegate
            .invoke(&command, request, self.config.timeout())
            .await
            .map_err(|err| {
                tracing::warn!("{} delegation failed: {}", hop.tag(), err);
                HopFailure::Failed(err.reason(hop.tag()))
            })
    }

    pub async fn forward(&self, hop: Hop, request: Value, forwarded_key: &str) -> StageResult {
        let result = match self.invoke_hop(hop, &request).await {
            Ok(body) => classify_response(hop.tag(), body),
            Err(HopFailure::NotConfigured) => StageResult::skipped(hop.not_configured_reason()),
            Err(HopFailure::Failed(reason)) => StageResult::skipped(reason),
        };
        tracing::info!(
            "{} -> {}: {} ({})",
            hop.tag(),
            forwarded_key,
            result.status().as_str(),
            result.reason()
        );
        result.with_partial(forwarded_key, request)
    }
}

#[async_trait]
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    async fn run(&self, ctx: &StageContext, request: &Request) -> StageResult;
}

pub(crate) fn rejected(kind: StageKind, rejection: Rejection) -> StageResult {
    tracing::info!(
        "{} rejected request: {} ({:?})",
        kind.subcommand(),
        rejection,
        rejection.kind()
    );
    rejection.into()
}

pub fn stage_for(kind: StageKind) -> Box<dyn Stage> {
    match kind {
        StageKind::Route => Box::new(routing::RouteStage),
        StageKind::Worker => Box::new(worker::WorkerStage),
        StageKind::Signer => Box::new(signer::SignerStage),
        StageKind::Builder => Box::new(builder::BuilderStage),
        StageKind::RawEngine => Box::new(raw_engine::RawEngineStage),
        StageKind::Submit => Box::new(submit::SubmitStage),
    }
}

pub async fn run_stage(kind: StageKind, ctx: &StageContext, request: &Request) -> StageResult {
    stage_for(kind).run(ctx, request).await
}

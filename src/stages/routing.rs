use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::Hop;
use crate::contract::{Request, StageResult};
use crate::stages::{rejected, Stage, StageContext, StageKind};
use crate::validation::{require_present, text_field, Rejection};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectedSource {
    ChiaKeys,
    MnemonicImport,
    GenerateNewKey,
}

impl SelectedSource {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "chia_keys" => Some(SelectedSource::ChiaKeys),
            "mnemonic_import" => Some(SelectedSource::MnemonicImport),
            "generate_new_key" => Some(SelectedSource::GenerateNewKey),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SelectedSource::ChiaKeys => "chia_keys",
            SelectedSource::MnemonicImport => "mnemonic_import",
            SelectedSource::GenerateNewKey => "generate_new_key",
        }
    }

    pub fn executor(&self) -> Hop {
        match self {
            SelectedSource::ChiaKeys => Hop::ChiaKeysExecutor,
            SelectedSource::MnemonicImport => Hop::MnemonicExecutor,
            SelectedSource::GenerateNewKey => Hop::GenerateKeyExecutor,
        }
    }
}

pub struct RouteStage;

fn route(request: &Request) -> Result<(SelectedSource, Value), Rejection> {
    let selected_source = text_field(request, "selected_source");
    require_present(&[&selected_source], Rejection::MissingSelectedSource)?;
    let key_id = text_field(request, "key_id");
    let network = text_field(request, "network");
    require_present(&[&key_id, &network], Rejection::MissingKeyOrNetwork)?;
    let source =
        SelectedSource::parse(&selected_source).ok_or(Rejection::UnsupportedSelectedSource)?;

    let mut payload = request.clone();
    payload.insert("selected_source".to_string(), json!(source.as_str()));
    payload.insert("key_id".to_string(), json!(key_id));
    payload.insert("network".to_string(), json!(network));
    Ok((source, Value::Object(payload)))
}

#[async_trait]
impl Stage for RouteStage {
    fn kind(&self) -> StageKind {
        StageKind::Route
    }

    async fn run(&self, ctx: &StageContext, request: &Request) -> StageResult {
        match route(request) {
            Ok((source, payload)) => {
                tracing::debug!("routing {} request", source.as_str());
                ctx.forward(source.executor(), payload, "worker_request")
                    .await
            }
            Err(rejection) => rejected(self.kind(), rejection),
        }
    }
}

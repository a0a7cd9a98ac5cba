use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::Hop;
use crate::contract::{Request, StageResult};
use crate::stages::routing::SelectedSource;
use crate::stages::{rejected, Stage, StageContext, StageKind};
use crate::validation::{
    credential_locator, native_asset_id, object_field, parse_plan, require_present, text_field,
    Rejection, TargetPolicy,
};

pub struct WorkerStage;

fn signer_request(request: &Request) -> Result<Value, Rejection> {
    let selected_source = text_field(request, "selected_source");
    if SelectedSource::parse(&selected_source) != Some(SelectedSource::ChiaKeys) {
        return Err(Rejection::UnsupportedSelectedSource);
    }
    let signer_selection =
        object_field(request, "signer_selection").ok_or(Rejection::MissingSignerSelection)?;

    let key_id = text_field(request, "key_id");
    let signer_key_id = text_field(signer_selection, "key_id");
    if key_id.is_empty() || key_id != signer_key_id {
        return Err(Rejection::SignerKeyMismatch);
    }
    let receive_address = text_field(request, "receive_address");
    require_present(&[&receive_address], Rejection::MissingReceiveAddress)?;
    let keyring_yaml_path =
        credential_locator(&text_field(signer_selection, "keyring_yaml_path"))?;
    let asset_id = native_asset_id(request)?;
    let plan = parse_plan(request, TargetPolicy::Derive)?;

    Ok(json!({
        "selected_source": selected_source,
        "key_id": key_id,
        "network": text_field(request, "network"),
        "market_id": text_field(request, "market_id"),
        "asset_id": asset_id,
        "receive_address": receive_address,
        "keyring_yaml_path": keyring_yaml_path,
        "chia_keys_dir": text_field(signer_selection, "chia_keys_dir"),
        "plan": plan,
    }))
}

#[async_trait]
impl Stage for WorkerStage {
    fn kind(&self) -> StageKind {
        StageKind::Worker
    }

    async fn run(&self, ctx: &StageContext, request: &Request) -> StageResult {
        match signer_request(request) {
            Ok(next) => ctx.forward(Hop::Signer, next, "signer_request").await,
            Err(rejection) => rejected(self.kind(), rejection),
        }
    }
}

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::Hop;
use crate::contract::{Request, StageResult};
use crate::plan_utils::outputs::build_outputs;
use crate::plan_utils::selection::{resolve_selection, SelectionSet};
use crate::stages::{rejected, Stage, StageContext, StageKind};
use crate::validation::{parse_plan, text_field, Rejection, SigningIdentity, TargetPolicy};

pub struct RawEngineStage;

fn sign_tx_request(request: &Request) -> Result<Value, Rejection> {
    let identity = SigningIdentity::parse(request)?;
    let plan = parse_plan(request, TargetPolicy::Required)?;
    let selection = SelectionSet::from_value(request.get("selected_coins"))
        .ok_or(Rejection::MissingSelectedCoins)?;

    let resolved = resolve_selection(&selection, plan.target_total_base_units)?;
    let additions = build_outputs(&plan, &resolved, &identity.receive_address).into_outputs();

    let mut sign_tx_request = identity.to_request();
    sign_tx_request.insert("market_id".to_string(), json!(text_field(request, "market_id")));
    sign_tx_request.insert("plan".to_string(), json!(plan));
    sign_tx_request.insert("selected_coins".to_string(), selection.to_value());
    sign_tx_request.insert(
        "selected_total_base_units".to_string(),
        json!(resolved.selected_total),
    );
    sign_tx_request.insert("additions".to_string(), json!(additions));
    Ok(Value::Object(sign_tx_request))
}

#[async_trait]
impl Stage for RawEngineStage {
    fn kind(&self) -> StageKind {
        StageKind::RawEngine
    }

    async fn run(&self, ctx: &StageContext, request: &Request) -> StageResult {
        match sign_tx_request(request) {
            Ok(next) => ctx.forward(Hop::SdkSubmit, next, "sign_tx_request").await,
            Err(rejection) => rejected(self.kind(), rejection),
        }
    }
}

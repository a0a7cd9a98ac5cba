use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::Hop;
use crate::contract::{OperationPlan, Request, StageResult};
use crate::plan_utils::selection::{resolve_selection, SelectionSet};
use crate::stages::{rejected, HopFailure, Stage, StageContext, StageKind};
use crate::validation::{parse_plan, text_field, Rejection, SigningIdentity, TargetPolicy};

pub struct BuilderStage;

impl BuilderStage {
    async fn selection(
        &self,
        ctx: &StageContext,
        request: &Request,
        identity: &SigningIdentity,
        plan: &OperationPlan,
    ) -> Result<SelectionSet, StageResult> {
        if let Some(selection) = SelectionSet::from_value(request.get("selected_coins")) {
            return Ok(selection);
        }

        let selector_request = json!({
            "network": identity.network,
            "receive_address": identity.receive_address,
            "asset_id": identity.asset_id,
            "target_total_base_units": plan.target_total_base_units,
        });
        match ctx.invoke_hop(Hop::CoinSelector, &selector_request).await {
            Ok(body) => {
                let coins = body.get("selected_coins").or_else(|| body.get("coins"));
                SelectionSet::from_value(coins)
                    .ok_or_else(|| rejected(self.kind(), Rejection::NoUnspentCoins))
            }
            Err(HopFailure::NotConfigured) => Err(StageResult::skipped(
                Hop::CoinSelector.not_configured_reason(),
            )
            .with_partial("coin_selection_request", selector_request)),
            Err(HopFailure::Failed(reason)) => Err(StageResult::skipped(reason)),
        }
    }

    async fn sign_request(&self, ctx: &StageContext, request: &Request) -> Result<Value, StageResult> {
        let identity = SigningIdentity::parse(request).map_err(|err| rejected(self.kind(), err))?;
        let plan = parse_plan(request, TargetPolicy::DeriveWhenAbsent)
            .map_err(|err| rejected(self.kind(), err))?;

        let selection = self.selection(ctx, request, &identity, &plan).await?;
        let resolved = resolve_selection(&selection, plan.target_total_base_units)
            .map_err(|err| rejected(self.kind(), err))?;
        tracing::debug!(
            "{} coins selected, {} over target",
            selection.len(),
            resolved.change()
        );

        let mut sign_request = identity.to_request();
        sign_request.insert("market_id".to_string(), json!(text_field(request, "market_id")));
        sign_request.insert("plan".to_string(), json!(plan));
        sign_request.insert("selected_coins".to_string(), selection.to_value());
        Ok(Value::Object(sign_request))
    }
}

#[async_trait]
impl Stage for BuilderStage {
    fn kind(&self) -> StageKind {
        StageKind::Builder
    }

    async fn run(&self, ctx: &StageContext, request: &Request) -> StageResult {
        match self.sign_request(ctx, request).await {
            Ok(next) => ctx.forward(Hop::BundleSigner, next, "sign_request").await,
            Err(result) => result,
        }
    }
}

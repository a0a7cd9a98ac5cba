use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::Hop;
use crate::contract::{Request, StageResult};
use crate::plan_utils::balance_verification::verify_output_balance;
use crate::plan_utils::selection::SelectionSet;
use crate::stages::{rejected, Stage, StageContext, StageKind};
use crate::validation::{parse_additions, text_field, Rejection, SigningIdentity};

pub struct SubmitStage;

fn submit_request(request: &Request) -> Result<Value, Rejection> {
    let identity = SigningIdentity::parse(request)?;
    let additions = parse_additions(request)?;
    let selection = SelectionSet::from_value(request.get("selected_coins"))
        .ok_or(Rejection::MissingSelectedCoins)?;
    let remainder = verify_output_balance(selection.selected_total(), &additions)?;
    if remainder > 0 {
        tracing::debug!("{} base units left unassigned", remainder);
    }

    let mut submit_request = identity.to_request();
    submit_request.insert("market_id".to_string(), json!(text_field(request, "market_id")));
    submit_request.insert(
        "plan".to_string(),
        request.get("plan").cloned().unwrap_or(Value::Null),
    );
    submit_request.insert("selected_coins".to_string(), selection.to_value());
    submit_request.insert("additions".to_string(), json!(additions));
    Ok(Value::Object(submit_request))
}

pub fn is_spend_bundle_hex(raw: &str) -> bool {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    !digits.is_empty() && hex::decode(digits).is_ok()
}

#[async_trait]
impl Stage for SubmitStage {
    fn kind(&self) -> StageKind {
        StageKind::Submit
    }

    async fn run(&self, ctx: &StageContext, request: &Request) -> StageResult {
        let next = match submit_request(request) {
            Ok(next) => next,
            Err(rejection) => return rejected(self.kind(), rejection),
        };
        match ctx
            .forward(Hop::SignSubmit, next.clone(), "submit_request")
            .await
        {
            StageResult::Executed {
                spend_bundle_hex, ..
            } if !is_spend_bundle_hex(&spend_bundle_hex) => {
                tracing::warn!("sign_submit returned malformed spend bundle");
                StageResult::skipped("invalid_spend_bundle_hex").with_partial("submit_request", next)
            }
            result => result,
        }
    }
}

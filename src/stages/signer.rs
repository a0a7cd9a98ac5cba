use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::Hop;
use crate::contract::{Request, StageResult};
use crate::stages::routing::SelectedSource;
use crate::stages::{rejected, Stage, StageContext, StageKind};
use crate::validation::{
    credential_locator, native_asset_id, parse_plan, require_present, text_field, Rejection,
    TargetPolicy,
};

pub struct SignerStage;

fn backend_request(request: &Request) -> Result<Value, Rejection> {
    if SelectedSource::parse(&text_field(request, "selected_source"))
        != Some(SelectedSource::ChiaKeys)
    {
        return Err(Rejection::UnsupportedSelectedSource);
    }
    let key_id = text_field(request, "key_id");
    let network = text_field(request, "network");
    require_present(&[&key_id, &network], Rejection::MissingKeyOrNetwork)?;
    let receive_address = text_field(request, "receive_address");
    require_present(&[&receive_address], Rejection::MissingReceiveAddress)?;
    let keyring_yaml_path = credential_locator(&text_field(request, "keyring_yaml_path"))?;
    let asset_id = native_asset_id(request)?;
    let plan = parse_plan(request, TargetPolicy::DeriveWhenAbsent)?;

    Ok(json!({
        "key_id": key_id,
        "network": network,
        "keyring_yaml_path": keyring_yaml_path,
        "receive_address": receive_address,
        "asset_id": asset_id,
        "market_id": text_field(request, "market_id"),
        "plan": plan,
    }))
}

#[async_trait]
impl Stage for SignerStage {
    fn kind(&self) -> StageKind {
        StageKind::Signer
    }

    async fn run(&self, ctx: &StageContext, request: &Request) -> StageResult {
        match backend_request(request) {
            Ok(next) => {
                ctx.forward(Hop::SignerBackend, next, "backend_request")
                    .await
            }
            Err(rejection) => rejected(self.kind(), rejection),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::stages::signer::SignerStage;
    use crate::stages::testing::{context, executed, keyring, request, RecordingDelegate};
    use crate::stages::Stage;
    use serde_json::{json, Value};

    fn valid_request(keyring_path: &str) -> Value {
        json!({
            "selected_source": "chia_keys",
            "key_id": "key-main-1",
            "network": "testnet11",
            "market_id": "m1",
            "receive_address": "xch1receive",
            "asset_id": "xch",
            "keyring_yaml_path": keyring_path,
            "chia_keys_dir": "~/.chia_keys",
            "plan": {"op_type": "combine", "size_base_units": 10, "op_count": 2, "reason": "excess_only_policy"},
        })
    }

    #[tokio::test]
    async fn derives_missing_target() {
        let keyring = keyring();
        let path = keyring.path().display().to_string();
        let delegate = RecordingDelegate::answering(executed("abcd"));
        let result = SignerStage
            .run(&context(delegate.clone()), &request(valid_request(&path)))
            .await;
        assert!(result.is_executed());
        let sent = delegate.last_request();
        assert_eq!(sent["plan"]["target_total_base_units"], json!(20));
        assert_eq!(sent["market_id"], json!("m1"));
        assert!(sent.get("selected_source").is_none());
        let calls = delegate.calls.lock().unwrap();
        assert_eq!(calls[0].0.args, vec!["builder"]);
    }

    #[tokio::test]
    async fn keeps_inbound_target() {
        let keyring = keyring();
        let path = keyring.path().display().to_string();
        let mut input = valid_request(&path);
        input["plan"]["target_total_base_units"] = json!(25);
        let delegate = RecordingDelegate::answering(executed("abcd"));
        SignerStage
            .run(&context(delegate.clone()), &request(input))
            .await;
        assert_eq!(
            delegate.last_request()["plan"]["target_total_base_units"],
            json!(25)
        );
    }

    #[tokio::test]
    async fn check_order() {
        let keyring = keyring();
        let path = keyring.path().display().to_string();
        let delegate = RecordingDelegate::answering(executed("00"));
        let ctx = context(delegate.clone());

        let cases: Vec<(&str, Value, &str)> = vec![
            ("selected_source", json!(""), "unsupported_selected_source"),
            ("network", json!(null), "missing_key_or_network"),
            ("receive_address", json!(""), "missing_receive_address"),
            ("keyring_yaml_path", json!(""), "missing_keyring_yaml_path"),
            ("keyring_yaml_path", json!("/nonexistent/keyring.yaml"), "keyring_yaml_not_found"),
            ("asset_id", json!("deadbeef"), "asset_not_supported_yet"),
            ("plan", json!([]), "missing_plan"),
            ("plan", json!({"op_type": "split", "size_base_units": 10, "op_count": 2, "target_total_base_units": 0}), "invalid_plan_values"),
        ];
        for (field, value, reason) in cases {
            let mut input = valid_request(&path);
            input[field] = value;
            let result = SignerStage.run(&ctx, &request(input)).await;
            assert_eq!(result.reason(), reason, "{field}");
        }
        assert_eq!(delegate.call_count(), 0);
    }

    #[tokio::test]
    async fn missing_address_reported_before_keyring() {
        let delegate = RecordingDelegate::answering(executed("00"));
        let mut input = valid_request("/nonexistent/keyring.yaml");
        input.as_object_mut().unwrap().remove("receive_address");
        let result = SignerStage
            .run(&context(delegate.clone()), &request(input))
            .await;
        assert_eq!(result.reason(), "missing_receive_address");
        assert_eq!(delegate.call_count(), 0);
    }

    #[tokio::test]
    async fn backend_without_spend_bundle() {
        let keyring = keyring();
        let path = keyring.path().display().to_string();
        let delegate = RecordingDelegate::answering(json!({"status": "executed", "reason": "signed"}));
        let result = SignerStage
            .run(&context(delegate), &request(valid_request(&path)))
            .await;
        assert_eq!(result.reason(), "signer_backend_missing_spend_bundle_hex");
        assert!(result.partial("backend_request").is_some());
    }
}

use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use thiserror::Error;

use crate::contract::{OpType, OperationPlan, Output, Request, StageResult};

const NATIVE_ASSET_IDS: [&str; 3] = ["xch", "1", ""];

// each operation becomes one output
pub const MAX_OPERATIONS_PER_PLAN: i64 = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectionKind {
    Contract,
    Resource,
    Arithmetic,
    UnsupportedAsset,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("missing_selected_source")]
    MissingSelectedSource,
    #[error("unsupported_selected_source")]
    UnsupportedSelectedSource,
    #[error("missing_key_or_network")]
    MissingKeyOrNetwork,
    #[error("missing_key_or_network_or_address")]
    MissingKeyOrNetworkOrAddress,
    #[error("missing_signer_selection")]
    MissingSignerSelection,
    #[error("signer_key_mismatch")]
    SignerKeyMismatch,
    #[error("missing_keyring_yaml_path")]
    MissingKeyringYamlPath,
    #[error("keyring_yaml_not_found")]
    KeyringYamlNotFound,
    #[error("missing_receive_address")]
    MissingReceiveAddress,
    #[error("asset_not_supported_yet")]
    AssetNotSupportedYet,
    #[error("missing_plan")]
    MissingPlan,
    #[error("unsupported_operation_type")]
    UnsupportedOperationType,
    #[error("invalid_plan_values")]
    InvalidPlanValues,
    #[error("missing_selected_coins")]
    MissingSelectedCoins,
    #[error("missing_additions")]
    MissingAdditions,
    #[error("invalid_additions")]
    InvalidAdditions,
    #[error("insufficient_selected_coin_total")]
    InsufficientSelectedCoinTotal,
    #[error("additions_exceed_selected_total")]
    AdditionsExceedSelectedTotal,
    #[error("no_unspent_xch_coins")]
    NoUnspentCoins,
}

impl Rejection {
    pub fn kind(&self) -> RejectionKind {
        match self {
            Rejection::KeyringYamlNotFound | Rejection::NoUnspentCoins => RejectionKind::Resource,
            Rejection::InvalidPlanValues
            | Rejection::InsufficientSelectedCoinTotal
            | Rejection::AdditionsExceedSelectedTotal => RejectionKind::Arithmetic,
            Rejection::AssetNotSupportedYet => RejectionKind::UnsupportedAsset,
            _ => RejectionKind::Contract,
        }
    }
}

impl From<Rejection> for StageResult {
    fn from(rejection: Rejection) -> Self {
        StageResult::skipped(rejection.to_string())
    }
}

pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

pub fn text_field(request: &Request, key: &str) -> String {
    match request.get(key) {
        Some(Value::String(text)) => text.trim().to_string(),
        Some(value @ (Value::Number(_) | Value::Bool(_))) => value.to_string(),
        _ => String::new(),
    }
}

pub fn object_field<'a>(request: &'a Request, key: &str) -> Option<&'a Request> {
    request.get(key).and_then(Value::as_object)
}

pub fn require_present(values: &[&str], rejection: Rejection) -> Result<(), Rejection> {
    if values.iter().any(|value| value.is_empty()) {
        return Err(rejection);
    }
    Ok(())
}

pub fn coerce_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn plan_integer(plan: &Request, key: &str) -> Result<i64, Rejection> {
    match plan.get(key) {
        None | Some(Value::Null) => Ok(0),
        Some(value) => coerce_integer(value).ok_or(Rejection::InvalidPlanValues),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetPolicy {
    Derive,
    DeriveWhenAbsent,
    Required,
}

pub fn parse_plan(request: &Request, policy: TargetPolicy) -> Result<OperationPlan, Rejection> {
    let plan = object_field(request, "plan").ok_or(Rejection::MissingPlan)?;
    let op_type =
        OpType::parse(&text_field(plan, "op_type")).ok_or(Rejection::UnsupportedOperationType)?;
    let size_base_units = plan_integer(plan, "size_base_units")?;
    let op_count = plan_integer(plan, "op_count")?;
    if size_base_units <= 0 || op_count <= 0 || op_count > MAX_OPERATIONS_PER_PLAN {
        return Err(Rejection::InvalidPlanValues);
    }
    let derived = size_base_units
        .checked_mul(op_count)
        .ok_or(Rejection::InvalidPlanValues)?;
    let target_total_base_units = match policy {
        TargetPolicy::Derive => derived,
        TargetPolicy::DeriveWhenAbsent => match plan.get("target_total_base_units") {
            None | Some(Value::Null) => derived,
            Some(_) => plan_integer(plan, "target_total_base_units")?,
        },
        TargetPolicy::Required => plan_integer(plan, "target_total_base_units")?,
    };
    if target_total_base_units <= 0 {
        return Err(Rejection::InvalidPlanValues);
    }

    Ok(OperationPlan {
        op_type,
        size_base_units: size_base_units as u64,
        op_count: op_count as u64,
        target_total_base_units: target_total_base_units as u64,
        reason: text_field(plan, "reason"),
    })
}

pub fn native_asset_id(request: &Request) -> Result<String, Rejection> {
    let asset_id = text_field(request, "asset_id").to_lowercase();
    if !NATIVE_ASSET_IDS.contains(&asset_id.as_str()) {
        return Err(Rejection::AssetNotSupportedYet);
    }
    Ok(asset_id)
}

pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(path));
    }
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

pub fn credential_locator(path: &str) -> Result<String, Rejection> {
    if path.is_empty() {
        return Err(Rejection::MissingKeyringYamlPath);
    }
    if !Path::new(&expand_home(path)).exists() {
        return Err(Rejection::KeyringYamlNotFound);
    }
    Ok(path.to_string())
}

pub fn non_empty_list<'a>(request: &'a Request, key: &str) -> Option<&'a Vec<Value>> {
    request
        .get(key)
        .and_then(Value::as_array)
        .filter(|items| !items.is_empty())
}

pub fn parse_additions(request: &Request) -> Result<Vec<Output>, Rejection> {
    let additions = non_empty_list(request, "additions").ok_or(Rejection::MissingAdditions)?;
    additions
        .iter()
        .map(|addition| {
            let addition = addition.as_object().ok_or(Rejection::InvalidAdditions)?;
            let address = text_field(addition, "address");
            let amount = addition
                .get("amount")
                .and_then(coerce_integer)
                .filter(|amount| *amount > 0)
                .ok_or(Rejection::InvalidAdditions)?;
            if address.is_empty() {
                return Err(Rejection::InvalidAdditions);
            }
            Ok(Output::new(address, amount as u64))
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SigningIdentity {
    pub key_id: String,
    pub network: String,
    pub receive_address: String,
    pub keyring_yaml_path: String,
    pub asset_id: String,
}

impl SigningIdentity {
    pub fn parse(request: &Request) -> Result<Self, Rejection> {
        let key_id = text_field(request, "key_id");
        let network = text_field(request, "network");
        let receive_address = text_field(request, "receive_address");
        require_present(
            &[&key_id, &network, &receive_address],
            Rejection::MissingKeyOrNetworkOrAddress,
        )?;
        let keyring_yaml_path = credential_locator(&text_field(request, "keyring_yaml_path"))?;
        let asset_id = native_asset_id(request)?;
        Ok(Self {
            key_id,
            network,
            receive_address,
            keyring_yaml_path,
            asset_id,
        })
    }

    pub fn to_request(&self) -> Request {
        let mut request = Request::new();
        request.insert("key_id".to_string(), json!(self.key_id));
        request.insert("network".to_string(), json!(self.network));
        request.insert("receive_address".to_string(), json!(self.receive_address));
        request.insert(
            "keyring_yaml_path".to_string(),
            json!(self.keyring_yaml_path),
        );
        request.insert("asset_id".to_string(), json!(self.asset_id));
        request
    }
}

#[cfg(test)]
mod tests {
    use crate::contract::{OpType, Request};
    use crate::validation::{
        coerce_integer, native_asset_id, parse_additions, parse_plan, text_field, Rejection,
        RejectionKind, SigningIdentity, TargetPolicy, MAX_OPERATIONS_PER_PLAN,
    };
    use serde_json::{json, Value};
    use std::io::Write;

    fn request(value: Value) -> Request {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn text_fields_are_trimmed_and_scalar() {
        let req = request(json!({"a": "  x ", "b": 12, "c": null, "d": {"x": 1}, "e": true}));
        assert_eq!(text_field(&req, "a"), "x");
        assert_eq!(text_field(&req, "b"), "12");
        assert_eq!(text_field(&req, "c"), "");
        assert_eq!(text_field(&req, "d"), "");
        assert_eq!(text_field(&req, "e"), "true");
        assert_eq!(text_field(&req, "missing"), "");
    }

    #[test]
    fn integer_coercion() {
        assert_eq!(coerce_integer(&json!(5)), Some(5));
        assert_eq!(coerce_integer(&json!(-5)), Some(-5));
        assert_eq!(coerce_integer(&json!(" 7 ")), Some(7));
        assert_eq!(coerce_integer(&json!(3.0)), Some(3));
        assert_eq!(coerce_integer(&json!(3.5)), None);
        assert_eq!(coerce_integer(&json!("abc")), None);
        assert_eq!(coerce_integer(&json!(null)), None);
        assert_eq!(coerce_integer(&json!([1])), None);
    }

    #[test]
    fn plan_target_policies() {
        let req = request(json!({"plan": {"op_type": "split", "size_base_units": 10, "op_count": 2, "target_total_base_units": 99}}));
        assert_eq!(
            parse_plan(&req, TargetPolicy::Derive)
                .unwrap()
                .target_total_base_units,
            20
        );
        assert_eq!(
            parse_plan(&req, TargetPolicy::Required)
                .unwrap()
                .target_total_base_units,
            99
        );

        let no_target = request(json!({"plan": {"op_type": "combine", "size_base_units": "10", "op_count": 3, "reason": " r "}}));
        let plan = parse_plan(&no_target, TargetPolicy::DeriveWhenAbsent).unwrap();
        assert_eq!(plan.op_type, OpType::Combine);
        assert_eq!(plan.target_total_base_units, 30);
        assert_eq!(plan.reason, "r");
        assert_eq!(
            parse_plan(&no_target, TargetPolicy::Required),
            Err(Rejection::InvalidPlanValues)
        );

        let zero_target = request(json!({"plan": {"op_type": "split", "size_base_units": 10, "op_count": 2, "target_total_base_units": 0}}));
        assert_eq!(
            parse_plan(&zero_target, TargetPolicy::DeriveWhenAbsent),
            Err(Rejection::InvalidPlanValues)
        );
        let negative_target = request(json!({"plan": {"op_type": "split", "size_base_units": 10, "op_count": 2, "target_total_base_units": -5}}));
        assert_eq!(
            parse_plan(&negative_target, TargetPolicy::DeriveWhenAbsent),
            Err(Rejection::InvalidPlanValues)
        );
    }

    #[test]
    fn plan_rejections() {
        assert_eq!(
            parse_plan(&request(json!({})), TargetPolicy::Derive),
            Err(Rejection::MissingPlan)
        );
        assert_eq!(
            parse_plan(&request(json!({"plan": "split"})), TargetPolicy::Derive),
            Err(Rejection::MissingPlan)
        );
        assert_eq!(
            parse_plan(
                &request(json!({"plan": {"op_type": "merge", "size_base_units": 1, "op_count": 1}})),
                TargetPolicy::Derive
            ),
            Err(Rejection::UnsupportedOperationType)
        );
        assert_eq!(
            parse_plan(
                &request(json!({"plan": {"op_type": "split", "size_base_units": 0, "op_count": 1}})),
                TargetPolicy::Derive
            ),
            Err(Rejection::InvalidPlanValues)
        );
        assert_eq!(
            parse_plan(
                &request(json!({"plan": {"op_type": "split", "size_base_units": "ten", "op_count": 1}})),
                TargetPolicy::Derive
            ),
            Err(Rejection::InvalidPlanValues)
        );
        assert_eq!(
            parse_plan(
                &request(json!({"plan": {"op_type": "split", "size_base_units": i64::MAX, "op_count": 2}})),
                TargetPolicy::Derive
            ),
            Err(Rejection::InvalidPlanValues)
        );
    }

    #[test]
    fn op_count_is_bounded() {
        let at_limit = request(json!({"plan": {"op_type": "split", "size_base_units": 1, "op_count": MAX_OPERATIONS_PER_PLAN}}));
        assert_eq!(
            parse_plan(&at_limit, TargetPolicy::Derive).unwrap().op_count,
            MAX_OPERATIONS_PER_PLAN as u64
        );
        let over_limit = request(json!({"plan": {"op_type": "split", "size_base_units": 1, "op_count": MAX_OPERATIONS_PER_PLAN + 1}}));
        assert_eq!(
            parse_plan(&over_limit, TargetPolicy::Derive),
            Err(Rejection::InvalidPlanValues)
        );
    }

    #[test]
    fn asset_allow_list() {
        assert_eq!(native_asset_id(&request(json!({}))).unwrap(), "");
        assert_eq!(
            native_asset_id(&request(json!({"asset_id": " XCH "}))).unwrap(),
            "xch"
        );
        assert_eq!(native_asset_id(&request(json!({"asset_id": "1"}))).unwrap(), "1");
        let rejection = native_asset_id(&request(json!({"asset_id": "a628c1c2"}))).unwrap_err();
        assert_eq!(rejection, Rejection::AssetNotSupportedYet);
        assert_eq!(rejection.kind(), RejectionKind::UnsupportedAsset);
    }

    #[test]
    fn additions_must_be_well_formed() {
        assert_eq!(
            parse_additions(&request(json!({"additions": []}))),
            Err(Rejection::MissingAdditions)
        );
        assert_eq!(
            parse_additions(&request(json!({"additions": [{"address": "xch1a", "amount": 0}]}))),
            Err(Rejection::InvalidAdditions)
        );
        assert_eq!(
            parse_additions(&request(json!({"additions": [{"address": " ", "amount": 1}]}))),
            Err(Rejection::InvalidAdditions)
        );
        let additions =
            parse_additions(&request(json!({"additions": [{"address": "xch1a", "amount": "4"}]})))
                .unwrap();
        assert_eq!(additions.len(), 1);
        assert_eq!(additions[0].amount, 4);
    }

    #[test]
    fn identity_check_order() {
        let mut keyring = tempfile::NamedTempFile::new().unwrap();
        keyring.write_all(b"version: 1\n").unwrap();
        let path = keyring.path().display().to_string();

        let missing_address = request(json!({"key_id": "k", "network": "testnet11"}));
        assert_eq!(
            SigningIdentity::parse(&missing_address),
            Err(Rejection::MissingKeyOrNetworkOrAddress)
        );

        let no_keyring = request(json!({"key_id": "k", "network": "n", "receive_address": "xch1a"}));
        assert_eq!(
            SigningIdentity::parse(&no_keyring),
            Err(Rejection::MissingKeyringYamlPath)
        );

        let absent_keyring = request(json!({
            "key_id": "k", "network": "n", "receive_address": "xch1a",
            "keyring_yaml_path": "/nonexistent/coin-ops/keyring.yaml", "asset_id": "cat"
        }));
        let rejection = SigningIdentity::parse(&absent_keyring).unwrap_err();
        assert_eq!(rejection, Rejection::KeyringYamlNotFound);
        assert_eq!(rejection.kind(), RejectionKind::Resource);

        let wrong_asset = request(json!({
            "key_id": "k", "network": "n", "receive_address": "xch1a",
            "keyring_yaml_path": path, "asset_id": "cat"
        }));
        assert_eq!(
            SigningIdentity::parse(&wrong_asset),
            Err(Rejection::AssetNotSupportedYet)
        );

        let valid = request(json!({
            "key_id": " k ", "network": "n", "receive_address": "xch1a",
            "keyring_yaml_path": path, "asset_id": "XCH"
        }));
        let identity = SigningIdentity::parse(&valid).unwrap();
        assert_eq!(identity.key_id, "k");
        assert_eq!(identity.asset_id, "xch");
        assert_eq!(identity.to_request().get("keyring_yaml_path"), Some(&json!(path)));
    }
}

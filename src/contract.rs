use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

pub type Request = Map<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpType {
    Split,
    Combine,
}

impl OpType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "split" => Some(OpType::Split),
            "combine" => Some(OpType::Combine),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OpType::Split => "split",
            OpType::Combine => "combine",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationPlan {
    pub op_type: OpType,
    pub size_base_units: u64,
    pub op_count: u64,
    pub target_total_base_units: u64,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub address: String,
    pub amount: u64,
}

impl Output {
    pub fn new(address: impl Into<String>, amount: u64) -> Self {
        Self {
            address: address.into(),
            amount,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Executed,
    Skipped,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Executed => "executed",
            Status::Skipped => "skipped",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum StageResult {
    Executed {
        reason: String,
        operation_id: Option<String>,
        spend_bundle_hex: String,
    },
    Skipped {
        reason: String,
        operation_id: Option<String>,
        partial: Map<String, Value>,
    },
}

impl StageResult {
    pub fn skipped(reason: impl Into<String>) -> Self {
        StageResult::Skipped {
            reason: reason.into(),
            operation_id: None,
            partial: Map::new(),
        }
    }

    // keys already reported by a deeper stage are kept
    pub fn with_partial(mut self, key: &str, value: Value) -> Self {
        if let StageResult::Skipped { partial, .. } = &mut self {
            partial.entry(key.to_string()).or_insert(value);
        }
        self
    }

    pub fn status(&self) -> Status {
        match self {
            StageResult::Executed { .. } => Status::Executed,
            StageResult::Skipped { .. } => Status::Skipped,
        }
    }

    pub fn is_executed(&self) -> bool {
        self.status() == Status::Executed
    }

    pub fn reason(&self) -> &str {
        match self {
            StageResult::Executed { reason, .. } | StageResult::Skipped { reason, .. } => reason,
        }
    }

    pub fn operation_id(&self) -> Option<&str> {
        match self {
            StageResult::Executed { operation_id, .. }
            | StageResult::Skipped { operation_id, .. } => operation_id.as_deref(),
        }
    }

    pub fn spend_bundle_hex(&self) -> Option<&str> {
        match self {
            StageResult::Executed {
                spend_bundle_hex, ..
            } => Some(spend_bundle_hex),
            StageResult::Skipped { .. } => None,
        }
    }

    pub fn partial(&self, key: &str) -> Option<&Value> {
        match self {
            StageResult::Executed { .. } => None,
            StageResult::Skipped { partial, .. } => partial.get(key),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(Serialize)]
struct WireResult<'a> {
    status: &'static str,
    reason: &'a str,
    operation_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    spend_bundle_hex: Option<&'a str>,
    #[serde(flatten)]
    partial: &'a Map<String, Value>,
}

impl Serialize for StageResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let empty = Map::new();
        let partial = match self {
            StageResult::Executed { .. } => &empty,
            StageResult::Skipped { partial, .. } => partial,
        };
        WireResult {
            status: self.status().as_str(),
            reason: self.reason(),
            operation_id: self.operation_id(),
            spend_bundle_hex: self.spend_bundle_hex(),
            partial,
        }
        .serialize(serializer)
    }
}

pub fn parse_request(raw: &str) -> Option<Request> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(request)) => Some(request),
        _ => None,
    }
}

pub fn parse_request_bytes(raw: &[u8]) -> Option<Request> {
    std::str::from_utf8(raw).ok().and_then(parse_request)
}

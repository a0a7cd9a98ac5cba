use serde_json::Value;

use crate::validation::{coerce_integer, Rejection};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SelectionSet {
    coins: Vec<Value>,
}

impl SelectionSet {
    pub fn new(coins: Vec<Value>) -> Self {
        Self { coins }
    }

    pub fn from_value(value: Option<&Value>) -> Option<Self> {
        value
            .and_then(Value::as_array)
            .filter(|coins| !coins.is_empty())
            .map(|coins| Self::new(coins.clone()))
    }

    pub fn len(&self) -> usize {
        self.coins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
    }

    pub fn to_value(&self) -> Value {
        Value::Array(self.coins.clone())
    }

    pub fn selected_total(&self) -> u64 {
        self.coins
            .iter()
            .filter_map(coin_amount)
            .fold(0u64, |total, amount| total.saturating_add(amount))
    }
}

pub fn coin_amount(coin: &Value) -> Option<u64> {
    let amount = coin.as_object()?.get("amount")?;
    // amounts span the full u64 range, beyond what coerce_integer covers
    amount
        .as_u64()
        .or_else(|| amount.as_str().and_then(|text| text.trim().parse::<u64>().ok()))
        .or_else(|| {
            coerce_integer(amount)
                .filter(|amount| *amount >= 0)
                .map(|amount| amount as u64)
        })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedSelection {
    pub selected_total: u64,
    pub target_total: u64,
}

impl ResolvedSelection {
    pub fn change(&self) -> u64 {
        self.selected_total - self.target_total
    }
}

pub fn resolve_selection(
    selection: &SelectionSet,
    target_total: u64,
) -> Result<ResolvedSelection, Rejection> {
    let selected_total = selection.selected_total();
    if selected_total < target_total {
        tracing::debug!(
            "selection of {} coins totals {}, short of target {}",
            selection.len(),
            selected_total,
            target_total
        );
        return Err(Rejection::InsufficientSelectedCoinTotal);
    }
    Ok(ResolvedSelection {
        selected_total,
        target_total,
    })
}

use itertools::Itertools;
use serde::Deserialize;

use crate::contract::{OpType, OperationPlan};
use crate::validation::MAX_OPERATIONS_PER_PLAN;

pub const SPLIT_REASON: &str = "low_watermark_buffer_deficit";
pub const COMBINE_REASON: &str = "excess_only_policy";

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BucketSpec {
    pub size_base_units: u64,
    pub target_count: u64,
    pub split_buffer_count: u64,
    pub combine_when_excess_factor: f64,
    pub current_count: u64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlannerInput {
    pub buckets: Vec<BucketSpec>,
    pub max_operations_per_run: u64,
    // zero means unlimited
    #[serde(default)]
    pub max_fee_budget_base_units: u64,
    #[serde(default)]
    pub split_fee_base_units: u64,
    #[serde(default)]
    pub combine_fee_base_units: u64,
}

struct Budget {
    remaining_ops: u64,
    remaining_fee: u64,
}

impl Budget {
    fn new(input: &PlannerInput) -> Self {
        Self {
            remaining_ops: input.max_operations_per_run,
            remaining_fee: match input.max_fee_budget_base_units {
                0 => u64::MAX,
                budget => budget,
            },
        }
    }

    fn take(&mut self, wanted: u64, fee: u64) -> Option<u64> {
        if self.remaining_ops == 0 || fee > self.remaining_fee {
            return None;
        }
        let op_count = wanted
            .min(self.remaining_ops)
            .min(MAX_OPERATIONS_PER_PLAN as u64);
        self.remaining_ops -= op_count;
        self.remaining_fee -= fee;
        Some(op_count)
    }
}

fn plan_for(op_type: OpType, bucket: &BucketSpec, op_count: u64, reason: &str) -> OperationPlan {
    OperationPlan {
        op_type,
        size_base_units: bucket.size_base_units,
        op_count,
        target_total_base_units: bucket.size_base_units.saturating_mul(op_count),
        reason: reason.to_string(),
    }
}

pub fn plan_coin_ops(input: &PlannerInput) -> Vec<OperationPlan> {
    let mut budget = Budget::new(input);
    let mut plans = vec![];

    let deficits = input
        .buckets
        .iter()
        .filter(|bucket| bucket.target_count > 0)
        .filter_map(|bucket| {
            let threshold = bucket.target_count.saturating_add(bucket.split_buffer_count);
            match threshold.saturating_sub(bucket.current_count) {
                0 => None,
                deficit => Some((deficit as f64 / bucket.target_count as f64, bucket, deficit)),
            }
        })
        .sorted_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then(a.1.size_base_units.cmp(&b.1.size_base_units))
        })
        .collect::<Vec<_>>();

    for (_ratio, bucket, deficit) in deficits.iter() {
        match budget.take(*deficit, input.split_fee_base_units) {
            Some(op_count) => plans.push(plan_for(OpType::Split, bucket, op_count, SPLIT_REASON)),
            None => break,
        }
    }

    if !deficits.is_empty() {
        return plans;
    }

    let excess_candidates = input
        .buckets
        .iter()
        .filter_map(|bucket| {
            let threshold = (bucket.target_count as f64 * bucket.combine_when_excess_factor) as u64;
            match bucket.current_count.saturating_sub(threshold) {
                0 => None,
                excess => Some((bucket, excess)),
            }
        })
        .sorted_by_key(|(bucket, _)| bucket.size_base_units)
        .collect::<Vec<_>>();

    for (bucket, excess) in excess_candidates {
        match budget.take(excess, input.combine_fee_base_units) {
            Some(op_count) => {
                plans.push(plan_for(OpType::Combine, bucket, op_count, COMBINE_REASON))
            }
            None => break,
        }
    }

    tracing::debug!("planned {} coin operations", plans.len());
    plans
}

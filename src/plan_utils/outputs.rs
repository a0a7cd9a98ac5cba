use crate::contract::{OperationPlan, Output};
use crate::plan_utils::selection::ResolvedSelection;

pub struct OutputsStructure {
    pub principal: Vec<Output>,
    pub change: Option<Output>,
}

impl OutputsStructure {
    pub fn total(&self) -> u64 {
        self.principal
            .iter()
            .chain(self.change.iter())
            .map(|output| output.amount)
            .sum()
    }

    pub fn into_outputs(self) -> Vec<Output> {
        let mut outputs = self.principal;
        outputs.extend(self.change);
        outputs
    }
}

/* split and combine share one shape for now:
 * - op_count outputs of size_base_units to the receive address
 * - one change output to the same address when the selection overshoots
 * fees and coin spending stay with the downstream signer
 */
pub fn build_outputs(
    plan: &OperationPlan,
    resolved: &ResolvedSelection,
    receive_address: &str,
) -> OutputsStructure {
    tracing::debug!(
        "building {} outputs of {} for {} operation, selected total {}",
        plan.op_count,
        plan.size_base_units,
        plan.op_type.as_str(),
        resolved.selected_total
    );
    let principal = (0..plan.op_count)
        .map(|_| Output::new(receive_address, plan.size_base_units))
        .collect::<Vec<_>>();
    let change = match resolved.change() {
        0 => None,
        change => Some(Output::new(receive_address, change)),
    };

    OutputsStructure { principal, change }
}

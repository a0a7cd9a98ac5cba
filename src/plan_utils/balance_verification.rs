use crate::contract::Output;
use crate::validation::Rejection;

pub fn verify_output_balance(selected_total: u64, outputs: &[Output]) -> Result<u64, Rejection> {
    let output_total = outputs
        .iter()
        .try_fold(0u64, |total, output| total.checked_add(output.amount))
        .ok_or(Rejection::AdditionsExceedSelectedTotal)?;

    selected_total
        .checked_sub(output_total)
        .ok_or(Rejection::AdditionsExceedSelectedTotal)
}

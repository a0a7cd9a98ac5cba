pub mod balance_verification;
pub mod outputs;
pub mod planner;
pub mod selection;

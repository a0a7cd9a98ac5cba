pub mod config;
pub mod contract;
pub mod delegate;
pub mod plan_utils;
pub mod stages;
pub mod validation;

pub mod payment_pipeline;
pub mod reconciliation;
pub mod worker;

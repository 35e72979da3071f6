pub mod payment_repo;
pub mod webhook_repo;

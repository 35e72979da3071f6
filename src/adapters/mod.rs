pub mod admin;
pub mod api_errors;
pub mod mobile_webhook;
pub mod normalize;
pub mod pesapal_client;
pub mod rate_limit;
pub mod signature;
pub mod stripe_client;
pub mod stripe_webhook;

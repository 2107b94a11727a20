pub mod api_errors;
pub mod identity_webhook;
pub mod signature;
pub mod stripe_client;
pub mod stripe_webhook;

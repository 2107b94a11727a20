pub mod dispatcher;
pub mod identity_sync;
pub mod purchase_lifecycle;

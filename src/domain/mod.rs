pub mod audit;
pub mod enrollment;
pub mod error;
pub mod event;
pub mod id;
pub mod money;
pub mod provider;
pub mod purchase;
pub mod store;

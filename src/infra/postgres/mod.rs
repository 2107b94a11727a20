pub mod record_repo;

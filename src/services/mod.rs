pub mod memory_store;
pub mod mongo_store;
pub mod retry;
pub mod score_store;
pub mod stats_service;

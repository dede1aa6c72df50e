pub mod qdrant_vector_index;
pub mod query_log_repository;
pub mod record_repository;
pub mod user_repository;
pub mod vector_index;

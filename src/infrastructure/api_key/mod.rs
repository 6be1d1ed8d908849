//! API Key infrastructure implementations
//!
//! Key generation, the in-memory and PostgreSQL repositories and the
//! key lifecycle service.

mod generator;
mod postgres_repository;
mod repository;
mod service;

pub use generator::{display_prefix, hash_secret, ApiKeyGenerator, GeneratedApiKey};
pub use postgres_repository::PostgresApiKeyRepository;
pub use repository::InMemoryApiKeyRepository;
pub use service::{ApiKeyService, CreateApiKeyParams, CreatedApiKey};

pub mod backend_factory;
pub mod repository_factory;

pub use backend_factory::{create_backend, create_engine};
pub use repository_factory::open_conversation_repository;

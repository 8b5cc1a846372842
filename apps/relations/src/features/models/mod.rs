pub mod memory;
pub mod relation;
pub mod repo;
pub mod schema;

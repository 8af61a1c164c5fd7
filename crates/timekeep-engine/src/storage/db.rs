//! Database connection and initialization.

pub use timekeep_core::db::DatabaseError;

timekeep_core::define_database!(Database, "Database migrations complete");

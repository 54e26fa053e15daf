pub mod pool;
pub mod repositories;
pub mod seed;

pub use pool::{create_pool, run_migrations};
pub use seed::seed_categories;

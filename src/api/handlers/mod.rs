pub mod health;
pub mod insights;
pub mod payments;
pub mod ratings;
pub mod recovery;
pub mod services;

pub use health::*;
pub use insights::*;
pub use payments::*;
pub use ratings::*;
pub use recovery::*;
pub use services::*;

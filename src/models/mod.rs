pub mod category;
pub mod consumed_payment;
pub mod rating;
pub mod service;

pub use category::*;
pub use consumed_payment::*;
pub use rating::*;
pub use service::*;

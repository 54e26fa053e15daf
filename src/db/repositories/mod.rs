pub mod category_repo;
pub mod consumed_payment_repo;
pub mod rating_repo;
pub mod service_repo;

pub use category_repo::CategoryRepository;
pub use consumed_payment_repo::ConsumedPaymentRepository;
pub use rating_repo::RatingRepository;
pub use service_repo::ServiceRepository;

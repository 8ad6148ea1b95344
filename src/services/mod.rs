pub mod blog_service;
pub mod checkin_service;
pub mod jwt_service;
pub mod naboopay;
pub mod order_service;
pub mod program_service;
pub mod user_service;

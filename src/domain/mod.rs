pub mod text;
pub mod ticket;
pub mod user;

pub use text::{format_amount, slugify};
pub use ticket::generate_ticket_code;
pub use user::{Email, Password, Phone, Role};

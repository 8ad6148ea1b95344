pub mod admin;
pub mod auth;
pub mod checkin;
pub mod events;
pub mod health;
pub mod orders;

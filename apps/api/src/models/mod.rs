pub mod chat;
pub mod resume;
pub mod user;

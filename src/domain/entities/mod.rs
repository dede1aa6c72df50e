pub mod point;
pub mod record;
pub mod user;
pub mod user_email;
pub mod user_password;

pub mod channel;
pub mod post;
pub mod user;
pub mod workspace;

pub mod channel_service;
pub mod platforms;
pub mod post_service;
pub mod smtp_mailer;
pub mod storage;
pub mod workspace_policy;
pub mod workspace_service;

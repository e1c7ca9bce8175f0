pub mod channel_repository;
#[cfg(test)]
pub mod mock_db;
pub mod post_repository;
pub mod postgres_channel_repository;
pub mod postgres_post_repository;
pub mod postgres_user_repository;
pub mod postgres_workspace_repository;
pub mod user_repository;
pub mod workspace_repository;

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code == "23505";
        }
    }
    false
}

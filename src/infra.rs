mod sqlite_account_repository;

pub use sqlite_account_repository::*;

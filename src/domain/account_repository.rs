use crate::domain::{Account, NewAccount};
use error_ext::BoxError;
use futures::Stream;
use thiserror::Error;

#[trait_variant::make(Send)]
pub trait AccountRepository
where
    Self: Clone + Send + Sync + 'static,
{
    /// Idempotently create the backing table; to be invoked once before serving.
    async fn init(&self) -> Result<(), AccountRepositoryError>;

    /// Persist the given new account and return its store-assigned ID.
    async fn create_account(&self, account: &NewAccount) -> Result<i64, AccountRepositoryError>;

    async fn accounts(
        &self,
    ) -> Result<
        impl Stream<Item = Result<Account, AccountRepositoryError>> + Send,
        AccountRepositoryError,
    >;

    async fn account_by_id(&self, id: i64) -> Result<Account, AccountRepositoryError>;

    /// Delete the account with the given ID; succeeds if there is no such account.
    async fn delete_account(&self, id: i64) -> Result<(), AccountRepositoryError>;

    /// Accepted, but does not change anything.
    // Part of the store contract, but no route updates accounts.
    #[allow(dead_code)]
    async fn update_account(&self, account: &Account) -> Result<(), AccountRepositoryError>;
}

#[derive(Debug, Error)]
pub enum AccountRepositoryError {
    #[error("account {0} not found")]
    NotFound(i64),

    #[error("cannot access account store")]
    Storage(#[source] BoxError),
}

impl AccountRepositoryError {
    pub fn storage<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        AccountRepositoryError::Storage(error.into())
    }
}

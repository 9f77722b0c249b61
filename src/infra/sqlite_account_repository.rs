use crate::domain::{self, AccountRepository, AccountRepositoryError, NewAccount};
use futures::{Stream, TryStreamExt};
use sqlx::{prelude::FromRow, QueryBuilder, SqlitePool};
use time::OffsetDateTime;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone)]
pub struct SqliteAccountRepository {
    pool: SqlitePool,
}

impl SqliteAccountRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl AccountRepository for SqliteAccountRepository {
    #[instrument(skip(self))]
    async fn init(&self) -> Result<(), AccountRepositoryError> {
        sqlx::migrate!()
            .run(&self.pool)
            .await
            .map_err(AccountRepositoryError::storage)?;

        info!("account table ready");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn create_account(&self, account: &NewAccount) -> Result<i64, AccountRepositoryError> {
        let id = QueryBuilder::new(
            "INSERT INTO accounts (first_name, last_name, number, balance, created_at) ",
        )
        .push_values([account], |mut q, account| {
            q.push_bind(account.first_name.as_str())
                .push_bind(account.last_name.as_str())
                .push_bind(account.number)
                .push_bind(account.balance)
                .push_bind(account.created_at);
        })
        .build()
        .execute(&self.pool)
        .await
        .map_err(AccountRepositoryError::storage)?
        .last_insert_rowid();

        info!(id, "inserted account");
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn accounts(
        &self,
    ) -> Result<
        impl Stream<Item = Result<domain::Account, AccountRepositoryError>> + Send,
        AccountRepositoryError,
    > {
        let accounts = sqlx::query_as::<_, Account>("SELECT * FROM accounts ORDER BY id")
            .fetch(&self.pool)
            .map_ok(domain::Account::from)
            .map_err(AccountRepositoryError::storage);
        Ok(accounts)
    }

    #[instrument(skip(self))]
    async fn account_by_id(&self, id: i64) -> Result<domain::Account, AccountRepositoryError> {
        QueryBuilder::new("SELECT * FROM accounts WHERE id = ")
            .push_bind(id)
            .build_query_as::<Account>()
            .fetch_optional(&self.pool)
            .await
            .map_err(AccountRepositoryError::storage)?
            .map(domain::Account::from)
            .ok_or(AccountRepositoryError::NotFound(id))
    }

    #[instrument(skip(self))]
    async fn delete_account(&self, id: i64) -> Result<(), AccountRepositoryError> {
        let deleted = QueryBuilder::new("DELETE FROM accounts WHERE id = ")
            .push_bind(id)
            .build()
            .execute(&self.pool)
            .await
            .map_err(AccountRepositoryError::storage)?
            .rows_affected();

        debug!(deleted, "deleted accounts");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn update_account(
        &self,
        _account: &domain::Account,
    ) -> Result<(), AccountRepositoryError> {
        Ok(())
    }
}

#[derive(Debug, FromRow)]
struct Account {
    id: i64,
    first_name: String,
    last_name: String,
    number: i64,
    balance: i64,
    created_at: OffsetDateTime,
}

impl From<Account> for domain::Account {
    fn from(
        Account {
            id,
            first_name,
            last_name,
            number,
            balance,
            created_at,
        }: Account,
    ) -> Self {
        domain::Account {
            id,
            first_name,
            last_name,
            number,
            balance,
            created_at,
        }
    }
}

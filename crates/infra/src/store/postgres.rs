//! Postgres-backed ledger store.
//!
//! Each [`PostgresTx`] wraps one `sqlx` transaction. Row-level serialisation
//! comes from `SELECT ... FOR UPDATE` on expense/split reads made with
//! `lock = true`, and from the single-statement upsert used for balances
//! (`INSERT ... ON CONFLICT (user_id, currency) DO UPDATE`), which locks the
//! balance row until the transaction ends.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (serialization failure / deadlock) | `40001` / `40P01` | `Conflict` |
//! | Database (other) | Any other | `Backend` |
//! | Decode / ColumnNotFound | N/A | `Corrupt` |
//! | Other | N/A | `Backend` |

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use splitledger_core::{BalanceId, ExpenseId, SplitId, UserId};
use splitledger_expenses::{Balance, Currency, Expense, ExpenseSplit, SplitPolicy, User};

use super::{LedgerStore, LedgerTx, StoreError};

/// Tables used by the ledger. Applied idempotently by [`PostgresLedgerStore::ensure_schema`].
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS users_email_lower_idx ON users (lower(email))",
    r#"
    CREATE TABLE IF NOT EXISTS expenses (
        id UUID PRIMARY KEY,
        seq BIGSERIAL NOT NULL,
        description TEXT NOT NULL,
        currency TEXT NOT NULL,
        amount NUMERIC NOT NULL CHECK (amount > 0),
        created_by UUID NOT NULL REFERENCES users (id),
        split_type TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        is_settled BOOLEAN NOT NULL DEFAULT FALSE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS expense_splits (
        id UUID PRIMARY KEY,
        seq BIGSERIAL NOT NULL,
        expense_id UUID NOT NULL REFERENCES expenses (id),
        user_id UUID NOT NULL REFERENCES users (id),
        amount_owed NUMERIC NOT NULL,
        is_settled BOOLEAN NOT NULL DEFAULT FALSE,
        UNIQUE (expense_id, user_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS expense_splits_user_idx ON expense_splits (user_id)",
    r#"
    CREATE TABLE IF NOT EXISTS balances (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL REFERENCES users (id),
        currency TEXT NOT NULL,
        amount NUMERIC NOT NULL DEFAULT 0,
        UNIQUE (user_id, currency)
    )
    "#,
];

const EXPENSE_COLUMNS: &str =
    "id, description, currency, amount, created_by, split_type, created_at, is_settled";
const SPLIT_COLUMNS: &str = "id, expense_id, user_id, amount_owed, is_settled";

/// Postgres-backed ledger store.
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the ledger tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    type Tx = PostgresTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(PostgresTx { tx })
    }
}

/// Transaction over [`PostgresLedgerStore`]. Rolled back when dropped uncommitted.
pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

impl PostgresTx {
    async fn splits_of(&mut self, expense_ids: &[Uuid]) -> Result<Vec<ExpenseSplit>, StoreError> {
        if expense_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&format!(
            "SELECT {SPLIT_COLUMNS} FROM expense_splits WHERE expense_id = ANY($1) ORDER BY seq"
        ))
        .bind(expense_ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_splits", e))?;

        rows.iter().map(split_from_row).collect()
    }
}

#[async_trait]
impl LedgerTx for PostgresTx {
    async fn insert_user(&mut self, user: &User) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO users (id, name, email) VALUES ($1, $2, $3)")
            .bind(user.id.as_uuid())
            .bind(&user.name)
            .bind(&user.email)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_user", e))?;
        Ok(())
    }

    async fn find_user(&mut self, id: UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT id, name, email FROM users WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_user", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT id, name, email FROM users WHERE lower(email) = lower($1)")
            .bind(email)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_user_by_email", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn existing_users(&mut self, ids: &[UserId]) -> Result<Vec<UserId>, StoreError> {
        let uuids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let rows = sqlx::query("SELECT id FROM users WHERE id = ANY($1)")
            .bind(&uuids)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("existing_users", e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<Uuid, _>("id")
                    .map(UserId::from_uuid)
                    .map_err(|e| map_sqlx_error("existing_users", e))
            })
            .collect()
    }

    #[instrument(skip(self, expense), fields(expense_id = %expense.id), err)]
    async fn insert_expense(&mut self, expense: &Expense) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO expenses (
                id,
                description,
                currency,
                amount,
                created_by,
                split_type,
                created_at,
                is_settled
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(expense.id.as_uuid())
        .bind(&expense.description)
        .bind(expense.currency.as_str())
        .bind(expense.amount)
        .bind(expense.created_by.as_uuid())
        .bind(expense.policy.as_tag())
        .bind(expense.created_at)
        .bind(expense.settled)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_expense", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn load_expense(
        &mut self,
        id: ExpenseId,
        lock: bool,
    ) -> Result<Option<Expense>, StoreError> {
        let lock_clause = if lock { " FOR UPDATE" } else { "" };
        let row = sqlx::query(&format!(
            "SELECT {EXPENSE_COLUMNS} FROM expenses WHERE id = $1{lock_clause}"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_expense", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut expense = expense_from_row(&row)?;
        expense.splits = self.splits_of(&[*id.as_uuid()]).await?;
        Ok(Some(expense))
    }

    #[instrument(skip(self, expense), fields(expense_id = %expense.id), err)]
    async fn save_expense(&mut self, expense: &Expense) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE expenses
            SET description = $2,
                currency = $3,
                amount = $4,
                split_type = $5,
                is_settled = $6
            WHERE id = $1
            "#,
        )
        .bind(expense.id.as_uuid())
        .bind(&expense.description)
        .bind(expense.currency.as_str())
        .bind(expense.amount)
        .bind(expense.policy.as_tag())
        .bind(expense.settled)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("save_expense", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Backend(format!(
                "expense {} does not exist",
                expense.id
            )));
        }
        Ok(())
    }

    async fn insert_splits(&mut self, splits: &[ExpenseSplit]) -> Result<(), StoreError> {
        for split in splits {
            sqlx::query(
                r#"
                INSERT INTO expense_splits (id, expense_id, user_id, amount_owed, is_settled)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(split.id.as_uuid())
            .bind(split.expense_id.as_uuid())
            .bind(split.user_id.as_uuid())
            .bind(split.amount_owed)
            .bind(split.settled)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_split", e))?;
        }
        Ok(())
    }

    async fn delete_splits(&mut self, expense_id: ExpenseId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM expense_splits WHERE expense_id = $1")
            .bind(expense_id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_splits", e))?;
        Ok(())
    }

    async fn find_split(
        &mut self,
        expense_id: ExpenseId,
        user_id: UserId,
        lock: bool,
    ) -> Result<Option<ExpenseSplit>, StoreError> {
        let lock_clause = if lock { " FOR UPDATE" } else { "" };
        let row = sqlx::query(&format!(
            "SELECT {SPLIT_COLUMNS} FROM expense_splits WHERE expense_id = $1 AND user_id = $2{lock_clause}"
        ))
        .bind(expense_id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("find_split", e))?;

        row.as_ref().map(split_from_row).transpose()
    }

    async fn save_split(&mut self, split: &ExpenseSplit) -> Result<(), StoreError> {
        sqlx::query("UPDATE expense_splits SET amount_owed = $2, is_settled = $3 WHERE id = $1")
            .bind(split.id.as_uuid())
            .bind(split.amount_owed)
            .bind(split.settled)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("save_split", e))?;
        Ok(())
    }

    async fn count_unsettled(&mut self, expense_id: ExpenseId) -> Result<u64, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS unsettled FROM expense_splits WHERE expense_id = $1 AND NOT is_settled",
        )
        .bind(expense_id.as_uuid())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("count_unsettled", e))?;

        let unsettled: i64 = row
            .try_get("unsettled")
            .map_err(|e| map_sqlx_error("count_unsettled", e))?;
        Ok(unsettled.max(0) as u64)
    }

    #[instrument(skip(self), err)]
    async fn accumulate_balance(
        &mut self,
        user_id: UserId,
        currency: &Currency,
        delta: Decimal,
    ) -> Result<Balance, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO balances (id, user_id, currency, amount)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, currency)
            DO UPDATE SET amount = balances.amount + EXCLUDED.amount
            RETURNING id, user_id, currency, amount
            "#,
        )
        .bind(BalanceId::new().as_uuid())
        .bind(user_id.as_uuid())
        .bind(currency.as_str())
        .bind(delta)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("accumulate_balance", e))?;

        balance_from_row(&row)
    }

    async fn balances_for_user(&mut self, user_id: UserId) -> Result<Vec<Balance>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, user_id, currency, amount FROM balances WHERE user_id = $1 ORDER BY currency",
        )
        .bind(user_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("balances_for_user", e))?;

        rows.iter().map(balance_from_row).collect()
    }

    async fn expenses_for_user(&mut self, user_id: UserId) -> Result<Vec<Expense>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {EXPENSE_COLUMNS}
            FROM expenses e
            WHERE EXISTS (
                SELECT 1 FROM expense_splits s
                WHERE s.expense_id = e.id AND s.user_id = $1
            )
            ORDER BY e.seq
            "#
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("expenses_for_user", e))?;

        let mut expenses = rows
            .iter()
            .map(expense_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let ids: Vec<Uuid> = expenses.iter().map(|e| *e.id.as_uuid()).collect();
        let mut by_expense: HashMap<ExpenseId, Vec<ExpenseSplit>> = HashMap::new();
        for split in self.splits_of(&ids).await? {
            by_expense.entry(split.expense_id).or_default().push(split);
        }
        for expense in &mut expenses {
            expense.splits = by_expense.remove(&expense.id).unwrap_or_default();
        }
        Ok(expenses)
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

fn user_from_row(row: &PgRow) -> Result<User, StoreError> {
    Ok(User {
        id: UserId::from_uuid(get(row, "id")?),
        name: get(row, "name")?,
        email: get(row, "email")?,
    })
}

fn expense_from_row(row: &PgRow) -> Result<Expense, StoreError> {
    let currency: String = get(row, "currency")?;
    let split_type: String = get(row, "split_type")?;
    let created_at: DateTime<Utc> = get(row, "created_at")?;

    Ok(Expense {
        id: ExpenseId::from_uuid(get(row, "id")?),
        description: get(row, "description")?,
        currency: Currency::new(currency).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        amount: get(row, "amount")?,
        created_by: UserId::from_uuid(get(row, "created_by")?),
        policy: SplitPolicy::from_tag(&split_type)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        created_at,
        settled: get(row, "is_settled")?,
        splits: Vec::new(),
    })
}

fn split_from_row(row: &PgRow) -> Result<ExpenseSplit, StoreError> {
    Ok(ExpenseSplit {
        id: SplitId::from_uuid(get(row, "id")?),
        expense_id: ExpenseId::from_uuid(get(row, "expense_id")?),
        user_id: UserId::from_uuid(get(row, "user_id")?),
        amount_owed: get(row, "amount_owed")?,
        settled: get(row, "is_settled")?,
    })
}

fn balance_from_row(row: &PgRow) -> Result<Balance, StoreError> {
    let currency: String = get(row, "currency")?;
    Ok(Balance {
        id: BalanceId::from_uuid(get(row, "id")?),
        user_id: UserId::from_uuid(get(row, "user_id")?),
        currency: Currency::new(currency).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        amount: get(row, "amount")?,
    })
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Corrupt(format!("failed to read column {column}: {e}")))
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("40001") | Some("40P01") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Corrupt(format!("{operation}: {err}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

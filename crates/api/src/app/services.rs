//! Storage backend wiring for the HTTP layer.
//!
//! Handlers are not generic over the store; they receive an [`AppServices`]
//! which forwards to a [`LedgerService`] over whichever backend was selected
//! at startup.

use tracing::info;

use splitledger_core::{ExpenseId, UserId};
use splitledger_expenses::{Balance, Expense, ExpenseSplit, User};
use splitledger_infra::{
    CreateExpense, InMemoryLedgerStore, LedgerResult, LedgerService, PostgresLedgerStore,
    RegisterUser, StoreError, UpdateExpense,
};

use crate::config::ApiConfig;

#[derive(Debug, Clone)]
pub enum AppServices {
    InMemory(LedgerService<InMemoryLedgerStore>),
    Postgres(LedgerService<PostgresLedgerStore>),
}

macro_rules! forward {
    ($self:expr, $svc:ident => $call:expr) => {
        match $self {
            AppServices::InMemory($svc) => $call,
            AppServices::Postgres($svc) => $call,
        }
    };
}

impl AppServices {
    pub fn in_memory() -> Self {
        AppServices::InMemory(LedgerService::new(InMemoryLedgerStore::new()))
    }

    /// Postgres when `DATABASE_URL` is configured, in-memory otherwise.
    pub async fn from_config(config: &ApiConfig) -> Result<Self, StoreError> {
        match &config.database_url {
            Some(url) => {
                let store =
                    PostgresLedgerStore::connect(url, config.database_max_connections).await?;
                store.ensure_schema().await?;
                info!(max_connections = config.database_max_connections, "using postgres ledger store");
                Ok(AppServices::Postgres(LedgerService::new(store)))
            }
            None => {
                info!("DATABASE_URL not set; using in-memory ledger store");
                Ok(Self::in_memory())
            }
        }
    }

    pub fn backend(&self) -> &'static str {
        match self {
            AppServices::InMemory(_) => "in-memory",
            AppServices::Postgres(_) => "postgres",
        }
    }

    pub async fn register_user(&self, cmd: RegisterUser) -> LedgerResult<User> {
        forward!(self, s => s.register_user(cmd).await)
    }

    pub async fn get_user(&self, user_id: UserId) -> LedgerResult<User> {
        forward!(self, s => s.get_user(user_id).await)
    }

    pub async fn create_expense(&self, cmd: CreateExpense) -> LedgerResult<Expense> {
        forward!(self, s => s.create_expense(cmd).await)
    }

    pub async fn update_expense(&self, cmd: UpdateExpense) -> LedgerResult<Expense> {
        forward!(self, s => s.update_expense(cmd).await)
    }

    pub async fn settle_expense(
        &self,
        expense_id: ExpenseId,
        participant: UserId,
    ) -> LedgerResult<ExpenseSplit> {
        forward!(self, s => s.settle_expense(expense_id, participant).await)
    }

    pub async fn user_balances(&self, user_id: UserId) -> LedgerResult<Vec<Balance>> {
        forward!(self, s => s.user_balances(user_id).await)
    }

    pub async fn user_expenses(&self, user_id: UserId) -> LedgerResult<Vec<Expense>> {
        forward!(self, s => s.user_expenses(user_id).await)
    }
}

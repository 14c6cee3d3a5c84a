use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use splitledger_core::{DomainError, ExpenseId, UserId};
use splitledger_expenses::{Currency, Expense, ParticipantShare, SplitPolicy};
use splitledger_infra::{
    CreateExpense, InMemoryLedgerStore, LedgerEngine, LedgerError, LedgerService, LedgerStore,
    LedgerTx, RegisterUser, UpdateExpense,
};

type Service = LedgerService<InMemoryLedgerStore>;

fn usd() -> Currency {
    Currency::new("USD").unwrap()
}

async fn register(service: &Service, name: &str) -> UserId {
    service
        .register_user(RegisterUser {
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
        })
        .await
        .unwrap()
        .id
}

async fn trio(service: &Service) -> (UserId, UserId, UserId) {
    (
        register(service, "Alice").await,
        register(service, "Bob").await,
        register(service, "Carol").await,
    )
}

fn equal_shares(users: &[UserId]) -> Vec<ParticipantShare> {
    users.iter().copied().map(ParticipantShare::new).collect()
}

fn create_cmd(
    created_by: UserId,
    amount: Decimal,
    policy: SplitPolicy,
    shares: Vec<ParticipantShare>,
) -> CreateExpense {
    CreateExpense {
        created_by,
        description: "dinner".to_string(),
        currency: usd(),
        amount,
        policy,
        shares,
        occurred_at: Utc::now(),
    }
}

fn update_cmd(expense: &Expense, requested_by: UserId, amount: Decimal, shares: Vec<ParticipantShare>) -> UpdateExpense {
    UpdateExpense {
        expense_id: expense.id,
        requested_by,
        description: expense.description.clone(),
        currency: expense.currency.clone(),
        amount,
        policy: expense.policy,
        shares,
    }
}

async fn balance(service: &Service, user: UserId, currency: &Currency) -> Decimal {
    service
        .user_balances(user)
        .await
        .unwrap()
        .into_iter()
        .find(|b| &b.currency == currency)
        .map(|b| b.amount)
        .unwrap_or(Decimal::ZERO)
}

async fn total_in(service: &Service, users: &[UserId], currency: &Currency) -> Decimal {
    let mut total = Decimal::ZERO;
    for user in users {
        total += balance(service, *user, currency).await;
    }
    total
}

fn domain(err: LedgerError) -> DomainError {
    match err {
        LedgerError::Domain(e) => e,
        other => panic!("expected domain error, got {other:?}"),
    }
}

#[tokio::test]
async fn equal_split_posts_creator_credit_and_participant_debits() {
    let service = Service::new(InMemoryLedgerStore::new());
    let (a, b, c) = trio(&service).await;

    let expense = service
        .create_expense(create_cmd(a, dec!(90), SplitPolicy::Equal, equal_shares(&[a, b, c])))
        .await
        .unwrap();

    assert_eq!(expense.splits.len(), 3);
    assert!(expense.splits.iter().all(|s| s.amount_owed == dec!(30) && !s.settled));
    assert!(!expense.settled);

    assert_eq!(balance(&service, a, &usd()).await, dec!(60));
    assert_eq!(balance(&service, b, &usd()).await, dec!(-30));
    assert_eq!(balance(&service, c, &usd()).await, dec!(-30));
}

#[tokio::test]
async fn percentage_split_allocates_by_share() {
    let service = Service::new(InMemoryLedgerStore::new());
    let (a, b, c) = trio(&service).await;
    let shares = vec![
        ParticipantShare::with_hint(a, dec!(50)),
        ParticipantShare::with_hint(b, dec!(30)),
        ParticipantShare::with_hint(c, dec!(20)),
    ];

    let expense = service
        .create_expense(create_cmd(a, dec!(200), SplitPolicy::Percentage, shares))
        .await
        .unwrap();

    assert_eq!(expense.split_for(a).unwrap().amount_owed, dec!(100));
    assert_eq!(expense.split_for(b).unwrap().amount_owed, dec!(60));
    assert_eq!(expense.split_for(c).unwrap().amount_owed, dec!(40));

    assert_eq!(balance(&service, a, &usd()).await, dec!(100));
    assert_eq!(balance(&service, b, &usd()).await, dec!(-60));
    assert_eq!(balance(&service, c, &usd()).await, dec!(-40));
}

#[tokio::test]
async fn percentages_not_summing_to_hundred_are_rejected_without_side_effects() {
    let service = Service::new(InMemoryLedgerStore::new());
    let (a, b, c) = trio(&service).await;
    let shares = vec![
        ParticipantShare::with_hint(a, dec!(50)),
        ParticipantShare::with_hint(b, dec!(30)),
        ParticipantShare::with_hint(c, dec!(19)),
    ];

    let err = service
        .create_expense(create_cmd(a, dec!(200), SplitPolicy::Percentage, shares))
        .await
        .unwrap_err();

    assert!(matches!(domain(err), DomainError::PolicyViolation(_)));
    assert!(service.user_balances(a).await.unwrap().is_empty());
    assert!(service.user_expenses(a).await.unwrap().is_empty());
}

#[tokio::test]
async fn settling_one_split_credits_only_that_participant() {
    let service = Service::new(InMemoryLedgerStore::new());
    let (a, b, c) = trio(&service).await;
    let expense = service
        .create_expense(create_cmd(a, dec!(90), SplitPolicy::Equal, equal_shares(&[a, b, c])))
        .await
        .unwrap();

    let split = service.settle_expense(expense.id, b).await.unwrap();

    assert!(split.settled);
    assert_eq!(split.amount_owed, dec!(30));
    assert_eq!(balance(&service, b, &usd()).await, dec!(0));
    assert_eq!(balance(&service, a, &usd()).await, dec!(60));
    assert_eq!(balance(&service, c, &usd()).await, dec!(-30));

    let reloaded = service.user_expenses(a).await.unwrap();
    assert!(!reloaded[0].settled);
}

#[tokio::test]
async fn updating_reverses_old_postings_before_applying_new_ones() {
    let service = Service::new(InMemoryLedgerStore::new());
    let (a, b, c) = trio(&service).await;
    let expense = service
        .create_expense(create_cmd(a, dec!(90), SplitPolicy::Equal, equal_shares(&[a, b, c])))
        .await
        .unwrap();

    let updated = service
        .update_expense(update_cmd(&expense, a, dec!(120), equal_shares(&[a, b, c])))
        .await
        .unwrap();

    assert_eq!(updated.id, expense.id);
    assert_eq!(updated.amount, dec!(120));
    assert!(updated.splits.iter().all(|s| s.amount_owed == dec!(40)));

    assert_eq!(balance(&service, a, &usd()).await, dec!(80));
    assert_eq!(balance(&service, b, &usd()).await, dec!(-40));
    assert_eq!(balance(&service, c, &usd()).await, dec!(-40));

    // Old splits are replaced, not accumulated.
    let listed = service.user_expenses(b).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].splits.len(), 3);
}

#[tokio::test]
async fn update_with_identical_values_leaves_balances_unchanged() {
    let service = Service::new(InMemoryLedgerStore::new());
    let (a, b, c) = trio(&service).await;
    let expense = service
        .create_expense(create_cmd(a, dec!(100), SplitPolicy::Equal, equal_shares(&[a, b, c])))
        .await
        .unwrap();
    let before = [
        balance(&service, a, &usd()).await,
        balance(&service, b, &usd()).await,
        balance(&service, c, &usd()).await,
    ];

    service
        .update_expense(update_cmd(&expense, a, dec!(100), equal_shares(&[a, b, c])))
        .await
        .unwrap();

    let after = [
        balance(&service, a, &usd()).await,
        balance(&service, b, &usd()).await,
        balance(&service, c, &usd()).await,
    ];
    assert_eq!(before, after);
}

#[tokio::test]
async fn update_can_move_an_expense_to_another_currency() {
    let service = Service::new(InMemoryLedgerStore::new());
    let (a, b, _) = trio(&service).await;
    let eur = Currency::new("EUR").unwrap();
    let expense = service
        .create_expense(create_cmd(a, dec!(50), SplitPolicy::Equal, equal_shares(&[a, b])))
        .await
        .unwrap();

    let mut cmd = update_cmd(&expense, a, dec!(80), equal_shares(&[a, b]));
    cmd.currency = eur.clone();
    service.update_expense(cmd).await.unwrap();

    assert_eq!(balance(&service, a, &usd()).await, dec!(0));
    assert_eq!(balance(&service, b, &usd()).await, dec!(0));
    assert_eq!(balance(&service, a, &eur).await, dec!(40));
    assert_eq!(balance(&service, b, &eur).await, dec!(-40));
}

#[tokio::test]
async fn update_by_someone_other_than_the_creator_is_not_found() {
    let service = Service::new(InMemoryLedgerStore::new());
    let (a, b, c) = trio(&service).await;
    let expense = service
        .create_expense(create_cmd(a, dec!(90), SplitPolicy::Equal, equal_shares(&[a, b, c])))
        .await
        .unwrap();

    let err = service
        .update_expense(update_cmd(&expense, b, dec!(10), equal_shares(&[a, b])))
        .await
        .unwrap_err();
    assert!(matches!(domain(err), DomainError::NotFound(_)));

    let err = service
        .update_expense(UpdateExpense {
            expense_id: ExpenseId::new(),
            ..update_cmd(&expense, a, dec!(10), equal_shares(&[a, b]))
        })
        .await
        .unwrap_err();
    assert!(matches!(domain(err), DomainError::NotFound(_)));

    assert_eq!(balance(&service, a, &usd()).await, dec!(60));
}

#[tokio::test]
async fn failed_update_rolls_back_the_reversal() {
    let service = Service::new(InMemoryLedgerStore::new());
    let (a, b, c) = trio(&service).await;
    let expense = service
        .create_expense(create_cmd(a, dec!(90), SplitPolicy::Equal, equal_shares(&[a, b, c])))
        .await
        .unwrap();

    let mut cmd = update_cmd(&expense, a, dec!(90), vec![
        ParticipantShare::with_hint(a, dec!(10)),
        ParticipantShare::with_hint(b, dec!(10)),
    ]);
    cmd.policy = SplitPolicy::Unequal;
    let err = service.update_expense(cmd).await.unwrap_err();
    assert!(matches!(domain(err), DomainError::PolicyViolation(_)));

    assert_eq!(balance(&service, a, &usd()).await, dec!(60));
    assert_eq!(balance(&service, b, &usd()).await, dec!(-30));
    let stored = &service.user_expenses(c).await.unwrap()[0];
    assert_eq!(stored.amount, dec!(90));
    assert_eq!(stored.splits.len(), 3);
}

#[tokio::test]
async fn unknown_participant_is_not_found() {
    let service = Service::new(InMemoryLedgerStore::new());
    let (a, b, _) = trio(&service).await;
    let stranger = UserId::new();

    let err = service
        .create_expense(create_cmd(a, dec!(30), SplitPolicy::Equal, equal_shares(&[a, b, stranger])))
        .await
        .unwrap_err();

    assert!(matches!(domain(err), DomainError::NotFound(_)));
    assert!(service.user_balances(a).await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_creator_is_not_found() {
    let service = Service::new(InMemoryLedgerStore::new());
    let (a, b, _) = trio(&service).await;

    let err = service
        .create_expense(create_cmd(UserId::new(), dec!(30), SplitPolicy::Equal, equal_shares(&[a, b])))
        .await
        .unwrap_err();

    assert!(matches!(domain(err), DomainError::NotFound(_)));
}

#[tokio::test]
async fn creator_must_be_a_participant() {
    let service = Service::new(InMemoryLedgerStore::new());
    let (a, b, c) = trio(&service).await;

    let err = service
        .create_expense(create_cmd(a, dec!(50), SplitPolicy::Equal, equal_shares(&[b, c])))
        .await
        .unwrap_err();
    assert!(matches!(domain(err), DomainError::PolicyViolation(_)));
    assert!(service.user_balances(b).await.unwrap().is_empty());

    let expense = service
        .create_expense(create_cmd(a, dec!(90), SplitPolicy::Equal, equal_shares(&[a, b, c])))
        .await
        .unwrap();
    let err = service
        .update_expense(update_cmd(&expense, a, dec!(50), equal_shares(&[b, c])))
        .await
        .unwrap_err();
    assert!(matches!(domain(err), DomainError::PolicyViolation(_)));
    assert_eq!(balance(&service, a, &usd()).await, dec!(60));
    assert_eq!(balance(&service, b, &usd()).await, dec!(-30));
}

#[tokio::test]
async fn amounts_whose_shares_overflow_are_rejected() {
    let service = Service::new(InMemoryLedgerStore::new());
    let (a, b, _) = trio(&service).await;

    // Each half rounds up, so the shares add up past Decimal::MAX.
    let err = service
        .create_expense(create_cmd(a, Decimal::MAX, SplitPolicy::Equal, equal_shares(&[a, b])))
        .await
        .unwrap_err();

    assert!(matches!(domain(err), DomainError::PolicyViolation(_)));
    assert!(service.user_expenses(a).await.unwrap().is_empty());
    assert!(service.user_balances(a).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_update_and_settle_both_commit() {
    let service = Service::new(InMemoryLedgerStore::new());
    let (a, b, c) = trio(&service).await;
    let expense = service
        .create_expense(create_cmd(a, dec!(90), SplitPolicy::Equal, equal_shares(&[a, b, c])))
        .await
        .unwrap();

    let updater = service.clone();
    let update = update_cmd(&expense, a, dec!(120), equal_shares(&[a, b, c]));
    let settler = service.clone();
    let (updated, settled) = tokio::join!(
        tokio::spawn(async move { updater.update_expense(update).await }),
        tokio::spawn(async move { settler.settle_expense(expense.id, b).await }),
    );

    updated.unwrap().unwrap();
    settled.unwrap().unwrap();
    assert_eq!(balance(&service, a, &usd()).await, dec!(80));
    assert_eq!(balance(&service, c, &usd()).await, dec!(-40));
}

#[tokio::test]
async fn settling_twice_fails_and_last_settlement_closes_the_expense() {
    let service = Service::new(InMemoryLedgerStore::new());
    let (a, b, _) = trio(&service).await;
    let expense = service
        .create_expense(create_cmd(a, dec!(20), SplitPolicy::Equal, equal_shares(&[a, b])))
        .await
        .unwrap();

    service.settle_expense(expense.id, b).await.unwrap();
    let err = service.settle_expense(expense.id, b).await.unwrap_err();
    assert_eq!(domain(err), DomainError::AlreadySettled);
    assert!(!service.user_expenses(a).await.unwrap()[0].settled);

    service.settle_expense(expense.id, a).await.unwrap();
    let closed = &service.user_expenses(a).await.unwrap()[0];
    assert!(closed.settled);
    assert!(closed.all_settled());
}

#[tokio::test]
async fn settling_without_a_split_is_not_found() {
    let service = Service::new(InMemoryLedgerStore::new());
    let (a, b, c) = trio(&service).await;
    let expense = service
        .create_expense(create_cmd(a, dec!(20), SplitPolicy::Equal, equal_shares(&[a, b])))
        .await
        .unwrap();

    let err = service.settle_expense(expense.id, c).await.unwrap_err();
    assert!(matches!(domain(err), DomainError::NotFound(_)));
    let err = service.settle_expense(ExpenseId::new(), b).await.unwrap_err();
    assert!(matches!(domain(err), DomainError::NotFound(_)));
}

#[tokio::test]
async fn update_reopens_a_settled_expense() {
    let service = Service::new(InMemoryLedgerStore::new());
    let (a, b, _) = trio(&service).await;
    let expense = service
        .create_expense(create_cmd(a, dec!(20), SplitPolicy::Equal, equal_shares(&[a, b])))
        .await
        .unwrap();
    service.settle_expense(expense.id, a).await.unwrap();
    service.settle_expense(expense.id, b).await.unwrap();

    let updated = service
        .update_expense(update_cmd(&expense, a, dec!(20), equal_shares(&[a, b])))
        .await
        .unwrap();

    assert!(!updated.settled);
    assert!(updated.splits.iter().all(|s| !s.settled));
}

#[tokio::test]
async fn duplicate_email_is_a_conflict() {
    let service = Service::new(InMemoryLedgerStore::new());
    register(&service, "Alice").await;

    let err = service
        .register_user(RegisterUser {
            name: "Other Alice".to_string(),
            email: "ALICE@example.com".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(domain(err), DomainError::Conflict(_)));

    let err = service
        .register_user(RegisterUser {
            name: "  ".to_string(),
            email: "blank@example.com".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(domain(err), DomainError::Validation(_)));
}

#[tokio::test]
async fn rolled_back_transaction_discards_engine_writes() {
    let store = InMemoryLedgerStore::new();
    let service = LedgerService::new(store.clone());
    let (a, b, _) = trio(&service).await;

    {
        let mut tx = store.begin().await.unwrap();
        LedgerEngine::create_expense(
            &mut tx,
            create_cmd(a, dec!(40), SplitPolicy::Equal, equal_shares(&[a, b])),
        )
        .await
        .unwrap();
        assert_eq!(tx.balances_for_user(b).await.unwrap()[0].amount, dec!(-20));
        tx.rollback().await.unwrap();
    }

    assert!(service.user_balances(b).await.unwrap().is_empty());
    assert!(service.user_expenses(b).await.unwrap().is_empty());
}

#[derive(Debug, Clone)]
enum Op {
    Create { creator: usize, members: Vec<usize>, cents: i64, policy: u8, eur: bool },
    Update { expense: usize, members: Vec<usize>, cents: i64, policy: u8, eur: bool },
}

const PARTICIPANTS: usize = 4;

fn members_strategy() -> impl Strategy<Value = Vec<usize>> {
    proptest::sample::subsequence((0..PARTICIPANTS).collect::<Vec<_>>(), 1..=PARTICIPANTS)
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..PARTICIPANTS, members_strategy(), 1i64..1_000_000, 0u8..3, any::<bool>()).prop_map(
            |(creator, members, cents, policy, eur)| Op::Create { creator, members, cents, policy, eur }
        ),
        (0usize..8, members_strategy(), 1i64..1_000_000, 0u8..3, any::<bool>()).prop_map(
            |(expense, members, cents, policy, eur)| Op::Update { expense, members, cents, policy, eur }
        ),
    ]
}

/// Shares for `members` that satisfy `policy` for `amount`.
fn shares_for(policy: SplitPolicy, amount: Decimal, members: &[UserId]) -> Vec<ParticipantShare> {
    let n = Decimal::from(members.len());
    match policy {
        SplitPolicy::Equal => equal_shares(members),
        SplitPolicy::Percentage => {
            let each = (Decimal::ONE_HUNDRED / n).round_dp(2);
            let first = Decimal::ONE_HUNDRED - each * (n - Decimal::ONE);
            members
                .iter()
                .enumerate()
                .map(|(i, id)| ParticipantShare::with_hint(*id, if i == 0 { first } else { each }))
                .collect()
        }
        SplitPolicy::Unequal => {
            let each = (amount / n).round_dp(2);
            let first = amount - each * (n - Decimal::ONE);
            members
                .iter()
                .enumerate()
                .map(|(i, id)| ParticipantShare::with_hint(*id, if i == 0 { first } else { each }))
                .collect()
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn create_and_update_keep_every_currency_near_zero_sum(ops in proptest::collection::vec(op_strategy(), 1..12)) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let service = Service::new(InMemoryLedgerStore::new());
            let mut users = Vec::new();
            for i in 0..PARTICIPANTS {
                users.push(register(&service, &format!("user{i}")).await);
            }
            let currencies = [usd(), Currency::new("EUR").unwrap()];
            let mut expenses: Vec<Expense> = Vec::new();

            for op in ops {
                let (members, cents, policy, eur) = match &op {
                    Op::Create { members, cents, policy, eur, .. }
                    | Op::Update { members, cents, policy, eur, .. } => (members, *cents, *policy, *eur),
                };
                let policy = SplitPolicy::ALL[policy as usize];
                let amount = Decimal::new(cents, 2);
                let mut member_ids: Vec<UserId> = members.iter().map(|i| users[*i]).collect();
                let currency = currencies[usize::from(eur)].clone();

                match op {
                    Op::Create { creator, .. } => {
                        if !member_ids.contains(&users[creator]) {
                            member_ids.push(users[creator]);
                        }
                        let shares = shares_for(policy, amount, &member_ids);
                        let mut cmd = create_cmd(users[creator], amount, policy, shares);
                        cmd.currency = currency;
                        let expense = service.create_expense(cmd).await.unwrap();
                        expenses.push(expense);
                    }
                    Op::Update { expense, .. } if !expenses.is_empty() => {
                        let idx = expense % expenses.len();
                        let current = expenses[idx].clone();
                        if !member_ids.contains(&current.created_by) {
                            member_ids.push(current.created_by);
                        }
                        let shares = shares_for(policy, amount, &member_ids);
                        let mut cmd = update_cmd(&current, current.created_by, amount, shares);
                        cmd.policy = policy;
                        cmd.currency = currency;
                        expenses[idx] = service.update_expense(cmd).await.unwrap();
                    }
                    Op::Update { .. } => {}
                }

                // Equal splits keep the exact quotient, so the sum may differ from zero by
                // at most the split tolerance per live expense.
                let slack = Decimal::new(1, 2) * Decimal::from(expenses.len().max(1));
                for currency in &currencies {
                    let total = total_in(&service, &users, currency).await;
                    assert!(total.abs() <= slack, "{currency} drifted to {total}");
                }
            }
        });
    }
}

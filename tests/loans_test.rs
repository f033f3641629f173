mod common;

use anyhow::Result;
use bankbook::application::{LedgerConfig, LedgerError, NotificationKind, RequestContext};
use bankbook::domain::{LoanStatus, TransactionType};
use common::{open_funded, test_service, test_service_with};

#[tokio::test]
async fn test_loan_request_leaves_balance_untouched() -> Result<()> {
    let (service, notifier, _temp) = test_service_with(LedgerConfig::default()).await?;
    let (account, ctx) = open_funded(&service, "Ada", 120000).await?;

    let posting = service.request_loan(&ctx, 500000).await?;
    let loan = posting.transaction;

    assert_eq!(loan.transaction_type, TransactionType::Loan);
    assert_eq!(loan.amount, 500000);
    assert_eq!(loan.balance_after_transaction, 120000);
    assert!(!loan.loan_approve);
    assert_eq!(loan.loan_status, Some(LoanStatus::Requested));
    assert_eq!(service.get_account(account.id).await?.balance, 120000);

    let loans = service.list_loans(&ctx).await?;
    assert_eq!(loans.len(), 1);
    assert_eq!(loans[0].id, loan.id);

    assert_eq!(
        notifier.kinds_for(&account.account_number),
        vec![NotificationKind::Deposit, NotificationKind::LoanRequest]
    );

    Ok(())
}

#[tokio::test]
async fn test_approval_disburses_the_loan() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (account, ctx) = open_funded(&service, "Ada", 100000).await?;

    let loan = service.request_loan(&ctx, 500000).await?.transaction;
    let approved = service.approve_loan(loan.id).await?;

    assert_eq!(approved.account.balance, 600000);
    assert!(approved.transaction.loan_approve);
    assert_eq!(approved.transaction.loan_status, Some(LoanStatus::Approved));
    assert_eq!(approved.transaction.balance_after_transaction, 600000);
    assert_eq!(approved.transaction.transaction_type, TransactionType::Loan);

    let stored = service.get_transaction(loan.id).await?;
    assert_eq!(stored, approved.transaction);
    assert_eq!(service.get_account(account.id).await?.balance, 600000);

    Ok(())
}

#[tokio::test]
async fn test_fourth_loan_is_refused() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (_account, ctx) = open_funded(&service, "Ada", 0).await?;

    for _ in 0..3 {
        let loan = service.request_loan(&ctx, 10000).await?.transaction;
        service.approve_loan(loan.id).await?;
    }

    let result = service.request_loan(&ctx, 10000).await;
    match result {
        Err(LedgerError::LoanLimitExceeded { limit, active }) => {
            assert_eq!(limit, 3);
            assert_eq!(active, 3);
        }
        other => panic!("expected LoanLimitExceeded, got {:?}", other),
    }

    let loans = service.list_loans(&ctx).await?;
    assert_eq!(loans.len(), 3, "refused request must not be recorded");
    assert!(loans.iter().all(|loan| loan.loan_approve));

    Ok(())
}

#[tokio::test]
async fn test_pending_requests_do_not_count_toward_limit() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (_account, ctx) = open_funded(&service, "Ada", 0).await?;

    let mut pending = Vec::new();
    for _ in 0..4 {
        pending.push(service.request_loan(&ctx, 10000).await?.transaction);
    }
    assert_eq!(service.list_loans(&ctx).await?.len(), 4);

    // Approving past the limit is refused as well
    for loan in &pending[..3] {
        service.approve_loan(loan.id).await?;
    }
    assert!(matches!(
        service.approve_loan(pending[3].id).await,
        Err(LedgerError::LoanLimitExceeded { .. })
    ));
    let last = service.get_transaction(pending[3].id).await?;
    assert_eq!(last.loan_status, Some(LoanStatus::Requested));

    Ok(())
}

#[tokio::test]
async fn test_payoff_fails_when_balance_is_short() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (account, ctx) = open_funded(&service, "Ada", 0).await?;

    let loan = service.request_loan(&ctx, 5000).await?.transaction;
    service.approve_loan(loan.id).await?;
    service.withdraw(&ctx, 2000).await?;
    assert_eq!(service.get_account(account.id).await?.balance, 3000);

    let result = service.pay_loan(&ctx, loan.id).await;
    match result {
        Err(LedgerError::InsufficientFunds {
            balance, required, ..
        }) => {
            assert_eq!(balance, 3000);
            assert_eq!(required, 5000);
        }
        other => panic!("expected InsufficientFunds, got {:?}", other),
    }

    let stored = service.get_transaction(loan.id).await?;
    assert_eq!(stored.transaction_type, TransactionType::Loan);
    assert_eq!(stored.loan_status, Some(LoanStatus::Approved));
    assert!(stored.loan_approve);
    assert_eq!(service.get_account(account.id).await?.balance, 3000);

    Ok(())
}

#[tokio::test]
async fn test_payoff_requires_strictly_more_than_the_loan() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (_account, ctx) = open_funded(&service, "Ada", 0).await?;

    let loan = service.request_loan(&ctx, 5000).await?.transaction;
    service.approve_loan(loan.id).await?;

    // Balance is exactly 5000, the disbursed loan
    assert!(matches!(
        service.pay_loan(&ctx, loan.id).await,
        Err(LedgerError::InsufficientFunds { .. })
    ));

    Ok(())
}

#[tokio::test]
async fn test_payoff_settles_the_loan() -> Result<()> {
    let (service, notifier, _temp) = test_service_with(LedgerConfig::default()).await?;
    let (account, ctx) = open_funded(&service, "Ada", 1000).await?;

    let loan = service.request_loan(&ctx, 5000).await?.transaction;
    service.approve_loan(loan.id).await?;
    assert_eq!(service.get_account(account.id).await?.balance, 6000);

    let paid = service.pay_loan(&ctx, loan.id).await?;
    assert_eq!(paid.account.balance, 1000);
    assert_eq!(paid.transaction.transaction_type, TransactionType::LoanPaid);
    assert_eq!(paid.transaction.loan_status, Some(LoanStatus::Paid));
    assert_eq!(paid.transaction.balance_after_transaction, 1000);
    assert_eq!(service.get_account(account.id).await?.balance, 1000);

    // Paid loans drop out of the loan list and free a slot
    assert!(service.list_loans(&ctx).await?.is_empty());
    assert!(
        notifier
            .kinds_for(&account.account_number)
            .contains(&NotificationKind::LoanPaid)
    );

    // Paying twice is an invalid transition
    assert!(matches!(
        service.pay_loan(&ctx, loan.id).await,
        Err(LedgerError::InvalidLoanTransition {
            from: LoanStatus::Paid,
            to: LoanStatus::Paid,
            ..
        })
    ));

    let integrity = service.check_integrity().await?;
    assert!(integrity.is_ok(), "{:?}", integrity);

    Ok(())
}

#[tokio::test]
async fn test_paying_a_loan_frees_a_slot() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (account, ctx) = open_funded(&service, "Ada", 100000).await?;

    let mut loans = Vec::new();
    for _ in 0..3 {
        let loan = service.request_loan(&ctx, 10000).await?.transaction;
        service.approve_loan(loan.id).await?;
        loans.push(loan);
    }
    assert!(matches!(
        service.request_loan(&ctx, 10000).await,
        Err(LedgerError::LoanLimitExceeded { .. })
    ));

    service.pay_loan(&ctx, loans[0].id).await?;
    assert_eq!(service.get_account(account.id).await?.balance, 120000);

    let fourth = service.request_loan(&ctx, 10000).await?.transaction;
    let approved = service.approve_loan(fourth.id).await?;
    assert_eq!(approved.account.balance, 130000);
    assert_eq!(service.list_loans(&ctx).await?.len(), 3);

    Ok(())
}

#[tokio::test]
async fn test_loan_limit_is_configurable() -> Result<()> {
    let config = LedgerConfig::default().with_loan_limit(1);
    let (service, _notifier, _temp) = test_service_with(config).await?;
    let (_account, ctx) = open_funded(&service, "Ada", 0).await?;

    let loan = service.request_loan(&ctx, 10000).await?.transaction;
    service.approve_loan(loan.id).await?;

    match service.request_loan(&ctx, 10000).await {
        Err(LedgerError::LoanLimitExceeded { limit, active }) => {
            assert_eq!(limit, 1);
            assert_eq!(active, 1);
        }
        other => panic!("expected LoanLimitExceeded, got {:?}", other),
    }

    Ok(())
}

#[tokio::test]
async fn test_payoff_of_unapproved_loan_is_refused() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (account, ctx) = open_funded(&service, "Ada", 100000).await?;

    let loan = service.request_loan(&ctx, 5000).await?.transaction;
    assert!(matches!(
        service.pay_loan(&ctx, loan.id).await,
        Err(LedgerError::InvalidLoanTransition {
            from: LoanStatus::Requested,
            to: LoanStatus::Paid,
            ..
        })
    ));
    assert_eq!(service.get_account(account.id).await?.balance, 100000);

    Ok(())
}

#[tokio::test]
async fn test_loan_lookup_errors() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (_ada, ada_ctx) = open_funded(&service, "Ada", 100000).await?;
    let (_grace, grace_ctx) = open_funded(&service, "Grace", 100000).await?;

    assert!(matches!(
        service.pay_loan(&ada_ctx, 9999).await,
        Err(LedgerError::NotFound(9999))
    ));
    assert!(matches!(
        service.approve_loan(9999).await,
        Err(LedgerError::NotFound(9999))
    ));

    // A deposit is not a loan
    let deposit = service.deposit(&ada_ctx, 100).await?.transaction;
    assert!(matches!(
        service.approve_loan(deposit.id).await,
        Err(LedgerError::NotALoan(_))
    ));

    // Someone else's loan is invisible to the caller
    let loan = service.request_loan(&ada_ctx, 5000).await?.transaction;
    service.approve_loan(loan.id).await?;
    assert!(matches!(
        service.pay_loan(&grace_ctx, loan.id).await,
        Err(LedgerError::NotFound(_))
    ));

    Ok(())
}

#[tokio::test]
async fn test_rejected_loan_is_final() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (account, ctx) = open_funded(&service, "Ada", 0).await?;

    let loan = service.request_loan(&ctx, 5000).await?.transaction;
    let rejected = service.reject_loan(loan.id).await?;
    assert_eq!(rejected.transaction.loan_status, Some(LoanStatus::Rejected));
    assert!(!rejected.transaction.loan_approve);

    assert!(matches!(
        service.approve_loan(loan.id).await,
        Err(LedgerError::InvalidLoanTransition { .. })
    ));
    assert_eq!(service.get_account(account.id).await?.balance, 0);

    // Rejected loans still show in the list
    let loans = service.list_loans(&RequestContext::now(account.id)).await?;
    assert_eq!(loans.len(), 1);
    assert_eq!(loans[0].loan_state(), Some(LoanStatus::Rejected));

    Ok(())
}

use crate::bdd::{date, TestContext};
use chrono::{TimeZone, Utc};
use fieldbill_billing::domain::{
    Invoice, InvoiceStatus, LedgerOperations, LineItem, LineKind, PaymentEvent, PaymentMethod,
};
use fieldbill_billing::BillingError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

async fn invoice_for(context: &TestContext, amount: Decimal) -> Invoice {
    let line = LineItem::new(LineKind::Service, "Equipment repair", dec!(1), amount).unwrap();
    context
        .issue_invoice(vec![line], dec!(0), dec!(0), date(2024, 3, 1))
        .await
}

fn payment(amount: Decimal) -> PaymentEvent {
    PaymentEvent::completed(
        amount,
        PaymentMethod::BankTransfer,
        Utc.with_ymd_and_hms(2024, 3, 10, 9, 30, 0).unwrap(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_partial_then_full_payment() {
    let context = TestContext::new();
    let invoice = invoice_for(&context, dec!(500)).await;

    let after_first = context
        .ledger
        .apply_payment_with_retry(&invoice.id, &payment(dec!(200)))
        .await
        .unwrap();
    assert_eq!(after_first.balance_due, dec!(300));
    assert_eq!(after_first.status, InvoiceStatus::PartiallyPaid);

    let after_second = context
        .ledger
        .apply_payment_with_retry(&invoice.id, &payment(dec!(300)))
        .await
        .unwrap();
    assert_eq!(after_second.balance_due, dec!(0));
    assert_eq!(after_second.status, InvoiceStatus::Paid);
    assert!(after_second.paid_date.is_some());
    assert!(!after_second.is_overdue(date(2025, 1, 1)));
}

#[tokio::test]
async fn test_stale_version_must_be_reread() {
    let context = TestContext::new();
    let invoice = invoice_for(&context, dec!(500)).await;

    context
        .ledger
        .apply_payment(&invoice.id, &payment(dec!(100)), invoice.version)
        .await
        .unwrap();

    let err = context
        .ledger
        .apply_payment(&invoice.id, &payment(dec!(100)), invoice.version)
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::StaleInvoiceState { .. }));
    assert!(err.is_retryable());

    let current = context.invoice(&invoice).await;
    assert_eq!(current.amount_paid, dec!(100));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_payments_are_all_applied_once() {
    let context = TestContext::new();
    let invoice = invoice_for(&context, dec!(500)).await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let ledger = context.ledger.clone();
        let invoice_id = invoice.id;
        handles.push(tokio::spawn(async move {
            ledger
                .apply_payment_with_retry(&invoice_id, &payment(dec!(50)))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let settled = context.invoice(&invoice).await;
    assert_eq!(settled.amount_paid, dec!(500));
    assert_eq!(settled.balance_due, dec!(0));
    assert_eq!(settled.status, InvoiceStatus::Paid);
    assert_eq!(settled.applied_payments.len(), 10);
    assert_eq!(settled.version, invoice.version + 10);
    assert_eq!(context.repository.len().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_redelivered_event_is_applied_once() {
    let context = TestContext::new();
    let invoice = invoice_for(&context, dec!(500)).await;
    let event = payment(dec!(200));

    let mut handles = Vec::new();
    for _ in 0..5 {
        let ledger = context.ledger.clone();
        let invoice_id = invoice.id;
        let event = event.clone();
        handles.push(tokio::spawn(async move {
            ledger.apply_payment_with_retry(&invoice_id, &event).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let current = context.invoice(&invoice).await;
    assert_eq!(current.amount_paid, dec!(200));
    assert_eq!(current.balance_due, dec!(300));
    assert_eq!(current.version, invoice.version + 1);
}

#[tokio::test]
async fn test_refund_reopens_paid_invoice() {
    let context = TestContext::new();
    let invoice = invoice_for(&context, dec!(500)).await;
    let deposit = payment(dec!(200));
    let final_payment = payment(dec!(300));

    for event in [&deposit, &final_payment] {
        context
            .ledger
            .apply_payment_with_retry(&invoice.id, event)
            .await
            .unwrap();
    }

    let refund = final_payment.refund(Utc.with_ymd_and_hms(2024, 3, 20, 0, 0, 0).unwrap());
    let reopened = context
        .ledger
        .apply_payment_with_retry(&invoice.id, &refund)
        .await
        .unwrap();

    assert_eq!(reopened.status, InvoiceStatus::PartiallyPaid);
    assert_eq!(reopened.amount_paid, dec!(200));
    assert_eq!(reopened.balance_due, dec!(300));
    assert_eq!(reopened.paid_date, None);
}

#[tokio::test]
async fn test_overpayment_flagged_for_reconciliation() {
    let context = TestContext::new();
    let invoice = invoice_for(&context, dec!(120)).await;

    let updated = context
        .ledger
        .apply_payment_with_retry(&invoice.id, &payment(dec!(150)))
        .await
        .unwrap();

    assert!(updated.overpaid);
    assert_eq!(updated.overpaid_amount(), dec!(30));
    assert_eq!(updated.balance_due, dec!(0));
    assert_eq!(updated.status, InvoiceStatus::Paid);
}

#[tokio::test]
async fn test_cancelled_invoice_accepts_no_payments() {
    let context = TestContext::new();
    let invoice = invoice_for(&context, dec!(80)).await;

    context.ledger.cancel_invoice(&invoice.id).await.unwrap();

    let err = context
        .ledger
        .apply_payment_with_retry(&invoice.id, &payment(dec!(80)))
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::InvalidStateTransition { .. }));
}

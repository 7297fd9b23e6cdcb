use crate::bdd::{date, TestContext};
use fieldbill_billing::domain::{
    aggregate, DocumentNumber, Invoice, InvoiceStatus, LineItem, LineKind, WorkUnit,
};
use fieldbill_billing::BillingError;
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_long_rental_invoice_uses_tiered_price() {
    let context = TestContext::new();

    let lines = context.lines_for("excavator", date(2024, 3, 1), date(2024, 4, 15));
    let kinds: Vec<LineKind> = lines.iter().map(|l| l.kind).collect();
    assert_eq!(
        kinds,
        vec![LineKind::Rental, LineKind::Delivery, LineKind::Pickup]
    );
    assert_eq!(lines[0].quantity, dec!(45));
    assert_eq!(lines[0].gross_amount(), dec!(1650));

    let invoice = context
        .issue_invoice(lines, dec!(0), dec!(8), date(2024, 4, 15))
        .await;

    assert_eq!(invoice.subtotal, dec!(1785));
    assert_eq!(invoice.tax_amount, dec!(142.80));
    assert_eq!(invoice.total_amount, dec!(1927.80));
    assert_eq!(invoice.balance_due, dec!(1927.80));
    assert_eq!(invoice.status, InvoiceStatus::Sent);
    assert_eq!(invoice.due_date, date(2024, 5, 15));

    let number = DocumentNumber::parse(&invoice.invoice_number).unwrap();
    assert_eq!(number.prefix, "INV");
    assert_eq!(number.date, date(2024, 4, 15));
    assert_eq!(number.sequence, 1);
}

#[tokio::test]
async fn test_short_rental_billed_at_minimum() {
    let context = TestContext::new();

    let lines = context.lines_for("scissor_lift", date(2024, 5, 1), date(2024, 5, 2));
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].quantity, dec!(3));
    assert_eq!(lines[0].unit_price, dec!(120));
    assert_eq!(lines[0].total, dec!(360));
}

#[test]
fn test_rental_beyond_maximum_is_rejected() {
    let context = TestContext::new();
    let work_unit = WorkUnit::rental("scissor_lift", date(2024, 5, 1), date(2024, 5, 21));

    let err = context
        .builder
        .build_lines(&work_unit, context.table("scissor_lift"))
        .unwrap_err();
    assert!(matches!(
        err,
        BillingError::RateExceeded {
            requested_days: 20,
            max_days: 14
        }
    ));
}

#[test]
fn test_retired_table_cannot_price_new_work() {
    let context = TestContext::new();

    let err = context
        .config
        .rate_tables
        .effective("old_trailer", date(2024, 2, 1))
        .unwrap_err();
    assert!(matches!(err, BillingError::RateTableNotEffective { .. }));

    let work_unit = WorkUnit::rental("old_trailer", date(2024, 2, 1), date(2024, 2, 3));
    assert!(context
        .builder
        .build_lines(&work_unit, context.table("old_trailer"))
        .is_err());

    assert!(context
        .config
        .rate_tables
        .effective("old_trailer", date(2023, 6, 1))
        .is_ok());
}

#[test]
fn test_discounted_taxed_line() {
    let line = LineItem::new(LineKind::Service, "Site cleanup", dec!(2), dec!(40))
        .unwrap()
        .with_discount_percent(dec!(10))
        .unwrap()
        .with_tax_rate(dec!(8))
        .unwrap();

    assert_eq!(line.after_discount(), dec!(72));
    assert_eq!(line.tax_amount, dec!(5.76));
    assert_eq!(line.total, dec!(77.76));
    assert!(!line.discount_clamped);
}

#[test]
fn test_draft_can_be_reissued_with_late_fee_before_sending() {
    let context = TestContext::new();
    let table = context.table("scissor_lift");

    let mut lines = context.lines_for("scissor_lift", date(2024, 5, 1), date(2024, 5, 6));
    let mut draft = Invoice::draft(
        context.company_id.clone(),
        "INV2405060001",
        lines.clone(),
        dec!(0),
        dec!(0),
        date(2024, 5, 6),
        30,
    )
    .unwrap();
    assert_eq!(draft.total_amount, dec!(600));

    let late_fee = context
        .builder
        .late_fee_line(table, 2)
        .unwrap()
        .expect("late fee owed");
    assert_eq!(late_fee.total, table.late_fee(2));
    lines.push(late_fee);

    draft.reissue_lines(lines.clone(), dec!(0), dec!(0)).unwrap();
    assert_eq!(draft.total_amount, dec!(650));
    assert_eq!(draft.totals(), aggregate(&lines, dec!(0), dec!(0)).unwrap());

    draft.send().unwrap();
    assert!(draft.reissue_lines(lines, dec!(0), dec!(0)).is_err());
}

#[tokio::test]
async fn test_unpaid_invoice_past_due_reads_overdue() {
    let context = TestContext::new();
    let line = LineItem::new(LineKind::Service, "Hauling", dec!(1), dec!(500)).unwrap();

    let invoice = context
        .issue_invoice(vec![line], dec!(0), dec!(0), date(2024, 3, 1))
        .await;
    let today = invoice.due_date.succ_opt().unwrap();

    assert!(invoice.is_overdue(today));
    assert_eq!(invoice.effective_status(today), InvoiceStatus::Overdue);
    assert_eq!(invoice.days_overdue(today), 1);

    let stored = context.invoice(&invoice).await;
    assert_eq!(stored.status, InvoiceStatus::Sent);
    assert!(!stored.is_overdue(invoice.due_date));
}

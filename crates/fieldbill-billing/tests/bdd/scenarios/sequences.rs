use crate::bdd::{date, TestContext};
use fieldbill_billing::domain::{DocumentKind, DocumentNumber};
use fieldbill_common::CompanyId;
use std::collections::BTreeSet;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_invoice_numbers_are_unique_and_contiguous() {
    let context = TestContext::new();
    let day = date(2024, 6, 3);

    let mut handles = Vec::new();
    for _ in 0..20 {
        let allocator = context.allocator.clone();
        let company_id = context.company_id.clone();
        handles.push(tokio::spawn(async move {
            let mut numbers = Vec::new();
            for _ in 0..50 {
                let number = allocator
                    .next_document_number(&company_id, DocumentKind::Invoice, day)
                    .await
                    .unwrap();
                numbers.push(number.to_string());
            }
            numbers
        }));
    }

    let mut sequences = BTreeSet::new();
    for handle in handles {
        for rendered in handle.await.unwrap() {
            let parsed = DocumentNumber::parse(&rendered).unwrap();
            assert_eq!(parsed.prefix, "INV");
            assert_eq!(parsed.date, day);
            assert!(sequences.insert(parsed.sequence), "{} issued twice", rendered);
        }
    }

    assert_eq!(sequences.len(), 1000);
    assert_eq!(sequences.first(), Some(&1));
    assert_eq!(sequences.last(), Some(&1000));
}

#[tokio::test]
async fn test_numbering_restarts_per_day_and_kind() {
    let context = TestContext::new();
    let company = &context.company_id;

    let monday = context
        .allocator
        .next_document_number(company, DocumentKind::Quote, date(2024, 6, 3))
        .await
        .unwrap();
    let monday_order = context
        .allocator
        .next_document_number(company, DocumentKind::Order, date(2024, 6, 3))
        .await
        .unwrap();
    let tuesday = context
        .allocator
        .next_document_number(company, DocumentKind::Quote, date(2024, 6, 4))
        .await
        .unwrap();

    assert_eq!(monday.to_string(), "QT2406030001");
    assert_eq!(monday_order.to_string(), "ORD2406030001");
    assert_eq!(tuesday.to_string(), "QT2406040001");

    let other_tenant = CompanyId::new("beta-hauling").unwrap();
    let theirs = context
        .allocator
        .next_document_number(&other_tenant, DocumentKind::Quote, date(2024, 6, 3))
        .await
        .unwrap();
    assert_eq!(theirs.sequence, 1);
}

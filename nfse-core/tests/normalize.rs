mod common;

use chrono::{DateTime, Utc};
use common::fixture;
use nfse_core::paths::abrasf_v1;
use nfse_core::response::{normalize, NormalizeError, ResponseStatus};

fn utc(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .expect("fixture timestamp")
        .with_timezone(&Utc)
}

#[test]
fn escaped_submission_receipt_is_unwrapped_and_normalized() {
    // the business document arrives XML-escaped inside the `return` element
    let raw = fixture("responses/enviar_lote_rps_success.xml");
    let result = normalize(&raw, &abrasf_v1::submit_batch()).expect("normalize");

    assert_eq!(result.status(), ResponseStatus::Success);
    assert!(result.is_success());
    assert_eq!(result.protocol(), Some("2916414"));
    assert_eq!(result.batch_number(), Some("17"));
    assert_eq!(result.receipt_time(), Some(utc("2016-08-15T14:55:01.271Z")));
    assert!(result.error_entries().is_empty());
    assert_eq!(result.raw_xml(), raw);
}

#[test]
fn populated_error_entry_classifies_as_failure() {
    let raw = fixture("responses/enviar_lote_rps_error.xml");
    let result = normalize(&raw, &abrasf_v1::submit_batch()).expect("normalize");

    assert_eq!(result.status(), ResponseStatus::Failure);
    assert!(!result.is_success());
    assert!(result.protocol().is_none());

    let entries = result.error_entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].code(), Some("E515"));
    assert_eq!(
        entries[0].message(),
        Some(
            "Erro ao validar assinatura. - Certificado usado para assinar a remessa \
             não é do prestador e nem de empresa autorizada."
        )
    );
    assert!(entries[0].solution().is_none());
}

#[test]
fn batch_query_collects_invoice_records_in_document_order() {
    let raw = fixture("responses/consultar_lote_rps_success.xml");
    let result = normalize(&raw, &abrasf_v1::query_batch()).expect("normalize");

    assert!(result.is_success());
    let invoices = result.invoices();
    assert_eq!(invoices.len(), 2);

    assert_eq!(invoices[0].number(), Some("226"));
    assert_eq!(invoices[0].verification_code(), Some("AU1796W2"));
    assert_eq!(invoices[0].issue_time(), Some(utc("2016-08-15T14:55:03Z")));
    assert_eq!(
        invoices[0].other_info(),
        Some("Documento emitido em ambiente de homologação.")
    );

    assert_eq!(invoices[1].number(), Some("227"));
    assert_eq!(invoices[1].verification_code(), Some("BX4412K9"));
    assert!(invoices[1].other_info().is_none());
}

#[test]
fn situation_query_yields_numeric_situation() {
    let raw = fixture("responses/consultar_situacao_lote_rps.xml");
    let result = normalize(&raw, &abrasf_v1::query_batch_situation()).expect("normalize");

    assert!(result.is_success());
    assert_eq!(result.batch_number(), Some("17"));
    assert_eq!(result.situation(), Some(4));
}

#[test]
fn cancellation_confirmation_carries_the_timestamp() {
    let raw = fixture("responses/cancelar_nfse_success.xml");
    let result = normalize(&raw, &abrasf_v1::cancel_nfse()).expect("normalize");

    assert!(result.is_success());
    assert_eq!(
        result.cancellation_time(),
        Some(utc("2016-09-08T11:20:09Z"))
    );
}

#[test]
fn response_without_success_or_failure_shape_is_ambiguous() {
    let raw = fixture("responses/enviar_lote_rps_ambiguous.xml");
    let result = normalize(&raw, &abrasf_v1::submit_batch());
    assert!(matches!(result, Err(NormalizeError::AmbiguousResponse)));
}

#[test]
fn concurrent_normalizations_do_not_interfere() {
    let success = fixture("responses/enviar_lote_rps_success.xml");
    let error = fixture("responses/enviar_lote_rps_error.xml");

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let raw = if i % 2 == 0 {
                success.clone()
            } else {
                error.clone()
            };
            std::thread::spawn(move || normalize(&raw, &abrasf_v1::submit_batch()))
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.join().expect("thread").expect("normalize");
        if i % 2 == 0 {
            assert_eq!(result.protocol(), Some("2916414"));
            assert!(result.is_success());
        } else {
            assert_eq!(result.error_entries()[0].code(), Some("E515"));
            assert!(!result.is_success());
        }
    }
}

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lilith_vault::engine::masking::{MaskingEngine, MaskingPolicy, MaskingRule, MaskingStrategy, PolicyOptions};
use lilith_vault::engine::validator::{FieldSpec, FieldType, Schema, SchemaDefinition, SchemaValidator};
use lilith_vault::engine_core::canonical::{canonicalize, PayloadValue};
use lilith_vault::engine_core::ledger::{AuditEvent, AuditLedger};
use serde_json::json;

fn bench_mask(c: &mut Criterion) {
    let policy = MaskingPolicy::from_rules(
        "bench-policy",
        &[
            MaskingRule::new("email", r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}", MaskingStrategy::Simple),
            MaskingRule::new("ssn", r"[0-9]{3}-[0-9]{2}-[0-9]{4}", MaskingStrategy::Hash),
            MaskingRule::new("phone", r"\+?[0-9]{1,3}[ -][0-9]{3}[ -][0-9]{4}", MaskingStrategy::Structural),
        ],
        PolicyOptions::default(),
    )
    .unwrap();
    let text = "Patient jane.doe@example.com, SSN 123-45-6789, phone +1 555-0100. ".repeat(16);

    c.bench_function("mask_mixed_pii", |b| {
        b.iter(|| MaskingEngine::mask(black_box(&text), &policy))
    });
}

fn bench_validate(c: &mut Criterion) {
    let schema = Schema::load(
        "bench-schema",
        SchemaDefinition::new(vec![
            FieldSpec::new("id", FieldType::String).required(),
            FieldSpec::new("status", FieldType::String)
                .with_binding(vec![json!("active"), json!("inactive")]),
            FieldSpec::new("codes", FieldType::Integer).cardinality(0, None),
            FieldSpec::new(
                "owner",
                FieldType::Reference {
                    target: Some("Practitioner".to_string()),
                },
            ),
        ]),
    )
    .unwrap();
    let record = json!({
        "id": "p-1",
        "status": "active",
        "codes": (0..32).collect::<Vec<i64>>(),
        "owner": "Practitioner/9"
    });

    c.bench_function("validate_record", |b| {
        b.iter(|| SchemaValidator::validate(black_box(&record), &schema))
    });
}

fn bench_ledger(c: &mut Criterion) {
    let payload = PayloadValue::from(json!({
        "fields": ["name", "dob", "address"],
        "reason": "treatment",
        "count": 3
    }));

    c.bench_function("canonicalize_payload", |b| {
        b.iter(|| canonicalize(black_box(&payload)))
    });

    let ledger = AuditLedger::new();
    c.bench_function("ledger_append", |b| {
        b.iter(|| ledger.append(AuditEvent::new("bench", "record", "read", payload.clone())))
    });

    let verify_ledger = AuditLedger::new();
    for _ in 0..1000 {
        let _ = verify_ledger.append(AuditEvent::new("bench", "record", "read", payload.clone()));
    }
    let entries = verify_ledger.snapshot();
    c.bench_function("verify_chain_1000", |b| {
        b.iter(|| AuditLedger::verify_chain(black_box(&entries)))
    });
}

criterion_group!(benches, bench_mask, bench_validate, bench_ledger);
criterion_main!(benches);

use lilith_vault::engine::validator::{
    FieldSpec, FieldType, Invariant, Schema, SchemaDefinition, SchemaValidator, Severity,
};
use lilith_vault::engine_core::constants::codes;
use serde_json::{json, Map, Value};

fn schema(def: SchemaDefinition) -> Schema {
    Schema::load("test", def).unwrap()
}

fn issue_codes(result: &lilith_vault::ValidationResult) -> Vec<(String, String)> {
    result
        .issues
        .iter()
        .map(|i| (i.path.clone(), i.code.clone()))
        .collect()
}

fn patient() -> Schema {
    let name = SchemaDefinition::new(vec![
        FieldSpec::new("family", FieldType::String).required(),
        FieldSpec::new("given", FieldType::String).cardinality(0, None),
    ]);
    schema(
        SchemaDefinition::new(vec![
            FieldSpec::new("id", FieldType::String).cardinality(1, Some(1)),
            FieldSpec::new("status", FieldType::String)
                .with_binding(vec![json!("active"), json!("inactive")]),
            FieldSpec::new(
                "name",
                FieldType::Object {
                    schema: Some(Box::new(name)),
                },
            )
            .required(),
            FieldSpec::new(
                "practitioner",
                FieldType::Reference {
                    target: Some("Practitioner".to_string()),
                },
            ),
            FieldSpec::new("age", FieldType::Integer),
            FieldSpec::new("deceased", FieldType::Boolean),
        ])
        .with_invariant(Invariant::new(
            "deceased-has-no-status",
            "status",
            &["deceased"],
            "a deceased patient cannot be active",
            |r: &Map<String, Value>| {
                !(r.get("deceased") == Some(&json!(true)) && r.get("status") == Some(&json!("active")))
            },
        )),
    )
}

#[test]
fn test_empty_record_reports_single_required_missing() {
    let s = schema(SchemaDefinition::new(vec![
        FieldSpec::new("id", FieldType::String).cardinality(1, Some(1))
    ]));
    let result = SchemaValidator::validate(&json!({}), &s);
    assert!(!result.valid);
    assert_eq!(result.issues.len(), 1);
    assert_eq!(result.issues[0].code, "required-missing");
    assert_eq!(result.issues[0].path, "id");
    assert_eq!(result.issues[0].severity, Severity::Error);
}

#[test]
fn test_valid_record() {
    let result = SchemaValidator::validate(
        &json!({
            "id": "p1",
            "status": "active",
            "name": {"family": "Doe", "given": ["Jane", "Q"]},
            "practitioner": "Practitioner/7",
            "age": 40,
            "deceased": false
        }),
        &patient(),
    );
    assert!(result.valid, "{:?}", result.issues);
    assert!(result.issues.is_empty());
}

#[test]
fn test_all_violations_aggregated_in_group_order() {
    let result = SchemaValidator::validate(
        &json!({
            "nickname": "JD",
            "status": "archived",
            "name": {"given": [1]},
            "practitioner": "Patient/7",
            "age": 40.5,
            "deceased": true
        }),
        &patient(),
    );
    assert!(!result.valid);
    assert_eq!(
        issue_codes(&result),
        vec![
            ("id".to_string(), codes::REQUIRED_MISSING.to_string()),
            ("name.family".to_string(), codes::REQUIRED_MISSING.to_string()),
            ("status".to_string(), codes::BINDING_VIOLATION.to_string()),
            ("name.given[0]".to_string(), codes::TYPE_MISMATCH.to_string()),
            ("practitioner".to_string(), codes::TYPE_MISMATCH.to_string()),
            ("age".to_string(), codes::TYPE_MISMATCH.to_string()),
            ("nickname".to_string(), codes::UNKNOWN_FIELD.to_string()),
        ]
    );
    // Invariant skipped: "status" already failed its binding check.
    assert!(result.issues.iter().all(|i| i.code != codes::INVARIANT_VIOLATION));
}

#[test]
fn test_invariant_reported_at_subject_path() {
    let result = SchemaValidator::validate(
        &json!({
            "id": "p1",
            "status": "active",
            "name": {"family": "Doe"},
            "deceased": true
        }),
        &patient(),
    );
    assert_eq!(
        issue_codes(&result),
        vec![("status".to_string(), codes::INVARIANT_VIOLATION.to_string())]
    );
}

#[test]
fn test_unknown_fields_warn_unless_closed() {
    let fields = || vec![FieldSpec::new("id", FieldType::String)];

    let open = SchemaValidator::validate(
        &json!({"id": "1", "extra": 1}),
        &schema(SchemaDefinition::new(fields())),
    );
    assert!(open.valid);
    assert_eq!(open.warnings().count(), 1);
    assert_eq!(open.issues[0].code, codes::UNKNOWN_FIELD);

    let closed = SchemaValidator::validate(
        &json!({"id": "1", "extra": 1}),
        &schema(SchemaDefinition::new(fields()).closed()),
    );
    assert!(!closed.valid);
    assert_eq!(closed.errors().count(), 1);
}

#[test]
fn test_null_counts_as_absent() {
    let s = schema(SchemaDefinition::new(vec![
        FieldSpec::new("id", FieldType::String).required()
    ]));
    let result = SchemaValidator::validate(&json!({"id": null}), &s);
    assert_eq!(result.issues.len(), 1);
    assert_eq!(result.issues[0].code, codes::REQUIRED_MISSING);
}

#[test]
fn test_too_few_occurrences_is_cardinality_violation() {
    let s = schema(SchemaDefinition::new(vec![
        FieldSpec::new("codes", FieldType::String).cardinality(2, Some(4))
    ]));
    let result = SchemaValidator::validate(&json!({"codes": ["a"]}), &s);
    assert_eq!(
        issue_codes(&result),
        vec![("codes".to_string(), codes::CARDINALITY_VIOLATION.to_string())]
    );
}

#[test]
fn test_non_object_record() {
    let result = SchemaValidator::validate(&json!([1, 2]), &patient());
    assert_eq!(
        issue_codes(&result),
        vec![("$".to_string(), codes::TYPE_MISMATCH.to_string())]
    );
}

#[test]
fn test_self_referencing_schema_terminates() {
    // Reference fields are never dereferenced, so a schema that points at
    // its own kind validates in a single pass.
    let s = schema(SchemaDefinition::new(vec![
        FieldSpec::new("id", FieldType::String).required(),
        FieldSpec::new(
            "parent",
            FieldType::Reference {
                target: Some("Node".to_string()),
            },
        ),
        FieldSpec::new(
            "children",
            FieldType::Reference {
                target: Some("Node".to_string()),
            },
        )
        .cardinality(0, None),
    ]));
    let result = SchemaValidator::validate(
        &json!({"id": "n1", "parent": "Node/n1", "children": ["Node/n1", "Node/n2"]}),
        &s,
    );
    assert!(result.valid, "{:?}", result.issues);
}

#[test]
fn test_validation_does_not_mutate_schema() {
    let s = patient();
    let before = format!("{:?}", s.definition());
    let _ = SchemaValidator::validate(&json!({"id": 5}), &s);
    assert_eq!(format!("{:?}", s.definition()), before);
}

// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Declarative record validation.
//!
//! `SchemaValidator::validate` walks the schema tree and aggregates every
//! violation instead of stopping at the first one. Issues are grouped as
//! cardinality, then type/binding, then invariant, then unknown-field; each
//! group follows field declaration order.
//!
//! Reference fields are checked for well-formedness only. The referenced
//! record is never resolved, so reference cycles cannot cause unbounded
//! traversal.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::engine_core::constants::codes;
use crate::engine_core::errors::SchemaError;

/// Shared, immutable handle to a loaded schema.
pub type SchemaHandle = Arc<Schema>;

/// Value types a field can declare.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    /// Nested record, validated recursively when a schema is given.
    Object {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<Box<SchemaDefinition>>,
    },
    /// Identifier of another record, e.g. `Patient/123` when `target` is set.
    Reference {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
    },
    Any,
}

impl FieldType {
    fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Object { .. } => "object",
            FieldType::Reference { .. } => "reference",
            FieldType::Any => "any",
        }
    }
}

fn default_max() -> Option<usize> {
    Some(1)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(flatten)]
    pub field_type: FieldType,
    /// Shorthand for `min: 1`.
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub min: usize,
    /// `None` means unbounded.
    #[serde(default = "default_max")]
    pub max: Option<usize>,
    /// Closed set of allowed values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<Vec<Value>>,
}

impl FieldSpec {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            required: false,
            min: 0,
            max: Some(1),
            binding: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn cardinality(mut self, min: usize, max: Option<usize>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_binding(mut self, values: Vec<Value>) -> Self {
        self.binding = Some(values);
        self
    }

    pub fn min_occurs(&self) -> usize {
        if self.required {
            self.min.max(1)
        } else {
            self.min
        }
    }

    fn is_repeated(&self) -> bool {
        self.max != Some(1) && self.max != Some(0)
    }
}

/// Pre-compiled boolean predicate over a record's fields.
pub trait InvariantPredicate: Send + Sync {
    fn holds(&self, record: &Map<String, Value>) -> bool;
}

impl<F> InvariantPredicate for F
where
    F: Fn(&Map<String, Value>) -> bool + Send + Sync,
{
    fn holds(&self, record: &Map<String, Value>) -> bool {
        self(record)
    }
}

#[derive(Clone)]
pub struct Invariant {
    pub id: String,
    /// Field the violation is reported against.
    pub subject: String,
    /// Every field the predicate reads, subject included.
    pub fields: Vec<String>,
    pub message: String,
    predicate: Arc<dyn InvariantPredicate>,
}

impl Invariant {
    pub fn new<P>(id: &str, subject: &str, fields: &[&str], message: &str, predicate: P) -> Self
    where
        P: InvariantPredicate + 'static,
    {
        let mut all: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        if !all.iter().any(|f| f == subject) {
            all.insert(0, subject.to_string());
        }
        Self {
            id: id.to_string(),
            subject: subject.to_string(),
            fields: all,
            message: message.to_string(),
            predicate: Arc::new(predicate),
        }
    }
}

impl std::fmt::Debug for Invariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invariant")
            .field("id", &self.id)
            .field("subject", &self.subject)
            .field("fields", &self.fields)
            .finish()
    }
}

/// Declarative record shape. Invariants are attached in code since they are
/// compiled predicates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDefinition {
    /// Undeclared fields are errors instead of warnings.
    #[serde(default)]
    pub closed: bool,
    pub fields: Vec<FieldSpec>,
    #[serde(skip)]
    pub invariants: Vec<Invariant>,
}

impl SchemaDefinition {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self {
            closed: false,
            fields,
            invariants: Vec::new(),
        }
    }

    pub fn closed(mut self) -> Self {
        self.closed = true;
        self
    }

    pub fn with_invariant(mut self, invariant: Invariant) -> Self {
        self.invariants.push(invariant);
        self
    }

    pub fn from_yaml_str(source: &str) -> Result<Self, SchemaError> {
        serde_yaml_ng::from_str(source).map_err(|e| SchemaError::Source(e.to_string()))
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, SchemaError> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| SchemaError::Source(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&source)
    }

    fn declares(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// Structural checks run once at load time.
    fn check(&self, schema_id: &str, prefix: &str) -> Result<(), SchemaError> {
        let mut names = HashSet::new();
        for (idx, field) in self.fields.iter().enumerate() {
            if field.name.trim().is_empty() {
                return Err(SchemaError::EmptyFieldName {
                    schema: schema_id.to_string(),
                    index: idx + 1,
                });
            }
            let path = join(prefix, &field.name);
            if !names.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    schema: schema_id.to_string(),
                    field: path,
                });
            }
            Self::check_field(schema_id, &path, field)?;
            if let FieldType::Object {
                schema: Some(nested),
            } = &field.field_type
            {
                nested.check(schema_id, &path)?;
            }
        }

        for invariant in &self.invariants {
            let invalid = |reason: String| SchemaError::InvalidInvariant {
                schema: schema_id.to_string(),
                invariant: invariant.id.clone(),
                reason,
            };
            if invariant.id.trim().is_empty() {
                return Err(invalid("invariant id cannot be empty".to_string()));
            }
            for name in &invariant.fields {
                if !self.declares(name) {
                    return Err(invalid(format!("references undeclared field '{}'", name)));
                }
            }
        }
        Ok(())
    }

    fn check_field(schema_id: &str, path: &str, field: &FieldSpec) -> Result<(), SchemaError> {
        let cardinality = |reason: &str| SchemaError::InvalidCardinality {
            schema: schema_id.to_string(),
            field: path.to_string(),
            reason: reason.to_string(),
        };
        match field.max {
            Some(0) => return Err(cardinality("max must be at least 1")),
            Some(max) if field.min_occurs() > max => {
                return Err(cardinality("min exceeds max"));
            }
            _ => {}
        }

        if let Some(values) = &field.binding {
            let invalid = |reason: String| SchemaError::InvalidField {
                schema: schema_id.to_string(),
                field: path.to_string(),
                reason,
            };
            if matches!(field.field_type, FieldType::Object { .. } | FieldType::Any) {
                return Err(invalid(format!(
                    "value bindings are not supported on '{}' fields",
                    field.field_type.name()
                )));
            }
            if values.is_empty() {
                return Err(invalid("value binding cannot be empty".to_string()));
            }
            if let Some(bad) = values.iter().find(|v| type_error(&field.field_type, v).is_some()) {
                return Err(invalid(format!(
                    "bound value {} is not a valid {}",
                    bad,
                    field.field_type.name()
                )));
            }
        }
        Ok(())
    }
}

/// A schema loaded under an id. Immutable.
#[derive(Debug)]
pub struct Schema {
    id: String,
    definition: SchemaDefinition,
}

impl Schema {
    pub fn load(id: &str, definition: SchemaDefinition) -> Result<Self, SchemaError> {
        if id.trim().is_empty() {
            return Err(SchemaError::EmptySchemaId);
        }
        definition.check(id, "")?;
        debug!(schema = id, fields = definition.fields.len(), "Schema loaded");
        Ok(Self {
            id: id.to_string(),
            definition,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn definition(&self) -> &SchemaDefinition {
        &self.definition
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct ValidationIssue {
    pub path: String,
    pub code: String,
    pub message: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct ValidationResult {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }
}

#[derive(Default)]
struct IssueGroups {
    cardinality: Vec<ValidationIssue>,
    typed: Vec<ValidationIssue>,
    invariant: Vec<ValidationIssue>,
    unknown: Vec<ValidationIssue>,
}

impl IssueGroups {
    fn error_count(&self) -> usize {
        self.cardinality.len() + self.typed.len() + self.invariant.len()
            + self
                .unknown
                .iter()
                .filter(|i| i.severity == Severity::Error)
                .count()
    }

    fn into_result(self) -> ValidationResult {
        let issues: Vec<ValidationIssue> = self
            .cardinality
            .into_iter()
            .chain(self.typed)
            .chain(self.invariant)
            .chain(self.unknown)
            .collect();
        let valid = !issues.iter().any(|i| i.severity == Severity::Error);
        ValidationResult { valid, issues }
    }
}

fn issue(path: &str, code: &str, message: String, severity: Severity) -> ValidationIssue {
    ValidationIssue {
        path: path.to_string(),
        code: code.to_string(),
        message,
        severity,
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

pub struct SchemaValidator;

impl SchemaValidator {
    pub fn validate(record: &Value, schema: &Schema) -> ValidationResult {
        let mut groups = IssueGroups::default();
        match record.as_object() {
            Some(map) => Self::validate_object(map, &schema.definition, "", &mut groups),
            None => groups.typed.push(issue(
                "$",
                codes::TYPE_MISMATCH,
                "record must be an object".to_string(),
                Severity::Error,
            )),
        }
        groups.into_result()
    }

    fn validate_object(
        map: &Map<String, Value>,
        schema: &SchemaDefinition,
        prefix: &str,
        groups: &mut IssueGroups,
    ) {
        let mut failed: HashSet<&str> = HashSet::new();

        for field in &schema.fields {
            let path = join(prefix, &field.name);
            let occurrences: Vec<(String, &Value)> = match map.get(&field.name) {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(items)) if field.is_repeated() => items
                    .iter()
                    .enumerate()
                    .map(|(idx, item)| (format!("{}[{}]", path, idx), item))
                    .collect(),
                Some(value) => vec![(path.clone(), value)],
            };

            // 1. Cardinality before contents
            let count = occurrences.len();
            let min = field.min_occurs();
            if count == 0 && min > 0 {
                groups.cardinality.push(issue(
                    &path,
                    codes::REQUIRED_MISSING,
                    format!("required field '{}' is missing", field.name),
                    Severity::Error,
                ));
                failed.insert(field.name.as_str());
            } else if count < min || field.max.is_some_and(|max| count > max) {
                groups.cardinality.push(issue(
                    &path,
                    codes::CARDINALITY_VIOLATION,
                    format!(
                        "field '{}' occurs {} times, expected {}..{}",
                        field.name,
                        count,
                        min,
                        field.max.map_or("*".to_string(), |m| m.to_string())
                    ),
                    Severity::Error,
                ));
                failed.insert(field.name.as_str());
            }

            // 2. Type and binding, excess occurrences skipped
            let limit = field.max.map_or(count, |max| max.min(count));
            for (item_path, value) in occurrences.iter().take(limit) {
                if !Self::check_occurrence(field, item_path, value, groups) {
                    failed.insert(field.name.as_str());
                }
            }
        }

        // 3. Invariants, after every field-level check of this schema
        for invariant in &schema.invariants {
            if invariant.fields.iter().any(|f| failed.contains(f.as_str())) {
                continue;
            }
            if !invariant.predicate.holds(map) {
                groups.invariant.push(issue(
                    &join(prefix, &invariant.subject),
                    codes::INVARIANT_VIOLATION,
                    format!("{} ({})", invariant.message, invariant.id),
                    Severity::Error,
                ));
            }
        }

        // 4. Undeclared fields
        for key in map.keys() {
            if !schema.declares(key) {
                let severity = if schema.closed {
                    Severity::Error
                } else {
                    Severity::Warning
                };
                groups.unknown.push(issue(
                    &join(prefix, key),
                    codes::UNKNOWN_FIELD,
                    format!("field '{}' is not declared in the schema", key),
                    severity,
                ));
            }
        }
    }

    /// Returns false when the occurrence produced any error.
    fn check_occurrence(
        field: &FieldSpec,
        path: &str,
        value: &Value,
        groups: &mut IssueGroups,
    ) -> bool {
        if let Some(message) = type_error(&field.field_type, value) {
            groups.typed.push(issue(path, codes::TYPE_MISMATCH, message, Severity::Error));
            return false;
        }

        if let Some(allowed) = &field.binding {
            if !allowed.contains(value) {
                groups.typed.push(issue(
                    path,
                    codes::BINDING_VIOLATION,
                    format!("value {} is not in the bound value set", value),
                    Severity::Error,
                ));
                return false;
            }
        }

        if let FieldType::Object {
            schema: Some(nested),
        } = &field.field_type
        {
            if let Some(inner) = value.as_object() {
                let before = groups.error_count();
                Self::validate_object(inner, nested, path, groups);
                return groups.error_count() == before;
            }
        }
        true
    }
}

/// Describes why `value` is not a valid instance of `field_type`.
fn type_error(field_type: &FieldType, value: &Value) -> Option<String> {
    let ok = match field_type {
        FieldType::String => value.is_string(),
        FieldType::Integer => value.is_i64() || value.is_u64(),
        FieldType::Number => value.is_number(),
        FieldType::Boolean => value.is_boolean(),
        FieldType::Object { .. } => value.is_object(),
        FieldType::Reference { target } => {
            return reference_error(value, target.as_deref());
        }
        FieldType::Any => true,
    };
    if ok {
        None
    } else {
        Some(format!(
            "expected {}, found {}",
            field_type.name(),
            json_type_name(value)
        ))
    }
}

/// Well-formedness only: the target record is never looked up.
fn reference_error(value: &Value, target: Option<&str>) -> Option<String> {
    let Some(reference) = value.as_str() else {
        return Some(format!(
            "expected reference identifier, found {}",
            json_type_name(value)
        ));
    };
    if reference.trim().is_empty() {
        return Some("reference identifier cannot be empty".to_string());
    }
    if reference.chars().any(char::is_whitespace) {
        return Some("reference identifier cannot contain whitespace".to_string());
    }
    if let Some(kind) = target {
        let well_formed = reference
            .split_once('/')
            .is_some_and(|(k, id)| k == kind && !id.is_empty() && !id.contains('/'));
        if !well_formed {
            return Some(format!(
                "expected reference of the form '{}/<id>', found '{}'",
                kind, reference
            ));
        }
    }
    None
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

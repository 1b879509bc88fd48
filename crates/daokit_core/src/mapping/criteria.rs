//! Programmatic query filters.
//!
//! # Responsibility
//! - Collect field predicates (`equals`, `string like`) without SQL text.
//! - Compile them against one mapping into a `?`-bound `WHERE` clause.
//!
//! # Invariants
//! - Field names are checked against the mapping before compilation.
//! - `like` patterns are substring matches: caller wildcards are escaped.

use super::{ColumnKind, EntityMapping, FieldValue};
use std::error::Error;
use std::fmt::{Display, Formatter};

const LIKE_ESCAPE: char = '\\';

/// A field name or value that cannot be applied to the target mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    UnknownField {
        entity: &'static str,
        field: String,
    },
    /// `like` was used on a non-text field.
    NotTextField {
        entity: &'static str,
        field: String,
    },
    TypeMismatch {
        entity: &'static str,
        field: String,
        expected: ColumnKind,
        actual: ColumnKind,
    },
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownField { entity, field } => {
                write!(f, "entity `{entity}` has no field `{field}`")
            }
            Self::NotTextField { entity, field } => {
                write!(f, "field `{entity}.{field}` is not a text field")
            }
            Self::TypeMismatch {
                entity,
                field,
                expected,
                actual,
            } => write!(
                f,
                "field `{entity}.{field}` expects {expected} values, got {actual}"
            ),
        }
    }
}

impl Error for QueryError {}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    Equals { field: String, value: FieldValue },
    Like { field: String, needle: String },
}

/// Conjunction of field predicates.
///
/// ```
/// use daokit_core::Criteria;
///
/// let criteria = Criteria::new()
///     .and_equals("brand", "Volvo")
///     .and_string_like("comments", "tests");
/// assert_eq!(criteria.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Criteria {
    predicates: Vec<Predicate>,
}

/// A compiled filter: `WHERE ...` fragment and its bound values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledFilter {
    pub clause: String,
    pub values: Vec<FieldValue>,
}

impl Criteria {
    /// Creates an empty criteria matching every row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `field` to equal `value` exactly. A null value matches `IS NULL`.
    pub fn and_equals(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.predicates.push(Predicate::Equals {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Requires text `field` to contain `needle`.
    pub fn and_string_like(mut self, field: impl Into<String>, needle: impl Into<String>) -> Self {
        self.predicates.push(Predicate::Like {
            field: field.into(),
            needle: needle.into(),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Compiles the predicates for `mapping`.
    pub fn compile(&self, mapping: &EntityMapping) -> Result<CompiledFilter, QueryError> {
        let mut clause = String::from("WHERE 1 = 1");
        let mut values = Vec::new();

        for predicate in &self.predicates {
            match predicate {
                Predicate::Equals { field, value } => {
                    let (kind, _) = lookup(mapping, field)?;
                    match value.kind() {
                        None => {
                            clause.push_str(&format!(" AND {field} IS NULL"));
                        }
                        Some(actual) if actual != kind => {
                            return Err(QueryError::TypeMismatch {
                                entity: mapping.name,
                                field: field.clone(),
                                expected: kind,
                                actual,
                            });
                        }
                        Some(_) => {
                            clause.push_str(&format!(" AND {field} = ?"));
                            values.push(value.clone());
                        }
                    }
                }
                Predicate::Like { field, needle } => {
                    let (kind, _) = lookup(mapping, field)?;
                    if kind != ColumnKind::Text {
                        return Err(QueryError::NotTextField {
                            entity: mapping.name,
                            field: field.clone(),
                        });
                    }
                    clause.push_str(&format!(" AND {field} LIKE ? ESCAPE '{LIKE_ESCAPE}'"));
                    values.push(FieldValue::Text(format!("%{}%", escape_like(needle))));
                }
            }
        }

        Ok(CompiledFilter { clause, values })
    }
}

fn lookup(mapping: &EntityMapping, field: &str) -> Result<(ColumnKind, bool), QueryError> {
    mapping.field(field).ok_or_else(|| QueryError::UnknownField {
        entity: mapping.name,
        field: field.to_string(),
    })
}

fn escape_like(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());
    for ch in needle.chars() {
        if ch == '%' || ch == '_' || ch == LIKE_ESCAPE {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::{escape_like, Criteria, QueryError};
    use crate::mapping::{Column, ColumnKind, EntityMapping, FieldValue, KeyColumn};

    const PET: EntityMapping = EntityMapping {
        name: "Pet",
        table: "pet",
        key: KeyColumn {
            field: "id",
            kind: ColumnKind::Integer,
            generated: true,
        },
        columns: &[Column::text("name"), Column::integer("age").nullable()],
    };

    #[test]
    fn empty_criteria_matches_everything() {
        let compiled = Criteria::new().compile(&PET).unwrap();
        assert_eq!(compiled.clause, "WHERE 1 = 1");
        assert!(compiled.values.is_empty());
    }

    #[test]
    fn compiles_equals_and_like_with_bound_values() {
        let compiled = Criteria::new()
            .and_equals("age", 3)
            .and_string_like("name", "ex")
            .compile(&PET)
            .unwrap();
        assert_eq!(
            compiled.clause,
            "WHERE 1 = 1 AND age = ? AND name LIKE ? ESCAPE '\\'"
        );
        assert_eq!(
            compiled.values,
            vec![FieldValue::Integer(3), FieldValue::Text("%ex%".to_string())]
        );
    }

    #[test]
    fn null_equality_uses_is_null() {
        let compiled = Criteria::new()
            .and_equals("age", None::<i64>)
            .compile(&PET)
            .unwrap();
        assert_eq!(compiled.clause, "WHERE 1 = 1 AND age IS NULL");
        assert!(compiled.values.is_empty());
    }

    #[test]
    fn rejects_unknown_field() {
        let err = Criteria::new()
            .and_equals("owner", "x")
            .compile(&PET)
            .unwrap_err();
        assert!(matches!(err, QueryError::UnknownField { field, .. } if field == "owner"));
    }

    #[test]
    fn rejects_like_on_integer_field() {
        let err = Criteria::new()
            .and_string_like("age", "1")
            .compile(&PET)
            .unwrap_err();
        assert!(matches!(err, QueryError::NotTextField { .. }));
    }

    #[test]
    fn rejects_value_of_wrong_kind() {
        let err = Criteria::new()
            .and_equals("name", 5)
            .compile(&PET)
            .unwrap_err();
        assert!(matches!(
            err,
            QueryError::TypeMismatch {
                expected: ColumnKind::Text,
                actual: ColumnKind::Integer,
                ..
            }
        ));
    }

    #[test]
    fn escapes_wildcards_in_needle() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }
}

//! Entity mapping metadata and the SQL it compiles to.
//!
//! # Responsibility
//! - Describe how an entity type maps onto one table (`EntityMapping`).
//! - Convert entities to and from rows (`Entity`).
//! - Render the fixed statements sessions execute for each mapping.
//!
//! # Invariants
//! - Table and column names are validated identifiers; values are only ever
//!   bound as `?` parameters.
//! - Column order in `EntityMapping::columns` is the order of
//!   `Entity::values` and of every rendered column list (key first).

use crate::db::{DbError, DbResult};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::{FromSql, ToSql, ToSqlOutput, Value, ValueRef};
use rusqlite::Row;
use std::collections::BTreeSet;
use std::fmt::{Debug, Display, Formatter};

pub mod criteria;

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Storage class of a mapped column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Text,
}

impl ColumnKind {
    fn sql_type(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Text => "TEXT",
        }
    }
}

impl Display for ColumnKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer => write!(f, "integer"),
            Self::Text => write!(f, "text"),
        }
    }
}

/// One non-key attribute. The field name doubles as the column name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub field: &'static str,
    pub kind: ColumnKind,
    pub nullable: bool,
}

impl Column {
    pub const fn text(field: &'static str) -> Self {
        Self {
            field,
            kind: ColumnKind::Text,
            nullable: false,
        }
    }

    pub const fn integer(field: &'static str) -> Self {
        Self {
            field,
            kind: ColumnKind::Integer,
            nullable: false,
        }
    }

    pub const fn nullable(self) -> Self {
        Self {
            nullable: true,
            ..self
        }
    }
}

/// The primary key attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyColumn {
    pub field: &'static str,
    pub kind: ColumnKind,
    /// Database assigns the key on insert when the entity carries none.
    pub generated: bool,
}

/// Static description of how one entity type is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityMapping {
    /// Entity name used in configuration, errors and logs (e.g. `Car`).
    pub name: &'static str,
    pub table: &'static str,
    pub key: KeyColumn,
    pub columns: &'static [Column],
}

impl EntityMapping {
    /// Looks up a field, the key included, returning `(kind, nullable)`.
    pub fn field(&self, field: &str) -> Option<(ColumnKind, bool)> {
        if field == self.key.field {
            return Some((self.key.kind, false));
        }
        self.columns
            .iter()
            .find(|column| column.field == field)
            .map(|column| (column.kind, column.nullable))
    }

    /// Checks identifiers and structural rules before any SQL is rendered.
    pub fn validate(&self) -> DbResult<()> {
        validate_identifier(self.table)?;
        validate_identifier(self.key.field)?;

        if self.key.generated && self.key.kind != ColumnKind::Integer {
            return Err(DbError::InvalidMapping {
                entity: self.name,
                message: "generated keys must be integer columns".to_string(),
            });
        }

        let mut fields = BTreeSet::new();
        fields.insert(self.key.field);
        for column in self.columns {
            validate_identifier(column.field)?;
            if !fields.insert(column.field) {
                return Err(DbError::InvalidMapping {
                    entity: self.name,
                    message: format!("field `{}` declared twice", column.field),
                });
            }
        }
        Ok(())
    }

    fn column_list(&self, with_key: bool) -> String {
        let mut names = Vec::with_capacity(self.columns.len() + 1);
        if with_key {
            names.push(self.key.field);
        }
        names.extend(self.columns.iter().map(|column| column.field));
        names.join(", ")
    }

    pub(crate) fn select_sql(&self) -> String {
        format!("SELECT {} FROM {}", self.column_list(true), self.table)
    }

    pub(crate) fn select_by_key_sql(&self) -> String {
        format!("{} WHERE {} = ?1;", self.select_sql(), self.key.field)
    }

    fn insert_prefix(&self, with_key: bool) -> String {
        let columns = self.column_list(with_key);
        if columns.is_empty() {
            return format!("INSERT INTO {} DEFAULT VALUES", self.table);
        }
        let count = self.columns.len() + usize::from(with_key);
        let placeholders = (1..=count)
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!("INSERT INTO {} ({columns}) VALUES ({placeholders})", self.table)
    }

    pub(crate) fn insert_sql(&self, with_key: bool) -> String {
        format!(
            "{} RETURNING {};",
            self.insert_prefix(with_key),
            self.key.field
        )
    }

    pub(crate) fn upsert_sql(&self) -> String {
        let insert = self.insert_prefix(true);
        if self.columns.is_empty() {
            return format!("{insert} ON CONFLICT({}) DO NOTHING;", self.key.field);
        }
        let assignments = self
            .columns
            .iter()
            .map(|column| format!("{0} = excluded.{0}", column.field))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "{insert} ON CONFLICT({}) DO UPDATE SET {assignments};",
            self.key.field
        )
    }

    pub(crate) fn delete_sql(&self) -> String {
        format!("DELETE FROM {} WHERE {} = ?1;", self.table, self.key.field)
    }

    pub(crate) fn create_table_sql(&self) -> String {
        let key = if self.key.generated {
            format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", self.key.field)
        } else {
            format!(
                "{} {} PRIMARY KEY NOT NULL",
                self.key.field,
                self.key.kind.sql_type()
            )
        };
        let mut definitions = vec![key];
        definitions.extend(self.columns.iter().map(|column| {
            if column.nullable {
                format!("{} {}", column.field, column.kind.sql_type())
            } else {
                format!("{} {} NOT NULL", column.field, column.kind.sql_type())
            }
        }));
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({});",
            self.table,
            definitions.join(", ")
        )
    }

    pub(crate) fn drop_table_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {};", self.table)
    }
}

fn validate_identifier(name: &str) -> DbResult<()> {
    if IDENTIFIER_RE.is_match(name) {
        Ok(())
    } else {
        Err(DbError::InvalidIdentifier(name.to_string()))
    }
}

/// Scalar attribute value bound into queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Null,
    Integer(i64),
    Text(String),
}

impl FieldValue {
    /// Storage class of the value; `None` for `Null`.
    pub fn kind(&self) -> Option<ColumnKind> {
        match self {
            Self::Null => None,
            Self::Integer(_) => Some(ColumnKind::Integer),
            Self::Text(_) => Some(ColumnKind::Text),
        }
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "{value}"),
        }
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Owned(Value::Null),
            Self::Integer(value) => ToSqlOutput::Owned(Value::Integer(*value)),
            Self::Text(value) => ToSqlOutput::Borrowed(ValueRef::Text(value.as_bytes())),
        })
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for FieldValue {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// A record type stored through a session.
///
/// Implementors provide one static mapping and the row conversions; all SQL
/// is rendered from the mapping.
pub trait Entity: Sized {
    /// Primary key type.
    type Key: ToSql + FromSql + Clone + Debug + Display;

    fn mapping() -> &'static EntityMapping;

    /// Current key; `None` for entities not yet persisted.
    fn key(&self) -> Option<Self::Key>;

    fn set_key(&mut self, key: Self::Key);

    /// Non-key attribute values, in `mapping().columns` order.
    fn values(&self) -> Vec<FieldValue>;

    /// Builds an entity from a row selected with the mapping's column list.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    /// Short label used in errors and logs, e.g. `Car - [7]`.
    fn describe(&self) -> String {
        match self.key() {
            Some(key) => format!("{} - [{key}]", Self::mapping().name),
            None => format!("{} - [new]", Self::mapping().name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Column, ColumnKind, EntityMapping, FieldValue, KeyColumn};
    use crate::db::DbError;

    const COLUMNS: &[Column] = &[Column::text("title"), Column::integer("pages").nullable()];

    const BOOK: EntityMapping = EntityMapping {
        name: "Book",
        table: "book",
        key: KeyColumn {
            field: "id",
            kind: ColumnKind::Integer,
            generated: true,
        },
        columns: COLUMNS,
    };

    #[test]
    fn renders_statements_with_key_first() {
        assert_eq!(BOOK.select_sql(), "SELECT id, title, pages FROM book");
        assert_eq!(
            BOOK.insert_sql(false),
            "INSERT INTO book (title, pages) VALUES (?1, ?2) RETURNING id;"
        );
        assert_eq!(
            BOOK.upsert_sql(),
            "INSERT INTO book (id, title, pages) VALUES (?1, ?2, ?3) ON CONFLICT(id) DO UPDATE SET title = excluded.title, pages = excluded.pages;"
        );
        assert_eq!(
            BOOK.create_table_sql(),
            "CREATE TABLE IF NOT EXISTS book (id INTEGER PRIMARY KEY AUTOINCREMENT, title TEXT NOT NULL, pages INTEGER);"
        );
    }

    #[test]
    fn field_lookup_includes_key() {
        assert_eq!(BOOK.field("id"), Some((ColumnKind::Integer, false)));
        assert_eq!(BOOK.field("pages"), Some((ColumnKind::Integer, true)));
        assert_eq!(BOOK.field("author"), None);
    }

    #[test]
    fn validate_rejects_injection_in_identifiers() {
        let bad = EntityMapping {
            table: "book; DROP TABLE book",
            ..BOOK
        };
        assert!(matches!(bad.validate(), Err(DbError::InvalidIdentifier(_))));
        BOOK.validate().unwrap();
    }

    #[test]
    fn validate_rejects_text_generated_key() {
        let bad = EntityMapping {
            key: KeyColumn {
                field: "code",
                kind: ColumnKind::Text,
                generated: true,
            },
            ..BOOK
        };
        assert!(matches!(bad.validate(), Err(DbError::InvalidMapping { .. })));
    }

    #[test]
    fn field_value_conversions() {
        assert_eq!(FieldValue::from("a"), FieldValue::Text("a".to_string()));
        assert_eq!(FieldValue::from(7_i32), FieldValue::Integer(7));
        assert_eq!(FieldValue::from(None::<i64>), FieldValue::Null);
        assert_eq!(FieldValue::from(Some("b")).kind(), Some(ColumnKind::Text));
    }
}

//! Example entity: a car record.
//!
//! # Invariants
//! - `id` is `None` until the car is persisted; the database assigns it.
//! - `brand` and `model` are required; the other attributes are optional.

use crate::mapping::{Column, ColumnKind, Entity, EntityMapping, FieldValue, KeyColumn};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Database-assigned car identifier.
pub type CarId = i64;

static CAR_MAPPING: EntityMapping = EntityMapping {
    name: "Car",
    table: "car",
    key: KeyColumn {
        field: "id",
        kind: ColumnKind::Integer,
        generated: true,
    },
    columns: &[
        Column::text("brand"),
        Column::text("model"),
        Column::integer("manufacture_year").nullable(),
        Column::integer("model_year").nullable(),
        Column::text("comments").nullable(),
    ],
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Car {
    pub id: Option<CarId>,
    pub brand: String,
    pub model: String,
    pub manufacture_year: Option<i32>,
    pub model_year: Option<i32>,
    pub comments: Option<String>,
}

impl Car {
    /// Creates an unsaved car with only the required attributes.
    pub fn new(brand: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            brand: brand.into(),
            model: model.into(),
            ..Self::default()
        }
    }
}

impl Entity for Car {
    type Key = CarId;

    fn mapping() -> &'static EntityMapping {
        &CAR_MAPPING
    }

    fn key(&self) -> Option<CarId> {
        self.id
    }

    fn set_key(&mut self, key: CarId) {
        self.id = Some(key);
    }

    fn values(&self) -> Vec<FieldValue> {
        vec![
            FieldValue::from(self.brand.as_str()),
            FieldValue::from(self.model.as_str()),
            FieldValue::from(self.manufacture_year),
            FieldValue::from(self.model_year),
            FieldValue::from(self.comments.as_deref()),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get("id")?),
            brand: row.get("brand")?,
            model: row.get("model")?,
            manufacture_year: row.get("manufacture_year")?,
            model_year: row.get("model_year")?,
            comments: row.get("comments")?,
        })
    }
}

impl Display for Car {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::Car;
    use crate::mapping::{Entity, FieldValue};

    #[test]
    fn values_follow_mapping_column_order() {
        let mut car = Car::new("Volvo", "xpto");
        car.model_year = Some(2018);

        let values = car.values();
        assert_eq!(values.len(), Car::mapping().columns.len());
        assert_eq!(values[0], FieldValue::Text("Volvo".to_string()));
        assert_eq!(values[2], FieldValue::Null);
        assert_eq!(values[3], FieldValue::Integer(2018));
        Car::mapping().validate().unwrap();
    }

    #[test]
    fn display_uses_key_or_new_marker() {
        let mut car = Car::new("Volvo", "xpto");
        assert_eq!(car.to_string(), "Car - [new]");
        car.set_key(7);
        assert_eq!(car.to_string(), "Car - [7]");
    }
}

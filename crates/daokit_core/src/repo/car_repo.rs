//! Car repository: generic operations plus car-specific queries.

use crate::mapping::criteria::Criteria;
use crate::mapping::FieldValue;
use crate::model::car::{Car, CarId};
use crate::repo::error::{Action, PersistenceResult};
use crate::repo::generic_repo::{GenericRepository, Repository};
use crate::session::SessionFactory;
use std::sync::Arc;

/// Repository for `Car`, composing `GenericRepository<Car>`.
#[derive(Clone)]
pub struct CarRepository {
    inner: GenericRepository<Car>,
}

impl CarRepository {
    pub fn new(factory: Arc<SessionFactory>) -> Self {
        Self {
            inner: GenericRepository::new(factory),
        }
    }

    /// Returns cars whose model and brand both match exactly.
    pub fn find_by_model_and_brand(&self, model: &str, brand: &str) -> PersistenceResult<Vec<Car>> {
        let criteria = Criteria::new()
            .and_equals("model", model)
            .and_equals("brand", brand);
        self.inner.execute(
            Action::Custom("FindByModelAndBrand"),
            format!("model={model} brand={brand}"),
            |session| session.find_by_criteria::<Car>(&criteria),
        )
    }
}

impl Repository<Car> for CarRepository {
    fn find(&self, key: &CarId) -> PersistenceResult<Option<Car>> {
        self.inner.find(key)
    }

    fn find_all(&self) -> PersistenceResult<Vec<Car>> {
        self.inner.find_all()
    }

    fn find_by_attribute(&self, field: &str, value: FieldValue) -> PersistenceResult<Vec<Car>> {
        self.inner.find_by_attribute(field, value)
    }

    fn find_by_attribute_like(&self, field: &str, needle: &str) -> PersistenceResult<Vec<Car>> {
        self.inner.find_by_attribute_like(field, needle)
    }

    fn persist(&self, entity: &mut Car) -> PersistenceResult<()> {
        self.inner.persist(entity)
    }

    fn merge(&self, entity: &Car) -> PersistenceResult<Car> {
        self.inner.merge(entity)
    }

    fn remove(&self, entity: &Car) -> PersistenceResult<()> {
        self.inner.remove(entity)
    }

    fn detach(&self, entity: &Car) -> PersistenceResult<()> {
        self.inner.detach(entity)
    }

    fn refresh(&self, entity: &mut Car) -> PersistenceResult<()> {
        self.inner.refresh(entity)
    }
}

//! Session factory: one per persistence unit, shared for the process lifetime.
//!
//! # Responsibility
//! - Resolve a unit by name, open its pool and generate its schema.
//! - Hand out one new `SessionManager` per unit of work.
//!
//! # Invariants
//! - A factory that was built successfully can open sessions until `close`.
//! - Construction fails outright on any configuration or connection error.
//! - The pool is the only shared mutable state; it is safe to request
//!   sessions from several threads at once.

use super::error::SessionError;
use super::manager::SessionManager;
use crate::config::{ConfigError, ConfigResult, PersistenceConfig, PersistenceUnit};
use crate::db::schema::apply_schema;
use crate::db::{open_pool, DbPool};
use crate::mapping::{Entity, EntityMapping};
use log::{error, info, warn};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Builder collecting entity mappings before a unit is opened.
pub struct SessionFactoryBuilder<'a> {
    config: &'a PersistenceConfig,
    mappings: Vec<&'static EntityMapping>,
}

impl<'a> SessionFactoryBuilder<'a> {
    /// Registers the mapping of entity type `E`.
    pub fn map<E: Entity>(self) -> Self {
        self.map_mapping(E::mapping())
    }

    /// Registers a mapping directly.
    pub fn map_mapping(mut self, mapping: &'static EntityMapping) -> Self {
        if !self
            .mappings
            .iter()
            .any(|registered| registered.name == mapping.name)
        {
            self.mappings.push(mapping);
        }
        self
    }

    /// Resolves `unit_name`, opens its pool and applies schema generation.
    ///
    /// # Errors
    /// - `ConfigError::UnknownUnit` when no unit has that name.
    /// - `ConfigError::UnmappedEntity` when the unit lists an unregistered entity.
    /// - `ConfigError::Pool` / `ConfigError::Db` when the database cannot be
    ///   opened or the schema cannot be created.
    pub fn build(self, unit_name: &str) -> ConfigResult<SessionFactory> {
        let started_at = Instant::now();
        match self.try_build(unit_name) {
            Ok(factory) => {
                info!(
                    "event=factory_open module=session status=ok unit={} entities={} duration_ms={}",
                    unit_name,
                    factory.mapped.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(factory)
            }
            Err(err) => {
                error!(
                    "event=factory_open module=session status=error unit={} duration_ms={} error={}",
                    unit_name,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    fn try_build(self, unit_name: &str) -> ConfigResult<SessionFactory> {
        let unit = self.config.resolve(unit_name)?.clone();
        unit.validate()?;

        for mapping in &self.mappings {
            mapping.validate()?;
        }
        let managed = managed_mappings(&unit, &self.mappings)?;

        let pool = open_pool(&unit)?;
        {
            let mut conn = pool.get()?;
            apply_schema(&mut conn, &managed, unit.schema_generation)?;
        }

        let mapped = managed.iter().map(|mapping| mapping.name).collect();
        Ok(SessionFactory {
            unit_name: Arc::from(unit.name.as_str()),
            unit,
            pool: Mutex::new(Some(pool)),
            mapped: Arc::new(mapped),
            open_sessions: Arc::new(AtomicUsize::new(0)),
        })
    }
}

fn managed_mappings(
    unit: &PersistenceUnit,
    registered: &[&'static EntityMapping],
) -> ConfigResult<Vec<&'static EntityMapping>> {
    if unit.entities.is_empty() {
        return Ok(registered.to_vec());
    }

    let mut managed = Vec::with_capacity(unit.entities.len());
    for name in &unit.entities {
        let mapping = registered
            .iter()
            .find(|mapping| mapping.name == name.as_str())
            .ok_or_else(|| ConfigError::UnmappedEntity {
                unit: unit.name.clone(),
                entity: name.clone(),
            })?;
        managed.push(*mapping);
    }

    for mapping in registered {
        if !unit.entities.iter().any(|name| name == mapping.name) {
            warn!(
                "event=factory_open module=session status=skipped unit={} entity={} reason=not_listed_in_unit",
                unit.name, mapping.name
            );
        }
    }
    Ok(managed)
}

/// Creates sessions for one persistence unit.
pub struct SessionFactory {
    unit: PersistenceUnit,
    unit_name: Arc<str>,
    pool: Mutex<Option<DbPool>>,
    mapped: Arc<BTreeSet<&'static str>>,
    open_sessions: Arc<AtomicUsize>,
}

impl SessionFactory {
    /// Starts building a factory over units from `config`.
    pub fn builder(config: &PersistenceConfig) -> SessionFactoryBuilder<'_> {
        SessionFactoryBuilder {
            config,
            mappings: Vec::new(),
        }
    }

    /// Opens a new session bound to one pooled connection.
    pub fn session_manager(&self) -> Result<SessionManager, SessionError> {
        let pool = self.lock_pool().clone().ok_or_else(|| {
            warn!(
                "event=session_open module=session status=error unit={} error_code=factory_closed",
                self.unit_name
            );
            SessionError::FactoryClosed
        })?;

        let conn = pool.get().map_err(|err| {
            error!(
                "event=session_open module=session status=error unit={} error_code=pool_timeout error={}",
                self.unit_name, err
            );
            SessionError::Pool(err)
        })?;

        Ok(SessionManager::new(
            Arc::clone(&self.unit_name),
            conn,
            Arc::clone(&self.mapped),
            Arc::clone(&self.open_sessions),
        ))
    }

    /// Releases the pool. Later `session_manager` calls fail; repeated
    /// calls are no-ops. Sessions still open keep their connection until
    /// they are released.
    pub fn close(&self) {
        if self.lock_pool().take().is_some() {
            info!(
                "event=factory_close module=session status=ok unit={} open_sessions={}",
                self.unit_name,
                self.open_sessions()
            );
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock_pool().is_none()
    }

    /// The resolved persistence unit.
    pub fn unit(&self) -> &PersistenceUnit {
        &self.unit
    }

    /// Number of sessions handed out and not yet released.
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }

    /// Whether entity type `E` is managed by this factory's unit.
    pub fn is_mapped<E: Entity>(&self) -> bool {
        self.mapped.contains(E::mapping().name)
    }

    fn lock_pool(&self) -> MutexGuard<'_, Option<DbPool>> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::SessionFactory;
    use crate::config::{ConfigError, PersistenceConfig, PersistenceUnit};
    use crate::model::car::Car;
    use crate::session::SessionError;

    fn config() -> PersistenceConfig {
        PersistenceConfig::single(PersistenceUnit::in_memory("test"))
    }

    #[test]
    fn unknown_unit_fails_construction() {
        let config = config();
        let err = SessionFactory::builder(&config)
            .map::<Car>()
            .build("nope")
            .err()
            .expect("unknown unit must fail");
        assert!(matches!(err, ConfigError::UnknownUnit(name) if name == "nope"));
    }

    #[test]
    fn listed_but_unregistered_entity_fails_construction() {
        let config = PersistenceConfig::single(
            PersistenceUnit::in_memory("test").with_entities(["Car", "Truck"]),
        );
        let err = SessionFactory::builder(&config)
            .map::<Car>()
            .build("test")
            .err()
            .expect("unregistered entity must fail");
        assert!(matches!(err, ConfigError::UnmappedEntity { entity, .. } if entity == "Truck"));
    }

    #[test]
    fn sessions_are_counted_until_released() {
        let config = config();
        let factory = SessionFactory::builder(&config)
            .map::<Car>()
            .build("test")
            .unwrap();
        assert!(factory.is_mapped::<Car>());

        let session = factory.session_manager().unwrap();
        assert_eq!(factory.open_sessions(), 1);
        session.close();
        assert_eq!(factory.open_sessions(), 0);

        {
            let _dropped = factory.session_manager().unwrap();
            assert_eq!(factory.open_sessions(), 1);
        }
        assert_eq!(factory.open_sessions(), 0);
    }

    #[test]
    fn closed_factory_refuses_sessions() {
        let config = config();
        let factory = SessionFactory::builder(&config)
            .map::<Car>()
            .build("test")
            .unwrap();
        factory.close();
        factory.close();

        assert!(factory.is_closed());
        assert!(matches!(
            factory.session_manager(),
            Err(SessionError::FactoryClosed)
        ));
    }
}

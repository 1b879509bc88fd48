use daokit_core::{
    Car, CarRepository, ConfigError, PersistenceConfig, PersistenceUnit, PoolSettings, RepoError,
    Repository, SchemaGeneration, SessionFactory,
};
use std::sync::Arc;
use std::thread;

fn build(config: &PersistenceConfig, unit: &str) -> Result<SessionFactory, ConfigError> {
    SessionFactory::builder(config).map::<Car>().build(unit)
}

#[test]
fn factory_opens_unit_loaded_from_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("cars.sqlite3");
    let config_path = dir.path().join("persistence.json");
    let document = serde_json::json!({
        "units": [
            { "name": "memory", "url": ":memory:" },
            {
                "name": "disk",
                "url": db_path.to_str().unwrap(),
                "entities": ["Car"],
                "schema_generation": "create",
                "pool": { "max_size": 2 }
            }
        ]
    });
    std::fs::write(&config_path, document.to_string()).unwrap();

    let config = PersistenceConfig::load(&config_path).unwrap();
    let factory = Arc::new(build(&config, "disk").unwrap());
    assert_eq!(factory.unit().name, "disk");
    assert_eq!(factory.unit().pool.max_size, 2);

    let repo = CarRepository::new(Arc::clone(&factory));
    let mut car = Car::new("Volvo", "xpto");
    repo.persist(&mut car).unwrap();
    assert!(db_path.exists());
}

#[test]
fn unknown_unit_and_bad_documents_fail_construction() {
    let config = PersistenceConfig::single(PersistenceUnit::in_memory("default"));
    assert!(matches!(
        build(&config, "missing"),
        Err(ConfigError::UnknownUnit(name)) if name == "missing"
    ));

    let err = PersistenceConfig::from_json_str(r#"{"units": [{"name": "x"}]}"#).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));

    let err = PersistenceConfig::from_json_str(
        r#"{"units": [{"name": "x", "driver": "postgres", "url": "db"}]}"#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::UnsupportedDriver { .. }));

    let dir = tempfile::tempdir().unwrap();
    let err = PersistenceConfig::load(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn repository_on_unregistered_entity_fails_and_releases_session() {
    let config = PersistenceConfig::single(PersistenceUnit::in_memory("bare"));
    let factory = Arc::new(SessionFactory::builder(&config).build("bare").unwrap());
    assert!(!factory.is_mapped::<Car>());

    let repo = CarRepository::new(Arc::clone(&factory));
    let err = repo.find_all().unwrap_err();
    assert_eq!(err.entity(), "Car");
    assert!(matches!(err.cause(), RepoError::UnmappedEntity("Car")));
    assert_eq!(factory.open_sessions(), 0);
}

#[test]
fn unreachable_database_fails_construction() {
    let dir = tempfile::tempdir().unwrap();
    let unit = PersistenceUnit::file("broken", dir.path().join("no/such/dir/cars.sqlite3"))
        .with_pool(PoolSettings {
            max_size: 1,
            busy_timeout_ms: 50,
            connection_timeout_ms: 200,
        });
    let config = PersistenceConfig::single(unit);

    let err = build(&config, "broken").err().expect("open must fail");
    assert!(matches!(err, ConfigError::Pool(_)));
}

#[test]
fn schema_generation_controls_existing_rows() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("cars.sqlite3");

    let open = |action: SchemaGeneration| {
        let config = PersistenceConfig::single(
            PersistenceUnit::file("disk", &db_path).with_schema_generation(action),
        );
        Arc::new(build(&config, "disk").unwrap())
    };

    let factory = open(SchemaGeneration::Create);
    let repo = CarRepository::new(Arc::clone(&factory));
    repo.persist(&mut Car::new("Volvo", "kept")).unwrap();
    factory.close();
    drop(repo);

    let factory = open(SchemaGeneration::Create);
    let repo = CarRepository::new(Arc::clone(&factory));
    assert_eq!(repo.find_all().unwrap().len(), 1);
    factory.close();
    drop(repo);

    let factory = open(SchemaGeneration::None);
    let repo = CarRepository::new(Arc::clone(&factory));
    assert_eq!(repo.find_all().unwrap().len(), 1);
    factory.close();
    drop(repo);

    let factory = open(SchemaGeneration::DropAndCreate);
    let repo = CarRepository::new(Arc::clone(&factory));
    assert!(repo.find_all().unwrap().is_empty());
}

#[test]
fn concurrent_repository_calls_share_one_factory() {
    let dir = tempfile::tempdir().unwrap();
    let config = PersistenceConfig::single(
        PersistenceUnit::file("disk", dir.path().join("cars.sqlite3")).with_pool(PoolSettings {
            max_size: 4,
            busy_timeout_ms: 5_000,
            connection_timeout_ms: 5_000,
        }),
    );
    let factory = Arc::new(build(&config, "disk").unwrap());

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let repo = CarRepository::new(Arc::clone(&factory));
            thread::spawn(move || {
                for index in 0..10 {
                    let mut car = Car::new(format!("Brand{worker}"), format!("Model{index}"));
                    repo.persist(&mut car).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let repo = CarRepository::new(Arc::clone(&factory));
    assert_eq!(repo.find_all().unwrap().len(), 40);
    assert_eq!(
        repo.find_by_attribute("brand", "Brand2".into()).unwrap().len(),
        10
    );
    assert_eq!(factory.open_sessions(), 0);
}

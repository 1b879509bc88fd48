use daokit_core::{
    Car, CarRepository, FieldValue, PersistenceConfig, PersistenceUnit, QueryError, RepoError,
    Repository, SessionFactory,
};
use std::collections::HashSet;
use std::sync::Arc;

fn open_repo() -> (Arc<SessionFactory>, CarRepository) {
    let config = PersistenceConfig::single(PersistenceUnit::in_memory("test"));
    let factory = Arc::new(
        SessionFactory::builder(&config)
            .map::<Car>()
            .build("test")
            .unwrap(),
    );
    let repo = CarRepository::new(Arc::clone(&factory));
    (factory, repo)
}

fn car(brand: &str, model: &str, comments: &str) -> Car {
    let mut car = Car::new(brand, model);
    car.manufacture_year = Some(2017);
    car.model_year = Some(2017);
    car.comments = Some(comments.to_string());
    car
}

fn ids(cars: &[Car]) -> HashSet<i64> {
    cars.iter().filter_map(|car| car.id).collect()
}

#[test]
fn volvo_scenario_persist_find_merge_query_remove() {
    let (factory, repo) = open_repo();

    let mut volvo = car("Volvo", "xpto", "Car to realize tests.");
    repo.persist(&mut volvo).unwrap();
    let id = volvo.id.expect("persist should assign a key");

    let mut found = repo.find(&id).unwrap().unwrap();
    assert_eq!(found.model, "xpto");

    found.model = "jpa2us".to_string();
    let merged = repo.merge(&found).unwrap();
    assert_eq!(merged.model, "jpa2us");
    assert_eq!(repo.find(&id).unwrap().unwrap().model, "jpa2us");

    let by_brand = repo.find_by_attribute("brand", "Volvo".into()).unwrap();
    assert!(!by_brand.is_empty());
    assert!(by_brand.iter().any(|car| car.id == Some(id)));

    let by_comment = repo.find_by_attribute_like("comments", "realize").unwrap();
    assert_eq!(by_comment[0].brand, "Volvo");

    repo.remove(&by_comment[0]).unwrap();
    assert!(repo.find(&id).unwrap().is_none());
    assert_eq!(factory.open_sessions(), 0);
}

#[test]
fn persisted_car_is_found_with_equal_attributes() {
    let (_factory, repo) = open_repo();

    let mut saab = car("Saab", "900", "classic");
    saab.model_year = None;
    repo.persist(&mut saab).unwrap();

    let loaded = repo.find(&saab.id.unwrap()).unwrap().unwrap();
    assert_eq!(loaded, saab);
}

#[test]
fn find_missing_key_returns_none() {
    let (_factory, repo) = open_repo();
    assert!(repo.find(&4242).unwrap().is_none());
}

#[test]
fn find_all_returns_every_car_in_key_order() {
    let (_factory, repo) = open_repo();
    let mut first = car("Fiat", "Uno", "a");
    let mut second = car("Fiat", "Palio", "b");
    repo.persist(&mut first).unwrap();
    repo.persist(&mut second).unwrap();

    let all = repo.find_all().unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, first.id);
    assert_eq!(all[1].id, second.id);
}

#[test]
fn find_by_attribute_returns_exactly_the_matching_set() {
    let (_factory, repo) = open_repo();
    let mut matching = Vec::new();
    for model in ["240", "740", "940"] {
        let mut volvo = car("Volvo", model, "sweden");
        repo.persist(&mut volvo).unwrap();
        matching.push(volvo);
    }
    let mut other = car("volvo", "lowercase", "sweden");
    repo.persist(&mut other).unwrap();
    let mut fiat = car("Fiat", "Uno", "italy");
    repo.persist(&mut fiat).unwrap();

    let found = repo.find_by_attribute("brand", "Volvo".into()).unwrap();
    assert_eq!(ids(&found), ids(&matching));

    let by_year = repo
        .find_by_attribute("manufacture_year", FieldValue::from(2017))
        .unwrap();
    assert_eq!(by_year.len(), 5);
}

#[test]
fn find_by_attribute_null_matches_missing_values() {
    let (_factory, repo) = open_repo();
    let mut bare = Car::new("Lada", "Niva");
    repo.persist(&mut bare).unwrap();
    let mut full = car("Lada", "Samara", "notes");
    repo.persist(&mut full).unwrap();

    let found = repo
        .find_by_attribute("comments", FieldValue::Null)
        .unwrap();
    assert_eq!(ids(&found), ids(&[bare]));
}

#[test]
fn find_by_attribute_like_matches_substrings_only() {
    let (_factory, repo) = open_repo();
    let mut a = car("Volvo", "a", "used for tests");
    let mut b = car("Volvo", "b", "testing rig");
    let mut c = car("Volvo", "c", "showroom");
    let mut d = car("Volvo", "d", "100% test_drive");
    for entity in [&mut a, &mut b, &mut c, &mut d] {
        repo.persist(entity).unwrap();
    }

    let found = repo.find_by_attribute_like("comments", "test").unwrap();
    assert_eq!(ids(&found), ids(&[a.clone(), b.clone(), d.clone()]));

    let wildcard = repo.find_by_attribute_like("comments", "%").unwrap();
    assert_eq!(ids(&wildcard), ids(&[d.clone()]));

    let underscore = repo.find_by_attribute_like("comments", "t_d").unwrap();
    assert_eq!(ids(&underscore), ids(&[d]));
}

#[test]
fn find_by_attribute_like_ignores_ascii_case() {
    let (_factory, repo) = open_repo();
    let mut lower = car("Volvo", "a", "used for tests");
    let mut upper = car("Volvo", "b", "TESTED twice");
    let mut other = car("Volvo", "c", "showroom");
    for entity in [&mut lower, &mut upper, &mut other] {
        repo.persist(entity).unwrap();
    }

    let found = repo.find_by_attribute_like("comments", "TEST").unwrap();
    assert_eq!(ids(&found), ids(&[lower, upper]));

    let exact = repo.find_by_attribute("comments", "tested twice".into()).unwrap();
    assert!(exact.is_empty());
}

#[test]
fn query_on_unknown_or_non_text_field_fails_with_context() {
    let (factory, repo) = open_repo();

    let err = repo.find_by_attribute("color", "red".into()).unwrap_err();
    assert_eq!(err.entity(), "Car");
    assert_eq!(err.object(), "color=red");
    assert!(matches!(
        err.cause(),
        RepoError::Query(QueryError::UnknownField { .. })
    ));

    let err = repo
        .find_by_attribute_like("manufacture_year", "20")
        .unwrap_err();
    assert!(matches!(
        err.cause(),
        RepoError::Query(QueryError::NotTextField { .. })
    ));
    assert_eq!(factory.open_sessions(), 0);
}

#[test]
fn merge_without_key_inserts_and_returns_stored_copy() {
    let (_factory, repo) = open_repo();
    let fresh = car("Kia", "Rio", "merged");

    let stored = repo.merge(&fresh).unwrap();
    assert!(stored.id.is_some());
    assert_eq!(stored.model, "Rio");
    assert_eq!(repo.find_all().unwrap().len(), 1);
}

#[test]
fn merge_with_unknown_key_inserts_under_that_key() {
    let (_factory, repo) = open_repo();
    let mut explicit = car("Seat", "Ibiza", "explicit");
    explicit.id = Some(77);

    let stored = repo.merge(&explicit).unwrap();
    assert_eq!(stored.id, Some(77));
    assert_eq!(repo.find(&77).unwrap().unwrap().brand, "Seat");
}

#[test]
fn remove_of_missing_row_is_noop_and_remove_without_key_fails() {
    let (_factory, repo) = open_repo();
    let mut ghost = car("Ghost", "none", "never stored");
    ghost.id = Some(999);
    repo.remove(&ghost).unwrap();

    let unsaved = car("Ghost", "unsaved", "no key");
    let err = repo.remove(&unsaved).unwrap_err();
    assert!(matches!(err.cause(), RepoError::MissingKey("Car")));
    assert_eq!(err.to_string(), "[ERROR] EntityClass: Car | Action: Remove | Object: Car - [new]");
}

#[test]
fn refresh_reloads_values_and_fails_for_removed_rows() {
    let (_factory, repo) = open_repo();
    let mut stored = car("Opel", "Corsa", "original");
    repo.persist(&mut stored).unwrap();

    let mut stale = stored.clone();
    stale.comments = Some("local edit".to_string());
    repo.refresh(&mut stale).unwrap();
    assert_eq!(stale.comments.as_deref(), Some("original"));

    repo.remove(&stored).unwrap();
    let err = repo.refresh(&mut stale).unwrap_err();
    assert!(matches!(err.cause(), RepoError::NotFound(_)));
}

#[test]
fn detach_leaves_stored_row_untouched() {
    let (factory, repo) = open_repo();
    let mut stored = car("Audi", "A3", "detach me");
    repo.persist(&mut stored).unwrap();

    repo.detach(&stored).unwrap();
    repo.detach(&Car::new("Audi", "unsaved")).unwrap();
    assert_eq!(repo.find(&stored.id.unwrap()).unwrap(), Some(stored));
    assert_eq!(repo.find_all().unwrap().len(), 1);
    assert_eq!(factory.open_sessions(), 0);
}

#[test]
fn find_by_model_and_brand_requires_both_fields_to_match() {
    let (_factory, repo) = open_repo();
    let mut target = car("Volvo", "xc90", "target");
    let mut same_model = car("Skoda", "xc90", "same model");
    let mut same_brand = car("Volvo", "v40", "same brand");
    for entity in [&mut target, &mut same_model, &mut same_brand] {
        repo.persist(entity).unwrap();
    }

    let found = repo.find_by_model_and_brand("xc90", "Volvo").unwrap();
    assert_eq!(ids(&found), ids(&[target]));
    assert!(repo.find_by_model_and_brand("v40", "Skoda").unwrap().is_empty());
}

//! CLI entry point running the car walkthrough against one persistence unit.
//!
//! # Responsibility
//! - Load a persistence config, or fall back to a private in-memory unit.
//! - Exercise every repository operation once and print each result.
//! - Report failures with their full cause chain and a non-zero exit code.

use clap::Parser;
use daokit_core::{
    core_version, default_log_level, init_logging, Car, CarRepository, FieldValue,
    PersistenceConfig, PersistenceUnit, Repository, SessionFactory,
};
use log::info;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "daokit", version, about = "Run the car repository walkthrough")]
struct Args {
    /// JSON persistence config. Without it an in-memory unit is used.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Persistence unit to open.
    #[arg(long, default_value = "default")]
    unit: String,

    /// trace | debug | info | warn | error
    #[arg(long)]
    log_level: Option<String>,

    /// Absolute directory for rotating log files. Logs go to stderr otherwise.
    #[arg(long)]
    log_dir: Option<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = args.log_level.as_deref().unwrap_or(default_log_level());
    if let Err(err) = init_logging(level, args.log_dir.as_deref()) {
        eprintln!("logging disabled: {err}");
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(err.as_ref());
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let config = match &args.config {
        Some(path) => PersistenceConfig::load(path)?,
        None => PersistenceConfig::single(PersistenceUnit::in_memory(args.unit.as_str())),
    };
    info!(
        "event=cli_start module=cli status=ok unit={} version={}",
        args.unit,
        core_version()
    );

    let factory = Arc::new(
        SessionFactory::builder(&config)
            .map::<Car>()
            .build(&args.unit)?,
    );
    let repo = CarRepository::new(Arc::clone(&factory));

    let mut car = Car {
        manufacture_year: Some(2017),
        model_year: Some(2017),
        comments: Some("Car to realize tests in daokit.".to_string()),
        ..Car::new("Volvo", "xpto")
    };
    repo.persist(&mut car)?;
    println!("persist: {car}");

    let id = car.id.ok_or("persisted car has no id")?;
    let mut found = repo.find(&id)?.ok_or("persisted car not found")?;
    println!("find: {found} model={}", found.model);

    found.model = "jpa2us".to_string();
    let merged = repo.merge(&found)?;
    println!("merge: {merged} model={}", merged.model);

    let by_brand = repo.find_by_attribute("brand", FieldValue::from("Volvo"))?;
    println!("find_by_attribute brand=Volvo: {} match(es)", by_brand.len());

    let by_comment = repo.find_by_attribute_like("comments", "realize")?;
    println!(
        "find_by_attribute_like comments~realize: {} match(es)",
        by_comment.len()
    );

    let by_model = repo.find_by_model_and_brand("jpa2us", "Volvo")?;
    println!("find_by_model_and_brand: {} match(es)", by_model.len());

    repo.refresh(&mut found)?;
    repo.detach(&found)?;
    repo.remove(&found)?;
    println!("remove: {found}");

    let gone = repo.find(&id)?;
    println!("find after remove: {}", if gone.is_some() { "present" } else { "absent" });

    factory.close();
    Ok(())
}

fn report(err: &dyn Error) {
    eprintln!("error: {err}");
    let mut source = err.source();
    while let Some(cause) = source {
        eprintln!("  caused by: {cause}");
        source = cause.source();
    }
}

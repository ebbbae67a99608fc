//! Contacts walkthrough
//!
//! Declares a `contacts` store, opens it at version 1 or 2, writes a few
//! records and reads them back through projections.
//!
//! ```text
//! contacts                      # in memory, version 2
//! contacts --path ./data -s 1   # persisted, version 1
//! RUST_LOG=debug contacts -v    # engine and upgrade logging
//! ```

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use tessera_core::{
    Database, Engine, FieldType, IndexDef, ObjectSchema, ObjectStoreBuilder, Shape, Value,
};
use tracing_subscriber::EnvFilter;

/// Tessera contacts walkthrough.
#[derive(Parser)]
#[command(name = "contacts")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory to persist the database in (in memory if omitted)
    #[arg(short, long)]
    path: Option<PathBuf>,

    /// Schema version to open (1 or 2)
    #[arg(short, long, default_value = "2")]
    schema_version: u64,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Deserialize)]
struct Card {
    name: String,
    email: String,
}

fn contacts_store() -> tessera_core::CoreResult<ObjectStoreBuilder> {
    let schema = ObjectSchema::new()
        .field("id", FieldType::String)
        .field("name", FieldType::String)
        .field("email", FieldType::String)
        .optional("phone", FieldType::String)
        .optional(
            "address",
            FieldType::Object(
                ObjectSchema::new()
                    .field("city", FieldType::String)
                    .optional("country", FieldType::String),
            ),
        );
    ObjectStoreBuilder::new("contacts", schema, "id")?.add_index("by_email", "email")
}

fn declare(engine: Engine, version: u64) -> tessera_core::CoreResult<Database> {
    Database::builder("addressbook", version)
        .store(contacts_store()?)
        .handler(1, "create_contacts", |ctx| ctx.create_store("contacts"))
        .handler(2, "create_contacts", |ctx| {
            if !ctx.has_store("contacts") {
                ctx.create_store("contacts")?;
            }
            Ok(())
        })
        .handler(2, "unique_email", |ctx| {
            ctx.delete_index("contacts", "by_email")?;
            ctx.create_index("contacts", IndexDef::new("by_email", "email").unique(true))
        })
        .build(engine)
}

fn contact(id: &str, name: &str, email: &str, city: &str) -> Value {
    Value::object([
        ("id", Value::from(id)),
        ("name", Value::from(name)),
        ("email", Value::from(email)),
        ("address", Value::object([("city", city)])),
    ])
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose { "debug" } else { "info" })
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let engine = match &cli.path {
        Some(path) => {
            tracing::info!(path = %path.display(), "opening directory engine");
            Engine::open_dir(path)?
        }
        None => {
            tracing::info!("opening in-memory engine");
            Engine::in_memory()
        }
    };
    let db = declare(engine, cli.schema_version)?;
    db.connect()?;
    if let Some(upgrade) = db.last_upgrade() {
        println!(
            "upgraded {} -> {} ({} handler(s))",
            upgrade.old_version,
            upgrade.new_version,
            upgrade.applied_count()
        );
        for op in upgrade.operations() {
            println!("  {op:?}");
        }
    }

    let contacts = db.store("contacts")?;
    tracing::info!(store = contacts.name(), "writing sample contacts");
    for record in [
        contact("ada", "Ada Lovelace", "ada@example.com", "London"),
        contact("alan", "Alan Turing", "alan@example.com", "Wilmslow"),
        contact("grace", "Grace Hopper", "grace@example.com", "Arlington"),
    ] {
        contacts.put(&record)?;
    }
    println!("{} contact(s)", contacts.count()?);

    match contacts.insert(&Value::object([("id", "nobody")])) {
        Err(e) => println!("rejected: {e}"),
        Ok(key) => println!("unexpectedly stored {key}"),
    }

    let cards = contacts
        .builder()
        .select(Shape::new().include("name").include("email"))?;
    let cities = contacts.builder().select(
        Shape::new()
            .include("name")
            .nest("address", Shape::new().include("city")),
    )?;

    for key in ["ada", "grace", "linus"] {
        match contacts.get(key)? {
            Some(record) => {
                let card: Card = cards.extract_as(&record)?;
                let city = serde_json::Value::from(cities.extract_shape(&record)?);
                println!("{key}: {} <{}> {city}", card.name, card.email);
            }
            None => println!("{key}: not found (exists = {})", contacts.exists(key)?),
        }
    }

    let by_email = contacts.get_by_index("by_email", "alan@example.com")?;
    println!("by_email(alan@example.com): {} match(es)", by_email.len());

    let ada_only = cities.filter(&Value::object([("name", "Ada Lovelace")]))?;
    for key in ["ada", "alan"] {
        if let Some(record) = contacts.get(key)? {
            if let Some(hit) = ada_only.extract_shape(&record)? {
                println!("filter hit: {}", serde_json::Value::from(hit));
            }
        }
    }

    db.close();
    tracing::info!("walkthrough finished");
    Ok(())
}

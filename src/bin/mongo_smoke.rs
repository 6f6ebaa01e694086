use anyhow::{Context, Result, bail};
use clap::Parser;
use mongo_adapter::bson::Bson;
use mongo_adapter::bson::oid::ObjectId;
use mongo_adapter::{
    AdapterConfig, Collection, Database, InMemoryAdapter, MongoDbAdapter, RecordKey,
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mongo-smoke")]
#[command(about = "Run insert, get, update and a rolled-back transaction against a database")]
struct Cli {
    /// Connection string. Transactions need a replica set.
    #[arg(long, env = "MONGODB_URI")]
    uri: Option<String>,

    /// Database name, overriding the one in the URI
    #[arg(long, env = "MONGODB_DATABASE")]
    database: Option<String>,

    /// Run against the in-memory adapter instead of a server
    #[arg(long)]
    in_memory: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct Foo {
    id: String,
    foo: String,
}

#[derive(Serialize)]
struct FooPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    foo: Option<String>,
}

enum FooKey {
    Id(String),
}

impl RecordKey for FooKey {
    fn field(&self) -> &str {
        match self {
            FooKey::Id(_) => "id",
        }
    }

    fn value(&self) -> Bson {
        match self {
            FooKey::Id(id) => Bson::String(id.clone()),
        }
    }
}

struct FooCollection;

impl Collection for FooCollection {
    const NAME: &'static str = "fooCollection";
    type Record = Foo;
    type Patch = FooPatch;
    type Key = FooKey;
}

fn report<T: Serialize>(step: &str, value: &T) -> Result<()> {
    let json = serde_json::to_string(value).context("failed to encode step result")?;
    println!("{step}: {json}");
    Ok(())
}

async fn run(db: &mut impl Database) -> Result<()> {
    let created = db
        .insert_one::<FooCollection>(&Foo {
            id: ObjectId::new().to_hex(),
            foo: "foo".to_string(),
        })
        .await?
        .context("insert returned nothing")?;
    report("created", &created)?;

    let key = FooKey::Id(created.id.clone());

    let found = db.get_one::<FooCollection>(&key).await?;
    report("found", &found)?;

    let updated = db
        .update_one::<FooCollection>(
            &key,
            &FooPatch {
                foo: Some("bar".to_string()),
            },
        )
        .await?;
    report("updated", &updated)?;

    let discarded_id = ObjectId::new().to_hex();
    db.start_transaction().await?;
    let staged = db
        .insert_one::<FooCollection>(&Foo {
            id: discarded_id.clone(),
            foo: "doNotInsertThis".to_string(),
        })
        .await;
    db.rollback().await?;
    report("staged", &staged?)?;

    let after_rollback = db
        .get_one::<FooCollection>(&FooKey::Id(discarded_id))
        .await?;
    report("after_rollback", &after_rollback)?;
    if after_rollback.is_some() {
        bail!("rolled-back insert is visible");
    }

    Ok(())
}

async fn run_with_connection(db: &mut impl Database) -> Result<()> {
    db.connect().await?;
    let outcome = run(db).await;
    db.disconnect().await?;
    outcome?;

    report("connected", &db.is_connected())?;
    report("in_transaction", &db.in_transaction())?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.in_memory {
        let mut db = InMemoryAdapter::new();
        return run_with_connection(&mut db).await;
    }

    let Some(uri) = cli.uri else {
        bail!("no connection string: pass --uri, set MONGODB_URI, or use --in-memory");
    };
    let mut config = AdapterConfig::from_url(&uri)?;
    if let Some(database) = &cli.database {
        config = config.database(database);
    }

    let mut db = MongoDbAdapter::new(config);
    run_with_connection(&mut db).await
}

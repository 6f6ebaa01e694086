mod common;

use common::*;
use mongo_adapter::{
    Database, DatabaseConnection, DatabaseGetOne, DatabaseInsertOne, DatabaseTransaction,
    DatabaseUpdateOne, DbError, InMemoryAdapter, MongoDbAdapter, Result,
};

// Business logic written against the capabilities only; it runs unchanged
// on the in-memory adapter and on MongoDB.
async fn register_user(db: &mut impl DatabaseInsertOne, id: i64, name: &str) -> Result<User> {
    let created = db.insert_one::<Users>(&user(id, name, 18)).await?;
    Ok(created.expect("insert returns the record"))
}

async fn birthday(
    db: &mut (impl DatabaseGetOne + DatabaseUpdateOne),
    id: i64,
) -> Result<Option<User>> {
    let Some(current) = db.get_one::<Users>(&UserKey::Id(id)).await? else {
        return Ok(None);
    };
    db.update_one::<Users>(
        &UserKey::Id(id),
        &UserPatch {
            age: Some(current.age + 1),
            ..Default::default()
        },
    )
    .await
}

// A unit of work: everything or nothing
async fn register_pair(db: &mut impl Database, a: &str, b: &str) -> Result<()> {
    db.start_transaction().await?;

    let outcome: Result<()> = async {
        register_user(db, 1, a).await?;
        if b.is_empty() {
            return Err(DbError::InvalidUpdate("second user has no name".into()));
        }
        register_user(db, 2, b).await?;
        Ok(())
    }
    .await;

    match outcome {
        Ok(()) => db.commit_transaction().await,
        Err(e) => {
            db.rollback().await?;
            Err(e)
        }
    }
}

#[tokio::test]
async fn test_generic_database_interface() -> Result<()> {
    let mut db = InMemoryAdapter::new();
    db.connect().await?;

    register_user(&mut db, 1, "Alice").await?;
    let older = birthday(&mut db, 1).await?.unwrap();
    assert_eq!(older.age, 19);

    assert_eq!(birthday(&mut db, 2).await?, None);

    db.disconnect().await?;
    assert!(!db.is_connected());
    Ok(())
}

#[tokio::test]
async fn test_unit_of_work_commits() -> Result<()> {
    let mut db = InMemoryAdapter::new();
    db.connect().await?;

    register_pair(&mut db, "Alice", "Bob").await?;
    assert!(!db.in_transaction());
    assert!(db.get_one::<Users>(&UserKey::Id(1)).await?.is_some());
    assert!(db.get_one::<Users>(&UserKey::Id(2)).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn test_unit_of_work_rolls_back() -> Result<()> {
    let mut db = InMemoryAdapter::new();
    db.connect().await?;

    assert!(register_pair(&mut db, "Alice", "").await.is_err());
    assert!(!db.in_transaction());
    assert_eq!(db.get_one::<Users>(&UserKey::Id(1)).await?, None);
    Ok(())
}

#[test]
fn test_both_adapters_implement_database() {
    fn assert_database<D: Database>() {}

    assert_database::<InMemoryAdapter>();
    assert_database::<MongoDbAdapter>();
}

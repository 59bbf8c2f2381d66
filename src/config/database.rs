//! Database configuration module.
//!
//! Handles connecting to `SQLite` or `PostgreSQL` through `SeaORM` and creating every
//! table from the entity definitions with `Schema::create_table_from_entity`, so the
//! database schema matches the Rust structs without hand-written SQL. Creation is
//! `IF NOT EXISTS`, so it is safe to run on every start.

use crate::entities::{Activity, Booking, Mentor, PointsHistory, Referral, User, referral};
use crate::errors::Result;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema,
    sea_query::{Index, TableCreateStatement},
};
use std::time::Duration;
use tracing::info;

/// Default `SQLite` file used when no `DATABASE_URL` is configured.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/pathfinder.sqlite?mode=rwc";

/// Opens a connection pool to `url` with at most `max_connections` connections.
pub async fn connect(url: &str, max_connections: u32) -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new(url.to_owned());
    options
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .sqlx_logging(false);

    let db = Database::connect(options).await?;
    info!("Connected to database ({:?})", db.get_database_backend());
    Ok(db)
}

/// Creates all tables and the composite referral index.
///
/// Tables are created parents-first so foreign keys resolve on `PostgreSQL`.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let tables: [TableCreateStatement; 6] = [
        table_for(&schema, User),
        table_for(&schema, Mentor),
        table_for(&schema, Referral),
        table_for(&schema, PointsHistory),
        table_for(&schema, Booking),
        table_for(&schema, Activity),
    ];
    for table in &tables {
        db.execute(builder.build(table)).await?;
    }

    let pair_index = Index::create()
        .name("idx-referrals-referrer-referred")
        .table(Referral)
        .col(referral::Column::ReferrerId)
        .col(referral::Column::ReferredId)
        .unique()
        .if_not_exists()
        .to_owned();
    db.execute(builder.build(&pair_index)).await?;

    Ok(())
}

fn table_for<E: EntityTrait>(schema: &Schema, entity: E) -> TableCreateStatement {
    let mut table = schema.create_table_from_entity(entity);
    table.if_not_exists();
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{
        ActivityModel, BookingModel, MentorModel, PointsHistoryModel, ReferralModel, UserModel,
    };
    use sea_orm::QuerySelect;

    #[tokio::test]
    async fn test_create_tables() -> Result<()> {
        let db = connect("sqlite::memory:", 1).await?;
        create_tables(&db).await?;

        // Test that tables exist by querying them
        let _: Vec<UserModel> = User::find().limit(1).all(&db).await?;
        let _: Vec<MentorModel> = Mentor::find().limit(1).all(&db).await?;
        let _: Vec<ReferralModel> = Referral::find().limit(1).all(&db).await?;
        let _: Vec<PointsHistoryModel> = PointsHistory::find().limit(1).all(&db).await?;
        let _: Vec<BookingModel> = Booking::find().limit(1).all(&db).await?;
        let _: Vec<ActivityModel> = Activity::find().limit(1).all(&db).await?;

        Ok(())
    }

    #[tokio::test]
    async fn test_create_tables_is_repeatable() -> Result<()> {
        let db = connect("sqlite::memory:", 1).await?;
        create_tables(&db).await?;
        create_tables(&db).await?;
        Ok(())
    }
}

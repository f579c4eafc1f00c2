use async_trait::async_trait;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr, Statement};
use uuid::Uuid;

use orchestrix_common::{Error, Result};

use crate::TenantGate;

pub mod alert;
pub mod audit;
pub mod definition;
pub mod execution;
pub mod metric;
pub mod rule;
pub mod workflow;

/// Maps a backend error into the shared taxonomy at the store boundary.
pub(crate) fn store_err(e: DbErr) -> Error {
    Error::Store(e.to_string())
}

/// Postgres-backed store implementing every driven port in this crate.
///
/// All methods are `async fn` over a shared SeaORM connection pool. Tenant
/// isolation is enforced by row-level-security policies keyed on the
/// `app.current_tenant_id` session variable (see [`TenantGate`]).
pub struct PgStore {
    db: DatabaseConnection,
}

impl PgStore {
    /// Connects and runs all pending migrations.
    pub async fn connect(url: &str) -> Result<Self> {
        let db = Database::connect(url).await.map_err(store_err)?;
        Migrator::up(&db, None).await.map_err(store_err)?;
        tracing::info!("connected to store and applied migrations");
        Ok(Self { db })
    }

    /// Wraps an existing connection without running migrations.
    pub fn from_connection(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub(crate) fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl TenantGate for PgStore {
    async fn bind(&self, tenant_id: Uuid) -> Result<()> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT set_config('app.current_tenant_id', $1, false)",
            [tenant_id.to_string().into()],
        );
        self.db.execute(stmt).await.map_err(store_err)?;
        Ok(())
    }
}

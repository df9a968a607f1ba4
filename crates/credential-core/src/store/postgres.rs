//! PostgreSQL credential store
//!
//! Every statement binds its arguments through `sqlx`; client ids and token
//! strings are never interpolated into query text. Schema lives in
//! `migrations/` and is applied with [`PgStore::migrate`].

use std::time::Duration;

use common::Secret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, info};

use super::{ClientRecord, CredentialStore, StoreError, StoreFuture};

#[derive(sqlx::FromRow)]
struct ClientRow {
    client_id: String,
    secret_digest: String,
    is_admin: bool,
}

impl From<ClientRow> for ClientRecord {
    fn from(row: ClientRow) -> Self {
        Self {
            client_id: row.client_id,
            secret_digest: row.secret_digest,
            is_admin: row.is_admin,
        }
    }
}

/// Store backed by a Postgres connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect a pool to `database_url`.
    ///
    /// `acquire_timeout` bounds how long any single operation waits for a
    /// connection before failing with `Unavailable`.
    pub async fn connect(
        database_url: &Secret<String>,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> super::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url.expose())
            .await
            .map_err(unavailable)?;
        info!(max_connections, "connected to postgres credential store");
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> super::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("running migrations: {e}")))?;
        Ok(())
    }
}

fn unavailable(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

impl CredentialStore for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    fn find_client<'a>(&'a self, client_id: &'a str) -> StoreFuture<'a, Option<ClientRecord>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, ClientRow>(
                "SELECT client_id, secret_digest, is_admin FROM clients WHERE client_id = $1",
            )
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;
            Ok(row.map(ClientRecord::from))
        })
    }

    fn insert_client(&self, client: ClientRecord) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let result = sqlx::query(
                "INSERT INTO clients (client_id, secret_digest, is_admin) VALUES ($1, $2, $3)",
            )
            .bind(&client.client_id)
            .bind(&client.secret_digest)
            .bind(client.is_admin)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => {
                    debug!(client_id = client.client_id, "inserted client");
                    Ok(())
                }
                Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                    Err(StoreError::Conflict)
                }
                Err(e) => Err(unavailable(e)),
            }
        })
    }

    fn insert_revocation<'a>(&'a self, token: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query("INSERT INTO revoked_tokens (token) VALUES ($1) ON CONFLICT DO NOTHING")
                .bind(token)
                .execute(&self.pool)
                .await
                .map_err(unavailable)?;
            Ok(())
        })
    }

    fn is_revoked<'a>(&'a self, token: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let revoked = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM revoked_tokens WHERE token = $1)",
            )
            .bind(token)
            .fetch_one(&self.pool)
            .await
            .map_err(unavailable)?;
            Ok(revoked)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_database_is_unavailable() {
        let url = Secret::new("postgres://user:pw@127.0.0.1:1/credentials".to_string());
        let result = PgStore::connect(&url, 1, Duration::from_millis(200)).await;
        let Err(StoreError::Unavailable(msg)) = result else {
            panic!("expected Unavailable for unreachable database");
        };
        assert!(!msg.contains("pw@"), "connection string must not leak: {msg}");
    }
}

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use switchboard_core::error::Result;
use switchboard_core::records::{ConnectionRecord, ConnectionUpdate};
use switchboard_core::traits::ConnectionStore;

use crate::store::{db_err, now, SqliteStore};

const CONNECTION_COLUMNS: &str = "id, organization_id, provider, access_token_secret_id,
    access_token_secret_created_at, refresh_token_secret_id, refresh_token_secret_created_at,
    expires_at, scope, profile_email";

impl SqliteStore {
    /// Store a complete connection record, replacing any existing one for the
    /// same organization and provider.
    pub fn insert_connection(&self, record: &ConnectionRecord) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM integration_connections WHERE organization_id = ?1 AND provider = ?2",
            params![record.organization_id, record.provider],
        )
        .map_err(db_err)?;
        write_connection(&conn, record)
    }
}

impl ConnectionStore for SqliteStore {
    fn get_connection(
        &self,
        organization_id: &str,
        provider: &str,
    ) -> BoxFuture<'_, Result<Option<ConnectionRecord>>> {
        let organization_id = organization_id.to_string();
        let provider = provider.to_string();
        Box::pin(async move {
            let conn = self.lock()?;
            read_connection(&conn, &organization_id, &provider)
        })
    }

    fn upsert_connection(
        &self,
        organization_id: &str,
        provider: &str,
        update: ConnectionUpdate,
    ) -> BoxFuture<'_, Result<ConnectionRecord>> {
        let organization_id = organization_id.to_string();
        let provider = provider.to_string();
        Box::pin(async move {
            let conn = self.lock()?;
            let existing = read_connection(&conn, &organization_id, &provider)?;
            let is_new = existing.is_none();
            let mut record = existing.unwrap_or_else(|| ConnectionRecord {
                id: uuid::Uuid::new_v4().to_string(),
                organization_id: organization_id.clone(),
                provider: provider.clone(),
                ..Default::default()
            });
            update.apply_to(&mut record);

            if is_new {
                write_connection(&conn, &record)?;
            } else {
                conn.execute(
                    "UPDATE integration_connections SET
                        access_token_secret_id = ?2,
                        access_token_secret_created_at = ?3,
                        refresh_token_secret_id = ?4,
                        refresh_token_secret_created_at = ?5,
                        expires_at = ?6,
                        scope = ?7,
                        profile_email = ?8,
                        updated_at = ?9
                     WHERE id = ?1",
                    params![
                        record.id,
                        record.access_token_secret_id,
                        ts(&record.access_token_secret_created_at),
                        record.refresh_token_secret_id,
                        ts(&record.refresh_token_secret_created_at),
                        ts(&record.expires_at),
                        record.scope,
                        record.profile_email,
                        now()
                    ],
                )
                .map_err(db_err)?;
            }

            debug!(
                organization_id = %organization_id,
                provider = %provider,
                created = is_new,
                "Connection record upserted"
            );
            Ok(record)
        })
    }
}

fn read_connection(
    conn: &Connection,
    organization_id: &str,
    provider: &str,
) -> Result<Option<ConnectionRecord>> {
    let sql = format!(
        "SELECT {} FROM integration_connections WHERE organization_id = ?1 AND provider = ?2",
        CONNECTION_COLUMNS
    );
    conn.query_row(&sql, params![organization_id, provider], connection_from_row)
        .optional()
        .map_err(db_err)
}

fn write_connection(conn: &Connection, record: &ConnectionRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO integration_connections (id, organization_id, provider,
            access_token_secret_id, access_token_secret_created_at, refresh_token_secret_id,
            refresh_token_secret_created_at, expires_at, scope, profile_email, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            record.id,
            record.organization_id,
            record.provider,
            record.access_token_secret_id,
            ts(&record.access_token_secret_created_at),
            record.refresh_token_secret_id,
            ts(&record.refresh_token_secret_created_at),
            ts(&record.expires_at),
            record.scope,
            record.profile_email,
            now()
        ],
    )
    .map_err(db_err)?;
    Ok(())
}

fn connection_from_row(row: &Row<'_>) -> rusqlite::Result<ConnectionRecord> {
    Ok(ConnectionRecord {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        provider: row.get(2)?,
        access_token_secret_id: row.get(3)?,
        access_token_secret_created_at: parse_ts(row.get(4)?),
        refresh_token_secret_id: row.get(5)?,
        refresh_token_secret_created_at: parse_ts(row.get(6)?),
        expires_at: parse_ts(row.get(7)?),
        scope: row.get(8)?,
        profile_email: row.get(9)?,
    })
}

fn ts(value: &Option<DateTime<Utc>>) -> Option<String> {
    value.map(|dt| dt.to_rfc3339())
}

fn parse_ts(text: Option<String>) -> Option<DateTime<Utc>> {
    text.and_then(|t| DateTime::parse_from_rfc3339(&t).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

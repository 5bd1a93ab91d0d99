//! Postgres storage
//!
//! Plain queries, no compile-time checking; the schema is ensured at
//! startup. The partial unique index on live aliases is what turns a
//! name collision into [`Error::DuplicateAlias`](super::Error).

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use chrono::Utc;
use sqlx::PgPool;
use sqlx::Row;
use sqlx::postgres::PgPoolOptions;
use sqlx::postgres::PgRow;
use sqlx::types::ipnetwork::IpNetwork;
use uuid::Uuid;

use crate::aliases::Alias;
use crate::links::DeletedBy;
use crate::links::ExpirationChange;
use crate::links::Link;
use crate::links::Owner;
use crate::organizations::Member;
use crate::organizations::Organization;
use crate::review::PendingLink;
use crate::review::ReviewStatus;
use crate::review::StatusChange;
use crate::visits::Visit;
use crate::visits::Visitor;

use super::AuditEntry;
use super::CreateLinkValues;
use super::CreatePendingValues;
use super::CreateVisitValues;
use super::Error;
use super::NewMemberValues;
use super::Result;
use super::StatusChangeValues;
use super::Storage;
use super::UpdateLinkValues;

/// Schema, applied in order at startup
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS links (
        id UUID PRIMARY KEY,
        title TEXT NOT NULL,
        destination TEXT NOT NULL,
        owner_kind TEXT NOT NULL,
        owner_name TEXT NOT NULL,
        visits BIGINT NOT NULL DEFAULT 0,
        unique_visits BIGINT NOT NULL DEFAULT 0,
        created_at TIMESTAMP NOT NULL,
        expires_at TIMESTAMP,
        deleted_at TIMESTAMP,
        deleted_by_kind TEXT,
        deleted_by_name TEXT
    )",
    "CREATE TABLE IF NOT EXISTS aliases (
        link_id UUID NOT NULL REFERENCES links (id),
        alias TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        deleted_at TIMESTAMP,
        PRIMARY KEY (link_id, alias)
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS aliases_live_alias_key
        ON aliases (alias) WHERE deleted_at IS NULL",
    "CREATE TABLE IF NOT EXISTS visits (
        id UUID PRIMARY KEY,
        link_id UUID NOT NULL,
        alias TEXT NOT NULL,
        tracking_id UUID NOT NULL,
        source_ip INET,
        time TIMESTAMP NOT NULL,
        user_agent TEXT,
        referer TEXT,
        country_code TEXT,
        subdivision_code TEXT
    )",
    "CREATE INDEX IF NOT EXISTS visits_link_tracking_idx ON visits (link_id, tracking_id)",
    "CREATE TABLE IF NOT EXISTS visitors (
        id UUID PRIMARY KEY,
        ip INET NOT NULL UNIQUE,
        created_at TIMESTAMP NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS pending_links (
        id UUID PRIMARY KEY,
        title TEXT NOT NULL,
        destination TEXT NOT NULL,
        owner_kind TEXT NOT NULL,
        owner_name TEXT NOT NULL,
        expires_at TIMESTAMP,
        status TEXT NOT NULL,
        created_at TIMESTAMP NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS pending_status_history (
        pending_id UUID NOT NULL REFERENCES pending_links (id),
        from_status TEXT,
        to_status TEXT NOT NULL,
        modified_by TEXT NOT NULL,
        at TIMESTAMP NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS organizations (
        name TEXT PRIMARY KEY,
        created_at TIMESTAMP NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS organization_members (
        organization TEXT NOT NULL REFERENCES organizations (name),
        username TEXT NOT NULL,
        is_admin BOOLEAN NOT NULL DEFAULT FALSE,
        joined_at TIMESTAMP NOT NULL,
        PRIMARY KEY (organization, username)
    )",
    "CREATE TABLE IF NOT EXISTS role_grants (
        role TEXT NOT NULL,
        entity TEXT NOT NULL,
        granted_by TEXT NOT NULL,
        at TIMESTAMP NOT NULL,
        PRIMARY KEY (role, entity)
    )",
    "CREATE TABLE IF NOT EXISTS banned_domains (
        domain TEXT PRIMARY KEY
    )",
    "CREATE TABLE IF NOT EXISTS audit_trail (
        actor TEXT NOT NULL,
        action TEXT NOT NULL,
        subject TEXT NOT NULL,
        ip_address INET,
        at TIMESTAMP NOT NULL
    )",
];

/// Postgres storage
#[derive(Clone)]
pub struct Postgres {
    /// Pool of connections
    pool: PgPool,
}

impl Postgres {
    /// Create Postgres storage
    ///
    /// Uses the `DATABASE_URL` environment variable; the schema is
    /// ensured before the first request.
    pub async fn new() -> Self {
        let connection_string = std::env::var("DATABASE_URL").expect("Valid DATABASE_URL");

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&connection_string)
            .await
            .expect("Valid connection");

        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .expect("Valid schema statement");
        }

        Self { pool }
    }

    /// All alias rows of a link
    async fn load_aliases(&self, link_id: &Uuid) -> Result<Vec<Alias>> {
        let rows = sqlx::query(
            "SELECT alias, description, deleted_at FROM aliases WHERE link_id = $1 ORDER BY alias",
        )
        .bind(link_id)
        .fetch_all(&self.pool)
        .await
        .map_err(connection)?;

        rows.iter().map(alias_from_row).collect()
    }

    /// Hydrate link rows with their aliases
    async fn links_from_rows(&self, rows: Vec<PgRow>) -> Result<Vec<Link>> {
        let mut links = Vec::with_capacity(rows.len());

        for row in &rows {
            let mut link = link_from_row(row)?;
            link.aliases = self.load_aliases(&link.id).await?;
            links.push(link);
        }

        Ok(links)
    }

    /// One pending record with its history
    async fn hydrate_pending(&self, row: &PgRow) -> Result<PendingLink> {
        let mut pending = pending_from_row(row)?;

        let history = sqlx::query(
            "SELECT from_status, to_status, modified_by, at
                FROM pending_status_history WHERE pending_id = $1 ORDER BY at",
        )
        .bind(pending.id)
        .fetch_all(&self.pool)
        .await
        .map_err(connection)?;

        pending.status_history = history
            .iter()
            .map(status_change_from_row)
            .collect::<Result<Vec<StatusChange>>>()?;

        Ok(pending)
    }
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// Any sqlx failure that is not a unique violation
fn connection(err: sqlx::Error) -> Error {
    Error::Connection(err.to_string())
}

/// Unique violations are the duplicate-alias signal
fn alias_insert_error(err: sqlx::Error) -> Error {
    if err
        .as_database_error()
        .is_some_and(|db| db.is_unique_violation())
    {
        Error::DuplicateAlias
    } else {
        connection(err)
    }
}

fn owner_to_parts(owner: &Owner) -> (&'static str, &str) {
    match owner {
        Owner::User(name) => ("user", name),
        Owner::Organization(name) => ("organization", name),
    }
}

fn owner_from_parts(kind: &str, name: String) -> Owner {
    if kind == "organization" {
        Owner::Organization(name)
    } else {
        Owner::User(name)
    }
}

fn deleted_by_to_parts(deleted_by: &DeletedBy) -> (&'static str, Option<&str>) {
    match deleted_by {
        DeletedBy::Person(name) => ("person", Some(name)),
        DeletedBy::BlacklistCascade => ("blacklist-cascade", None),
        DeletedBy::BlockCascade => ("block-cascade", None),
    }
}

fn deleted_by_from_parts(kind: Option<String>, name: Option<String>) -> Option<DeletedBy> {
    match kind.as_deref() {
        Some("person") => Some(DeletedBy::Person(name.unwrap_or_default())),
        Some("blacklist-cascade") => Some(DeletedBy::BlacklistCascade),
        Some("block-cascade") => Some(DeletedBy::BlockCascade),
        _ => None,
    }
}

fn status_to_str(status: ReviewStatus) -> &'static str {
    match status {
        ReviewStatus::Pending => "pending",
        ReviewStatus::Approved => "approved",
        ReviewStatus::Denied => "denied",
    }
}

fn status_from_str(status: &str) -> ReviewStatus {
    match status {
        "approved" => ReviewStatus::Approved,
        "denied" => ReviewStatus::Denied,
        _ => ReviewStatus::Pending,
    }
}

fn link_from_row(row: &PgRow) -> Result<Link> {
    let owner_kind: String = row.try_get("owner_kind").map_err(connection)?;
    let owner_name: String = row.try_get("owner_name").map_err(connection)?;
    let deleted_by_kind: Option<String> = row.try_get("deleted_by_kind").map_err(connection)?;
    let deleted_by_name: Option<String> = row.try_get("deleted_by_name").map_err(connection)?;
    let visits: i64 = row.try_get("visits").map_err(connection)?;
    let unique_visits: i64 = row.try_get("unique_visits").map_err(connection)?;

    Ok(Link {
        id: row.try_get("id").map_err(connection)?,
        title: row.try_get("title").map_err(connection)?,
        destination: row.try_get("destination").map_err(connection)?,
        owner: owner_from_parts(&owner_kind, owner_name),
        visits: visits.unsigned_abs(),
        unique_visits: unique_visits.unsigned_abs(),
        aliases: Vec::new(),
        created_at: row.try_get("created_at").map_err(connection)?,
        expires_at: row.try_get("expires_at").map_err(connection)?,
        deleted_at: row.try_get("deleted_at").map_err(connection)?,
        deleted_by: deleted_by_from_parts(deleted_by_kind, deleted_by_name),
    })
}

fn alias_from_row(row: &PgRow) -> Result<Alias> {
    Ok(Alias {
        alias: row.try_get("alias").map_err(connection)?,
        description: row.try_get("description").map_err(connection)?,
        deleted_at: row.try_get("deleted_at").map_err(connection)?,
    })
}

fn visit_from_row(row: &PgRow) -> Result<Visit> {
    let source_ip: Option<IpNetwork> = row.try_get("source_ip").map_err(connection)?;

    Ok(Visit {
        id: row.try_get("id").map_err(connection)?,
        link_id: row.try_get("link_id").map_err(connection)?,
        alias: row.try_get("alias").map_err(connection)?,
        tracking_id: row.try_get("tracking_id").map_err(connection)?,
        source_ip: source_ip.map(|network| network.ip()),
        time: row.try_get("time").map_err(connection)?,
        user_agent: row.try_get("user_agent").map_err(connection)?,
        referer: row.try_get("referer").map_err(connection)?,
        country_code: row.try_get("country_code").map_err(connection)?,
        subdivision_code: row.try_get("subdivision_code").map_err(connection)?,
    })
}

fn pending_from_row(row: &PgRow) -> Result<PendingLink> {
    let owner_kind: String = row.try_get("owner_kind").map_err(connection)?;
    let owner_name: String = row.try_get("owner_name").map_err(connection)?;
    let status: String = row.try_get("status").map_err(connection)?;

    Ok(PendingLink {
        id: row.try_get("id").map_err(connection)?,
        title: row.try_get("title").map_err(connection)?,
        destination: row.try_get("destination").map_err(connection)?,
        owner: owner_from_parts(&owner_kind, owner_name),
        expires_at: row.try_get("expires_at").map_err(connection)?,
        status: status_from_str(&status),
        status_history: Vec::new(),
        created_at: row.try_get("created_at").map_err(connection)?,
    })
}

fn status_change_from_row(row: &PgRow) -> Result<StatusChange> {
    let from: Option<String> = row.try_get("from_status").map_err(connection)?;
    let to: String = row.try_get("to_status").map_err(connection)?;

    Ok(StatusChange {
        from: from.as_deref().map(status_from_str),
        to: status_from_str(&to),
        modified_by: row.try_get("modified_by").map_err(connection)?,
        at: row.try_get("at").map_err(connection)?,
    })
}

#[async_trait]
impl Storage for Postgres {
    async fn find_all_links(&self) -> Result<Vec<Link>> {
        let rows = sqlx::query("SELECT * FROM links WHERE deleted_at IS NULL")
            .fetch_all(&self.pool)
            .await
            .map_err(connection)?;

        self.links_from_rows(rows).await
    }

    async fn find_links_by_owner(&self, owner: &Owner) -> Result<Vec<Link>> {
        let (kind, name) = owner_to_parts(owner);

        let rows = sqlx::query(
            "SELECT * FROM links
                WHERE owner_kind = $1 AND owner_name = $2 AND deleted_at IS NULL",
        )
        .bind(kind)
        .bind(name)
        .fetch_all(&self.pool)
        .await
        .map_err(connection)?;

        self.links_from_rows(rows).await
    }

    async fn find_links_by_owner_any(&self, owner: &Owner) -> Result<Vec<Link>> {
        let (kind, name) = owner_to_parts(owner);

        let rows = sqlx::query("SELECT * FROM links WHERE owner_kind = $1 AND owner_name = $2")
            .bind(kind)
            .bind(name)
            .fetch_all(&self.pool)
            .await
            .map_err(connection)?;

        self.links_from_rows(rows).await
    }

    async fn find_link_by_id(&self, id: &Uuid) -> Result<Option<Link>> {
        let row = sqlx::query("SELECT * FROM links WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(connection)?;

        match row {
            Some(row) => {
                let mut link = link_from_row(&row)?;
                link.aliases = self.load_aliases(&link.id).await?;

                Ok(Some(link))
            }
            None => Ok(None),
        }
    }

    async fn find_link_by_alias(&self, alias: &str) -> Result<Option<(Link, Alias)>> {
        // a live alias wins over a soft-deleted namesake
        let row = sqlx::query(
            "SELECT link_id FROM aliases WHERE alias = $1
                ORDER BY (deleted_at IS NULL) DESC LIMIT 1",
        )
        .bind(alias)
        .fetch_optional(&self.pool)
        .await
        .map_err(connection)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let link_id: Uuid = row.try_get("link_id").map_err(connection)?;

        let Some(link) = self.find_link_by_id(&link_id).await? else {
            return Ok(None);
        };

        let Some(entry) = link.find_alias(alias).cloned() else {
            return Ok(None);
        };

        Ok(Some((link, entry)))
    }

    async fn find_link_ids_by_destination_fragment(&self, fragment: &str) -> Result<Vec<Uuid>> {
        let pattern = format!("%{fragment}%");

        let rows = sqlx::query("SELECT id FROM links WHERE destination LIKE $1")
            .bind(&pattern)
            .fetch_all(&self.pool)
            .await
            .map_err(connection)?;

        rows.iter()
            .map(|row| row.try_get("id").map_err(connection))
            .collect()
    }

    async fn create_link(&self, values: &CreateLinkValues<'_>) -> Result<Link> {
        let (kind, name) = owner_to_parts(values.owner);
        let id = Uuid::new_v4();

        sqlx::query(
            "INSERT INTO links (id, title, destination, owner_kind, owner_name, created_at, expires_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(id)
        .bind(values.title)
        .bind(values.destination.as_str())
        .bind(kind)
        .bind(name)
        .bind(now())
        .bind(values.expires_at)
        .execute(&self.pool)
        .await
        .map_err(connection)?;

        self.find_link_by_id(&id)
            .await?
            .ok_or_else(|| Error::Connection("link vanished after insert".to_string()))
    }

    async fn update_link(&self, id: &Uuid, values: &UpdateLinkValues<'_>) -> Result<Link> {
        if let Some(title) = values.title {
            sqlx::query("UPDATE links SET title = $2 WHERE id = $1")
                .bind(id)
                .bind(title)
                .execute(&self.pool)
                .await
                .map_err(connection)?;
        }

        if let Some(destination) = values.destination {
            sqlx::query("UPDATE links SET destination = $2 WHERE id = $1")
                .bind(id)
                .bind(destination.as_str())
                .execute(&self.pool)
                .await
                .map_err(connection)?;
        }

        match values.expiration {
            ExpirationChange::Keep => {}
            ExpirationChange::Set(expires_at) => {
                sqlx::query("UPDATE links SET expires_at = $2 WHERE id = $1")
                    .bind(id)
                    .bind(expires_at)
                    .execute(&self.pool)
                    .await
                    .map_err(connection)?;
            }
            ExpirationChange::Clear => {
                sqlx::query("UPDATE links SET expires_at = NULL WHERE id = $1")
                    .bind(id)
                    .execute(&self.pool)
                    .await
                    .map_err(connection)?;
            }
        }

        self.find_link_by_id(id)
            .await?
            .ok_or_else(|| Error::Connection("link vanished during update".to_string()))
    }

    async fn set_link_deleted(&self, id: &Uuid, deleted_by: &DeletedBy) -> Result<()> {
        let (kind, name) = deleted_by_to_parts(deleted_by);

        sqlx::query(
            "UPDATE links SET deleted_at = $2, deleted_by_kind = $3, deleted_by_name = $4
                WHERE id = $1",
        )
        .bind(id)
        .bind(now())
        .bind(kind)
        .bind(name)
        .execute(&self.pool)
        .await
        .map_err(connection)?;

        Ok(())
    }

    async fn restore_link(&self, id: &Uuid, deleted_by: &DeletedBy) -> Result<bool> {
        let (kind, name) = deleted_by_to_parts(deleted_by);

        let result = sqlx::query(
            "UPDATE links SET deleted_at = NULL, deleted_by_kind = NULL, deleted_by_name = NULL
                WHERE id = $1
                    AND deleted_at IS NOT NULL
                    AND deleted_by_kind = $2
                    AND deleted_by_name IS NOT DISTINCT FROM $3",
        )
        .bind(id)
        .bind(kind)
        .bind(name)
        .execute(&self.pool)
        .await
        .map_err(connection)?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_alias(&self, link_id: &Uuid, alias: &str, description: &str) -> Result<Alias> {
        sqlx::query("INSERT INTO aliases (link_id, alias, description) VALUES ($1, $2, $3)")
            .bind(link_id)
            .bind(alias)
            .bind(description)
            .execute(&self.pool)
            .await
            .map_err(alias_insert_error)?;

        Ok(Alias {
            alias: alias.to_string(),
            description: description.to_string(),
            deleted_at: None,
        })
    }

    async fn restore_alias(&self, link_id: &Uuid, alias: &str, description: &str) -> Result<Alias> {
        // the partial unique index rejects this when the name is live
        // elsewhere
        sqlx::query(
            "UPDATE aliases SET deleted_at = NULL, description = $3
                WHERE link_id = $1 AND alias = $2",
        )
        .bind(link_id)
        .bind(alias)
        .bind(description)
        .execute(&self.pool)
        .await
        .map_err(alias_insert_error)?;

        Ok(Alias {
            alias: alias.to_string(),
            description: description.to_string(),
            deleted_at: None,
        })
    }

    async fn set_alias_deleted(&self, link_id: &Uuid, alias: &str) -> Result<()> {
        sqlx::query("UPDATE aliases SET deleted_at = $3 WHERE link_id = $1 AND alias = $2")
            .bind(link_id)
            .bind(alias)
            .bind(now())
            .execute(&self.pool)
            .await
            .map_err(connection)?;

        Ok(())
    }

    async fn increment_visit_counters(&self, link_id: &Uuid, first_time: bool) -> Result<()> {
        sqlx::query(
            "UPDATE links
                SET visits = visits + 1,
                    unique_visits = unique_visits + CASE WHEN $2 THEN 1 ELSE 0 END
                WHERE id = $1",
        )
        .bind(link_id)
        .bind(first_time)
        .execute(&self.pool)
        .await
        .map_err(connection)?;

        Ok(())
    }

    async fn reset_visit_counters(&self, link_id: &Uuid) -> Result<()> {
        sqlx::query("UPDATE links SET visits = 0, unique_visits = 0 WHERE id = $1")
            .bind(link_id)
            .execute(&self.pool)
            .await
            .map_err(connection)?;

        Ok(())
    }

    async fn insert_visit(&self, values: &CreateVisitValues<'_>) -> Result<Visit> {
        let id = Uuid::new_v4();
        let time = now();
        let source_ip = values.source_ip.map(|ip| IpNetwork::from(*ip));

        sqlx::query(
            "INSERT INTO visits
                (id, link_id, alias, tracking_id, source_ip, time,
                 user_agent, referer, country_code, subdivision_code)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(id)
        .bind(values.link_id)
        .bind(values.alias)
        .bind(values.tracking_id)
        .bind(source_ip)
        .bind(time)
        .bind(values.user_agent)
        .bind(values.referer)
        .bind(values.country_code)
        .bind(values.subdivision_code)
        .execute(&self.pool)
        .await
        .map_err(connection)?;

        Ok(Visit {
            id,
            link_id: *values.link_id,
            alias: values.alias.to_string(),
            tracking_id: *values.tracking_id,
            source_ip: values.source_ip.copied(),
            time,
            user_agent: values.user_agent.map(ToString::to_string),
            referer: values.referer.map(ToString::to_string),
            country_code: values.country_code.map(ToString::to_string),
            subdivision_code: values.subdivision_code.map(ToString::to_string),
        })
    }

    async fn find_visits(&self, link_id: Option<&Uuid>, alias: Option<&str>) -> Result<Vec<Visit>> {
        let rows = sqlx::query(
            "SELECT * FROM visits
                WHERE ($1::uuid IS NULL OR link_id = $1)
                  AND ($2::text IS NULL OR alias = $2)",
        )
        .bind(link_id)
        .bind(alias)
        .fetch_all(&self.pool)
        .await
        .map_err(connection)?;

        rows.iter().map(visit_from_row).collect()
    }

    async fn visit_exists(&self, link_id: &Uuid, tracking_id: &Uuid) -> Result<bool> {
        let row =
            sqlx::query("SELECT 1 AS one FROM visits WHERE link_id = $1 AND tracking_id = $2 LIMIT 1")
                .bind(link_id)
                .bind(tracking_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(connection)?;

        Ok(row.is_some())
    }

    async fn purge_visits(&self, link_id: &Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM visits WHERE link_id = $1")
            .bind(link_id)
            .execute(&self.pool)
            .await
            .map_err(connection)?;

        Ok(result.rows_affected())
    }

    async fn find_or_create_visitor(&self, ip: &IpAddr) -> Result<Visitor> {
        let network = IpNetwork::from(*ip);

        // first writer wins, everyone reads the winner back
        sqlx::query(
            "INSERT INTO visitors (id, ip, created_at) VALUES ($1, $2, $3)
                ON CONFLICT (ip) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(network)
        .bind(now())
        .execute(&self.pool)
        .await
        .map_err(connection)?;

        let row = sqlx::query("SELECT id, created_at FROM visitors WHERE ip = $1")
            .bind(network)
            .fetch_one(&self.pool)
            .await
            .map_err(connection)?;

        Ok(Visitor {
            id: row.try_get("id").map_err(connection)?,
            ip: *ip,
            created_at: row.try_get("created_at").map_err(connection)?,
        })
    }

    async fn find_all_pending(&self, status: Option<ReviewStatus>) -> Result<Vec<PendingLink>> {
        let rows = sqlx::query(
            "SELECT * FROM pending_links
                WHERE ($1::text IS NULL OR status = $1) ORDER BY created_at",
        )
        .bind(status.map(status_to_str))
        .fetch_all(&self.pool)
        .await
        .map_err(connection)?;

        let mut pending = Vec::with_capacity(rows.len());
        for row in &rows {
            pending.push(self.hydrate_pending(row).await?);
        }

        Ok(pending)
    }

    async fn find_pending_by_id(&self, id: &Uuid) -> Result<Option<PendingLink>> {
        let row = sqlx::query("SELECT * FROM pending_links WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(connection)?;

        match row {
            Some(row) => Ok(Some(self.hydrate_pending(&row).await?)),
            None => Ok(None),
        }
    }

    async fn find_pending_by_destination(
        &self,
        destination: &str,
    ) -> Result<Option<PendingLink>> {
        let row = sqlx::query("SELECT * FROM pending_links WHERE destination = $1")
            .bind(destination)
            .fetch_optional(&self.pool)
            .await
            .map_err(connection)?;

        match row {
            Some(row) => Ok(Some(self.hydrate_pending(&row).await?)),
            None => Ok(None),
        }
    }

    async fn create_pending(&self, values: &CreatePendingValues<'_>) -> Result<PendingLink> {
        let (kind, name) = owner_to_parts(values.owner);
        let id = Uuid::new_v4();
        let at = now();

        sqlx::query(
            "INSERT INTO pending_links
                (id, title, destination, owner_kind, owner_name, expires_at, status, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(id)
        .bind(values.title)
        .bind(values.destination.as_str())
        .bind(kind)
        .bind(name)
        .bind(values.expires_at)
        .bind(status_to_str(ReviewStatus::Pending))
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(connection)?;

        sqlx::query(
            "INSERT INTO pending_status_history (pending_id, from_status, to_status, modified_by, at)
                VALUES ($1, NULL, $2, $3, $4)",
        )
        .bind(id)
        .bind(status_to_str(ReviewStatus::Pending))
        .bind(name)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(connection)?;

        self.find_pending_by_id(&id)
            .await?
            .ok_or_else(|| Error::Connection("pending link vanished after insert".to_string()))
    }

    async fn update_pending_status(
        &self,
        id: &Uuid,
        values: &StatusChangeValues<'_>,
    ) -> Result<PendingLink> {
        sqlx::query("UPDATE pending_links SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status_to_str(values.to))
            .execute(&self.pool)
            .await
            .map_err(connection)?;

        sqlx::query(
            "INSERT INTO pending_status_history (pending_id, from_status, to_status, modified_by, at)
                VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(status_to_str(values.from))
        .bind(status_to_str(values.to))
        .bind(values.modified_by)
        .bind(now())
        .execute(&self.pool)
        .await
        .map_err(connection)?;

        self.find_pending_by_id(id)
            .await?
            .ok_or_else(|| Error::Connection("pending link vanished during update".to_string()))
    }

    async fn create_organization(&self, name: &str) -> Result<Organization> {
        sqlx::query(
            "INSERT INTO organizations (name, created_at) VALUES ($1, $2)
                ON CONFLICT (name) DO NOTHING",
        )
        .bind(name)
        .bind(now())
        .execute(&self.pool)
        .await
        .map_err(connection)?;

        self.find_organization(name)
            .await?
            .ok_or_else(|| Error::Connection("organization vanished after insert".to_string()))
    }

    async fn find_organization(&self, name: &str) -> Result<Option<Organization>> {
        let row = sqlx::query("SELECT name, created_at FROM organizations WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(connection)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let members = sqlx::query(
            "SELECT username, is_admin, joined_at FROM organization_members
                WHERE organization = $1 ORDER BY joined_at",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await
        .map_err(connection)?;

        let members = members
            .iter()
            .map(|row| {
                Ok(Member {
                    username: row.try_get("username").map_err(connection)?,
                    is_admin: row.try_get("is_admin").map_err(connection)?,
                    joined_at: row.try_get("joined_at").map_err(connection)?,
                })
            })
            .collect::<Result<Vec<Member>>>()?;

        Ok(Some(Organization {
            name: row.try_get("name").map_err(connection)?,
            members,
            created_at: row.try_get("created_at").map_err(connection)?,
        }))
    }

    async fn add_organization_member(
        &self,
        name: &str,
        values: &NewMemberValues<'_>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO organization_members (organization, username, is_admin, joined_at)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (organization, username) DO NOTHING",
        )
        .bind(name)
        .bind(values.username)
        .bind(values.is_admin)
        .bind(now())
        .execute(&self.pool)
        .await
        .map_err(connection)?;

        Ok(())
    }

    async fn organizations_of(&self, username: &str) -> Result<Vec<String>> {
        let rows =
            sqlx::query("SELECT organization FROM organization_members WHERE username = $1")
                .bind(username)
                .fetch_all(&self.pool)
                .await
                .map_err(connection)?;

        rows.iter()
            .map(|row| row.try_get("organization").map_err(connection))
            .collect()
    }

    async fn grant_role(&self, role: &str, entity: &str, granted_by: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO role_grants (role, entity, granted_by, at) VALUES ($1, $2, $3, $4)
                ON CONFLICT (role, entity) DO NOTHING",
        )
        .bind(role)
        .bind(entity)
        .bind(granted_by)
        .bind(now())
        .execute(&self.pool)
        .await
        .map_err(connection)?;

        Ok(())
    }

    async fn revoke_role(&self, role: &str, entity: &str) -> Result<()> {
        sqlx::query("DELETE FROM role_grants WHERE role = $1 AND entity = $2")
            .bind(role)
            .bind(entity)
            .execute(&self.pool)
            .await
            .map_err(connection)?;

        Ok(())
    }

    async fn has_role(&self, role: &str, entity: &str) -> Result<bool> {
        let row =
            sqlx::query("SELECT 1 AS one FROM role_grants WHERE role = $1 AND entity = $2 LIMIT 1")
                .bind(role)
                .bind(entity)
                .fetch_optional(&self.pool)
                .await
                .map_err(connection)?;

        Ok(row.is_some())
    }

    async fn role_entities(&self, role: &str) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT entity FROM role_grants WHERE role = $1")
            .bind(role)
            .fetch_all(&self.pool)
            .await
            .map_err(connection)?;

        rows.iter()
            .map(|row| row.try_get("entity").map_err(connection))
            .collect()
    }

    async fn add_banned_domain(&self, domain: &str) -> Result<()> {
        sqlx::query("INSERT INTO banned_domains (domain) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(domain)
            .execute(&self.pool)
            .await
            .map_err(connection)?;

        Ok(())
    }

    async fn is_banned_domain(&self, host: &str) -> Result<bool> {
        // equal to the host, or a parent domain of it
        let row = sqlx::query(
            "SELECT 1 AS one FROM banned_domains
                WHERE domain = $1 OR $1 LIKE '%.' || domain LIMIT 1",
        )
        .bind(host)
        .fetch_optional(&self.pool)
        .await
        .map_err(connection)?;

        Ok(row.is_some())
    }

    async fn register_audit_trail(
        &self,
        actor: &str,
        entry: &AuditEntry<'_>,
        ip_address: Option<&IpAddr>,
    ) -> Result<()> {
        let (action, subject) = match entry {
            AuditEntry::CreateLink(link) => ("create-link", link.id.to_string()),
            AuditEntry::UpdateLink(link) => ("update-link", link.id.to_string()),
            AuditEntry::DeleteLink(link) => ("delete-link", link.id.to_string()),
            AuditEntry::ClearVisits(link) => ("clear-visits", link.id.to_string()),
            AuditEntry::CreateAlias(link, alias) => {
                ("create-alias", format!("{}/{alias}", link.id))
            }
            AuditEntry::DeleteAlias(link, alias) => {
                ("delete-alias", format!("{}/{alias}", link.id))
            }
            AuditEntry::HoldForReview(pending) => ("hold-for-review", pending.id.to_string()),
            AuditEntry::PromoteReview(pending) => ("promote-review", pending.id.to_string()),
            AuditEntry::RejectReview(pending) => ("reject-review", pending.id.to_string()),
            AuditEntry::ReconsiderReview(pending) => {
                ("reconsider-review", pending.id.to_string())
            }
            AuditEntry::GrantRole(role, entity) => ("grant-role", format!("{role}/{entity}")),
            AuditEntry::RevokeRole(role, entity) => ("revoke-role", format!("{role}/{entity}")),
        };

        sqlx::query(
            "INSERT INTO audit_trail (actor, action, subject, ip_address, at)
                VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(actor)
        .bind(action)
        .bind(subject)
        .bind(ip_address.map(|ip| IpNetwork::from(*ip)))
        .bind(now())
        .execute(&self.pool)
        .await
        .map_err(connection)?;

        Ok(())
    }
}

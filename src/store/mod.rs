use crate::config::Config;
use crate::ingest::extract::{ExtractedFacts, FactRef};
use crate::model::{
    ClassRow, Component, ComponentKind, FileRow, LiveCounts, RelKind, Relationship, SqlContent,
    StoreOverview,
};
use anyhow::{Context, Result, bail};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

mod migrations;

const ZSTD_LEVEL: i32 = 3;

#[derive(Debug)]
struct ConnectionCustomizer;

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for ConnectionCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        conn.busy_timeout(Duration::from_secs(30))?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        Ok(())
    }

    fn on_release(&self, _conn: Connection) {}
}

/// Structural repository. One mutex-held write connection keeps every
/// transaction serial; reads go through the pool and never block a commit
/// mid-file.
pub struct Store {
    db_path: PathBuf,
    write_conn: Arc<Mutex<Connection>>,
    read_pool: Pool<SqliteConnectionManager>,
}

impl Store {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create store directory {}", parent.display()))?;
        }

        let config = Config::get();

        let write_conn = Connection::open(db_path)
            .with_context(|| format!("open store at {}", db_path.display()))?;
        write_conn.busy_timeout(Duration::from_secs(30))?;
        write_conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;
        migrations::migrate(&write_conn)?;

        let write_conn = Arc::new(Mutex::new(write_conn));

        let manager = SqliteConnectionManager::file(db_path);
        let read_pool = Pool::builder()
            .max_size(config.pool_size)
            .min_idle(Some(config.pool_min_idle))
            .connection_timeout(Duration::from_secs(30))
            .connection_customizer(Box::new(ConnectionCustomizer))
            .build(manager)
            .with_context(|| "create read connection pool")?;

        Ok(Self {
            db_path: db_path.to_path_buf(),
            write_conn,
            read_pool,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn read_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.read_pool
            .get()
            .with_context(|| "get read connection from pool")
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.write_conn.lock().unwrap()
    }

    // ---- projects / files / classes ----

    pub fn upsert_project(&self, name: &str, root_path: &str) -> Result<i64> {
        let now = crate::util::now_ts();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO projects (project_name, root_path, created_at)
             VALUES (?, ?, ?)
             ON CONFLICT(project_name) DO UPDATE SET root_path = excluded.root_path",
            params![name, root_path, now],
        )?;
        let id = conn.query_row(
            "SELECT project_id FROM projects WHERE project_name = ?",
            params![name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn upsert_file(
        &self,
        project_id: i64,
        file_path: &str,
        file_type: &str,
        content_hash: &str,
    ) -> Result<i64> {
        let now = crate::util::now_ts();
        let file_name = crate::util::file_name(file_path);
        let conn = self.conn();
        conn.execute(
            "INSERT INTO files
                (project_id, file_path, file_name, file_type, content_hash, del_yn, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, 'N', ?, ?)
             ON CONFLICT(project_id, file_path) DO UPDATE SET
                file_name = excluded.file_name,
                file_type = excluded.file_type,
                content_hash = excluded.content_hash,
                del_yn = 'N',
                updated_at = excluded.updated_at",
            params![project_id, file_path, file_name, file_type, content_hash, now, now],
        )?;
        let id = conn.query_row(
            "SELECT file_id FROM files WHERE project_id = ? AND file_path = ?",
            params![project_id, file_path],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn file_by_path(&self, project_id: i64, file_path: &str) -> Result<Option<FileRow>> {
        self.read_conn()?
            .query_row(
                "SELECT file_id, project_id, file_path, file_name, file_type, content_hash, del_yn
                 FROM files WHERE project_id = ? AND file_path = ?",
                params![project_id, file_path],
                file_row,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn live_files(&self, project_id: i64) -> Result<Vec<FileRow>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(
            "SELECT file_id, project_id, file_path, file_name, file_type, content_hash, del_yn
             FROM files WHERE project_id = ? AND del_yn = 'N'
             ORDER BY file_path",
        )?;
        let rows = stmt.query_map(params![project_id], file_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub fn upsert_class(&self, file_id: i64, class_name: &str) -> Result<i64> {
        let now = crate::util::now_ts();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO classes (file_id, class_name, has_error, del_yn, created_at, updated_at)
             VALUES (?, ?, 0, 'N', ?, ?)
             ON CONFLICT(file_id, class_name) DO UPDATE SET
                del_yn = 'N',
                updated_at = excluded.updated_at",
            params![file_id, class_name, now, now],
        )?;
        let id = conn.query_row(
            "SELECT class_id FROM classes WHERE file_id = ? AND class_name = ?",
            params![file_id, class_name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn set_class_error(&self, class_id: i64, has_error: bool) -> Result<()> {
        self.conn().execute(
            "UPDATE classes SET has_error = ?, updated_at = ? WHERE class_id = ?",
            params![has_error as i64, crate::util::now_ts(), class_id],
        )?;
        Ok(())
    }

    pub fn mark_file_error(&self, file_id: i64) -> Result<()> {
        let now = crate::util::now_ts();
        self.conn().execute(
            "UPDATE classes SET has_error = 1, updated_at = ? WHERE file_id = ? AND del_yn = 'N'",
            params![now, file_id],
        )?;
        Ok(())
    }

    pub fn classes_for_file(&self, file_id: i64) -> Result<Vec<ClassRow>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(
            "SELECT class_id, file_id, class_name, has_error, del_yn
             FROM classes WHERE file_id = ? ORDER BY class_id",
        )?;
        let rows = stmt.query_map(params![file_id], |row| {
            Ok(ClassRow {
                class_id: row.get(0)?,
                file_id: row.get(1)?,
                class_name: row.get(2)?,
                has_error: row.get::<_, i64>(3)? != 0,
                deleted: row.get::<_, String>(4)? == "Y",
            })
        })?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    // ---- components ----

    /// Deduplicates on the natural key (file, type, name, parent).
    /// A soft-deleted row with the same key is resurrected rather than
    /// duplicated; repeating an identical upsert is a no-op on live counts.
    pub fn upsert_component(
        &self,
        file_id: i64,
        parent_id: Option<i64>,
        kind: &ComponentKind,
        name: &str,
        layer: &str,
    ) -> Result<i64> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let id = upsert_component_tx(&tx, file_id, parent_id, kind.as_str(), name, layer)?;
        tx.commit()?;
        Ok(id)
    }

    pub fn component_by_id(&self, component_id: i64) -> Result<Option<Component>> {
        self.read_conn()?
            .query_row(
                &format!("SELECT {COMPONENT_COLS} FROM components WHERE component_id = ?"),
                params![component_id],
                component_row,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn live_components(&self, kind: Option<&ComponentKind>) -> Result<Vec<Component>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COMPONENT_COLS} FROM components
             WHERE del_yn = 'N' AND (?1 IS NULL OR component_type = ?1)
             ORDER BY component_id",
        ))?;
        let kind = kind.map(|k| k.as_str().to_string());
        let rows = stmt.query_map(params![kind], component_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub fn live_components_for_file(&self, file_id: i64) -> Result<Vec<Component>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COMPONENT_COLS} FROM components
             WHERE file_id = ? AND del_yn = 'N' ORDER BY component_id",
        ))?;
        let rows = stmt.query_map(params![file_id], component_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub fn find_live_component(
        &self,
        kind: &ComponentKind,
        name: &str,
    ) -> Result<Option<Component>> {
        self.read_conn()?
            .query_row(
                &format!(
                    "SELECT {COMPONENT_COLS} FROM components
                     WHERE del_yn = 'N' AND component_type = ? AND component_name = ?
                     ORDER BY component_id LIMIT 1",
                ),
                params![kind.as_str(), name],
                component_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// SQL statements are keyed by name across all statement kinds; the
    /// caller of a query rarely knows whether it is a select or an update.
    pub fn find_live_statement(&self, name: &str) -> Result<Option<Component>> {
        self.read_conn()?
            .query_row(
                &format!(
                    "SELECT {COMPONENT_COLS} FROM components
                     WHERE del_yn = 'N' AND component_name = ?
                       AND component_type IN ('sql-select', 'sql-insert', 'sql-update', 'sql-delete')
                     ORDER BY component_id LIMIT 1",
                ),
                params![name],
                component_row,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn soft_delete_component(&self, component_id: i64) -> Result<()> {
        self.conn().execute(
            "UPDATE components SET del_yn = 'Y', updated_at = ? WHERE component_id = ?",
            params![crate::util::now_ts(), component_id],
        )?;
        Ok(())
    }

    // ---- relationships ----

    /// Deduplicates on (src, dst, type). Self-loop edges are rejected at
    /// write time; upstream data has shown them and they carry no meaning.
    pub fn upsert_relationship(&self, src_id: i64, dst_id: i64, kind: &RelKind) -> Result<i64> {
        if src_id == dst_id {
            bail!("self-loop relationship rejected: {src_id} -> {dst_id} ({kind})");
        }
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let id = upsert_relationship_tx(&tx, src_id, dst_id, kind.as_str())?;
        tx.commit()?;
        Ok(id)
    }

    pub fn relationship_by_id(&self, relationship_id: i64) -> Result<Option<Relationship>> {
        self.read_conn()?
            .query_row(
                &format!(
                    "SELECT {RELATIONSHIP_COLS} FROM relationships WHERE relationship_id = ?"
                ),
                params![relationship_id],
                relationship_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Live edges only: the edge itself and both endpoint components must be
    /// non-deleted. Soft-deleted edges stay retrievable by id.
    pub fn live_relationships(&self, kind: Option<&RelKind>) -> Result<Vec<Relationship>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(
            "SELECT r.relationship_id, r.src_id, r.dst_id, r.rel_type, r.del_yn,
                    r.created_at, r.updated_at
             FROM relationships r
             JOIN components s ON r.src_id = s.component_id
             JOIN components d ON r.dst_id = d.component_id
             WHERE r.del_yn = 'N' AND s.del_yn = 'N' AND d.del_yn = 'N'
               AND (?1 IS NULL OR r.rel_type = ?1)
             ORDER BY r.relationship_id",
        )?;
        let kind = kind.map(|k| k.as_str().to_string());
        let rows = stmt.query_map(params![kind], relationship_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub fn soft_delete_relationship(&self, relationship_id: i64) -> Result<()> {
        self.conn().execute(
            "UPDATE relationships SET del_yn = 'Y', updated_at = ? WHERE relationship_id = ?",
            params![crate::util::now_ts(), relationship_id],
        )?;
        Ok(())
    }

    // ---- sql contents ----

    pub fn put_sql_content(
        &self,
        component_id: i64,
        file_id: i64,
        query_type: &str,
        sql_text: &str,
    ) -> Result<()> {
        let compressed = zstd::encode_all(sql_text.as_bytes(), ZSTD_LEVEL)
            .with_context(|| "compress sql body")?;
        self.conn().execute(
            "INSERT INTO sql_contents (component_id, file_id, query_type, sql_text, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(component_id, file_id) DO UPDATE SET
                query_type = excluded.query_type,
                sql_text = excluded.sql_text",
            params![component_id, file_id, query_type, compressed, crate::util::now_ts()],
        )?;
        Ok(())
    }

    /// A corrupt or undecodable body is a recoverable condition: warn and
    /// report `None` so callers skip the statement rather than abort.
    pub fn get_sql_content(&self, component_id: i64) -> Result<Option<SqlContent>> {
        let row = self
            .read_conn()?
            .query_row(
                "SELECT component_id, file_id, query_type, sql_text, created_at
                 FROM sql_contents WHERE component_id = ?
                 ORDER BY content_id DESC LIMIT 1",
                params![component_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Vec<u8>>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .optional()?;
        let Some((component_id, file_id, query_type, blob, created_at)) = row else {
            return Ok(None);
        };
        let decoded = match zstd::decode_all(blob.as_slice()) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(component_id, %err, "undecodable sql body, skipping");
                return Ok(None);
            }
        };
        let sql_text = match String::from_utf8(decoded) {
            Ok(text) => text,
            Err(err) => {
                warn!(component_id, %err, "sql body is not valid utf-8, skipping");
                return Ok(None);
            }
        };
        Ok(Some(SqlContent {
            component_id,
            file_id,
            query_type,
            sql_text,
            created_at,
        }))
    }

    // ---- database schema objects ----

    /// Finds the live table component with this name anywhere in the store,
    /// creating it under `origin_file_id` if absent.
    pub fn ensure_table_component(&self, table_name: &str, origin_file_id: i64) -> Result<i64> {
        if let Some(existing) = self.find_live_component(&ComponentKind::Table, table_name)? {
            return Ok(existing.component_id);
        }
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let id = upsert_component_tx(
            &tx,
            origin_file_id,
            None,
            ComponentKind::Table.as_str(),
            table_name,
            crate::model::Layer::Database.as_str(),
        )?;
        tx.execute(
            "INSERT INTO db_tables (component_id, table_name) VALUES (?, ?)
             ON CONFLICT(component_id) DO UPDATE SET table_name = excluded.table_name",
            params![id, table_name],
        )?;
        tx.commit()?;
        Ok(id)
    }

    pub fn upsert_table_column(&self, table_component_id: i64, column_name: &str) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO db_columns (table_id, column_name) VALUES (?, ?)
             ON CONFLICT(table_id, column_name) DO NOTHING",
            params![table_component_id, column_name],
        )?;
        let id = conn.query_row(
            "SELECT column_id FROM db_columns WHERE table_id = ? AND column_name = ?",
            params![table_component_id, column_name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    // ---- counts / overview ----

    pub fn live_counts(&self) -> Result<LiveCounts> {
        let conn = self.read_conn()?;
        let count = |sql: &str| -> Result<i64> {
            conn.query_row(sql, [], |row| row.get(0)).map_err(Into::into)
        };
        Ok(LiveCounts {
            files: count("SELECT COUNT(*) FROM files WHERE del_yn = 'N'")?,
            classes: count("SELECT COUNT(*) FROM classes WHERE del_yn = 'N'")?,
            components: count("SELECT COUNT(*) FROM components WHERE del_yn = 'N'")?,
            relationships: count("SELECT COUNT(*) FROM relationships WHERE del_yn = 'N'")?,
        })
    }

    pub fn overview(&self) -> Result<StoreOverview> {
        let counts = self.live_counts()?;
        let conn = self.read_conn()?;
        let projects = conn.query_row("SELECT COUNT(*) FROM projects", [], |row| row.get(0))?;
        let sql_contents =
            conn.query_row("SELECT COUNT(*) FROM sql_contents", [], |row| row.get(0))?;
        let tables = conn.query_row("SELECT COUNT(*) FROM db_tables", [], |row| row.get(0))?;
        Ok(StoreOverview {
            db_path: self.db_path.to_string_lossy().to_string(),
            projects,
            counts,
            sql_contents,
            tables,
        })
    }

    /// Destructive reset for `--clear`. The only code path that physically
    /// removes rows; everything else soft-deletes.
    pub fn clear_project(&self, project_id: i64) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM relationships WHERE src_id IN
                (SELECT component_id FROM components c
                 JOIN files f ON c.file_id = f.file_id WHERE f.project_id = ?1)
             OR dst_id IN
                (SELECT component_id FROM components c
                 JOIN files f ON c.file_id = f.file_id WHERE f.project_id = ?1)",
            params![project_id],
        )?;
        tx.execute(
            "DELETE FROM db_columns WHERE table_id IN
                (SELECT component_id FROM components c
                 JOIN files f ON c.file_id = f.file_id WHERE f.project_id = ?)",
            params![project_id],
        )?;
        tx.execute(
            "DELETE FROM db_tables WHERE component_id IN
                (SELECT component_id FROM components c
                 JOIN files f ON c.file_id = f.file_id WHERE f.project_id = ?)",
            params![project_id],
        )?;
        tx.execute(
            "DELETE FROM sql_contents WHERE file_id IN
                (SELECT file_id FROM files WHERE project_id = ?)",
            params![project_id],
        )?;
        tx.execute(
            "DELETE FROM pending_refs WHERE src_id IN
                (SELECT component_id FROM components c
                 JOIN files f ON c.file_id = f.file_id WHERE f.project_id = ?)",
            params![project_id],
        )?;
        tx.execute(
            "DELETE FROM components WHERE file_id IN
                (SELECT file_id FROM files WHERE project_id = ?)",
            params![project_id],
        )?;
        tx.execute(
            "DELETE FROM classes WHERE file_id IN
                (SELECT file_id FROM files WHERE project_id = ?)",
            params![project_id],
        )?;
        tx.execute("DELETE FROM files WHERE project_id = ?", params![project_id])?;
        tx.commit()?;
        Ok(())
    }

    /// Links parked symbolic references whose target component has since
    /// been committed. A parked reference stays until its target appears or
    /// its source vanishes; linking is idempotent.
    pub fn resolve_pending_refs(&self) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let pending: Vec<(i64, i64, String, String, String)> = {
            let mut stmt = tx.prepare(
                "SELECT pending_id, src_id, rel_type, target_kind, target_name
                 FROM pending_refs ORDER BY pending_id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            })?;
            let mut records = Vec::new();
            for row in rows {
                records.push(row?);
            }
            records
        };

        let mut created = 0;
        for (pending_id, src_id, rel_type, target_kind, target_name) in pending {
            let src_live: Option<i64> = tx
                .query_row(
                    "SELECT component_id FROM components
                     WHERE component_id = ? AND del_yn = 'N'",
                    params![src_id],
                    |row| row.get(0),
                )
                .optional()?;
            if src_live.is_none() {
                tx.execute(
                    "DELETE FROM pending_refs WHERE pending_id = ?",
                    params![pending_id],
                )?;
                continue;
            }
            let fact = match target_kind.as_str() {
                "statement" => FactRef::Statement(target_name),
                "endpoint" => FactRef::Endpoint(target_name),
                other => {
                    warn!(target_kind = other, "unknown parked reference kind, dropping");
                    tx.execute(
                        "DELETE FROM pending_refs WHERE pending_id = ?",
                        params![pending_id],
                    )?;
                    continue;
                }
            };
            let Some(dst_id) = resolve_fact_ref(&tx, &fact, &[])? else {
                continue;
            };
            if dst_id == src_id {
                warn!(src_id, "parked reference resolves to a self-loop, dropping");
                tx.execute(
                    "DELETE FROM pending_refs WHERE pending_id = ?",
                    params![pending_id],
                )?;
                continue;
            }
            upsert_relationship_tx(&tx, src_id, dst_id, &rel_type)?;
            tx.execute(
                "DELETE FROM pending_refs WHERE pending_id = ?",
                params![pending_id],
            )?;
            created += 1;
        }

        tx.commit()?;
        Ok(created)
    }

    /// Soft-deletes a batch of components and every live edge touching them,
    /// all in one transaction. Returns (components, relationships) actually
    /// flipped; already-deleted rows count zero, so repeating the call is a
    /// no-op.
    pub fn soft_delete_components_cascade(&self, component_ids: &[i64]) -> Result<(i64, i64)> {
        if component_ids.is_empty() {
            return Ok((0, 0));
        }
        let now = crate::util::now_ts();
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut components = 0i64;
        let mut relationships = 0i64;
        for id in component_ids {
            relationships += tx.execute(
                "UPDATE relationships SET del_yn = 'Y', updated_at = ?1
                 WHERE del_yn = 'N' AND (src_id = ?2 OR dst_id = ?2)",
                params![now, id],
            )? as i64;
            components += tx.execute(
                "UPDATE components SET del_yn = 'Y', updated_at = ?
                 WHERE component_id = ? AND del_yn = 'N'",
                params![now, id],
            )? as i64;
        }
        tx.commit()?;
        Ok((components, relationships))
    }

    // ---- per-file ingestion commit ----

    /// Soft-deletes a vanished file together with its classes, components,
    /// and every live edge touching those components, in one transaction.
    pub fn soft_delete_file_facts(&self, file_id: i64) -> Result<()> {
        let now = crate::util::now_ts();
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE relationships SET del_yn = 'Y', updated_at = ?1
             WHERE del_yn = 'N' AND (
                src_id IN (SELECT component_id FROM components WHERE file_id = ?2)
                OR dst_id IN (SELECT component_id FROM components WHERE file_id = ?2))",
            params![now, file_id],
        )?;
        tx.execute(
            "DELETE FROM pending_refs
             WHERE src_id IN (SELECT component_id FROM components WHERE file_id = ?)",
            params![file_id],
        )?;
        tx.execute(
            "UPDATE components SET del_yn = 'Y', updated_at = ? WHERE file_id = ? AND del_yn = 'N'",
            params![now, file_id],
        )?;
        tx.execute(
            "UPDATE classes SET del_yn = 'Y', updated_at = ? WHERE file_id = ? AND del_yn = 'N'",
            params![now, file_id],
        )?;
        tx.execute(
            "UPDATE files SET del_yn = 'Y', updated_at = ? WHERE file_id = ?",
            params![now, file_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Commits one file's extracted generation as a single transaction.
    ///
    /// Components are reconciled against the prior live generation by
    /// natural key; unreconciled prior facts are soft-deleted together with
    /// the edges that depended on them. Relationship inputs reference
    /// components symbolically and unresolved references are dropped, never
    /// fabricated.
    pub fn commit_file_facts(&self, file_id: i64, facts: &ExtractedFacts) -> Result<(usize, usize)> {
        let now = crate::util::now_ts();
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        // Prior live generation, keyed by natural key (parent folded to 0).
        let mut prior: std::collections::HashMap<(String, String, i64), i64> =
            std::collections::HashMap::new();
        {
            let mut stmt = tx.prepare(
                "SELECT component_id, component_type, component_name, IFNULL(parent_id, 0)
                 FROM components WHERE file_id = ? AND del_yn = 'N'",
            )?;
            let rows = stmt.query_map(params![file_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?;
            for row in rows {
                let (id, kind, name, parent) = row?;
                prior.insert((kind, name, parent), id);
            }
        }

        // Insert or resurrect this generation; parents resolve through local
        // indices, so inputs must list parents before children.
        let mut ids: Vec<i64> = Vec::with_capacity(facts.components.len());
        let mut seen: std::collections::HashSet<i64> = std::collections::HashSet::new();
        for (idx, comp) in facts.components.iter().enumerate() {
            let parent_id = match comp.parent {
                Some(p) if p < idx => Some(ids[p]),
                Some(p) => bail!("component {idx} references later parent {p}"),
                None => None,
            };
            let id = upsert_component_tx(
                &tx,
                file_id,
                parent_id,
                comp.kind.as_str(),
                &comp.name,
                comp.layer.as_str(),
            )?;
            if let Some(sql) = &comp.sql {
                let compressed = zstd::encode_all(sql.text.as_bytes(), ZSTD_LEVEL)
                    .with_context(|| "compress sql body")?;
                tx.execute(
                    "INSERT INTO sql_contents
                        (component_id, file_id, query_type, sql_text, created_at)
                     VALUES (?, ?, ?, ?, ?)
                     ON CONFLICT(component_id, file_id) DO UPDATE SET
                        query_type = excluded.query_type,
                        sql_text = excluded.sql_text",
                    params![id, file_id, sql.query_type, compressed, now],
                )?;
            }
            ids.push(id);
            seen.insert(id);
        }

        // The unreconciled remainder of the prior generation goes away, and
        // takes its dependent edges with it.
        for (_, prior_id) in prior.iter() {
            if seen.contains(prior_id) {
                continue;
            }
            tx.execute(
                "UPDATE relationships SET del_yn = 'Y', updated_at = ?1
                 WHERE del_yn = 'N' AND (src_id = ?2 OR dst_id = ?2)",
                params![now, prior_id],
            )?;
            tx.execute(
                "UPDATE components SET del_yn = 'Y', updated_at = ? WHERE component_id = ?",
                params![now, prior_id],
            )?;
        }

        // Class generation for this file.
        if let Some(class_name) = &facts.class_name {
            tx.execute(
                "UPDATE classes SET del_yn = 'Y', updated_at = ?
                 WHERE file_id = ? AND del_yn = 'N' AND class_name <> ?",
                params![now, file_id, class_name],
            )?;
            tx.execute(
                "INSERT INTO classes (file_id, class_name, has_error, del_yn, created_at, updated_at)
                 VALUES (?, ?, 0, 'N', ?, ?)
                 ON CONFLICT(file_id, class_name) DO UPDATE SET
                    del_yn = 'N', has_error = 0, updated_at = excluded.updated_at",
                params![file_id, class_name, now, now],
            )?;
        } else {
            tx.execute(
                "UPDATE classes SET del_yn = 'Y', updated_at = ?
                 WHERE file_id = ? AND del_yn = 'N'",
                params![now, file_id],
            )?;
        }

        // Edges sourced from this file belong to this generation: drop the
        // old set (and its parked references), then insert the new one.
        // Resolver-derived edges are re-derived on the next resolve pass.
        tx.execute(
            "UPDATE relationships SET del_yn = 'Y', updated_at = ?1
             WHERE del_yn = 'N'
               AND src_id IN (SELECT component_id FROM components WHERE file_id = ?2)",
            params![now, file_id],
        )?;
        tx.execute(
            "DELETE FROM pending_refs
             WHERE src_id IN (SELECT component_id FROM components WHERE file_id = ?)",
            params![file_id],
        )?;

        let mut edge_count = 0usize;
        for rel in &facts.relationships {
            let Some(src_id) = resolve_fact_ref(&tx, &rel.src, &ids)? else {
                debug!(kind = %rel.kind, "unresolved edge source, skipping");
                continue;
            };
            let dst_id = match resolve_fact_ref(&tx, &rel.dst, &ids)? {
                Some(id) => id,
                None => {
                    // The target may simply not be committed yet; park the
                    // reference so a later resolve pass can link it.
                    if let Some((target_kind, target_name)) = symbolic_target(&rel.dst) {
                        tx.execute(
                            "INSERT INTO pending_refs
                                (src_id, rel_type, target_kind, target_name, created_at)
                             VALUES (?, ?, ?, ?, ?)
                             ON CONFLICT(src_id, rel_type, target_kind, target_name)
                                DO NOTHING",
                            params![src_id, rel.kind.as_str(), target_kind, target_name, now],
                        )?;
                        debug!(kind = %rel.kind, target = target_name, "edge target not committed yet, parked");
                    } else {
                        debug!(kind = %rel.kind, "unresolved edge target, skipping");
                    }
                    continue;
                }
            };
            if src_id == dst_id {
                warn!(kind = %rel.kind, src_id, "self-loop edge from extractor, rejected");
                continue;
            }
            upsert_relationship_tx(&tx, src_id, dst_id, rel.kind.as_str())?;
            edge_count += 1;
        }

        tx.commit()?;
        Ok((ids.len(), edge_count))
    }
}

const COMPONENT_COLS: &str = "component_id, file_id, parent_id, component_type, component_name, \
                              layer, del_yn, created_at, updated_at";
const RELATIONSHIP_COLS: &str =
    "relationship_id, src_id, dst_id, rel_type, del_yn, created_at, updated_at";

fn component_row(row: &Row<'_>) -> rusqlite::Result<Component> {
    Ok(Component {
        component_id: row.get(0)?,
        file_id: row.get(1)?,
        parent_id: row.get(2)?,
        component_type: row.get(3)?,
        component_name: row.get(4)?,
        layer: row.get(5)?,
        deleted: row.get::<_, String>(6)? == "Y",
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn file_row(row: &Row<'_>) -> rusqlite::Result<FileRow> {
    Ok(FileRow {
        file_id: row.get(0)?,
        project_id: row.get(1)?,
        file_path: row.get(2)?,
        file_name: row.get(3)?,
        file_type: row.get(4)?,
        content_hash: row.get(5)?,
        deleted: row.get::<_, String>(6)? == "Y",
    })
}

fn relationship_row(row: &Row<'_>) -> rusqlite::Result<Relationship> {
    Ok(Relationship {
        relationship_id: row.get(0)?,
        src_id: row.get(1)?,
        dst_id: row.get(2)?,
        rel_type: row.get(3)?,
        deleted: row.get::<_, String>(4)? == "Y",
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn upsert_component_tx(
    tx: &Transaction<'_>,
    file_id: i64,
    parent_id: Option<i64>,
    kind: &str,
    name: &str,
    layer: &str,
) -> Result<i64> {
    let now = crate::util::now_ts();
    let existing: Option<i64> = tx
        .query_row(
            "SELECT component_id FROM components
             WHERE file_id = ? AND component_type = ? AND component_name = ?
               AND IFNULL(parent_id, 0) = IFNULL(?, 0)",
            params![file_id, kind, name, parent_id],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        tx.execute(
            "UPDATE components SET del_yn = 'N', layer = ?, updated_at = ? WHERE component_id = ?",
            params![layer, now, id],
        )?;
        return Ok(id);
    }
    tx.execute(
        "INSERT INTO components
            (file_id, parent_id, component_type, component_name, layer, del_yn, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, 'N', ?, ?)",
        params![file_id, parent_id, kind, name, layer, now, now],
    )?;
    Ok(tx.last_insert_rowid())
}

fn upsert_relationship_tx(tx: &Transaction<'_>, src_id: i64, dst_id: i64, kind: &str) -> Result<i64> {
    let now = crate::util::now_ts();
    let existing: Option<i64> = tx
        .query_row(
            "SELECT relationship_id FROM relationships
             WHERE src_id = ? AND dst_id = ? AND rel_type = ?",
            params![src_id, dst_id, kind],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        tx.execute(
            "UPDATE relationships SET del_yn = 'N', updated_at = ? WHERE relationship_id = ?",
            params![now, id],
        )?;
        return Ok(id);
    }
    tx.execute(
        "INSERT INTO relationships (src_id, dst_id, rel_type, del_yn, created_at, updated_at)
         VALUES (?, ?, ?, 'N', ?, ?)",
        params![src_id, dst_id, kind, now, now],
    )?;
    Ok(tx.last_insert_rowid())
}

fn symbolic_target(fact: &FactRef) -> Option<(&'static str, &str)> {
    match fact {
        FactRef::Statement(name) => Some(("statement", name)),
        FactRef::Endpoint(name) => Some(("endpoint", name)),
        FactRef::Local(_) => None,
    }
}

fn resolve_fact_ref(tx: &Transaction<'_>, fact: &FactRef, local_ids: &[i64]) -> Result<Option<i64>> {
    match fact {
        FactRef::Local(idx) => Ok(local_ids.get(*idx).copied()),
        FactRef::Statement(name) => {
            let id: Option<i64> = tx
                .query_row(
                    "SELECT component_id FROM components
                     WHERE del_yn = 'N' AND component_name = ?
                       AND component_type IN ('sql-select', 'sql-insert', 'sql-update', 'sql-delete')
                     ORDER BY component_id LIMIT 1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(id)
        }
        FactRef::Endpoint(name) => {
            let id: Option<i64> = tx
                .query_row(
                    "SELECT component_id FROM components
                     WHERE del_yn = 'N' AND component_type = 'endpoint' AND component_name = ?
                     ORDER BY component_id LIMIT 1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(id)
        }
    }
}

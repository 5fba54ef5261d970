//! SQLite store for users, tags, uploads and chunk text
//!
//! Durable record of everything the pipeline and retriever need to read back:
//! upload lifecycle, received parts, persisted text chunks, and the tag forest
//! that drives access control.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::{ChunkInfo, DocumentVector, FileUpload, OrganizationTag, UploadStatus, User, UserRole};

/// SQLite-backed metadata store
pub struct MetaStore {
    conn: Arc<Mutex<Connection>>,
}

impl MetaStore {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| Error::Internal(format!("failed to open database: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        store.migrate()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Internal(format!("failed to open in-memory database: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        store.migrate()?;
        Ok(store)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                role TEXT NOT NULL DEFAULT 'USER',
                org_tags TEXT NOT NULL DEFAULT '',
                primary_org TEXT
            );

            CREATE TABLE IF NOT EXISTS organization_tags (
                tag_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                parent_tag TEXT,
                created_by INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS file_upload (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_md5 TEXT NOT NULL,
                file_name TEXT NOT NULL,
                total_size INTEGER NOT NULL,
                status INTEGER NOT NULL DEFAULT 0,
                user_id INTEGER NOT NULL,
                org_tag TEXT NOT NULL DEFAULT '',
                is_public INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                merged_at TEXT,
                UNIQUE(file_md5, user_id)
            );

            CREATE INDEX IF NOT EXISTS idx_file_upload_status ON file_upload(status);

            CREATE TABLE IF NOT EXISTS chunk_info (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_md5 TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                storage_path TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_chunk_info_md5 ON chunk_info(file_md5);

            CREATE TABLE IF NOT EXISTS document_vectors (
                vector_id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_md5 TEXT NOT NULL,
                chunk_id INTEGER NOT NULL,
                text TEXT NOT NULL,
                model_version TEXT NOT NULL DEFAULT '',
                user_id INTEGER NOT NULL,
                org_tag TEXT NOT NULL DEFAULT '',
                is_public INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_document_vectors_md5 ON document_vectors(file_md5);
            "#,
        )
        .map_err(|e| Error::Internal(format!("failed to run migrations: {}", e)))?;

        tracing::debug!("metadata store migrations complete");
        Ok(())
    }

    // ==================== Users ====================

    /// Register a user: creates the account, its private tag
    /// `PRIVATE_<name>`, and declares the tag as the primary org.
    pub fn create_user(&self, name: &str) -> Result<User> {
        let conn = self.conn.lock();

        let existing: Option<i64> = conn
            .query_row("SELECT id FROM users WHERE name = ?1", params![name], |row| row.get(0))
            .optional()?;
        if existing.is_some() {
            return Err(Error::Conflict(format!("user '{}' already exists", name)));
        }

        let private_tag = format!("PRIVATE_{}", name);

        conn.execute(
            "INSERT INTO users (name, role, org_tags, primary_org) VALUES (?1, 'USER', ?2, ?2)",
            params![name, private_tag],
        )?;
        let user_id = conn.last_insert_rowid() as u64;

        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT OR IGNORE INTO organization_tags
             (tag_id, name, description, parent_tag, created_by, created_at, updated_at)
             VALUES (?1, ?2, 'private workspace tag', NULL, ?3, ?4, ?4)",
            params![private_tag, format!("{} private space", name), user_id as i64, now],
        )?;

        Ok(User {
            id: user_id,
            name: name.to_string(),
            role: UserRole::User,
            org_tags: vec![private_tag.clone()],
            primary_org: Some(private_tag),
        })
    }

    /// Get a user by id
    pub fn find_user(&self, user_id: u64) -> Result<User> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, name, role, org_tags, primary_org FROM users WHERE id = ?1",
            params![user_id as i64],
            row_to_user,
        )
        .optional()?
        .ok_or_else(|| Error::NotFound(format!("user {}", user_id)))
    }

    /// Get a user by name
    pub fn find_user_by_name(&self, name: &str) -> Result<User> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, name, role, org_tags, primary_org FROM users WHERE name = ?1",
            params![name],
            row_to_user,
        )
        .optional()?
        .ok_or_else(|| Error::NotFound(format!("user '{}'", name)))
    }

    /// Persist tag membership, primary org, and role changes
    pub fn update_user(&self, user: &User) -> Result<()> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE users SET role = ?1, org_tags = ?2, primary_org = ?3 WHERE id = ?4",
            params![
                user.role.as_str(),
                user.org_tags.join(","),
                user.primary_org,
                user.id as i64
            ],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("user {}", user.id)));
        }
        Ok(())
    }

    /// Declare a user into an existing tag; duplicates are ignored
    pub fn assign_tag(&self, user_id: u64, tag_id: &str) -> Result<()> {
        let tags = self.find_tags(&[tag_id.to_string()])?;
        if tags.is_empty() {
            return Err(Error::NotFound(format!("tag '{}'", tag_id)));
        }

        let mut user = self.find_user(user_id)?;
        if user.org_tags.iter().any(|t| t == tag_id) {
            return Ok(());
        }
        user.org_tags.push(tag_id.to_string());
        self.update_user(&user)
    }

    /// Set the user's primary org; the tag must already be declared
    pub fn set_primary_org(&self, user_id: u64, org_tag: &str) -> Result<()> {
        let mut user = self.find_user(user_id)?;
        if !user.org_tags.iter().any(|t| t == org_tag) {
            return Err(Error::Forbidden(format!(
                "user does not belong to organization '{}'",
                org_tag
            )));
        }
        user.primary_org = Some(org_tag.to_string());
        self.update_user(&user)
    }

    // ==================== Organization tags ====================

    /// Create a tag; parent must be absent or refer to an existing tag
    pub fn create_tag(
        &self,
        tag_id: &str,
        name: &str,
        description: &str,
        parent_tag: Option<&str>,
        created_by: u64,
    ) -> Result<OrganizationTag> {
        let conn = self.conn.lock();

        if let Some(parent) = parent_tag {
            let exists: Option<String> = conn
                .query_row(
                    "SELECT tag_id FROM organization_tags WHERE tag_id = ?1",
                    params![parent],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                return Err(Error::InvalidArgument(format!("parent tag '{}' does not exist", parent)));
            }
        }

        let now = Utc::now();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO organization_tags
             (tag_id, name, description, parent_tag, created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![tag_id, name, description, parent_tag, created_by as i64, now.to_rfc3339()],
        )?;
        if inserted == 0 {
            return Err(Error::Conflict(format!("tag '{}' already exists", tag_id)));
        }

        Ok(OrganizationTag {
            tag_id: tag_id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            parent_tag: parent_tag.map(|s| s.to_string()),
            created_by,
            created_at: now,
            updated_at: now,
        })
    }

    /// List every tag; the access resolver builds its parent map from this
    pub fn list_tags(&self) -> Result<Vec<OrganizationTag>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT tag_id, name, description, parent_tag, created_by, created_at, updated_at
             FROM organization_tags",
        )?;
        let tags = stmt
            .query_map([], row_to_tag)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    /// Batch-load tags by id, skipping unknown ids
    pub fn find_tags(&self, tag_ids: &[String]) -> Result<Vec<OrganizationTag>> {
        if tag_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock();
        let placeholders = vec!["?"; tag_ids.len()].join(",");
        let sql = format!(
            "SELECT tag_id, name, description, parent_tag, created_by, created_at, updated_at
             FROM organization_tags WHERE tag_id IN ({})",
            placeholders
        );
        let mut stmt = conn.prepare(&sql)?;
        let tags = stmt
            .query_map(rusqlite::params_from_iter(tag_ids.iter()), row_to_tag)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    // ==================== File uploads ====================

    /// Create an upload record; `(file_md5, user_id)` is unique
    pub fn create_upload(
        &self,
        file_md5: &str,
        file_name: &str,
        total_size: i64,
        user_id: u64,
        org_tag: &str,
        is_public: bool,
    ) -> Result<FileUpload> {
        let conn = self.conn.lock();
        let now = Utc::now();

        let inserted = conn.execute(
            "INSERT OR IGNORE INTO file_upload
             (file_md5, file_name, total_size, status, user_id, org_tag, is_public, created_at)
             VALUES (?1, ?2, ?3, 0, ?4, ?5, ?6, ?7)",
            params![
                file_md5,
                file_name,
                total_size,
                user_id as i64,
                org_tag,
                is_public as i64,
                now.to_rfc3339()
            ],
        )?;
        if inserted == 0 {
            return Err(Error::Conflict(format!(
                "upload record for ({}, {}) already exists",
                file_md5, user_id
            )));
        }

        Ok(FileUpload {
            id: conn.last_insert_rowid() as u64,
            file_md5: file_md5.to_string(),
            file_name: file_name.to_string(),
            total_size,
            status: UploadStatus::Uploading,
            user_id,
            org_tag: org_tag.to_string(),
            is_public,
            created_at: now,
            merged_at: None,
        })
    }

    /// Get the upload record for a `(md5, user)` pair
    pub fn get_upload(&self, file_md5: &str, user_id: u64) -> Result<Option<FileUpload>> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                "SELECT id, file_md5, file_name, total_size, status, user_id, org_tag, is_public,
                        created_at, merged_at
                 FROM file_upload WHERE file_md5 = ?1 AND user_id = ?2",
                params![file_md5, user_id as i64],
                row_to_upload,
            )
            .optional()?;
        Ok(record)
    }

    /// Advance the upload status; stamps `merged_at` on completion
    pub fn set_upload_status(&self, record_id: u64, status: UploadStatus) -> Result<()> {
        let conn = self.conn.lock();
        let merged_at = match status {
            UploadStatus::Complete => Some(Utc::now().to_rfc3339()),
            _ => None,
        };
        let changed = conn.execute(
            "UPDATE file_upload SET status = ?1, merged_at = COALESCE(?2, merged_at) WHERE id = ?3",
            params![status.as_i64(), merged_at, record_id as i64],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("upload record {}", record_id)));
        }
        Ok(())
    }

    /// Files the user may see: own uploads, global public files, and public
    /// files inside the user's declared orgs. Completed uploads only.
    pub fn find_accessible_uploads(&self, user_id: u64, org_tags: &[String]) -> Result<Vec<FileUpload>> {
        let conn = self.conn.lock();
        let placeholders = if org_tags.is_empty() {
            "''".to_string()
        } else {
            vec!["?"; org_tags.len()].join(",")
        };
        let sql = format!(
            "SELECT id, file_md5, file_name, total_size, status, user_id, org_tag, is_public,
                    created_at, merged_at
             FROM file_upload
             WHERE status = 1 AND (user_id = ?1 OR is_public = 1 OR (org_tag IN ({}) AND is_public = 1))
             ORDER BY created_at DESC",
            placeholders
        );
        let mut stmt = conn.prepare(&sql)?;

        let mut args: Vec<rusqlite::types::Value> = vec![(user_id as i64).into()];
        for tag in org_tags {
            args.push(tag.clone().into());
        }
        let records = stmt
            .query_map(rusqlite::params_from_iter(args), row_to_upload)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// All uploads owned by a user, regardless of status
    pub fn find_uploads_by_user(&self, user_id: u64) -> Result<Vec<FileUpload>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, file_md5, file_name, total_size, status, user_id, org_tag, is_public,
                    created_at, merged_at
             FROM file_upload WHERE user_id = ?1 ORDER BY created_at DESC",
        )?;
        let records = stmt
            .query_map(params![user_id as i64], row_to_upload)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Any user's upload record for a file; admin delete path
    pub fn find_upload_by_md5(&self, file_md5: &str) -> Result<Option<FileUpload>> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                "SELECT id, file_md5, file_name, total_size, status, user_id, org_tag, is_public,
                        created_at, merged_at
                 FROM file_upload WHERE file_md5 = ?1 LIMIT 1",
                params![file_md5],
                row_to_upload,
            )
            .optional()?;
        Ok(record)
    }

    /// Batch-load upload records for filename enrichment
    pub fn find_uploads_by_md5s(&self, md5s: &[String]) -> Result<Vec<FileUpload>> {
        if md5s.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock();
        let placeholders = vec!["?"; md5s.len()].join(",");
        let sql = format!(
            "SELECT id, file_md5, file_name, total_size, status, user_id, org_tag, is_public,
                    created_at, merged_at
             FROM file_upload WHERE file_md5 IN ({})",
            placeholders
        );
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(rusqlite::params_from_iter(md5s.iter()), row_to_upload)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Delete the upload and everything hanging off it: chunk rows, text
    /// chunks, and the upload record itself.
    pub fn delete_upload_records(&self, file_md5: &str, user_id: u64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM chunk_info WHERE file_md5 = ?1", params![file_md5])?;
        conn.execute("DELETE FROM document_vectors WHERE file_md5 = ?1", params![file_md5])?;
        conn.execute(
            "DELETE FROM file_upload WHERE file_md5 = ?1 AND user_id = ?2",
            params![file_md5, user_id as i64],
        )?;
        Ok(())
    }

    // ==================== Chunk info ====================

    /// Record a received part; duplicates are tolerated, the pipeline never
    /// reads these rows.
    pub fn insert_chunk_info(&self, file_md5: &str, chunk_index: u32, storage_path: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO chunk_info (file_md5, chunk_index, storage_path) VALUES (?1, ?2, ?3)",
            params![file_md5, chunk_index, storage_path],
        )?;
        Ok(())
    }

    /// Parts recorded for a file, ordered by index
    pub fn list_chunk_info(&self, file_md5: &str) -> Result<Vec<ChunkInfo>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, file_md5, chunk_index, storage_path FROM chunk_info
             WHERE file_md5 = ?1 ORDER BY chunk_index ASC",
        )?;
        let chunks = stmt
            .query_map(params![file_md5], |row| {
                Ok(ChunkInfo {
                    id: row.get::<_, i64>(0)? as u64,
                    file_md5: row.get(1)?,
                    chunk_index: row.get::<_, i64>(2)? as u32,
                    storage_path: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(chunks)
    }

    // ==================== Document vectors ====================

    /// Drop all text chunks for a file; returns the number removed
    pub fn delete_vectors(&self, file_md5: &str) -> Result<usize> {
        let conn = self.conn.lock();
        let deleted = conn.execute("DELETE FROM document_vectors WHERE file_md5 = ?1", params![file_md5])?;
        Ok(deleted)
    }

    /// Insert a batch of text chunks in one transaction
    pub fn insert_vectors(&self, rows: &[DocumentVector]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::Internal(format!("failed to begin transaction: {}", e)))?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO document_vectors
                 (file_md5, chunk_id, text, model_version, user_id, org_tag, is_public)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for row in rows {
                stmt.execute(params![
                    row.file_md5,
                    row.chunk_id,
                    row.text,
                    row.model_version,
                    row.user_id as i64,
                    row.org_tag,
                    row.is_public as i64,
                ])?;
            }
        }
        tx.commit()
            .map_err(|e| Error::Internal(format!("failed to commit batch: {}", e)))?;
        Ok(())
    }

    /// Read the persisted chunks for a file in chunk order; this yields the
    /// stable row ids used as vector ids.
    pub fn find_vectors(&self, file_md5: &str) -> Result<Vec<DocumentVector>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT vector_id, file_md5, chunk_id, text, model_version, user_id, org_tag, is_public
             FROM document_vectors WHERE file_md5 = ?1 ORDER BY chunk_id ASC",
        )?;
        let rows = stmt
            .query_map(params![file_md5], |row| {
                Ok(DocumentVector {
                    vector_id: row.get::<_, i64>(0)? as u64,
                    file_md5: row.get(1)?,
                    chunk_id: row.get::<_, i64>(2)? as u32,
                    text: row.get(3)?,
                    model_version: row.get(4)?,
                    user_id: row.get::<_, i64>(5)? as u64,
                    org_tag: row.get(6)?,
                    is_public: row.get::<_, i64>(7)? != 0,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    let org_tags: String = row.get(3)?;
    Ok(User {
        id: row.get::<_, i64>(0)? as u64,
        name: row.get(1)?,
        role: UserRole::from_str(&row.get::<_, String>(2)?),
        org_tags: org_tags
            .split(',')
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect(),
        primary_org: row.get(4)?,
    })
}

fn row_to_tag(row: &Row<'_>) -> rusqlite::Result<OrganizationTag> {
    Ok(OrganizationTag {
        tag_id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        parent_tag: row.get(3)?,
        created_by: row.get::<_, i64>(4)? as u64,
        created_at: parse_ts(&row.get::<_, String>(5)?),
        updated_at: parse_ts(&row.get::<_, String>(6)?),
    })
}

fn row_to_upload(row: &Row<'_>) -> rusqlite::Result<FileUpload> {
    Ok(FileUpload {
        id: row.get::<_, i64>(0)? as u64,
        file_md5: row.get(1)?,
        file_name: row.get(2)?,
        total_size: row.get(3)?,
        status: UploadStatus::from_i64(row.get(4)?),
        user_id: row.get::<_, i64>(5)? as u64,
        org_tag: row.get(6)?,
        is_public: row.get::<_, i64>(7)? != 0,
        created_at: parse_ts(&row.get::<_, String>(8)?),
        merged_at: row.get::<_, Option<String>>(9)?.map(|s| parse_ts(&s)),
    })
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_creates_private_tag() {
        let store = MetaStore::in_memory().unwrap();
        let user = store.create_user("alice").unwrap();

        assert_eq!(user.org_tags, vec!["PRIVATE_alice".to_string()]);
        assert_eq!(user.primary_org.as_deref(), Some("PRIVATE_alice"));

        let tags = store.list_tags().unwrap();
        assert!(tags.iter().any(|t| t.tag_id == "PRIVATE_alice"));

        assert!(matches!(store.create_user("alice"), Err(Error::Conflict(_))));
    }

    #[test]
    fn tag_assignment_and_primary_org() {
        let store = MetaStore::in_memory().unwrap();
        let user = store.create_user("bob").unwrap();
        store.create_tag("team", "Team", "", None, user.id).unwrap();

        // primary org must be a declared tag
        assert!(matches!(store.set_primary_org(user.id, "team"), Err(Error::Forbidden(_))));

        store.assign_tag(user.id, "team").unwrap();
        store.assign_tag(user.id, "team").unwrap(); // idempotent
        store.set_primary_org(user.id, "team").unwrap();

        let user = store.find_user(user.id).unwrap();
        assert_eq!(user.org_tags, vec!["PRIVATE_bob".to_string(), "team".to_string()]);
        assert_eq!(user.primary_org.as_deref(), Some("team"));

        assert!(matches!(store.assign_tag(user.id, "ghost"), Err(Error::NotFound(_))));
    }

    #[test]
    fn upload_record_unique_per_user() {
        let store = MetaStore::in_memory().unwrap();
        store.create_upload("a".repeat(32).as_str(), "a.pdf", 100, 1, "t1", false).unwrap();

        // same bytes, same user: rejected
        assert!(store.create_upload("a".repeat(32).as_str(), "a.pdf", 100, 1, "t1", false).is_err());
        // same bytes, another user: fine
        store.create_upload("a".repeat(32).as_str(), "a.pdf", 100, 2, "t1", false).unwrap();
    }

    #[test]
    fn status_advances_and_stamps_merge_time() {
        let store = MetaStore::in_memory().unwrap();
        let rec = store.create_upload("b".repeat(32).as_str(), "b.txt", 10, 1, "", false).unwrap();
        assert_eq!(rec.status, UploadStatus::Uploading);
        assert!(rec.merged_at.is_none());

        store.set_upload_status(rec.id, UploadStatus::Complete).unwrap();
        let rec = store.get_upload(&rec.file_md5, 1).unwrap().unwrap();
        assert_eq!(rec.status, UploadStatus::Complete);
        assert!(rec.merged_at.is_some());
    }

    #[test]
    fn accessible_uploads_use_declared_tags_only() {
        let store = MetaStore::in_memory().unwrap();
        let md5a = "a".repeat(32);
        let md5b = "b".repeat(32);
        let md5c = "c".repeat(32);

        let own = store.create_upload(&md5a, "own.pdf", 1, 1, "team", false).unwrap();
        let public = store.create_upload(&md5b, "pub.pdf", 1, 2, "other", true).unwrap();
        let private_other = store.create_upload(&md5c, "priv.pdf", 1, 2, "other", false).unwrap();
        for rec in [&own, &public, &private_other] {
            store.set_upload_status(rec.id, UploadStatus::Complete).unwrap();
        }

        let visible = store.find_accessible_uploads(1, &["team".to_string()]).unwrap();
        let names: Vec<_> = visible.iter().map(|f| f.file_name.as_str()).collect();
        assert!(names.contains(&"own.pdf"));
        assert!(names.contains(&"pub.pdf"));
        assert!(!names.contains(&"priv.pdf"));
    }

    #[test]
    fn vector_rows_reset_before_reinsert() {
        let store = MetaStore::in_memory().unwrap();
        let md5 = "d".repeat(32);

        let rows: Vec<DocumentVector> = (0..3)
            .map(|i| DocumentVector {
                vector_id: 0,
                file_md5: md5.clone(),
                chunk_id: i,
                text: format!("chunk {}", i),
                model_version: "m1".to_string(),
                user_id: 1,
                org_tag: "t".to_string(),
                is_public: false,
            })
            .collect();
        store.insert_vectors(&rows).unwrap();
        assert_eq!(store.find_vectors(&md5).unwrap().len(), 3);

        // re-processing deletes before inserting, so counts never grow
        assert_eq!(store.delete_vectors(&md5).unwrap(), 3);
        store.insert_vectors(&rows).unwrap();
        let persisted = store.find_vectors(&md5).unwrap();
        assert_eq!(persisted.len(), 3);
        assert_eq!(persisted[0].chunk_id, 0);
        assert_eq!(persisted[2].chunk_id, 2);
    }
}

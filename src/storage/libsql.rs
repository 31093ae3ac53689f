//! LibSQL storage backend implementation
//!
//! Stores every entity kind in one `records` table keyed by kind, with scalar
//! field values in a JSON column and relation memberships in
//! `record_relations`. Field semantics come from the entity registry.

use crate::error::{LearouError, Result, ValidationErrors};
use crate::registry::{EntityKind, FieldDescriptor, FieldType, Registry};
use crate::storage::Repository;
use crate::types::{EntityRecord, FieldInput, FieldValue, RecordId};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use libsql::{params, Builder, Connection, Database};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Migration files bundled into the binary, applied in order
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "001_initial_schema.sql",
        include_str!("../../migrations/libsql/001_initial_schema.sql"),
    ),
    (
        "002_add_indexes.sql",
        include_str!("../../migrations/libsql/002_add_indexes.sql"),
    ),
];

const RECORD_COLUMNS: &str = "id, kind, name, data, created_at, updated_at";

/// Parse SQL file into individual statements, handling multi-line constructs like triggers
fn parse_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut depth: i32 = 0; // BEGIN/END nesting depth

    for line in sql.lines() {
        let trimmed = line.trim();

        if current.is_empty() && (trimmed.is_empty() || trimmed.starts_with("--")) {
            continue;
        }

        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);

        let upper = trimmed.to_uppercase();
        if upper.starts_with("BEGIN") || upper.contains(" BEGIN") {
            depth += 1;
        }
        if upper.starts_with("END") {
            depth = depth.saturating_sub(1);
        }

        if trimmed.ends_with(';') && depth == 0 {
            statements.push(current.clone());
            current.clear();
        }
    }

    if !current.trim().is_empty() {
        statements.push(current);
    }

    statements
}

/// Record row before relations are attached
struct RawRecord {
    id: RecordId,
    name: String,
    data: Map<String, Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LearouError::Database(format!("Invalid timestamp '{}': {}", value, e)))
}

fn row_to_raw(row: &libsql::Row) -> Result<RawRecord> {
    let id: i64 = row.get(0)?;
    let name: String = row.get(2)?;
    let data_json: String = row.get(3)?;
    let data = match serde_json::from_str::<Value>(&data_json)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    let created_at: String = row.get(4)?;
    let updated_at: String = row.get(5)?;

    Ok(RawRecord {
        id: RecordId(id),
        name,
        data,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

/// JSON representation of a scalar field value; `None` for null
fn encode_scalar(field: &FieldDescriptor, value: &FieldValue) -> Option<Value> {
    match value {
        FieldValue::Null => None,
        FieldValue::Text(s) => Some(Value::String(s.clone())),
        FieldValue::Number(n) => serde_json::Number::from_f64(*n).map(Value::Number),
        FieldValue::Date(d) => Some(Value::String(d.format("%Y-%m-%d").to_string())),
        FieldValue::Bool(b) => Some(Value::Bool(*b)),
        FieldValue::Ref(_) | FieldValue::Refs(_) => {
            warn!("Relation value passed as scalar for field {}", field.name);
            None
        }
    }
}

fn decode_scalar(field: &FieldDescriptor, value: Option<&Value>) -> FieldValue {
    match (&field.field_type, value) {
        (FieldType::Boolean, v) => FieldValue::Bool(v.and_then(Value::as_bool).unwrap_or(false)),
        (_, None) | (_, Some(Value::Null)) => FieldValue::Null,
        (FieldType::Number, Some(v)) => v.as_f64().map(FieldValue::Number).unwrap_or(FieldValue::Null),
        (FieldType::Date, Some(v)) => v
            .as_str()
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            .map(FieldValue::Date)
            .unwrap_or(FieldValue::Null),
        (_, Some(v)) => v
            .as_str()
            .map(FieldValue::text)
            .unwrap_or(FieldValue::Null),
    }
}

/// Combine a raw row and its relation memberships into a record
fn assemble(kind: &EntityKind, raw: RawRecord, relations: &[(String, RecordId)]) -> EntityRecord {
    let mut values = BTreeMap::new();
    for field in kind.fields.iter().filter(|f| f.name != "name") {
        let value = if field.is_to_many() {
            FieldValue::refs(
                relations
                    .iter()
                    .filter(|(name, _)| name == field.name)
                    .map(|(_, id)| *id),
            )
        } else if field.is_to_one() {
            relations
                .iter()
                .find(|(name, _)| name == field.name)
                .map(|(_, id)| FieldValue::Ref(*id))
                .unwrap_or(FieldValue::Null)
        } else {
            decode_scalar(field, raw.data.get(field.name))
        };
        values.insert(field.name.to_string(), value);
    }

    EntityRecord {
        id: raw.id,
        kind: kind.slug.to_string(),
        name: raw.name,
        values,
        created_at: raw.created_at,
        updated_at: raw.updated_at,
    }
}

/// Referenced ids in a relation value
fn relation_targets(value: &FieldValue) -> Vec<RecordId> {
    match value {
        FieldValue::Ref(id) => vec![*id],
        FieldValue::Refs(ids) => ids.clone(),
        _ => Vec::new(),
    }
}

/// LibSQL storage backend
pub struct LibsqlStorage {
    db: Database,
    registry: Arc<Registry>,
}

impl LibsqlStorage {
    /// Validate database file before opening
    ///
    /// # Returns
    /// * `Ok(true)` if database exists and is valid
    /// * `Ok(false)` if database doesn't exist and must_exist=false
    /// * `Err(LearouError)` with actionable message if validation fails
    fn validate_database_file(db_path: &str, must_exist: bool) -> Result<bool> {
        use std::io::Read;
        use std::path::Path;

        let path = Path::new(db_path);

        if !path.exists() {
            if must_exist {
                return Err(LearouError::Database(format!(
                    "Database file not found at '{}'. Please run 'learou init' first or check your database path.",
                    db_path
                )));
            }
            return Ok(false);
        }

        // SQLite files start with "SQLite format 3\0"
        let mut header = [0u8; 16];
        let read = std::fs::File::open(path).and_then(|mut file| file.read(&mut header));
        match read {
            Ok(16) if &header == b"SQLite format 3\0" => {
                debug!("Database file validation passed: {}", db_path);
                Ok(true)
            }
            // Zero-length files are left behind by interrupted first runs
            Ok(0) => Ok(false),
            Ok(_) => Err(LearouError::Database(format!(
                "Database file at '{}' is corrupted or not a valid SQLite database. Please delete it and run 'learou init' to reinitialize.",
                db_path
            ))),
            Err(e) => Err(LearouError::Database(format!(
                "Cannot read database file at '{}': {}",
                db_path, e
            ))),
        }
    }

    /// Open a local database with validation
    ///
    /// # Arguments
    /// * `path` - Path to the database file
    /// * `create_if_missing` - If true, create database if it doesn't exist. If false, error on missing database.
    /// * `registry` - Entity kinds the store validates against
    pub async fn new_with_validation(
        path: &str,
        create_if_missing: bool,
        registry: Arc<Registry>,
    ) -> Result<Self> {
        info!(
            "Opening LibSQL database: {} (create_if_missing: {})",
            path, create_if_missing
        );

        let exists = Self::validate_database_file(path, !create_if_missing)?;
        if create_if_missing && !exists {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        LearouError::Database(format!(
                            "Failed to create database directory {}: {}",
                            parent.display(),
                            e
                        ))
                    })?;
                }
            }
        }

        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(|e| LearouError::Database(format!("Failed to create local database: {}", e)))?;

        info!("LibSQL database connection established");

        let storage = Self { db, registry };
        storage.check_database_health().await?;
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database; fails when the file is missing
    pub async fn new(path: &str, registry: Arc<Registry>) -> Result<Self> {
        Self::new_with_validation(path, false, registry).await
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations...");

        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations_applied (
                migration_name TEXT PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )",
            params![],
        )
        .await
        .map_err(|e| LearouError::Migration(format!("Failed to create migrations table: {}", e)))?;

        for (migration_name, sql) in MIGRATIONS {
            let mut rows = conn
                .query(
                    "SELECT COUNT(*) FROM _migrations_applied WHERE migration_name = ?",
                    params![*migration_name],
                )
                .await?;

            let already_applied = match rows.next().await? {
                Some(row) => row.get::<i64>(0).unwrap_or(0),
                None => 0,
            };

            if already_applied > 0 {
                debug!("Skipping already applied migration: {}", migration_name);
                continue;
            }

            let statements = parse_sql_statements(sql);
            debug!(
                "Parsed {} statements from {}",
                statements.len(),
                migration_name
            );
            for (i, statement) in statements.iter().enumerate() {
                let statement = statement.trim();
                if statement.is_empty() {
                    continue;
                }
                conn.execute(statement, params![]).await.map_err(|e| {
                    LearouError::Migration(format!(
                        "Failed to execute statement #{} in {}: {}\nStatement: {}",
                        i + 1,
                        migration_name,
                        e,
                        &statement[..statement.len().min(300)]
                    ))
                })?;
            }

            conn.execute(
                "INSERT INTO _migrations_applied (migration_name, applied_at) VALUES (?, ?)",
                params![*migration_name, Utc::now().timestamp()],
            )
            .await
            .map_err(|e| LearouError::Migration(format!("Failed to record migration: {}", e)))?;

            info!("Executed migration: {}", migration_name);
        }

        info!("Database migrations completed");
        Ok(())
    }

    /// Get a connection from the database
    fn get_conn(&self) -> Result<Connection> {
        self.db
            .connect()
            .map_err(|e| LearouError::Database(format!("Failed to get connection: {}", e)))
    }

    /// Check if database is healthy and operational
    pub async fn check_database_health(&self) -> Result<()> {
        debug!("Checking database health...");

        let conn = self.get_conn()?;
        match conn.query("SELECT 1", params![]).await {
            Ok(_) => {
                debug!("Database health check passed");
                Ok(())
            }
            Err(e) => {
                let error_msg = e.to_string();
                if error_msg.contains("readonly") || error_msg.contains("permission") {
                    Err(LearouError::Database(
                        "Database is read-only or permission denied. Check file permissions."
                            .to_string(),
                    ))
                } else if error_msg.contains("corrupt") || error_msg.contains("malformed") {
                    Err(LearouError::Database(
                        "Database appears to be corrupted. Consider restoring from backup."
                            .to_string(),
                    ))
                } else {
                    Err(LearouError::Database(format!(
                        "Health check failed: {}",
                        error_msg
                    )))
                }
            }
        }
    }

    /// Translate constraint failures raised by the store into validation errors
    fn write_error(kind: &EntityKind, err: libsql::Error) -> LearouError {
        let message = err.to_string();
        if message.contains("UNIQUE constraint failed") {
            if message.contains("records.name") {
                return LearouError::Validation(ValidationErrors::single(
                    "name",
                    format!("{} with this Name already exists.", kind.display_name),
                ));
            }
            if let Some(flag) = kind.single_active {
                return LearouError::Validation(ValidationErrors::single(
                    flag,
                    format!("Another {} is already active.", kind.display_name),
                ));
            }
        }
        if message.contains("locked") || message.contains("busy") {
            return LearouError::Database(
                "Transaction failed: database is locked. Another process may be writing."
                    .to_string(),
            );
        }
        LearouError::Database(message)
    }

    /// Log an audit event inside the write's transaction
    async fn log_audit(
        conn: &Connection,
        operation: &str,
        kind: &EntityKind,
        id: RecordId,
        metadata: Value,
    ) -> Result<()> {
        conn.execute(
            "INSERT INTO audit_log (operation, kind, record_id, metadata) VALUES (?, ?, ?, ?)",
            params![operation, kind.slug, id.0, metadata.to_string()],
        )
        .await?;
        Ok(())
    }

    async fn fetch_raw(
        conn: &Connection,
        kind: &EntityKind,
        id: RecordId,
    ) -> Result<Option<RawRecord>> {
        let sql = format!(
            "SELECT {} FROM records WHERE id = ? AND kind = ?",
            RECORD_COLUMNS
        );
        let mut rows = conn.query(&sql, params![id.0, kind.slug]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_raw(&row)?)),
            None => Ok(None),
        }
    }

    async fn fetch_relations(conn: &Connection, id: RecordId) -> Result<Vec<(String, RecordId)>> {
        let mut rows = conn
            .query(
                "SELECT field, target_id FROM record_relations WHERE source_id = ? ORDER BY target_id",
                params![id.0],
            )
            .await?;

        let mut relations = Vec::new();
        while let Some(row) = rows.next().await? {
            let field: String = row.get(0)?;
            let target: i64 = row.get(1)?;
            relations.push((field, RecordId(target)));
        }
        Ok(relations)
    }

    async fn load_record(
        conn: &Connection,
        kind: &EntityKind,
        id: RecordId,
    ) -> Result<EntityRecord> {
        let raw = Self::fetch_raw(conn, kind, id)
            .await?
            .ok_or_else(|| LearouError::not_found(kind.display_name, id))?;
        let relations = Self::fetch_relations(conn, id).await?;
        Ok(assemble(kind, raw, &relations))
    }

    async fn load_all(conn: &Connection, kind: &EntityKind) -> Result<Vec<EntityRecord>> {
        let sql = format!(
            "SELECT {} FROM records WHERE kind = ? ORDER BY id",
            RECORD_COLUMNS
        );
        let mut rows = conn.query(&sql, params![kind.slug]).await?;
        let mut raws = Vec::new();
        while let Some(row) = rows.next().await? {
            raws.push(row_to_raw(&row)?);
        }

        let mut relation_rows = conn
            .query(
                r#"
                SELECT rr.source_id, rr.field, rr.target_id
                FROM record_relations rr
                JOIN records r ON r.id = rr.source_id
                WHERE r.kind = ?
                ORDER BY rr.source_id, rr.target_id
                "#,
                params![kind.slug],
            )
            .await?;
        let mut relations: HashMap<i64, Vec<(String, RecordId)>> = HashMap::new();
        while let Some(row) = relation_rows.next().await? {
            let source: i64 = row.get(0)?;
            let field: String = row.get(1)?;
            let target: i64 = row.get(2)?;
            relations
                .entry(source)
                .or_default()
                .push((field, RecordId(target)));
        }

        Ok(raws
            .into_iter()
            .map(|raw| {
                let links = relations.remove(&raw.id.0).unwrap_or_default();
                assemble(kind, raw, &links)
            })
            .collect())
    }

    /// Store-dependent checks: unique name, reference targets, unique
    /// combinations and the single-active flag
    ///
    /// `merged` holds the record's values after the write; `existing` is the
    /// record being updated, if any.
    async fn check_constraints(
        &self,
        conn: &Connection,
        kind: &EntityKind,
        fields: &FieldInput,
        merged: &BTreeMap<String, FieldValue>,
        existing: Option<RecordId>,
    ) -> Result<()> {
        let mut errors = ValidationErrors::new();
        let self_id = existing.map(|id| id.0).unwrap_or(0);

        if let Some(name) = EntityKind::name_of(fields) {
            let mut rows = conn
                .query(
                    "SELECT id FROM records WHERE kind = ? AND name = ? AND id != ?",
                    params![kind.slug, name, self_id],
                )
                .await?;
            if rows.next().await?.is_some() {
                errors.add(
                    "name",
                    format!("{} with this Name already exists.", kind.display_name),
                );
            }
        }

        for (field, relation) in kind.relations() {
            let Some(value) = fields.get(field.name) else {
                continue;
            };
            for target in relation_targets(value) {
                let mut rows = conn
                    .query("SELECT kind FROM records WHERE id = ?", params![target.0])
                    .await?;
                let target_kind: Option<String> = match rows.next().await? {
                    Some(row) => Some(row.get(0)?),
                    None => None,
                };
                if target_kind.as_deref() != Some(relation.target) {
                    errors.add(
                        field.name,
                        format!(
                            "Select a valid choice. {} is not one of the available choices.",
                            target
                        ),
                    );
                }
            }
        }

        if let Some(flag) = kind.single_active {
            if merged.get(flag).and_then(FieldValue::as_bool) == Some(true) {
                let sql = format!(
                    "SELECT id FROM records WHERE kind = ? AND json_extract(data, '$.{}') = 1 AND id != ?",
                    flag
                );
                let mut rows = conn.query(&sql, params![kind.slug, self_id]).await?;
                if rows.next().await?.is_some() {
                    errors.add(
                        flag,
                        format!("Another {} is already active.", kind.display_name),
                    );
                }
            }
        }

        if !kind.unique_together.is_empty() {
            let others = Self::load_all(conn, kind).await?;
            for group in &kind.unique_together {
                let clash = others.iter().filter(|r| r.id.0 != self_id).any(|other| {
                    group.iter().all(|name| {
                        let ours = merged.get(*name).unwrap_or(&FieldValue::Null);
                        !ours.is_empty() && ours == other.value(name)
                    })
                });
                if clash {
                    errors.add(
                        crate::error::NON_FIELD_ERRORS,
                        format!(
                            "{} with this {} already exists.",
                            kind.display_name,
                            group.join(" and ")
                        ),
                    );
                }
            }
        }

        errors.into_result()
    }

    /// Write relation memberships for the provided relation fields
    async fn replace_relations(
        conn: &Connection,
        kind: &EntityKind,
        id: RecordId,
        fields: &FieldInput,
    ) -> Result<()> {
        for (field, _) in kind.relations() {
            let Some(value) = fields.get(field.name) else {
                continue;
            };
            conn.execute(
                "DELETE FROM record_relations WHERE source_id = ? AND field = ?",
                params![id.0, field.name],
            )
            .await?;
            for target in relation_targets(value) {
                conn.execute(
                    "INSERT INTO record_relations (source_id, field, target_id) VALUES (?, ?, ?)",
                    params![id.0, field.name, target.0],
                )
                .await?;
            }
        }
        Ok(())
    }

    /// Scalar values as stored in the JSON column
    fn scalar_data(
        kind: &EntityKind,
        mut data: Map<String, Value>,
        fields: &FieldInput,
    ) -> Map<String, Value> {
        for field in kind
            .fields
            .iter()
            .filter(|f| f.name != "name" && f.relation().is_none())
        {
            let Some(value) = fields.get(field.name) else {
                continue;
            };
            match encode_scalar(field, value) {
                Some(json) => {
                    data.insert(field.name.to_string(), json);
                }
                None => {
                    data.remove(field.name);
                }
            }
        }
        data
    }

    async fn create_in(
        &self,
        conn: &Connection,
        kind: &EntityKind,
        fields: &FieldInput,
    ) -> Result<RecordId> {
        let merged: BTreeMap<String, FieldValue> = fields.clone();
        self.check_constraints(conn, kind, fields, &merged, None)
            .await?;

        let name = EntityKind::name_of(fields).unwrap_or_default().to_string();
        let data = Self::scalar_data(kind, Map::new(), fields);
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO records (kind, name, data, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
            params![kind.slug, name, Value::Object(data).to_string(), now.clone(), now],
        )
        .await
        .map_err(|e| Self::write_error(kind, e))?;
        let id = RecordId(conn.last_insert_rowid());

        Self::replace_relations(conn, kind, id, fields).await?;
        Ok(id)
    }

    async fn update_in(
        &self,
        conn: &Connection,
        kind: &EntityKind,
        id: RecordId,
        fields: &FieldInput,
    ) -> Result<()> {
        let current = Self::load_record(conn, kind, id).await?;

        let mut merged = current.values.clone();
        for (name, value) in fields {
            merged.insert(name.clone(), value.clone());
        }
        self.check_constraints(conn, kind, fields, &merged, Some(id))
            .await?;

        let name = EntityKind::name_of(fields)
            .map(str::to_string)
            .unwrap_or(current.name);
        let raw = Self::fetch_raw(conn, kind, id)
            .await?
            .ok_or_else(|| LearouError::not_found(kind.display_name, id))?;
        let data = Self::scalar_data(kind, raw.data, fields);

        conn.execute(
            "UPDATE records SET name = ?, data = ?, updated_at = ? WHERE id = ?",
            params![
                name,
                Value::Object(data).to_string(),
                Utc::now().to_rfc3339(),
                id.0
            ],
        )
        .await
        .map_err(|e| Self::write_error(kind, e))?;

        Self::replace_relations(conn, kind, id, fields).await
    }

    /// Collect the records a delete removes and the references it clears
    ///
    /// Records holding a required to-one reference to a deleted record are
    /// deleted too; optional to-one references are cleared.
    async fn delete_in(
        &self,
        conn: &Connection,
        kind: &EntityKind,
        id: RecordId,
    ) -> Result<Vec<RecordId>> {
        let mut deleted: Vec<RecordId> = Vec::new();
        let mut visited: HashSet<i64> = HashSet::new();
        let mut queue: VecDeque<(String, RecordId)> = VecDeque::new();
        queue.push_back((kind.slug.to_string(), id));

        while let Some((slug, target)) = queue.pop_front() {
            if !visited.insert(target.0) {
                continue;
            }
            deleted.push(target);

            for (source_kind, field) in self.registry.incoming(&slug) {
                if !field.is_to_one() {
                    continue;
                }
                let mut rows = conn
                    .query(
                        r#"
                        SELECT rr.source_id FROM record_relations rr
                        JOIN records r ON r.id = rr.source_id
                        WHERE rr.field = ? AND rr.target_id = ? AND r.kind = ?
                        "#,
                        params![field.name, target.0, source_kind.slug],
                    )
                    .await?;
                let mut sources = Vec::new();
                while let Some(row) = rows.next().await? {
                    sources.push(RecordId(row.get::<i64>(0)?));
                }

                for source in sources {
                    if field.required {
                        debug!(
                            "Cascading delete of {} {} via {}",
                            source_kind.slug, source, field.name
                        );
                        queue.push_back((source_kind.slug.to_string(), source));
                    } else {
                        debug!(
                            "Clearing {}.{} on {} after delete of {}",
                            source_kind.slug, field.name, source, target
                        );
                        conn.execute(
                            "DELETE FROM record_relations WHERE source_id = ? AND field = ? AND target_id = ?",
                            params![source.0, field.name, target.0],
                        )
                        .await?;
                    }
                }
            }
        }

        for record in &deleted {
            conn.execute(
                "DELETE FROM record_relations WHERE source_id = ? OR target_id = ?",
                params![record.0, record.0],
            )
            .await?;
            conn.execute("DELETE FROM records WHERE id = ?", params![record.0])
                .await?;
        }

        Ok(deleted)
    }
}

#[async_trait]
impl Repository for LibsqlStorage {
    async fn list_all(&self, kind: &EntityKind) -> Result<Vec<EntityRecord>> {
        debug!("Listing {} records", kind.slug);
        let conn = self.get_conn()?;
        let records = Self::load_all(&conn, kind).await?;
        debug!("Listed {} {} records", records.len(), kind.slug);
        Ok(records)
    }

    async fn get(&self, kind: &EntityKind, id: RecordId) -> Result<EntityRecord> {
        debug!("Fetching {} {}", kind.slug, id);
        let conn = self.get_conn()?;
        Self::load_record(&conn, kind, id).await
    }

    async fn create(&self, kind: &EntityKind, fields: &FieldInput) -> Result<EntityRecord> {
        debug!("Creating {} record", kind.slug);
        kind.check_fields(fields, true)?;

        let conn = self.get_conn()?;
        let tx = conn.transaction().await?;
        let written = async {
            let id = self.create_in(&tx, kind, fields).await?;
            Self::log_audit(
                &tx,
                "create",
                kind,
                id,
                serde_json::json!({ "name": EntityKind::name_of(fields) }),
            )
            .await?;
            Ok::<_, LearouError>(id)
        }
        .await;
        let id = match written {
            Ok(id) => id,
            Err(e) => {
                let _ = tx.rollback().await;
                return Err(e);
            }
        };
        tx.commit().await.map_err(|e| Self::write_error(kind, e))?;

        info!("Created {} {}", kind.slug, id);
        self.get(kind, id).await
    }

    async fn update(
        &self,
        kind: &EntityKind,
        id: RecordId,
        fields: &FieldInput,
    ) -> Result<EntityRecord> {
        debug!("Updating {} {}", kind.slug, id);
        kind.check_fields(fields, false)?;

        let conn = self.get_conn()?;
        let tx = conn.transaction().await?;
        let written = async {
            self.update_in(&tx, kind, id, fields).await?;
            let changed: Vec<&String> = fields.keys().collect();
            Self::log_audit(&tx, "update", kind, id, serde_json::json!({ "fields": changed })).await
        }
        .await;
        if let Err(e) = written {
            let _ = tx.rollback().await;
            return Err(e);
        }
        tx.commit().await.map_err(|e| Self::write_error(kind, e))?;

        self.get(kind, id).await
    }

    async fn delete(&self, kind: &EntityKind, id: RecordId) -> Result<()> {
        debug!("Deleting {} {}", kind.slug, id);

        let conn = self.get_conn()?;
        let tx = conn.transaction().await?;
        if Self::fetch_raw(&tx, kind, id).await?.is_none() {
            let _ = tx.rollback().await;
            return Err(LearouError::not_found(kind.display_name, id));
        }
        let written = async {
            let deleted = self.delete_in(&tx, kind, id).await?;
            let cascaded: Vec<i64> = deleted.iter().skip(1).map(|r| r.0).collect();
            Self::log_audit(&tx, "delete", kind, id, serde_json::json!({ "cascaded": cascaded }))
                .await?;
            Ok::<_, LearouError>(cascaded)
        }
        .await;
        let cascaded = match written {
            Ok(cascaded) => cascaded,
            Err(e) => {
                let _ = tx.rollback().await;
                return Err(e);
            }
        };
        tx.commit().await.map_err(|e| Self::write_error(kind, e))?;

        if !cascaded.is_empty() {
            info!(
                "Deleted {} {} with {} cascaded records",
                kind.slug,
                id,
                cascaded.len()
            );
        }
        Ok(())
    }

    async fn find_by_name(&self, kind: &EntityKind, name: &str) -> Result<Option<EntityRecord>> {
        let conn = self.get_conn()?;
        let mut rows = conn
            .query(
                "SELECT id FROM records WHERE kind = ? AND name = ?",
                params![kind.slug, name.trim()],
            )
            .await?;
        let id = match rows.next().await? {
            Some(row) => RecordId(row.get::<i64>(0)?),
            None => return Ok(None),
        };
        Self::load_record(&conn, kind, id).await.map(Some)
    }

    async fn label_of(&self, id: RecordId) -> Result<Option<String>> {
        let conn = self.get_conn()?;
        let mut rows = conn
            .query("SELECT name FROM records WHERE id = ?", params![id.0])
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row.get::<String>(0)?)),
            None => Ok(None),
        }
    }

    async fn referrers(
        &self,
        kind: &EntityKind,
        field: &str,
        target: RecordId,
    ) -> Result<Vec<EntityRecord>> {
        let conn = self.get_conn()?;
        let mut rows = conn
            .query(
                r#"
                SELECT r.id FROM records r
                JOIN record_relations rr ON rr.source_id = r.id
                WHERE r.kind = ? AND rr.field = ? AND rr.target_id = ?
                ORDER BY r.id
                "#,
                params![kind.slug, field, target.0],
            )
            .await?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(RecordId(row.get::<i64>(0)?));
        }

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            records.push(Self::load_record(&conn, kind, id).await?);
        }
        Ok(records)
    }

    async fn display_alias(&self, slug: &str) -> Result<Option<String>> {
        let conn = self.get_conn()?;
        let mut rows = conn
            .query(
                r#"
                SELECT json_extract(a.data, '$.custom_name')
                FROM records a
                JOIN record_relations rr ON rr.source_id = a.id AND rr.field = 'collection'
                JOIN records c ON c.id = rr.target_id
                WHERE a.kind = ? AND json_extract(a.data, '$.model') = ?
                  AND c.kind = ? AND json_extract(c.data, '$.active') = 1
                LIMIT 1
                "#,
                params![
                    crate::registry::kinds::NAMING_ALIAS,
                    slug,
                    crate::registry::kinds::NAMING_COLLECTION
                ],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get::<Option<String>>(0)?.filter(|s| !s.trim().is_empty())),
            None => Ok(None),
        }
    }

    async fn count(&self, kind: &EntityKind) -> Result<usize> {
        let conn = self.get_conn()?;
        let mut rows = conn
            .query("SELECT COUNT(*) FROM records WHERE kind = ?", params![kind.slug])
            .await?;
        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        Ok(count as usize)
    }
}

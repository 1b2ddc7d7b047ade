//! The migration runner.
//!
//! Discovers `<version>_<name>.sql` files on disk, each split into an
//! up/down pair by `-- migrate:up`/`-- migrate:down` markers, and applies or
//! reverts them against a `schema_migrations` tracking table, one
//! transaction per migration. A SHA-256 checksum of each file's content
//! guards against a completed migration's file being edited out from under
//! a deployment after the fact.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};

use crate::connection::{column_to_param, Connection};
use crate::error::{Error, Result};
use spectro_sql::SqlParam;

/// One migration, parsed from a `<version>_<name>.sql` file.
#[derive(Clone, Debug)]
pub struct MigrationFile {
    pub version: u64,
    pub version_str: String,
    pub name: String,
    pub up_sql: String,
    pub down_sql: String,
    pub checksum: String,
    pub path: PathBuf,
}

/// The lifecycle state of one migration, as recorded in `schema_migrations`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MigrationState {
    Pending,
    Completed,
    Failed,
}

impl MigrationState {
    fn as_str(self) -> &'static str {
        match self {
            MigrationState::Pending => "pending",
            MigrationState::Completed => "completed",
            MigrationState::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(MigrationState::Pending),
            "completed" => Ok(MigrationState::Completed),
            "failed" => Ok(MigrationState::Failed),
            other => Err(Error::InternalError(format!(
                "unrecognized migration status in schema_migrations: {other}"
            ))),
        }
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row of `schema_migrations`.
#[derive(Clone, Debug)]
pub struct MigrationRecord {
    pub version: String,
    pub name: String,
    pub status: MigrationState,
    pub applied_at: Option<DateTime<Utc>>,
    pub checksum: String,
}

/// One entry of [`Runner::status`]: a discovered file, its database record
/// (if any has been written), or both.
#[derive(Clone, Debug)]
pub struct MigrationStatusEntry {
    pub version: String,
    pub name: String,
    pub on_disk: bool,
    pub record: Option<MigrationRecord>,
}

impl MigrationFile {
    /// Parse a migration out of its filename and content. The filename must
    /// be `<version>_<name>.sql` where `version` is all ASCII digits --
    /// versions are compared numerically so `"9_x"` sorts before `"10_y"`,
    /// which a plain string comparison would get backwards.
    fn parse(path: &Path, content: &str) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidMigrationFile {
            path: path.display().to_string(),
            reason,
        };

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| invalid("filename is not valid UTF-8".to_string()))?;

        let (version_str, name) = stem
            .split_once('_')
            .ok_or_else(|| invalid("expected <version>_<name>.sql".to_string()))?;

        if version_str.is_empty() || !version_str.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid(format!(
                "version \"{version_str}\" must be all ASCII digits"
            )));
        }
        let version = version_str
            .parse::<u64>()
            .map_err(|e| invalid(format!("version does not fit a u64: {e}")))?;

        let (up_sql, down_sql) = split_sections(content)
            .map_err(|reason| invalid(reason))?;

        let checksum = checksum_of(&up_sql, &down_sql);

        Ok(MigrationFile {
            version,
            version_str: version_str.to_string(),
            name: name.to_string(),
            up_sql,
            down_sql,
            checksum,
            path: path.to_path_buf(),
        })
    }
}

fn checksum_of(up_sql: &str, down_sql: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(up_sql.as_bytes());
    hasher.update(b"\0");
    hasher.update(down_sql.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Split a migration file's content into its up/down sections at
/// `-- migrate:up` / `-- migrate:down` markers. Both sections are required;
/// a file with neither marker, or with content before the first marker, is
/// rejected rather than silently treated as part of one section.
fn split_sections(content: &str) -> std::result::Result<(String, String), String> {
    #[derive(PartialEq)]
    enum Section {
        None,
        Up,
        Down,
    }

    let mut up = String::new();
    let mut down = String::new();
    let mut current = Section::None;

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.eq_ignore_ascii_case("-- migrate:up") {
            current = Section::Up;
            continue;
        }
        if trimmed.eq_ignore_ascii_case("-- migrate:down") {
            current = Section::Down;
            continue;
        }
        match current {
            Section::Up => {
                up.push_str(line);
                up.push('\n');
            }
            Section::Down => {
                down.push_str(line);
                down.push('\n');
            }
            Section::None => {}
        }
    }

    if up.trim().is_empty() {
        return Err("missing -- migrate:up section".to_string());
    }
    if down.trim().is_empty() {
        return Err("missing -- migrate:down section".to_string());
    }
    Ok((up.trim().to_string(), down.trim().to_string()))
}

/// Split a block of SQL into individual statements, honoring dollar-quoted
/// bodies (`$$...$$`/`$tag$...$tag$`), `--` line comments, and `/* ... */`
/// block comments so none of them are mistaken for a statement terminator.
fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut chars = sql.chars().peekable();
    let mut dollar_tag: Option<String> = None;

    while let Some(ch) = chars.next() {
        if let Some(tag) = &dollar_tag {
            current.push(ch);
            if ch == '$' {
                let mut candidate = String::from("$");
                while let Some(&next) = chars.peek() {
                    if next.is_alphanumeric() || next == '_' {
                        candidate.push(next);
                        current.push(next);
                        chars.next();
                    } else if next == '$' {
                        candidate.push(next);
                        current.push(next);
                        chars.next();
                        break;
                    } else {
                        break;
                    }
                }
                if &candidate == tag {
                    dollar_tag = None;
                }
            }
            continue;
        }

        if ch == '-' && chars.peek() == Some(&'-') {
            current.push(ch);
            while let Some(&next) = chars.peek() {
                current.push(next);
                chars.next();
                if next == '\n' {
                    break;
                }
            }
            continue;
        }

        if ch == '/' && chars.peek() == Some(&'*') {
            current.push(ch);
            current.push('*');
            chars.next();
            let mut prev = '\0';
            for next in chars.by_ref() {
                current.push(next);
                if prev == '*' && next == '/' {
                    break;
                }
                prev = next;
            }
            continue;
        }

        if ch == '$' {
            current.push(ch);
            let mut candidate = String::from("$");
            while let Some(&next) = chars.peek() {
                if next.is_alphanumeric() || next == '_' {
                    candidate.push(next);
                    current.push(next);
                    chars.next();
                } else if next == '$' {
                    candidate.push(next);
                    current.push(next);
                    chars.next();
                    dollar_tag = Some(candidate);
                    break;
                } else {
                    break;
                }
            }
            continue;
        }

        if ch == ';' {
            push_statement_if_non_empty(&mut statements, &current);
            current.clear();
            continue;
        }

        current.push(ch);
    }
    push_statement_if_non_empty(&mut statements, &current);
    statements
}

fn push_statement_if_non_empty(statements: &mut Vec<String>, raw: &str) {
    let stmt = raw.trim();
    let has_sql = stmt
        .lines()
        .map(str::trim)
        .any(|line| !line.is_empty() && !line.starts_with("--"));
    if has_sql {
        statements.push(stmt.to_string());
    }
}

/// Applies and reverts migrations against one connection.
pub struct Runner {
    conn: Connection,
    migrations_dir: PathBuf,
}

impl Runner {
    pub fn new(conn: Connection, migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            conn,
            migrations_dir: migrations_dir.into(),
        }
    }

    /// Create `schema_migrations` if it doesn't already exist. Idempotent,
    /// and safe to call at the top of every other method.
    #[instrument(skip(self))]
    pub async fn ensure_table(&self) -> Result<()> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS schema_migrations (\
                   version text PRIMARY KEY, \
                   name text NOT NULL, \
                   status text NOT NULL, \
                   applied_at timestamptz NULL, \
                   checksum text NOT NULL\
                 )",
                &[],
            )
            .await?;
        Ok(())
    }

    /// Scan `migrations_dir` for `<version>_<name>.sql` files, parse each,
    /// and sort the result by version ascending (numerically, not
    /// lexicographically). Rejects two files declaring the same version.
    pub fn discover(&self) -> Result<Vec<MigrationFile>> {
        let entries = std::fs::read_dir(&self.migrations_dir).map_err(|e| Error::InvalidMigrationFile {
            path: self.migrations_dir.display().to_string(),
            reason: format!("cannot read migrations directory: {e}"),
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::InvalidMigrationFile {
                path: self.migrations_dir.display().to_string(),
                reason: format!("cannot read directory entry: {e}"),
            })?;
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("sql") {
                continue;
            }
            let content = std::fs::read_to_string(&path).map_err(|e| Error::InvalidMigrationFile {
                path: path.display().to_string(),
                reason: format!("cannot read file: {e}"),
            })?;
            files.push(MigrationFile::parse(&path, &content)?);
        }

        files.sort_by_key(|f| f.version);

        for window in files.windows(2) {
            if window[0].version == window[1].version {
                return Err(Error::MigrationVersionConflict {
                    version: window[0].version_str.clone(),
                });
            }
        }

        Ok(files)
    }

    async fn fetch_records(&self) -> Result<IndexMap<String, MigrationRecord>> {
        let rows = self
            .conn
            .fetch_all(
                "SELECT version, name, status, applied_at, checksum FROM schema_migrations ORDER BY version",
                &[],
            )
            .await?;

        let mut records = IndexMap::new();
        for row in &rows {
            let version = match column_to_param(row, "version", "TEXT")? {
                SqlParam::Text(v) => v,
                other => return Err(Error::InternalError(format!("unexpected version column value: {other:?}"))),
            };
            let name = match column_to_param(row, "name", "TEXT")? {
                SqlParam::Text(v) => v,
                other => return Err(Error::InternalError(format!("unexpected name column value: {other:?}"))),
            };
            let status = match column_to_param(row, "status", "TEXT")? {
                SqlParam::Text(v) => MigrationState::parse(&v)?,
                other => return Err(Error::InternalError(format!("unexpected status column value: {other:?}"))),
            };
            let applied_at = match column_to_param(row, "applied_at", "TIMESTAMPTZ")? {
                SqlParam::Timestamp(ts) => Some(ts),
                SqlParam::Null => None,
                other => return Err(Error::InternalError(format!("unexpected applied_at column value: {other:?}"))),
            };
            let checksum = match column_to_param(row, "checksum", "TEXT")? {
                SqlParam::Text(v) => v,
                other => return Err(Error::InternalError(format!("unexpected checksum column value: {other:?}"))),
            };
            records.insert(
                version.clone(),
                MigrationRecord {
                    version,
                    name,
                    status,
                    applied_at,
                    checksum,
                },
            );
        }
        Ok(records)
    }

    /// Discovered files outer-joined with their database status, ordered by
    /// version ascending. A version present on disk but never applied shows
    /// `record: None`; a version applied but since deleted from disk shows
    /// `on_disk: false`.
    pub async fn status(&self) -> Result<Vec<MigrationStatusEntry>> {
        self.ensure_table().await?;
        let files = self.discover()?;
        let mut records = self.fetch_records().await?;

        let mut entries: IndexMap<String, MigrationStatusEntry> = IndexMap::new();
        for file in &files {
            entries.insert(
                file.version_str.clone(),
                MigrationStatusEntry {
                    version: file.version_str.clone(),
                    name: file.name.clone(),
                    on_disk: true,
                    record: records.shift_remove(&file.version_str),
                },
            );
        }
        for (version, record) in records {
            entries.insert(
                version.clone(),
                MigrationStatusEntry {
                    version,
                    name: record.name.clone(),
                    on_disk: false,
                    record: Some(record),
                },
            );
        }
        entries.sort_by(|a, _, b, _| numeric_version_cmp(a, b));
        Ok(entries.into_values().collect())
    }

    /// Apply every pending migration in ascending version order, stopping
    /// (and leaving later migrations untouched) at the first failure. A
    /// migration already marked `failed` blocks the run outright: it must be
    /// resolved by hand before anything past it is attempted.
    #[instrument(skip(self))]
    pub async fn up(&self) -> Result<Vec<String>> {
        self.ensure_table().await?;
        let files = self.discover()?;
        let records = self.fetch_records().await?;

        let mut applied = Vec::new();
        for file in &files {
            match records.get(&file.version_str) {
                Some(record) if record.status == MigrationState::Completed => {
                    if record.checksum != file.checksum {
                        return Err(Error::InvalidMigrationFile {
                            path: file.path.display().to_string(),
                            reason: format!(
                                "checksum mismatch for already-applied migration {}: file was modified after being applied",
                                file.version_str
                            ),
                        });
                    }
                    continue;
                }
                Some(record) if record.status == MigrationState::Failed => {
                    return Err(Error::MigrationFailed {
                        version: file.version_str.clone(),
                        reason: "a prior attempt at this migration is marked failed; resolve it before continuing".to_string(),
                    });
                }
                _ => {}
            }

            if let Err(err) = self.apply_one(file).await {
                let _ = self.mark_failed(file).await;
                return Err(err);
            }
            applied.push(file.version_str.clone());
        }

        info!(count = applied.len(), "applied migrations");
        Ok(applied)
    }

    async fn apply_one(&self, file: &MigrationFile) -> Result<()> {
        let tx = self.conn.begin().await?;
        for (idx, statement) in split_statements(&file.up_sql).iter().enumerate() {
            tx.execute(statement, &[]).await.map_err(|e| Error::MigrationFailed {
                version: file.version_str.clone(),
                reason: format!("statement {} failed: {e}", idx + 1),
            })?;
        }
        tx.execute(
            "INSERT INTO schema_migrations (version, name, status, applied_at, checksum) \
             VALUES ($1, $2, 'completed', now(), $3) \
             ON CONFLICT (version) DO UPDATE SET status = 'completed', applied_at = now(), checksum = EXCLUDED.checksum",
            &[
                SqlParam::Text(file.version_str.clone()),
                SqlParam::Text(file.name.clone()),
                SqlParam::Text(file.checksum.clone()),
            ],
        )
        .await?;
        tx.commit().await?;
        info!(version = %file.version_str, "applied migration");
        Ok(())
    }

    /// Best-effort write of a `failed` status row, run against the runner's
    /// own connection rather than the already-rolled-back transaction that
    /// just failed.
    async fn mark_failed(&self, file: &MigrationFile) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO schema_migrations (version, name, status, applied_at, checksum) \
                 VALUES ($1, $2, 'failed', NULL, $3) \
                 ON CONFLICT (version) DO UPDATE SET status = 'failed'",
                &[
                    SqlParam::Text(file.version_str.clone()),
                    SqlParam::Text(file.name.clone()),
                    SqlParam::Text(file.checksum.clone()),
                ],
            )
            .await?;
        Ok(())
    }

    /// Revert the `step` most recently completed migrations, most-recent
    /// first. Each reverted migration must still exist on disk; if its file
    /// has been deleted this fails with [`Error::MigrationNotFound`] rather
    /// than silently skipping it.
    #[instrument(skip(self))]
    pub async fn down(&self, step: usize) -> Result<Vec<String>> {
        self.ensure_table().await?;
        let files = self.discover()?;
        let records = self.fetch_records().await?;

        let mut completed: Vec<&MigrationRecord> = records
            .values()
            .filter(|r| r.status == MigrationState::Completed)
            .collect();
        completed.sort_by(|a, b| numeric_version_cmp(&b.version, &a.version));

        let mut reverted = Vec::new();
        for record in completed.into_iter().take(step) {
            let file = files
                .iter()
                .find(|f| f.version_str == record.version)
                .ok_or_else(|| Error::MigrationNotFound {
                    version: record.version.clone(),
                })?;

            let tx = self.conn.begin().await?;
            for (idx, statement) in split_statements(&file.down_sql).iter().enumerate() {
                tx.execute(statement, &[]).await.map_err(|e| Error::MigrationFailed {
                    version: file.version_str.clone(),
                    reason: format!("rollback statement {} failed: {e}", idx + 1),
                })?;
            }
            tx.execute(
                "DELETE FROM schema_migrations WHERE version = $1",
                &[SqlParam::Text(file.version_str.clone())],
            )
            .await?;
            tx.commit().await?;
            info!(version = %file.version_str, "reverted migration");
            reverted.push(file.version_str.clone());
        }

        if reverted.is_empty() {
            warn!("no completed migrations to roll back");
        }
        Ok(reverted)
    }
}

fn numeric_version_cmp(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

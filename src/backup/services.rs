use std::{io, path::Path};

use anyhow::Context;
use serde::Serialize;
use time::{macros::format_description, OffsetDateTime};
use tracing::{info, warn};

use crate::{
    error::{AppError, AppResult},
    state::AppState,
};

pub const BACKUP_PREFIX: &str = "backup_";
pub const RESTORE_PREFIX: &str = "restore_";

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotInfo {
    pub name: String,
    pub size: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub modified: OffsetDateTime,
}

/// `<prefix>YYYYMMDD_HHMMSS.sql` in UTC.
pub fn snapshot_name(prefix: &str, at: OffsetDateTime) -> anyhow::Result<String> {
    let stamp = at.format(format_description!(
        "[year][month][day]_[hour][minute][second]"
    ))?;
    Ok(format!("{}{}.sql", prefix, stamp))
}

/// A bare `.sql` file name inside the backup directory.
pub fn validate_snapshot_name(name: &str) -> AppResult<()> {
    let ok = name.len() <= 255
        && name.ends_with(".sql")
        && name.len() > ".sql".len()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && !name.contains("..");
    if ok {
        Ok(())
    } else {
        Err(AppError::validation("invalid backup file name"))
    }
}

fn missing(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::NotFound
}

async fn info_for(path: &Path, name: String) -> anyhow::Result<SnapshotInfo> {
    let meta = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("stat {}", path.display()))?;
    let modified = meta
        .modified()
        .map(OffsetDateTime::from)
        .unwrap_or_else(|_| OffsetDateTime::now_utc());
    Ok(SnapshotInfo {
        name,
        size: meta.len(),
        modified,
    })
}

/// `.sql` files in the backup directory, newest first.
pub async fn list_snapshots(dir: &Path) -> anyhow::Result<Vec<SnapshotInfo>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if missing(&e) => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("read {}", dir.display())),
    };

    let mut out = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.ends_with(".sql") || !entry.file_type().await?.is_file() {
            continue;
        }
        out.push(info_for(&entry.path(), name).await?);
    }
    out.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.name.cmp(&a.name)));
    Ok(out)
}

/// Dump the database into a new `backup_*.sql`. A partial file is removed on failure.
pub async fn create_snapshot(state: &AppState) -> AppResult<SnapshotInfo> {
    let dir = &state.config.backup.dir;
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("create {}", dir.display()))?;

    let name = snapshot_name(BACKUP_PREFIX, OffsetDateTime::now_utc())?;
    let path = dir.join(&name);
    if tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Err(AppError::Conflict(format!("{} already exists", name)));
    }

    if let Err(e) = state.dump_tool.dump(&path).await {
        if let Err(rm) = tokio::fs::remove_file(&path).await {
            if !missing(&rm) {
                warn!(error = %rm, file = %name, "could not remove partial backup");
            }
        }
        return Err(AppError::ToolFailed(format!("backup failed: {:#}", e)));
    }

    let info = info_for(&path, name).await?;
    info!(file = %info.name, size = info.size, "backup created");
    Ok(info)
}

/// Open a snapshot for streaming; returns the file and its length.
pub async fn open_snapshot(dir: &Path, name: &str) -> AppResult<(tokio::fs::File, u64)> {
    validate_snapshot_name(name)?;
    let file = match tokio::fs::File::open(dir.join(name)).await {
        Ok(f) => f,
        Err(e) if missing(&e) => return Err(AppError::NotFound("Backup")),
        Err(e) => return Err(anyhow::Error::from(e).context("open backup").into()),
    };
    let len = file.metadata().await.context("stat backup")?.len();
    Ok((file, len))
}

pub async fn delete_snapshot(dir: &Path, name: &str) -> AppResult<()> {
    validate_snapshot_name(name)?;
    match tokio::fs::remove_file(dir.join(name)).await {
        Ok(()) => {
            info!(file = %name, "backup deleted");
            Ok(())
        }
        Err(e) if missing(&e) => Err(AppError::NotFound("Backup")),
        Err(e) => Err(anyhow::Error::from(e).context("delete backup").into()),
    }
}

/// Save the uploaded dump as `restore_*.sql` and replay it. Returns the saved name.
pub async fn restore_from_upload(state: &AppState, body: &[u8]) -> AppResult<String> {
    if body.is_empty() {
        return Err(AppError::validation("backup_file is empty"));
    }
    let dir = &state.config.backup.dir;
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("create {}", dir.display()))?;

    let name = snapshot_name(RESTORE_PREFIX, OffsetDateTime::now_utc())?;
    let path = dir.join(&name);
    tokio::fs::write(&path, body)
        .await
        .with_context(|| format!("write {}", path.display()))?;

    state
        .dump_tool
        .restore(&path)
        .await
        .map_err(|e| AppError::ToolFailed(format!("restore failed: {:#}", e)))?;
    info!(file = %name, bytes = body.len(), "database restored");
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use tokio::io::AsyncReadExt;

    async fn read_all(dir: &Path, name: &str) -> AppResult<Vec<u8>> {
        let (mut file, len) = open_snapshot(dir, name).await?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf.len() as u64, len);
        Ok(buf)
    }

    #[test]
    fn names_follow_the_timestamp_pattern() {
        let at = datetime!(2025-03-01 14:05:09 UTC);
        assert_eq!(snapshot_name(BACKUP_PREFIX, at).unwrap(), "backup_20250301_140509.sql");
        assert_eq!(snapshot_name(RESTORE_PREFIX, at).unwrap(), "restore_20250301_140509.sql");
    }

    #[test]
    fn snapshot_names_cannot_escape_the_directory() {
        assert!(validate_snapshot_name("backup_20250301_140509.sql").is_ok());
        for bad in [
            "../etc/passwd.sql",
            "a/b.sql",
            "a\\b.sql",
            ".hidden.sql",
            "backup.txt",
            ".sql",
            "",
            "x..sql",
        ] {
            assert!(validate_snapshot_name(bad).is_err(), "{} should be rejected", bad);
        }
    }

    #[tokio::test]
    async fn missing_directory_lists_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let list = list_snapshots(&tmp.path().join("nope")).await.unwrap();
        assert!(list.is_empty());
    }

    #[tokio::test]
    async fn listing_skips_non_sql_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("backup_20250101_000000.sql"), b"-- a").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), b"x").unwrap();
        std::fs::create_dir(tmp.path().join("dir.sql")).unwrap();

        let list = list_snapshots(tmp.path()).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name, "backup_20250101_000000.sql");
        assert_eq!(list[0].size, 4);
    }

    #[tokio::test]
    async fn create_read_delete_with_fake_dump() {
        let tmp = tempfile::tempdir().unwrap();
        let state = AppState::fake_with_backup_dir(tmp.path().to_path_buf());

        let info = create_snapshot(&state).await.unwrap();
        assert!(info.name.starts_with(BACKUP_PREFIX));
        let bytes = read_all(tmp.path(), &info.name).await.unwrap();
        assert_eq!(bytes, b"-- fake dump\n");

        delete_snapshot(tmp.path(), &info.name).await.unwrap();
        assert!(matches!(
            delete_snapshot(tmp.path(), &info.name).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            read_all(tmp.path(), &info.name).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn restore_keeps_the_uploaded_file() {
        let tmp = tempfile::tempdir().unwrap();
        let state = AppState::fake_with_backup_dir(tmp.path().to_path_buf());

        let name = restore_from_upload(&state, b"SELECT 1;").await.unwrap();
        assert!(name.starts_with(RESTORE_PREFIX));
        assert_eq!(std::fs::read(tmp.path().join(&name)).unwrap(), b"SELECT 1;");
        assert!(matches!(
            restore_from_upload(&state, b"").await,
            Err(AppError::Validation(_))
        ));
    }
}

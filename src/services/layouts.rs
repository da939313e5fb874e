use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use strum_macros::{AsRefStr, Display, EnumString};
use tokio::fs;
use utoipa::ToSchema;

pub const MAX_LISTED_BACKUPS: usize = 20;
const EXTENSION: &str = "html";

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LayoutKind {
    Admin,
    Staff,
}

impl LayoutKind {
    pub fn stem(self) -> &'static str {
        match self {
            LayoutKind::Admin => "_Layout",
            LayoutKind::Staff => "_LayoutStaff",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.{}", self.stem(), EXTENSION)
    }

    /// Staff backups start with `_LayoutStaff_`, which never matches `_Layout_`.
    pub fn of_backup(name: &str) -> Self {
        if name.starts_with("_Layout_") {
            LayoutKind::Admin
        } else {
            LayoutKind::Staff
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LayoutBackup {
    pub name: String,
    pub kind: LayoutKind,
    pub size_bytes: u64,
    #[schema(value_type = String, format = "date-time")]
    pub modified_at: NaiveDateTime,
}

pub fn backup_name(kind: LayoutKind, at: NaiveDateTime) -> String {
    numbered_backup_name(kind, at, 0)
}

/// Backups taken within the same second get `_1`, `_2`, ... after the stamp.
pub fn numbered_backup_name(kind: LayoutKind, at: NaiveDateTime, seq: u32) -> String {
    let stamp = at.format("%Y%m%d%H%M%S");
    match seq {
        0 => format!("{}_{}.{}", kind.stem(), stamp, EXTENSION),
        n => format!("{}_{}_{}.{}", kind.stem(), stamp, n, EXTENSION),
    }
}

/// Accepts only plain backup file names produced by [`numbered_backup_name`].
pub fn is_valid_backup_name(name: &str) -> bool {
    let Some(stamp_part) = name.strip_suffix(&format!(".{EXTENSION}")) else {
        return false;
    };
    if name.contains(['/', '\\']) || name.contains("..") {
        return false;
    }
    [LayoutKind::Admin, LayoutKind::Staff].iter().any(|k| {
        stamp_part
            .strip_prefix(k.stem())
            .and_then(|rest| rest.strip_prefix('_'))
            .is_some_and(|rest| {
                let (stamp, seq) = rest.split_once('_').unwrap_or((rest, "1"));
                stamp.len() == 14
                    && stamp.chars().all(|c| c.is_ascii_digit())
                    && !seq.is_empty()
                    && seq.chars().all(|c| c.is_ascii_digit())
            })
    })
}

/// Layout files and their timestamped backups on disk.
#[derive(Clone, Debug)]
pub struct LayoutStore {
    dir: PathBuf,
    backup_dir: PathBuf,
}

impl LayoutStore {
    pub fn new(dir: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), backup_dir: backup_dir.into() }
    }

    fn layout_path(&self, kind: LayoutKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    fn backup_path(&self, name: &str) -> io::Result<PathBuf> {
        if !is_valid_backup_name(name) {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "invalid backup name"));
        }
        Ok(self.backup_dir.join(name))
    }

    /// Missing layouts read as empty.
    pub async fn read(&self, kind: LayoutKind) -> io::Result<String> {
        match fs::read_to_string(self.layout_path(kind)).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e),
        }
    }

    /// Copies the current layout to a new backup. Returns `None` when there is
    /// nothing to back up.
    pub async fn backup(&self, kind: LayoutKind) -> io::Result<Option<String>> {
        let source = self.layout_path(kind);
        if !exists(&source).await {
            return Ok(None);
        }
        fs::create_dir_all(&self.backup_dir).await?;
        let at = Local::now().naive_local();
        let mut seq = 0;
        let mut name = backup_name(kind, at);
        while exists(&self.backup_dir.join(&name)).await {
            seq += 1;
            name = numbered_backup_name(kind, at, seq);
        }
        fs::copy(&source, self.backup_dir.join(&name)).await?;
        Ok(Some(name))
    }

    /// Backs up the current file, then writes `content`.
    pub async fn save(&self, kind: LayoutKind, content: &str) -> io::Result<Option<String>> {
        let backup = self.backup(kind).await?;
        fs::create_dir_all(&self.dir).await?;
        fs::write(self.layout_path(kind), content).await?;
        Ok(backup)
    }

    /// Newest first, at most [`MAX_LISTED_BACKUPS`].
    pub async fn list_backups(&self) -> io::Result<Vec<LayoutBackup>> {
        let mut entries = match fs::read_dir(&self.backup_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut backups = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_valid_backup_name(&name) {
                continue;
            }
            let meta = entry.metadata().await?;
            let modified_at = meta
                .modified()
                .map(|t| DateTime::<Local>::from(t).naive_local())
                .unwrap_or_default();
            backups.push(LayoutBackup {
                kind: LayoutKind::of_backup(&name),
                name,
                size_bytes: meta.len(),
                modified_at,
            });
        }

        backups.sort_by(|a, b| b.modified_at.cmp(&a.modified_at).then_with(|| b.name.cmp(&a.name)));
        backups.truncate(MAX_LISTED_BACKUPS);
        Ok(backups)
    }

    pub async fn read_backup(&self, name: &str) -> io::Result<String> {
        fs::read_to_string(self.backup_path(name)?).await
    }

    /// Restores a backup over its layout after backing up the current file.
    pub async fn restore(&self, name: &str) -> io::Result<LayoutKind> {
        let source = self.backup_path(name)?;
        if !exists(&source).await {
            return Err(io::Error::new(io::ErrorKind::NotFound, "backup not found"));
        }
        let kind = LayoutKind::of_backup(name);
        let content = fs::read_to_string(&source).await?;
        self.save(kind, &content).await?;
        Ok(kind)
    }

    pub async fn delete_backup(&self, name: &str) -> io::Result<()> {
        fs::remove_file(self.backup_path(name)?).await
    }
}

async fn exists(path: &Path) -> bool {
    fs::metadata(path).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 9).unwrap().and_hms_opt(14, 5, 7).unwrap()
    }

    fn temp_store(tag: &str) -> (LayoutStore, PathBuf) {
        let root = std::env::temp_dir().join(format!("tmd-layouts-{}-{}", tag, uuid::Uuid::new_v4()));
        (LayoutStore::new(root.join("views"), root.join("backups")), root)
    }

    #[test]
    fn backup_names_carry_timestamp() {
        assert_eq!(backup_name(LayoutKind::Admin, at()), "_Layout_20250309140507.html");
        assert_eq!(backup_name(LayoutKind::Staff, at()), "_LayoutStaff_20250309140507.html");
    }

    #[test]
    fn backup_kind_follows_prefix() {
        assert_eq!(LayoutKind::of_backup("_Layout_20250309140507.html"), LayoutKind::Admin);
        assert_eq!(LayoutKind::of_backup("_LayoutStaff_20250309140507.html"), LayoutKind::Staff);
    }

    #[test]
    fn rejects_traversal_and_foreign_names() {
        assert!(is_valid_backup_name("_Layout_20250309140507.html"));
        assert!(!is_valid_backup_name("../_Layout_20250309140507.html"));
        assert!(!is_valid_backup_name("_Layout_2025.html"));
        assert!(!is_valid_backup_name("passwd"));
        assert!(!is_valid_backup_name("_Layout_20250309140507.html/x"));
        assert!(is_valid_backup_name("_LayoutStaff_20250309140507_2.html"));
        assert!(!is_valid_backup_name("_Layout_20250309140507_.html"));
        assert!(!is_valid_backup_name("_Layout_20250309140507_x.html"));
    }

    #[test]
    fn same_second_backups_are_numbered() {
        assert_eq!(numbered_backup_name(LayoutKind::Admin, at(), 0), "_Layout_20250309140507.html");
        assert_eq!(numbered_backup_name(LayoutKind::Admin, at(), 2), "_Layout_20250309140507_2.html");
    }

    #[actix_web::test]
    async fn rapid_saves_keep_every_backup() {
        let (store, root) = temp_store("rapid");
        store.save(LayoutKind::Admin, "v1").await.unwrap();
        let first = store.save(LayoutKind::Admin, "v2").await.unwrap().unwrap();
        let second = store.save(LayoutKind::Admin, "v3").await.unwrap().unwrap();

        assert_ne!(first, second);
        assert_eq!(store.read_backup(&first).await.unwrap(), "v1");
        assert_eq!(store.read_backup(&second).await.unwrap(), "v2");
        assert_eq!(store.list_backups().await.unwrap().len(), 2);
        let _ = std::fs::remove_dir_all(root);
    }

    #[actix_web::test]
    async fn save_backs_up_previous_version_and_restores() {
        let (store, root) = temp_store("roundtrip");

        assert_eq!(store.read(LayoutKind::Staff).await.unwrap(), "");
        assert_eq!(store.save(LayoutKind::Staff, "<p>v1</p>").await.unwrap(), None);

        let backup = store.save(LayoutKind::Staff, "<p>v2</p>").await.unwrap().unwrap();
        assert!(backup.starts_with("_LayoutStaff_"));
        assert_eq!(store.read(LayoutKind::Staff).await.unwrap(), "<p>v2</p>");

        let listed = store.list_backups().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].kind, LayoutKind::Staff);

        let kind = store.restore(&backup).await.unwrap();
        assert_eq!(kind, LayoutKind::Staff);
        assert_eq!(store.read(LayoutKind::Staff).await.unwrap(), "<p>v1</p>");

        assert!(store.delete_backup("../../etc/passwd").await.is_err());
        let _ = std::fs::remove_dir_all(root);
    }
}

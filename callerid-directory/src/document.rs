//! The caller list document shared between the app and the directory extension.
//!
//! Lives at `<home>/.callerid/shared/callerId.json`. The app writes it, the
//! extension reads it on every request, and it is removed once a reload
//! finishes.

use std::path::Path;

use callerid_core::{paths, CallerListPayload, CallerListType};

use crate::error::{io_err, DirectoryError};

/// Write the document atomically: `<path>.tmp`, then rename.
pub fn write_at(home: &Path, payload: &CallerListPayload) -> Result<(), DirectoryError> {
    let path = paths::shared_document_path(home);
    let Some(dir) = path.parent() else {
        return Err(io_err(path, std::io::Error::other("invalid shared document path")));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let json = serde_json::to_string(payload)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    tracing::debug!(
        "wrote shared {} document with {} items",
        payload.list_type.as_str(),
        payload.items.len()
    );
    Ok(())
}

/// Write the `clearAll` document used on logout.
pub fn write_clear_all_at(home: &Path) -> Result<(), DirectoryError> {
    write_at(home, &CallerListPayload::new(CallerListType::ClearAll, Vec::new()))
}

/// Read the document. `Ok(None)` when there is none.
pub fn read_at(home: &Path) -> Result<Option<CallerListPayload>, DirectoryError> {
    let path = paths::shared_document_path(home);
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    Ok(Some(serde_json::from_str(&contents)?))
}

/// Remove the document. Missing is fine.
pub fn clear_at(home: &Path) -> Result<(), DirectoryError> {
    let path = paths::shared_document_path(home);
    match std::fs::remove_file(&path) {
        Ok(()) => {
            tracing::debug!("removed shared document {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callerid_core::CallerItem;
    use tempfile::TempDir;

    #[test]
    fn missing_document_reads_as_none() {
        let tmp = TempDir::new().unwrap();
        assert!(read_at(tmp.path()).unwrap().is_none());
        clear_at(tmp.path()).unwrap();
    }

    #[test]
    fn write_read_clear() {
        let tmp = TempDir::new().unwrap();
        let payload = CallerListPayload::new(
            CallerListType::Block,
            vec![CallerItem::new(4930123u64, "Spam", true)],
        );
        write_at(tmp.path(), &payload).unwrap();

        let raw = std::fs::read_to_string(paths::shared_document_path(tmp.path())).unwrap();
        assert!(raw.contains(r#""type":"block""#), "{raw}");
        assert!(raw.contains(r#""phonenumber":4930123"#), "{raw}");
        assert!(!paths::shared_document_path(tmp.path())
            .with_extension("json.tmp")
            .exists());

        assert_eq!(read_at(tmp.path()).unwrap(), Some(payload));
        clear_at(tmp.path()).unwrap();
        assert!(read_at(tmp.path()).unwrap().is_none());
    }

    #[test]
    fn clear_all_document() {
        let tmp = TempDir::new().unwrap();
        write_clear_all_at(tmp.path()).unwrap();
        let doc = read_at(tmp.path()).unwrap().unwrap();
        assert_eq!(doc.list_type, CallerListType::ClearAll);
        assert!(doc.items.is_empty());
    }

    #[test]
    fn garbage_document_is_a_json_error() {
        let tmp = TempDir::new().unwrap();
        let path = paths::shared_document_path(tmp.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(read_at(tmp.path()), Err(DirectoryError::Json(_))));
    }
}

use bytes::Bytes;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use super::{candidates, new_id, parse_time, to_db_time, Store};
use crate::blob::{blob_path, sanitize_filename};
use crate::error::{Error, Result};
use crate::models::{CandidateMaterial, CandidateMaterialList};

const COLUMNS: &str = "id, candidate_id, filename, content_type, size_bytes, blob_path, created_at";
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// An upload as received from the client.
#[derive(Debug, Clone)]
pub struct NewMaterial {
    pub filename: String,
    pub content_type: String,
    pub bytes: Bytes,
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<CandidateMaterial> {
    let size: i64 = row.get(4)?;
    let created_at: String = row.get(6)?;
    Ok(CandidateMaterial {
        id: row.get(0)?,
        candidate_id: row.get(1)?,
        filename: row.get(2)?,
        content_type: row.get(3)?,
        size_bytes: size.max(0) as u64,
        blob_path: row.get(5)?,
        created_at: parse_time(6, &created_at)?,
    })
}

impl Store {
    fn ensure_candidate(&self, candidate_id: &str) -> Result<()> {
        candidates::fetch(&self.conn(), candidate_id)?
            .map(|_| ())
            .ok_or_else(|| Error::not_found("Candidate"))
    }

    fn mime_allowed(&self, content_type: &str) -> bool {
        self.allowed_mime_prefixes.is_empty()
            || self
                .allowed_mime_prefixes
                .iter()
                .any(|prefix| content_type.trim().starts_with(prefix.as_str()))
    }

    /// Newest first.
    pub fn list_materials(&self, candidate_id: &str) -> Result<CandidateMaterialList> {
        self.ensure_candidate(candidate_id)?;
        let conn = self.conn();
        let sql = format!(
            "SELECT {} FROM candidate_materials WHERE candidate_id = ?1
             ORDER BY created_at DESC, rowid DESC",
            COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(params![candidate_id], from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(CandidateMaterialList::from(items))
    }

    pub fn get_material(&self, candidate_id: &str, material_id: &str) -> Result<CandidateMaterial> {
        let sql = format!(
            "SELECT {} FROM candidate_materials WHERE id = ?1 AND candidate_id = ?2",
            COLUMNS
        );
        self.conn()
            .query_row(&sql, params![material_id, candidate_id], from_row)
            .optional()?
            .ok_or_else(|| Error::not_found("Material"))
    }

    /// Store the bytes, then the metadata row. The blob is removed again if
    /// the row cannot be written.
    pub fn create_material(&self, candidate_id: &str, upload: NewMaterial) -> Result<CandidateMaterial> {
        self.ensure_candidate(candidate_id)?;
        if upload.bytes.is_empty() {
            return Err(Error::BadRequest("Empty file".to_string()));
        }
        if upload.bytes.len() > self.max_material_bytes {
            return Err(Error::BadRequest("File exceeds max size".to_string()));
        }
        if !self.mime_allowed(&upload.content_type) {
            tracing::warn!(
                candidate = candidate_id,
                filename = %upload.filename,
                mime = %upload.content_type,
                "disallowed material type"
            );
            return Err(Error::BadRequest("Disallowed MIME type".to_string()));
        }

        let id = new_id();
        let filename = sanitize_filename(&upload.filename);
        let content_type = if upload.content_type.trim().is_empty() {
            FALLBACK_CONTENT_TYPE.to_string()
        } else {
            upload.content_type
        };
        let material = CandidateMaterial {
            blob_path: blob_path(candidate_id, &id, &filename),
            id,
            candidate_id: candidate_id.to_string(),
            filename,
            content_type,
            size_bytes: upload.bytes.len() as u64,
            created_at: Utc::now(),
        };

        self.blobs
            .put(&material.blob_path, &upload.bytes, &material.content_type)?;

        let inserted = self.conn().execute(
            "INSERT INTO candidate_materials (id, candidate_id, filename, content_type, size_bytes,
                                              blob_path, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                material.id,
                material.candidate_id,
                material.filename,
                material.content_type,
                material.size_bytes as i64,
                material.blob_path,
                to_db_time(&material.created_at)
            ],
        );
        if let Err(e) = inserted {
            if let Err(cleanup) = self.blobs.delete(&material.blob_path) {
                tracing::warn!(path = %material.blob_path, error = %cleanup, "orphaned material blob");
            }
            return Err(e.into());
        }

        tracing::info!(
            id = %material.id,
            candidate = candidate_id,
            size = material.size_bytes,
            "material uploaded"
        );
        Ok(material)
    }

    pub fn delete_material(&self, candidate_id: &str, material_id: &str) -> Result<()> {
        let material = self.get_material(candidate_id, material_id)?;
        self.conn().execute(
            "DELETE FROM candidate_materials WHERE id = ?1",
            params![material.id],
        )?;
        self.blobs.delete(&material.blob_path)?;
        tracing::info!(id = material_id, candidate = candidate_id, "material deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support;
    use super::*;
    use crate::blob::BlobStore;

    fn upload(name: &str, bytes: &'static [u8]) -> NewMaterial {
        NewMaterial {
            filename: name.to_string(),
            content_type: "text/plain".to_string(),
            bytes: Bytes::from_static(bytes),
        }
    }

    fn setup() -> (Store, std::sync::Arc<crate::blob::MemoryBlobStore>, String) {
        let (store, blobs) = test_support::store();
        let rubric = test_support::rubric(&store, "Vendor Fit", &[("A", 1.0)]);
        let kit = test_support::kit(&store, "Q3 Vendors", &rubric.id);
        let candidate = test_support::candidate(&store, &kit.id, "Acme");
        (store, blobs, candidate.id)
    }

    #[test]
    fn test_upload_list_delete() {
        let (store, blobs, cid) = setup();
        let first = store.create_material(&cid, upload("../notes v1.txt", b"one")).unwrap();
        let second = store.create_material(&cid, upload("notes.txt", b"two!")).unwrap();

        assert_eq!(first.filename, "notes_v1.txt");
        assert_eq!(first.blob_path, format!("candidates/{}/{}_notes_v1.txt", cid, first.id));
        assert_eq!(second.size_bytes, 4);
        assert_eq!(blobs.get(&second.blob_path).unwrap(), b"two!");

        let list = store.list_materials(&cid).unwrap();
        assert_eq!(list.total, 2);
        assert_eq!(list.items[0].id, second.id);

        store.delete_material(&cid, &first.id).unwrap();
        assert!(!blobs.exists(&first.blob_path));
        assert!(matches!(store.get_material(&cid, &first.id), Err(Error::NotFound(_))));
        assert_eq!(store.list_materials(&cid).unwrap().total, 1);
    }

    #[test]
    fn test_rejects_empty_and_oversized() {
        let (store, blobs, cid) = setup();
        let store = store.with_max_material_bytes(4);

        match store.create_material(&cid, upload("a.txt", b"")) {
            Err(Error::BadRequest(msg)) => assert_eq!(msg, "Empty file"),
            other => panic!("unexpected {:?}", other),
        }
        match store.create_material(&cid, upload("a.txt", b"12345")) {
            Err(Error::BadRequest(msg)) => assert_eq!(msg, "File exceeds max size"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(blobs.is_empty());
    }

    #[test]
    fn test_mime_allow_list() {
        let (store, blobs, cid) = setup();
        let exe = NewMaterial {
            content_type: "application/x-msdownload".to_string(),
            ..upload("setup.exe", b"MZ")
        };
        match store.create_material(&cid, exe.clone()) {
            Err(Error::BadRequest(msg)) => assert_eq!(msg, "Disallowed MIME type"),
            other => panic!("unexpected {:?}", other),
        }
        let untyped = NewMaterial {
            content_type: String::new(),
            ..upload("blob", b"x")
        };
        assert!(matches!(store.create_material(&cid, untyped.clone()), Err(Error::BadRequest(_))));
        assert!(blobs.is_empty());

        let charset = NewMaterial {
            content_type: "text/plain; charset=utf-8".to_string(),
            ..upload("a.txt", b"x")
        };
        assert!(store.create_material(&cid, charset).is_ok());

        let open = store.with_allowed_mime_prefixes(Vec::new());
        assert!(open.create_material(&cid, exe).is_ok());
        let material = open.create_material(&cid, untyped).unwrap();
        assert_eq!(material.content_type, "application/octet-stream");
    }

    #[test]
    fn test_unknown_candidate() {
        let (store, _, _) = setup();
        assert!(matches!(store.list_materials("ghost"), Err(Error::NotFound(_))));
        assert!(matches!(
            store.create_material("ghost", upload("a.txt", b"x")),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_material_scoped_to_candidate() {
        let (store, _, cid) = setup();
        let material = store.create_material(&cid, upload("a.txt", b"x")).unwrap();
        assert!(store.get_material(&cid, &material.id).is_ok());
        assert!(matches!(store.get_material("other", &material.id), Err(Error::NotFound(_))));
    }
}

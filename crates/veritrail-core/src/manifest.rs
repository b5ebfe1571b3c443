//! File manifests.
//!
//! The manifest hash of an artifact summarizes its attached files. Entries
//! are sorted by `(name, content_hash)` before hashing so attachment order
//! does not matter.

use serde::Serialize;

use crate::artifact::ArtifactFile;
use crate::digest::{hash_record, Sha256Digest};
use crate::error::Result;

/// One file as it appears in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ManifestEntry {
    pub name: String,
    pub content_hash: Sha256Digest,
    pub size_bytes: u64,
    pub content_type: String,
}

/// The sorted list of files belonging to an artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileManifest {
    pub files: Vec<ManifestEntry>,
}

impl FileManifest {
    pub fn from_files<'a>(files: impl IntoIterator<Item = &'a ArtifactFile>) -> Self {
        let mut entries: Vec<ManifestEntry> = files
            .into_iter()
            .map(|f| ManifestEntry {
                name: f.name.clone(),
                content_hash: f.content_hash,
                size_bytes: f.size_bytes,
                content_type: f.content_type.clone(),
            })
            .collect();
        entries.sort();
        Self { files: entries }
    }

    /// Canonical hash of the manifest.
    pub fn hash(&self) -> Result<Sha256Digest> {
        hash_record(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ArtifactId;

    fn file(name: &str, body: &[u8]) -> ArtifactFile {
        ArtifactFile {
            artifact_id: ArtifactId::from_bytes([7; 16]),
            name: name.into(),
            uri: format!("file:///{}", name),
            content_hash: Sha256Digest::hash(body),
            size_bytes: body.len() as u64,
            content_type: "application/pdf".into(),
            attached_at: 0,
        }
    }

    #[test]
    fn test_manifest_hash_ignores_attachment_order() {
        let a = file("a.pdf", b"first");
        let b = file("b.pdf", b"second");
        let h1 = FileManifest::from_files([&a, &b]).hash().unwrap();
        let h2 = FileManifest::from_files([&b, &a]).hash().unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_manifest_hash_changes_with_content() {
        let a = file("a.pdf", b"first");
        let a2 = file("a.pdf", b"first!");
        assert_ne!(
            FileManifest::from_files([&a]).hash().unwrap(),
            FileManifest::from_files([&a2]).hash().unwrap()
        );
    }
}

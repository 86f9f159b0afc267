use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::SnapshotError;
use crate::index::write_atomic;
use crate::ir::IrDocument;
use crate::transform::name_normalizer::{slugify, version_slug};

/// `<dir>/<service-slug>/<version-slug>.json`
pub fn snapshot_path(dir: &Path, ir: &IrDocument) -> PathBuf {
    dir.join(slugify(&ir.service))
        .join(format!("{}.json", version_slug(&ir.version)))
}

/// Serialize a document the way snapshots store it.
pub fn to_json(ir: &IrDocument) -> Result<String, serde_json::Error> {
    let mut content = serde_json::to_string_pretty(ir)?;
    content.push('\n');
    Ok(content)
}

/// Persist a document under `dir`, replacing any earlier snapshot of the
/// same service and version. Returns the written path.
pub fn save(dir: &Path, ir: &IrDocument) -> Result<PathBuf, SnapshotError> {
    let path = snapshot_path(dir, ir);
    let content = to_json(ir)?;
    write_atomic(&path, content.as_bytes())?;
    debug!("wrote snapshot {}", path.display());
    Ok(path)
}

/// Reload a snapshot without re-parsing the contract.
pub fn load(path: &Path) -> Result<IrDocument, SnapshotError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn document(service: &str, version: &str) -> IrDocument {
        IrDocument {
            service: service.to_string(),
            version: version.to_string(),
            protocol: "openapi".to_string(),
            source: None,
            metadata: IndexMap::new(),
            operations: Vec::new(),
            errors: Vec::new(),
        }
    }

    #[test]
    fn test_snapshot_path() {
        let path = snapshot_path(Path::new("catalog"), &document("Payments API", "2024/01"));
        assert_eq!(path, PathBuf::from("catalog/payments-api/2024-01.json"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let ir = document("Payments API", "1.2.0");
        let path = save(dir.path(), &ir).unwrap();
        assert!(path.ends_with("payments-api/1.2.0.json"));
        assert_eq!(load(&path).unwrap(), ir);

        let first = fs::read_to_string(&path).unwrap();
        save(dir.path(), &ir).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), first);
    }
}

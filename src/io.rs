//! JSON metadata documents on disk.

use std::io::ErrorKind;
use std::path::Path;

use crate::backend::MetadataStore;
use crate::config::MountPoint;
use crate::error::{AssetError, Result};
use crate::kind::AssetKind;
use crate::metadata::AssetMetadata;

/// Reads and writes `<mount>/<metadata_dir>/<kind>/<name>.json`.
pub struct JsonMetadataStore {
    mount: MountPoint,
}

impl JsonMetadataStore {
    pub fn new(mount: MountPoint) -> Self {
        Self { mount }
    }

    pub fn mount(&self) -> &MountPoint {
        &self.mount
    }
}

impl MetadataStore for JsonMetadataStore {
    fn read_metadata(
        &self,
        kind: AssetKind,
        name: &str,
        _file: Option<&Path>,
    ) -> Result<AssetMetadata> {
        let path = self.mount.metadata_path(kind, name);
        let text = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => AssetError::MissingFile {
                asset: name.to_string(),
                kind,
                path: path.clone(),
            },
            _ => AssetError::MetadataRead {
                asset: name.to_string(),
                kind,
                reason: format!("{}: {e}", path.display()),
            },
        })?;
        let metadata: AssetMetadata =
            serde_json::from_str(&text).map_err(|e| AssetError::MetadataParse {
                asset: name.to_string(),
                kind,
                reason: e.to_string(),
            })?;
        if metadata.kind() != kind {
            return Err(AssetError::MetadataParse {
                asset: name.to_string(),
                kind,
                reason: format!("document describes a {} asset", metadata.kind()),
            });
        }
        Ok(metadata)
    }

    fn write_metadata(
        &self,
        kind: AssetKind,
        name: &str,
        _file: Option<&Path>,
        metadata: &AssetMetadata,
    ) -> Result<()> {
        let path = self.mount.metadata_path(kind, name);
        let write_err = |reason: String| AssetError::MetadataWrite {
            asset: name.to_string(),
            kind,
            reason,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
        }
        let text = serde_json::to_string_pretty(metadata).map_err(|e| write_err(e.to_string()))?;
        std::fs::write(&path, text).map_err(|e| write_err(format!("{}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{AssetLink, MaterialMetadata, TextureMetadata};
    use std::path::PathBuf;

    #[test]
    fn test_write_then_read_material() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonMetadataStore::new(MountPoint::new(dir.path()));
        let metadata = AssetMetadata::Material(MaterialMetadata {
            shader: Some(AssetLink::new("lit", Some(PathBuf::from("lit.wgsl")))),
            textures: vec![
                None,
                Some(AssetLink::new("albedo", Some(PathBuf::from("albedo.png")))),
            ],
            ..MaterialMetadata::default()
        });

        store
            .write_metadata(AssetKind::Material, "brick", None, &metadata)
            .unwrap();
        assert!(dir.path().join(".meta/materials/brick.json").exists());

        let read = store.read_metadata(AssetKind::Material, "brick", None).unwrap();
        assert_eq!(read, metadata);
    }

    #[test]
    fn test_missing_document_is_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonMetadataStore::new(MountPoint::new(dir.path()));
        let err = store
            .read_metadata(AssetKind::Texture, "nope", Some(Path::new("nope.png")))
            .unwrap_err();
        match &err {
            AssetError::MissingFile { asset, path, .. } => {
                assert_eq!(asset, "nope");
                assert_eq!(path, &dir.path().join(".meta/textures/nope.json"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.is_transient());
    }

    #[test]
    fn test_kind_mismatch_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonMetadataStore::new(MountPoint::new(dir.path()));
        store
            .write_metadata(
                AssetKind::Texture,
                "brick",
                None,
                &AssetMetadata::Texture(TextureMetadata::default()),
            )
            .unwrap();
        // Same file name under the mesh folder holds a texture document.
        let texture_path = dir.path().join(".meta/textures/brick.json");
        let mesh_dir = dir.path().join(".meta/meshes");
        std::fs::create_dir_all(&mesh_dir).unwrap();
        std::fs::copy(texture_path, mesh_dir.join("brick.json")).unwrap();

        let err = store.read_metadata(AssetKind::Mesh, "brick", None).unwrap_err();
        assert!(matches!(err, AssetError::MetadataParse { .. }));
    }
}

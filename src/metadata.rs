//! Kind-specific metadata payloads.
//!
//! Metadata is the serialized description of an asset. Links to other
//! assets are stored by name (and file) on disk; once the record is
//! registered each link also carries the resolved handle.

use crate::handle::{AssetHandle, AssetKey, AssetRef};
use crate::kind::AssetKind;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::path::PathBuf;

/// Inline capacity for dependency lists; materials rarely exceed it.
pub const INLINE_DEPENDENCIES: usize = 8;

pub type DependencyList = SmallVec<[AssetRef; INLINE_DEPENDENCIES]>;

/// A reference from one asset's metadata to another asset.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssetLink {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// `None` until resolved, or when the linked asset could not be registered
    #[serde(skip)]
    pub handle: Option<AssetHandle>,
}

impl AssetLink {
    pub fn new(name: impl Into<String>, file: Option<PathBuf>) -> Self {
        Self {
            name: name.into(),
            file,
            handle: None,
        }
    }

    pub fn key(&self) -> AssetKey {
        AssetKey::new(self.name.clone(), self.file.as_deref())
    }
}

/// Links compare by what they name, not by what they resolved to, so a
/// freshly read document equals its registered counterpart.
impl PartialEq for AssetLink {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.file == other.file
    }
}

/// Capability shared by every metadata payload.
pub trait MetadataPayload {
    const KIND: AssetKind;

    fn links(&self) -> SmallVec<[(AssetKind, &AssetLink); INLINE_DEPENDENCIES]> {
        SmallVec::new()
    }

    fn links_mut(&mut self) -> SmallVec<[(AssetKind, &mut AssetLink); INLINE_DEPENDENCIES]> {
        SmallVec::new()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshMetadata {
    pub scale: f32,
    pub generate_tangents: bool,
    pub optimize: bool,
}

impl Default for MeshMetadata {
    fn default() -> Self {
        Self {
            scale: 1.0,
            generate_tangents: true,
            optimize: true,
        }
    }
}

impl MetadataPayload for MeshMetadata {
    const KIND: AssetKind = AssetKind::Mesh;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureMetadata {
    pub srgb: bool,
    pub generate_mips: bool,
    pub max_size: u32,
}

impl Default for TextureMetadata {
    fn default() -> Self {
        Self {
            srgb: true,
            generate_mips: true,
            max_size: 4096,
        }
    }
}

impl MetadataPayload for TextureMetadata {
    const KIND: AssetKind = AssetKind::Texture;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterMode {
    Nearest,
    #[default]
    Linear,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressMode {
    #[default]
    Repeat,
    MirrorRepeat,
    ClampToEdge,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerMetadata {
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
    pub address_mode: AddressMode,
    pub anisotropy: u8,
}

impl MetadataPayload for SamplerMetadata {
    const KIND: AssetKind = AssetKind::Sampler;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShaderStage {
    Vertex,
    #[default]
    Fragment,
    Compute,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderMetadata {
    pub stage: ShaderStage,
    pub entry_point: String,
    pub defines: Vec<String>,
    /// Include files, registered as `Misc` assets
    pub includes: Vec<Option<AssetLink>>,
}

impl Default for ShaderMetadata {
    fn default() -> Self {
        Self {
            stage: ShaderStage::default(),
            entry_point: "main".to_string(),
            defines: Vec::new(),
            includes: Vec::new(),
        }
    }
}

impl MetadataPayload for ShaderMetadata {
    const KIND: AssetKind = AssetKind::Shader;

    fn links(&self) -> SmallVec<[(AssetKind, &AssetLink); INLINE_DEPENDENCIES]> {
        self.includes
            .iter()
            .flatten()
            .map(|link| (AssetKind::Misc, link))
            .collect()
    }

    fn links_mut(&mut self) -> SmallVec<[(AssetKind, &mut AssetLink); INLINE_DEPENDENCIES]> {
        self.includes
            .iter_mut()
            .flatten()
            .map(|link| (AssetKind::Misc, link))
            .collect()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialMetadata {
    pub shader: Option<AssetLink>,
    /// Texture slots; an empty slot is `None`
    pub textures: Vec<Option<AssetLink>>,
    pub samplers: Vec<Option<AssetLink>>,
    pub parameters: Vec<f32>,
}

impl MetadataPayload for MaterialMetadata {
    const KIND: AssetKind = AssetKind::Material;

    fn links(&self) -> SmallVec<[(AssetKind, &AssetLink); INLINE_DEPENDENCIES]> {
        let mut links = SmallVec::new();
        if let Some(shader) = &self.shader {
            links.push((AssetKind::Shader, shader));
        }
        links.extend(self.textures.iter().flatten().map(|l| (AssetKind::Texture, l)));
        links.extend(self.samplers.iter().flatten().map(|l| (AssetKind::Sampler, l)));
        links
    }

    fn links_mut(&mut self) -> SmallVec<[(AssetKind, &mut AssetLink); INLINE_DEPENDENCIES]> {
        let mut links = SmallVec::new();
        if let Some(shader) = &mut self.shader {
            links.push((AssetKind::Shader, shader));
        }
        links.extend(
            self.textures
                .iter_mut()
                .flatten()
                .map(|l| (AssetKind::Texture, l)),
        );
        links.extend(
            self.samplers
                .iter_mut()
                .flatten()
                .map(|l| (AssetKind::Sampler, l)),
        );
        links
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiscMetadata {
    pub content_type: String,
}

impl MetadataPayload for MiscMetadata {
    const KIND: AssetKind = AssetKind::Misc;
}

/// Metadata of any kind. The serialized form is tagged by kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum AssetMetadata {
    Mesh(MeshMetadata),
    Texture(TextureMetadata),
    Sampler(SamplerMetadata),
    Shader(ShaderMetadata),
    Material(MaterialMetadata),
    Misc(MiscMetadata),
}

impl AssetMetadata {
    pub fn default_for(kind: AssetKind) -> Self {
        match kind {
            AssetKind::Mesh => AssetMetadata::Mesh(MeshMetadata::default()),
            AssetKind::Texture => AssetMetadata::Texture(TextureMetadata::default()),
            AssetKind::Sampler => AssetMetadata::Sampler(SamplerMetadata::default()),
            AssetKind::Shader => AssetMetadata::Shader(ShaderMetadata::default()),
            AssetKind::Material => AssetMetadata::Material(MaterialMetadata::default()),
            AssetKind::Misc => AssetMetadata::Misc(MiscMetadata::default()),
        }
    }

    pub fn kind(&self) -> AssetKind {
        match self {
            AssetMetadata::Mesh(_) => MeshMetadata::KIND,
            AssetMetadata::Texture(_) => TextureMetadata::KIND,
            AssetMetadata::Sampler(_) => SamplerMetadata::KIND,
            AssetMetadata::Shader(_) => ShaderMetadata::KIND,
            AssetMetadata::Material(_) => MaterialMetadata::KIND,
            AssetMetadata::Misc(_) => MiscMetadata::KIND,
        }
    }

    pub fn links(&self) -> SmallVec<[(AssetKind, &AssetLink); INLINE_DEPENDENCIES]> {
        match self {
            AssetMetadata::Mesh(m) => m.links(),
            AssetMetadata::Texture(m) => m.links(),
            AssetMetadata::Sampler(m) => m.links(),
            AssetMetadata::Shader(m) => m.links(),
            AssetMetadata::Material(m) => m.links(),
            AssetMetadata::Misc(m) => m.links(),
        }
    }

    pub fn links_mut(&mut self) -> SmallVec<[(AssetKind, &mut AssetLink); INLINE_DEPENDENCIES]> {
        match self {
            AssetMetadata::Mesh(m) => m.links_mut(),
            AssetMetadata::Texture(m) => m.links_mut(),
            AssetMetadata::Sampler(m) => m.links_mut(),
            AssetMetadata::Shader(m) => m.links_mut(),
            AssetMetadata::Material(m) => m.links_mut(),
            AssetMetadata::Misc(m) => m.links_mut(),
        }
    }

    /// Resolved dependencies. Unresolved links are skipped; a link that
    /// appears twice yields two entries.
    pub fn dependencies(&self) -> DependencyList {
        self.links()
            .into_iter()
            .filter_map(|(kind, link)| link.handle.map(|handle| AssetRef::new(handle, kind)))
            .collect()
    }

    /// Drops every resolved handle, leaving the document as it reads on disk.
    pub fn clear_resolution(&mut self) {
        for (_, link) in self.links_mut() {
            link.handle = None;
        }
    }
}

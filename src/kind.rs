//! Asset kinds and fixed per-kind storage.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};

/// The closed set of asset kinds the cache tracks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AssetKind {
    Mesh,
    Texture,
    Sampler,
    Shader,
    Material,
    Misc,
}

impl AssetKind {
    pub const COUNT: usize = 6;

    /// All kinds, in table order. GPU locks are taken in this order.
    pub const ALL: [AssetKind; AssetKind::COUNT] = [
        AssetKind::Mesh,
        AssetKind::Texture,
        AssetKind::Sampler,
        AssetKind::Shader,
        AssetKind::Material,
        AssetKind::Misc,
    ];

    /// Kinds whose metadata can link to other assets
    pub const DEPENDENCY_CAPABLE: [AssetKind; 2] = [AssetKind::Shader, AssetKind::Material];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            AssetKind::Mesh => "Mesh",
            AssetKind::Texture => "Texture",
            AssetKind::Sampler => "Sampler",
            AssetKind::Shader => "Shader",
            AssetKind::Material => "Material",
            AssetKind::Misc => "Misc",
        }
    }

    /// Directory under the metadata root holding this kind's metadata files
    pub fn dir_name(self) -> &'static str {
        match self {
            AssetKind::Mesh => "meshes",
            AssetKind::Texture => "textures",
            AssetKind::Sampler => "samplers",
            AssetKind::Shader => "shaders",
            AssetKind::Material => "materials",
            AssetKind::Misc => "misc",
        }
    }

    /// Samplers and materials are described entirely by their metadata.
    pub fn requires_file(self) -> bool {
        !matches!(self, AssetKind::Sampler | AssetKind::Material)
    }

    pub fn has_dependencies(self) -> bool {
        matches!(self, AssetKind::Shader | AssetKind::Material)
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One value per asset kind, indexed by [`AssetKind`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KindMap<T> {
    slots: [T; AssetKind::COUNT],
}

impl<T> KindMap<T> {
    pub fn from_fn(mut f: impl FnMut(AssetKind) -> T) -> Self {
        Self {
            slots: std::array::from_fn(|i| f(AssetKind::ALL[i])),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (AssetKind, &T)> {
        AssetKind::ALL.into_iter().zip(self.slots.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (AssetKind, &mut T)> {
        AssetKind::ALL.into_iter().zip(self.slots.iter_mut())
    }
}

impl<T> Index<AssetKind> for KindMap<T> {
    type Output = T;

    #[inline]
    fn index(&self, kind: AssetKind) -> &T {
        &self.slots[kind.index()]
    }
}

impl<T> IndexMut<AssetKind> for KindMap<T> {
    #[inline]
    fn index_mut(&mut self, kind: AssetKind) -> &mut T {
        &mut self.slots[kind.index()]
    }
}

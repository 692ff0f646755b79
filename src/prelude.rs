//! Convenient re-exports of commonly used types.
//!
//! The prelude can be imported with:
//! ```
//! use archetype_asset_db::prelude::*;
//! ```

pub use crate::backend::{Collaborators, MetadataStore, ResourceManager, TimeStampStore};
pub use crate::config::{CacheConfig, MountPoint};
pub use crate::context::{AssetContext, ReloadStatus};
pub use crate::diagnostics::{Diagnostic, Severity};
pub use crate::error::{AssetError, Result};
pub use crate::event::Guard;
pub use crate::handle::{AssetGroups, AssetRef};
pub use crate::io::JsonMetadataStore;
pub use crate::kind::AssetKind;
pub use crate::metadata::{AssetLink, AssetMetadata};
pub use crate::notify::{AssetListener, ResourceBindings};
pub use crate::record::{ResourceId, ResourceState};
pub use crate::view::ViewId;
#[cfg(feature = "parallel")]
pub use crate::tasks::ThreadPoolSubmitter;

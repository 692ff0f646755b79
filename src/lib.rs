// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Archetype Asset DB - asset dependency and lifecycle cache
//!
//! Reference-counted asset records with staleness detection, dependency
//! walks, and asynchronous load, reload and unload against a pluggable
//! resource manager.

pub mod backend;
pub mod config;
pub mod context;
pub mod database;
pub mod dependency;
pub mod diagnostics;
pub mod error;
pub mod event;
pub mod handle;
pub mod headless;
pub mod io;
pub mod kind;
pub mod locks;
pub mod metadata;
pub mod notify;
pub mod orchestrator;
pub mod prelude;
pub mod profiling;
pub mod record;
pub mod staleness;
pub mod tasks;
pub mod view;

pub use backend::*;
pub use config::*;
pub use context::*;
pub use database::*;
pub use dependency::*;
pub use diagnostics::*;
pub use error::*;
pub use event::*;
pub use handle::*;
pub use kind::*;
pub use metadata::*;
pub use notify::*;
pub use record::*;
pub use view::*;

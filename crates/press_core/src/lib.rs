//! Client side of VS Press: the orchestrator that turns user actions into
//! collaborator calls and keeps a per-user [`SessionContext`] for the views.

pub mod collaborators;
pub mod config;
pub mod error;
pub mod http;
pub mod orchestrator;
pub mod router;
pub mod session;
pub mod theme;
pub mod views;

pub use collaborators::{BlobCollaborator, DocumentCollaborator, IdentityCollaborator, SessionChange};
pub use config::{ClientConfig, ConfigError};
pub use error::ActionError;
pub use http::HttpBackend;
pub use orchestrator::{Orchestrator, MAX_IMAGE_BYTES};
pub use router::Route;
pub use session::{ArticleForm, Notice, NoticeKind, SessionContext};
pub use theme::{FileThemeStore, MemoryThemeStore, Theme, ThemeStore};
pub use views::{render, View};

#[cfg(test)]
#[path = "tests/fakes.rs"]
mod fakes;

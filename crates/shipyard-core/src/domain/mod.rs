//! Domain - ドメインモデル（ids, app, spec, state, version, resources, events, errors）

pub mod app;
pub mod errors;
pub mod events;
pub mod ids;
pub mod resources;
pub mod spec;
pub mod state;
pub mod version;

pub use app::{App, AppContent, Framework, Mode};
pub use errors::{PlatformError, ValidationFailure};
pub use events::{ClusterEvent, ContainerState, EventSeverity, Phase, PodSnapshot};
pub use ids::{AppId, DatabaseId, IdError, OwnerId};
pub use resources::{DesiredResources, LabelSelector, Resource, ResourceKind};
pub use spec::{AppChanges, AppSpec, DraftContent};
pub use state::AppStatus;
pub use version::{
    VersionEntry, VersionHistory, VersionSummary, content_hash, has_unpublished_changes, hash_code,
    hash_files,
};

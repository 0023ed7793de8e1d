//! Attachview clinical attachment viewer library
//!
//! This library loads clinical 3D attachments (glTF meshes and spline
//! measurement datasets) from a record service and renders them with Bevy.
//! The `lib` modules are plain data and worker code; `app` holds the ECS
//! systems and the egui side panel.

pub mod lib {
    pub mod attachment;
    pub mod curve;
    pub mod dataset;
    pub mod fetch;
    pub mod framing;
    pub mod geometry;
    pub mod mesh_asset;
    pub mod picking;
    pub mod progress;
    pub mod settings;
    pub mod workers;
}

pub mod app {
    pub mod cli;
    pub mod systems;
    pub mod ui;
}

// Re-export commonly used types from lib modules
pub use app::systems::AttachviewPlugin;
pub use app::ui::AttachviewUiPlugin;
pub use lib::attachment::{route, Attachment, Route, ViewerKind};
pub use lib::dataset::{classify, parse_dataset, Dataset};
pub use lib::fetch::{ApiClient, FetchError};
pub use lib::geometry::{normalize, NormalizationScope};
pub use lib::settings::{Settings, ViewerConfig};

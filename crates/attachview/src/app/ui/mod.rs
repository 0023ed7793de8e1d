//! User interface module for Attachview
//!
//! A single egui side panel lists the owner's attachments and shows the
//! state of whichever viewer is mounted. Non-3D outcomes (image, unsupported
//! media type, nothing selected) fill the central area instead.

use bevy::prelude::*;
use bevy_egui::{EguiPlugin, EguiPrimaryContextPass};

pub mod panel;

pub use panel::{mesh_status_text, spline_status_text};

/// Main UI plugin
pub struct AttachviewUiPlugin;

impl Plugin for AttachviewUiPlugin {
    fn build(&self, app: &mut App) {
        // Add bevy_egui plugin if not already added
        if !app.is_plugin_added::<EguiPlugin>() {
            app.add_plugins(EguiPlugin::default());
        }

        app.add_systems(
            EguiPrimaryContextPass,
            (panel::side_panel_system, panel::central_panel_system).chain(),
        );

        info!("Attachview UI plugin loaded");
    }
}

//! Side and central panels

use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts};

use crate::app::systems::camera::PanelInset;
use crate::app::systems::index::{AttachmentIndex, IndexStatus};
use crate::app::systems::mesh_viewer::{MeshViewer, ZoomCamera, ZoomDirection};
use crate::app::systems::router::{ActiveViewer, OpenAttachment, ViewerView};
use crate::app::systems::spline_viewer::{PickableMarker, RefreshDataset, SplineStatus, SplineViewer};
use crate::lib::progress::MeshLoadState;

const PANEL_WIDTH: f32 = 280.0;
const ERROR_COLOR: egui::Color32 = egui::Color32::from_rgb(230, 90, 90);

pub fn mesh_status_text(state: &MeshLoadState) -> String {
    match state {
        MeshLoadState::Idle => "Waiting".to_string(),
        MeshLoadState::Loading(progress) => format!("Loading... {}%", progress.percent()),
        MeshLoadState::Ready => "Ready".to_string(),
        MeshLoadState::Failed(reason) => format!("Failed: {reason}"),
    }
}

pub fn spline_status_text(status: &SplineStatus) -> String {
    match status {
        SplineStatus::Fetching => "Fetching dataset...".to_string(),
        SplineStatus::Normalizing => "Normalizing...".to_string(),
        SplineStatus::Ready {
            splines,
            scalars,
            points,
        } => format!("{splines} splines ({points} points), {scalars} scalars"),
        SplineStatus::Failed(reason) => format!("Failed: {reason}"),
    }
}

/// Attachment list and viewer controls
#[allow(clippy::too_many_arguments)]
pub fn side_panel_system(
    mut contexts: EguiContexts,
    index: Res<AttachmentIndex>,
    active: Res<ActiveViewer>,
    mesh_viewers: Query<&MeshViewer>,
    spline_viewers: Query<&SplineViewer>,
    markers: Query<&PickableMarker>,
    mut open: MessageWriter<OpenAttachment>,
    mut zoom: MessageWriter<ZoomCamera>,
    mut refresh: MessageWriter<RefreshDataset>,
    mut inset: ResMut<PanelInset>,
) {
    let Ok(ctx) = contexts.ctx_mut() else {
        return;
    };

    let response = egui::SidePanel::left("attachments")
        .default_width(PANEL_WIDTH)
        .resizable(true)
        .show(ctx, |ui| {
            match index.patient_title() {
                Some(title) => ui.heading(title),
                None => ui.heading("Attachments"),
            };
            ui.separator();

            match &index.status {
                IndexStatus::Idle => {
                    ui.label("No owner selected");
                }
                IndexStatus::Loading => {
                    ui.horizontal(|ui| {
                        ui.spinner();
                        ui.label("Loading attachments...");
                    });
                }
                IndexStatus::Failed(reason) => {
                    ui.colored_label(ERROR_COLOR, reason);
                }
                IndexStatus::Loaded if index.attachments.is_empty() => {
                    ui.label("No attachments");
                }
                IndexStatus::Loaded => {}
            }

            egui::ScrollArea::vertical()
                .max_height(ui.available_height() * 0.5)
                .show(ui, |ui| {
                    for attachment in &index.attachments {
                        let selected = active.attachment.as_ref() == Some(attachment);
                        let label = format!("{}\n{}", attachment.display_name(), attachment.media_type);
                        if ui.selectable_label(selected, label).clicked() {
                            open.write(OpenAttachment {
                                attachment: attachment.clone(),
                            });
                        }
                    }
                });

            ui.separator();

            let root = active.root();
            if let Some(viewer) = root.and_then(|root| mesh_viewers.get(root).ok()) {
                ui.strong(&viewer.name);
                match viewer.percent() {
                    Some(percent) if !viewer.state.is_ready() => {
                        ui.add(
                            egui::ProgressBar::new(percent as f32 / 100.0)
                                .text(format!("{percent}%")),
                        );
                    }
                    _ => {}
                }
                status_label(ui, &mesh_status_text(&viewer.state), viewer.percent().is_none());
                ui.horizontal(|ui| {
                    if ui.button("Zoom in").clicked() {
                        zoom.write(ZoomCamera(ZoomDirection::In));
                    }
                    if ui.button("Zoom out").clicked() {
                        zoom.write(ZoomCamera(ZoomDirection::Out));
                    }
                });
            }

            if let Some(viewer) = root.and_then(|root| spline_viewers.get(root).ok()) {
                ui.strong(&viewer.name);
                let failed = matches!(viewer.status, SplineStatus::Failed(_));
                status_label(ui, &spline_status_text(&viewer.status), failed);

                if !viewer.scalars.is_empty() {
                    egui::CollapsingHeader::new("Measurements")
                        .default_open(true)
                        .show(ui, |ui| {
                            for scalar in &viewer.scalars {
                                ui.label(format!("{}: {}", scalar.label, scalar.display_value()));
                            }
                        });
                }

                if let Some(marker) = viewer.selected().and_then(|e| markers.get(e).ok()) {
                    let label = viewer
                        .labels
                        .get(marker.spline)
                        .map(String::as_str)
                        .unwrap_or("?");
                    ui.label(format!("Selected: {} #{}", label, marker.index));
                }

                if ui.button("Reload").clicked() {
                    refresh.write(RefreshDataset);
                }
            }
        });

    inset.left = response.response.rect.width();
}

fn status_label(ui: &mut egui::Ui, text: &str, is_error: bool) {
    if is_error {
        ui.colored_label(ERROR_COLOR, text);
    } else {
        ui.label(text);
    }
}

/// Central area for everything the 3D viewers don't cover
pub fn central_panel_system(mut contexts: EguiContexts, active: Res<ActiveViewer>) {
    let Ok(ctx) = contexts.ctx_mut() else {
        return;
    };

    match &active.view {
        ViewerView::Mesh { .. } | ViewerView::Spline { .. } => {}
        ViewerView::Empty => centered(ctx, |ui| {
            ui.label("Select an attachment");
        }),
        ViewerView::Image { url, name } => centered(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.heading(name);
                ui.hyperlink(url);
            });
        }),
        ViewerView::Unsupported { media_type } => centered(ctx, |ui| {
            ui.label(format!("No viewer available for media type: {media_type}"));
        }),
        ViewerView::Failed { reason } => centered(ctx, |ui| {
            ui.colored_label(ERROR_COLOR, reason);
        }),
    }
}

fn centered(ctx: &egui::Context, add: impl FnOnce(&mut egui::Ui)) {
    egui::CentralPanel::default().show(ctx, |ui| {
        ui.centered_and_justified(add);
    });
}

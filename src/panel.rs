//! Edit panel for camera, lights and materials.
//!
//! The panel only reads the scene. Every widget that reports a change adds
//! one [`SceneEdit`](crate::scene::SceneEdit) to the returned [`EditSet`];
//! applying it is up to the caller.

use glam::{Vec3, Vec4};

use crate::scene::{CameraEdit, CameraParams, EditSet, LightEdit, Material, MaterialEdit, SceneStore};

pub struct ControlPanel {
    visible: bool,
    selected_light: usize,
    selected_material: usize,
}

impl Default for ControlPanel {
    fn default() -> Self {
        Self::new(false)
    }
}

impl ControlPanel {
    pub const TITLE: &'static str = "Control Panel";
    pub const POSITION: [f32; 2] = [2.0, 2.0];
    pub const SIZE: [f32; 2] = [308.0, 512.0];

    pub fn new(visible: bool) -> Self {
        Self {
            visible,
            selected_light: 0,
            selected_material: 0,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Show the panel from the next frame on
    pub fn reveal(&mut self) {
        self.visible = true;
    }

    pub fn selected_light(&self) -> usize {
        self.selected_light
    }

    pub fn selected_material(&self) -> usize {
        self.selected_material
    }

    /// Draw the panel and collect the edits made this frame
    pub fn show(&mut self, ctx: &egui::Context, scene: &SceneStore) -> EditSet {
        let mut edits = EditSet::new();
        if !self.visible {
            return edits;
        }

        let mut open = true;
        egui::Window::new(Self::TITLE)
            .open(&mut open)
            .default_pos(Self::POSITION)
            .default_size(Self::SIZE)
            .show(ctx, |ui| {
                camera_section(ui, scene.camera_params(), &mut edits);
                ui.separator();
                self.light_section(ui, scene, &mut edits);
                ui.separator();
                self.material_section(ui, scene, &mut edits);
            });
        self.visible = open;
        edits
    }

    fn light_section(&mut self, ui: &mut egui::Ui, scene: &SceneStore, edits: &mut EditSet) {
        ui.heading("Light");
        let last = scene.light_count().saturating_sub(1);
        index_row(ui, "Index", &mut self.selected_light, last);

        let index = self.selected_light;
        let Ok(light) = scene.light(index) else {
            return;
        };

        if let Some(xyz) = vec3_row(ui, "Position", light.position.truncate()) {
            edits.light(index, LightEdit::Position(xyz.extend(light.position.w)));
        }
        if let Some(v) = rgb_row(ui, "Ambient", light.ambient) {
            edits.light(index, LightEdit::Ambient(v));
        }
        if let Some(v) = rgb_row(ui, "Diffuse", light.diffuse) {
            edits.light(index, LightEdit::Diffuse(v));
        }
        if let Some(v) = rgb_row(ui, "Specular", light.specular) {
            edits.light(index, LightEdit::Specular(v));
        }
    }

    fn material_section(&mut self, ui: &mut egui::Ui, scene: &SceneStore, edits: &mut EditSet) {
        ui.heading("Material");
        let last = scene.material_count().saturating_sub(1);
        index_row(ui, "Index", &mut self.selected_material, last);

        let index = self.selected_material;
        let Ok(material) = scene.material(index) else {
            return;
        };

        if let Some(v) = rgb_row(ui, "Ambient", material.ambient) {
            edits.material(index, MaterialEdit::Ambient(v));
        }
        if let Some(v) = rgb_row(ui, "Diffuse", material.diffuse) {
            edits.material(index, MaterialEdit::Diffuse(v));
        }
        if let Some(v) = rgb_row(ui, "Specular", material.specular) {
            edits.material(index, MaterialEdit::Specular(v));
        }

        let mut shininess = material.shininess;
        let changed = ui
            .horizontal(|ui| {
                ui.label("Shininess");
                ui.add(
                    egui::DragValue::new(&mut shininess)
                        .speed(1.0)
                        .clamp_range(Material::MIN_SHININESS..=Material::MAX_SHININESS),
                )
                .changed()
            })
            .inner;
        if changed {
            edits.material(index, MaterialEdit::Shininess(shininess));
        }
    }
}

fn camera_section(ui: &mut egui::Ui, params: &CameraParams, edits: &mut EditSet) {
    ui.heading("Camera");
    if let Some(eye) = vec3_row(ui, "Eye", params.eye) {
        edits.camera(CameraEdit::Eye(eye));
    }
    if let Some(target) = vec3_row(ui, "Target", params.target) {
        edits.camera(CameraEdit::Target(target));
    }
    if let Some(up) = vec3_row(ui, "Up", params.up) {
        edits.camera(CameraEdit::Up(up));
    }

    let mut fovy = params.fovy_degrees;
    let changed = ui
        .horizontal(|ui| {
            ui.label("Field of view");
            ui.add(
                egui::DragValue::new(&mut fovy)
                    .speed(1.0)
                    .clamp_range(CameraParams::MIN_FOVY..=CameraParams::MAX_FOVY)
                    .suffix("°"),
            )
            .changed()
        })
        .inner;
    if changed {
        edits.camera(CameraEdit::FovY(fovy));
    }
}

fn index_row(ui: &mut egui::Ui, label: &str, index: &mut usize, last: usize) {
    ui.horizontal(|ui| {
        ui.label(label);
        ui.add(egui::DragValue::new(index).speed(0.1).clamp_range(0..=last));
    });
    *index = (*index).min(last);
}

fn vec3_row(ui: &mut egui::Ui, label: &str, value: Vec3) -> Option<Vec3> {
    let mut components = value.to_array();
    let mut changed = false;
    ui.horizontal(|ui| {
        ui.label(label);
        for c in &mut components {
            changed |= ui.add(egui::DragValue::new(c).speed(0.01)).changed();
        }
    });
    changed.then(|| Vec3::from_array(components))
}

fn rgb_row(ui: &mut egui::Ui, label: &str, value: Vec4) -> Option<Vec4> {
    let mut rgb = value.truncate().to_array();
    let changed = ui
        .horizontal(|ui| {
            ui.label(label);
            ui.color_edit_button_rgb(&mut rgb).changed()
        })
        .inner;
    changed.then(|| with_rgb(value, rgb))
}

/// Replace the colour channels, keeping the fourth component
pub fn with_rgb(value: Vec4, rgb: [f32; 3]) -> Vec4 {
    Vec4::new(rgb[0], rgb[1], rgb[2], value.w)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn show_once(panel: &mut ControlPanel, scene: &SceneStore) -> EditSet {
        let ctx = egui::Context::default();
        let mut edits = EditSet::new();
        let _ = ctx.run(egui::RawInput::default(), |ctx| {
            edits = panel.show(ctx, scene);
        });
        edits
    }

    #[test]
    fn test_hidden_panel_reports_nothing() {
        let mut panel = ControlPanel::default();
        assert!(!panel.is_visible());
        assert!(show_once(&mut panel, &SceneStore::default()).is_empty());
    }

    #[test]
    fn test_untouched_panel_reports_nothing() {
        let mut panel = ControlPanel::default();
        panel.reveal();
        assert!(show_once(&mut panel, &SceneStore::default()).is_empty());
        assert!(panel.is_visible());
    }

    #[test]
    fn test_colour_edit_keeps_weight() {
        let ambient = Vec4::new(0.2, 0.2, 0.2, 1.0);
        assert_eq!(with_rgb(ambient, [0.5, 0.4, 0.3]), Vec4::new(0.5, 0.4, 0.3, 1.0));
        let diffuse = Vec4::new(1.0, 1.0, 1.0, 0.0);
        assert_eq!(with_rgb(diffuse, [0.0, 0.0, 0.0]).w, 0.0);
    }
}

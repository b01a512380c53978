//! Normalized status stream relayed to the host page's status tray.

use fnv::FnvHashMap;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Subsystem {
    Engine,
    Plane,
    Occlusion,
    Lighting,
}

impl Subsystem {
    pub const ALL: [Subsystem; 4] = [
        Subsystem::Engine,
        Subsystem::Plane,
        Subsystem::Occlusion,
        Subsystem::Lighting,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Subsystem::Engine => "engine",
            Subsystem::Plane => "plane",
            Subsystem::Occlusion => "occlusion",
            Subsystem::Lighting => "lighting",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusState {
    Neutral,
    Pending,
    Success,
    Warning,
    Error,
}

impl StatusState {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusState::Neutral => "neutral",
            StatusState::Pending => "pending",
            StatusState::Success => "success",
            StatusState::Warning => "warning",
            StatusState::Error => "error",
        }
    }
}

/// `{id, label, state}` as the host expects it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatusEvent {
    pub id: Subsystem,
    pub label: String,
    pub state: StatusState,
}

impl StatusEvent {
    pub fn new(id: Subsystem, label: impl Into<String>, state: StatusState) -> Self {
        Self {
            id,
            label: label.into(),
            state,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

pub trait StatusSink {
    fn emit(&mut self, event: StatusEvent);
}

impl StatusSink for Vec<StatusEvent> {
    fn emit(&mut self, event: StatusEvent) {
        self.push(event);
    }
}

/// Latest event per subsystem. Forwards only changes, so per-frame callers
/// can report unconditionally without flooding the host.
#[derive(Default)]
pub struct StatusBoard {
    latest: [Option<StatusEvent>; 4],
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `event`; returns true when it differs from the previous one.
    pub fn update(&mut self, event: StatusEvent) -> bool {
        let slot = &mut self.latest[event.id.index()];
        if slot.as_ref() == Some(&event) {
            return false;
        }
        *slot = Some(event);
        true
    }

    pub fn get(&self, id: Subsystem) -> Option<&StatusEvent> {
        self.latest[id.index()].as_ref()
    }

    pub fn relay(&mut self, event: StatusEvent, sink: &mut dyn StatusSink) {
        if self.update(event.clone()) {
            log::debug!(
                "[status] {} -> {} ({})",
                event.id.id(),
                event.state.as_str(),
                event.label
            );
            sink.emit(event);
        }
    }
}

/// Localized status labels with English defaults.
#[derive(Clone, Debug, Default)]
pub struct StatusLabels {
    strings: FnvHashMap<String, String>,
}

impl StatusLabels {
    pub fn new(strings: FnvHashMap<String, String>) -> Self {
        Self { strings }
    }

    pub fn get(&self, key: &str) -> String {
        if let Some(s) = self.strings.get(key).filter(|s| !s.trim().is_empty()) {
            return s.clone();
        }
        default_label(key).to_string()
    }
}

fn default_label(key: &str) -> &'static str {
    match key {
        "unsupported_device" => "Your device does not support the live preview",
        "engine_starting" => "Starting camera",
        "engine_surface" => "AR tracking active",
        "engine_planar" => "Live preview active",
        "camera_blocked" => "Camera access is blocked. Update your browser permissions to use the live preview.",
        "camera_unavailable" => "No usable camera was found",
        "status_searching" => "Looking for a wall",
        "status_previewing" => "Wall detected, tap to place",
        "status_confirmed" => "Wallpaper placed",
        "status_depth" => "Depth sensing",
        "status_segmentation" => "Using segmentation",
        "status_segmentation_loading" => "Loading segmentation model",
        "status_occlusion_off" => "Occlusion off",
        "status_occlusion_unavailable" => "No occlusion available",
        "status_lighting" => "Lighting estimate",
        "status_lighting_unavailable" => "No lighting estimate",
        "status_quad" => "Drag the corners onto your wall",
        _ => "",
    }
}

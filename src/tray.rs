use ar_core::{StatusState, Subsystem};

pub const STATUS_ID_PREFIX: &str = "arwp-status-";
pub const STATE_CLASS_PREFIX: &str = "arwp-status--";

pub const ALL_STATES: [StatusState; 5] = [
    StatusState::Neutral,
    StatusState::Pending,
    StatusState::Success,
    StatusState::Warning,
    StatusState::Error,
];

/// Tray element that shows one subsystem, e.g. `arwp-status-occlusion`.
#[inline]
pub fn element_id(id: Subsystem) -> String {
    format!("{}{}", STATUS_ID_PREFIX, id.id())
}

#[inline]
pub fn state_class(state: StatusState) -> String {
    format!("{}{}", STATE_CLASS_PREFIX, state.as_str())
}

/// Errors replace the guidance line; everything else leaves it alone.
#[inline]
pub fn is_blocking(id: Subsystem, state: StatusState) -> bool {
    id == Subsystem::Engine && state == StatusState::Error
}

/// Download name for an exported frame.
pub fn snapshot_file_name(prefix: &str, now_ms: f64) -> String {
    format!("{}-{}.png", prefix, now_ms.max(0.0) as u64)
}

use crate::constants::{BRIGHTNESS_MAX, BRIGHTNESS_MIN, LIGHT_SMOOTHING_ALPHA};
use crate::status::{StatusEvent, StatusLabels, StatusState, Subsystem};

/// Scales wallpaper brightness by the platform's light estimate.
///
/// The average of the primary light intensity channels is smoothed
/// exponentially; without estimates the factor stays at 1.0.
#[derive(Clone, Debug)]
pub struct LightEstimator {
    alpha: f32,
    level: Option<f32>,
}

impl Default for LightEstimator {
    fn default() -> Self {
        Self {
            alpha: LIGHT_SMOOTHING_ALPHA,
            level: None,
        }
    }
}

impl LightEstimator {
    pub fn update(&mut self, primary_intensity: [f32; 3]) -> f32 {
        if primary_intensity.iter().any(|c| !c.is_finite()) {
            return self.factor();
        }
        let avg = (primary_intensity[0] + primary_intensity[1] + primary_intensity[2]) / 3.0;
        let target = avg.clamp(BRIGHTNESS_MIN, BRIGHTNESS_MAX);
        let next = match self.level {
            None => target,
            Some(prev) => prev + (target - prev) * self.alpha,
        };
        self.level = Some(next);
        next
    }

    pub fn factor(&self) -> f32 {
        self.level.unwrap_or(1.0)
    }

    /// Product brightness times the estimate, clamped.
    pub fn apply(&self, base: f32) -> f32 {
        (base * self.factor()).clamp(BRIGHTNESS_MIN, BRIGHTNESS_MAX)
    }

    pub fn has_estimate(&self) -> bool {
        self.level.is_some()
    }

    pub fn reset(&mut self) {
        self.level = None;
    }

    pub fn status(&self, labels: &StatusLabels) -> StatusEvent {
        if self.has_estimate() {
            StatusEvent::new(Subsystem::Lighting, labels.get("status_lighting"), StatusState::Success)
        } else {
            StatusEvent::new(
                Subsystem::Lighting,
                labels.get("status_lighting_unavailable"),
                StatusState::Neutral,
            )
        }
    }
}

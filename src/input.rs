use ar_core::UserAction;
use glam::{Mat4, Vec2, Vec3, Vec4};

/// Map a pointer position in client (CSS) pixels onto a surface of
/// `surface` units drawn stretched over the element rectangle.
///
/// Returns `None` when the element has no area yet.
#[inline]
pub fn client_to_surface(client: Vec2, rect_min: Vec2, rect_size: Vec2, surface: Vec2) -> Option<Vec2> {
    if rect_size.x <= 0.0 || rect_size.y <= 0.0 {
        return None;
    }
    Some((client - rect_min) / rect_size * surface)
}

/// Pixel position to normalized device coordinates (y up).
#[inline]
pub fn pixel_to_ndc(p: Vec2, size: Vec2) -> Vec2 {
    let w = size.x.max(1.0);
    let h = size.y.max(1.0);
    Vec2::new(2.0 * p.x / w - 1.0, 1.0 - 2.0 * p.y / h)
}

/// World-space ray through an NDC point, given the inverse of
/// `projection * view`.
///
/// Returns `(ray_origin, ray_direction)`; the origin lies on the near plane.
#[inline]
pub fn screen_to_world_ray(ndc: Vec2, inv_view_proj: Mat4) -> Option<(Vec3, Vec3)> {
    let p_near = inv_view_proj * Vec4::new(ndc.x, ndc.y, -1.0, 1.0);
    let p_far = inv_view_proj * Vec4::new(ndc.x, ndc.y, 1.0, 1.0);
    if p_near.w.abs() < 1e-9 || p_far.w.abs() < 1e-9 {
        return None;
    }
    let p0: Vec3 = p_near.truncate() / p_near.w;
    let p1: Vec3 = p_far.truncate() / p_far.w;
    let dir = (p1 - p0).normalize_or_zero();
    (dir != Vec3::ZERO && p0.is_finite()).then_some((p0, dir))
}

/// Intersection of a ray with a plane; only hits in front of the origin.
#[inline]
pub fn ray_plane(origin: Vec3, dir: Vec3, plane_point: Vec3, normal: Vec3) -> Option<Vec3> {
    let denom = dir.dot(normal);
    if denom.abs() < 1e-6 {
        return None;
    }
    let t = (plane_point - origin).dot(normal) / denom;
    (t >= 0.0).then(|| origin + dir * t)
}

/// Keyboard shortcut for a `KeyboardEvent.key` value.
pub fn action_for_key(key: &str) -> Option<UserAction> {
    match key {
        "Enter" | " " => Some(UserAction::Confirm),
        "r" | "R" => Some(UserAction::Reset),
        "w" | "W" => Some(UserAction::FitWidth),
        "h" | "H" => Some(UserAction::FitHeight),
        "f" | "F" => Some(UserAction::FitWall),
        "+" | "=" => Some(UserAction::Scale(1)),
        "-" | "_" => Some(UserAction::Scale(-1)),
        "[" => Some(UserAction::Rotate(-1)),
        "]" => Some(UserAction::Rotate(1)),
        "ArrowLeft" => Some(UserAction::Nudge(-1, 0)),
        "ArrowRight" => Some(UserAction::Nudge(1, 0)),
        "ArrowUp" => Some(UserAction::Nudge(0, 1)),
        "ArrowDown" => Some(UserAction::Nudge(0, -1)),
        _ => None,
    }
}

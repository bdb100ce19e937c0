use jigsync_core::{PieceId, Pose, Vec3};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScreenPoint {
    pub x: f32,
    pub y: f32,
}

impl ScreenPoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// What the client needs from whatever draws the board.
pub trait RenderSurface {
    /// Topmost piece under the pointer, if any.
    fn pick(&self, screen: ScreenPoint) -> Option<PieceId>;
    /// World point on the working plane (or cylinder) under the pointer.
    fn project(&self, screen: ScreenPoint) -> Vec3;
}

/// Orbit or pan control that must stay still while a piece is held.
pub trait CameraControl {
    fn set_enabled(&self, enabled: bool);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoCamera;

impl CameraControl for NoCamera {
    fn set_enabled(&self, _enabled: bool) {}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PieceView {
    pub id: PieceId,
    pub pose: Pose,
    pub is_placed: bool,
    pub is_selected: bool,
}

use cgmath::{InnerSpace, Matrix4, Point3, Rad, Vector3};

#[rustfmt::skip]
const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// What the renderers need to know about a viewer.
pub trait Camera {
    fn view(&self) -> Matrix4<f32>;
    /// Projection to wgpu clip space (depth in [0, 1]).
    fn projection(&self) -> Matrix4<f32>;
    fn position(&self) -> Point3<f32>;
}

/// Orbits around a center point, always looking at it. Y is up.
pub struct OrbitCamera {
    pub center: Point3<f32>,
    pub distance: f32,
    pub yaw: Rad<f32>,
    pub pitch: Rad<f32>,
    pub fov_y: Rad<f32>,
    pub aspect_ratio: f32,
    pub near: f32,
    pub far: f32,

    dragging: bool,
    last_cursor: Option<(f64, f64)>,
}

impl OrbitCamera {
    const ROTATION_SPEED: f32 = 0.005;
    const ZOOM_SPEED: f32 = 0.1;
    const MAX_PITCH: f32 = 1.5;

    pub fn new(center: Point3<f32>, distance: f32, aspect_ratio: f32) -> Self {
        OrbitCamera {
            center,
            distance,
            yaw: Rad(0.6),
            pitch: Rad(0.4),
            fov_y: Rad(std::f32::consts::FRAC_PI_4),
            aspect_ratio,
            near: 0.01,
            far: 100.0,
            dragging: false,
            last_cursor: None,
        }
    }

    pub fn set_aspect_ratio(&mut self, aspect_ratio: f32) {
        self.aspect_ratio = aspect_ratio;
    }

    pub fn set_dragging(&mut self, dragging: bool) {
        self.dragging = dragging;
    }

    pub fn on_cursor_moved(&mut self, x: f64, y: f64) {
        if let (true, Some((last_x, last_y))) = (self.dragging, self.last_cursor) {
            self.yaw += Rad((x - last_x) as f32 * Self::ROTATION_SPEED);
            self.pitch = Rad(((self.pitch.0) + (y - last_y) as f32 * Self::ROTATION_SPEED).clamp(-Self::MAX_PITCH, Self::MAX_PITCH));
        }
        self.last_cursor = Some((x, y));
    }

    /// Positive steps zoom in.
    pub fn on_scroll(&mut self, steps: f32) {
        self.distance = (self.distance * (1.0 - steps * Self::ZOOM_SPEED)).max(self.near * 2.0);
    }

    fn direction(&self) -> Vector3<f32> {
        Vector3::new(
            self.pitch.0.cos() * self.yaw.0.sin(),
            self.pitch.0.sin(),
            self.pitch.0.cos() * self.yaw.0.cos(),
        )
        .normalize()
    }
}

impl Camera for OrbitCamera {
    fn view(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(self.position(), self.center, Vector3::unit_y())
    }

    fn projection(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * cgmath::perspective(self.fov_y, self.aspect_ratio, self.near, self.far)
    }

    fn position(&self) -> Point3<f32> {
        self.center + self.direction() * self.distance
    }
}

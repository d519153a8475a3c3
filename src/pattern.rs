//! Synthetic moving input for offline renders: a dot orbiting the centre.

use glam::{Vec2, Vec4};
use serde::{Deserialize, Serialize};

use crate::frame::{texel_centre, FrameImage, Viewport};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PatternConfig {
    pub speed: f32,        // Radians per second
    pub orbit_radius: f32, // Fraction of the shorter side
    pub dot_radius: f32,   // Fraction of the shorter side
    pub color: [f32; 4],
    pub background: [f32; 4],
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            speed: std::f32::consts::PI,
            orbit_radius: 0.3,
            dot_radius: 0.05,
            color: [1.0, 0.2, 0.1, 1.0],
            background: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

pub struct OrbitPattern {
    pub time: f32,
    pub angle: f32,
    pub config: PatternConfig,
}

impl OrbitPattern {
    pub fn new(config: PatternConfig) -> Self {
        Self {
            time: 0.0,
            angle: 0.0,
            config,
        }
    }

    pub fn reset(&mut self) {
        self.time = 0.0;
        self.angle = 0.0;
    }

    pub fn update(&mut self, dt: f32) {
        self.time += dt;
        self.angle = (self.angle + self.config.speed * dt) % std::f32::consts::TAU;
    }

    /// Dot centre in normalized coordinates (0-1, origin top-left).
    pub fn dot_centre(&self, size: Viewport) -> Vec2 {
        let aspect = Vec2::new(size.width as f32, size.height as f32);
        let min_side = aspect.min_element();
        let offset = Vec2::from_angle(self.angle) * self.config.orbit_radius * min_side;
        Vec2::splat(0.5) + offset / aspect
    }

    pub fn draw(&self, size: Viewport) -> FrameImage {
        let background = Vec4::from_array(self.config.background);
        let color = Vec4::from_array(self.config.color);
        let mut image = FrameImage::solid(size.width, size.height, background);

        let dims = Vec2::new(size.width as f32, size.height as f32);
        let centre_px = self.dot_centre(size) * dims;
        let radius_px = self.config.dot_radius * dims.min_element();

        for y in 0..size.height {
            for x in 0..size.width {
                let p = texel_centre(x, y, size) * dims;
                if p.distance(centre_px) <= radius_px {
                    image.set_pixel(x, y, color);
                }
            }
        }
        image
    }
}

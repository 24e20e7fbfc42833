//! The sun: a directional light with ambient term and its light-space projection.

mod directional;
mod light_space;

pub use directional::{DEFAULT_LIGHT_DIRECTION, DirectionalLight, LightUniform, sanitize_direction};
pub use light_space::{LightSpace, fit_light_space};

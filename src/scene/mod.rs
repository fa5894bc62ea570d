//! Scene data model

mod camera;
mod edit;
mod light;
mod material;
mod sphere;
mod store;

pub use camera::*;
pub use edit::*;
pub use light::*;
pub use material::*;
pub use sphere::*;
pub use store::*;

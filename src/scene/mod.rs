//! Composite scene construction: typed build sections lowered to the script
//! bodies the remote 3D application executes.

pub mod camera;
pub mod composite;
pub mod materials;
pub mod script;

pub use composite::{build_script, BuildOptions};
pub use script::SceneScript;

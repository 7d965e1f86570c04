pub mod device;
pub mod effects;
pub mod light;
pub mod models;
pub mod settings;

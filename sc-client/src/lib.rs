pub mod config;
pub mod errors;
pub mod generation;
pub mod model;
pub mod photo;
pub mod session;
pub mod voice;

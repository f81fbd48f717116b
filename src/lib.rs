#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate more_asserts;
#[macro_use]
extern crate strum_macros;

pub mod backend;
pub mod camera;
pub mod config;
pub mod error;
pub mod format_info;
pub mod grid;
pub mod kernel;
pub mod ping_pong;
pub mod renderer;
pub mod simulation;
pub mod simulation_controller;
pub mod timer;
pub mod volume;
pub mod wgpu_utils;

pub use error::FluidError;

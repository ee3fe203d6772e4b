pub mod network;
pub mod renderer;

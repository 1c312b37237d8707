pub mod app;
pub mod call;
pub mod callrecord;
pub mod config;
pub mod drawing;
pub mod media;
pub mod simulator;
pub mod version;

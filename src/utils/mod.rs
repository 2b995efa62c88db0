pub mod group;
pub mod logging;

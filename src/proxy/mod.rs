pub mod forwarder;
pub mod path;

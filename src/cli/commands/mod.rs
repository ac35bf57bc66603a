pub mod server;
pub mod tenant;

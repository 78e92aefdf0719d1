pub mod local;
pub mod manager;

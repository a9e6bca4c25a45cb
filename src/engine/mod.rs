pub mod acceptance;
pub mod coordinator;
pub mod sweeper;

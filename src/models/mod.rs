pub mod actor;
pub mod location;
pub mod proposal;
pub mod ride;

pub mod actor;
pub mod booking;
pub mod events;
pub mod frames;
pub mod presence;

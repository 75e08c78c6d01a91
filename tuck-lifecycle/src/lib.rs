pub mod machine;
pub mod locks;
pub mod policy;
pub mod coordinator;
pub mod presence;

pub use machine::{transition, Step, Transition};
pub use locks::KeyedLocks;
pub use coordinator::{Applied, AssignOutcome, AssignmentCoordinator};
pub use presence::{PresenceChange, PresenceKeeper};

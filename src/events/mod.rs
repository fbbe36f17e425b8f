pub mod bus;
pub mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};

mod clock;
mod simulated_rail;

pub use clock::{Clock, ManualClock, SystemClock};
pub use simulated_rail::SimulatedRail;

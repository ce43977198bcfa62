mod interface;
mod state;
mod tick;

pub use interface::*;
pub use state::*;
pub use tick::*;

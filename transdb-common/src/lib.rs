mod error;
mod topology;
mod value;
pub mod wire;

pub use error::{ErrorResponse, Result, TransDbError, MAX_KEY_SIZE, MAX_VALUE_SIZE};
pub use topology::{Topology, TopologyError};
pub use value::{Cell, Record, Value, NEVER_EXPIRES};

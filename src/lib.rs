pub mod prelude {
    pub use super::common::prelude::*;
    pub use super::schedulers::prelude::*;
    pub use super::system::prelude::*;
    pub use super::utils::sched_error::SchedError;
}

pub mod common;
pub mod schedulers;
pub mod system;
pub mod utils;

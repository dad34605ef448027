mod attribute;
mod class;
mod constants;
mod version;

pub use attribute::*;
pub use class::*;
pub use constants::*;
pub use version::*;

pub mod aggregator;
pub mod judge;
pub mod matcher;
pub mod model;
pub mod pedal;
pub mod report;

pub use aggregator::*;
pub use judge::*;
pub use matcher::*;
pub use model::*;
pub use pedal::*;
pub use report::*;

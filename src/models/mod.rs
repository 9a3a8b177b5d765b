pub mod redline;
pub mod rule;
pub mod verdict;

pub use redline::*;
pub use rule::*;
pub use verdict::*;

pub mod fuzzy;
pub mod limiter;
pub mod similarity;
pub mod suggester;

pub use limiter::GroupLimiter;
pub use suggester::{SuggestSource, Suggester};

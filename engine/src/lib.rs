//! Transport-free core: the sliding price window and the trend estimator.

pub mod rolling_window;
pub mod trend;

pub use rolling_window::{PricePoint, SlidingWindow, WindowStore};
pub use trend::{Direction, TrendResult, compute_trend};

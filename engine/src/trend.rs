use std::fmt;

use crate::rolling_window::PricePoint;

/// Default slope threshold (price units per second) below which a trend is flat.
pub const DEFAULT_EPSILON: f64 = 0.00001;

/// Least-squares line fit over a window.
///
/// `slope` is in price units per second, `intercept` is the price at the
/// first point's timestamp.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TrendResult {
    pub slope: f64,
    pub intercept: f64,
}

impl TrendResult {
    /// Evaluates the fitted line `elapsed_secs` after the first point.
    pub fn price_at(&self, elapsed_secs: f64) -> f64 {
        self.slope * elapsed_secs + self.intercept
    }
}

/// Ordinary least squares of price against seconds since the first point.
///
/// Fewer than two points yield a flat line through the first price (or 0).
/// If every point shares one timestamp the regression is undefined; the
/// result is then a flat line through the mean price.
pub fn compute_trend(points: &[PricePoint]) -> TrendResult {
    let Some(first) = points.first() else {
        return TrendResult::default();
    };

    if points.len() < 2 {
        return TrendResult {
            slope: 0.0,
            intercept: first.price,
        };
    }

    let t0 = first.timestamp;
    let n = points.len() as f64;

    let (mut sum_x, mut sum_y, mut sum_xy, mut sum_xx) = (0.0, 0.0, 0.0, 0.0);
    for p in points {
        // Feed timestamps are unchecked; differencing in f64 cannot overflow.
        let x = (p.timestamp as f64 - t0 as f64) / 1000.0;
        let y = p.price;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_xx += x * x;
    }

    let denom = n * sum_xx - sum_x * sum_x;
    if denom == 0.0 {
        return TrendResult {
            slope: 0.0,
            intercept: sum_y / n,
        };
    }

    let slope = (n * sum_xy - sum_x * sum_y) / denom;
    let intercept = (sum_y - slope * sum_x) / n;

    TrendResult { slope, intercept }
}

/// Direction label derived from a slope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Flat,
}

impl Direction {
    pub fn classify(slope: f64, epsilon: f64) -> Self {
        if slope > epsilon {
            Direction::Up
        } else if slope < -epsilon {
            Direction::Down
        } else {
            Direction::Flat
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
            Direction::Flat => "FLAT",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

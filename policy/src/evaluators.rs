//! Per-symbol qualification checks for each alert flavor.
//!
//! All functions take bars oldest-first (the `BarSource` contract) and are
//! pure so each flavor's threshold logic can be tested without a store or a
//! network.

use market::types::Bar;
use signal::rolling_window::RollingWindow;

/// Spot price above the moving average of the last `window` closes.
///
/// Fewer than `window` bars means the series is too young to qualify.
pub fn spot_above_ma(spot: f64, bars: &[Bar], window: usize) -> bool {
    if window == 0 || bars.len() < window {
        return false;
    }

    let closes: Vec<f64> = bars[bars.len() - window..]
        .iter()
        .map(|bar| bar.close)
        .collect();

    let mut ma = RollingWindow::new(window);
    ma.seed(&closes);

    spot > ma.mean()
}

/// Latest closed bar's volume at least `multiple` times the mean volume of
/// the `window` bars preceding it. The spike bar itself is excluded from
/// the baseline.
pub fn volume_spike(bars: &[Bar], window: usize, multiple: f64) -> bool {
    if window == 0 || bars.len() < window + 1 {
        return false;
    }

    let last = &bars[bars.len() - 1];
    let baseline: Vec<f64> = bars[bars.len() - 1 - window..bars.len() - 1]
        .iter()
        .map(|bar| bar.volume)
        .collect();

    let mut volumes = RollingWindow::new(window);
    volumes.seed(&baseline);
    let mean = volumes.mean();

    mean > 0.0 && last.volume >= multiple * mean
}

/// Absolute percentage move over the latest closed bar.
pub fn price_change_breach(bars: &[Bar], min_change_pct: f64) -> bool {
    bars.last()
        .and_then(|bar| bar.change_pct())
        .map(|pct| pct.abs() >= min_change_pct)
        .unwrap_or(false)
}

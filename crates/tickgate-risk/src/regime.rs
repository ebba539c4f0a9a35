//! Market regime classification over a tick window.
//!
//! - volatility: standard deviation of tick-to-tick returns over the last 20 ticks
//! - trend: relative change between the averages of the two halves of the last 50 ticks
//! - volume ratio: latest volume over the mean of the last 20 volumes

use tickgate_core::{MarketRegime, MarketTick, Regime};

const VOLATILITY_WINDOW: usize = 20;
const TREND_WINDOW: usize = 50;

const HIGH_VOLATILITY: f64 = 0.02;
const LOW_VOLATILITY: f64 = 0.005;
const CALM_VOLATILITY: f64 = 0.01;
const STRONG_TREND: f64 = 0.01;
const WEAK_TREND: f64 = 0.005;
const VOLUME_SURGE: f64 = 1.5;

/// Stateless regime classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegimeAnalyzer;

impl RegimeAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Classify `ticks` (oldest first).
    ///
    /// Windows shorter than the volatility or trend window contribute zero
    /// for that measure, so short histories classify as QUIET.
    pub fn analyze<'a, I>(&self, ticks: I) -> MarketRegime
    where
        I: IntoIterator<Item = &'a MarketTick>,
    {
        let (prices, volumes): (Vec<f64>, Vec<f64>) = ticks
            .into_iter()
            .map(|t| (t.price.to_f64(), t.volume.to_f64()))
            .unzip();

        let volatility = volatility(&prices);
        let trend = trend(&prices);
        let volume = volume_ratio(&volumes);

        MarketRegime {
            regime: classify(volatility, trend),
            confidence: confidence(volatility, trend, volume),
            recommendations: recommendations(volatility, trend, volume),
        }
    }
}

fn classify(volatility: f64, trend: f64) -> Regime {
    if volatility > HIGH_VOLATILITY && trend.abs() > STRONG_TREND {
        Regime::Volatile
    } else if trend.abs() > WEAK_TREND {
        Regime::Trending
    } else if volatility < LOW_VOLATILITY {
        Regime::Quiet
    } else {
        Regime::Ranging
    }
}

fn confidence(volatility: f64, trend: f64, volume: f64) -> f64 {
    let mut confidence: f64 = 50.0;
    if volume > VOLUME_SURGE {
        confidence += 20.0;
    }
    if trend.abs() > STRONG_TREND {
        confidence += 15.0;
    }
    if volatility < CALM_VOLATILITY {
        confidence += 15.0;
    }
    confidence.min(100.0)
}

fn recommendations(volatility: f64, trend: f64, volume: f64) -> Vec<String> {
    let mut out = Vec::new();
    if volatility > HIGH_VOLATILITY {
        out.push("Reduce position sizes".to_string());
        out.push("Widen stop losses".to_string());
    }
    if trend.abs() > STRONG_TREND {
        out.push("Use trend-following strategies".to_string());
        if trend > 0.0 {
            out.push("Look for pullback entries".to_string());
        } else {
            out.push("Consider short positions".to_string());
        }
    }
    if volume > VOLUME_SURGE {
        out.push("Monitor for breakouts".to_string());
    }
    out
}

fn volatility(prices: &[f64]) -> f64 {
    if prices.len() < VOLATILITY_WINDOW {
        return 0.0;
    }
    let window = &prices[prices.len() - VOLATILITY_WINDOW..];
    // First return is defined as zero so the sample count stays at the window size.
    let returns: Vec<f64> = std::iter::once(0.0)
        .chain(window.windows(2).map(|w| {
            if w[0] == 0.0 {
                0.0
            } else {
                (w[1] - w[0]) / w[0]
            }
        }))
        .collect();

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

fn trend(prices: &[f64]) -> f64 {
    if prices.len() < TREND_WINDOW {
        return 0.0;
    }
    let window = &prices[prices.len() - TREND_WINDOW..];
    let (first, second) = window.split_at(TREND_WINDOW / 2);
    let first_avg = first.iter().sum::<f64>() / first.len() as f64;
    let second_avg = second.iter().sum::<f64>() / second.len() as f64;
    if first_avg == 0.0 {
        return 0.0;
    }
    (second_avg - first_avg) / first_avg
}

fn volume_ratio(volumes: &[f64]) -> f64 {
    let start = volumes.len().saturating_sub(VOLATILITY_WINDOW);
    let recent = &volumes[start..];
    let Some(&latest) = recent.last() else {
        return 1.0;
    };
    let avg = recent.iter().sum::<f64>() / recent.len() as f64;
    if avg <= 0.0 {
        return 1.0;
    }
    latest / avg
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use tickgate_core::{Price, Size, Symbol};

    fn ticks(prices: &[f64], volume: f64) -> Vec<MarketTick> {
        prices
            .iter()
            .enumerate()
            .map(|(i, p)| {
                MarketTick::new(
                    Symbol::new("BTCUSDT"),
                    Price::new(Decimal::try_from(*p).unwrap()),
                    Size::new(Decimal::try_from(volume).unwrap()),
                    i as i64,
                )
            })
            .collect()
    }

    #[test]
    fn test_flat_market_is_quiet() {
        let data = ticks(&[100.0; 60], 1.0);
        let regime = RegimeAnalyzer::new().analyze(&data);
        assert_eq!(regime.regime, Regime::Quiet);
        // base 50 + calm volatility 15
        assert_eq!(regime.confidence, 65.0);
        assert!(regime.recommendations.is_empty());
    }

    #[test]
    fn test_steady_rise_is_trending() {
        let prices: Vec<f64> = (0..60).map(|i| 100.0 + i as f64 * 0.1).collect();
        let regime = RegimeAnalyzer::new().analyze(&ticks(&prices, 1.0));
        assert_eq!(regime.regime, Regime::Trending);
        assert!(regime
            .recommendations
            .iter()
            .any(|r| r == "Look for pullback entries"));
    }

    #[test]
    fn test_choppy_trend_is_volatile() {
        // +/-5% swings on top of a strong downtrend.
        let prices: Vec<f64> = (0..60)
            .map(|i| {
                let base = 100.0 - i as f64 * 0.5;
                if i % 2 == 0 {
                    base * 1.05
                } else {
                    base * 0.95
                }
            })
            .collect();
        let regime = RegimeAnalyzer::new().analyze(&ticks(&prices, 1.0));
        assert_eq!(regime.regime, Regime::Volatile);
        assert!(regime
            .recommendations
            .iter()
            .any(|r| r == "Consider short positions"));
    }

    #[test]
    fn test_short_history_and_empty() {
        let analyzer = RegimeAnalyzer::new();
        assert_eq!(analyzer.analyze(&ticks(&[100.0, 101.0], 1.0)).regime, Regime::Quiet);
        let empty: Vec<MarketTick> = Vec::new();
        let regime = analyzer.analyze(&empty);
        assert_eq!(regime.regime, Regime::Quiet);
        assert!(regime.confidence <= 100.0);
    }

    #[test]
    fn test_volume_surge_adds_confidence() {
        let mut data = ticks(&[100.0; 30], 1.0);
        data.push(MarketTick::new(
            Symbol::new("BTCUSDT"),
            Price::new(Decimal::from(100)),
            Size::new(Decimal::from(10)),
            31,
        ));
        let regime = RegimeAnalyzer::new().analyze(&data);
        assert_eq!(regime.confidence, 85.0);
        assert!(regime.recommendations.iter().any(|r| r == "Monitor for breakouts"));
    }
}

//! Technical indicators computed from chart closes.
//!
//! Yahoo serves no indicator endpoint, so this adapter derives the values
//! locally from the same bars it would return for a series request.

/// Simple moving average over `period` closes. One output per full window.
pub fn sma(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period {
        return Vec::new();
    }
    closes
        .windows(period)
        .map(|w| w.iter().sum::<f64>() / period as f64)
        .collect()
}

/// Exponential moving average, seeded with the SMA of the first window.
pub fn ema(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period {
        return Vec::new();
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let seed = closes[..period].iter().sum::<f64>() / period as f64;

    let mut out = Vec::with_capacity(closes.len() - period + 1);
    out.push(seed);
    let mut prev = seed;
    for &close in &closes[period..] {
        prev = (close - prev) * alpha + prev;
        out.push(prev);
    }
    out
}

/// Wilder-smoothed RSI. One output per close after the initial window.
pub fn rsi(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() <= period {
        return Vec::new();
    }

    let mut gains = 0.0;
    let mut losses = 0.0;
    for w in closes[..=period].windows(2) {
        let delta = w[1] - w[0];
        if delta >= 0.0 {
            gains += delta;
        } else {
            losses -= delta;
        }
    }
    let mut avg_gain = gains / period as f64;
    let mut avg_loss = losses / period as f64;

    let mut out = Vec::with_capacity(closes.len() - period);
    out.push(rsi_value(avg_gain, avg_loss));

    for w in closes[period..].windows(2) {
        let delta = w[1] - w[0];
        let (gain, loss) = if delta >= 0.0 { (delta, 0.0) } else { (0.0, -delta) };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
        out.push(rsi_value(avg_gain, avg_loss));
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// MACD line (EMA-12 minus EMA-26). Headline series only.
pub fn macd(closes: &[f64]) -> Vec<f64> {
    const FAST: usize = 12;
    const SLOW: usize = 26;
    if closes.len() < SLOW {
        return Vec::new();
    }
    let fast = ema(closes, FAST);
    let slow = ema(closes, SLOW);
    // Both series end at the last close; align their tails
    let len = slow.len();
    let offset = fast.len() - len;
    fast[offset..]
        .iter()
        .zip(slow.iter())
        .map(|(f, s)| f - s)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma_window() {
        let closes = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(sma(&closes, 3), vec![2.0, 3.0, 4.0]);
        assert!(sma(&closes, 6).is_empty());
    }

    #[test]
    fn test_ema_seeded_with_sma() {
        let closes = [1.0, 2.0, 3.0, 4.0];
        let out = ema(&closes, 3);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], 2.0);
        // alpha = 0.5: (4 - 2) * 0.5 + 2
        assert_eq!(out[1], 3.0);
    }

    #[test]
    fn test_rsi_all_gains_is_100() {
        let closes: Vec<f64> = (1..=20).map(|i| i as f64).collect();
        let out = rsi(&closes, 14);
        assert!(!out.is_empty());
        assert!(out.iter().all(|&v| v == 100.0));
    }

    #[test]
    fn test_rsi_known_sequence() {
        // Alternating equal gains and losses settle near 50
        let mut closes = vec![100.0];
        for i in 0..30 {
            let last = *closes.last().unwrap();
            closes.push(if i % 2 == 0 { last + 1.0 } else { last - 1.0 });
        }
        let out = rsi(&closes, 14);
        let last = *out.last().unwrap();
        assert!((last - 50.0).abs() < 5.0, "rsi was {}", last);
    }

    #[test]
    fn test_macd_flat_series_is_zero() {
        let closes = vec![50.0; 40];
        let out = macd(&closes);
        assert!(!out.is_empty());
        assert!(out.iter().all(|&v| v.abs() < 1e-9));
    }
}

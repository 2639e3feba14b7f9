//! 指数退避

use rand::Rng;
use std::time::Duration;

/// 第 `attempt` 次失败后的等待时间 (从 1 开始)
///
/// `base * 2^(attempt-1)`, 上限为 `max`; `jitter` 开启时额外增加 0~10% 的随机量。
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration, jitter: bool) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);

    let exponential = 2u64.saturating_pow(attempt - 1);
    let capped = base_ms.saturating_mul(exponential).min(max_ms);

    let jitter_range = capped / 10;
    let extra = if jitter && jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped.saturating_add(extra))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_millis(100);
    const MAX: Duration = Duration::from_millis(1000);

    #[test]
    fn test_backoff_doubles_until_cap() {
        assert_eq!(calculate_backoff(0, BASE, MAX, false), Duration::ZERO);
        assert_eq!(calculate_backoff(1, BASE, MAX, false), Duration::from_millis(100));
        assert_eq!(calculate_backoff(2, BASE, MAX, false), Duration::from_millis(200));
        assert_eq!(calculate_backoff(4, BASE, MAX, false), Duration::from_millis(800));
        assert_eq!(calculate_backoff(5, BASE, MAX, false), MAX);
        assert_eq!(calculate_backoff(64, BASE, MAX, false), MAX);
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        for _ in 0..100 {
            let d = calculate_backoff(3, BASE, MAX, true);
            assert!(d >= Duration::from_millis(400));
            assert!(d < Duration::from_millis(440));
        }
    }

    #[test]
    fn test_extreme_delays_saturate() {
        let huge = Duration::from_millis(u64::MAX);
        for attempt in [1, 2, 40] {
            assert_eq!(calculate_backoff(attempt, huge, huge, true), huge);
        }
        assert_eq!(calculate_backoff(3, BASE, Duration::MAX, false), Duration::from_millis(400));
    }
}

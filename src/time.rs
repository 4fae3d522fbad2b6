//! Timestamps and call timing.

use log::info;
use std::future::Future;
use std::time::{Duration, Instant, UNIX_EPOCH};

use crate::runtime::Runtime;

/// Calls faster than this are not logged.
///
/// Cheap calls made in a tight loop can still add up unnoticed; time the
/// enclosing operation when that matters.
pub const TIMING_THRESHOLD: Duration = Duration::from_millis(10);

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn timestamp_millis<R: Runtime + ?Sized>(runtime: &R) -> u64 {
    runtime
        .now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// Awaits `future` and logs how long it took, if significant.
pub async fn time_api<F: Future>(name: &str, future: F) -> F::Output {
    let start = Instant::now();
    let output = future.await;
    log_timing(name, start.elapsed());
    output
}

/// Runs `f` and logs how long it took, if significant.
pub fn time_call<T>(name: &str, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let output = f();
    log_timing(name, start.elapsed());
    output
}

fn log_timing(name: &str, elapsed: Duration) -> bool {
    if elapsed < TIMING_THRESHOLD {
        return false;
    }

    info!(
        r#"TIMING - {{"method": "{}", "duration": {:.2}}}"#,
        name,
        elapsed.as_secs_f64()
    );
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use std::time::SystemTime;

    #[test]
    fn test_timestamp_millis() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_now()
            .times(1)
            .returning(|| UNIX_EPOCH + Duration::from_secs(100));

        assert_eq!(timestamp_millis(&runtime), 100 * 1_000);
    }

    #[test]
    fn test_timestamp_millis_before_epoch() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_now()
            .returning(|| UNIX_EPOCH - Duration::from_secs(1));

        assert_eq!(timestamp_millis(&runtime), 0);
    }

    #[test]
    fn test_timestamp_millis_real_clock() {
        let runtime = crate::runtime::RealRuntime;
        let expected = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;

        assert!(timestamp_millis(&runtime) >= expected);
    }

    #[test]
    fn test_log_timing_threshold() {
        assert!(!log_timing("fast_fn", Duration::from_millis(1)));
        assert!(log_timing("slow_fn", Duration::from_millis(10)));
        assert!(log_timing("slow_fn", Duration::from_secs(1)));
    }

    #[test_log::test]
    fn test_time_call_returns_result() {
        assert_eq!(time_call("fast_fn", || 1), 1);
        assert_eq!(
            time_call("slow_fn", || {
                std::thread::sleep(Duration::from_millis(15));
                "done"
            }),
            "done"
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_time_api_returns_result() {
        let value = time_api("slow_fn", async {
            tokio::time::sleep(Duration::from_millis(15)).await;
            42
        })
        .await;

        assert_eq!(value, 42);
    }
}

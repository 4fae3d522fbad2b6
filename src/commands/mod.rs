//! Subcommands of the `corekit` binary. Each writes its result to the given
//! writer so it can be exercised without a terminal.

use anyhow::{Context, Result};
use std::io::Write;

use crate::runtime::Runtime;
use crate::time::timestamp_millis;

mod config;
mod request;
mod stats;

pub use config::show_config;
pub use request::{RequestOptions, parse_header, parse_key_value, parse_method, request};
pub use stats::{parse_values, show_stats};

/// Prints the current Unix time in milliseconds.
pub fn timestamp<R: Runtime, W: Write>(runtime: R, out: &mut W) -> Result<()> {
    writeln!(out, "{}", timestamp_millis(&runtime)).context("Failed to write timestamp")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_timestamp() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_now()
            .returning(|| UNIX_EPOCH + Duration::from_millis(1_700_000_000_123));

        let mut out = Vec::new();
        timestamp(runtime, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "1700000000123\n");
    }
}

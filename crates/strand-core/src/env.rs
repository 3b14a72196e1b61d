//! Environment variable helpers
//!
//! Typed lookups with defaults, used by the runtime configuration and the
//! logging macros. Parse failures fall back to the default rather than
//! erroring; a typo in `STRAND_STACK_SIZE` should not stop a process.
//!
//! ```ignore
//! use strand_core::env::{env_get, env_get_bool, env_get_ms};
//!
//! let stack: usize = env_get("STRAND_STACK_SIZE", 256 * 1024);
//! let debug = env_get_bool("STRAND_DEBUG", false);
//! let delay = env_get_ms("STRAND_CONNECT_DELAY_MS", Duration::from_secs(1));
//! ```

use std::str::FromStr;
use std::time::Duration;

/// Get environment variable parsed as `T`, or return `default`
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Get environment variable as `Some(T)` if set and parseable
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Get environment variable as boolean
///
/// `1`, `true`, `yes`, `on` (any case) are true; `0`, `false`, `no`, `off`
/// are false; anything else, including unset, yields `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Get environment variable holding milliseconds as a `Duration`
#[inline]
pub fn env_get_ms(key: &str, default: Duration) -> Duration {
    env_get_opt::<u64>(key)
        .map(Duration::from_millis)
        .unwrap_or(default)
}

/// Get environment variable as string, or return default
#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Check if environment variable is set (regardless of value)
#[inline]
pub fn env_is_set(key: &str) -> bool {
    std::env::var_os(key).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test owns its variable names; the harness runs tests in parallel.

    #[test]
    fn test_env_get_default() {
        let val: usize = env_get("__STRAND_TEST_UNSET__", 42);
        assert_eq!(val, 42);
        assert!(env_get_opt::<usize>("__STRAND_TEST_UNSET__").is_none());
        assert_eq!(env_get_str("__STRAND_TEST_UNSET__", "hello"), "hello");
        assert!(!env_is_set("__STRAND_TEST_UNSET__"));
    }

    #[test]
    fn test_env_get_parses_trimmed() {
        std::env::set_var("__STRAND_TEST_NUM__", " 123 ");
        let val: usize = env_get("__STRAND_TEST_NUM__", 0);
        assert_eq!(val, 123);
        std::env::remove_var("__STRAND_TEST_NUM__");
    }

    #[test]
    fn test_env_get_invalid_parse() {
        std::env::set_var("__STRAND_TEST_BAD__", "not_a_number");
        let val: usize = env_get("__STRAND_TEST_BAD__", 99);
        assert_eq!(val, 99);
        std::env::remove_var("__STRAND_TEST_BAD__");
    }

    #[test]
    fn test_env_get_bool_variants() {
        let key = "__STRAND_TEST_BOOL__";
        for yes in ["1", "true", "TRUE", "yes", "on"] {
            std::env::set_var(key, yes);
            assert!(env_get_bool(key, false), "{yes} should be true");
        }
        for no in ["0", "false", "no", "OFF"] {
            std::env::set_var(key, no);
            assert!(!env_get_bool(key, true), "{no} should be false");
        }
        std::env::set_var(key, "garbage");
        assert!(env_get_bool(key, true));
        assert!(!env_get_bool(key, false));
        std::env::remove_var(key);
    }

    #[test]
    fn test_env_get_ms() {
        std::env::set_var("__STRAND_TEST_MS__", "250");
        assert_eq!(
            env_get_ms("__STRAND_TEST_MS__", Duration::ZERO),
            Duration::from_millis(250)
        );
        std::env::remove_var("__STRAND_TEST_MS__");
        assert_eq!(
            env_get_ms("__STRAND_TEST_MS__", Duration::from_secs(1)),
            Duration::from_secs(1)
        );
    }
}

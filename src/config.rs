use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;

use crate::broadcast::dispatcher::DEFAULT_CHECKPOINT_EVERY;
use crate::broadcast::rate_limit::RateLimiterConfig;

pub fn load_environment() -> Result<()> {
    match dotenv::dotenv() {
        Ok(path) => log::info!("Loaded environment from {:?}", path),
        Err(_) => log::info!("No .env file found, using process environment"),
    }
    Ok(())
}

fn env_parse<T>(name: &str, default: T) -> T
where
    T: FromStr + Display + Copy,
    T::Err: Display,
{
    match std::env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Invalid {} value '{}' ({}), using {}", name, raw, e, default);
                default
            }
        },
        Err(_) => default,
    }
}

/// Send-rate settings, overridable per deployment. Defaults are the Bot
/// API ceiling (25/s global) and 1 message per 3 s per recipient.
pub fn rate_limiter_config() -> RateLimiterConfig {
    let defaults = RateLimiterConfig::default();
    RateLimiterConfig {
        global_limit: env_parse("BROADCAST_GLOBAL_RATE", defaults.global_limit),
        global_window: Duration::from_millis(env_parse(
            "BROADCAST_GLOBAL_WINDOW_MS",
            defaults.global_window.as_millis() as u64,
        )),
        recipient_window: Duration::from_millis(env_parse(
            "BROADCAST_RECIPIENT_WINDOW_MS",
            defaults.recipient_window.as_millis() as u64,
        )),
        recipient_cache: env_parse("BROADCAST_RECIPIENT_CACHE", defaults.recipient_cache),
    }
}

/// How many attempts between progress checkpoints. Smaller values give
/// finer crash recovery at the cost of more store writes.
pub fn checkpoint_every() -> u32 {
    env_parse("BROADCAST_CHECKPOINT_EVERY", DEFAULT_CHECKPOINT_EVERY).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_rate_limiter_defaults() {
        unsafe {
            std::env::remove_var("BROADCAST_GLOBAL_RATE");
            std::env::remove_var("BROADCAST_GLOBAL_WINDOW_MS");
            std::env::remove_var("BROADCAST_RECIPIENT_WINDOW_MS");
            std::env::remove_var("BROADCAST_RECIPIENT_CACHE");
        }
        let config = rate_limiter_config();
        assert_eq!(config.global_limit, 25);
        assert_eq!(config.global_window, Duration::from_secs(1));
        assert_eq!(config.recipient_window, Duration::from_secs(3));
    }

    #[test]
    #[serial]
    fn test_rate_limiter_env_overrides() {
        unsafe {
            std::env::set_var("BROADCAST_GLOBAL_RATE", "10");
            std::env::set_var("BROADCAST_RECIPIENT_WINDOW_MS", "500");
        }
        let config = rate_limiter_config();
        assert_eq!(config.global_limit, 10);
        assert_eq!(config.recipient_window, Duration::from_millis(500));
        unsafe {
            std::env::remove_var("BROADCAST_GLOBAL_RATE");
            std::env::remove_var("BROADCAST_RECIPIENT_WINDOW_MS");
        }
    }

    #[test]
    #[serial]
    fn test_bad_env_value_falls_back() {
        unsafe {
            std::env::set_var("BROADCAST_CHECKPOINT_EVERY", "lots");
        }
        assert_eq!(checkpoint_every(), DEFAULT_CHECKPOINT_EVERY);
        unsafe {
            std::env::remove_var("BROADCAST_CHECKPOINT_EVERY");
        }
    }

    #[test]
    #[serial]
    fn test_checkpoint_every_is_at_least_one() {
        unsafe {
            std::env::set_var("BROADCAST_CHECKPOINT_EVERY", "0");
        }
        assert_eq!(checkpoint_every(), 1);
        unsafe {
            std::env::remove_var("BROADCAST_CHECKPOINT_EVERY");
        }
    }
}

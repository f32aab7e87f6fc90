use std::env;

use teloxide::prelude::*;

pub fn get_admin_ids() -> Vec<i64> {
    env::var("ADMIN_IDS")
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect()
}

/// Only ids listed in ADMIN_IDS may create or manage broadcasts.
pub async fn is_admin(msg: &Message) -> bool {
    // Check user ID instead of chat ID
    if let Some(user) = msg.from.as_ref() {
        get_admin_ids().contains(&(user.id.0 as i64))
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    // Helper mirroring get_admin_ids without touching the environment
    fn parse_admin_ids(admin_ids_str: &str) -> Vec<i64> {
        admin_ids_str
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect()
    }

    #[test]
    fn test_parse_admin_ids() {
        let admin_ids = parse_admin_ids("123456,789012, 345678");
        assert_eq!(admin_ids, vec![123456, 789012, 345678]);
    }

    #[test]
    fn test_parse_admin_ids_empty() {
        let admin_ids = parse_admin_ids("");
        assert_eq!(admin_ids, Vec::<i64>::new());
    }

    #[test]
    fn test_parse_admin_ids_with_spaces() {
        let admin_ids = parse_admin_ids(" 111111 , 222222 , 333333 ");
        assert_eq!(admin_ids, vec![111111, 222222, 333333]);
    }

    #[test]
    #[serial]
    fn test_get_admin_ids_reads_env() {
        unsafe {
            std::env::set_var("ADMIN_IDS", "42, 43");
        }
        assert_eq!(super::get_admin_ids(), vec![42, 43]);
        unsafe {
            std::env::remove_var("ADMIN_IDS");
        }
        assert!(super::get_admin_ids().is_empty());
    }
}

//! Timestamp utilities
//!
//! Stored timestamps are unix epoch milliseconds (INTEGER columns).

use chrono::Utc;

/// Current time as unix epoch milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_now_millis_is_recent() {
        let millis = now_millis();
        // Between 2000-01-01 and 2100-01-01
        assert!(millis > 946_684_800_000);
        assert!(millis < 4_102_444_800_000);
    }

    #[tokio::test]
    async fn test_now_millis_advances() {
        let t1 = now_millis();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let t2 = now_millis();
        assert!(t2 > t1);
    }
}

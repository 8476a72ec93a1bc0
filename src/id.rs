//! ID generation utilities for Tempora
//!
//! Provides functions for generating identifiers for catalysts, intuitions, plans and events.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn generate_prefixed_id(prefix: &str) -> String {
    let timestamp = now_ms();
    let random: u16 = rand::rng().random();
    format!("{}-{}-{:04x}", prefix, timestamp, random)
}

/// Generate a catalyst ID
///
/// Format: `cat-{timestamp_ms}-{random_hex}`
pub fn generate_catalyst_id() -> String {
    generate_prefixed_id("cat")
}

/// Generate an intuition ID
///
/// Format: `int-{timestamp_ms}-{random_hex}`
pub fn generate_intuition_id() -> String {
    generate_prefixed_id("int")
}

/// Generate a plan ID
///
/// Format: `plan-{timestamp_ms}-{random_hex}`
/// Example: `plan-1738300800123-a1b2`
pub fn generate_plan_id() -> String {
    generate_prefixed_id("plan")
}

/// Generate an action ID given its plan and position
///
/// Format: `{plan_suffix}-{index:02}`
/// Example: For plan "plan-1738300800123-a1b2" and index 2: "a1b2-02"
pub fn generate_action_id(plan_id: &str, index: usize) -> String {
    let plan_suffix = plan_id.split('-').next_back().unwrap_or(plan_id);
    format!("{}-{:02}", plan_suffix, index)
}

/// Generate an event ID
///
/// Format: `evt-{timestamp_ms}-{random_hex}`
pub fn generate_event_id() -> String {
    generate_prefixed_id("evt")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_returns_reasonable_timestamp() {
        let ts = now_ms();
        assert!(ts > 1577836800000); // 2020-01-01
        assert!(ts < 4102444800000); // 2100-01-01
    }

    #[test]
    fn test_generate_plan_id_format() {
        let id = generate_plan_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "plan");
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 4);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_plan_id_uniqueness() {
        let ids: std::collections::HashSet<String> = (0..16).map(|_| generate_plan_id()).collect();
        // 16 draws from a 16-bit space; a collision here would be extraordinary
        assert!(ids.len() >= 15);
    }

    #[test]
    fn test_generate_action_id_uses_plan_suffix() {
        assert_eq!(generate_action_id("plan-1738300800123-a1b2", 2), "a1b2-02");
        assert_eq!(generate_action_id("solo", 11), "solo-11");
    }

    #[test]
    fn test_prefixes() {
        assert!(generate_catalyst_id().starts_with("cat-"));
        assert!(generate_intuition_id().starts_with("int-"));
        assert!(generate_event_id().starts_with("evt-"));
    }
}

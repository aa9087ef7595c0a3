//! Rolling maximum of record timestamps.

use serde_json::Value;

/// Remembers the latest timestamp seen across successive windows of records.
///
/// Records are objects with a `timestamp` field, or bare timestamps. Numeric
/// strings are accepted. The value never decreases.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LatestTimestamp {
    latest: Option<u64>,
}

impl LatestTimestamp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<u64> {
        self.latest
    }

    /// Fold one window into the maximum and return it.
    pub fn observe(&mut self, records: &[Value]) -> Option<u64> {
        let window_max = records.iter().filter_map(timestamp_of).max();
        self.latest = match (self.latest, window_max) {
            (Some(latest), Some(seen)) => Some(latest.max(seen)),
            (latest, seen) => latest.or(seen),
        };
        self.latest
    }
}

fn timestamp_of(record: &Value) -> Option<u64> {
    let value = match record {
        Value::Object(fields) => fields.get("timestamp")?,
        other => other,
    };

    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_monotonic_across_windows() {
        let mut latest = LatestTimestamp::new();
        assert_eq!(latest.observe(&[json!({"timestamp": 5})]), Some(5));
        assert_eq!(latest.observe(&[json!({"timestamp": 3})]), Some(5));
        assert_eq!(latest.observe(&[json!({"timestamp": 9})]), Some(9));
    }

    #[test]
    fn test_empty_window_without_history() {
        let mut latest = LatestTimestamp::new();
        assert_eq!(latest.observe(&[]), None);
        assert_eq!(latest.observe(&[json!({"height": 1})]), None);
    }

    #[test]
    fn test_string_timestamps_are_coerced() {
        let mut latest = LatestTimestamp::new();
        let window = [json!({"timestamp": "1700000010"}), json!({"timestamp": 1700000005})];
        assert_eq!(latest.observe(&window), Some(1_700_000_010));
        assert_eq!(latest.observe(&[json!("1700000020")]), Some(1_700_000_020));
        assert_eq!(latest.observe(&[]), Some(1_700_000_020));
    }
}

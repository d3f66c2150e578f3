//! Synthetic track-ID generator: `YYYYMMDD-H-MM.NNN`, where `NNN` resets
//! each minute and is strictly increasing within the minute.

use chrono::{DateTime, Datelike, Timelike, Utc};

#[derive(Debug)]
pub struct IdGenerator {
    last_minute_key: Option<(i32, u32, u32, u32, u32)>,
    next_seq: u32,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            last_minute_key: None,
            next_seq: 0,
        }
    }

    pub fn next_id(&mut self, now: DateTime<Utc>) -> String {
        let key = (now.year(), now.month(), now.day(), now.hour(), now.minute());
        match self.last_minute_key {
            Some(prev) if prev == key => {
                self.next_seq += 1;
            }
            _ => {
                self.last_minute_key = Some(key);
                self.next_seq = 1;
            }
        }
        format!(
            "{:04}{:02}{:02}-{}-{:02}.{:03}",
            now.year(),
            now.month(),
            now.day(),
            now.hour(),
            now.minute(),
            self.next_seq
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn suffixes_strictly_increase_within_a_minute() {
        let mut gen = IdGenerator::new();
        let t = Utc.with_ymd_and_hms(2026, 7, 26, 14, 5, 0).unwrap();
        let a = gen.next_id(t);
        let b = gen.next_id(t + chrono::Duration::seconds(10));
        let c = gen.next_id(t + chrono::Duration::seconds(20));
        assert_eq!(a, "20260726-14-05.001");
        assert_eq!(b, "20260726-14-05.002");
        assert_eq!(c, "20260726-14-05.003");
    }

    #[test]
    fn different_minutes_differ_in_prefix() {
        let mut gen = IdGenerator::new();
        let t0 = Utc.with_ymd_and_hms(2026, 7, 26, 14, 5, 59).unwrap();
        let t1 = t0 + chrono::Duration::seconds(2);
        let a = gen.next_id(t0);
        let b = gen.next_id(t1);
        assert_ne!(a.split('.').next(), b.split('.').next());
        assert_eq!(b, "20260726-14-06.001");
    }

    #[test]
    fn resets_suffix_each_new_minute() {
        let mut gen = IdGenerator::new();
        let t0 = Utc.with_ymd_and_hms(2026, 7, 26, 14, 5, 0).unwrap();
        gen.next_id(t0);
        gen.next_id(t0);
        let t1 = t0 + chrono::Duration::minutes(1);
        let id = gen.next_id(t1);
        assert!(id.ends_with(".001"));
    }
}

use std::cmp::Ordering;

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

/// Format used for `release_time` on the wire and in the UI.
pub const RELEASE_TIME_FORMAT: &str = "%H:%M";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub enum ReleaseDay {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl ReleaseDay {
    pub const ALL: [ReleaseDay; 7] = [
        ReleaseDay::Monday,
        ReleaseDay::Tuesday,
        ReleaseDay::Wednesday,
        ReleaseDay::Thursday,
        ReleaseDay::Friday,
        ReleaseDay::Saturday,
        ReleaseDay::Sunday,
    ];

    /// Parse a day name, accepting full names and three-letter abbreviations
    /// in any case ("monday", "Mon", "MON").
    pub fn from_name(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL.into_iter().find(|day| {
            let name = day.name();
            name.eq_ignore_ascii_case(s) || (s.len() == 3 && name[..3].eq_ignore_ascii_case(s))
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ReleaseDay::Monday => "Monday",
            ReleaseDay::Tuesday => "Tuesday",
            ReleaseDay::Wednesday => "Wednesday",
            ReleaseDay::Thursday => "Thursday",
            ReleaseDay::Friday => "Friday",
            ReleaseDay::Saturday => "Saturday",
            ReleaseDay::Sunday => "Sunday",
        }
    }

    /// Position in the week, Monday = 0
    pub fn order(&self) -> u32 {
        self.weekday().num_days_from_monday()
    }

    pub fn weekday(&self) -> Weekday {
        match self {
            ReleaseDay::Monday => Weekday::Mon,
            ReleaseDay::Tuesday => Weekday::Tue,
            ReleaseDay::Wednesday => Weekday::Wed,
            ReleaseDay::Thursday => Weekday::Thu,
            ReleaseDay::Friday => Weekday::Fri,
            ReleaseDay::Saturday => Weekday::Sat,
            ReleaseDay::Sunday => Weekday::Sun,
        }
    }
}

impl From<Weekday> for ReleaseDay {
    fn from(day: Weekday) -> Self {
        match day {
            Weekday::Mon => ReleaseDay::Monday,
            Weekday::Tue => ReleaseDay::Tuesday,
            Weekday::Wed => ReleaseDay::Wednesday,
            Weekday::Thu => ReleaseDay::Thursday,
            Weekday::Fri => ReleaseDay::Friday,
            Weekday::Sat => ReleaseDay::Saturday,
            Weekday::Sun => ReleaseDay::Sunday,
        }
    }
}

impl std::fmt::Display for ReleaseDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A tracked catalog item. Identity is the (case-sensitive) title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct Entry {
    pub title: String,
    pub release_day: ReleaseDay,
    /// "HH:MM", 24-hour clock
    pub release_time: String,
    #[serde(default)]
    pub current_episodes: u32,
    #[serde(default)]
    pub total_episodes: u32,
    #[serde(default)]
    pub image_binary: Vec<u8>,
}

impl Entry {
    pub fn new(title: impl Into<String>, release_day: ReleaseDay, release_time: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            release_day,
            release_time: release_time.into(),
            current_episodes: 0,
            total_episodes: 0,
            image_binary: Vec::new(),
        }
    }

    pub fn with_episodes(mut self, current: u32, total: u32) -> Self {
        self.current_episodes = current;
        self.total_episodes = total;
        self
    }

    pub fn with_image(mut self, image_binary: Vec<u8>) -> Self {
        self.image_binary = image_binary;
        self
    }

    /// Parsed release time, or None if the stored string is not "HH:MM".
    pub fn release_time(&self) -> Option<NaiveTime> {
        parse_release_time(&self.release_time)
    }

    /// True once every announced episode has been watched.
    /// An unknown total (0) never counts as complete.
    pub fn is_complete(&self) -> bool {
        self.total_episodes > 0 && self.current_episodes >= self.total_episodes
    }

    pub fn progress_display(&self) -> String {
        if self.total_episodes == 0 {
            format!("{}/?", self.current_episodes)
        } else {
            format!("{}/{}", self.current_episodes, self.total_episodes)
        }
    }

    /// Weekly schedule ordering: day of week, then time of day.
    /// Unparseable times sort after valid ones on the same day.
    pub fn cmp_schedule(&self, other: &Entry) -> Ordering {
        self.release_day
            .order()
            .cmp(&other.release_day.order())
            .then_with(|| match (self.release_time(), other.release_time()) {
                (Some(a), Some(b)) => a.cmp(&b),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
            .then_with(|| self.title.cmp(&other.title))
    }
}

/// Parse a release time. Only the zero-padded "HH:MM" form is accepted;
/// chrono alone would also take "7:5".
pub fn parse_release_time(s: &str) -> Option<NaiveTime> {
    let b = s.as_bytes();
    let padded = b.len() == 5 && b[2] == b':' && [0, 1, 3, 4].iter().all(|&i| b[i].is_ascii_digit());
    if !padded {
        return None;
    }
    NaiveTime::parse_from_str(s, RELEASE_TIME_FORMAT).ok()
}

/// Sort entries by weekly release schedule.
pub fn sort_by_schedule(entries: &mut [Entry]) {
    entries.sort_by(|a, b| a.cmp_schedule(b));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_day_from_name() {
        assert_eq!(ReleaseDay::from_name("Monday"), Some(ReleaseDay::Monday));
        assert_eq!(ReleaseDay::from_name("sunday"), Some(ReleaseDay::Sunday));
        assert_eq!(ReleaseDay::from_name("WED"), Some(ReleaseDay::Wednesday));
        assert_eq!(ReleaseDay::from_name("Thurs"), None);
        assert_eq!(ReleaseDay::from_name(""), None);
    }

    #[test]
    fn test_release_day_weekday_round_trip() {
        for day in ReleaseDay::ALL {
            assert_eq!(ReleaseDay::from(day.weekday()), day);
        }
        assert_eq!(ReleaseDay::Monday.order(), 0);
        assert_eq!(ReleaseDay::Sunday.order(), 6);
    }

    #[test]
    fn test_entry_json_round_trip_preserves_zero_and_empty() {
        let entry = Entry::new("Frieren", ReleaseDay::Friday, "23:00").with_episodes(0, 0);
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"release_day\":\"Friday\""));
        assert!(json.contains("\"image_binary\":[]"));

        let back: Entry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
        assert_eq!(back.current_episodes, 0);
        assert!(back.image_binary.is_empty());
    }

    #[test]
    fn test_entry_json_round_trip_with_image() {
        let entry = Entry::new("Dungeon Meshi", ReleaseDay::Thursday, "09:30")
            .with_episodes(12, 24)
            .with_image(vec![0, 255, 17, 0]);
        let back: Entry = serde_json::from_value(serde_json::to_value(&entry).unwrap()).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_release_time_parsing() {
        assert!(parse_release_time("00:00").is_some());
        assert!(parse_release_time("23:59").is_some());
        assert!(parse_release_time("24:00").is_none());
        assert!(parse_release_time("7pm").is_none());
        assert_eq!(parse_release_time("07:05"), NaiveTime::from_hms_opt(7, 5, 0));
    }

    #[test]
    fn test_release_time_must_be_zero_padded() {
        for unpadded in ["7:5", "7:05", "07:5", " 7:05", "7:05 ", "+7:05", "07-05"] {
            assert!(parse_release_time(unpadded).is_none(), "{unpadded:?} accepted");
        }
    }

    #[test]
    fn test_is_complete_and_progress() {
        let e = Entry::new("a", ReleaseDay::Monday, "10:00");
        assert!(!e.is_complete());
        assert_eq!(e.progress_display(), "0/?");

        let e = e.with_episodes(12, 12);
        assert!(e.is_complete());
        assert_eq!(e.progress_display(), "12/12");
    }

    #[test]
    fn test_sort_by_schedule() {
        let mut entries = vec![
            Entry::new("late sunday", ReleaseDay::Sunday, "22:00"),
            Entry::new("tuesday", ReleaseDay::Tuesday, "12:00"),
            Entry::new("early sunday", ReleaseDay::Sunday, "08:15"),
            Entry::new("monday bad time", ReleaseDay::Monday, "noon"),
            Entry::new("monday", ReleaseDay::Monday, "18:00"),
        ];
        sort_by_schedule(&mut entries);
        let titles: Vec<_> = entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["monday", "monday bad time", "tuesday", "early sunday", "late sunday"]
        );
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Entry, ReleaseDay};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Add,
    Delete,
    UpdateCurrentEpisodes,
    UpdateTotalEpisodes,
    UpdateReleaseDay,
    UpdateReleaseTime,
}

impl OperationKind {
    /// Remote method name for this operation.
    pub fn method(&self) -> &'static str {
        match self {
            OperationKind::Add => "add",
            OperationKind::Delete => "delete",
            OperationKind::UpdateCurrentEpisodes => "update_current_episodes",
            OperationKind::UpdateTotalEpisodes => "update_total_episodes",
            OperationKind::UpdateReleaseDay => "update_release_day",
            OperationKind::UpdateReleaseTime => "update_release_time",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.method())
    }
}

/// A single change to the entry set.
///
/// Serializes as `{"method": ..., "data": ...}`, which is exactly the request
/// shape sent to the remote service. The change log stores the same value, so
/// a replayed change is byte-for-byte the call that would have been made live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "data", rename_all = "snake_case")]
pub enum Mutation {
    Add(Entry),
    Delete {
        title: String,
    },
    UpdateCurrentEpisodes {
        title: String,
        current_episodes: u32,
    },
    UpdateTotalEpisodes {
        title: String,
        total_episodes: u32,
    },
    UpdateReleaseDay {
        title: String,
        release_day: ReleaseDay,
    },
    UpdateReleaseTime {
        title: String,
        release_time: String,
    },
}

impl Mutation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Mutation::Add(_) => OperationKind::Add,
            Mutation::Delete { .. } => OperationKind::Delete,
            Mutation::UpdateCurrentEpisodes { .. } => OperationKind::UpdateCurrentEpisodes,
            Mutation::UpdateTotalEpisodes { .. } => OperationKind::UpdateTotalEpisodes,
            Mutation::UpdateReleaseDay { .. } => OperationKind::UpdateReleaseDay,
            Mutation::UpdateReleaseTime { .. } => OperationKind::UpdateReleaseTime,
        }
    }

    /// Title of the entry this mutation addresses.
    pub fn title(&self) -> &str {
        match self {
            Mutation::Add(entry) => &entry.title,
            Mutation::Delete { title }
            | Mutation::UpdateCurrentEpisodes { title, .. }
            | Mutation::UpdateTotalEpisodes { title, .. }
            | Mutation::UpdateReleaseDay { title, .. }
            | Mutation::UpdateReleaseTime { title, .. } => title,
        }
    }

    /// Apply this mutation to an in-memory entry set.
    ///
    /// Returns true only if the set changed: adding an existing title,
    /// deleting or updating a missing title, and updating a field to the
    /// value it already has are all no-ops.
    pub fn apply_to(&self, entries: &mut Vec<Entry>) -> bool {
        if let Mutation::Add(entry) = self {
            if entries.iter().any(|e| e.title == entry.title) {
                return false;
            }
            entries.push(entry.clone());
            return true;
        }
        if let Mutation::Delete { title } = self {
            let before = entries.len();
            entries.retain(|e| &e.title != title);
            return entries.len() != before;
        }

        let Some(entry) = entries.iter_mut().find(|e| e.title == self.title()) else {
            return false;
        };
        match self {
            Mutation::UpdateCurrentEpisodes { current_episodes, .. } => {
                replace(&mut entry.current_episodes, *current_episodes)
            }
            Mutation::UpdateTotalEpisodes { total_episodes, .. } => {
                replace(&mut entry.total_episodes, *total_episodes)
            }
            Mutation::UpdateReleaseDay { release_day, .. } => {
                replace(&mut entry.release_day, *release_day)
            }
            Mutation::UpdateReleaseTime { release_time, .. } => {
                replace(&mut entry.release_time, release_time.clone())
            }
            Mutation::Add(_) | Mutation::Delete { .. } => false,
        }
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

/// A mutation recorded while the remote service was unreachable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    /// Position in the log; strictly increasing in record order.
    pub seq: u64,
    pub recorded_at: DateTime<Utc>,
    pub mutation: Mutation,
}

impl ChangeLogEntry {
    pub fn new(seq: u64, mutation: Mutation) -> Self {
        Self {
            seq,
            recorded_at: Utc::now(),
            mutation,
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.mutation.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(title: &str) -> Entry {
        Entry::new(title, ReleaseDay::Monday, "12:00").with_episodes(1, 12)
    }

    #[test]
    fn test_mutation_wire_shape() {
        let value = serde_json::to_value(Mutation::UpdateCurrentEpisodes {
            title: "Mushishi".to_string(),
            current_episodes: 4,
        })
        .unwrap();
        assert_eq!(
            value,
            json!({
                "method": "update_current_episodes",
                "data": { "title": "Mushishi", "current_episodes": 4 }
            })
        );

        let value = serde_json::to_value(Mutation::Add(entry("Mushishi"))).unwrap();
        assert_eq!(value["method"], "add");
        assert_eq!(value["data"]["title"], "Mushishi");
        assert_eq!(value["data"]["release_day"], "Monday");
    }

    #[test]
    fn test_method_names_match_serialized_tags() {
        let mutations = vec![
            Mutation::Add(entry("a")),
            Mutation::Delete { title: "a".into() },
            Mutation::UpdateCurrentEpisodes { title: "a".into(), current_episodes: 1 },
            Mutation::UpdateTotalEpisodes { title: "a".into(), total_episodes: 1 },
            Mutation::UpdateReleaseDay { title: "a".into(), release_day: ReleaseDay::Friday },
            Mutation::UpdateReleaseTime { title: "a".into(), release_time: "10:00".into() },
        ];
        for mutation in mutations {
            let value = serde_json::to_value(&mutation).unwrap();
            assert_eq!(value["method"], mutation.kind().method());
        }
    }

    #[test]
    fn test_apply_add_is_idempotent_per_title() {
        let mut entries = Vec::new();
        assert!(Mutation::Add(entry("a")).apply_to(&mut entries));
        assert!(!Mutation::Add(entry("a")).apply_to(&mut entries));
        // Identity is case-sensitive
        assert!(Mutation::Add(entry("A")).apply_to(&mut entries));
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_apply_reports_unchanged_updates() {
        let mut entries = vec![entry("a")];
        let same = Mutation::UpdateCurrentEpisodes { title: "a".into(), current_episodes: 1 };
        assert!(!same.apply_to(&mut entries));

        let missing = Mutation::UpdateTotalEpisodes { title: "zzz".into(), total_episodes: 3 };
        assert!(!missing.apply_to(&mut entries));

        let change = Mutation::UpdateReleaseTime { title: "a".into(), release_time: "18:30".into() };
        assert!(change.apply_to(&mut entries));
        assert_eq!(entries[0].release_time, "18:30");
    }

    #[test]
    fn test_apply_delete() {
        let mut entries = vec![entry("a"), entry("b")];
        assert!(!Mutation::Delete { title: "c".into() }.apply_to(&mut entries));
        assert!(Mutation::Delete { title: "a".into() }.apply_to(&mut entries));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "b");
    }
}

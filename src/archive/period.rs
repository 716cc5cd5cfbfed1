//! Calendar grouping of snapshot keys.

use std::fmt;

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::snapshot::SnapshotKey;

/// Calendar boundary used to group snapshots for archival.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchivePeriod {
    #[default]
    Year,
    Month,
}

/// One calendar period's worth of snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupId {
    year: i32,
    month: Option<u32>,
}

impl GroupId {
    pub fn year(year: i32) -> Self {
        Self { year, month: None }
    }

    pub fn month(year: i32, month: u32) -> Self {
        Self {
            year,
            month: Some(month),
        }
    }

    /// Key prefix shared by every snapshot in the group with id `group`
    /// (`"2022"` or `"2022-03"`).
    pub fn prefix_for(group: &str) -> String {
        format!("{}-", group)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.month {
            Some(month) => write!(f, "{:04}-{:02}", self.year, month),
            None => write!(f, "{:04}", self.year),
        }
    }
}

impl ArchivePeriod {
    /// The group a snapshot belongs to.
    pub fn group_of(&self, key: &SnapshotKey) -> GroupId {
        match self {
            ArchivePeriod::Year => GroupId::year(key.year()),
            ArchivePeriod::Month => GroupId::month(key.year(), key.month()),
        }
    }

    /// Whether the whole period lies before `now`, so no more snapshots can land in it.
    pub fn is_closed(&self, group: &GroupId, now: NaiveDateTime) -> bool {
        let current = match self {
            ArchivePeriod::Year => GroupId::year(now.year()),
            ArchivePeriod::Month => GroupId::month(now.year(), now.month()),
        };
        *group < current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").unwrap()
    }

    fn key(s: &str) -> SnapshotKey {
        SnapshotKey::parse(s).unwrap()
    }

    #[test]
    fn test_group_of_year_and_month() {
        let k = key("2022-03-09-12-00-00.xml");
        assert_eq!(ArchivePeriod::Year.group_of(&k).to_string(), "2022");
        assert_eq!(ArchivePeriod::Month.group_of(&k).to_string(), "2022-03");
    }

    #[test]
    fn test_prefix_matches_member_keys() {
        let k = key("2022-03-09-12-00-00.xml");
        for period in [ArchivePeriod::Year, ArchivePeriod::Month] {
            let group = period.group_of(&k).to_string();
            assert!(k.to_string().starts_with(&GroupId::prefix_for(&group)));
        }
    }

    #[test]
    fn test_year_closed_only_after_it_ends() {
        let period = ArchivePeriod::Year;
        let now = at("2024-06-15T00:00:00");
        assert!(period.is_closed(&GroupId::year(2023), now));
        assert!(!period.is_closed(&GroupId::year(2024), now));

        // First second of a new year closes the previous one
        assert!(period.is_closed(&GroupId::year(2023), at("2024-01-01T00:00:00")));
        assert!(!period.is_closed(&GroupId::year(2023), at("2023-12-31T23:59:59")));
    }

    #[test]
    fn test_month_closed() {
        let period = ArchivePeriod::Month;
        let now = at("2024-01-10T00:00:00");
        assert!(period.is_closed(&GroupId::month(2023, 12), now));
        assert!(!period.is_closed(&GroupId::month(2024, 1), now));
    }
}

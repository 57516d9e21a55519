use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::models::ChatSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Recent,
    Oldest,
    Messages,
    Alphabetical,
}

impl SortKey {
    pub const ALL: [SortKey; 4] = [
        SortKey::Recent,
        SortKey::Oldest,
        SortKey::Messages,
        SortKey::Alphabetical,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SortKey::Recent => "Most Recent",
            SortKey::Oldest => "Oldest First",
            SortKey::Messages => "Most Messages",
            SortKey::Alphabetical => "Alphabetical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeFilter {
    #[default]
    All,
    Pinned,
    Today,
    Week,
    Month,
}

impl TimeFilter {
    pub const ALL: [TimeFilter; 5] = [
        TimeFilter::All,
        TimeFilter::Pinned,
        TimeFilter::Today,
        TimeFilter::Week,
        TimeFilter::Month,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TimeFilter::All => "All Chats",
            TimeFilter::Pinned => "Pinned",
            TimeFilter::Today => "Today",
            TimeFilter::Week => "This Week",
            TimeFilter::Month => "This Month",
        }
    }

    fn matches(&self, session: &ChatSession, now: DateTime<Utc>) -> bool {
        match self {
            TimeFilter::All => true,
            TimeFilter::Pinned => session.pinned,
            TimeFilter::Today => age_days(session, now) < 1.0,
            TimeFilter::Week => age_days(session, now) < 7.0,
            TimeFilter::Month => age_days(session, now) < 30.0,
        }
    }
}

/// Display buckets for the sidebar, in the order they are shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionGroup {
    Pinned,
    Today,
    Yesterday,
    ThisWeek,
    ThisMonth,
    Older,
}

impl SessionGroup {
    pub fn label(&self) -> &'static str {
        match self {
            SessionGroup::Pinned => "Pinned",
            SessionGroup::Today => "Today",
            SessionGroup::Yesterday => "Yesterday",
            SessionGroup::ThisWeek => "This Week",
            SessionGroup::ThisMonth => "This Month",
            SessionGroup::Older => "Older",
        }
    }
}

fn age_days(session: &ChatSession, now: DateTime<Utc>) -> f64 {
    (now - session.updated_at).num_milliseconds() as f64 / 86_400_000.0
}

/// Filters the catalog by search text and time/pin predicate, then sorts.
/// Pinned sessions always sort before unpinned ones, whatever the sort key.
pub fn filter_and_sort<'a>(
    sessions: &'a [ChatSession],
    search: &str,
    sort: SortKey,
    filter: TimeFilter,
    now: DateTime<Utc>,
) -> Vec<&'a ChatSession> {
    let needle = search.to_lowercase();

    let mut filtered: Vec<&ChatSession> = sessions
        .iter()
        .filter(|s| matches_search(s, &needle) && filter.matches(s, now))
        .collect();

    filtered.sort_by(|a, b| {
        b.pinned.cmp(&a.pinned).then_with(|| match sort {
            SortKey::Recent => b.updated_at.cmp(&a.updated_at),
            SortKey::Oldest => a.created_at.cmp(&b.created_at),
            SortKey::Messages => b.message_count.cmp(&a.message_count),
            SortKey::Alphabetical => compare_titles(&a.title, &b.title),
        })
    });

    filtered
}

fn matches_search(session: &ChatSession, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    session.title.to_lowercase().contains(needle)
        || session.preview.to_lowercase().contains(needle)
        || session
            .tags
            .iter()
            .any(|tag| tag.to_lowercase().contains(needle))
}

fn compare_titles(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

/// Buckets an already filtered-and-sorted list for display. A pinned session
/// lands only in the Pinned bucket regardless of its age. Empty buckets are
/// omitted.
pub fn group_sessions<'a>(
    sessions: &[&'a ChatSession],
    now: DateTime<Utc>,
) -> Vec<(SessionGroup, Vec<&'a ChatSession>)> {
    let mut pinned = Vec::new();
    let mut today = Vec::new();
    let mut yesterday = Vec::new();
    let mut this_week = Vec::new();
    let mut this_month = Vec::new();
    let mut older = Vec::new();

    for session in sessions {
        if session.pinned {
            pinned.push(*session);
            continue;
        }
        let age = age_days(session, now);
        if age < 1.0 {
            today.push(*session);
        } else if age < 2.0 {
            yesterday.push(*session);
        } else if age < 7.0 {
            this_week.push(*session);
        } else if age < 30.0 {
            this_month.push(*session);
        } else {
            older.push(*session);
        }
    }

    [
        (SessionGroup::Pinned, pinned),
        (SessionGroup::Today, today),
        (SessionGroup::Yesterday, yesterday),
        (SessionGroup::ThisWeek, this_week),
        (SessionGroup::ThisMonth, this_month),
        (SessionGroup::Older, older),
    ]
    .into_iter()
    .filter(|(_, bucket)| !bucket.is_empty())
    .collect()
}

/// Truncate text to a short title for new sessions.
pub fn truncate_title(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or(text);
    if first_line.len() > 50 {
        let boundary = first_line
            .char_indices()
            .take_while(|(i, _)| *i < 47)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(47);
        format!("{}...", &first_line[..boundary])
    } else {
        first_line.to_string()
    }
}

/// Compact "5m ago" style timestamp for sidebar rows.
pub fn relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = now - at;
    let mins = diff.num_minutes();
    let hours = diff.num_hours();
    let days = diff.num_days();

    if mins < 1 {
        "Just now".to_string()
    } else if mins < 60 {
        format!("{mins}m ago")
    } else if hours < 24 {
        format!("{hours}h ago")
    } else if days < 7 {
        format!("{days}d ago")
    } else {
        at.format("%Y-%m-%d").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(id: &str, title: &str, pinned: bool, age_hours: i64, count: i64) -> ChatSession {
        let now = Utc::now();
        ChatSession {
            id: id.to_string(),
            title: title.to_string(),
            preview: format!("preview of {title}"),
            created_at: now - Duration::hours(age_hours),
            updated_at: now - Duration::hours(age_hours),
            message_count: count,
            pinned,
            tags: Vec::new(),
        }
    }

    fn ids(list: &[&ChatSession]) -> Vec<String> {
        list.iter().map(|s| s.id.clone()).collect()
    }

    #[test]
    fn pinned_sorts_first_regardless_of_recency() {
        // An old pinned session must outrank a fresh unpinned one.
        let sessions = vec![
            session("1", "Trip", false, 24, 3),
            session("2", "Work", true, 240, 3),
        ];
        let sorted = filter_and_sort(&sessions, "", SortKey::Recent, TimeFilter::All, Utc::now());
        assert_eq!(ids(&sorted), ["2", "1"]);
    }

    #[test]
    fn pinned_first_holds_for_every_sort_key() {
        let sessions = vec![
            session("a", "Aardvark", false, 1, 99),
            session("z", "Zebra", true, 500, 0),
        ];
        for sort in SortKey::ALL {
            let sorted = filter_and_sort(&sessions, "", sort, TimeFilter::All, Utc::now());
            assert_eq!(sorted[0].id, "z", "failed for {sort:?}");
        }
    }

    #[test]
    fn sort_keys_order_within_pin_bucket() {
        let sessions = vec![
            session("old", "Beta", false, 100, 5),
            session("new", "Alpha", false, 1, 2),
        ];
        let now = Utc::now();

        let recent = filter_and_sort(&sessions, "", SortKey::Recent, TimeFilter::All, now);
        assert_eq!(ids(&recent), ["new", "old"]);

        let oldest = filter_and_sort(&sessions, "", SortKey::Oldest, TimeFilter::All, now);
        assert_eq!(ids(&oldest), ["old", "new"]);

        let messages = filter_and_sort(&sessions, "", SortKey::Messages, TimeFilter::All, now);
        assert_eq!(ids(&messages), ["old", "new"]);

        let alpha = filter_and_sort(&sessions, "", SortKey::Alphabetical, TimeFilter::All, now);
        assert_eq!(ids(&alpha), ["new", "old"]);
    }

    #[test]
    fn search_is_case_insensitive_over_title_preview_and_tags() {
        let mut tagged = session("t", "Untitled", false, 1, 0);
        tagged.tags = vec!["Travel".to_string()];
        let sessions = vec![
            session("1", "Groceries", false, 1, 0),
            session("2", "Weekend TRIP plan", false, 1, 0),
            tagged,
        ];
        let now = Utc::now();

        let by_title = filter_and_sort(&sessions, "trip", SortKey::Recent, TimeFilter::All, now);
        assert_eq!(ids(&by_title), ["2"]);

        let by_tag = filter_and_sort(&sessions, "travel", SortKey::Recent, TimeFilter::All, now);
        assert_eq!(ids(&by_tag), ["t"]);

        let by_preview =
            filter_and_sort(&sessions, "PREVIEW OF GROC", SortKey::Recent, TimeFilter::All, now);
        assert_eq!(ids(&by_preview), ["1"]);
    }

    #[test]
    fn time_filters_cut_by_updated_age() {
        let sessions = vec![
            session("today", "A", false, 2, 0),
            session("week", "B", false, 3 * 24, 0),
            session("month", "C", false, 10 * 24, 0),
            session("ancient", "D", false, 60 * 24, 0),
        ];
        let now = Utc::now();

        let today = filter_and_sort(&sessions, "", SortKey::Recent, TimeFilter::Today, now);
        assert_eq!(ids(&today), ["today"]);

        let week = filter_and_sort(&sessions, "", SortKey::Recent, TimeFilter::Week, now);
        assert_eq!(ids(&week), ["today", "week"]);

        let month = filter_and_sort(&sessions, "", SortKey::Recent, TimeFilter::Month, now);
        assert_eq!(ids(&month), ["today", "week", "month"]);

        let all = filter_and_sort(&sessions, "", SortKey::Recent, TimeFilter::All, now);
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn pinned_filter_ignores_age() {
        let sessions = vec![
            session("p", "Pinned old", true, 90 * 24, 0),
            session("u", "Fresh", false, 1, 0),
        ];
        let pinned =
            filter_and_sort(&sessions, "", SortKey::Recent, TimeFilter::Pinned, Utc::now());
        assert_eq!(ids(&pinned), ["p"]);
    }

    #[test]
    fn grouping_buckets_by_age_with_pinned_separate() {
        let sessions = vec![
            session("pin", "P", true, 3 * 24, 0),
            session("today", "T", false, 1, 0),
            session("yday", "Y", false, 30, 0),
            session("week", "W", false, 4 * 24, 0),
            session("month", "M", false, 14 * 24, 0),
            session("older", "O", false, 45 * 24, 0),
        ];
        let now = Utc::now();
        let refs: Vec<&ChatSession> = sessions.iter().collect();
        let groups = group_sessions(&refs, now);

        let labels: Vec<&str> = groups.iter().map(|(g, _)| g.label()).collect();
        assert_eq!(
            labels,
            ["Pinned", "Today", "Yesterday", "This Week", "This Month", "Older"]
        );

        // A pinned session three days old must not also appear in This Week.
        let (_, this_week) = &groups[3];
        assert_eq!(ids(this_week), ["week"]);
        let (_, pinned) = &groups[0];
        assert_eq!(ids(pinned), ["pin"]);
    }

    #[test]
    fn empty_groups_are_omitted() {
        let sessions = vec![session("1", "Only", false, 1, 0)];
        let refs: Vec<&ChatSession> = sessions.iter().collect();
        let groups = group_sessions(&refs, Utc::now());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].0, SessionGroup::Today);
    }

    #[test]
    fn titles_truncate_at_word_safe_boundary() {
        assert_eq!(truncate_title("Short title"), "Short title");
        assert_eq!(truncate_title("First line\nsecond line"), "First line");

        let long = "a".repeat(60);
        let truncated = truncate_title(&long);
        assert_eq!(truncated.len(), 50);
        assert!(truncated.ends_with("..."));

        // Multi-byte content must not split inside a character.
        let unicode = "é".repeat(40);
        let t = truncate_title(&unicode);
        assert!(t.ends_with("..."));
        assert!(t.is_char_boundary(t.len() - 3));
    }

    #[test]
    fn relative_times_step_through_units() {
        let now = Utc::now();
        assert_eq!(relative_time(now, now), "Just now");
        assert_eq!(relative_time(now - Duration::minutes(5), now), "5m ago");
        assert_eq!(relative_time(now - Duration::hours(3), now), "3h ago");
        assert_eq!(relative_time(now - Duration::days(2), now), "2d ago");
        let old = now - Duration::days(30);
        assert_eq!(relative_time(old, now), old.format("%Y-%m-%d").to_string());
    }
}

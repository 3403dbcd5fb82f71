use rand::Rng;
use regex::Regex;

use crate::selection::NewsItem;

/// A labeled clock-hour range in which a notification may plausibly land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start_hour: u32,
    /// Exclusive upper bound
    pub end_hour: u32,
    pub label: &'static str,
}

/// The four fixed delivery windows. Hours are wall-clock in the audience's
/// timezone; the job only formats the time, it never waits for it.
pub const TIME_WINDOWS: [TimeWindow; 4] = [
    TimeWindow { start_hour: 8, end_hour: 9, label: "Morning" },
    TimeWindow { start_hour: 12, end_hour: 13, label: "Lunch" },
    TimeWindow { start_hour: 16, end_hour: 17, label: "Afternoon" },
    TimeWindow { start_hour: 19, end_hour: 20, label: "Evening" },
];

const TEASER_CHARS: usize = 100;
const CTA_SUFFIX: &str = "... Tap to read more! 📖";

/// A composed notification: what to say and when to say it.
/// Created, logged, optionally delivered, then discarded; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationDraft {
    pub title: String,
    pub body: String,
    pub scheduled_hour: u32,
    pub scheduled_minute: u32,
}

impl NotificationDraft {
    /// Zero-padded "HH:MM", always exactly five characters.
    pub fn scheduled_time(&self) -> String {
        format!("{:02}:{:02}", self.scheduled_hour, self.scheduled_minute)
    }
}

/// Builds notification drafts from selected posts.
pub struct Composer {
    tag_re: Regex,
}

impl Composer {
    pub fn new() -> Self {
        Self {
            // Pattern is a compile-time constant, so this cannot fail at runtime
            tag_re: Regex::new(r"<[^>]+>").expect("valid markup pattern"),
        }
    }

    /// Compose a draft with a randomly chosen window and clock time:
    /// one of the four windows, an hour inside it, a minute in [0,60).
    pub fn compose<R: Rng + ?Sized>(&self, item: &NewsItem, rng: &mut R) -> NotificationDraft {
        let window = &TIME_WINDOWS[rng.gen_range(0..TIME_WINDOWS.len())];
        let hour = rng.gen_range(window.start_hour..window.end_hour);
        let minute = rng.gen_range(0..60);
        self.compose_at(item, window, hour, minute)
    }

    /// Compose a draft for a specific window and clock time. Split out from
    /// `compose` so the formatting rules can be pinned down without an RNG.
    pub fn compose_at(
        &self,
        item: &NewsItem,
        window: &TimeWindow,
        hour: u32,
        minute: u32,
    ) -> NotificationDraft {
        debug_assert!(window.start_hour <= hour && hour < window.end_hour);
        debug_assert!(minute < 60);

        // Truncate first, then strip: a tag split at the 100-char boundary
        // loses its closing '>' and the remainder is left as plain text.
        let teaser: String = item.description.chars().take(TEASER_CHARS).collect();
        let teaser = self.tag_re.replace_all(&teaser, "");

        NotificationDraft {
            title: format!("{} update: {}", window.label, item.title),
            body: format!("{}{}", teaser, CTA_SUFFIX),
            scheduled_hour: hour,
            scheduled_minute: minute,
        }
    }
}

impl Default for Composer {
    fn default() -> Self {
        Self::new()
    }
}

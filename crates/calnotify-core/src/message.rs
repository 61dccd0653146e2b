//! Reminder and status message rendering.
//!
//! Messages are rendered as Slack `mrkdwn`: links are written as
//! `<url|label>` and `<!here>` mentions everyone present in the channel.

use chrono::{DateTime, Utc};

use crate::event::ReminderBatch;

/// Status text posted to the admin channel when the bot starts.
pub const INITIALIZING_TEXT: &str = "Initializing Bot";

/// Status text posted to the admin channel once a credential is available.
pub const AUTHORIZED_TEXT: &str = "Successfully authorized with Google Calendar";

const HERE_MENTION: &str = "<!here> ";

/// A rendered reminder: a header line followed by one line per event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderMessage {
    /// Header line, also used as the plain-text fallback.
    pub header: String,
    /// One line per linkable event.
    pub lines: Vec<String>,
}

impl ReminderMessage {
    /// Renders a reminder for a batch of co-scheduled events.
    ///
    /// Events lacking either a display link or a title are counted in the
    /// header but get no line of their own.
    pub fn render(batch: &ReminderBatch, emphasize: bool, now: DateTime<Utc>) -> Self {
        let mut header = String::new();
        if emphasize {
            header.push_str(HERE_MENTION);
        }

        let subject = if batch.events.len() == 1 {
            "event is"
        } else {
            "events are"
        };
        let minutes = minutes_until(batch.start_time, now);
        let when = if minutes < 1 {
            "now".to_string()
        } else {
            format!("in {} mins", minutes)
        };
        header.push_str(&format!("The following {} starting {}:", subject, when));

        let lines = batch
            .events
            .iter()
            .filter_map(|event| {
                let link = event.display_link.as_deref()?;
                let title = event.title.as_deref()?;
                let mut line = format!(":calendar: <{}|{}>", link, title);
                if let Some(join) = event.join_link.as_deref() {
                    line.push_str(&format!(" - <{}|*Join Meeting*>", join));
                }
                Some(line)
            })
            .collect();

        Self { header, lines }
    }
}

/// Renders the prompt asking an operator to complete the authorization flow.
pub fn authorization_prompt(authorization_url: &str) -> String {
    format!(
        "{}I need someone to log in to google to authorize access to calendar, \
         please <{}|Click here to authorize>.",
        HERE_MENTION, authorization_url
    )
}

/// Whole minutes from `now` until `start`, rounding half a minute up.
fn minutes_until(start: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (start - now).num_milliseconds();
    (millis as f64 / 60_000.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::CalendarEvent;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 9, 45, 0).unwrap()
    }

    fn batch(offset: Duration, events: Vec<CalendarEvent>) -> ReminderBatch {
        ReminderBatch {
            channel: "eng".to_string(),
            start_time: now() + offset,
            events,
        }
    }

    fn linked(id: &str, title: &str) -> CalendarEvent {
        CalendarEvent::new(id, now() + Duration::minutes(15))
            .with_title(title)
            .with_display_link(format!("https://calendar.google.com/event?eid={}", id))
    }

    #[test]
    fn single_event_in_minutes() {
        let msg = ReminderMessage::render(
            &batch(Duration::minutes(15), vec![linked("a", "Standup")]),
            false,
            now(),
        );
        insta::assert_snapshot!(msg.header, @"The following event is starting in 15 mins:");
        insta::assert_snapshot!(
            msg.lines.join("\n"),
            @":calendar: <https://calendar.google.com/event?eid=a|Standup>"
        );
    }

    #[test]
    fn several_events_starting_now_with_mention() {
        let events = vec![
            linked("a", "Standup").with_join_link("https://meet.google.com/abc-defg-hij"),
            linked("b", "Retro"),
        ];
        let msg = ReminderMessage::render(&batch(Duration::seconds(10), events), true, now());

        insta::assert_snapshot!(msg.header, @"<!here> The following events are starting now:");
        assert_eq!(msg.lines.len(), 2);
        assert_eq!(
            msg.lines[0],
            ":calendar: <https://calendar.google.com/event?eid=a|Standup> \
             - <https://meet.google.com/abc-defg-hij|*Join Meeting*>"
        );
    }

    #[test]
    fn events_without_link_or_title_get_no_line() {
        let events = vec![
            CalendarEvent::new("a", now()).with_title("No link"),
            CalendarEvent::new("b", now()).with_display_link("https://example.com"),
        ];
        let msg = ReminderMessage::render(&batch(Duration::minutes(5), events), false, now());

        assert!(msg.header.contains("events are starting in 5 mins"));
        assert!(msg.lines.is_empty());
    }

    #[test]
    fn minutes_round_half_up() {
        assert_eq!(minutes_until(now() + Duration::seconds(89), now()), 1);
        assert_eq!(minutes_until(now() + Duration::seconds(90), now()), 2);
        assert_eq!(minutes_until(now() + Duration::seconds(29), now()), 0);
        assert_eq!(minutes_until(now() - Duration::minutes(2), now()), -2);
    }

    #[test]
    fn prompt_links_authorization_url() {
        let prompt = authorization_prompt("https://accounts.google.com/o/oauth2/v2/auth?state=x");
        insta::assert_snapshot!(
            prompt,
            @"<!here> I need someone to log in to google to authorize access to calendar, please <https://accounts.google.com/o/oauth2/v2/auth?state=x|Click here to authorize>."
        );
    }
}

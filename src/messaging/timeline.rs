// Date separators for the rendered thread
// One forward pass over render order; only adjacent pairs are compared, the
// sequence is never re-sorted.

use chrono::{Local, NaiveDate, TimeZone};

use crate::models::Message;

#[derive(Debug, Clone, PartialEq)]
pub enum TimelineEntry<'a> {
    DateSeparator(NaiveDate),
    Message(&'a Message),
}

fn day_of<Tz: TimeZone>(message: &Message, tz: &Tz) -> NaiveDate {
    message.created_at.with_timezone(tz).date_naive()
}

/// Indices of the messages that get a separator placed immediately before them
pub fn date_separators<Tz: TimeZone>(messages: &[Message], tz: &Tz) -> Vec<usize> {
    let mut indices = Vec::new();
    let mut previous: Option<NaiveDate> = None;
    for (idx, message) in messages.iter().enumerate() {
        let day = day_of(message, tz);
        if previous != Some(day) {
            indices.push(idx);
        }
        previous = Some(day);
    }
    indices
}

pub fn build_timeline<'a, Tz: TimeZone>(messages: &'a [Message], tz: &Tz) -> Vec<TimelineEntry<'a>> {
    let separators = date_separators(messages, tz);
    let mut entries = Vec::with_capacity(messages.len() + separators.len());
    let mut next_separator = separators.into_iter().peekable();
    for (idx, message) in messages.iter().enumerate() {
        if next_separator.next_if_eq(&idx).is_some() {
            entries.push(TimelineEntry::DateSeparator(day_of(message, tz)));
        }
        entries.push(TimelineEntry::Message(message));
    }
    entries
}

/// Timeline in the viewer's local time zone
pub fn local_timeline(messages: &[Message]) -> Vec<TimelineEntry<'_>> {
    build_timeline(messages, &Local)
}

pub fn day_label(day: NaiveDate, today: NaiveDate) -> String {
    if day == today {
        "Today".to_string()
    } else if today.pred_opt() == Some(day) {
        "Yesterday".to_string()
    } else {
        day.format("%B %-d, %Y").to_string()
    }
}

use chrono::{DateTime, TimeZone};

const FORMAT: &str = "%H:%M - %A %-d %b";

/// `20:55 - Thursday 13 Mar`
pub fn format_time<Tz: TimeZone>(time: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    time.format(FORMAT).to_string()
}

pub fn now() -> String {
    format_time(&chrono::Local::now())
}

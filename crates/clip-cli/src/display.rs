use chrono::{Local, TimeZone};
use clip_proto::protocol::Clip;

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

/// "0 B", "512 B", "1.5 KB", "2.25 GB".  Base 1024, at most two decimals.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    let text = format!("{:.2}", rounded);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", text, UNITS[unit])
}

/// Age of a clip relative to `now_ms`.  Older than a day shows the local
/// date instead.
pub fn format_age(modified_ms: i64, now_ms: i64) -> String {
    let diff = now_ms - modified_ms;
    if diff < MINUTE_MS {
        "just now".to_string()
    } else if diff < HOUR_MS {
        format!("{} min ago", diff / MINUTE_MS)
    } else if diff < DAY_MS {
        format!("{} h ago", diff / HOUR_MS)
    } else {
        match Local.timestamp_millis_opt(modified_ms).single() {
            Some(date) => date.format("%d/%m %H:%M").to_string(),
            None => "?".to_string(),
        }
    }
}

/// Table of clips, newest first, the newest one marked.
pub fn render_clips(clips: &[Clip], now_ms: i64) -> String {
    if clips.is_empty() {
        return "No video clips in this folder.\n".to_string();
    }
    let width = clips.iter().map(|c| c.name.len()).max().unwrap_or(0);
    let mut out = format!("{} clip(s)\n", clips.len());
    for (idx, clip) in clips.iter().enumerate() {
        let marker = if idx == 0 { '*' } else { ' ' };
        out.push_str(&format!(
            "{} {:>3}  {:<width$}  {:>4}  {:>10}  {}\n",
            marker,
            idx + 1,
            clip.name,
            clip.format_label(),
            format_size(clip.size),
            format_age(clip.modified, now_ms),
            width = width,
        ));
    }
    out
}

pub fn print_clips(clips: &[Clip]) {
    print!("{}", render_clips(clips, Local::now().timestamp_millis()));
}

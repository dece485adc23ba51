//! Display helpers for timestamps and avatars.

use time::{OffsetDateTime, macros::format_description};

const MONTHS: [&str; 12] = ["Jan", "Feb", "Mar", "Apr", "Mei", "Jun", "Jul", "Agt", "Sep", "Okt", "Nov", "Des"];

const AVATAR_COLORS: [&str; 8] = [
    "bg-red-500",
    "bg-blue-500",
    "bg-green-500",
    "bg-yellow-500",
    "bg-purple-500",
    "bg-pink-500",
    "bg-indigo-500",
    "bg-teal-500",
];

/// `HH:mm`
pub fn format_time(ts: OffsetDateTime) -> String {
    ts.format(format_description!("[hour]:[minute]")).unwrap_or_default()
}

/// `dd MMM yyyy HH:mm`, with Indonesian month abbreviations.
pub fn format_date_time(ts: OffsetDateTime) -> String {
    format!(
        "{:02} {} {} {}",
        ts.day(),
        MONTHS[usize::from(u8::from(ts.month())) - 1],
        ts.year(),
        format_time(ts),
    )
}

/// How long ago `ts` was, in Indonesian. Anything under a minute, including
/// timestamps slightly in the future, is "baru saja".
pub fn format_relative_time(ts: OffsetDateTime, now: OffsetDateTime) -> String {
    let seconds = (now - ts).whole_seconds();
    if seconds < 60 {
        return "baru saja".to_owned();
    }
    format!("{} yang lalu", distance(seconds))
}

fn distance(seconds: i64) -> String {
    let minutes = (seconds as f64 / 60.0).round() as i64;

    if minutes < 45 {
        return format!("{minutes} menit");
    }
    if minutes < 90 {
        return "sekitar 1 jam".to_owned();
    }
    if minutes < 60 * 24 {
        let hours = (minutes as f64 / 60.0).round() as i64;
        return format!("sekitar {hours} jam");
    }
    if minutes < 60 * 42 {
        return "1 hari".to_owned();
    }
    if minutes < 60 * 24 * 30 {
        let days = (minutes as f64 / 1440.0).round() as i64;
        return format!("{days} hari");
    }
    if minutes < 60 * 24 * 60 {
        let months = (minutes as f64 / 43200.0).round() as i64;
        return format!("sekitar {months} bulan");
    }

    let months = minutes / 43200;
    if months < 12 {
        return format!("{months} bulan");
    }
    let years = months / 12;
    match months % 12 {
        0..3 => format!("sekitar {years} tahun"),
        3..9 => format!("lebih dari {years} tahun"),
        _ => format!("hampir {} tahun", years + 1),
    }
}

/// Up to two uppercase letters: first and last word initials, or the first
/// two characters of a single word.
pub fn initials(name: &str) -> String {
    let parts: Vec<&str> = name.split_whitespace().collect();
    match parts.as_slice() {
        [] => "?".to_owned(),
        [only] => only.chars().take(2).collect::<String>().to_uppercase(),
        [first, .., last] => first
            .chars()
            .take(1)
            .chain(last.chars().take(1))
            .collect::<String>()
            .to_uppercase(),
    }
}

/// Picks a stable colour class from the username's string hash.
pub fn avatar_color(username: &str) -> &'static str {
    let mut hash: i64 = 0;
    for unit in username.encode_utf16() {
        let shifted = i64::from((hash as i32).wrapping_shl(5));
        hash = i64::from(unit) + shifted - hash;
    }
    AVATAR_COLORS[(hash.unsigned_abs() % AVATAR_COLORS.len() as u64) as usize]
}

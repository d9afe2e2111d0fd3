use std::cmp::Ordering;
use std::sync::OnceLock;
use std::time::Duration;
use regex::Regex;

/// Human-friendly ordering: digit runs compare by numeric value, so
/// `page2` sorts before `page10`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a = a.chars().peekable();
    let mut b = b.chars().peekable();

    loop {
        match (a.peek().copied(), b.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let left = take_digits(&mut a);
                let right = take_digits(&mut b);
                let left_trimmed = left.trim_start_matches('0');
                let right_trimmed = right.trim_start_matches('0');
                let ord = left_trimmed
                    .len()
                    .cmp(&right_trimmed.len())
                    .then_with(|| left_trimmed.cmp(right_trimmed))
                    .then_with(|| left.len().cmp(&right.len()));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                a.next();
                b.next();
            }
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        digits.push(c);
        chars.next();
    }
    digits
}

/// Normalises attribute names: `Type`, `type`, `page-type` and `page_type`
/// become `type`, `type`, `pageType`, `pageType`.
pub fn to_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '-' || c == '_' || c == ' ' || c == '.' {
            upper_next = !out.is_empty();
            continue;
        }
        if out.is_empty() {
            out.extend(c.to_lowercase());
        } else if upper_next {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        upper_next = false;
    }
    out
}

fn duration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d+(?:\.\d+)?)(ns|us|µs|ms|s|m|h)").expect("valid duration pattern")
    })
}

/// Parses Go-style durations such as `90s`, `1h30m` or `1.5h`.
pub fn parse_duration(text: &str) -> Option<Duration> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let re = duration_regex();
    let mut consumed = 0;
    let mut total = 0f64;
    for cap in re.captures_iter(text) {
        let whole = cap.get(0)?;
        if whole.start() != consumed {
            return None;
        }
        consumed = whole.end();
        let amount: f64 = cap[1].parse().ok()?;
        let seconds = match &cap[2] {
            "ns" => amount / 1e9,
            "us" | "µs" => amount / 1e6,
            "ms" => amount / 1e3,
            "s" => amount,
            "m" => amount * 60.0,
            "h" => amount * 3600.0,
            _ => return None,
        };
        total += seconds;
    }
    if consumed != text.len() || !total.is_finite() {
        return None;
    }
    Duration::try_from_secs_f64(total).ok()
}

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    let nanos = d.subsec_nanos();
    let mut out = String::new();
    if h > 0 {
        out.push_str(&format!("{}h", h));
    }
    if m > 0 {
        out.push_str(&format!("{}m", m));
    }
    if nanos > 0 {
        let frac = format!("{:.9}", nanos as f64 / 1e9);
        out.push_str(&format!("{}{}s", s, frac.trim_start_matches('0').trim_end_matches('0')));
    } else if s > 0 || out.is_empty() {
        out.push_str(&format!("{}s", s));
    }
    out
}

/// Clamped result window: an offset past the end gives an empty tail and
/// `Some(0)` gives nothing at all.
pub fn window<T>(items: Vec<T>, offset: usize, limit: Option<usize>) -> Vec<T> {
    if limit == Some(0) {
        return Vec::new();
    }
    items
        .into_iter()
        .skip(offset)
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

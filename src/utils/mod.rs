use anyhow::{Result, bail};
use std::time::{Duration, Instant};
use tracing::info;

/// A simple wall-clock timer for logging elapsed time.
pub struct Timer {
    label: String,
    start: Instant,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        let label = label.into();
        info!("⏱  Starting: {}", label);
        Self {
            label,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        info!("⏱  Finished: {} (took {:.2?})", self.label, self.elapsed());
    }
}

/// Format a count with thousands separators.
pub fn fmt_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, ch) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(ch);
    }
    result.chars().rev().collect()
}

/// "2025" → [2025] | "2011-2026" → [2011, ..., 2026]
pub fn parse_years(spec: &str) -> Result<Vec<i32>> {
    let spec = spec.trim();
    match spec.split_once('-') {
        Some((from, to)) => {
            let from: i32 = from.trim().parse()?;
            let to: i32 = to.trim().parse()?;
            if from > to {
                bail!("year range {} runs backwards", spec);
            }
            Ok((from..=to).collect())
        }
        None => Ok(vec![spec.parse()?]),
    }
}

/// URL-safe subject slug: "Arts & Humanities" → "arts-and-humanities"
pub fn slugify(s: &str) -> String {
    s.replace('&', " and ")
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

use colored::Colorize;
use std::time::Duration;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print a step indicator
pub fn step(num: usize, total: usize, msg: &str) {
    println!("{} {}", format!("[{}/{}]", num, total).blue().bold(), msg);
}

// ============================================================================
// Banners
// ============================================================================

const BANNER_WIDTH: usize = 80;

/// Three-line `#` banner with `msg` centered on the middle line
pub fn banner_lines(msg: &str) -> [String; 3] {
    let border = "#".repeat(BANNER_WIDTH);
    let len = msg.chars().count();
    let middle = if len + 2 >= BANNER_WIDTH {
        msg.to_string()
    } else {
        let padded = format!(" {msg} ");
        let total = BANNER_WIDTH - padded.chars().count();
        let left = total / 2;
        format!("{}{}{}", "#".repeat(left), padded, "#".repeat(total - left))
    };
    [border.clone(), middle, border]
}

/// Print a banner around diagnostic output
pub fn banner(msg: &str) {
    for line in banner_lines(msg) {
        println!("{}", line.bold());
    }
}

/// Format a duration for timing output
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs >= 60.0 {
        let whole = duration.as_secs();
        format!("{}m{:02}s", whole / 60, whole % 60)
    } else {
        format!("{secs:.2}s")
    }
}

// ============================================================================
// Tests
// ============================================================================

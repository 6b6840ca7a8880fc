use colored::Colorize;
use converge::{AttrValue, AttributeDiff, DiffSummary, RemoteRecord};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
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

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Object rendering
// ============================================================================

/// Single-line display form of a value, truncated for terminals.
pub fn display_value(value: &AttrValue, max_len: usize) -> String {
    let text = match value {
        AttrValue::List(items) => format!("[{}]", items.join(", ")),
        other => other.to_text(),
    };
    let flat = text.replace('\n', "\\n");
    truncate(&flat, max_len)
}

fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let kept: String = text.chars().take(max_len - 3).collect();
        format!("{kept}...")
    }
}

/// Print an object's attributes, cleared ones last.
pub fn record(object_type: &str, name: &str, record: &RemoteRecord) {
    header(&format!("{object_type} {name}"));
    for (key, value) in &record.values {
        kv(key, &display_value(value, 100));
    }
    for key in &record.cleared {
        kv(key, &"(unset)".dimmed().to_string());
    }
}

/// Print attribute diffs and a summary line.
pub fn diffs(diffs: &[AttributeDiff]) {
    for diff in diffs {
        let remote = diff
            .remote
            .as_ref()
            .map_or_else(|| "(unset)".to_string(), |v| display_value(v, 60));
        let desired = diff
            .desired
            .as_ref()
            .map_or_else(|| "(unset)".to_string(), |v| display_value(v, 60));
        let marker = if diff.is_addition() {
            "+".green()
        } else if diff.is_removal() {
            "-".red()
        } else {
            "~".yellow()
        };
        println!("  {marker} {}: {} → {}", diff.attribute, remote.dimmed(), desired);
    }

    let summary = DiffSummary::from_diffs(diffs);
    if summary.has_changes() {
        println!();
        println!(
            "  {} to add, {} to change, {} to clear",
            summary.additions, summary.modifications, summary.removals
        );
    }
}

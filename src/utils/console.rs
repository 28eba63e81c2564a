// src/utils/console.rs

//! Console output for interactive runs.
//!
//! Provides consistent, timestamped progress lines for the CLI. Library
//! diagnostics go through the `log` facade instead.

use std::io::Write;

use chrono::Local;

/// Log a success message
pub fn success(message: &str) {
    println!("[{}] [INFO] ✓ {}", Local::now().format("%Y-%m-%d %H:%M:%S"), message);
}

/// Log a step in a process
pub fn step(step_num: usize, total: usize, message: &str) {
    println!(
        "[{}] [STEP {}/{}] {}",
        Local::now().format("%H:%M:%S"),
        step_num,
        total,
        message
    );
}

/// Redraw a single progress line in place.
pub fn progress(message: &str) {
    print!("\r[{}] [PROG] {}", Local::now().format("%H:%M:%S"), message);
    let _ = std::io::stdout().flush();
}

/// Terminate a line started by [`progress`].
pub fn end_progress() {
    println!();
}

/// Log a header
pub fn header(title: &str) {
    println!();
    println!("{}", "═".repeat(60));
    println!("  {}", title);
    println!("{}", "═".repeat(60));
}

/// Log a summary section
pub fn summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("[{}] [SUMMARY] {}", Local::now().format("%H:%M:%S"), title);
    for (key, value) in items {
        println!("    {}: {}", key, value);
    }
}

/// Text progress bar, e.g. `[#####-----] 50%`.
pub fn bar(percent: u8, width: usize) -> String {
    let percent = percent.min(100) as usize;
    let filled = percent * width / 100;
    format!(
        "[{}{}] {:>3}%",
        "#".repeat(filled),
        "-".repeat(width - filled),
        percent
    )
}

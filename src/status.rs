//! Terminal status reporting for the drivers.
//!
//! A single carriage-return-rewritten status line on stderr tracks long
//! ingestion phases, plus colored `[WARN]`/`[FATAL]` prefixes for user-facing
//! messages. Everything degrades to plain lines when stderr is not a
//! terminal, and the status line disappears entirely under `--quiet`.

use std::collections::BTreeSet;
use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};

static QUIET: AtomicBool = AtomicBool::new(false);

const RESET: &str = "\x1b[0m";
const RED: &str = "\x1b[91m";
const YELLOW: &str = "\x1b[93m";
const UNDERLINE: &str = "\x1b[4m";

pub fn set_quiet(quiet: bool) {
    QUIET.store(quiet, Ordering::Relaxed);
}

fn quiet() -> bool {
    QUIET.load(Ordering::Relaxed)
}

fn tty() -> bool {
    std::io::stderr().is_terminal()
}

/// Blank the status line.
pub fn clear() {
    if quiet() || !tty() {
        return;
    }
    eprint!("\r{:width$}\r", "", width = 72);
}

/// Replace the status line with `message`.
pub fn update(message: &str) {
    if quiet() {
        return;
    }
    if tty() {
        clear();
        eprint!("{message}");
    } else {
        eprintln!("{message}");
    }
}

pub fn warn(message: &str) {
    clear();
    if tty() {
        eprintln!("{YELLOW}[WARN]{RESET} {message}");
    } else {
        eprintln!("[WARN] {message}");
    }
}

pub fn fatal(message: &str) {
    clear();
    if tty() {
        eprintln!("{RED}[FATAL]{RESET} {message}");
    } else {
        eprintln!("[FATAL] {message}");
    }
}

pub fn underline(message: &str) {
    clear();
    if tty() {
        eprintln!("{UNDERLINE}{message}{RESET}");
    } else {
        eprintln!("{message}");
    }
}

/// Print an identifier set indented and wrapped at eighty columns.
pub fn dump_set(ids: &BTreeSet<String>) {
    let mut col = 0usize;
    eprint!("\n    ");
    for id in ids {
        if col + id.len() + 4 > 80 {
            col = 0;
            eprint!("\n    {id} ");
        } else {
            eprint!("{id} ");
        }
        col += id.len() + 4;
    }
    eprintln!("\n");
}

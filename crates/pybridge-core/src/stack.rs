//! Host call stacks as traceback frames.

use std::backtrace::{Backtrace, BacktraceStatus};

use crate::exception::TracebackFrame;

/// Upper bound on host frames kept from one capture.
const MAX_FRAMES: usize = 64;

/// Symbols belonging to the capture itself, dropped from the top of a stack.
const CAPTURE_SYMBOLS: &[&str] = &["backtrace", "HostError::", "HostError as "];

/// Frames of a captured stack, oldest first.
///
/// Frames from the capture machinery and the `HostError` constructors are
/// dropped, and at most `MAX_FRAMES` of the newest frames are kept.
pub(crate) fn frames(backtrace: &Backtrace) -> Vec<TracebackFrame> {
    if backtrace.status() != BacktraceStatus::Captured {
        return Vec::new();
    }
    parse(&backtrace.to_string())
}

fn parse(text: &str) -> Vec<TracebackFrame> {
    let mut newest_first: Vec<TracebackFrame> = Vec::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(location) = line.strip_prefix("at ") {
            if let Some(frame) = newest_first.last_mut() {
                locate(frame, location);
            }
            continue;
        }
        if line.starts_with("note:") {
            continue;
        }
        let symbol = match line.split_once(": ") {
            Some((index, symbol)) if index.bytes().all(|b| b.is_ascii_digit()) => symbol,
            _ => line,
        };
        newest_first.push(TracebackFrame::new("<unknown>", 0, symbol));
    }

    let internal = newest_first
        .iter()
        .take_while(|f| CAPTURE_SYMBOLS.iter().any(|s| f.function.contains(s)))
        .count();
    let mut frames: Vec<_> = newest_first
        .into_iter()
        .skip(internal)
        .take(MAX_FRAMES)
        .collect();
    frames.reverse();
    frames
}

/// Apply a `file:line:column` location.
fn locate(frame: &mut TracebackFrame, location: &str) {
    let mut parts = location.rsplitn(3, ':');
    let (Some(_column), Some(line), Some(file)) = (parts.next(), parts.next(), parts.next())
    else {
        frame.file = location.to_string();
        return;
    };
    frame.file = file.to_string();
    frame.line = line.parse().unwrap_or_default();
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "   0: std::backtrace_rs::backtrace::libunwind::trace
             at /rustc/library/std/src/../../backtrace/src/backtrace/libunwind.rs:117:9
   1: std::backtrace::Backtrace::force_capture
             at /rustc/library/std/src/backtrace.rs:312:9
   2: pybridge_core::exception::HostError::new
             at ./src/exception.rs:340:20
   3: app::parse_digit
             at ./src/app.rs:12:17
      app::parse
             at ./src/app.rs:30:5
   4: main
";

    #[test]
    fn test_capture_frames_are_dropped_and_order_is_oldest_first() {
        let frames = parse(SAMPLE);
        let names: Vec<_> = frames.iter().map(|f| f.function.as_str()).collect();
        assert_eq!(names, ["main", "app::parse", "app::parse_digit"]);
        assert_eq!(frames[2].file, "./src/app.rs");
        assert_eq!(frames[2].line, 12);
        assert_eq!(frames[0].file, "<unknown>");
        assert_eq!(frames[0].line, 0);
    }

    #[test]
    fn test_live_capture_skips_capture_frames() {
        let captured = frames(&Backtrace::force_capture());
        assert!(captured.len() <= MAX_FRAMES);
        assert!(captured
            .iter()
            .all(|f| !f.function.contains("force_capture")));
    }
}

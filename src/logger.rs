//! Console log macros. Every line carries a colored level tag and the UTC wall-clock time.

#[doc(hidden)]
#[macro_export]
macro_rules! __console_line {
    ($style:literal, $tag:literal, $($arg:tt)*) => {
        println!(
            concat!("\x1b[", $style, "m", $tag, "[{}]\x1b[0m {}"),
            chrono::Utc::now().format("%H:%M:%S"),
            format!($($arg)*)
        )
    };
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => { $crate::__console_line!("32", "[INFO] ", $($arg)*) };
}

/// Subsystem output relayed by the log funnel.
#[macro_export]
macro_rules! log {
    ($($arg:tt)*) => { $crate::__console_line!("33", "[LOG]  ", $($arg)*) };
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => { $crate::__console_line!("35", "[WARN] ", $($arg)*) };
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => { $crate::__console_line!("31", "[ERROR]", $($arg)*) };
}

/// Unrecoverable startup failure: prints like the other levels, then panics.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {
        panic!("\x1b[1;31m[FATAL][{}]\x1b[0m {}", chrono::Utc::now().format("%H:%M:%S"), format!($($arg)*))
    };
}

/// Progress of a running mission phase choreography.
#[macro_export]
macro_rules! phase {
    ($($arg:tt)*) => { $crate::__console_line!("1;34", "[PHASE]", $($arg)*) };
}

/// Per-message protocol chatter, only printed when `LOG_VECTOR_EVENTS` is set.
#[macro_export]
macro_rules! event {
    ($($arg:tt)*) => {
        if std::env::var("LOG_VECTOR_EVENTS").is_ok() {
            $crate::__console_line!("36", "[EVENT]", $($arg)*)
        }
    };
}

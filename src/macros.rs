//! Crate-local macros.

macro_rules! with_debug_logging {
    ($message:expr $(,$arg:expr)*; $expression:expr) => {{
        log::debug!(concat!("Begin: ", $message)$(,$arg)*);
        let _result = $expression;
        log::debug!(concat!("Done: ", $message)$(,$arg)*);
        _result
    }};
}

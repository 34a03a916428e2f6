//! The `utils` module provides the pieces shared by every layer of `zmqpipe`:
//! the error types each layer returns and the tracing setup used by the binary
//! and the tests.

pub mod error;
pub mod logging;

#[cfg(test)]
mod tests {
    use super::logging;

    #[test]
    fn logging_init_accepts_levels() {
        // Should not panic
        logging::init("info");
        logging::init("debug");
        logging::init("warn");
        logging::init("nonsense");
    }

    #[test]
    fn verbose_flag_selects_debug() {
        assert_eq!(logging::level_for(true, "warn"), "debug");
        assert_eq!(logging::level_for(false, "warn"), "warn");
    }
}

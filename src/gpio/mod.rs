//! GPIO output control.
//!
//! One digital output line (the LED pin) owned by a [`PinController`].

pub mod controller;
pub mod line;

pub use controller::{PinController, PinState};
pub use line::{LineProbe, MemoryLine, OutputLine};

#[cfg(feature = "gpio")]
pub use line::RppalLine;

/// Parse an HTTP state segment (`on` / `off`) into a line level.
pub fn parse_level(state: &str) -> Option<bool> {
    match state {
        "on" => Some(true),
        "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("on"), Some(true));
        assert_eq!(parse_level("off"), Some(false));
        assert_eq!(parse_level("ON"), None);
        assert_eq!(parse_level("invalid"), None);
    }
}

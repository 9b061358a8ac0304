//! Desktop implementations of the input, capture and buzzer seams
//!
//! Only built with the `desktop` feature, since `enigo` and `xcap` need the
//! platform's windowing and input libraries.

mod input;
mod window;

use std::io::Write;
use std::thread;
use std::time::Duration;

pub use input::{parse_key, EnigoInjector};
pub use window::XcapWindow;

use crate::input::{Beeper, InputError};

/// Rings the terminal bell. The frequency cannot be honored and is only logged.
#[derive(Debug, Default)]
pub struct TerminalBell;

impl Beeper for TerminalBell {
    fn beep(&mut self, frequency: u32, duration: Duration) -> Result<(), InputError> {
        log::info!("Buzzer {} Hz for {:?}", frequency, duration);
        let mut stdout = std::io::stdout();
        stdout
            .write_all(b"\x07")
            .and_then(|_| stdout.flush())
            .map_err(|e| InputError::Injection(e.to_string()))?;
        thread::sleep(duration);
        Ok(())
    }
}

//! Newline-delimited text sessions over a serial port.
//!
//! A session opens the port, optionally waits for the device to settle,
//! optionally sends a trigger, then feeds every complete line to a parser.
//! Lines the parser rejects are logged and skipped; the first accepted line
//! ends the session. The port is dropped on every exit path.

use super::DriverError;
use crate::domain::Reading;
use crate::hal::HardwareProvider;
use regex::Regex;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Splits a byte stream into trimmed, non-empty text lines
#[derive(Debug, Default)]
pub struct LineAssembler {
    pending: Vec<u8>,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends bytes and returns every line completed by them
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &b in bytes {
            if b == b'\n' {
                let line = String::from_utf8_lossy(&self.pending).trim().to_string();
                self.pending.clear();
                if !line.is_empty() {
                    lines.push(line);
                }
            } else {
                self.pending.push(b);
            }
        }
        lines
    }
}

/// Where and how long to listen
#[derive(Debug, Clone)]
pub struct LineSession {
    pub port: String,
    pub baud_rate: u32,
    pub timeout: Duration,
    /// wait after opening before listening (boards that reset on open)
    pub settle: Duration,
    /// bytes written once the port is ready, e.g. a read request
    pub trigger: Option<Vec<u8>>,
}

impl LineSession {
    pub fn new(port: String, baud_rate: u32, timeout: Duration) -> Self {
        Self {
            port,
            baud_rate,
            timeout,
            settle: Duration::ZERO,
            trigger: None,
        }
    }

    /// Blocking: listens until `parse` accepts a line or the timeout elapses.
    /// The settle delay counts against the timeout.
    pub fn run<F>(&self, hal: &dyn HardwareProvider, tag: &str, mut parse: F) -> Result<Reading, DriverError>
    where
        F: FnMut(&str) -> Option<Reading>,
    {
        let started = Instant::now();
        let mut link = hal
            .open_serial(&self.port, self.baud_rate)
            .map_err(DriverError::Port)?;

        if !self.settle.is_zero() {
            std::thread::sleep(self.settle.min(self.timeout));
        }
        link.discard_input().map_err(DriverError::Port)?;

        if let Some(trigger) = &self.trigger {
            link.write(trigger).map_err(DriverError::Port)?;
        }

        let mut lines = LineAssembler::new();
        let mut chunk = [0u8; 256];
        while started.elapsed() < self.timeout {
            let n = link.read(&mut chunk).map_err(DriverError::Port)?;
            if n == 0 {
                continue;
            }
            for line in lines.push(&chunk[..n]) {
                tracing::debug!("[{}] raw line {:?}", tag, line);
                match parse(&line) {
                    Some(reading) => return Ok(reading),
                    None => tracing::debug!("[{}] ignoring line {:?}", tag, line),
                }
            }
        }
        Err(DriverError::Timeout(self.timeout))
    }
}

fn float_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[-+]?\d+(?:\.\d+)?").expect("static float pattern"))
}

/// First floating-point number found anywhere in `line`
pub fn first_float(line: &str) -> Option<f64> {
    float_pattern()
        .find(line)
        .and_then(|m| m.as_str().parse().ok())
}

/// Turns the named groups of a match into reading fields. Numeric captures
/// become numbers, everything else is kept as text.
pub fn captures_to_reading(re: &Regex, line: &str) -> Option<Reading> {
    let caps = re.captures(line)?;
    let mut reading = Reading::new();
    for name in re.capture_names().flatten() {
        if let Some(m) = caps.name(name) {
            match m.as_str().trim().parse::<f64>() {
                Ok(v) => reading.insert_number(name, v),
                Err(_) => reading.insert(name, m.as_str().into()),
            }
        }
    }
    if reading.is_empty() {
        None
    } else {
        Some(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assembler_splits_and_buffers() {
        let mut a = LineAssembler::new();
        assert!(a.push(b"12.5\r").is_empty());
        assert_eq!(a.push(b"\n\n13"), vec!["12.5".to_string()]);
        assert_eq!(a.push(b".0\n"), vec!["13.0".to_string()]);
    }

    #[test]
    fn test_first_float() {
        assert_eq!(first_float("dist: 123.4 cm"), Some(123.4));
        assert_eq!(first_float("T=-3.5C"), Some(-3.5));
        assert_eq!(first_float("42"), Some(42.0));
        assert_eq!(first_float("no digits"), None);
    }

    #[test]
    fn test_captures_to_reading() {
        let re = Regex::new(r"(?P<temperature>-?\d+(?:\.\d+)?)\s*,\s*(?P<humidity>\d+(?:\.\d+)?)").unwrap();
        let r = captures_to_reading(&re, "21.5, 40.25").unwrap();
        assert_eq!(r.number("temperature"), Some(21.5));
        assert_eq!(r.number("humidity"), Some(40.25));
        assert!(captures_to_reading(&re, "booting...").is_none());
    }
}

//! Line output that still renders while the terminal is in raw mode.

use std::fmt::Display;
use std::io::{self, Write};

pub fn line(msg: impl Display) {
    let mut stdout = io::stdout().lock();
    let _ = write!(stdout, "{msg}\r\n");
    let _ = stdout.flush();
}

pub fn blank() {
    line("");
}

/// Writes `\n` as `\r\n` so log lines start at column zero in raw mode too.
pub struct CrlfWriter<W>(pub W);

impl<W: Write> Write for CrlfWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut start = 0;
        for (i, &b) in buf.iter().enumerate() {
            if b == b'\n' {
                self.0.write_all(&buf[start..i])?;
                self.0.write_all(b"\r\n")?;
                start = i + 1;
            }
        }
        self.0.write_all(&buf[start..])?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

/// Log sink for the tracing subscriber.
pub fn log_writer() -> CrlfWriter<io::Stderr> {
    CrlfWriter(io::stderr())
}

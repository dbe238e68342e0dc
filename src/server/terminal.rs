//! Minimal line-editing terminal for pty-backed shell channels.
//!
//! Interactive SSH clients send raw keystrokes and expect the server to echo
//! them. The terminal accumulates bytes into a line buffer, produces the echo
//! stream for the client, and yields completed lines to the shell loop. It
//! understands just enough line discipline for a scanner-driven session:
//! CR/LF line endings, backspace, Ctrl-C and Ctrl-D.

const CTRL_C: u8 = 0x03;
const CTRL_D: u8 = 0x04;
const BACKSPACE: u8 = 0x08;
const DELETE: u8 = 0x7f;

/// Result of feeding input bytes into the terminal.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Feed {
    /// Bytes to echo back to the client.
    pub echo: Vec<u8>,
    /// Lines completed by this input, oldest first.
    pub lines: Vec<String>,
    /// Client signalled end-of-input (Ctrl-D on an empty line).
    pub eof: bool,
}

/// Per-channel line editor with a configurable prompt.
#[derive(Debug)]
pub struct Terminal {
    prompt: String,
    buffer: Vec<u8>,
    swallow_lf: bool,
}

impl Terminal {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            buffer: Vec::new(),
            swallow_lf: false,
        }
    }

    /// The configured prompt string.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Consume raw input bytes, returning echo output and completed lines.
    pub fn feed(&mut self, data: &[u8]) -> Feed {
        let mut feed = Feed::default();

        for &byte in data {
            match byte {
                b'\r' => {
                    self.complete_line(&mut feed);
                    self.swallow_lf = true;
                    continue;
                }
                b'\n' => {
                    if !self.swallow_lf {
                        self.complete_line(&mut feed);
                    }
                }
                BACKSPACE | DELETE => {
                    if self.buffer.pop().is_some() {
                        feed.echo.extend_from_slice(&[BACKSPACE, b' ', BACKSPACE]);
                    }
                }
                CTRL_C => {
                    self.buffer.clear();
                    feed.echo.extend_from_slice(b"^C\r\n");
                    feed.echo.extend_from_slice(self.prompt.as_bytes());
                }
                CTRL_D => {
                    if self.buffer.is_empty() {
                        feed.eof = true;
                    }
                }
                printable if printable >= 0x20 => {
                    self.buffer.push(printable);
                    feed.echo.push(printable);
                }
                _ => {}
            }
            self.swallow_lf = false;
        }

        feed
    }

    fn complete_line(&mut self, feed: &mut Feed) {
        let bytes = std::mem::take(&mut self.buffer);
        feed.echo.extend_from_slice(b"\r\n");
        feed.lines
            .push(String::from_utf8_lossy(&bytes).into_owned());
    }
}

//! Wire lines exchanged with relay clients.
//!
//! Everything is newline-delimited UTF-8. The only line without a trailing
//! newline is the username prompt, so the client can type on the same line.

/// Sent once per connection, before the username is read
pub const USERNAME_PROMPT: &str = "Please enter your username: ";

/// Case-sensitive sentinel a client sends to leave gracefully
pub const STOP_SENTINEL: &str = "STOP";

const RED: &str = "\x1b[1;31m";
const BLUE: &str = "\x1b[34m";
const RESET: &str = "\x1b[0m";

/// A line read from a client in the `Active` state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientLine {
    Stop,
    Message(String),
}

impl ClientLine {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed == STOP_SENTINEL {
            ClientLine::Stop
        } else {
            ClientLine::Message(trimmed.to_string())
        }
    }
}

/// Renders outbound lines, with or without ANSI colors
#[derive(Debug, Clone, Copy)]
pub struct LineFormatter {
    ansi: bool,
}

impl LineFormatter {
    pub fn new(ansi: bool) -> Self {
        Self { ansi }
    }

    fn red(&self, text: &str) -> String {
        if self.ansi {
            format!("{RED}{text}{RESET}\n")
        } else {
            format!("{text}\n")
        }
    }

    pub fn public_key(&self, name: &str, encoded_modulus: &str) -> String {
        format!("Public Key of {name}: {encoded_modulus}\n")
    }

    pub fn join_notice(&self, name: &str) -> String {
        self.red(&format!("{name} has joined the chat!"))
    }

    pub fn departure_notice(&self, name: &str, remaining: usize) -> String {
        self.red(&format!(
            "User {name} disconnected, users in the channel: {remaining}"
        ))
    }

    pub fn chat(&self, sender: &str, message: &str) -> String {
        if self.ansi {
            format!("{BLUE}{sender}{RESET}: {message}\n")
        } else {
            format!("{sender}: {message}\n")
        }
    }
}

impl Default for LineFormatter {
    fn default() -> Self {
        Self::new(true)
    }
}

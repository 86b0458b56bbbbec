//! Reading a password from the terminal without echoing it.

use anyhow::{bail, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io::Write;

#[derive(Debug, PartialEq, Eq)]
enum Key {
    Continue,
    Done,
    Abort,
}

/// Apply one key press to the password typed so far.
fn apply_key(buf: &mut String, key: KeyEvent) -> Key {
    if key.kind != KeyEventKind::Press {
        return Key::Continue;
    }
    match key.code {
        KeyCode::Enter => Key::Done,
        KeyCode::Esc => Key::Abort,
        KeyCode::Char('c') | KeyCode::Char('d')
            if key.modifiers.contains(KeyModifiers::CONTROL) =>
        {
            Key::Abort
        }
        KeyCode::Backspace => {
            buf.pop();
            Key::Continue
        }
        KeyCode::Char(c) => {
            buf.push(c);
            Key::Continue
        }
        _ => Key::Continue,
    }
}

/// Leaves raw mode when dropped, including on error.
struct RawMode;

impl RawMode {
    fn enable() -> Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

fn read_blocking() -> Result<String> {
    let mut buf = String::new();
    let outcome = {
        let _raw = RawMode::enable()?;
        loop {
            if let Event::Key(key) = event::read()? {
                match apply_key(&mut buf, key) {
                    Key::Continue => continue,
                    other => break other,
                }
            }
        }
    };
    println!();
    if outcome == Key::Abort {
        bail!("password entry cancelled");
    }
    Ok(buf)
}

/// Print `question` and read a password with terminal echo off.
pub async fn read(question: &str) -> Result<String> {
    print!("{question}");
    std::io::stdout().flush()?;
    tokio::task::spawn_blocking(read_blocking).await?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_typing_and_backspace() {
        let mut buf = String::new();
        for c in "hunter3".chars() {
            assert_eq!(apply_key(&mut buf, press(KeyCode::Char(c))), Key::Continue);
        }
        apply_key(&mut buf, press(KeyCode::Backspace));
        apply_key(&mut buf, press(KeyCode::Char('2')));
        assert_eq!(apply_key(&mut buf, press(KeyCode::Enter)), Key::Done);
        assert_eq!(buf, "hunter2");
    }

    #[test]
    fn test_abort_keys() {
        let mut buf = String::new();
        assert_eq!(apply_key(&mut buf, press(KeyCode::Esc)), Key::Abort);
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(apply_key(&mut buf, ctrl_c), Key::Abort);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_release_events_ignored() {
        let mut buf = String::new();
        let mut release = press(KeyCode::Char('x'));
        release.kind = KeyEventKind::Release;
        assert_eq!(apply_key(&mut buf, release), Key::Continue);
        assert!(buf.is_empty());
    }
}

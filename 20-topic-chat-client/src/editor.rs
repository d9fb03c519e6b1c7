//! Raw-mode line editing for interactive terminals.
//!
//! Keys are read on a dedicated thread (a blocking `crossterm::event::read`
//! never stalls the runtime) and applied to the pending line held by the
//! [`Console`], which redraws it after every render. Submitted lines reach the
//! interactive loop through the same channel shape as piped stdin.

use std::{io, thread, time::Duration};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal,
};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::console::Console;

const KEY_POLL: Duration = Duration::from_millis(100);

/// One change to the line being typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEdit {
    Insert(char),
    Backspace,
    Delete,
    Left,
    Right,
    Home,
    End,
    Submit,
    /// Ctrl-D: end of input on an empty line, delete otherwise.
    EndOfInput,
    Interrupt,
}

impl LineEdit {
    pub fn from_key(key: KeyEvent) -> Option<Self> {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('c') => Some(Self::Interrupt),
                KeyCode::Char('d') => Some(Self::EndOfInput),
                KeyCode::Char('a') => Some(Self::Home),
                KeyCode::Char('e') => Some(Self::End),
                _ => None,
            };
        }

        match key.code {
            KeyCode::Char(c) => Some(Self::Insert(c)),
            KeyCode::Backspace => Some(Self::Backspace),
            KeyCode::Delete => Some(Self::Delete),
            KeyCode::Left => Some(Self::Left),
            KeyCode::Right => Some(Self::Right),
            KeyCode::Home => Some(Self::Home),
            KeyCode::End => Some(Self::End),
            KeyCode::Enter => Some(Self::Submit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    Editing,
    Line(String),
    EndOfInput,
    Interrupt,
}

/// The partially typed line and the cursor position within it, in characters.
#[derive(Debug, Default, Clone)]
pub struct InputLine {
    chars: Vec<char>,
    cursor: usize,
}

impl InputLine {
    pub fn text(&self) -> String {
        self.chars.iter().collect()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn apply(&mut self, edit: LineEdit) -> EditOutcome {
        match edit {
            LineEdit::Insert(c) => {
                self.chars.insert(self.cursor, c);
                self.cursor += 1;
            }
            LineEdit::Backspace => {
                if self.cursor > 0 {
                    self.cursor -= 1;
                    self.chars.remove(self.cursor);
                }
            }
            LineEdit::Delete => self.delete_at_cursor(),
            LineEdit::Left => self.cursor = self.cursor.saturating_sub(1),
            LineEdit::Right => self.cursor = (self.cursor + 1).min(self.chars.len()),
            LineEdit::Home => self.cursor = 0,
            LineEdit::End => self.cursor = self.chars.len(),
            LineEdit::Submit => return EditOutcome::Line(self.take()),
            LineEdit::EndOfInput if self.is_empty() => return EditOutcome::EndOfInput,
            LineEdit::EndOfInput => self.delete_at_cursor(),
            LineEdit::Interrupt => {
                self.take();
                return EditOutcome::Interrupt;
            }
        }
        EditOutcome::Editing
    }

    fn delete_at_cursor(&mut self) {
        if self.cursor < self.chars.len() {
            self.chars.remove(self.cursor);
        }
    }

    fn take(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.chars).into_iter().collect()
    }
}

/// Keeps the terminal in raw mode until dropped.
pub struct RawMode(());

impl RawMode {
    pub fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self(()))
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        if let Err(error) = terminal::disable_raw_mode() {
            warn!(?error, "failed to restore the terminal");
        }
    }
}

/// Submitted lines, a one-shot interrupt signal and the task that produces them.
pub struct LineEditor {
    pub lines: mpsc::Receiver<String>,
    pub interrupted: oneshot::Receiver<()>,
    pub task: JoinHandle<()>,
}

/// Reads keys from the terminal and edits the console's pending line.
pub fn spawn_line_editor(console: Console) -> LineEditor {
    let (keys_tx, keys_rx) = mpsc::unbounded_channel();
    thread::spawn(move || read_keys(keys_tx));
    drive(console, keys_rx)
}

fn read_keys(keys: mpsc::UnboundedSender<KeyEvent>) {
    loop {
        match event::poll(KEY_POLL) {
            Ok(true) => match event::read() {
                Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                    if keys.send(key).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(error) => {
                    warn!(?error, "failed to read the terminal");
                    break;
                }
            },
            Ok(false) if keys.is_closed() => break,
            Ok(false) => {}
            Err(error) => {
                warn!(?error, "failed to poll the terminal");
                break;
            }
        }
    }
}

/// Applies keys to the console until a line cannot be delivered, input ends or Ctrl-C.
pub fn drive(console: Console, mut keys: mpsc::UnboundedReceiver<KeyEvent>) -> LineEditor {
    let (lines_tx, lines) = mpsc::channel(16);
    let (interrupt_tx, interrupted) = oneshot::channel();

    let task = tokio::spawn(async move {
        while let Some(key) = keys.recv().await {
            let Some(edit) = LineEdit::from_key(key) else {
                continue;
            };
            match console.edit(edit).await {
                Ok(EditOutcome::Editing) => {}
                Ok(EditOutcome::Line(line)) => {
                    if lines_tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(EditOutcome::EndOfInput) => {
                    debug!("end of input from the terminal");
                    break;
                }
                Ok(EditOutcome::Interrupt) => {
                    let _ = interrupt_tx.send(());
                    break;
                }
                Err(error) => {
                    warn!(?error, "failed to echo input");
                    break;
                }
            }
        }
    });

    LineEditor {
        lines,
        interrupted,
        task,
    }
}

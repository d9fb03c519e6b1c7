use std::{
    io::{self, IsTerminal},
    sync::Arc,
};

use crossterm::{
    cursor::MoveToColumn,
    queue,
    terminal::{Clear, ClearType},
};
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};

use crate::editor::{EditOutcome, InputLine, LineEdit};

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Shared handle to the operator's terminal.
///
/// Both the interactive loop and the dispatcher task write through clones of
/// the same console. Every render is assembled in memory and written under a
/// single lock acquisition: clear the line being typed, print, redraw the
/// prompt followed by whatever the operator had typed so far. Two renders can
/// never interleave, and a render never loses the pending input.
#[derive(Clone)]
pub struct Console {
    output: Arc<Mutex<Output>>,
}

struct Output {
    writer: BoxedWriter,
    prompt: Option<String>,
    pending: InputLine,
    /// Raw mode terminals need an explicit carriage return.
    newline: &'static [u8],
}

impl Output {

    fn clear_line(&self, buffer: &mut Vec<u8>) -> io::Result<()> {
        if self.prompt.is_some() {
            queue!(buffer, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
        }
        Ok(())
    }

    fn redraw_input(&self, buffer: &mut Vec<u8>) -> io::Result<()> {
        let Some(prompt) = &self.prompt else {
            return Ok(());
        };
        let text = self.pending.text();
        buffer.extend_from_slice(prompt.as_bytes());
        buffer.extend_from_slice(text.as_bytes());

        let cursor = self.pending.cursor();
        if cursor < text.chars().count() {
            let column = prompt.chars().count() + cursor;
            queue!(buffer, MoveToColumn(u16::try_from(column).unwrap_or(u16::MAX)))?;
        }
        Ok(())
    }

    async fn write(&mut self, buffer: &[u8]) -> io::Result<()> {
        self.writer.write_all(buffer).await?;
        self.writer.flush().await
    }
}

impl Console {
    /// Console for a raw mode terminal: clears the input line and redraws
    /// `prompt` plus the pending input after every render.
    pub fn interactive<W>(writer: W, prompt: impl Into<String>) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::with_prompt(Box::new(writer), Some(prompt.into()), b"\r\n")
    }

    /// Console that only prints lines, for pipes and tests.
    pub fn plain<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::with_prompt(Box::new(writer), None, b"\n")
    }

    /// Stdout console, interactive only when both stdin and stdout are terminals.
    pub fn stdout(prompt: &str) -> Self {
        if Self::is_interactive() {
            Self::interactive(tokio::io::stdout(), prompt)
        } else {
            Self::plain(tokio::io::stdout())
        }
    }

    pub fn is_interactive() -> bool {
        io::stdin().is_terminal() && io::stdout().is_terminal()
    }

    fn with_prompt(writer: BoxedWriter, prompt: Option<String>, newline: &'static [u8]) -> Self {
        Self {
            output: Arc::new(Mutex::new(Output {
                writer,
                prompt,
                pending: InputLine::default(),
                newline,
            })),
        }
    }

    /// Prints the lines as one unit, then redraws the prompt and pending input.
    pub async fn render<I, S>(&self, lines: I) -> io::Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut output = self.output.lock().await;
        let mut buffer = Vec::new();
        output.clear_line(&mut buffer)?;
        for line in lines {
            buffer.extend_from_slice(line.as_ref().as_bytes());
            buffer.extend_from_slice(output.newline);
        }
        output.redraw_input(&mut buffer)?;
        output.write(&buffer).await
    }

    /// Applies one key to the pending input and echoes the result.
    pub async fn edit(&self, edit: LineEdit) -> io::Result<EditOutcome> {
        let mut output = self.output.lock().await;
        let outcome = output.pending.apply(edit);
        let mut buffer = Vec::new();
        match &outcome {
            EditOutcome::Editing => {
                output.clear_line(&mut buffer)?;
                output.redraw_input(&mut buffer)?;
            }
            EditOutcome::Line(_) | EditOutcome::EndOfInput | EditOutcome::Interrupt => {
                buffer.extend_from_slice(output.newline);
            }
        }
        output.write(&buffer).await?;
        Ok(outcome)
    }

    /// Clears the prompt line and stops redrawing it, leaving the terminal tidy on exit.
    pub async fn release(&self) -> io::Result<()> {
        let mut output = self.output.lock().await;
        let mut buffer = Vec::new();
        output.clear_line(&mut buffer)?;
        output.prompt = None;
        output.pending = InputLine::default();
        output.write(&buffer).await
    }

    pub async fn line(&self, text: &str) -> io::Result<()> {
        self.render([text]).await
    }

    pub async fn info(&self, text: &str) -> io::Result<()> {
        self.render([format!("*** {text}")]).await
    }

    pub async fn warn(&self, text: &str) -> io::Result<()> {
        self.render([format!("!!! {text}")]).await
    }

    /// Redraws the prompt without printing anything else.
    pub async fn prompt(&self) -> io::Result<()> {
        self.render(std::iter::empty::<&str>()).await
    }
}

//! Transcript rendering
//!
//! Turns [`AssistantMessage`] notifications into terminal output. Every turn
//! is printed through the markup renderer. A streaming bot turn is printed
//! line by line: each line is styled as soon as it is complete, and the tail
//! is styled when the turn is finalized.

use std::collections::HashMap;
use std::io::{self, Write};

use assistant_core::{render, AssistantMessage, Citation, ExchangeState, Message, Role, Segment};
use crossterm::style::Stylize;

const BOT_PREFIX: &str = "ረዳት ›";
const USER_PREFIX: &str = "እርስዎ ›";

/// Writes the conversation to a terminal (or any writer)
pub struct Transcript<W: Write> {
    out: W,
    welcome: String,
    /// Streaming turns: latest full text and bytes already printed
    streamed: HashMap<usize, (String, usize)>,
}

impl<W: Write> Transcript<W> {
    pub fn new(out: W, welcome: impl Into<String>) -> Self {
        Self {
            out,
            welcome: welcome.into(),
            streamed: HashMap::new(),
        }
    }

    /// Render one notification
    pub fn show(&mut self, msg: &AssistantMessage) -> io::Result<()> {
        match msg {
            AssistantMessage::State { state } => {
                if *state == ExchangeState::Sending {
                    writeln!(self.out, "{}", state.description().dim())?;
                }
            }
            AssistantMessage::TurnAppended { index, message } => self.turn(*index, message)?,
            AssistantMessage::TurnUpdated { index, text } => self.delta(*index, text)?,
            AssistantMessage::TurnFinalized { index, citations } => {
                if let Some((text, printed)) = self.streamed.remove(index) {
                    self.segments(text.get(printed..).unwrap_or_default())?;
                }
                writeln!(self.out)?;
                if let Some(citations) = citations {
                    self.sources(citations)?;
                }
            }
            AssistantMessage::Cleared => {
                self.streamed.clear();
                writeln!(self.out, "{}", "History cleared.".dim())?;
                let welcome = Message::bot(self.welcome.clone());
                self.turn(0, &welcome)?;
            }
        }
        self.out.flush()
    }

    /// Print the draft being authored
    pub fn draft(&mut self, text: &str) -> io::Result<()> {
        write!(self.out, "{} ", "draft ›".dim())?;
        self.segments(text)?;
        writeln!(self.out)?;
        self.out.flush()
    }

    /// Print a line of help or status text
    pub fn note(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{}", text.dim())?;
        self.out.flush()
    }

    /// Print the input prompt
    pub fn prompt(&mut self, continuation: bool) -> io::Result<()> {
        let prompt = if continuation { "  … " } else { "› " };
        write!(self.out, "{}", prompt.green())?;
        self.out.flush()
    }

    fn turn(&mut self, index: usize, message: &Message) -> io::Result<()> {
        let prefix = match message.role {
            Role::Bot => BOT_PREFIX.cyan().bold(),
            Role::User => USER_PREFIX.green().bold(),
        };
        write!(self.out, "{prefix} ")?;

        // An empty bot turn is the placeholder a response streams into
        if message.role == Role::Bot && message.text.is_empty() {
            self.streamed.insert(index, (String::new(), 0));
            return Ok(());
        }

        self.segments(&message.text)?;
        writeln!(self.out)?;
        if let Some(citations) = &message.citations {
            self.sources(citations)?;
        }
        Ok(())
    }

    fn delta(&mut self, index: usize, text: &str) -> io::Result<()> {
        let mut printed = self.streamed.get(&index).map_or(0, |(_, printed)| *printed);

        // Print every line completed since the last update
        while let Some(offset) = text.get(printed..).and_then(|rest| rest.find('\n')) {
            let end = printed + offset;
            self.segments(&text[printed..end])?;
            writeln!(self.out)?;
            printed = end + 1;
        }

        self.streamed.insert(index, (text.to_string(), printed));
        Ok(())
    }

    fn segments(&mut self, text: &str) -> io::Result<()> {
        for segment in render(text) {
            match segment {
                Segment::Plain(t) => write!(self.out, "{t}")?,
                Segment::Bold(t) => write!(self.out, "{}", t.bold())?,
                Segment::Italic(t) => write!(self.out, "{}", t.italic())?,
                Segment::Underline(t) => write!(self.out, "{}", t.underlined())?,
            }
        }
        Ok(())
    }

    fn sources(&mut self, citations: &[Citation]) -> io::Result<()> {
        writeln!(self.out, "  {}", "ምንጮች / Sources:".dim())?;
        for citation in citations {
            writeln!(
                self.out,
                "    • {} {}",
                citation.title,
                citation.uri.as_str().underlined()
            )?;
        }
        Ok(())
    }
}

use std::io::{self, Write};

use termcolor::{self, Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

fn get_colour_choice() -> termcolor::ColorChoice {
    if atty::is(atty::Stream::Stdout) {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    }
}

/// Writes the human-readable summary of a run to standard output.
pub struct Reporter {
    stream: StandardStream,
}

impl Reporter {
    pub fn new() -> Reporter {
        Reporter {
            stream: StandardStream::stdout(get_colour_choice()),
        }
    }

    fn coloured(&mut self, colour: Color, bold: bool, text: &str) -> io::Result<()> {
        let mut spec = ColorSpec::new();
        spec.set_fg(Some(colour)).set_bold(bold);
        self.stream.set_color(&spec)?;
        let result = writeln!(self.stream, "{text}");
        self.stream.reset()?;
        result
    }

    pub fn heading(&mut self, title: &str) -> io::Result<()> {
        self.coloured(Color::Cyan, true, title)
    }

    pub fn warning(&mut self, text: &str) -> io::Result<()> {
        self.coloured(Color::Yellow, false, text)
    }

    pub fn line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.stream, "{text}")
    }

    /// Print `words` in octal, eight to a line, each line labelled
    /// with the address of its first word.
    pub fn dump(&mut self, origin: u16, words: &[u16]) -> io::Result<()> {
        for (row, chunk) in words.chunks(8).enumerate() {
            let address = usize::from(origin) + row * 8;
            write!(self.stream, "{address:06o}:")?;
            for word in chunk {
                write!(self.stream, " {word:06o}")?;
            }
            writeln!(self.stream)?;
        }
        Ok(())
    }
}

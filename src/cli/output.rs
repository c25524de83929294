//! User-facing terminal output, separate from the log stream.

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use std::io::{self, IsTerminal, Write};

/// Prints progress, results and warnings for a CLI run.
///
/// Markers are coloured when the stream is a terminal.
#[derive(Debug, Clone, Copy)]
pub struct OutputManager {
    verbose: bool,
    quiet: bool,
}

fn color_choice(is_terminal: bool) -> ColorChoice {
    if is_terminal {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    }
}

fn spec(color: Color) -> ColorSpec {
    let mut spec = ColorSpec::new();
    spec.set_fg(Some(color)).set_bold(true);
    spec
}

/// `marker` in `spec`, then `message` uncoloured.
fn write_marked<W: WriteColor>(
    w: &mut W,
    spec: &ColorSpec,
    marker: &str,
    message: &str,
) -> io::Result<()> {
    w.set_color(spec)?;
    write!(w, "{marker}")?;
    w.reset()?;
    writeln!(w, " {message}")?;
    w.flush()
}

impl OutputManager {
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self { verbose, quiet }
    }

    fn stdout() -> StandardStream {
        StandardStream::stdout(color_choice(io::stdout().is_terminal()))
    }

    fn stderr() -> StandardStream {
        StandardStream::stderr(color_choice(io::stderr().is_terminal()))
    }

    fn out(&self, line: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{line}")?;
        stdout.flush()
    }

    fn out_marked(&self, color: Color, marker: &str, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        write_marked(&mut Self::stdout(), &spec(color), marker, message)
    }

    /// Plain informational line.
    pub fn info(&self, message: &str) -> io::Result<()> {
        self.out(message)
    }

    /// Only shown with `--verbose`.
    pub fn verbose(&self, message: &str) -> io::Result<()> {
        if self.verbose {
            self.out(message)
        } else {
            Ok(())
        }
    }

    pub fn progress(&self, message: &str) -> io::Result<()> {
        self.out_marked(Color::Cyan, "→", message)
    }

    pub fn success(&self, message: &str) -> io::Result<()> {
        self.out_marked(Color::Green, "✓", message)
    }

    /// Warnings go to stderr and ignore `--quiet`.
    pub fn warn(&self, message: &str) -> io::Result<()> {
        write_marked(&mut Self::stderr(), &spec(Color::Yellow), "⚠", message)
    }

    /// Errors go to stderr and ignore `--quiet`.
    pub fn error(&self, message: &str) -> io::Result<()> {
        write_marked(&mut Self::stderr(), &spec(Color::Red), "✗", message)
    }

    pub fn section(&self, title: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        let mut stdout = Self::stdout();
        writeln!(stdout)?;
        stdout.set_color(ColorSpec::new().set_bold(true))?;
        writeln!(stdout, "{title}")?;
        writeln!(stdout, "{}", "─".repeat(title.chars().count()))?;
        stdout.reset()?;
        stdout.flush()
    }

    pub fn indent(&self, message: &str) -> io::Result<()> {
        self.out(&format!("   {message}"))
    }
}

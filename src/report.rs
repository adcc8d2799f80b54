//! Line-oriented operator reports.
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    /// Something was skipped on purpose.
    Notice,
    Failure,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    lines: Vec<(Level, String)>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(text: impl Into<String>) -> Self {
        let mut report = Self::new();
        report.info(text);
        report
    }

    pub fn info(&mut self, text: impl Into<String>) {
        self.lines.push((Level::Info, text.into()));
    }

    pub fn notice(&mut self, text: impl Into<String>) {
        self.lines.push((Level::Notice, text.into()));
    }

    pub fn failure(&mut self, text: impl Into<String>) {
        self.lines.push((Level::Failure, text.into()));
    }

    /// Append every line of `other`, keeping its levels.
    pub fn extend(&mut self, other: Report) {
        self.lines.extend(other.lines);
    }

    pub fn lines(&self) -> &[(Level, String)] {
        &self.lines
    }

    pub fn count(&self, level: Level) -> usize {
        self.lines.iter().filter(|(l, _)| *l == level).count()
    }

    pub fn has_failures(&self) -> bool {
        self.count(Level::Failure) > 0
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, (level, text)) in self.lines.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            match level {
                Level::Failure => write!(f, "*** {text}")?,
                Level::Info | Level::Notice => f.write_str(text)?,
            }
        }
        Ok(())
    }
}

/// A byte range into the configuration source a diagnostic refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn dummy() -> Self {
        Self { start: 0, end: 0 }
    }

    pub fn is_dummy(&self) -> bool {
        self.start == 0 && self.end == 0
    }
}

/// A toolkit diagnostic (error or warning).
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Span,
    pub notes: Vec<String>,
    pub help: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl Diagnostic {
    pub fn error(message: String, span: Span) -> Self {
        Self {
            severity: Severity::Error,
            message,
            span,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn warning(message: String, span: Span) -> Self {
        Self {
            severity: Severity::Warning,
            message,
            span,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn with_note(mut self, note: String) -> Self {
        self.notes.push(note);
        self
    }

    pub fn with_help(mut self, help: String) -> Self {
        self.help = Some(help);
        self
    }

    /// Render the diagnostic against its source text using ariadne.
    pub fn render(&self, filename: &str, source: &str) {
        use ariadne::{Color, Label, Report, ReportKind, Source};

        let kind = match self.severity {
            Severity::Error => ReportKind::Error,
            Severity::Warning => ReportKind::Warning,
        };

        let color = match self.severity {
            Severity::Error => Color::Red,
            Severity::Warning => Color::Yellow,
        };

        let mut report = Report::build(kind, filename, self.span.start as usize)
            .with_message(&self.message)
            .with_label(
                Label::new((filename, self.span.start as usize..self.span.end as usize))
                    .with_message(&self.message)
                    .with_color(color),
            );

        for note in &self.notes {
            report = report.with_note(note);
        }

        if let Some(help) = &self.help {
            report = report.with_help(help);
        }

        report
            .finish()
            .eprint((filename, Source::from(source)))
            .unwrap();
    }

    /// Print the diagnostic to stderr without source context. Used by the
    /// engine for warnings that have no configuration text behind them
    /// (topology cycle breaks, simulation timeouts).
    pub fn emit(&self) {
        let tag = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        eprintln!("{}: {}", tag, self.message);
        for note in &self.notes {
            eprintln!("  note: {}", note);
        }
        if let Some(help) = &self.help {
            eprintln!("  help: {}", help);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let d = Diagnostic::error("unknown op 'frob'".to_string(), Span::new(10, 15));
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.message, "unknown op 'frob'");
        assert_eq!(d.span.start, 10);
        assert_eq!(d.span.end, 15);
        assert!(d.notes.is_empty());
        assert!(d.help.is_none());
    }

    #[test]
    fn test_warning_construction() {
        let d = Diagnostic::warning("undeclared cycle".to_string(), Span::dummy());
        assert_eq!(d.severity, Severity::Warning);
        assert!(d.span.is_dummy());
    }

    #[test]
    fn test_chained_builders() {
        let d = Diagnostic::error("bad record".to_string(), Span::dummy())
            .with_note("tile (3, 2)".to_string())
            .with_help("expected one of N, E, S, W, self".to_string())
            .with_note("field 'src_a'".to_string());
        assert_eq!(d.notes.len(), 2);
        assert_eq!(d.notes[0], "tile (3, 2)");
        assert_eq!(d.help.as_deref(), Some("expected one of N, E, S, W, self"));
    }

    #[test]
    fn test_render_does_not_panic() {
        let source = "[{\"x\": 0, \"y\": 0, \"op\": \"frob\"}]";
        let d = Diagnostic::error("unknown op 'frob'".to_string(), Span::new(24, 30));
        d.render("dfg.json", source);
    }

    #[test]
    fn test_emit_does_not_panic() {
        let d = Diagnostic::warning("simulation exceeded max time".to_string(), Span::dummy())
            .with_note("global time 10000".to_string());
        d.emit();
    }
}

use std::ops::Range;

use codespan_reporting::{
    diagnostic::{Label, Severity},
    files::SimpleFile,
    term,
};
use is_terminal::IsTerminal;
use qpu_ir::{ListingConfig, ListingOutputter};
use qpu_lib::{
    diagnostic::{Code, DiagnosticKind, Span},
    kernel::Kernel,
};

/// The instruction listing diagnostics are shown against.
struct Listing {
    file: SimpleFile<String, String>,
    lines: Vec<Range<usize>>,
}

impl Listing {
    fn new(name: &str, kernel: &Kernel) -> Self {
        let mut text = String::new();
        let config = ListingConfig {
            show_comments: true,
            show_indices: true,
        };
        let lines = ListingOutputter::new(&mut text)
            .with_config(config)
            .write_listing(&kernel.compile_data().diagnostic_code)
            .unwrap_or_default();
        Self {
            file: SimpleFile::new(name.to_owned(), text),
            lines,
        }
    }

    /// The byte range of the instructions in `span`. Spans past the end of the code point at
    /// the end of the listing.
    fn byte_range(&self, span: Span) -> Range<usize> {
        let end_of_file = self.file.source().len();
        let instrs: Range<usize> = span.into();
        let start = self.lines.get(instrs.start).map(|line| line.start);
        let end = instrs
            .end
            .checked_sub(1)
            .and_then(|last| self.lines.get(last))
            .map(|line| line.end);
        match (start, end) {
            (Some(start), Some(end)) if end >= start => start..end,
            (Some(start), _) => start..start,
            _ => end_of_file..end_of_file,
        }
    }
}

pub fn eprint_diagnostics(name: &str, kernel: &Kernel) {
    let listing = Listing::new(name, kernel);
    let color = if std::io::stderr().is_terminal() {
        term::termcolor::ColorChoice::Auto
    } else {
        term::termcolor::ColorChoice::Never
    };
    let mut writer = term::termcolor::StandardStream::stderr(color);
    let config = term::Config {
        chars: term::Chars {
            single_primary_caret: '─',
            single_secondary_caret: '─',
            multi_primary_caret_start: '╯',
            multi_secondary_caret_start: '╯',
            multi_primary_caret_end: '╯',
            multi_secondary_caret_end: '╯',
            ..term::Chars::box_drawing()
        },

        ..Default::default()
    };

    for (t, d) in kernel.diagnostics() {
        let severity = match t {
            DiagnosticKind::Rec => Severity::Warning,
            DiagnosticKind::Err => Severity::Error,
        };

        let mut labels = Vec::new();

        labels.push({
            let mut l = Label::primary((), listing.byte_range(*d.main_span()));
            if let Some(m) = d.main_span_message() {
                l = l.with_message(m);
            }
            l
        });

        for (span, message) in d.additional_spans() {
            let mut l = Label::secondary((), listing.byte_range(*span));
            if let Some(m) = message {
                l = l.with_message(m);
            }
            labels.push(l);
        }

        let mut diagnostic = codespan_reporting::diagnostic::Diagnostic::new(severity)
            .with_message(d.message())
            .with_labels(labels);

        if d.code() != &Code::Unspecified {
            diagnostic = diagnostic.with_code(d.code().to_string())
        }

        if let Err(err) = term::emit(&mut writer, &config, &listing.file, &diagnostic) {
            log::error!("failed to print a diagnostic: {err}");
        }
    }
}

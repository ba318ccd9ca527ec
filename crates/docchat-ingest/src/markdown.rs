//! Markdown to plain text
//!
//! Walks the pulldown-cmark event stream and keeps only the readable text.
//! Block boundaries become blank lines so the chunker can still split at
//! paragraph level; formatting, links, and html are dropped.

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

/// Render markdown down to plain text suitable for chunking and embedding.
pub fn markdown_to_text(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(markdown, options);

    let mut out = String::new();
    for event in parser {
        match event {
            Event::Text(text) => out.push_str(&text),
            Event::Code(code) => out.push_str(&code),
            Event::SoftBreak | Event::HardBreak => out.push('\n'),
            Event::Start(Tag::Item) => out.push_str("- "),
            Event::End(
                TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::CodeBlock | TagEnd::BlockQuote,
            ) => block_break(&mut out),
            Event::End(TagEnd::Item | TagEnd::TableRow | TagEnd::TableHead) => {
                if !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            Event::End(TagEnd::List(_) | TagEnd::Table) => block_break(&mut out),
            Event::End(TagEnd::TableCell) => out.push(' '),
            Event::Rule => block_break(&mut out),
            _ => {}
        }
    }

    out.trim().to_string()
}

/// Separate blocks with exactly one blank line
fn block_break(out: &mut String) {
    while out.ends_with('\n') {
        out.pop();
    }
    if !out.is_empty() {
        out.push_str("\n\n");
    }
}

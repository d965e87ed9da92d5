pub mod document;
pub mod metadata;
pub mod post;
pub mod runs;
pub mod sections;

use serde::Deserialize;
use thiserror::Error;

use document::Document;
use metadata::Metadata;
use post::{DriveFile, Post};
use sections::SectionBuilder;

#[derive(Debug, Error)]
pub enum ParseError {
    /// The document has no body content list to iterate. This is a caller
    /// contract violation, not a content problem.
    #[error("document has no body content")]
    MissingContent,
}

/// How a body paragraph is recognised as an embedded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageHeuristic {
    /// Exactly one text-bearing run, hyperlinked, with no surrounding whitespace.
    #[default]
    SingleLinkedRun,
    /// Any hyperlinked paragraph whose plain text has at most `max_words` words.
    ShortLinkText { max_words: usize },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    pub image_heuristic: ImageHeuristic,
}

/// A stored export: file metadata next to the document it describes.
#[derive(Debug, Clone, Deserialize)]
pub struct Export {
    pub file: DriveFile,
    pub document: Document,
}

enum State {
    Metadata,
    Body(SectionBuilder),
}

/// Single pass over the document: metadata lines until the first heading,
/// then sections.
pub fn parse_document(
    doc: &Document,
    file: &DriveFile,
    options: ParseOptions,
) -> Result<Post, ParseError> {
    let content = doc
        .body
        .as_ref()
        .and_then(|b| b.content.as_ref())
        .ok_or(ParseError::MissingContent)?;

    let mut meta = Metadata::default();
    let mut state = State::Metadata;

    for para in content.iter().filter_map(|e| e.paragraph.as_ref()) {
        let raw = para.raw_text();
        if raw.is_empty() {
            continue;
        }

        if let State::Body(builder) = &mut state {
            builder.push(para, &raw);
            continue;
        }

        if para.is_heading() {
            meta.finish();
            state = State::Body(SectionBuilder::new(raw, options.image_heuristic));
        } else {
            meta.classify(para, &raw);
        }
    }

    let body = match state {
        State::Metadata => {
            meta.finish();
            Vec::new()
        }
        State::Body(builder) => builder.finish(),
    };

    Ok(post::assemble(file, meta, body))
}

/// Parse one stored export.
pub fn process_export(export: &Export, options: ParseOptions) -> Result<Post, ParseError> {
    parse_document(&export.document, &export.file, options)
}

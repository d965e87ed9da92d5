use super::document::Paragraph;
use super::post::{ContentBlock, Section};
use super::runs;
use super::ImageHeuristic;

/// Literal bullet glyph the document export sometimes leaves in place of a
/// native list marker.
pub const BULLET_MARKER: &str = "\u{25CF}  \t";

/// Accumulates body-state paragraphs into sections.
///
/// Sections without content are never emitted, so every section in the output
/// has at least one block.
#[derive(Debug)]
pub struct SectionBuilder {
    heuristic: ImageHeuristic,
    sections: Vec<Section>,
    current: Section,
}

impl SectionBuilder {
    /// Start the body with the heading that ended the metadata state.
    pub fn new(heading: String, heuristic: ImageHeuristic) -> Self {
        Self {
            heuristic,
            sections: Vec::new(),
            current: Section::new(Some(heading)),
        }
    }

    /// Route one non-empty body paragraph. `raw` is its trimmed concatenated text.
    pub fn push(&mut self, para: &Paragraph, raw: &str) {
        if para.is_heading() {
            self.close_section(Some(raw.to_string()));
            return;
        }

        if let Some(url) = image_url(para, raw, self.heuristic) {
            self.current.content.push(ContentBlock::Image {
                url: url.to_string(),
            });
            return;
        }

        if let Some(item) = list_item(para, raw) {
            self.push_list_item(item);
            return;
        }

        let extracted = runs::extract(para);
        if let Some(link) = extracted.single_placeholder() {
            self.current.content.push(ContentBlock::Image {
                url: link.url.clone(),
            });
            return;
        }
        self.current.content.push(ContentBlock::Paragraph {
            text: extracted.text,
            links: extracted.links,
        });
    }

    /// Flush the open section and return the finished body.
    pub fn finish(mut self) -> Vec<Section> {
        if !self.current.content.is_empty() {
            self.sections.push(self.current);
        }
        self.sections
    }

    fn close_section(&mut self, heading: Option<String>) {
        let done = std::mem::replace(&mut self.current, Section::new(heading));
        if !done.content.is_empty() {
            self.sections.push(done);
        }
    }

    fn push_list_item(&mut self, item: String) {
        match self.current.content.last_mut() {
            Some(ContentBlock::List { items }) => items.push(item),
            _ => self
                .current
                .content
                .push(ContentBlock::List { items: vec![item] }),
        }
    }
}

/// Image URL if the paragraph is nothing but a linked image reference.
fn image_url<'a>(para: &'a Paragraph, raw: &str, heuristic: ImageHeuristic) -> Option<&'a str> {
    match heuristic {
        ImageHeuristic::SingleLinkedRun => {
            let mut texts = para.runs().filter(|r| !r.text().is_empty());
            let only = texts.next()?;
            if texts.next().is_some() {
                return None;
            }
            let url = only.link_url()?;
            let segment = only.text().strip_suffix('\n').unwrap_or(only.text());
            (segment.trim() == segment).then_some(url)
        }
        ImageHeuristic::ShortLinkText { max_words } => {
            let url = para.first_link_url()?;
            (raw.split_whitespace().count() <= max_words).then_some(url)
        }
    }
}

/// Item text if the paragraph is a list entry, with any bullet glyph removed.
fn list_item(para: &Paragraph, raw: &str) -> Option<String> {
    if let Some(rest) = raw.strip_prefix(BULLET_MARKER) {
        return Some(rest.trim().to_string());
    }
    para.has_bullet().then(|| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::document::fixtures::{bullet, link, para, run, styled};
    use crate::parser::post::LinkRef;

    fn build(paras: &[Paragraph], heuristic: ImageHeuristic) -> Vec<Section> {
        let mut b = SectionBuilder::new("Start".into(), heuristic);
        for p in paras {
            let raw = p.raw_text();
            if !raw.is_empty() {
                b.push(p, &raw);
            }
        }
        b.finish()
    }

    fn build_default(paras: &[Paragraph]) -> Vec<Section> {
        build(paras, ImageHeuristic::default())
    }

    #[test]
    fn consecutive_bullets_merge() {
        let body = build_default(&[bullet("A"), bullet("B"), bullet("C")]);
        assert_eq!(body.len(), 1);
        assert_eq!(
            body[0].content,
            vec![ContentBlock::List {
                items: vec!["A".into(), "B".into(), "C".into()]
            }]
        );
    }

    #[test]
    fn paragraph_breaks_list_run() {
        let body = build_default(&[bullet("A"), para(vec![run("between")]), bullet("B")]);
        let kinds: Vec<_> = body[0]
            .content
            .iter()
            .map(|b| match b {
                ContentBlock::List { items } => format!("list:{}", items.join(",")),
                ContentBlock::Paragraph { text, .. } => format!("p:{text}"),
                ContentBlock::Image { url } => format!("img:{url}"),
            })
            .collect();
        assert_eq!(kinds, vec!["list:A", "p:between", "list:B"]);
    }

    #[test]
    fn glyph_marker_is_list_item() {
        let body = build_default(&[para(vec![run("\u{25CF}  \tfirst point\n")])]);
        assert_eq!(
            body[0].content,
            vec![ContentBlock::List {
                items: vec!["first point".into()]
            }]
        );
    }

    #[test]
    fn full_link_paragraph_is_image() {
        let body = build_default(&[para(vec![link("https://drive/img", "https://drive/img")])]);
        assert_eq!(
            body[0].content,
            vec![ContentBlock::Image {
                url: "https://drive/img".into()
            }]
        );
    }

    #[test]
    fn padded_link_falls_back_to_placeholder_image() {
        // Leading space fails the exact-text check, but the paragraph still
        // collapses to a lone placeholder.
        let body = build_default(&[para(vec![link(" pic", "https://img"), run("\n")])]);
        assert_eq!(
            body[0].content,
            vec![ContentBlock::Image {
                url: "https://img".into()
            }]
        );
    }

    #[test]
    fn mixed_paragraph_keeps_links() {
        let body = build_default(&[para(vec![
            run("See "),
            link("the site", "https://x"),
            run(" for details\n"),
        ])]);
        assert_eq!(
            body[0].content,
            vec![ContentBlock::Paragraph {
                text: "See {link1} for details".into(),
                links: Some(vec![LinkRef {
                    id: "link1".into(),
                    text: "the site".into(),
                    url: "https://x".into(),
                }]),
            }]
        );
    }

    #[test]
    fn short_link_text_variant() {
        let p = para(vec![run("Photo: "), link("sunset", "https://img")]);
        let strict = build_default(std::slice::from_ref(&p));
        assert!(matches!(strict[0].content[0], ContentBlock::Paragraph { .. }));

        let loose = build(&[p], ImageHeuristic::ShortLinkText { max_words: 3 });
        assert_eq!(
            loose[0].content,
            vec![ContentBlock::Image {
                url: "https://img".into()
            }]
        );
    }

    #[test]
    fn headings_split_sections_and_empty_ones_are_dropped() {
        let body = build_default(&[
            styled("HEADING_1", vec![run("Empty\n")]),
            styled("HEADING_1", vec![run("Full\n")]),
            para(vec![run("text")]),
            styled("HEADING_1", vec![run("Trailing\n")]),
        ]);
        assert_eq!(body.len(), 1);
        assert_eq!(body[0].heading.as_deref(), Some("Full"));
    }

    #[test]
    fn list_does_not_merge_across_sections() {
        let body = build_default(&[
            bullet("A"),
            styled("HEADING_1", vec![run("Next\n")]),
            bullet("B"),
        ]);
        assert_eq!(body.len(), 2);
        assert_eq!(body[1].content, vec![ContentBlock::List { items: vec!["B".into()] }]);
    }

    #[test]
    fn unknown_style_is_body_text() {
        let body = build_default(&[styled("HEADING_2", vec![run("Sub\n")])]);
        assert_eq!(body[0].heading.as_deref(), Some("Start"));
        assert!(matches!(&body[0].content[0], ContentBlock::Paragraph { text, .. } if text == "Sub"));
    }
}

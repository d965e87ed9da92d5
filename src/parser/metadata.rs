use super::document::Paragraph;

const TAGS_PREFIX: &str = "tags:";

/// Post metadata gathered from the paragraphs before the first heading.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub title: Option<String>,
    pub title_image: Option<String>,
    pub tags: Option<Vec<String>>,
    pub excerpt: String,
    buffer: Vec<String>,
}

/// What a metadata-state paragraph turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaLine {
    Title,
    Tags,
    TitleImage,
    Excerpt,
}

impl Metadata {
    /// Classify one non-empty metadata-state paragraph. `raw` is its trimmed
    /// concatenated text.
    pub fn classify(&mut self, para: &Paragraph, raw: &str) -> MetaLine {
        if para.is_title() && self.title.is_none() {
            self.title = Some(raw.to_string());
            return MetaLine::Title;
        }

        if self.tags.is_none() {
            if let Some(tags) = parse_tags(raw) {
                self.tags = Some(tags);
                return MetaLine::Tags;
            }
        }

        if self.title_image.is_none() {
            if let Some(url) = para.first_link_url() {
                self.title_image = Some(url.to_string());
                return MetaLine::TitleImage;
            }
        }

        self.buffer.push(raw.trim().to_string());
        MetaLine::Excerpt
    }

    /// Flush buffered lines into `excerpt`. Called once, when the body starts
    /// or when the document ends without one.
    pub fn finish(&mut self) {
        if !self.buffer.is_empty() {
            self.excerpt = std::mem::take(&mut self.buffer).join(" ");
        }
    }
}

/// Parse a `Tags: a, b, c` line. Matching on the prefix is case-insensitive;
/// tokens are trimmed and empty ones dropped.
pub fn parse_tags(line: &str) -> Option<Vec<String>> {
    let prefix = line.get(..TAGS_PREFIX.len())?;
    if !prefix.eq_ignore_ascii_case(TAGS_PREFIX) {
        return None;
    }
    let tags = line[TAGS_PREFIX.len()..]
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    Some(tags)
}

use serde::{Deserialize, Deserializer, Serialize};

/// Structured document as returned by the documents API.
///
/// Only the parts the transformer reads are modelled; everything else in the
/// payload is ignored during deserialization.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub body: Option<Body>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Body {
    /// `None` means the payload had no content container at all, which is a
    /// different thing from an empty document.
    pub content: Option<Vec<StructuralElement>>,
}

/// One entry of the body content. Tables, section breaks and the like have no
/// `paragraph` and are skipped.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralElement {
    pub paragraph: Option<Paragraph>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paragraph {
    #[serde(default)]
    pub elements: Vec<ParagraphElement>,
    pub paragraph_style: Option<ParagraphStyle>,
    /// Present when the paragraph carries a native list marker. The marker's
    /// own properties are irrelevant here.
    pub bullet: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParagraphStyle {
    #[serde(default)]
    pub named_style_type: Option<NamedStyle>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParagraphElement {
    /// `None` for non-text elements (inline objects, page breaks, ...).
    pub text_run: Option<TextRun>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRun {
    pub content: Option<String>,
    pub text_style: Option<TextStyle>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStyle {
    pub link: Option<Link>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub url: Option<String>,
}

/// Named paragraph style. Anything other than the two styles that drive the
/// state machine is kept verbatim and treated as normal text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum NamedStyle {
    Title,
    Heading1,
    Other(String),
}

impl From<&str> for NamedStyle {
    fn from(s: &str) -> Self {
        match s {
            "TITLE" => NamedStyle::Title,
            "HEADING_1" => NamedStyle::Heading1,
            other => NamedStyle::Other(other.to_string()),
        }
    }
}

impl From<NamedStyle> for String {
    fn from(style: NamedStyle) -> Self {
        match style {
            NamedStyle::Title => "TITLE".to_string(),
            NamedStyle::Heading1 => "HEADING_1".to_string(),
            NamedStyle::Other(s) => s,
        }
    }
}

impl<'de> Deserialize<'de> for NamedStyle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(NamedStyle::from(s.as_str()))
    }
}

impl TextRun {
    /// Hyperlink target of this run, if any.
    pub fn link_url(&self) -> Option<&str> {
        self.text_style
            .as_ref()
            .and_then(|s| s.link.as_ref())
            .and_then(|l| l.url.as_deref())
    }

    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

impl Paragraph {
    pub fn named_style(&self) -> Option<&NamedStyle> {
        self.paragraph_style
            .as_ref()
            .and_then(|s| s.named_style_type.as_ref())
    }

    pub fn is_title(&self) -> bool {
        matches!(self.named_style(), Some(NamedStyle::Title))
    }

    pub fn is_heading(&self) -> bool {
        matches!(self.named_style(), Some(NamedStyle::Heading1))
    }

    pub fn has_bullet(&self) -> bool {
        self.bullet.is_some()
    }

    /// Text runs in document order, skipping non-text elements.
    pub fn runs(&self) -> impl Iterator<Item = &TextRun> {
        self.elements.iter().filter_map(|e| e.text_run.as_ref())
    }

    /// All run text concatenated and trimmed, links left as their literal text.
    pub fn raw_text(&self) -> String {
        self.runs().map(TextRun::text).collect::<String>().trim().to_string()
    }

    /// URL of the first hyperlinked run.
    pub fn first_link_url(&self) -> Option<&str> {
        self.runs().find_map(TextRun::link_url)
    }
}

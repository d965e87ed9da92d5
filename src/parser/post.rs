use serde::{Deserialize, Serialize};

use super::metadata::Metadata;

/// Source-file metadata supplied by the caller alongside the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created_time: Option<String>,
    #[serde(default)]
    pub modified_time: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub created_at: String,
    pub modified_at: String,
    pub title: String,
    pub title_image: String,
    pub excerpt: String,
    pub tags: Vec<String>,
    pub body: Vec<Section>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Section {
    pub heading: Option<String>,
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Paragraph {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        links: Option<Vec<LinkRef>>,
    },
    List {
        items: Vec<String>,
    },
    Image {
        url: String,
    },
}

/// An inline hyperlink lifted out of paragraph text; `id` matches the
/// `{linkN}` placeholder left in its place.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LinkRef {
    pub id: String,
    pub text: String,
    pub url: String,
}

impl Section {
    pub fn new(heading: Option<String>) -> Self {
        Self {
            heading,
            content: Vec::new(),
        }
    }
}

impl Post {
    /// Every image URL referenced by the post, title image first.
    pub fn image_urls(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.title_image.as_str())
            .filter(|u| !u.is_empty())
            .chain(self.body.iter().flat_map(|s| &s.content).filter_map(|b| match b {
                ContentBlock::Image { url } => Some(url.as_str()),
                _ => None,
            }))
    }
}

/// Wrap metadata and finished sections into a `Post`. Missing timestamps
/// become empty strings.
pub fn assemble(file: &DriveFile, metadata: Metadata, body: Vec<Section>) -> Post {
    Post {
        id: file.id.clone(),
        created_at: file.created_time.clone().unwrap_or_default(),
        modified_at: file.modified_time.clone().unwrap_or_default(),
        title: metadata.title.unwrap_or_default(),
        title_image: metadata.title_image.unwrap_or_default(),
        excerpt: metadata.excerpt,
        tags: metadata.tags.unwrap_or_default(),
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_in_output_contract_shape() {
        let post = Post {
            id: "abc".into(),
            title_image: "https://img".into(),
            body: vec![Section {
                heading: Some("Intro".into()),
                content: vec![
                    ContentBlock::Paragraph {
                        text: "plain".into(),
                        links: None,
                    },
                    ContentBlock::List {
                        items: vec!["a".into()],
                    },
                    ContentBlock::Image { url: "u".into() },
                ],
            }],
            ..Default::default()
        };
        let v = serde_json::to_value(&post).unwrap();
        assert_eq!(v["titleImage"], "https://img");
        assert_eq!(v["createdAt"], "");
        let content = &v["body"][0]["content"];
        assert_eq!(content[0]["type"], "paragraph");
        assert!(content[0].get("links").is_none());
        assert_eq!(content[1]["type"], "list");
        assert_eq!(content[1]["items"][0], "a");
        assert_eq!(content[2]["type"], "image");
        assert_eq!(content[2]["url"], "u");
    }

    #[test]
    fn assemble_defaults_missing_metadata() {
        let file = DriveFile {
            id: "f1".into(),
            ..Default::default()
        };
        let post = assemble(&file, Metadata::default(), Vec::new());
        assert_eq!(post.id, "f1");
        assert_eq!(post.created_at, "");
        assert_eq!(post.title, "");
        assert!(post.tags.is_empty());
        assert!(post.body.is_empty());
    }

    #[test]
    fn image_urls_skip_empty_title_image() {
        let post = Post {
            body: vec![Section {
                heading: None,
                content: vec![ContentBlock::Image { url: "a".into() }],
            }],
            ..Default::default()
        };
        assert_eq!(post.image_urls().collect::<Vec<_>>(), vec!["a"]);
    }
}

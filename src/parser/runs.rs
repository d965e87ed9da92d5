use super::document::Paragraph;
use super::post::LinkRef;

/// Plain text of a paragraph with hyperlinked runs replaced by `{linkN}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub text: String,
    /// `None` when no run carried a hyperlink.
    pub links: Option<Vec<LinkRef>>,
}

impl Extracted {
    /// True when the whole paragraph is exactly one placeholder, e.g. `{link1}`.
    pub fn single_placeholder(&self) -> Option<&LinkRef> {
        match self.links.as_deref() {
            Some([only]) if self.text == placeholder(&only.id) => Some(only),
            _ => None,
        }
    }
}

pub fn placeholder(id: &str) -> String {
    format!("{{{id}}}")
}

/// Concatenate a paragraph's runs, substituting placeholders for links.
/// Numbering starts at `link1` for every paragraph.
pub fn extract(para: &Paragraph) -> Extracted {
    let mut text = String::new();
    let mut links: Vec<LinkRef> = Vec::new();

    for run in para.runs() {
        let content = run.text();
        if content.is_empty() {
            continue;
        }
        let segment = content.strip_suffix('\n').unwrap_or(content);

        match run.link_url() {
            Some(url) => {
                let id = format!("link{}", links.len() + 1);
                text.push_str(&placeholder(&id));
                links.push(LinkRef {
                    id,
                    text: segment.trim().to_string(),
                    url: url.to_string(),
                });
            }
            None => text.push_str(segment),
        }
    }

    Extracted {
        text: text.trim().to_string(),
        links: if links.is_empty() { None } else { Some(links) },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::document::fixtures::{link, para, run};

    #[test]
    fn plain_runs_concatenate() {
        let p = para(vec![run("Hello "), run("world\n")]);
        let e = extract(&p);
        assert_eq!(e.text, "Hello world");
        assert!(e.links.is_none());
    }

    #[test]
    fn mixed_runs_substitute_placeholder() {
        let p = para(vec![
            run("See "),
            link(" the docs ", "https://x"),
            run(" for details\n"),
        ]);
        let e = extract(&p);
        assert_eq!(e.text, "See {link1} for details");
        assert_eq!(
            e.links,
            Some(vec![LinkRef {
                id: "link1".into(),
                text: "the docs".into(),
                url: "https://x".into(),
            }])
        );
        assert!(e.single_placeholder().is_none());
    }

    #[test]
    fn numbering_is_per_paragraph() {
        let p = para(vec![link("a", "https://a"), run(" and "), link("b", "https://b")]);
        let first = extract(&p);
        let second = extract(&p);
        assert_eq!(first, second);
        assert_eq!(first.text, "{link1} and {link2}");
        let ids: Vec<_> = first.links.unwrap().into_iter().map(|l| l.id).collect();
        assert_eq!(ids, vec!["link1", "link2"]);
    }

    #[test]
    fn only_one_trailing_newline_stripped() {
        let p = para(vec![run("line\n\n"), run("next")]);
        assert_eq!(extract(&p).text, "line\nnext");
    }

    #[test]
    fn lone_link_is_single_placeholder() {
        let p = para(vec![link("photo", "https://img"), run("\n")]);
        let e = extract(&p);
        assert_eq!(e.text, "{link1}");
        assert_eq!(e.single_placeholder().map(|l| l.url.as_str()), Some("https://img"));
    }
}

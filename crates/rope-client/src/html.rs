use url::Url;

use crate::error::Error;
use crate::types::Link;

/// A parsed PEP 503 simple-index page: one anchor per released artifact.
///
/// <https://peps.python.org/pep-0503/>
#[derive(Debug, Clone)]
pub struct SimplePage {
    pub links: Vec<Link>,
}

impl SimplePage {
    /// Extract the anchor links from an index page, resolving relative
    /// `href`s against the page URL. Anchors without an `href`, or with one
    /// that does not resolve, are skipped the way unparseable artifact names
    /// are.
    pub fn parse(text: &str, base: &Url) -> Result<Self, Error> {
        let dom = tl::parse(text, tl::ParserOptions::default()).map_err(|_| Error::BadHtml {
            url: base.clone(),
        })?;
        let parser = dom.parser();

        let mut links = Vec::new();
        for anchor in dom
            .query_selector("a")
            .into_iter()
            .flatten()
            .filter_map(|handle| handle.get(parser))
            .filter_map(|node| node.as_tag())
        {
            let Some(href) = anchor
                .attributes()
                .get("href")
                .flatten()
                .map(|bytes| bytes.as_utf8_str().to_string())
            else {
                continue;
            };

            let Ok(url) = base.join(&href) else {
                continue;
            };

            let Some(filename) = url
                .path_segments()
                .and_then(|segments| segments.last())
                .filter(|segment| !segment.is_empty())
                .map(ToString::to_string)
            else {
                continue;
            };

            links.push(Link { url, filename });
        }

        Ok(Self { links })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_anchors_and_resolves_relative_urls() {
        let base = Url::parse("https://pypi.org/simple/tqdm/").unwrap();
        let page = SimplePage::parse(
            r#"<!DOCTYPE html>
<html>
  <body>
    <a href="../../packages/ab/cd/tqdm-4.48.2-py2.py3-none-any.whl#sha256=deadbeef">tqdm-4.48.2-py2.py3-none-any.whl</a><br/>
    <a href="https://files.pythonhosted.org/packages/ef/01/tqdm-4.48.2.tar.gz">tqdm-4.48.2.tar.gz</a><br/>
    <a>no href</a>
  </body>
</html>"#,
            &base,
        )
        .unwrap();

        assert_eq!(page.links.len(), 2);
        assert_eq!(page.links[0].filename, "tqdm-4.48.2-py2.py3-none-any.whl");
        assert_eq!(
            page.links[0].url.as_str(),
            "https://pypi.org/packages/ab/cd/tqdm-4.48.2-py2.py3-none-any.whl#sha256=deadbeef"
        );
        assert_eq!(page.links[1].filename, "tqdm-4.48.2.tar.gz");
    }

    #[test]
    fn tolerates_truncated_pages() {
        let base = Url::parse("https://example.org/simple/foo/").unwrap();
        let page = SimplePage::parse(
            r#"<html><a href="foo-1.0.tar.gz">foo-1.0.tar.gz</a><a href="foo-2"#,
            &base,
        )
        .unwrap();
        assert!(!page.links.is_empty());
    }
}

//! Crawled pages on disk and the text pulled out of them.

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use scraper::{Html, Node, Selector};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use url::Url;
use walkdir::WalkDir;

lazy_static! {
    static ref EMPHASIS: Selector = Selector::parse("title, h1, h2, h3, b, strong").expect("valid selector");
    static ref ANCHOR: Selector = Selector::parse("a[href]").expect("valid selector");
}

/// Elements whose text never reaches the index body.
const HIDDEN: &[&str] = &["head", "title", "meta", "style", "script", "noscript", "template"];

/// One page as written by the crawler.
#[derive(Debug, Clone, Deserialize)]
pub struct CrawledPage {
    pub url: String,
    #[serde(alias = "body")]
    pub content: String,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ExtractedPage {
    /// Visible body text.
    pub text: String,
    /// Title, heading and bold text.
    pub emphasis: String,
    /// `(canonical target url, link text)` for every resolvable link.
    pub anchors: Vec<(String, String)>,
}

/// Drop the `#fragment` part of a URL.
pub fn canonical_name(url: &str) -> &str {
    match url.split_once('#') {
        Some((head, _)) => head,
        None => url,
    }
}

pub fn extract(html: &str, base_url: &str) -> ExtractedPage {
    let doc = Html::parse_document(html);

    let mut text = String::new();
    for node in doc.tree.root().descendants() {
        if let Node::Text(t) = node.value() {
            let hidden = node
                .ancestors()
                .any(|a| matches!(a.value(), Node::Element(e) if HIDDEN.contains(&e.name())));
            if !hidden {
                text.push_str(t);
                text.push(' ');
            }
        }
    }

    let emphasis = doc
        .select(&EMPHASIS)
        .map(|el| el.text().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join(" ");

    let base = Url::parse(base_url).ok();
    let mut anchors = Vec::new();
    for a in doc.select(&ANCHOR) {
        let Some(href) = a.value().attr("href") else { continue };
        let target = Url::parse(href).or_else(|e| match &base {
            Some(b) => b.join(href),
            None => Err(e),
        });
        if let Ok(mut target) = target {
            if !target.scheme().starts_with("http") {
                continue;
            }
            target.set_fragment(None);
            anchors.push((target.to_string(), a.text().collect::<Vec<_>>().join(" ")));
        }
    }

    ExtractedPage { text, emphasis, anchors }
}

/// All `.json` and `.jsonl` files under `dir`, in path order.
pub fn corpus_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| matches!(p.extension().and_then(|s| s.to_str()), Some("json" | "jsonl")))
        .collect();
    files.sort();
    files
}

/// Read the pages in one corpus file. Bad JSONL lines are skipped individually.
pub fn read_pages(file: &Path) -> Result<Vec<CrawledPage>> {
    let f = File::open(file).with_context(|| format!("opening {}", file.display()))?;
    let reader = BufReader::new(f);
    if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
        let mut pages = Vec::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<CrawledPage>(&line) {
                Ok(page) => pages.push(page),
                Err(e) => tracing::warn!(file = %file.display(), line = lineno + 1, error = %e, "skipping malformed page"),
            }
        }
        return Ok(pages);
    }
    let json: serde_json::Value =
        serde_json::from_reader(reader).with_context(|| format!("parsing {}", file.display()))?;
    match json {
        serde_json::Value::Array(arr) => Ok(arr
            .into_iter()
            .filter_map(|v| match serde_json::from_value::<CrawledPage>(v) {
                Ok(p) => Some(p),
                Err(e) => {
                    tracing::warn!(file = %file.display(), error = %e, "skipping malformed page");
                    None
                }
            })
            .collect()),
        v @ serde_json::Value::Object(_) => Ok(vec![serde_json::from_value(v)
            .with_context(|| format!("decoding page in {}", file.display()))?]),
        _ => Ok(Vec::new()),
    }
}

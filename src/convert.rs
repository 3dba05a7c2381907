use crate::config::Config;
use crate::error::{Error, Result};

/// Tags kept by the sanitizer on top of ammonia's defaults
const EXTRA_TAGS: &[&str] = &[
    "pre", "code", "blockquote", "h1", "h2", "h3", "h4", "h5", "h6", "table", "thead", "tbody",
    "tr", "th", "td", "ul", "ol", "li", "dl", "dt", "dd", "p", "br", "hr", "div", "span",
    "strong", "b", "em", "i", "u", "s", "del", "ins", "a",
];

/// Turns extracted HTML into clean Markdown
#[derive(Debug, Clone)]
pub struct Converter {
    sanitize_html: bool,
    preserve_images: bool,
    inline_styles: bool,
}

impl Converter {
    pub fn new(config: &Config) -> Self {
        Self {
            sanitize_html: config.processing.sanitize_html,
            preserve_images: config.output.preserve_images,
            inline_styles: config.output.inline_styles,
        }
    }

    /// Sanitize (if enabled) and render one page's HTML
    pub fn convert(&self, url: &str, html: &str) -> Result<String> {
        if html.trim().is_empty() {
            return Err(Error::NoContent(url.to_string()));
        }

        let cleaned = if self.sanitize_html {
            self.sanitize(html)
        } else {
            html.to_string()
        };

        let markdown = render_markdown(&cleaned);
        if markdown.trim().is_empty() {
            // Everything was stripped by the sanitizer
            return Err(Error::NoContent(url.to_string()));
        }
        Ok(markdown)
    }

    /// Allow-list filter: structural and code markup survive, scripts and
    /// event handlers never do.
    pub fn sanitize(&self, html: &str) -> String {
        let mut builder = ammonia::Builder::default();
        builder
            .add_tags(EXTRA_TAGS)
            .add_tag_attributes("a", &["href", "title"])
            .add_tag_attributes("pre", &["class"])
            .add_tag_attributes("code", &["class"])
            .link_rel(None);

        if self.preserve_images {
            builder.add_tag_attributes("img", &["src", "alt", "title", "width", "height"]);
        } else {
            builder.rm_tags(&["img"]);
        }

        if self.inline_styles {
            builder.add_generic_attributes(&["style"]);
        }

        builder.clean(html).to_string()
    }
}

/// Render HTML to Markdown and tidy the whitespace
pub fn render_markdown(html: &str) -> String {
    post_process(&html2md::parse_html(html))
}

/// Trim trailing whitespace, collapse runs of blank lines, drop trailing blanks
pub fn post_process(markdown: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();

    for line in markdown.lines() {
        let line = line.trim_end_matches([' ', '\t']);
        if line.trim().is_empty() {
            if lines.last().is_some_and(|last| !last.is_empty()) {
                lines.push("");
            }
        } else {
            lines.push(line);
        }
    }

    while lines.last().is_some_and(|last| last.is_empty()) {
        lines.pop();
    }

    lines.join("\n")
}

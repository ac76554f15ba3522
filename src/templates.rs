//! HTML and CSS fragments injected into the document.
//!
//! Two things are generated here: the block that replaces each Mermaid fence
//! in the Markdown, and the `<style>` header Pandoc includes in the page head
//! to control print layout. Keeping them together makes the printed look
//! easy to adjust and lets tests inspect the exact text that is emitted.

use crate::config::ConversionConfig;

/// HTML block spliced into the Markdown in place of a Mermaid fence.
///
/// Leading and trailing blank lines make Pandoc treat the `<div>` as a raw
/// HTML block rather than inline content of a surrounding paragraph.
pub fn diagram_block(index: usize, image_url: &str) -> String {
    format!(
        "\n<div class=\"md2pdf-diagram\" style=\"text-align:center;\">\n  \
<img src=\"{url}\" alt=\"diagram_{index}\" style=\"max-width:80%;\">\n  \
<p class=\"md2pdf-caption\">Diagram {number}</p>\n</div>\n\n",
        url = escape_attr(image_url),
        number = index + 1,
    )
}

/// Base print rules. `{size}` and `{margin}` are filled in by [`print_header`].
const PRINT_CSS: &str = r#"<style media="all">
@page {
  size: {size};
  margin: {margin}mm;
}
html {
  -webkit-print-color-adjust: exact;
  print-color-adjust: exact;
}
body {
  max-width: none;
  margin: 0;
  padding: 0;
  font-size: 11pt;
  line-height: 1.45;
}
h1, h2, h3, h4 {
  break-after: avoid;
  page-break-after: avoid;
}
pre, blockquote, table, figure, .md2pdf-diagram {
  break-inside: avoid;
  page-break-inside: avoid;
}
pre {
  white-space: pre-wrap;
  word-wrap: break-word;
}
img, svg {
  max-width: 100%;
}
.md2pdf-caption {
  font-size: 0.9em;
  color: #555;
  margin-top: 0.25em;
}
</style>
"#;

/// Contents of the file passed to Pandoc with `--include-in-header`.
pub fn print_header(config: &ConversionConfig) -> String {
    PRINT_CSS
        .replace("{size}", config.page_size.css_name())
        .replace("{margin}", &format_mm(config.margin_mm))
}

fn format_mm(mm: f32) -> String {
    if mm.fract() == 0.0 {
        format!("{}", mm as i64)
    } else {
        format!("{mm:.1}")
    }
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PageSize;

    #[test]
    fn diagram_block_has_caption_and_sizing() {
        let html = diagram_block(0, "file:///tmp/w/diagram_0.svg");
        assert!(html.contains("src=\"file:///tmp/w/diagram_0.svg\""));
        assert!(html.contains("alt=\"diagram_0\""));
        assert!(html.contains("max-width:80%"));
        assert!(html.contains("Diagram 1</p>"));
        assert!(html.starts_with('\n'));
        assert!(html.ends_with("\n\n"));
    }

    #[test]
    fn diagram_block_escapes_url() {
        let html = diagram_block(3, "file:///a\"b.svg");
        assert!(html.contains("a&quot;b.svg"));
        assert!(html.contains("Diagram 4"));
    }

    #[test]
    fn print_header_fills_layout() {
        let config = ConversionConfig::builder()
            .page_size(PageSize::Letter)
            .margin_mm(12.5)
            .build()
            .unwrap();
        let css = print_header(&config);
        assert!(css.contains("size: letter;"));
        assert!(css.contains("margin: 12.5mm;"));
        assert!(css.contains("print-color-adjust: exact"));
        assert!(!css.contains("{size}") && !css.contains("{margin}"));

        let css = print_header(&ConversionConfig::default());
        assert!(css.contains("size: A4;"));
        assert!(css.contains("margin: 15mm;"));
    }
}

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

/// Block-level pieces of a bot reply. Backend replies are short-form
/// markdown: paragraphs, lists, the odd code snippet or quote. Headings are
/// downgraded to bold paragraphs rather than rendered at display size.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyBlock {
    Paragraph(Vec<Span>),
    Bullets(Vec<Vec<Span>>),
    Numbered(Vec<Vec<Span>>),
    Code {
        language: Option<String>,
        code: String,
    },
    Quote(Vec<Span>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
    pub strikethrough: bool,
    pub code: bool,
    pub link_url: Option<String>,
}

impl Span {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bold: false,
            italic: false,
            strikethrough: false,
            code: false,
            link_url: None,
        }
    }
}

#[derive(Default)]
struct InlineStyle {
    bold: bool,
    italic: bool,
    strikethrough: bool,
    link_url: Option<String>,
    // Headings render as bold paragraph text.
    heading: bool,
}

impl InlineStyle {
    fn span(&self, text: &str, code: bool) -> Span {
        Span {
            text: text.to_string(),
            bold: self.bold || self.heading,
            italic: self.italic,
            strikethrough: self.strikethrough,
            code,
            link_url: self.link_url.clone(),
        }
    }
}

pub fn parse_reply(input: &str) -> Vec<ReplyBlock> {
    let parser = Parser::new_ext(input, Options::ENABLE_STRIKETHROUGH);

    let mut blocks: Vec<ReplyBlock> = Vec::new();
    let mut spans: Vec<Span> = Vec::new();
    let mut style = InlineStyle::default();

    let mut code_lang: Option<String> = None;
    let mut code_text = String::new();
    let mut in_code = false;

    // (ordered, items); flat lists only, nesting collapses into the parent
    let mut list: Option<(bool, Vec<Vec<Span>>)> = None;
    let mut quote_depth = 0u32;

    let mut flush =
        |spans: &mut Vec<Span>, blocks: &mut Vec<ReplyBlock>, list: &mut Option<(bool, Vec<Vec<Span>>)>, quoted: bool| {
            if spans.is_empty() {
                return;
            }
            let taken = std::mem::take(spans);
            if let Some((_, items)) = list.as_mut() {
                items.push(taken);
            } else if quoted {
                blocks.push(ReplyBlock::Quote(taken));
            } else {
                blocks.push(ReplyBlock::Paragraph(taken));
            }
        };

    for event in parser {
        match event {
            Event::Start(tag) => match tag {
                Tag::Strong => style.bold = true,
                Tag::Emphasis => style.italic = true,
                Tag::Strikethrough => style.strikethrough = true,
                Tag::Heading { .. } => style.heading = true,
                Tag::Link { dest_url, .. } => style.link_url = Some(dest_url.to_string()),
                Tag::CodeBlock(kind) => {
                    flush(&mut spans, &mut blocks, &mut list, quote_depth > 0);
                    in_code = true;
                    code_text.clear();
                    code_lang = match kind {
                        CodeBlockKind::Fenced(lang) if !lang.trim().is_empty() => {
                            Some(lang.trim().to_string())
                        }
                        _ => None,
                    };
                }
                Tag::List(start) => {
                    flush(&mut spans, &mut blocks, &mut list, quote_depth > 0);
                    if list.is_none() {
                        list = Some((start.is_some(), Vec::new()));
                    }
                }
                Tag::BlockQuote(_) => {
                    flush(&mut spans, &mut blocks, &mut list, quote_depth > 0);
                    quote_depth += 1;
                }
                _ => {}
            },
            Event::End(tag) => match tag {
                TagEnd::Strong => style.bold = false,
                TagEnd::Emphasis => style.italic = false,
                TagEnd::Strikethrough => style.strikethrough = false,
                TagEnd::Heading(_) => {
                    style.heading = false;
                    flush(&mut spans, &mut blocks, &mut list, quote_depth > 0);
                }
                TagEnd::Link => style.link_url = None,
                TagEnd::Paragraph => flush(&mut spans, &mut blocks, &mut list, quote_depth > 0),
                TagEnd::Item => flush(&mut spans, &mut blocks, &mut list, quote_depth > 0),
                TagEnd::CodeBlock => {
                    in_code = false;
                    blocks.push(ReplyBlock::Code {
                        language: code_lang.take(),
                        code: code_text.trim_end_matches('\n').to_string(),
                    });
                }
                TagEnd::List(_) => {
                    flush(&mut spans, &mut blocks, &mut list, quote_depth > 0);
                    if let Some((ordered, items)) = list.take() {
                        if ordered {
                            blocks.push(ReplyBlock::Numbered(items));
                        } else {
                            blocks.push(ReplyBlock::Bullets(items));
                        }
                    }
                }
                TagEnd::BlockQuote(_) => {
                    flush(&mut spans, &mut blocks, &mut list, quote_depth > 0);
                    quote_depth = quote_depth.saturating_sub(1);
                }
                _ => {}
            },
            Event::Text(text) => {
                if in_code {
                    code_text.push_str(&text);
                } else {
                    spans.push(style.span(&text, false));
                }
            }
            Event::Code(code) => spans.push(style.span(&code, true)),
            Event::SoftBreak => spans.push(Span::plain(" ")),
            Event::HardBreak => spans.push(Span::plain("\n")),
            _ => {}
        }
    }

    flush(&mut spans, &mut blocks, &mut list, quote_depth > 0);
    blocks
}

/// Convert inline spans to Pango markup for a gtk::Label.
pub fn spans_to_pango(spans: &[Span]) -> String {
    let mut markup = String::new();
    for span in spans {
        if let Some(url) = &span.link_url {
            markup.push_str("<a href=\"");
            markup.push_str(&glib::markup_escape_text(url));
            markup.push_str("\">");
        }
        if span.strikethrough {
            markup.push_str("<s>");
        }
        if span.italic {
            markup.push_str("<i>");
        }
        if span.bold {
            markup.push_str("<b>");
        }
        if span.code {
            markup.push_str("<tt>");
        }

        markup.push_str(&glib::markup_escape_text(&span.text));

        if span.code {
            markup.push_str("</tt>");
        }
        if span.bold {
            markup.push_str("</b>");
        }
        if span.italic {
            markup.push_str("</i>");
        }
        if span.strikethrough {
            markup.push_str("</s>");
        }
        if span.link_url.is_some() {
            markup.push_str("</a>");
        }
    }
    markup
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_one_paragraph() {
        let blocks = parse_reply("Hello there");
        assert_eq!(blocks.len(), 1);
        match &blocks[0] {
            ReplyBlock::Paragraph(spans) => {
                assert_eq!(spans[0].text, "Hello there");
                assert!(!spans[0].bold);
            }
            other => panic!("expected paragraph, got {other:?}"),
        }
    }

    #[test]
    fn emphasis_marks_spans() {
        let blocks = parse_reply("**bold** and *italic* and `code`");
        let ReplyBlock::Paragraph(spans) = &blocks[0] else {
            panic!("expected paragraph");
        };
        assert!(spans.iter().any(|s| s.bold && s.text == "bold"));
        assert!(spans.iter().any(|s| s.italic && s.text == "italic"));
        assert!(spans.iter().any(|s| s.code && s.text == "code"));
    }

    #[test]
    fn fenced_code_keeps_language() {
        let blocks = parse_reply("```python\nprint('hi')\n```");
        assert_eq!(
            blocks[0],
            ReplyBlock::Code {
                language: Some("python".to_string()),
                code: "print('hi')".to_string(),
            }
        );
    }

    #[test]
    fn lists_collect_items() {
        let blocks = parse_reply("1. first\n2. second");
        match &blocks[0] {
            ReplyBlock::Numbered(items) => {
                assert_eq!(items.len(), 2);
                assert_eq!(items[1][0].text, "second");
            }
            other => panic!("expected numbered list, got {other:?}"),
        }

        let blocks = parse_reply("- a\n- b\n- c");
        assert!(matches!(&blocks[0], ReplyBlock::Bullets(items) if items.len() == 3));
    }

    #[test]
    fn headings_become_bold_paragraphs() {
        let blocks = parse_reply("## Options\n\nPick one.");
        let ReplyBlock::Paragraph(spans) = &blocks[0] else {
            panic!("expected paragraph");
        };
        assert!(spans[0].bold);
        assert_eq!(spans[0].text, "Options");
    }

    #[test]
    fn quotes_are_tagged() {
        let blocks = parse_reply("> do the thing");
        assert!(matches!(&blocks[0], ReplyBlock::Quote(spans) if spans[0].text == "do the thing"));
    }

    #[test]
    fn pango_escapes_and_nests() {
        let spans = vec![
            Span {
                bold: true,
                ..Span::plain("a<b")
            },
            Span::plain(" & "),
        ];
        assert_eq!(spans_to_pango(&spans), "<b>a&lt;b</b> &amp; ");
    }

    #[test]
    fn links_render_as_anchors() {
        let blocks = parse_reply("see [docs](https://example.com)");
        let ReplyBlock::Paragraph(spans) = &blocks[0] else {
            panic!("expected paragraph");
        };
        let link = spans.iter().find(|s| s.link_url.is_some()).unwrap();
        assert_eq!(link.link_url.as_deref(), Some("https://example.com"));
        assert!(spans_to_pango(spans).contains("<a href=\"https://example.com\">docs</a>"));
    }
}

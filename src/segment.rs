//! Single-pass tokenizer that splits finished step HTML into the pieces the
//! ScreenSteps content model cares about.

use crate::rewrite::attr_value;

const EMBED_OPEN: &str = "<div class=\"html-embed\"";
const STYLED_OPEN: &str = "<div class=\"screensteps-styled-block\"";
const DIV_CLOSE: &str = "</div>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// Markup between recognised blocks, passed through unchanged.
    Text(&'a str),
    /// A bare `<img>` with a non-empty `src`.
    Image { src: &'a str },
    /// `screensteps-styled-block` wrapper; `inner` excludes the wrapper div.
    Styled { style: &'a str, inner: &'a str },
    /// Complete `html-embed` wrapper.
    Embed(&'a str),
}

/// Tokens in document order. Concatenating the source slices of all
/// tokens reproduces `html` exactly.
pub fn tokenize(html: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut pos = 0;

    while let Some(rel) = html[pos..].find('<') {
        let start = pos + rel;
        match recognize(html, start) {
            Some((token, end)) => {
                if text_start < start {
                    tokens.push(Token::Text(&html[text_start..start]));
                }
                tokens.push(token);
                pos = end;
                text_start = end;
            }
            None => pos = start + 1,
        }
    }

    if text_start < html.len() {
        tokens.push(Token::Text(&html[text_start..]));
    }
    tokens
}

fn recognize(html: &str, start: usize) -> Option<(Token<'_>, usize)> {
    let rest = &html[start..];

    if opens(rest, EMBED_OPEN) {
        let open_end = start + rest.find('>')? + 1;
        let (_, end) = matching_close(html, open_end)?;
        return Some((Token::Embed(&html[start..end]), end));
    }

    if opens(rest, STYLED_OPEN) {
        let open_end = start + rest.find('>')? + 1;
        let style = attr_value(&html[start..open_end], "data-style")?;
        let (inner_end, end) = matching_close(html, open_end)?;
        let inner = &html[open_end..inner_end];
        return Some((Token::Styled { style, inner }, end));
    }

    if opens(rest, "<img") {
        let end = start + rest.find('>')? + 1;
        let src = attr_value(&html[start..end], "src").filter(|s| !s.is_empty())?;
        return Some((Token::Image { src }, end));
    }

    None
}

/// `prefix` followed by whitespace, `>` or `/`.
fn opens(rest: &str, prefix: &str) -> bool {
    rest.strip_prefix(prefix)
        .and_then(|after| after.chars().next())
        .is_some_and(|c| c.is_whitespace() || c == '>' || c == '/')
}

/// Start and end of the `</div>` closing a div whose opening tag ends at
/// `from`, counting nested divs.
fn matching_close(html: &str, from: usize) -> Option<(usize, usize)> {
    let mut depth = 1usize;
    let mut pos = from;
    loop {
        let rest = &html[pos..];
        let close = rest.find(DIV_CLOSE)?;
        match rest.find("<div").filter(|&open| open < close) {
            Some(open) => {
                if opens(&rest[open..], "<div") {
                    depth += 1;
                }
                pos += open + "<div".len();
            }
            None => {
                depth -= 1;
                let close_start = pos + close;
                let close_end = close_start + DIV_CLOSE.len();
                if depth == 0 {
                    return Some((close_start, close_end));
                }
                pos = close_end;
            }
        }
    }
}

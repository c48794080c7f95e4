//! HTML fragment parsing and serialization.
//!
//! The parser understands what templates need: elements, quoted and bare
//! attributes, void elements, self-closing tags, comments (skipped), text
//! and the basic character entities. Attribute names are kept as written
//! so directive names like `:onkeydown.enter` survive untouched.

use crate::error::HtmlError;

use super::node::Node;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

/// Parse a fragment into its top-level nodes.
pub fn parse_html(src: &str) -> Result<Vec<Node>, HtmlError> {
    Parser { src, pos: 0 }.parse()
}

/// Parse a fragment and return its first top-level element.
pub fn parse_element(src: &str) -> Result<Node, HtmlError> {
    parse_html(src)?
        .into_iter()
        .find(Node::is_element)
        .ok_or(HtmlError::NoElement)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn take_while(&mut self, f: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(&f) {
            self.bump();
        }
        &self.src[start..self.pos]
    }

    fn parse(mut self) -> Result<Vec<Node>, HtmlError> {
        let mut roots = Vec::new();
        let mut open: Vec<Node> = Vec::new();

        let attach = |node: &Node, open: &[Node], roots: &mut Vec<Node>| match open.last() {
            Some(parent) => parent.append_child(node),
            None => roots.push(node.clone()),
        };

        while self.pos < self.src.len() {
            let rest = self.rest();
            if rest.starts_with("<!--") {
                let end = rest.find("-->").ok_or(HtmlError::UnterminatedComment {
                    offset: self.pos,
                })?;
                self.pos += end + 3;
            } else if rest.starts_with("</") {
                let offset = self.pos;
                self.pos += 2;
                let name = self
                    .take_while(|c| !c.is_whitespace() && c != '>')
                    .to_ascii_lowercase();
                self.skip_whitespace();
                if self.bump() != Some('>') {
                    return Err(HtmlError::UnexpectedEnd);
                }
                match open.pop() {
                    Some(top) if top.tag() == Some(name.as_str()) => {}
                    Some(top) => {
                        return Err(HtmlError::MismatchedTag {
                            expected: top.tag().unwrap_or_default().to_string(),
                            found: name,
                            offset,
                        })
                    }
                    None => {
                        return Err(HtmlError::MismatchedTag {
                            expected: String::new(),
                            found: name,
                            offset,
                        })
                    }
                }
            } else if rest.starts_with('<')
                && rest[1..].starts_with(|c: char| c.is_ascii_alphabetic())
            {
                self.pos += 1;
                let (element, self_closing) = self.open_tag()?;
                attach(&element, &open, &mut roots);
                let void = element.tag().is_some_and(is_void);
                if !self_closing && !void {
                    open.push(element);
                }
            } else {
                let start = self.pos;
                self.bump();
                while self.pos < self.src.len() {
                    let rest = self.rest();
                    if rest.starts_with("<!--")
                        || rest.starts_with("</")
                        || (rest.starts_with('<')
                            && rest[1..].starts_with(|c: char| c.is_ascii_alphabetic()))
                    {
                        break;
                    }
                    self.bump();
                }
                let text = Node::text(&decode_entities(&self.src[start..self.pos]));
                attach(&text, &open, &mut roots);
            }
        }

        match open.pop() {
            Some(unclosed) => Err(HtmlError::UnclosedTag {
                tag: unclosed.tag().unwrap_or_default().to_string(),
            }),
            None => Ok(roots),
        }
    }

    /// Parse the rest of an open tag after `<`.
    fn open_tag(&mut self) -> Result<(Node, bool), HtmlError> {
        let tag = self.take_while(|c| !c.is_whitespace() && c != '>' && c != '/');
        let element = Node::element(tag);

        loop {
            self.skip_whitespace();
            let rest = self.rest();
            if rest.starts_with("/>") {
                self.pos += 2;
                return Ok((element, true));
            }
            if rest.starts_with('>') {
                self.pos += 1;
                return Ok((element, false));
            }
            if rest.is_empty() {
                return Err(HtmlError::UnexpectedEnd);
            }

            let offset = self.pos;
            let name = self.take_while(|c| !c.is_whitespace() && c != '=' && c != '>' && c != '/');
            if name.is_empty() {
                // A stray '/' that does not close the tag.
                if self.peek() == Some('/') {
                    self.bump();
                    continue;
                }
                return Err(HtmlError::InvalidAttribute { offset });
            }
            let name = name.to_string();

            self.skip_whitespace();
            let value = if self.peek() == Some('=') {
                self.bump();
                self.skip_whitespace();
                match self.peek() {
                    Some(quote @ ('"' | '\'')) => {
                        self.bump();
                        let raw = self.take_while(|c| c != quote);
                        if self.bump() != Some(quote) {
                            return Err(HtmlError::UnexpectedEnd);
                        }
                        decode_entities(raw)
                    }
                    _ => {
                        let raw = self.take_while(|c| !c.is_whitespace() && c != '>');
                        // `value/>` ends the tag, the slash is not part of the value.
                        let raw = match raw.strip_suffix('/') {
                            Some(trimmed) if self.rest().starts_with('>') => {
                                self.pos -= 1;
                                trimmed
                            }
                            _ => raw,
                        };
                        decode_entities(raw)
                    }
                }
            } else {
                String::new()
            };
            element.set_attribute(&name, &value);
        }
    }
}

fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attribute(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

impl Node {
    /// Serialize this node and its subtree.
    pub fn outer_html(&self) -> String {
        let mut out = String::new();
        write_node(self, &mut out);
        out
    }

    /// Serialize the children.
    pub fn inner_html(&self) -> String {
        let mut out = String::new();
        for child in self.children() {
            write_node(&child, &mut out);
        }
        out
    }
}

fn write_node(node: &Node, out: &mut String) {
    let Some(tag) = node.tag() else {
        out.push_str(&escape_text(&node.text_content()));
        return;
    };

    out.push('<');
    out.push_str(tag);
    for (name, value) in node.attributes() {
        out.push(' ');
        out.push_str(&name);
        out.push_str("=\"");
        out.push_str(&escape_attribute(&value));
        out.push('"');
    }
    out.push('>');

    if is_void(tag) {
        return;
    }
    for child in node.children() {
        write_node(&child, out);
    }
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

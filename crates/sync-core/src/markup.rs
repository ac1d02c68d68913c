use thiserror::Error;

const VOID_TAGS: &[&str] = &["br", "hr", "img", "input", "wbr"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupNode {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
        children: Vec<MarkupNode>,
    },
    Text(String),
}

impl MarkupNode {
    pub fn element(tag: impl Into<String>) -> Self {
        MarkupNode::Element {
            tag: tag.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        MarkupNode::Text(text.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkupError {
    #[error("unexpected end of markup inside a tag at byte {offset}")]
    UnexpectedEof { offset: usize },
    #[error("invalid tag name at byte {offset}")]
    InvalidTagName { offset: usize },
    #[error("closing tag </{found}> at byte {offset} does not match <{expected}>")]
    MismatchedClose {
        expected: String,
        found: String,
        offset: usize,
    },
    #[error("closing tag </{tag}> at byte {offset} has no matching opening tag")]
    UnmatchedClose { tag: String, offset: usize },
    #[error("element <{tag}> is never closed")]
    Unclosed { tag: String },
}

pub fn is_void_tag(tag: &str) -> bool {
    VOID_TAGS.contains(&tag)
}

/// Parses an HTML-like fragment: elements with quoted or bare attributes,
/// self-closing tags, void tags, comments (dropped) and character references.
pub fn parse_fragment(input: &str) -> Result<Vec<MarkupNode>, MarkupError> {
    let mut parser = Parser { src: input, pos: 0 };
    // (tag, attrs, children) of every open element, outermost first.
    let mut stack: Vec<(String, Vec<(String, String)>, Vec<MarkupNode>)> = Vec::new();
    let mut roots: Vec<MarkupNode> = Vec::new();

    fn push(
        node: MarkupNode,
        stack: &mut [(String, Vec<(String, String)>, Vec<MarkupNode>)],
        roots: &mut Vec<MarkupNode>,
    ) {
        match stack.last_mut() {
            Some((_, _, children)) => children.push(node),
            None => roots.push(node),
        }
    }

    while !parser.at_end() {
        if parser.starts_with("<!--") {
            parser.skip_comment();
            continue;
        }
        if parser.starts_with("</") {
            let offset = parser.pos;
            let tag = parser.closing_tag()?;
            let Some((open, attrs, children)) = stack.pop() else {
                return Err(MarkupError::UnmatchedClose { tag, offset });
            };
            if open != tag {
                return Err(MarkupError::MismatchedClose {
                    expected: open,
                    found: tag,
                    offset,
                });
            }
            push(
                MarkupNode::Element {
                    tag: open,
                    attrs,
                    children,
                },
                &mut stack,
                &mut roots,
            );
            continue;
        }
        if parser.starts_with("<")
            && parser
                .peek_nth(1)
                .is_some_and(|c| c.is_ascii_alphabetic())
        {
            let (tag, attrs, self_closing) = parser.opening_tag()?;
            if self_closing || is_void_tag(&tag) {
                push(
                    MarkupNode::Element {
                        tag,
                        attrs,
                        children: Vec::new(),
                    },
                    &mut stack,
                    &mut roots,
                );
            } else {
                stack.push((tag, attrs, Vec::new()));
            }
            continue;
        }

        let text = parser.text();
        if !text.is_empty() {
            push(MarkupNode::Text(text), &mut stack, &mut roots);
        }
    }

    if let Some((tag, _, _)) = stack.pop() {
        return Err(MarkupError::Unclosed { tag });
    }
    Ok(roots)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn rest(&self) -> &str {
        &self.src[self.pos..]
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.rest().starts_with(prefix)
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
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

    fn skip_comment(&mut self) {
        match self.rest().find("-->") {
            Some(end) => self.pos += end + 3,
            None => self.pos = self.src.len(),
        }
    }

    fn name(&mut self) -> String {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':')
        {
            self.bump();
        }
        self.src[start..self.pos].to_ascii_lowercase()
    }

    fn closing_tag(&mut self) -> Result<String, MarkupError> {
        self.pos += 2;
        let offset = self.pos;
        let tag = self.name();
        if tag.is_empty() {
            return Err(MarkupError::InvalidTagName { offset });
        }
        self.skip_whitespace();
        match self.bump() {
            Some('>') => Ok(tag),
            _ => Err(MarkupError::UnexpectedEof { offset: self.pos }),
        }
    }

    fn opening_tag(&mut self) -> Result<(String, Vec<(String, String)>, bool), MarkupError> {
        self.pos += 1;
        let offset = self.pos;
        let tag = self.name();
        if tag.is_empty() {
            return Err(MarkupError::InvalidTagName { offset });
        }

        let mut attrs: Vec<(String, String)> = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                None => return Err(MarkupError::UnexpectedEof { offset: self.pos }),
                Some('>') => {
                    self.bump();
                    return Ok((tag, attrs, false));
                }
                Some('/') if self.peek_nth(1) == Some('>') => {
                    self.pos += 2;
                    return Ok((tag, attrs, true));
                }
                Some(_) => {
                    let name = self.name();
                    if name.is_empty() {
                        // Stray character inside a tag; skip it like browsers do.
                        self.bump();
                        continue;
                    }
                    self.skip_whitespace();
                    let value = if self.peek() == Some('=') {
                        self.bump();
                        self.skip_whitespace();
                        self.attribute_value()?
                    } else {
                        String::new()
                    };
                    // First occurrence wins.
                    if !attrs.iter().any(|(existing, _)| *existing == name) {
                        attrs.push((name, value));
                    }
                }
            }
        }
    }

    fn attribute_value(&mut self) -> Result<String, MarkupError> {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.bump();
                let start = self.pos;
                let Some(len) = self.rest().find(quote) else {
                    return Err(MarkupError::UnexpectedEof { offset: start });
                };
                let raw = &self.src[start..start + len];
                self.pos = start + len + 1;
                Ok(decode_entities(raw))
            }
            Some(_) => {
                let start = self.pos;
                while self
                    .peek()
                    .is_some_and(|c| !c.is_whitespace() && c != '>' && c != '/')
                {
                    self.bump();
                }
                Ok(decode_entities(&self.src[start..self.pos]))
            }
            None => Err(MarkupError::UnexpectedEof { offset: self.pos }),
        }
    }

    fn text(&mut self) -> String {
        let start = self.pos;
        // A '<' that does not open a tag is literal text.
        if self.peek() == Some('<') {
            self.bump();
        }
        match self.rest().find('<') {
            Some(len) => self.pos += len,
            None => self.pos = self.src.len(),
        }
        decode_entities(&self.src[start..self.pos])
    }
}

pub fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').and_then(|semi| {
            let name = &rest[1..semi];
            decode_entity(name).map(|c| (c, semi + 1))
        });
        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let digits = name.strip_prefix('#')?;
            let code = match digits.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => digits.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

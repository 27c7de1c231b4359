//! A small template engine for generated source files.
//!
//! Templates are plain text with placeholders that are filled from a
//! `Context`. Values are inserted verbatim; callers are responsible for
//! quoting them for the target language before binding.
//!
//! # Placeholder Formats
//!
//! - `$${name}` - the value bound to `name`
//! - `$${each:list}` ... `$${end}` - repeats the enclosed text once per item
//!   of `list`, with `$${item}` bound to the current item
//!
//! # Escaping
//!
//! Use `$$$` before `{` to produce a literal `$${` sequence. Single `$`
//! characters pass through unchanged.
//!
//! # Example
//!
//! ```
//! use gaia_lib::template::{Context, Template};
//!
//! let template = Template::parse("$${each:names}<$${item}>$${end}").unwrap();
//! let mut ctx = Context::default();
//! ctx.list("names", ["a", "b"]);
//! assert_eq!(template.render(&ctx).unwrap(), "<a><b>");
//! ```

use std::collections::BTreeMap;

use thiserror::Error;

const ITEM: &str = "item";

/// A segment of parsed template text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  /// Literal text.
  Literal(String),

  /// `$${name}`
  Value(String),

  /// `$${each:list}` body `$${end}`
  Each { list: String, body: Vec<Segment> },
}

/// Errors that can occur during template parsing or rendering.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
  #[error("unclosed placeholder at position {0}")]
  Unclosed(usize),

  #[error("malformed placeholder: {0}")]
  Malformed(String),

  #[error("'each' block for '{0}' is never closed")]
  UnterminatedEach(String),

  #[error("'end' at position {0} has no matching 'each'")]
  UnexpectedEnd(usize),

  #[error("no value bound to '{0}'")]
  UnboundValue(String),

  #[error("no list bound to '{0}'")]
  UnboundList(String),
}

/// Values and lists available while rendering.
#[derive(Debug, Clone, Default)]
pub struct Context {
  values: BTreeMap<String, String>,
  lists: BTreeMap<String, Vec<String>>,
}

impl Context {
  pub fn value(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
    self.values.insert(name.into(), value.into());
    self
  }

  pub fn list<I, S>(&mut self, name: impl Into<String>, items: I) -> &mut Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.lists.insert(name.into(), items.into_iter().map(Into::into).collect());
    self
  }
}

/// A parsed template, ready to render any number of times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
  segments: Vec<Segment>,
}

impl Template {
  pub fn parse(input: &str) -> Result<Self, TemplateError> {
    let mut stack: Vec<(String, Vec<Segment>)> = Vec::new();
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = input.char_indices().peekable();

    while let Some((pos, ch)) = chars.next() {
      if ch != '$' || chars.peek().map(|(_, c)| *c) != Some('$') {
        literal.push(ch);
        continue;
      }
      chars.next(); // second $

      match chars.peek().map(|(_, c)| *c) {
        Some('$') => {
          chars.next(); // third $
          if chars.peek().map(|(_, c)| *c) == Some('{') {
            chars.next();
            literal.push_str("$${");
          } else {
            literal.push_str("$$$");
          }
        }
        Some('{') => {
          chars.next();
          if !literal.is_empty() {
            segments.push(Segment::Literal(std::mem::take(&mut literal)));
          }

          let mut content = String::new();
          let mut found_close = false;
          for (_, c) in chars.by_ref() {
            if c == '}' {
              found_close = true;
              break;
            }
            content.push(c);
          }
          if !found_close {
            return Err(TemplateError::Unclosed(pos));
          }

          match parse_directive(&content)? {
            Directive::Value(name) => segments.push(Segment::Value(name)),
            Directive::Each(list) => {
              stack.push((list, std::mem::take(&mut segments)));
            }
            Directive::End => {
              let (list, outer) = stack.pop().ok_or(TemplateError::UnexpectedEnd(pos))?;
              let body = std::mem::replace(&mut segments, outer);
              segments.push(Segment::Each { list, body });
            }
          }
        }
        _ => literal.push_str("$$"),
      }
    }

    if let Some((list, _)) = stack.pop() {
      return Err(TemplateError::UnterminatedEach(list));
    }
    if !literal.is_empty() {
      segments.push(Segment::Literal(literal));
    }

    Ok(Self { segments })
  }

  pub fn segments(&self) -> &[Segment] {
    &self.segments
  }

  pub fn render(&self, ctx: &Context) -> Result<String, TemplateError> {
    let mut out = String::new();
    render_segments(&self.segments, ctx, None, &mut out)?;
    Ok(out)
  }
}

enum Directive {
  Value(String),
  Each(String),
  End,
}

fn parse_directive(content: &str) -> Result<Directive, TemplateError> {
  let valid_name = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

  if content == "end" {
    return Ok(Directive::End);
  }
  if let Some(list) = content.strip_prefix("each:") {
    if !valid_name(list) {
      return Err(TemplateError::Malformed(content.to_string()));
    }
    return Ok(Directive::Each(list.to_string()));
  }
  if !valid_name(content) {
    return Err(TemplateError::Malformed(content.to_string()));
  }
  Ok(Directive::Value(content.to_string()))
}

fn render_segments(
  segments: &[Segment],
  ctx: &Context,
  item: Option<&str>,
  out: &mut String,
) -> Result<(), TemplateError> {
  for segment in segments {
    match segment {
      Segment::Literal(text) => out.push_str(text),
      Segment::Value(name) => {
        let value = match (name.as_str(), item) {
          (ITEM, Some(item)) => item,
          _ => ctx
            .values
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| TemplateError::UnboundValue(name.clone()))?,
        };
        out.push_str(value);
      }
      Segment::Each { list, body } => {
        let items = ctx
          .lists
          .get(list)
          .ok_or_else(|| TemplateError::UnboundList(list.clone()))?;
        for item in items {
          render_segments(body, ctx, Some(item), out)?;
        }
      }
    }
  }
  Ok(())
}

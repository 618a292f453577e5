//! RefMan / RIS reference reader.
//!
//! Records are sequences of `XX  - value` lines. A record starts at `TY`
//! and ends at `ER` or at the next `TY`. Lines without a tag continue the
//! previous field. Records without a title are dropped.

use sieve_core::Article;

/// Split `XX  - value` into tag and value.
fn field_line(line: &str) -> Option<(&str, &str)> {
    let tag = line.get(..2)?;
    let mut chars = tag.chars();
    let first = chars.next()?;
    let second = chars.next()?;
    if !first.is_ascii_uppercase() || !(second.is_ascii_uppercase() || second.is_ascii_digit()) {
        return None;
    }

    let rest = line[2..].trim_start();
    let value = rest.strip_prefix('-')?;
    Some((tag, value.trim()))
}

#[derive(Default)]
struct RecordBuilder {
    article: Article,
    last_tag: Option<String>,
    touched: bool,
}

impl RecordBuilder {
    fn set(&mut self, tag: &str, value: &str) {
        self.touched = true;
        self.last_tag = Some(tag.to_string());
        if value.is_empty() {
            return;
        }

        let a = &mut self.article;
        match tag {
            "TI" | "T1" => a.title = value.to_string(),
            "AB" | "N2" => a.abstract_text = value.to_string(),
            "AU" | "A1" => append(&mut a.authors, value, "; "),
            "JO" | "JF" | "JA" => a.journal = value.to_string(),
            "PY" | "Y1" => a.year = value.trim_end_matches('/').to_string(),
            "DO" => a.doi = value.to_string(),
            "AN" => a.pmid = value.to_string(),
            _ => {}
        }
    }

    fn continue_field(&mut self, text: &str) {
        let Some(tag) = self.last_tag.clone() else {
            return;
        };
        let a = &mut self.article;
        let target = match tag.as_str() {
            "TI" | "T1" => &mut a.title,
            "AB" | "N2" => &mut a.abstract_text,
            "JO" | "JF" | "JA" => &mut a.journal,
            _ => return,
        };
        append(target, text, " ");
    }

    fn finish(self) -> Option<Article> {
        (self.touched && !self.article.title.trim().is_empty()).then_some(self.article)
    }
}

fn append(target: &mut String, value: &str, separator: &str) {
    if !target.is_empty() {
        target.push_str(separator);
    }
    target.push_str(value);
}

/// Parse every titled record in `content`.
pub fn parse(content: &str) -> Vec<Article> {
    let mut articles = Vec::new();
    let mut current = RecordBuilder::default();

    for raw in content.lines() {
        let line = raw.trim_end();
        if line.trim().is_empty() {
            continue;
        }

        match field_line(line) {
            Some(("TY", _)) => {
                articles.extend(std::mem::take(&mut current).finish());
                current.touched = true;
            }
            Some(("ER", _)) => {
                articles.extend(std::mem::take(&mut current).finish());
            }
            Some((tag, value)) => current.set(tag, value),
            None => current.continue_field(line.trim()),
        }
    }
    articles.extend(current.finish());

    tracing::debug!(records = articles.len(), "Parsed RefMan records");
    articles
}

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use serde_json::Value;

static H1: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").unwrap());
static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static JSON_LD: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());
static COMPANY: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".company, .company-name, .app-title small, .posting-headline h3").unwrap()
});

static LOCATION_INLINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Location\s*:\s*(\S.*)").unwrap());

/// Salary shapes, most specific family first.
static SALARY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\$\s?\d{2,3}(?:,\d{3})?\s*[-–]\s*\$\s?\d{2,3}(?:,\d{3})?",
        r"\$\s?\d{2,3}(?:,\d{3})?\s*(?i:per year|annually|/year)",
        r"\$\s?\d{2,3}[kK](?:\s*[-–]\s*\$\s?\d{2,3}[kK])?",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Elements whose text never counts as page content.
const NON_CONTENT: &[&str] = &["script", "style", "noscript", "template", "head", "title"];

/// How far above a "Location" label we look for the value next to it.
const LABEL_CLIMB: usize = 2;

/// Raw, untrimmed fields pulled from one posting page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedFields {
    pub title: String,
    pub company: String,
    pub location: String,
    pub salary_text: String,
    pub posted_date: String,
}

/// Best-effort field extraction. Never fails; anything not found stays empty.
pub fn extract(html: &str) -> ExtractedFields {
    let doc = Html::parse_document(html);
    let mut fields = ExtractedFields {
        title: first_text(&doc, &H1)
            .or_else(|| first_text(&doc, &TITLE))
            .unwrap_or_default(),
        ..Default::default()
    };

    fill_from_structured_data(&doc, &mut fields);

    if fields.company.is_empty() {
        fields.company = first_text(&doc, &COMPANY).unwrap_or_default();
    }

    fields.location = labelled_location(&doc)
        .or_else(|| hinted_location(&doc))
        .unwrap_or_default();

    fields.salary_text = salary_text(&rendered_text(&doc)).unwrap_or_default();

    fields
}

/// Text of the first element matching `selector`, if it has any.
fn first_text(doc: &Html, selector: &Selector) -> Option<String> {
    doc.select(selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

// ── Structured data ──

/// schema.org JSON-LD blocks only fill fields that are still empty.
fn fill_from_structured_data(doc: &Html, fields: &mut ExtractedFields) {
    for script in doc.select(&JSON_LD) {
        let raw = script.text().collect::<String>();
        let Ok(value) = serde_json::from_str::<Value>(raw.trim()) else {
            continue;
        };
        for item in json_ld_items(&value) {
            fill_if_empty(&mut fields.title, str_at(item, &["title"]));
            fill_if_empty(&mut fields.company, str_at(item, &["hiringOrganization", "name"]));
            fill_if_empty(&mut fields.posted_date, str_at(item, &["datePosted"]));
        }
    }
}

/// Flatten top-level arrays and `@graph` containers into individual objects.
fn json_ld_items(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().flat_map(json_ld_items).collect(),
        Value::Object(map) => match map.get("@graph") {
            Some(graph) => json_ld_items(graph),
            None => vec![value],
        },
        _ => Vec::new(),
    }
}

fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(value, |v, key| v.get(key))
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn fill_if_empty(slot: &mut String, candidate: Option<&str>) {
    if slot.is_empty() {
        if let Some(c) = candidate {
            *slot = c.to_string();
        }
    }
}

// ── Location ──

/// Value that follows a "Location" label: inline ("Location: Remote"), in a
/// later child of the label ("Location: <b>Remote</b>"), or as the next
/// sibling content of the label or one of its near ancestors.
fn labelled_location(doc: &Html) -> Option<String> {
    doc.root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| !NON_CONTENT.contains(&el.value().name()))
        .filter(|el| own_text(el).contains("Location"))
        .find_map(|label| {
            let own = own_text(&label);
            if let Some(caps) = LOCATION_INLINE_RE.captures(&own) {
                return Some(caps[1].to_string());
            }
            let inside = label
                .children()
                .skip_while(|c| !matches!(c.value(), Node::Text(t) if t.contains("Location")))
                .skip(1)
                .find_map(|n| node_text(n.value(), ElementRef::wrap(n)));
            if inside.is_some() {
                return inside;
            }
            let mut node = Some(*label);
            for _ in 0..=LABEL_CLIMB {
                let current = node?;
                if let Some(value) = current
                    .next_siblings()
                    .find_map(|n| node_text(n.value(), ElementRef::wrap(n))) {
                    return Some(value);
                }
                node = current.parent();
            }
            None
        })
}

/// Concatenated direct text children of an element.
fn own_text(el: &ElementRef) -> String {
    el.children()
        .filter_map(|c| match c.value() {
            Node::Text(t) => Some(&**t),
            _ => None,
        })
        .collect()
}

/// Non-empty text carried by a node next to a label, without a leading colon.
fn node_text(node: &Node, element: Option<ElementRef>) -> Option<String> {
    let text = match node {
        Node::Text(t) => t.to_string(),
        Node::Element(e) if !NON_CONTENT.contains(&e.name()) => {
            element?.text().collect::<String>()
        }
        _ => return None,
    };
    let trimmed = text.trim().trim_start_matches(':').trim_start();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Ordered checks for a text node that reads like a location.
const LOCATION_HINTS: &[fn(&str) -> bool] = &[
    |t| t.to_lowercase().contains("remote"),
    |t| t.contains("Wichita"),
    |t| t.contains("United States"),
];

/// First content text node, in document order, that matches any hint.
fn hinted_location(doc: &Html) -> Option<String> {
    content_text_nodes(doc)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .find(|t| LOCATION_HINTS.iter().any(|hint| hint(t)))
        .map(str::to_string)
}

// ── Salary ──

fn salary_text(text: &str) -> Option<String> {
    SALARY_PATTERNS
        .iter()
        .find_map(|re| re.find(text))
        .map(|m| m.as_str().trim().to_string())
}

// ── Text ──

/// Text nodes outside script/style/head, in document order.
fn content_text_nodes(doc: &Html) -> impl Iterator<Item = &str> {
    doc.root_element().descendants().filter_map(|node| match node.value() {
        Node::Text(t) => {
            let hidden = node
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|el| NON_CONTENT.contains(&el.value().name()));
            (!hidden).then_some(&**t)
        }
        _ => None,
    })
}

fn rendered_text(doc: &Html) -> String {
    content_text_nodes(doc).collect()
}

//! Embedding text construction and change detection.
//!
//! A record's fingerprint is a SHA-256 digest over a canonical,
//! field-tagged rendering of exactly the fields that feed
//! [`embedding_text`]. Two records with equal fingerprints produce the
//! same embedding input, so the batch embedder can skip them.
//!
//! # Canonical form
//!
//! Each contributing field is written as `tag:len:value\n`, or `tag:-\n`
//! when absent. The length prefix keeps `("ab", "c")` and `("a", "bc")`
//! from colliding across adjacent fields. A leading
//! `description_limit:N` line ties the digest to the truncation setting
//! used to build the text.

use std::collections::HashMap;
use std::fmt::Write as _;

use scraper::{ElementRef, Html, Node};
use sha2::{Digest, Sha256};

use crate::models::SourceRecord;

/// Default cap on cleaned description length, in characters.
pub const DEFAULT_MAX_DESCRIPTION_CHARS: usize = 1000;

/// Compute the content fingerprint of a record (64 lowercase hex chars)
/// under the default description limit.
pub fn fingerprint(record: &SourceRecord) -> String {
    fingerprint_with_limit(record, DEFAULT_MAX_DESCRIPTION_CHARS)
}

/// Fingerprint for embedding texts built with `max_description_chars`.
///
/// The limit is part of the canonical form, so changing it re-embeds
/// the whole catalog on the next run.
pub fn fingerprint_with_limit(record: &SourceRecord, max_description_chars: usize) -> String {
    let mut canonical = String::new();
    let _ = writeln!(canonical, "description_limit:{}", max_description_chars);
    push_field(&mut canonical, "title", Some(record.title.as_str()));
    push_field(&mut canonical, "description", record.description.as_deref());
    push_field(
        &mut canonical,
        "short_description",
        record.short_description.as_deref(),
    );
    push_field(&mut canonical, "sku", record.sku.as_deref());
    push_field(&mut canonical, "min_price", record.min_price.as_deref());
    push_field(&mut canonical, "max_price", record.max_price.as_deref());
    push_field(&mut canonical, "stock_status", record.stock_status.as_deref());
    push_field(&mut canonical, "tags", record.tags.as_deref());

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn push_field(out: &mut String, tag: &str, value: Option<&str>) {
    match value {
        Some(v) => {
            let _ = writeln!(out, "{}:{}:{}", tag, v.len(), v);
        }
        None => {
            let _ = writeln!(out, "{}:-", tag);
        }
    }
}

/// Return the records whose fingerprint is missing from, or differs
/// from, `stored`.
///
/// Passing `None` for `stored` means the checksum store could not be
/// read; every record is then reported as changed.
pub fn diff<'a>(
    records: &'a [SourceRecord],
    stored: Option<&HashMap<i64, String>>,
    max_description_chars: usize,
) -> Vec<(&'a SourceRecord, String)> {
    records
        .iter()
        .filter_map(|record| {
            let fp = fingerprint_with_limit(record, max_description_chars);
            let unchanged = stored
                .and_then(|s| s.get(&record.id))
                .is_some_and(|prev| *prev == fp);
            if unchanged {
                None
            } else {
                Some((record, fp))
            }
        })
        .collect()
}

/// Build the text sent to the embedding provider for one record.
///
/// Fields are pipe-joined in a fixed order; absent or blank fields are
/// omitted entirely. Descriptions are stripped of HTML markup,
/// whitespace-collapsed and truncated to `max_description_chars`.
pub fn embedding_text(record: &SourceRecord, max_description_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(7);

    let title = collapse_whitespace(&record.title);
    if !title.is_empty() {
        parts.push(title);
    }

    for desc in [&record.description, &record.short_description] {
        if let Some(d) = desc.as_deref() {
            let cleaned = truncate_chars(&clean_markup(d), max_description_chars);
            if !cleaned.is_empty() {
                parts.push(cleaned);
            }
        }
    }

    let tags = record.tag_list();
    if !tags.is_empty() {
        parts.push(format!("Tags: {}", tags.join(", ")));
    }

    if let Some(sku) = non_blank(record.sku.as_deref()) {
        parts.push(format!("SKU: {}", sku));
    }

    if let Some(price) = format_price(record.min_price.as_deref(), record.max_price.as_deref()) {
        parts.push(price);
    }

    if let Some(status) = non_blank(record.stock_status.as_deref()) {
        parts.push(format!("Stock: {}", status));
    }

    parts.join(" | ")
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn format_price(min: Option<&str>, max: Option<&str>) -> Option<String> {
    match (non_blank(min), non_blank(max)) {
        (Some(lo), Some(hi)) if lo == hi => Some(format!("Price: ${}", lo)),
        (Some(lo), Some(hi)) => Some(format!("Price: ${} - ${}", lo, hi)),
        (Some(p), None) | (None, Some(p)) => Some(format!("Price: ${}", p)),
        (None, None) => None,
    }
}

/// Elements whose text never reaches the embedding.
const HIDDEN_TAGS: &[&str] = &["script", "style", "noscript", "template", "head"];

/// Elements rendered inline; every other element separates words.
const INLINE_TAGS: &[&str] = &[
    "a", "abbr", "b", "bdi", "bdo", "cite", "code", "data", "dfn", "em", "font", "i", "kbd",
    "mark", "q", "s", "samp", "small", "span", "strong", "sub", "sup", "time", "u", "var",
];

/// Reduce an HTML fragment to its visible text, whitespace-collapsed.
///
/// Parsed with an HTML5 parser, so entities are decoded exactly once and
/// a bare `<` in prose stays text.
pub fn clean_markup(input: &str) -> String {
    let fragment = Html::parse_fragment(input);
    let mut raw = String::with_capacity(input.len());
    collect_text(fragment.root_element(), &mut raw);
    collapse_whitespace(&raw)
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Node::Text(text) = child.value() {
            out.push_str(text);
        } else if let Some(el) = ElementRef::wrap(child) {
            let name = el.value().name();
            if HIDDEN_TAGS.contains(&name) {
                continue;
            }
            let block = !INLINE_TAGS.contains(&name);
            if block {
                out.push(' ');
            }
            collect_text(el, out);
            if block {
                out.push(' ');
            }
        }
    }
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate to at most `max_chars` characters, never splitting a char.
pub fn truncate_chars(input: &str, max_chars: usize) -> String {
    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => input[..idx].trim_end().to_string(),
        None => input.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_record() -> SourceRecord {
        SourceRecord {
            id: 7,
            title: "Glock 19 Holster".into(),
            name: Some("glock-19-holster".into()),
            description: Some("<p>Kydex&nbsp;holster for <b>Glock 19</b></p>".into()),
            short_description: Some("Fits G19".into()),
            sku: Some("HL-G19".into()),
            min_price: Some("49.99".into()),
            max_price: Some("59.99".into()),
            stock_status: Some("instock".into()),
            stock_quantity: Some(12),
            tags: Some("holster, glock ,kydex".into()),
        }
    }

    #[test]
    fn test_fingerprint_is_stable_hex() {
        let r = full_record();
        let a = fingerprint(&r);
        let b = fingerprint(&r.clone());
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_changes_on_every_embedded_field() {
        let base = full_record();
        let base_fp = fingerprint(&base);

        let mutations: Vec<Box<dyn Fn(&mut SourceRecord)>> = vec![
            Box::new(|r| r.title.push('!')),
            Box::new(|r| r.description = None),
            Box::new(|r| r.short_description = Some("Fits G19 Gen5".into())),
            Box::new(|r| r.sku = Some("HL-G19X".into())),
            Box::new(|r| r.min_price = Some("39.99".into())),
            Box::new(|r| r.max_price = None),
            Box::new(|r| r.stock_status = Some("outofstock".into())),
            Box::new(|r| r.tags = Some("holster".into())),
        ];

        for (i, mutate) in mutations.iter().enumerate() {
            let mut r = base.clone();
            mutate(&mut r);
            assert_ne!(fingerprint(&r), base_fp, "mutation {} kept fingerprint", i);
        }
    }

    #[test]
    fn test_fingerprint_ignores_unrelated_metadata() {
        let base = full_record();
        let mut r = base.clone();
        r.name = Some("renamed-slug".into());
        r.stock_quantity = Some(0);
        assert_eq!(fingerprint(&r), fingerprint(&base));
    }

    #[test]
    fn test_fingerprint_field_boundaries_do_not_collide() {
        let mut a = SourceRecord::new(1, "ab");
        a.sku = Some("c".into());
        let mut b = SourceRecord::new(1, "a");
        b.sku = Some("bc".into());
        assert_ne!(fingerprint(&a), fingerprint(&b));

        let mut absent = SourceRecord::new(1, "x");
        absent.sku = None;
        let mut empty = SourceRecord::new(1, "x");
        empty.sku = Some(String::new());
        assert_ne!(fingerprint(&absent), fingerprint(&empty));
    }

    #[test]
    fn test_diff_reports_new_and_changed_only() {
        let a = SourceRecord::new(1, "Alpha");
        let b = SourceRecord::new(2, "Beta");
        let c = SourceRecord::new(3, "Gamma");
        let mut stored = HashMap::new();
        stored.insert(1, fingerprint(&a));
        stored.insert(2, "stale".to_string());

        let records = vec![a, b, c];
        let changed: Vec<i64> = diff(&records, Some(&stored), DEFAULT_MAX_DESCRIPTION_CHARS)
            .iter()
            .map(|(r, _)| r.id)
            .collect();
        assert_eq!(changed, vec![2, 3]);
    }

    #[test]
    fn test_diff_without_store_returns_everything() {
        let records = vec![SourceRecord::new(1, "Alpha"), SourceRecord::new(2, "Beta")];
        assert_eq!(diff(&records, None, DEFAULT_MAX_DESCRIPTION_CHARS).len(), 2);
    }

    #[test]
    fn test_embedding_text_full() {
        let text = embedding_text(&full_record(), DEFAULT_MAX_DESCRIPTION_CHARS);
        assert_eq!(
            text,
            "Glock 19 Holster | Kydex holster for Glock 19 | Fits G19 | \
             Tags: holster, glock, kydex | SKU: HL-G19 | Price: $49.99 - $59.99 | Stock: instock"
        );
    }

    #[test]
    fn test_embedding_text_omits_absent_fields() {
        let mut r = SourceRecord::new(1, "Fobus Paddle Holster");
        r.min_price = Some("25.00".into());
        r.max_price = Some("25.00".into());
        r.sku = Some("   ".into());
        assert_eq!(
            embedding_text(&r, DEFAULT_MAX_DESCRIPTION_CHARS),
            "Fobus Paddle Holster | Price: $25.00"
        );
    }

    #[test]
    fn test_embedding_text_truncates_description() {
        let mut r = SourceRecord::new(1, "T");
        r.description = Some("abcdefghij".into());
        assert_eq!(embedding_text(&r, 4), "T | abcd");
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn test_clean_markup() {
        assert_eq!(
            clean_markup("<ul><li>One</li><li>Two &amp; three</li></ul>"),
            "One Two & three"
        );
    }

    #[test]
    fn test_clean_markup_keeps_bare_angle_brackets() {
        assert_eq!(
            clean_markup("Fits barrels < 4.5in and > 3in"),
            "Fits barrels < 4.5in and > 3in"
        );
        assert_eq!(clean_markup("Length <4.5in"), "Length <4.5in");
    }

    #[test]
    fn test_clean_markup_decodes_entities_once() {
        assert_eq!(
            clean_markup("Vendor&#8217;s Kydex&reg; &amp;lt;b&amp;gt;"),
            "Vendor\u{2019}s Kydex\u{ae} &lt;b&gt;"
        );
    }

    #[test]
    fn test_clean_markup_drops_script_and_style() {
        assert_eq!(
            clean_markup("<style>p{color:red}</style><p>Holster</p><script>track()</script>"),
            "Holster"
        );
    }

    #[test]
    fn test_clean_markup_inline_tags_join_words() {
        assert_eq!(clean_markup("Ky<b>dex</b><br>IWB"), "Kydex IWB");
    }

    #[test]
    fn test_description_limit_changes_fingerprint() {
        let r = full_record();
        assert_eq!(fingerprint(&r), fingerprint_with_limit(&r, DEFAULT_MAX_DESCRIPTION_CHARS));
        assert_ne!(fingerprint_with_limit(&r, 200), fingerprint_with_limit(&r, 1000));

        let mut stored = HashMap::new();
        stored.insert(r.id, fingerprint(&r));
        let records = vec![r];
        assert!(diff(&records, Some(&stored), DEFAULT_MAX_DESCRIPTION_CHARS).is_empty());
        assert_eq!(diff(&records, Some(&stored), 200).len(), 1);
    }
}

//! Line-oriented extraction of (item, quantity) pairs from free-form chat text.
//!
//! The rules a line is judged by:
//! * A line without a quantity marker is not an order line. It is ignored, never reported as malformed.
//! * A note-marker line sets the order note and is excluded from item parsing.
//! * The quantity part is sanitized down to the arithmetic character set before evaluation; anything else is
//!   stripped. A quantity of zero means "not ordered" and is dropped silently. Negative, non-integral and
//!   unevaluable quantities are reported as invalid.
//! * Item names match the catalog by normalized exact key first, then by substring containment in either
//!   direction. First match in catalog order wins; the gateway returns the catalog sorted by display name, which
//!   makes that tie-break deterministic.
//!
//! The parser is pure: no I/O, no catalog mutation, and output preserves input line order.

use cog_common::helpers::normalize_key;
use log::trace;

use crate::{
    bot_types::{CatalogItem, LineError, ParsedOrder, ParsedOrderLine},
    helpers::eval_quantity,
    intent::IntentTable,
    settings::BotSettings,
};

const QTY_CHARSET: &str = "0123456789+-*/(). ";

pub fn parse_order_text(
    text: &str,
    catalog: &[CatalogItem],
    settings: &BotSettings,
    intents: &IntentTable,
) -> ParsedOrder {
    let mut result = ParsedOrder::default();
    let mut seen_content = false;
    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        // A leading "order" banner line is part of the intent, not an order line.
        if !seen_content && intents.is_order_banner(line) {
            seen_content = true;
            continue;
        }
        seen_content = true;

        if let Some(note) = match_note_line(line, &settings.note_markers) {
            result.note = note;
            continue;
        }

        let Some((name_part, qty_part)) = split_on_marker(line, &settings.quantity_markers) else {
            trace!("📝️ No quantity marker on line, ignoring: '{line}'");
            continue;
        };
        result.has_quantity_marker = true;
        let name_part = strip_bullet(&name_part);
        if name_part.is_empty() || qty_part.is_empty() {
            trace!("📝️ Empty name or quantity part, skipping line: '{line}'");
            continue;
        }

        let quantity = match parse_quantity(&qty_part) {
            Ok(0) => {
                trace!("📝️ Zero quantity, dropping line: '{line}'");
                continue;
            },
            Ok(q) => q,
            Err(()) => {
                result.lines.push(ParsedOrderLine {
                    raw_line: line.to_string(),
                    matched_item: None,
                    quantity: None,
                    error: Some(LineError::InvalidQuantity),
                });
                continue;
            },
        };

        match match_catalog_item(&name_part, catalog) {
            Some(item) => result.lines.push(ParsedOrderLine {
                raw_line: line.to_string(),
                matched_item: Some(item.clone()),
                quantity: Some(quantity),
                error: None,
            }),
            None => result.lines.push(ParsedOrderLine {
                raw_line: line.to_string(),
                matched_item: None,
                quantity: Some(quantity),
                error: Some(LineError::UnknownItem),
            }),
        }
    }
    result
}

/// Byte offset into `line` of the first case-insensitive occurrence of `marker`, together with the byte length of
/// the matched region. Comparison is done per-char so case folding never desynchronizes the offsets.
fn find_case_insensitive(line: &str, marker: &str) -> Option<(usize, usize)> {
    let marker_chars: Vec<char> = marker.chars().flat_map(char::to_lowercase).collect();
    if marker_chars.is_empty() {
        return None;
    }
    for (start, _) in line.char_indices() {
        let candidate = &line[start..];
        let mut matched = 0;
        let mut matched_bytes = 0;
        'chars: for c in candidate.chars() {
            for fc in c.to_lowercase() {
                if matched >= marker_chars.len() {
                    break;
                }
                if marker_chars[matched] == fc {
                    matched += 1;
                } else {
                    break 'chars;
                }
            }
            // A char is matched whole: if the marker ends inside a multi-char case folding (e.g. 'ß' -> "ss"),
            // the full char still counts toward the matched region.
            matched_bytes += c.len_utf8();
            if matched >= marker_chars.len() {
                break;
            }
        }
        if matched == marker_chars.len() {
            return Some((start, matched_bytes));
        }
    }
    None
}

/// Cheap pre-check used by the dispatcher to decide whether a message is an order attempt at all, without fetching
/// the catalog first.
pub fn contains_quantity_marker(text: &str, settings: &BotSettings) -> bool {
    text.lines().any(|line| split_on_marker(line.trim(), &settings.quantity_markers).is_some())
}

/// If `line` starts with one of the note markers (after an optional bullet), return the note text.
fn match_note_line(line: &str, note_markers: &[String]) -> Option<String> {
    let line = strip_bullet(line);
    for marker in note_markers {
        let marker = marker.trim();
        if marker.is_empty() {
            continue;
        }
        if let Some((0, len)) = find_case_insensitive(&line, marker) {
            let rest = line[len..].trim_start();
            return Some(strip_colon(rest).trim().to_string());
        }
    }
    None
}

/// Split a line at the first configured quantity marker. Marker order follows the configuration, matching is
/// case-insensitive, and a colon after the marker belongs to the marker.
fn split_on_marker(line: &str, markers: &[String]) -> Option<(String, String)> {
    for marker in markers {
        let marker = marker.trim();
        if marker.is_empty() {
            continue;
        }
        if let Some((idx, len)) = find_case_insensitive(line, marker) {
            let name_part = line[..idx].trim().to_string();
            let qty_part = strip_colon(line[idx + len..].trim()).trim().to_string();
            return Some((name_part, qty_part));
        }
    }
    None
}

fn strip_colon(s: &str) -> &str {
    s.strip_prefix(':').or_else(|| s.strip_prefix('：')).unwrap_or(s)
}

fn strip_bullet(s: &str) -> String {
    s.trim_start_matches(['-', '*', '•']).trim().to_string()
}

/// Sanitize and evaluate a quantity part. Characters outside the arithmetic charset are stripped rather than
/// rejected, so "3 ชิ้น" evaluates as "3". Quantities must come out as non-negative integers.
fn parse_quantity(qty_part: &str) -> Result<u32, ()> {
    let sanitized: String = qty_part.chars().filter(|c| QTY_CHARSET.contains(*c)).collect();
    let value = eval_quantity(&sanitized).map_err(|e| {
        trace!("📝️ Quantity evaluation failed for '{qty_part}': {e}");
    })?;
    if value < 0.0 || value.fract() != 0.0 || value > f64::from(u32::MAX) {
        return Err(());
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok(value as u32)
}

/// Normalized exact-key match (display name or item code), then substring containment either way. First match in
/// catalog enumeration order wins.
fn match_catalog_item<'a>(name: &str, catalog: &'a [CatalogItem]) -> Option<&'a CatalogItem> {
    let key = normalize_key(name);
    if key.is_empty() {
        return None;
    }
    if let Some(item) =
        catalog.iter().find(|i| normalize_key(&i.display_name) == key || normalize_key(&i.code) == key)
    {
        return Some(item);
    }
    catalog.iter().find(|i| {
        let item_key = normalize_key(&i.display_name);
        !item_key.is_empty() && (item_key.contains(&key) || key.contains(&item_key))
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn item(code: &str, name: &str, price: f64) -> CatalogItem {
        CatalogItem { code: code.into(), display_name: name.into(), price, image_ref: None }
    }

    fn catalog() -> Vec<CatalogItem> {
        vec![item("ITM-001", "Bye Heavy", 120.0), item("ITM-002", "Green Hug", 95.0), item("ITM-003", "Glow Skin", 150.0)]
    }

    fn parse(text: &str) -> ParsedOrder {
        let settings = BotSettings::default();
        let intents = IntentTable::from_settings(&settings);
        parse_order_text(text, &catalog(), &settings, &intents)
    }

    #[test]
    fn valid_lines_zero_quantities_and_notes() {
        let order = parse("- Green Hug qty: 3\n- Glow Skin qty: 0\n- note: less ice");
        assert_eq!(order.lines.len(), 1);
        let line = &order.lines[0];
        assert_eq!(line.matched_item.as_ref().unwrap().display_name, "Green Hug");
        assert_eq!(line.quantity, Some(3));
        assert!(line.is_valid());
        assert_eq!(order.note, "less ice");
        assert!(order.has_quantity_marker);
    }

    #[test]
    fn unknown_items_are_reported_distinctly() {
        let order = parse("- Unknown Thing qty: 2");
        assert_eq!(order.lines.len(), 1);
        assert_eq!(order.lines[0].error, Some(LineError::UnknownItem));
        assert_eq!(order.lines[0].quantity, Some(2));
        assert!(order.lines[0].matched_item.is_none());
    }

    #[test]
    fn quantity_expressions_are_evaluated() {
        let order = parse("Green Hug qty: 2+1\nGlow Skin qty: 3*2");
        assert_eq!(order.lines[0].quantity, Some(3));
        assert_eq!(order.lines[1].quantity, Some(6));
    }

    #[test]
    fn localized_markers_and_sanitization() {
        // Stray non-arithmetic characters in the qty part are stripped before evaluation
        let order = parse("- Glow Skin จำนวน: 3 ชิ้น");
        assert_eq!(order.lines[0].quantity, Some(3));
        // A qty part that sanitizes down to nothing is an invalid quantity
        let order = parse("- Green Hug จำนวน: aหก");
        assert_eq!(order.lines[0].error, Some(LineError::InvalidQuantity));
    }

    #[test]
    fn marker_ending_inside_a_case_folded_char_covers_the_whole_char() {
        // 'ß' lowercases to "ss"; a marker that ends after the first 's' must still report the full char's
        // bytes, or the name/quantity split lands inside the char.
        assert_eq!(find_case_insensitive("groß 3", "s"), Some((3, 2)));
        assert_eq!(find_case_insensitive("groß 3", "sss"), None);
    }

    #[test]
    fn marker_with_empty_quantity_is_skipped_not_invalid() {
        let order = parse("- Bye Heavy จำนวน:");
        assert!(order.lines.is_empty());
        assert!(order.has_quantity_marker);
    }

    #[test]
    fn lines_without_markers_are_not_order_lines() {
        let order = parse("hello there\nhow are you");
        assert!(order.lines.is_empty());
        assert!(!order.has_quantity_marker);
    }

    #[test]
    fn negative_and_fractional_quantities_are_invalid() {
        let order = parse("Green Hug qty: -2\nGlow Skin qty: 3/2");
        assert_eq!(order.lines.len(), 2);
        assert!(order.lines.iter().all(|l| l.error == Some(LineError::InvalidQuantity)));
    }

    #[test]
    fn banner_line_is_skipped() {
        let order = parse("Order\nGreen Hug qty: 1");
        assert_eq!(order.lines.len(), 1);
        assert!(order.lines[0].is_valid());
    }

    #[test]
    fn partial_names_match_by_containment() {
        let order = parse("- 2 green hug qty: 1\nglow qty: 2");
        assert_eq!(order.lines[0].matched_item.as_ref().unwrap().display_name, "Green Hug");
        assert_eq!(order.lines[1].matched_item.as_ref().unwrap().display_name, "Glow Skin");
    }

    #[test]
    fn item_codes_match_exactly() {
        let order = parse("ITM-003 qty: 4");
        assert_eq!(order.lines[0].matched_item.as_ref().unwrap().display_name, "Glow Skin");
    }

    #[test]
    fn output_preserves_input_order() {
        let order = parse("Glow Skin qty: 1\nBye Heavy qty: 2\nGreen Hug qty: 3");
        let names: Vec<_> =
            order.lines.iter().map(|l| l.matched_item.as_ref().unwrap().display_name.as_str()).collect();
        assert_eq!(names, vec!["Glow Skin", "Bye Heavy", "Green Hug"]);
    }
}

use crate::models::PanelRow;

/// If the whole query is an order-number lookup (`777`, `#777`, `# 777`),
/// return the digit string.
fn exact_lookup(query: &str) -> Option<&str> {
    let rest = query.strip_prefix('#').map(str::trim_start).unwrap_or(query);
    if !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()) {
        Some(rest)
    } else {
        None
    }
}

fn digits_of(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

fn row_matches_token(row: &PanelRow, token: &str) -> bool {
    let needle = token.to_lowercase();
    let fields = [
        row.customer.full_name.as_str(),
        row.customer.email.as_str(),
        row.bike.brand.as_str(),
        row.bike.model.as_str(),
        row.bike.serial_number.as_str(),
        row.order.issue_description.as_str(),
        row.order.work_done.as_str(),
        row.order.service_code.as_str(),
    ];
    if fields.iter().any(|f| contains_ci(f, &needle)) {
        return true;
    }
    if row.ticket_texts.iter().any(|t| contains_ci(t, &needle)) {
        return true;
    }
    // Phone matching is digit-normalized on both sides so "+421 905-111 222"
    // is found by "0905111" regardless of stored formatting.
    let token_digits = digits_of(token);
    !token_digits.is_empty() && digits_of(&row.customer.phone_number).contains(&token_digits)
}

/// Smart free-text filter over the currently visible panel rows.
///
/// A pure-digit query (optionally prefixed with `#`) is an exact lookup by
/// order id or code substring and short-circuits the token scan. Anything
/// else is split on whitespace; a row must match every token in at least one
/// of its text fields. Each row appears at most once in the result.
pub fn smart_search(rows: Vec<PanelRow>, query: &str) -> Vec<PanelRow> {
    let q = query.trim();
    if q.is_empty() {
        return rows;
    }

    if let Some(code) = exact_lookup(q) {
        let id: Option<i64> = code.parse().ok();
        return rows
            .into_iter()
            .filter(|row| id == Some(row.order.id) || row.order.service_code.contains(code))
            .collect();
    }

    let tokens: Vec<&str> = q.split_whitespace().collect();
    rows.into_iter()
        .filter(|row| tokens.iter().all(|t| row_matches_token(row, t)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checklist::Checklist;
    use crate::models::{Bike, CustomerProfile, OrderStatus, ServiceOrder};
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn row(id: i64, code: &str, name: &str, phone: &str, issue: &str, tickets: Vec<&str>) -> PanelRow {
        let now = Utc::now();
        PanelRow {
            order: ServiceOrder {
                id,
                bike_id: id,
                service_code: code.into(),
                issue_description: issue.into(),
                work_done: String::new(),
                status: OrderStatus::New,
                price: Decimal::ZERO,
                promised_date: None,
                checklist: Checklist::default(),
                created_at: now,
                completed_at: None,
            },
            bike: Bike {
                id,
                customer_id: id,
                brand: "Canyon".into(),
                model: "Spectral".into(),
                serial_number: format!("SN-{id}"),
                created_at: now,
            },
            customer: CustomerProfile {
                id,
                user_sub: None,
                full_name: name.into(),
                email: format!("c{id}@example.com"),
                phone_number: phone.into(),
                created_at: now,
            },
            ticket_texts: tickets.into_iter().map(String::from).collect(),
            has_waiting_ticket: false,
        }
    }

    #[test]
    fn empty_query_returns_input_unchanged() {
        let rows = vec![row(1, "", "Jana", "", "", vec![])];
        assert_eq!(smart_search(rows, "   ").len(), 1);
    }

    #[test]
    fn hash_number_is_an_exact_lookup_not_a_token_scan() {
        let rows = vec![
            row(1, "ABC-777", "Jana", "", "", vec![]),
            // free text mentions 777 but must not match the exact branch
            row(2, "XYZ-1", "Peter", "", "spoke tension 777", vec![]),
        ];
        let hits = smart_search(rows, "#777");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].order.id, 1);
    }

    #[test]
    fn exact_lookup_matches_numeric_id_too() {
        let rows = vec![row(42, "", "Jana", "", "", vec![])];
        let hits = smart_search(rows, "# 42");
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn multi_token_query_requires_all_tokens() {
        let rows = vec![
            row(1, "", "Jana Kovacova", "", "", vec![]),
            row(2, "", "Jana Novak", "", "", vec![]),
        ];
        let hits = smart_search(rows, "jana kovacova");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].order.id, 1);
    }

    #[test]
    fn tokens_match_across_different_fields() {
        let rows = vec![row(1, "", "Jana", "", "creaking bottom bracket", vec![])];
        assert_eq!(smart_search(rows.clone(), "jana creaking").len(), 1);
        assert_eq!(smart_search(rows, "jana silent").len(), 0);
    }

    #[test]
    fn phone_match_ignores_punctuation_on_both_sides() {
        let rows = vec![row(1, "", "Jana", "+421 905-111 222", "", vec![])];
        assert_eq!(smart_search(rows.clone(), "905-111").len(), 1);
        assert_eq!(smart_search(rows, "906").len(), 0);
    }

    #[test]
    fn ticket_text_is_searched() {
        let rows = vec![row(1, "", "Jana", "", "", vec!["wheel still rubbing"])];
        assert_eq!(smart_search(rows.clone(), "rubbing").len(), 1);
        assert_eq!(smart_search(rows, "refund").len(), 0);
    }

    #[test]
    fn each_order_appears_once_despite_multiple_ticket_hits() {
        let rows = vec![row(1, "", "Jana", "", "", vec!["brakes", "brakes again"])];
        assert_eq!(smart_search(rows, "brakes").len(), 1);
    }
}

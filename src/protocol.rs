use chrono::Utc;

use crate::models::OrderContext;

/// Display fields of a service protocol, ready for rendering. Assembling this
/// is the only place the renderer touches domain types; the renderer itself is
/// purely presentational.
#[derive(Debug, Clone)]
pub struct ProtocolData {
    pub order_code: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub bike_name: String,
    pub serial_number: String,
    pub status_label: String,
    pub created_at: String,
    pub promised_date: String,
    pub completed_at: String,
    pub price: String,
    pub issue_description: String,
    pub work_done: String,
    /// (label, done) in checklist order.
    pub checklist_items: Vec<(String, bool)>,
}

impl ProtocolData {
    pub fn from_context(ctx: &OrderContext) -> Self {
        let order = &ctx.order;
        Self {
            order_code: order.code(),
            customer_name: ctx.customer.display_name().to_string(),
            customer_email: ctx.customer.email.clone(),
            customer_phone: ctx.customer.phone_number.clone(),
            bike_name: ctx.bike.display_name(),
            serial_number: ctx.bike.serial_number.clone(),
            status_label: order.status.label().to_string(),
            created_at: order.created_at.format("%d.%m.%Y %H:%M").to_string(),
            promised_date: order
                .promised_date
                .map(|d| d.format("%d.%m.%Y").to_string())
                .unwrap_or_default(),
            completed_at: order
                .completed_at
                .map(|t| t.format("%d.%m.%Y %H:%M").to_string())
                .unwrap_or_default(),
            price: format!("{} €", order.price),
            issue_description: order.issue_description.clone(),
            work_done: order.work_done.clone(),
            checklist_items: crate::checklist::ChecklistItem::ALL
                .iter()
                .map(|item| (item.label().to_string(), order.checklist.get(*item)))
                .collect(),
        }
    }
}

/// Renders a printable protocol document as a byte stream. External
/// collaborator seam: a PDF engine can be dropped in without touching the
/// lifecycle code.
pub trait ProtocolRenderer: Send + Sync {
    fn render(&self, data: &ProtocolData) -> Vec<u8>;
    fn content_type(&self) -> &'static str;
    fn file_extension(&self) -> &'static str;
}

/// Built-in plain-text renderer.
pub struct TextProtocolRenderer;

impl ProtocolRenderer for TextProtocolRenderer {
    fn render(&self, d: &ProtocolData) -> Vec<u8> {
        let mut out = String::new();
        out.push_str(&format!("SERVICE PROTOCOL #{}\n", d.order_code));
        out.push_str(&format!("Generated {}\n", Utc::now().format("%d.%m.%Y %H:%M")));
        out.push_str("\n== Customer ==\n");
        out.push_str(&format!("Name:  {}\n", d.customer_name));
        out.push_str(&format!("Email: {}\n", d.customer_email));
        out.push_str(&format!("Phone: {}\n", d.customer_phone));
        out.push_str("\n== Bike ==\n");
        out.push_str(&format!("Bike:   {}\n", d.bike_name));
        out.push_str(&format!("Serial: {}\n", d.serial_number));
        out.push_str("\n== Order ==\n");
        out.push_str(&format!("Status:    {}\n", d.status_label));
        out.push_str(&format!("Created:   {}\n", d.created_at));
        if !d.promised_date.is_empty() {
            out.push_str(&format!("Promised:  {}\n", d.promised_date));
        }
        if !d.completed_at.is_empty() {
            out.push_str(&format!("Completed: {}\n", d.completed_at));
        }
        out.push_str(&format!("Price:     {}\n", d.price));
        out.push_str("\n== Reported issue ==\n");
        out.push_str(&d.issue_description);
        out.push_str("\n\n== Work done ==\n");
        out.push_str(&d.work_done);
        out.push_str("\n\n== Checklist ==\n");
        for (label, done) in &d.checklist_items {
            out.push_str(&format!("[{}] {}\n", if *done { "x" } else { " " }, label));
        }
        out.into_bytes()
    }

    fn content_type(&self) -> &'static str {
        "text/plain; charset=utf-8"
    }

    fn file_extension(&self) -> &'static str {
        "txt"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_renderer_includes_all_display_fields() {
        let data = ProtocolData {
            order_code: "ABC-7".into(),
            customer_name: "Jana Kovacova".into(),
            customer_email: "jana@example.com".into(),
            customer_phone: "0905 111 222".into(),
            bike_name: "Canyon Spectral".into(),
            serial_number: "SN-1".into(),
            status_label: "Done".into(),
            created_at: "01.06.2025 09:00".into(),
            promised_date: "05.06.2025".into(),
            completed_at: "04.06.2025 16:30".into(),
            price: "69.00 €".into(),
            issue_description: "creaking".into(),
            work_done: "full service".into(),
            checklist_items: vec![("Brakes".into(), true), ("Cleaning".into(), false)],
        };
        let text = String::from_utf8(TextProtocolRenderer.render(&data)).unwrap();
        assert!(text.contains("SERVICE PROTOCOL #ABC-7"));
        assert!(text.contains("Jana Kovacova"));
        assert!(text.contains("[x] Brakes"));
        assert!(text.contains("[ ] Cleaning"));
        assert!(text.contains("69.00 €"));
    }
}

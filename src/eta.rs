use chrono::NaiveDate;
use serde::Serialize;
use utoipa::ToSchema;

/// Chip color shown next to the due date in the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EtaSeverity {
    Gray,
    Blue,
    Orange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct EtaMeta {
    pub label: String,
    pub severity: EtaSeverity,
    pub warn: bool,
}

impl EtaMeta {
    fn new(label: String, severity: EtaSeverity, warn: bool) -> Self {
        Self { label, severity, warn }
    }
}

fn fmt(date: NaiveDate) -> String {
    date.format("%d.%m.%Y").to_string()
}

/// Classify an order's promised date against `today` for display.
///
/// Completed orders are always informational: history never alarms. For open
/// orders the promised date escalates from gray (far out) through blue (due
/// soon) to orange (overdue), with `warn` set for today/tomorrow/late.
pub fn classify(promised: Option<NaiveDate>, completed: bool, today: NaiveDate) -> EtaMeta {
    let Some(promised) = promised else {
        return EtaMeta::new("No due date".into(), EtaSeverity::Gray, false);
    };

    if completed {
        return EtaMeta::new(fmt(promised), EtaSeverity::Gray, false);
    }

    if today > promised {
        return EtaMeta::new(format!("Late {}", fmt(promised)), EtaSeverity::Orange, true);
    }

    if today == promised {
        return EtaMeta::new(format!("Today {}", fmt(promised)), EtaSeverity::Blue, true);
    }

    let delta = (promised - today).num_days();
    if delta == 1 {
        return EtaMeta::new(format!("Tomorrow {}", fmt(promised)), EtaSeverity::Blue, true);
    }
    if delta <= 2 {
        return EtaMeta::new(format!("On time {}", fmt(promised)), EtaSeverity::Blue, false);
    }

    EtaMeta::new(fmt(promised), EtaSeverity::Gray, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn no_promised_date_is_quiet() {
        let meta = classify(None, false, d(2025, 6, 10));
        assert_eq!(meta.label, "No due date");
        assert_eq!(meta.severity, EtaSeverity::Gray);
        assert!(!meta.warn);
    }

    #[test]
    fn completed_orders_never_warn_even_when_late() {
        let meta = classify(Some(d(2025, 6, 1)), true, d(2025, 6, 10));
        assert_eq!(meta.label, "01.06.2025");
        assert_eq!(meta.severity, EtaSeverity::Gray);
        assert!(!meta.warn);
    }

    #[test]
    fn overdue_is_orange_and_warns() {
        let meta = classify(Some(d(2025, 6, 1)), false, d(2025, 6, 10));
        assert_eq!(meta.label, "Late 01.06.2025");
        assert_eq!(meta.severity, EtaSeverity::Orange);
        assert!(meta.warn);
    }

    #[test]
    fn due_today_and_tomorrow_warn_blue() {
        let today = d(2025, 6, 10);
        let m = classify(Some(today), false, today);
        assert_eq!(m.label, "Today 10.06.2025");
        assert_eq!(m.severity, EtaSeverity::Blue);
        assert!(m.warn);

        let m = classify(Some(d(2025, 6, 11)), false, today);
        assert_eq!(m.label, "Tomorrow 11.06.2025");
        assert!(m.warn);
    }

    #[test]
    fn two_days_out_is_on_time_without_warning() {
        let m = classify(Some(d(2025, 6, 12)), false, d(2025, 6, 10));
        assert_eq!(m.label, "On time 12.06.2025");
        assert_eq!(m.severity, EtaSeverity::Blue);
        assert!(!m.warn);
    }

    #[test]
    fn far_future_is_plain_gray() {
        let m = classify(Some(d(2025, 7, 1)), false, d(2025, 6, 10));
        assert_eq!(m.label, "01.07.2025");
        assert_eq!(m.severity, EtaSeverity::Gray);
        assert!(!m.warn);
    }
}

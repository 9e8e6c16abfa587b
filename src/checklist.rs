use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The closed set of inspection items on the workshop checklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecklistItem {
    Brakes,
    Shifting,
    TyrePressure,
    Bearings,
    Torque,
    Chain,
    Wheels,
    Cleaning,
}

impl ChecklistItem {
    pub const ALL: [ChecklistItem; 8] = [
        ChecklistItem::Brakes,
        ChecklistItem::Shifting,
        ChecklistItem::TyrePressure,
        ChecklistItem::Bearings,
        ChecklistItem::Torque,
        ChecklistItem::Chain,
        ChecklistItem::Wheels,
        ChecklistItem::Cleaning,
    ];

    /// Stable key used in forms and in the stored JSON object.
    pub fn key(&self) -> &'static str {
        match self {
            ChecklistItem::Brakes => "brakes",
            ChecklistItem::Shifting => "shifting",
            ChecklistItem::TyrePressure => "tyre_pressure",
            ChecklistItem::Bearings => "bearings",
            ChecklistItem::Torque => "torque",
            ChecklistItem::Chain => "chain",
            ChecklistItem::Wheels => "wheels",
            ChecklistItem::Cleaning => "cleaning",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ChecklistItem::Brakes => "Brakes",
            ChecklistItem::Shifting => "Shifting",
            ChecklistItem::TyrePressure => "Tyre pressure",
            ChecklistItem::Bearings => "Bearings",
            ChecklistItem::Torque => "Bolt torque",
            ChecklistItem::Chain => "Chain and drivetrain",
            ChecklistItem::Wheels => "Wheels and spokes",
            ChecklistItem::Cleaning => "Cleaning",
        }
    }
}

/// Done/not-done state for every checklist item. A fixed record instead of an
/// open map: the item set is closed, so missing keys deserialize to false and
/// unknown keys are rejected at the type level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct Checklist {
    pub brakes: bool,
    pub shifting: bool,
    pub tyre_pressure: bool,
    pub bearings: bool,
    pub torque: bool,
    pub chain: bool,
    pub wheels: bool,
    pub cleaning: bool,
}

impl Checklist {
    pub fn get(&self, item: ChecklistItem) -> bool {
        match item {
            ChecklistItem::Brakes => self.brakes,
            ChecklistItem::Shifting => self.shifting,
            ChecklistItem::TyrePressure => self.tyre_pressure,
            ChecklistItem::Bearings => self.bearings,
            ChecklistItem::Torque => self.torque,
            ChecklistItem::Chain => self.chain,
            ChecklistItem::Wheels => self.wheels,
            ChecklistItem::Cleaning => self.cleaning,
        }
    }

    pub fn set(&mut self, item: ChecklistItem, done: bool) {
        match item {
            ChecklistItem::Brakes => self.brakes = done,
            ChecklistItem::Shifting => self.shifting = done,
            ChecklistItem::TyrePressure => self.tyre_pressure = done,
            ChecklistItem::Bearings => self.bearings = done,
            ChecklistItem::Torque => self.torque = done,
            ChecklistItem::Chain => self.chain = done,
            ChecklistItem::Wheels => self.wheels = done,
            ChecklistItem::Cleaning => self.cleaning = done,
        }
    }

    /// Checklist with exactly `done` set to true and everything else false.
    pub fn from_items(done: &[ChecklistItem]) -> Self {
        let mut cl = Checklist::default();
        for item in done {
            cl.set(*item, true);
        }
        cl
    }

    /// Labels of completed items, in checklist order.
    pub fn done_labels(&self) -> Vec<&'static str> {
        ChecklistItem::ALL
            .iter()
            .filter(|item| self.get(**item))
            .map(|item| item.label())
            .collect()
    }

    /// Multi-line "OK: <item>" summary used in customer emails; a fixed
    /// placeholder when nothing is ticked.
    pub fn summary_text(&self) -> String {
        let lines: Vec<String> = self.done_labels().iter().map(|l| format!("OK: {l}")).collect();
        if lines.is_empty() {
            "Checklist was not filled in.".to_string()
        } else {
            lines.join("\n")
        }
    }
}

/// A predefined bundle of price + work description + checklist subset,
/// applied atomically to an order.
#[derive(Debug, Clone)]
pub struct ServicePackage {
    pub key: &'static str,
    pub label: &'static str,
    pub price: Decimal,
    pub work_done: &'static str,
    pub checklist_items: &'static [ChecklistItem],
}

static SERVICE_PACKAGES: Lazy<Vec<ServicePackage>> = Lazy::new(|| {
    vec![
        ServicePackage {
            key: "basic",
            label: "Basic service",
            price: Decimal::new(2900, 2),
            work_done: "Basic bike check, tyres inflated, brakes and shifting checked.",
            checklist_items: &[
                ChecklistItem::Brakes,
                ChecklistItem::Shifting,
                ChecklistItem::TyrePressure,
                ChecklistItem::Torque,
            ],
        },
        ServicePackage {
            key: "full",
            label: "Full service",
            price: Decimal::new(6900, 2),
            work_done: "Complete service of drivetrain, brakes, shifting and bearings, finished with a full clean.",
            checklist_items: &ChecklistItem::ALL,
        },
        ServicePackage {
            key: "brake_setup",
            label: "Brake setup",
            price: Decimal::new(3900, 2),
            work_done: "Brake adjustment, rotor truing, pad wear check and function test.",
            checklist_items: &[ChecklistItem::Brakes, ChecklistItem::Torque, ChecklistItem::Wheels],
        },
    ]
});

pub fn service_packages() -> &'static [ServicePackage] {
    &SERVICE_PACKAGES
}

pub fn find_package(key: &str) -> Option<&'static ServicePackage> {
    SERVICE_PACKAGES.iter().find(|p| p.key == key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_items_sets_exactly_the_subset() {
        let cl = Checklist::from_items(&[ChecklistItem::Brakes, ChecklistItem::Wheels]);
        assert!(cl.brakes);
        assert!(cl.wheels);
        assert!(!cl.shifting);
        assert!(!cl.cleaning);
    }

    #[test]
    fn checklist_roundtrips_as_json_object() {
        let cl = Checklist::from_items(&[ChecklistItem::TyrePressure]);
        let v = serde_json::to_value(cl).unwrap();
        assert_eq!(v["tyre_pressure"], true);
        assert_eq!(v["brakes"], false);
        // missing keys default to false
        let partial: Checklist = serde_json::from_value(serde_json::json!({"chain": true})).unwrap();
        assert!(partial.chain);
        assert!(!partial.brakes);
    }

    #[test]
    fn known_packages_exist() {
        assert!(find_package("basic").is_some());
        assert!(find_package("full").is_some());
        assert!(find_package("brake_setup").is_some());
        assert!(find_package("platinum").is_none());
        assert_eq!(find_package("basic").unwrap().price, Decimal::new(2900, 2));
    }

    #[test]
    fn summary_text_lists_done_items_or_placeholder() {
        assert_eq!(Checklist::default().summary_text(), "Checklist was not filled in.");
        let cl = Checklist::from_items(&[ChecklistItem::Brakes]);
        assert_eq!(cl.summary_text(), "OK: Brakes");
    }
}

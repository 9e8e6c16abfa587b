use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::checklist::Checklist;

// Always i64, matching Postgres BIGSERIAL keys.
pub type Id = i64;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct CustomerProfile {
    pub id: Id,
    /// Login identity this profile is linked to, when the customer uses the portal.
    pub user_sub: Option<String>,
    pub full_name: String,
    pub email: String, // natural key for dedup, stored lowercase
    pub phone_number: String,
    pub created_at: DateTime<Utc>,
}

impl CustomerProfile {
    pub fn display_name(&self) -> &str {
        if self.full_name.is_empty() { &self.email } else { &self.full_name }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewCustomer {
    pub full_name: String,
    pub email: String,
    pub phone_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Bike {
    pub id: Id,
    pub customer_id: Id,
    pub brand: String,
    pub model: String,
    pub serial_number: String,
    pub created_at: DateTime<Utc>,
}

impl Bike {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.brand, self.model).trim().to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewBike {
    pub customer_id: Id,
    pub brand: String,
    pub model: String,
    pub serial_number: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "order_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    InProgress,
    WaitingPart,
    Ready,
    Done,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::New,
        OrderStatus::InProgress,
        OrderStatus::WaitingPart,
        OrderStatus::Ready,
        OrderStatus::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::InProgress => "IN_PROGRESS",
            OrderStatus::WaitingPart => "WAITING_PART",
            OrderStatus::Ready => "READY",
            OrderStatus::Done => "DONE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.as_str() == value)
    }

    pub fn label(&self) -> &'static str {
        match self {
            OrderStatus::New => "New",
            OrderStatus::InProgress => "In progress",
            OrderStatus::WaitingPart => "Waiting for part",
            OrderStatus::Ready => "Ready for pickup",
            OrderStatus::Done => "Done",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct ServiceOrder {
    pub id: Id,
    pub bike_id: Id,
    pub service_code: String,
    pub issue_description: String,
    pub work_done: String,
    pub status: OrderStatus,
    #[schema(value_type = String)]
    pub price: Decimal,
    pub promised_date: Option<NaiveDate>,
    #[sqlx(json)]
    pub checklist: Checklist,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ServiceOrder {
    /// Human-readable code; falls back to the numeric id like the order slips do.
    pub fn code(&self) -> String {
        if self.service_code.is_empty() { self.id.to_string() } else { self.service_code.clone() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewOrder {
    pub bike_id: Id,
    pub issue_description: String,
    #[serde(default)]
    pub service_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct ServiceOrderPhoto {
    pub id: Id,
    pub order_id: Id,
    pub hash: String,
    pub mime: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "ticket_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Open,
    WaitingAdmin,
    WaitingCustomer,
    Closed,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 4] = [
        TicketStatus::Open,
        TicketStatus::WaitingAdmin,
        TicketStatus::WaitingCustomer,
        TicketStatus::Closed,
    ];

    /// Statuses that count towards the staff backlog.
    pub const WAITING_ON_STAFF: [TicketStatus; 2] =
        [TicketStatus::Open, TicketStatus::WaitingAdmin];

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "OPEN",
            TicketStatus::WaitingAdmin => "WAITING_ADMIN",
            TicketStatus::WaitingCustomer => "WAITING_CUSTOMER",
            TicketStatus::Closed => "CLOSED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.as_str() == value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Ticket {
    pub id: Id,
    pub order_id: Id,
    pub status: TicketStatus,
    pub subject: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "message_role", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageRole {
    Customer,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct TicketMessage {
    pub id: Id,
    pub ticket_id: Id,
    pub role: MessageRole,
    /// Nullable so system-authored messages stay attributable.
    pub author_sub: Option<String>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "log_kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogKind {
    Sms,
    EmailInvite,
    EmailProtocol,
    EmailDone,
}

/// Append-only audit trail row; never mutated after insertion.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct ServiceOrderLog {
    pub id: Id,
    pub order_id: Id,
    pub kind: LogKind,
    pub body: String,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Order joined with its bike and owner, as the staff panel consumes it.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderContext {
    pub order: ServiceOrder,
    pub bike: Bike,
    pub customer: CustomerProfile,
}

/// One staff-panel row: the joined context plus the ticket-derived fields the
/// smart search and the backlog badge need.
#[derive(Debug, Clone)]
pub struct PanelRow {
    pub order: ServiceOrder,
    pub bike: Bike,
    pub customer: CustomerProfile,
    /// Ticket subjects, ticket bodies and ticket-message bodies, flattened.
    pub ticket_texts: Vec<String>,
    pub has_waiting_ticket: bool,
}

/// Which slice of orders the panel shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelTab {
    Active,
    Completed,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PanelFilter {
    pub tab: Option<PanelTab>,
    pub status: Option<OrderStatus>,
    /// Restrict to orders completed on this day.
    pub done_on: Option<NaiveDate>,
    /// Restrict to orders with a ticket waiting on staff.
    pub waiting_tickets_only: bool,
}

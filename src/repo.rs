use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::checklist::Checklist;
use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")]
    NotFound,
    #[error("conflict")]
    Conflict,
    #[error("internal: {0}")]
    Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Field-wise changes to a service order. `status` always travels together
/// with the matching `completed_at` so the DONE ⟺ completed_at invariant is
/// written in one transactional statement, never in two steps.
#[derive(Debug, Clone, Default)]
pub struct OrderChanges {
    pub status: Option<(OrderStatus, Option<DateTime<Utc>>)>,
    pub price: Option<Decimal>,
    pub issue_description: Option<String>,
    pub work_done: Option<String>,
    /// `Some(None)` clears the promised date.
    pub promised_date: Option<Option<NaiveDate>>,
    pub checklist: Option<Checklist>,
}

/// Staff ticket list row with enough joined context for display and filtering.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TicketOverview {
    pub ticket: Ticket,
    pub order_id: Id,
    pub order_code: String,
    pub customer_name: String,
    pub customer_email: String,
}

#[async_trait]
pub trait CustomerRepo: Send + Sync {
    async fn create_customer(&self, new: NewCustomer) -> RepoResult<CustomerProfile>;
    async fn get_customer(&self, id: Id) -> RepoResult<CustomerProfile>;
    async fn update_customer_contact(
        &self,
        id: Id,
        full_name: String,
        phone_number: String,
    ) -> RepoResult<CustomerProfile>;
    async fn link_customer_user(&self, id: Id, user_sub: &str) -> RepoResult<CustomerProfile>;
    /// Case-insensitive email lookup; email is the dedup key.
    async fn find_customer_by_email(&self, email: &str) -> RepoResult<Option<CustomerProfile>>;
    async fn find_customer_by_phone(&self, phone: &str) -> RepoResult<Option<CustomerProfile>>;
    async fn find_customer_by_user(&self, user_sub: &str) -> RepoResult<Option<CustomerProfile>>;
    async fn list_customers(&self) -> RepoResult<Vec<CustomerProfile>>;
}

#[async_trait]
pub trait BikeRepo: Send + Sync {
    async fn create_bike(&self, new: NewBike) -> RepoResult<Bike>;
    async fn get_bike(&self, id: Id) -> RepoResult<Bike>;
    async fn bikes_for_customer(&self, customer_id: Id) -> RepoResult<Vec<Bike>>;
}

#[async_trait]
pub trait OrderRepo: Send + Sync {
    async fn create_order(&self, new: NewOrder) -> RepoResult<ServiceOrder>;
    async fn get_order(&self, id: Id) -> RepoResult<ServiceOrder>;
    async fn get_order_context(&self, id: Id) -> RepoResult<OrderContext>;
    async fn update_order(&self, id: Id, changes: OrderChanges) -> RepoResult<ServiceOrder>;
    /// Panel rows matching the filter, newest first, with flattened ticket
    /// texts for the smart search.
    async fn panel_rows(&self, filter: PanelFilter) -> RepoResult<Vec<PanelRow>>;
    async fn orders_for_customer(&self, customer_id: Id) -> RepoResult<Vec<ServiceOrder>>;
    async fn latest_order_for_bike(&self, bike_id: Id) -> RepoResult<Option<ServiceOrder>>;
    /// Sum of prices over the customer's completed orders.
    async fn total_paid_for_customer(&self, customer_id: Id) -> RepoResult<Decimal>;
    async fn count_unfinished_with_status(&self, status: OrderStatus) -> RepoResult<i64>;
    async fn count_completed_on(&self, day: NaiveDate) -> RepoResult<i64>;
    async fn count_not_done(&self) -> RepoResult<i64>;
    async fn count_completed_since(&self, day: NaiveDate) -> RepoResult<i64>;
    /// (created_at, completed_at) of the most recently completed orders.
    async fn recent_completed_spans(
        &self,
        limit: i64,
    ) -> RepoResult<Vec<(DateTime<Utc>, DateTime<Utc>)>>;
}

#[async_trait]
pub trait TicketRepo: Send + Sync {
    async fn create_ticket(
        &self,
        order_id: Id,
        subject: String,
        message: String,
        status: TicketStatus,
    ) -> RepoResult<Ticket>;
    async fn get_ticket(&self, id: Id) -> RepoResult<Ticket>;
    /// Touches `updated_at`.
    async fn set_ticket_status(&self, id: Id, status: TicketStatus) -> RepoResult<Ticket>;
    /// Appends a message and touches the ticket's `updated_at`.
    async fn append_ticket_message(
        &self,
        ticket_id: Id,
        role: MessageRole,
        author_sub: Option<String>,
        body: String,
    ) -> RepoResult<TicketMessage>;
    async fn ticket_messages(&self, ticket_id: Id) -> RepoResult<Vec<TicketMessage>>;
    /// Staff backlog view, most recently updated first.
    async fn list_tickets(&self, status: Option<TicketStatus>) -> RepoResult<Vec<TicketOverview>>;
    async fn tickets_for_customer(&self, customer_id: Id) -> RepoResult<Vec<Ticket>>;
    async fn tickets_for_order(&self, order_id: Id) -> RepoResult<Vec<Ticket>>;
    async fn count_tickets_waiting_on_staff(&self) -> RepoResult<i64>;
    async fn count_tickets_open(&self) -> RepoResult<i64>;
}

#[async_trait]
pub trait LogRepo: Send + Sync {
    async fn append_log(
        &self,
        order_id: Id,
        kind: LogKind,
        body: String,
        created_by: Option<String>,
    ) -> RepoResult<ServiceOrderLog>;
    async fn logs_for_order(&self, order_id: Id) -> RepoResult<Vec<ServiceOrderLog>>;
}

#[async_trait]
pub trait PhotoRepo: Send + Sync {
    async fn add_photo(&self, order_id: Id, hash: &str, mime: &str) -> RepoResult<ServiceOrderPhoto>;
    async fn photos_for_order(&self, order_id: Id) -> RepoResult<Vec<ServiceOrderPhoto>>;
}

pub trait Repo: CustomerRepo + BikeRepo + OrderRepo + TicketRepo + LogRepo + PhotoRepo {}

impl<T> Repo for T where T: CustomerRepo + BikeRepo + OrderRepo + TicketRepo + LogRepo + PhotoRepo {}

fn apply_changes(order: &mut ServiceOrder, changes: OrderChanges) {
    if let Some((status, completed_at)) = changes.status {
        order.status = status;
        order.completed_at = completed_at;
    }
    if let Some(price) = changes.price {
        order.price = price;
    }
    if let Some(issue) = changes.issue_description {
        order.issue_description = issue;
    }
    if let Some(work) = changes.work_done {
        order.work_done = work;
    }
    if let Some(promised) = changes.promised_date {
        order.promised_date = promised;
    }
    if let Some(checklist) = changes.checklist {
        order.checklist = checklist;
    }
}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock};

    const SNAPSHOT_PATH: &str = "data/state.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        customers: HashMap<Id, CustomerProfile>,
        bikes: HashMap<Id, Bike>,
        orders: HashMap<Id, ServiceOrder>,
        photos: HashMap<Id, ServiceOrderPhoto>,
        tickets: HashMap<Id, Ticket>,
        messages: HashMap<Id, TicketMessage>,
        logs: HashMap<Id, ServiceOrderLog>,
        next_id: Id,
    }

    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        /// None disables snapshotting (ephemeral stores for tests).
        snapshot_path: Arc<Option<PathBuf>>,
    }

    impl InMemRepo {
        fn snapshot_path() -> PathBuf {
            match std::env::var("BB_DATA_DIR") {
                Ok(dir) => {
                    let mut p = PathBuf::from(dir);
                    p.push("state.json");
                    p
                }
                Err(_) => PathBuf::from(SNAPSHOT_PATH),
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => s,
                    Err(e) => {
                        log::warn!("failed to parse snapshot '{}': {e}; starting empty", path.display());
                        State::default()
                    }
                },
                Err(_) => State::default(),
            }
        }

        fn persist(&self) {
            let Some(path) = self.snapshot_path.as_ref() else { return };
            if let Ok(s) = serde_json::to_vec_pretty(&*self.state.read().unwrap()) {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = std::fs::write(path, s) {
                    log::warn!("failed to write snapshot '{}': {e}", path.display());
                }
            }
        }

        pub fn new() -> Self {
            let snapshot_path = Self::snapshot_path();
            let state = Self::load_state_from(&snapshot_path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Arc::new(Some(snapshot_path)),
            }
        }

        /// In-memory store that never touches the filesystem.
        pub fn ephemeral() -> Self {
            Self { state: Arc::new(RwLock::new(State::default())), snapshot_path: Arc::new(None) }
        }

        fn next_id(state: &mut State) -> Id {
            state.next_id += 1;
            state.next_id
        }

        fn touch_ticket(state: &mut State, ticket_id: Id) {
            if let Some(t) = state.tickets.get_mut(&ticket_id) {
                t.updated_at = Utc::now();
            }
        }

        fn ticket_texts_for_order(state: &State, order_id: Id) -> Vec<String> {
            let mut texts = Vec::new();
            for t in state.tickets.values().filter(|t| t.order_id == order_id) {
                texts.push(t.subject.clone());
                texts.push(t.message.clone());
                for m in state.messages.values().filter(|m| m.ticket_id == t.id) {
                    texts.push(m.message.clone());
                }
            }
            texts
        }

        fn has_waiting_ticket(state: &State, order_id: Id) -> bool {
            state
                .tickets
                .values()
                .any(|t| t.order_id == order_id && TicketStatus::WAITING_ON_STAFF.contains(&t.status))
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl CustomerRepo for InMemRepo {
        async fn create_customer(&self, new: NewCustomer) -> RepoResult<CustomerProfile> {
            let mut s = self.state.write().unwrap();
            let id = Self::next_id(&mut s);
            let customer = CustomerProfile {
                id,
                user_sub: None,
                full_name: new.full_name.trim().to_string(),
                email: new.email.trim().to_lowercase(),
                phone_number: new.phone_number.trim().to_string(),
                created_at: Utc::now(),
            };
            s.customers.insert(id, customer.clone());
            drop(s);
            self.persist();
            Ok(customer)
        }

        async fn get_customer(&self, id: Id) -> RepoResult<CustomerProfile> {
            let s = self.state.read().unwrap();
            s.customers.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn update_customer_contact(
            &self,
            id: Id,
            full_name: String,
            phone_number: String,
        ) -> RepoResult<CustomerProfile> {
            let mut s = self.state.write().unwrap();
            let c = s.customers.get_mut(&id).ok_or(RepoError::NotFound)?;
            c.full_name = full_name;
            c.phone_number = phone_number;
            let updated = c.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn link_customer_user(&self, id: Id, user_sub: &str) -> RepoResult<CustomerProfile> {
            let mut s = self.state.write().unwrap();
            let c = s.customers.get_mut(&id).ok_or(RepoError::NotFound)?;
            if c.user_sub.is_none() {
                c.user_sub = Some(user_sub.to_string());
            }
            let updated = c.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn find_customer_by_email(&self, email: &str) -> RepoResult<Option<CustomerProfile>> {
            let s = self.state.read().unwrap();
            let needle = email.trim().to_lowercase();
            Ok(s.customers.values().find(|c| c.email == needle).cloned())
        }

        async fn find_customer_by_phone(&self, phone: &str) -> RepoResult<Option<CustomerProfile>> {
            let s = self.state.read().unwrap();
            Ok(s.customers.values().find(|c| !phone.is_empty() && c.phone_number == phone).cloned())
        }

        async fn find_customer_by_user(&self, user_sub: &str) -> RepoResult<Option<CustomerProfile>> {
            let s = self.state.read().unwrap();
            Ok(s.customers.values().find(|c| c.user_sub.as_deref() == Some(user_sub)).cloned())
        }

        async fn list_customers(&self) -> RepoResult<Vec<CustomerProfile>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s.customers.values().cloned().collect();
            v.sort_by(|a, b| (a.full_name.clone(), a.email.clone()).cmp(&(b.full_name.clone(), b.email.clone())));
            Ok(v)
        }
    }

    #[async_trait]
    impl BikeRepo for InMemRepo {
        async fn create_bike(&self, new: NewBike) -> RepoResult<Bike> {
            let mut s = self.state.write().unwrap();
            if !s.customers.contains_key(&new.customer_id) {
                return Err(RepoError::NotFound);
            }
            let id = Self::next_id(&mut s);
            let bike = Bike {
                id,
                customer_id: new.customer_id,
                brand: new.brand,
                model: new.model,
                serial_number: new.serial_number,
                created_at: Utc::now(),
            };
            s.bikes.insert(id, bike.clone());
            drop(s);
            self.persist();
            Ok(bike)
        }

        async fn get_bike(&self, id: Id) -> RepoResult<Bike> {
            let s = self.state.read().unwrap();
            s.bikes.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn bikes_for_customer(&self, customer_id: Id) -> RepoResult<Vec<Bike>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> =
                s.bikes.values().filter(|b| b.customer_id == customer_id).cloned().collect();
            v.sort_by(|a, b| (a.brand.clone(), a.model.clone()).cmp(&(b.brand.clone(), b.model.clone())));
            Ok(v)
        }
    }

    #[async_trait]
    impl OrderRepo for InMemRepo {
        async fn create_order(&self, new: NewOrder) -> RepoResult<ServiceOrder> {
            let mut s = self.state.write().unwrap();
            if !s.bikes.contains_key(&new.bike_id) {
                return Err(RepoError::NotFound);
            }
            let id = Self::next_id(&mut s);
            let order = ServiceOrder {
                id,
                bike_id: new.bike_id,
                service_code: new.service_code,
                issue_description: new.issue_description,
                work_done: String::new(),
                status: OrderStatus::New,
                price: Decimal::ZERO,
                promised_date: None,
                checklist: Checklist::default(),
                created_at: Utc::now(),
                completed_at: None,
            };
            s.orders.insert(id, order.clone());
            drop(s);
            self.persist();
            Ok(order)
        }

        async fn get_order(&self, id: Id) -> RepoResult<ServiceOrder> {
            let s = self.state.read().unwrap();
            s.orders.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn get_order_context(&self, id: Id) -> RepoResult<OrderContext> {
            let s = self.state.read().unwrap();
            let order = s.orders.get(&id).cloned().ok_or(RepoError::NotFound)?;
            let bike = s.bikes.get(&order.bike_id).cloned().ok_or(RepoError::NotFound)?;
            let customer = s.customers.get(&bike.customer_id).cloned().ok_or(RepoError::NotFound)?;
            Ok(OrderContext { order, bike, customer })
        }

        async fn update_order(&self, id: Id, changes: OrderChanges) -> RepoResult<ServiceOrder> {
            let mut s = self.state.write().unwrap();
            let order = s.orders.get_mut(&id).ok_or(RepoError::NotFound)?;
            apply_changes(order, changes);
            let updated = order.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn panel_rows(&self, filter: PanelFilter) -> RepoResult<Vec<PanelRow>> {
            let s = self.state.read().unwrap();
            let mut orders: Vec<_> = s
                .orders
                .values()
                .filter(|o| match filter.tab {
                    Some(PanelTab::Completed) => o.completed_at.is_some(),
                    Some(PanelTab::Active) => o.completed_at.is_none(),
                    None => true,
                })
                .filter(|o| filter.status.map_or(true, |st| o.status == st))
                .filter(|o| {
                    filter
                        .done_on
                        .map_or(true, |day| o.completed_at.is_some_and(|t| t.date_naive() == day))
                })
                .cloned()
                .collect();
            orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));

            let mut rows = Vec::with_capacity(orders.len());
            for order in orders {
                let Some(bike) = s.bikes.get(&order.bike_id).cloned() else { continue };
                let Some(customer) = s.customers.get(&bike.customer_id).cloned() else { continue };
                let has_waiting_ticket = Self::has_waiting_ticket(&s, order.id);
                if filter.waiting_tickets_only && !has_waiting_ticket {
                    continue;
                }
                rows.push(PanelRow {
                    ticket_texts: Self::ticket_texts_for_order(&s, order.id),
                    has_waiting_ticket,
                    order,
                    bike,
                    customer,
                });
            }
            Ok(rows)
        }

        async fn orders_for_customer(&self, customer_id: Id) -> RepoResult<Vec<ServiceOrder>> {
            let s = self.state.read().unwrap();
            let bike_ids: Vec<Id> =
                s.bikes.values().filter(|b| b.customer_id == customer_id).map(|b| b.id).collect();
            let mut v: Vec<_> =
                s.orders.values().filter(|o| bike_ids.contains(&o.bike_id)).cloned().collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(v)
        }

        async fn latest_order_for_bike(&self, bike_id: Id) -> RepoResult<Option<ServiceOrder>> {
            let s = self.state.read().unwrap();
            Ok(s.orders
                .values()
                .filter(|o| o.bike_id == bike_id)
                .max_by_key(|o| o.created_at)
                .cloned())
        }

        async fn total_paid_for_customer(&self, customer_id: Id) -> RepoResult<Decimal> {
            let s = self.state.read().unwrap();
            let bike_ids: Vec<Id> =
                s.bikes.values().filter(|b| b.customer_id == customer_id).map(|b| b.id).collect();
            Ok(s.orders
                .values()
                .filter(|o| bike_ids.contains(&o.bike_id) && o.completed_at.is_some())
                .map(|o| o.price)
                .sum())
        }

        async fn count_unfinished_with_status(&self, status: OrderStatus) -> RepoResult<i64> {
            let s = self.state.read().unwrap();
            Ok(s.orders
                .values()
                .filter(|o| o.completed_at.is_none() && o.status == status)
                .count() as i64)
        }

        async fn count_completed_on(&self, day: NaiveDate) -> RepoResult<i64> {
            let s = self.state.read().unwrap();
            Ok(s.orders
                .values()
                .filter(|o| o.completed_at.is_some_and(|t| t.date_naive() == day))
                .count() as i64)
        }

        async fn count_not_done(&self) -> RepoResult<i64> {
            let s = self.state.read().unwrap();
            Ok(s.orders.values().filter(|o| o.status != OrderStatus::Done).count() as i64)
        }

        async fn count_completed_since(&self, day: NaiveDate) -> RepoResult<i64> {
            let s = self.state.read().unwrap();
            Ok(s.orders
                .values()
                .filter(|o| o.completed_at.is_some_and(|t| t.date_naive() >= day))
                .count() as i64)
        }

        async fn recent_completed_spans(
            &self,
            limit: i64,
        ) -> RepoResult<Vec<(DateTime<Utc>, DateTime<Utc>)>> {
            let s = self.state.read().unwrap();
            let mut completed: Vec<_> =
                s.orders.values().filter(|o| o.completed_at.is_some()).cloned().collect();
            completed.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
            Ok(completed
                .into_iter()
                .take(limit as usize)
                .map(|o| (o.created_at, o.completed_at.unwrap()))
                .collect())
        }
    }

    #[async_trait]
    impl TicketRepo for InMemRepo {
        async fn create_ticket(
            &self,
            order_id: Id,
            subject: String,
            message: String,
            status: TicketStatus,
        ) -> RepoResult<Ticket> {
            let mut s = self.state.write().unwrap();
            if !s.orders.contains_key(&order_id) {
                return Err(RepoError::NotFound);
            }
            let id = Self::next_id(&mut s);
            let now = Utc::now();
            let ticket =
                Ticket { id, order_id, status, subject, message, created_at: now, updated_at: now };
            s.tickets.insert(id, ticket.clone());
            drop(s);
            self.persist();
            Ok(ticket)
        }

        async fn get_ticket(&self, id: Id) -> RepoResult<Ticket> {
            let s = self.state.read().unwrap();
            s.tickets.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn set_ticket_status(&self, id: Id, status: TicketStatus) -> RepoResult<Ticket> {
            let mut s = self.state.write().unwrap();
            let t = s.tickets.get_mut(&id).ok_or(RepoError::NotFound)?;
            t.status = status;
            t.updated_at = Utc::now();
            let updated = t.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn append_ticket_message(
            &self,
            ticket_id: Id,
            role: MessageRole,
            author_sub: Option<String>,
            body: String,
        ) -> RepoResult<TicketMessage> {
            let mut s = self.state.write().unwrap();
            if !s.tickets.contains_key(&ticket_id) {
                return Err(RepoError::NotFound);
            }
            let id = Self::next_id(&mut s);
            let msg = TicketMessage {
                id,
                ticket_id,
                role,
                author_sub,
                message: body,
                created_at: Utc::now(),
            };
            s.messages.insert(id, msg.clone());
            Self::touch_ticket(&mut s, ticket_id);
            drop(s);
            self.persist();
            Ok(msg)
        }

        async fn ticket_messages(&self, ticket_id: Id) -> RepoResult<Vec<TicketMessage>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> =
                s.messages.values().filter(|m| m.ticket_id == ticket_id).cloned().collect();
            v.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            Ok(v)
        }

        async fn list_tickets(&self, status: Option<TicketStatus>) -> RepoResult<Vec<TicketOverview>> {
            let s = self.state.read().unwrap();
            let mut tickets: Vec<_> = s
                .tickets
                .values()
                .filter(|t| status.map_or(true, |st| t.status == st))
                .cloned()
                .collect();
            tickets.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

            let mut out = Vec::with_capacity(tickets.len());
            for ticket in tickets {
                let Some(order) = s.orders.get(&ticket.order_id) else { continue };
                let Some(bike) = s.bikes.get(&order.bike_id) else { continue };
                let Some(customer) = s.customers.get(&bike.customer_id) else { continue };
                out.push(TicketOverview {
                    order_id: order.id,
                    order_code: order.code(),
                    customer_name: customer.full_name.clone(),
                    customer_email: customer.email.clone(),
                    ticket,
                });
            }
            Ok(out)
        }

        async fn tickets_for_customer(&self, customer_id: Id) -> RepoResult<Vec<Ticket>> {
            let s = self.state.read().unwrap();
            let bike_ids: Vec<Id> =
                s.bikes.values().filter(|b| b.customer_id == customer_id).map(|b| b.id).collect();
            let order_ids: Vec<Id> =
                s.orders.values().filter(|o| bike_ids.contains(&o.bike_id)).map(|o| o.id).collect();
            let mut v: Vec<_> =
                s.tickets.values().filter(|t| order_ids.contains(&t.order_id)).cloned().collect();
            v.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            Ok(v)
        }

        async fn tickets_for_order(&self, order_id: Id) -> RepoResult<Vec<Ticket>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> =
                s.tickets.values().filter(|t| t.order_id == order_id).cloned().collect();
            v.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            Ok(v)
        }

        async fn count_tickets_waiting_on_staff(&self) -> RepoResult<i64> {
            let s = self.state.read().unwrap();
            Ok(s.tickets
                .values()
                .filter(|t| TicketStatus::WAITING_ON_STAFF.contains(&t.status))
                .count() as i64)
        }

        async fn count_tickets_open(&self) -> RepoResult<i64> {
            let s = self.state.read().unwrap();
            Ok(s.tickets.values().filter(|t| t.status != TicketStatus::Closed).count() as i64)
        }
    }

    #[async_trait]
    impl LogRepo for InMemRepo {
        async fn append_log(
            &self,
            order_id: Id,
            kind: LogKind,
            body: String,
            created_by: Option<String>,
        ) -> RepoResult<ServiceOrderLog> {
            let mut s = self.state.write().unwrap();
            if !s.orders.contains_key(&order_id) {
                return Err(RepoError::NotFound);
            }
            let id = Self::next_id(&mut s);
            let log = ServiceOrderLog { id, order_id, kind, body, created_by, created_at: Utc::now() };
            s.logs.insert(id, log.clone());
            drop(s);
            self.persist();
            Ok(log)
        }

        async fn logs_for_order(&self, order_id: Id) -> RepoResult<Vec<ServiceOrderLog>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s.logs.values().filter(|l| l.order_id == order_id).cloned().collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(v)
        }
    }

    #[async_trait]
    impl PhotoRepo for InMemRepo {
        async fn add_photo(
            &self,
            order_id: Id,
            hash: &str,
            mime: &str,
        ) -> RepoResult<ServiceOrderPhoto> {
            let mut s = self.state.write().unwrap();
            if !s.orders.contains_key(&order_id) {
                return Err(RepoError::NotFound);
            }
            let id = Self::next_id(&mut s);
            let photo = ServiceOrderPhoto {
                id,
                order_id,
                hash: hash.to_string(),
                mime: mime.to_string(),
                created_at: Utc::now(),
            };
            s.photos.insert(id, photo.clone());
            drop(s);
            self.persist();
            Ok(photo)
        }

        async fn photos_for_order(&self, order_id: Id) -> RepoResult<Vec<ServiceOrderPhoto>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> =
                s.photos.values().filter(|p| p.order_id == order_id).cloned().collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(v)
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::types::Json;
    use sqlx::{Pool, Postgres, Row};

    #[derive(Clone)]
    pub struct PgRepo {
        pool: Pool<Postgres>,
    }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self {
            Self { pool }
        }
    }

    fn internal(e: sqlx::Error) -> RepoError {
        match e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            other => RepoError::Internal(other.to_string()),
        }
    }

    const ORDER_COLS: &str = "id, bike_id, service_code, issue_description, work_done, status, \
                              price, promised_date, checklist, created_at, completed_at";

    #[async_trait]
    impl CustomerRepo for PgRepo {
        async fn create_customer(&self, new: NewCustomer) -> RepoResult<CustomerProfile> {
            sqlx::query_as::<_, CustomerProfile>(
                "INSERT INTO customers (full_name, email, phone_number) VALUES ($1, lower($2), $3) \
                 RETURNING id, user_sub, full_name, email, phone_number, created_at",
            )
            .bind(new.full_name.trim())
            .bind(new.email.trim())
            .bind(new.phone_number.trim())
            .fetch_one(&self.pool)
            .await
            .map_err(internal)
        }

        async fn get_customer(&self, id: Id) -> RepoResult<CustomerProfile> {
            sqlx::query_as::<_, CustomerProfile>(
                "SELECT id, user_sub, full_name, email, phone_number, created_at FROM customers WHERE id = $1",
            )
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)
        }

        async fn update_customer_contact(
            &self,
            id: Id,
            full_name: String,
            phone_number: String,
        ) -> RepoResult<CustomerProfile> {
            sqlx::query_as::<_, CustomerProfile>(
                "UPDATE customers SET full_name = $2, phone_number = $3 WHERE id = $1 \
                 RETURNING id, user_sub, full_name, email, phone_number, created_at",
            )
            .bind(id)
            .bind(full_name)
            .bind(phone_number)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)
        }

        async fn link_customer_user(&self, id: Id, user_sub: &str) -> RepoResult<CustomerProfile> {
            sqlx::query_as::<_, CustomerProfile>(
                "UPDATE customers SET user_sub = COALESCE(user_sub, $2) WHERE id = $1 \
                 RETURNING id, user_sub, full_name, email, phone_number, created_at",
            )
            .bind(id)
            .bind(user_sub)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)
        }

        async fn find_customer_by_email(&self, email: &str) -> RepoResult<Option<CustomerProfile>> {
            sqlx::query_as::<_, CustomerProfile>(
                "SELECT id, user_sub, full_name, email, phone_number, created_at FROM customers \
                 WHERE email = lower($1) LIMIT 1",
            )
            .bind(email.trim())
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)
        }

        async fn find_customer_by_phone(&self, phone: &str) -> RepoResult<Option<CustomerProfile>> {
            if phone.is_empty() {
                return Ok(None);
            }
            sqlx::query_as::<_, CustomerProfile>(
                "SELECT id, user_sub, full_name, email, phone_number, created_at FROM customers \
                 WHERE phone_number = $1 LIMIT 1",
            )
            .bind(phone)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)
        }

        async fn find_customer_by_user(&self, user_sub: &str) -> RepoResult<Option<CustomerProfile>> {
            sqlx::query_as::<_, CustomerProfile>(
                "SELECT id, user_sub, full_name, email, phone_number, created_at FROM customers \
                 WHERE user_sub = $1 LIMIT 1",
            )
            .bind(user_sub)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)
        }

        async fn list_customers(&self) -> RepoResult<Vec<CustomerProfile>> {
            sqlx::query_as::<_, CustomerProfile>(
                "SELECT id, user_sub, full_name, email, phone_number, created_at FROM customers \
                 ORDER BY full_name, email",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(internal)
        }
    }

    #[async_trait]
    impl BikeRepo for PgRepo {
        async fn create_bike(&self, new: NewBike) -> RepoResult<Bike> {
            sqlx::query_as::<_, Bike>(
                "INSERT INTO bikes (customer_id, brand, model, serial_number) VALUES ($1, $2, $3, $4) \
                 RETURNING id, customer_id, brand, model, serial_number, created_at",
            )
            .bind(new.customer_id)
            .bind(new.brand)
            .bind(new.model)
            .bind(new.serial_number)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)
        }

        async fn get_bike(&self, id: Id) -> RepoResult<Bike> {
            sqlx::query_as::<_, Bike>(
                "SELECT id, customer_id, brand, model, serial_number, created_at FROM bikes WHERE id = $1",
            )
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)
        }

        async fn bikes_for_customer(&self, customer_id: Id) -> RepoResult<Vec<Bike>> {
            sqlx::query_as::<_, Bike>(
                "SELECT id, customer_id, brand, model, serial_number, created_at FROM bikes \
                 WHERE customer_id = $1 ORDER BY brand, model",
            )
            .bind(customer_id)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)
        }
    }

    #[async_trait]
    impl OrderRepo for PgRepo {
        async fn create_order(&self, new: NewOrder) -> RepoResult<ServiceOrder> {
            sqlx::query_as::<_, ServiceOrder>(&format!(
                "INSERT INTO service_orders (bike_id, service_code, issue_description) \
                 VALUES ($1, $2, $3) RETURNING {ORDER_COLS}"
            ))
            .bind(new.bike_id)
            .bind(new.service_code)
            .bind(new.issue_description)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)
        }

        async fn get_order(&self, id: Id) -> RepoResult<ServiceOrder> {
            sqlx::query_as::<_, ServiceOrder>(&format!(
                "SELECT {ORDER_COLS} FROM service_orders WHERE id = $1"
            ))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)
        }

        async fn get_order_context(&self, id: Id) -> RepoResult<OrderContext> {
            let order = self.get_order(id).await?;
            let bike = self.get_bike(order.bike_id).await?;
            let customer = self.get_customer(bike.customer_id).await?;
            Ok(OrderContext { order, bike, customer })
        }

        async fn update_order(&self, id: Id, changes: OrderChanges) -> RepoResult<ServiceOrder> {
            // Single statement so status and completed_at change atomically.
            let set_status = changes.status.is_some();
            let (status, completed_at) = match changes.status {
                Some((st, at)) => (Some(st), at),
                None => (None, None),
            };
            sqlx::query_as::<_, ServiceOrder>(&format!(
                "UPDATE service_orders SET \
                   status = COALESCE($2, status), \
                   completed_at = CASE WHEN $3 THEN $4 ELSE completed_at END, \
                   price = COALESCE($5, price), \
                   issue_description = COALESCE($6, issue_description), \
                   work_done = COALESCE($7, work_done), \
                   promised_date = CASE WHEN $8 THEN $9 ELSE promised_date END, \
                   checklist = COALESCE($10, checklist) \
                 WHERE id = $1 RETURNING {ORDER_COLS}"
            ))
            .bind(id)
            .bind(status)
            .bind(set_status)
            .bind(completed_at)
            .bind(changes.price)
            .bind(changes.issue_description)
            .bind(changes.work_done)
            .bind(changes.promised_date.is_some())
            .bind(changes.promised_date.flatten())
            .bind(changes.checklist.map(Json))
            .fetch_one(&self.pool)
            .await
            .map_err(internal)
        }

        async fn panel_rows(&self, filter: PanelFilter) -> RepoResult<Vec<PanelRow>> {
            let rows = sqlx::query(&format!(
                "SELECT o.id, o.bike_id, o.service_code, o.issue_description, o.work_done, \
                        o.status, o.price, o.promised_date, o.checklist, o.created_at, o.completed_at, \
                        b.id AS b_id, b.customer_id AS b_customer_id, b.brand, b.model, \
                        b.serial_number, b.created_at AS b_created_at, \
                        c.id AS c_id, c.user_sub, c.full_name, c.email, c.phone_number, \
                        c.created_at AS c_created_at, \
                        EXISTS (SELECT 1 FROM tickets t WHERE t.order_id = o.id \
                                AND t.status IN ('OPEN', 'WAITING_ADMIN')) AS has_waiting \
                 FROM service_orders o \
                 JOIN bikes b ON b.id = o.bike_id \
                 JOIN customers c ON c.id = b.customer_id \
                 WHERE ($1::bool IS NULL OR ($1 AND o.completed_at IS NOT NULL) \
                        OR (NOT $1 AND o.completed_at IS NULL)) \
                   AND ($2::order_status IS NULL OR o.status = $2) \
                   AND ($3::date IS NULL OR o.completed_at::date = $3) \
                 ORDER BY o.created_at DESC"
            ))
            .bind(filter.tab.map(|t| t == PanelTab::Completed))
            .bind(filter.status)
            .bind(filter.done_on)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;

            let mut out = Vec::with_capacity(rows.len());
            for row in rows {
                let has_waiting: bool = row.try_get("has_waiting").map_err(internal)?;
                if filter.waiting_tickets_only && !has_waiting {
                    continue;
                }
                let order = ServiceOrder {
                    id: row.try_get("id").map_err(internal)?,
                    bike_id: row.try_get("bike_id").map_err(internal)?,
                    service_code: row.try_get("service_code").map_err(internal)?,
                    issue_description: row.try_get("issue_description").map_err(internal)?,
                    work_done: row.try_get("work_done").map_err(internal)?,
                    status: row.try_get("status").map_err(internal)?,
                    price: row.try_get("price").map_err(internal)?,
                    promised_date: row.try_get("promised_date").map_err(internal)?,
                    checklist: row.try_get::<Json<Checklist>, _>("checklist").map_err(internal)?.0,
                    created_at: row.try_get("created_at").map_err(internal)?,
                    completed_at: row.try_get("completed_at").map_err(internal)?,
                };
                let bike = Bike {
                    id: row.try_get("b_id").map_err(internal)?,
                    customer_id: row.try_get("b_customer_id").map_err(internal)?,
                    brand: row.try_get("brand").map_err(internal)?,
                    model: row.try_get("model").map_err(internal)?,
                    serial_number: row.try_get("serial_number").map_err(internal)?,
                    created_at: row.try_get("b_created_at").map_err(internal)?,
                };
                let customer = CustomerProfile {
                    id: row.try_get("c_id").map_err(internal)?,
                    user_sub: row.try_get("user_sub").map_err(internal)?,
                    full_name: row.try_get("full_name").map_err(internal)?,
                    email: row.try_get("email").map_err(internal)?,
                    phone_number: row.try_get("phone_number").map_err(internal)?,
                    created_at: row.try_get("c_created_at").map_err(internal)?,
                };
                let texts = sqlx::query(
                    "SELECT t.subject, t.message, \
                            COALESCE(string_agg(m.message, '\n'), '') AS msg_texts \
                     FROM tickets t LEFT JOIN ticket_messages m ON m.ticket_id = t.id \
                     WHERE t.order_id = $1 GROUP BY t.id",
                )
                .bind(order.id)
                .fetch_all(&self.pool)
                .await
                .map_err(internal)?
                .into_iter()
                .flat_map(|r| {
                    vec![
                        r.get::<String, _>("subject"),
                        r.get::<String, _>("message"),
                        r.get::<String, _>("msg_texts"),
                    ]
                })
                .filter(|t| !t.is_empty())
                .collect();
                out.push(PanelRow {
                    order,
                    bike,
                    customer,
                    ticket_texts: texts,
                    has_waiting_ticket: has_waiting,
                });
            }
            Ok(out)
        }

        async fn orders_for_customer(&self, customer_id: Id) -> RepoResult<Vec<ServiceOrder>> {
            sqlx::query_as::<_, ServiceOrder>(&format!(
                "SELECT {ORDER_COLS} FROM service_orders \
                 WHERE bike_id IN (SELECT id FROM bikes WHERE customer_id = $1) \
                 ORDER BY created_at DESC"
            ))
            .bind(customer_id)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)
        }

        async fn latest_order_for_bike(&self, bike_id: Id) -> RepoResult<Option<ServiceOrder>> {
            sqlx::query_as::<_, ServiceOrder>(&format!(
                "SELECT {ORDER_COLS} FROM service_orders WHERE bike_id = $1 \
                 ORDER BY created_at DESC LIMIT 1"
            ))
            .bind(bike_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)
        }

        async fn total_paid_for_customer(&self, customer_id: Id) -> RepoResult<Decimal> {
            let total: Option<Decimal> = sqlx::query_scalar(
                "SELECT SUM(price) FROM service_orders \
                 WHERE completed_at IS NOT NULL \
                   AND bike_id IN (SELECT id FROM bikes WHERE customer_id = $1)",
            )
            .bind(customer_id)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)?;
            Ok(total.unwrap_or(Decimal::ZERO))
        }

        async fn count_unfinished_with_status(&self, status: OrderStatus) -> RepoResult<i64> {
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM service_orders WHERE completed_at IS NULL AND status = $1",
            )
            .bind(status)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)
        }

        async fn count_completed_on(&self, day: NaiveDate) -> RepoResult<i64> {
            sqlx::query_scalar("SELECT COUNT(*) FROM service_orders WHERE completed_at::date = $1")
                .bind(day)
                .fetch_one(&self.pool)
                .await
                .map_err(internal)
        }

        async fn count_not_done(&self) -> RepoResult<i64> {
            sqlx::query_scalar("SELECT COUNT(*) FROM service_orders WHERE status <> 'DONE'")
                .fetch_one(&self.pool)
                .await
                .map_err(internal)
        }

        async fn count_completed_since(&self, day: NaiveDate) -> RepoResult<i64> {
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM service_orders \
                 WHERE completed_at IS NOT NULL AND completed_at::date >= $1",
            )
            .bind(day)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)
        }

        async fn recent_completed_spans(
            &self,
            limit: i64,
        ) -> RepoResult<Vec<(DateTime<Utc>, DateTime<Utc>)>> {
            let rows = sqlx::query(
                "SELECT created_at, completed_at FROM service_orders \
                 WHERE completed_at IS NOT NULL ORDER BY completed_at DESC LIMIT $1",
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;
            Ok(rows
                .into_iter()
                .map(|r| (r.get("created_at"), r.get("completed_at")))
                .collect())
        }
    }

    #[async_trait]
    impl TicketRepo for PgRepo {
        async fn create_ticket(
            &self,
            order_id: Id,
            subject: String,
            message: String,
            status: TicketStatus,
        ) -> RepoResult<Ticket> {
            sqlx::query_as::<_, Ticket>(
                "INSERT INTO tickets (order_id, subject, message, status) VALUES ($1, $2, $3, $4) \
                 RETURNING id, order_id, status, subject, message, created_at, updated_at",
            )
            .bind(order_id)
            .bind(subject)
            .bind(message)
            .bind(status)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)
        }

        async fn get_ticket(&self, id: Id) -> RepoResult<Ticket> {
            sqlx::query_as::<_, Ticket>(
                "SELECT id, order_id, status, subject, message, created_at, updated_at \
                 FROM tickets WHERE id = $1",
            )
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)
        }

        async fn set_ticket_status(&self, id: Id, status: TicketStatus) -> RepoResult<Ticket> {
            sqlx::query_as::<_, Ticket>(
                "UPDATE tickets SET status = $2, updated_at = now() WHERE id = $1 \
                 RETURNING id, order_id, status, subject, message, created_at, updated_at",
            )
            .bind(id)
            .bind(status)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)
        }

        async fn append_ticket_message(
            &self,
            ticket_id: Id,
            role: MessageRole,
            author_sub: Option<String>,
            body: String,
        ) -> RepoResult<TicketMessage> {
            let mut tx = self.pool.begin().await.map_err(internal)?;
            let msg = sqlx::query_as::<_, TicketMessage>(
                "INSERT INTO ticket_messages (ticket_id, role, author_sub, message) \
                 VALUES ($1, $2, $3, $4) \
                 RETURNING id, ticket_id, role, author_sub, message, created_at",
            )
            .bind(ticket_id)
            .bind(role)
            .bind(author_sub)
            .bind(body)
            .fetch_one(&mut *tx)
            .await
            .map_err(internal)?;
            sqlx::query("UPDATE tickets SET updated_at = now() WHERE id = $1")
                .bind(ticket_id)
                .execute(&mut *tx)
                .await
                .map_err(internal)?;
            tx.commit().await.map_err(internal)?;
            Ok(msg)
        }

        async fn ticket_messages(&self, ticket_id: Id) -> RepoResult<Vec<TicketMessage>> {
            sqlx::query_as::<_, TicketMessage>(
                "SELECT id, ticket_id, role, author_sub, message, created_at \
                 FROM ticket_messages WHERE ticket_id = $1 ORDER BY created_at ASC",
            )
            .bind(ticket_id)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)
        }

        async fn list_tickets(&self, status: Option<TicketStatus>) -> RepoResult<Vec<TicketOverview>> {
            let rows = sqlx::query(
                "SELECT t.id, t.order_id, t.status, t.subject, t.message, t.created_at, t.updated_at, \
                        o.id AS o_id, o.service_code, c.full_name, c.email \
                 FROM tickets t \
                 JOIN service_orders o ON o.id = t.order_id \
                 JOIN bikes b ON b.id = o.bike_id \
                 JOIN customers c ON c.id = b.customer_id \
                 WHERE ($1::ticket_status IS NULL OR t.status = $1) \
                 ORDER BY t.updated_at DESC",
            )
            .bind(status)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;
            Ok(rows
                .into_iter()
                .map(|r| {
                    let order_id: Id = r.get("o_id");
                    let service_code: String = r.get("service_code");
                    TicketOverview {
                        ticket: Ticket {
                            id: r.get("id"),
                            order_id: r.get("order_id"),
                            status: r.get("status"),
                            subject: r.get("subject"),
                            message: r.get("message"),
                            created_at: r.get("created_at"),
                            updated_at: r.get("updated_at"),
                        },
                        order_id,
                        order_code: if service_code.is_empty() {
                            order_id.to_string()
                        } else {
                            service_code
                        },
                        customer_name: r.get("full_name"),
                        customer_email: r.get("email"),
                    }
                })
                .collect())
        }

        async fn tickets_for_customer(&self, customer_id: Id) -> RepoResult<Vec<Ticket>> {
            sqlx::query_as::<_, Ticket>(
                "SELECT t.id, t.order_id, t.status, t.subject, t.message, t.created_at, t.updated_at \
                 FROM tickets t \
                 JOIN service_orders o ON o.id = t.order_id \
                 JOIN bikes b ON b.id = o.bike_id \
                 WHERE b.customer_id = $1 ORDER BY t.updated_at DESC",
            )
            .bind(customer_id)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)
        }

        async fn tickets_for_order(&self, order_id: Id) -> RepoResult<Vec<Ticket>> {
            sqlx::query_as::<_, Ticket>(
                "SELECT id, order_id, status, subject, message, created_at, updated_at \
                 FROM tickets WHERE order_id = $1 ORDER BY updated_at DESC",
            )
            .bind(order_id)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)
        }

        async fn count_tickets_waiting_on_staff(&self) -> RepoResult<i64> {
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM tickets WHERE status IN ('OPEN', 'WAITING_ADMIN')",
            )
            .fetch_one(&self.pool)
            .await
            .map_err(internal)
        }

        async fn count_tickets_open(&self) -> RepoResult<i64> {
            sqlx::query_scalar("SELECT COUNT(*) FROM tickets WHERE status <> 'CLOSED'")
                .fetch_one(&self.pool)
                .await
                .map_err(internal)
        }
    }

    #[async_trait]
    impl LogRepo for PgRepo {
        async fn append_log(
            &self,
            order_id: Id,
            kind: LogKind,
            body: String,
            created_by: Option<String>,
        ) -> RepoResult<ServiceOrderLog> {
            sqlx::query_as::<_, ServiceOrderLog>(
                "INSERT INTO service_order_logs (order_id, kind, body, created_by) \
                 VALUES ($1, $2, $3, $4) \
                 RETURNING id, order_id, kind, body, created_by, created_at",
            )
            .bind(order_id)
            .bind(kind)
            .bind(body)
            .bind(created_by)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)
        }

        async fn logs_for_order(&self, order_id: Id) -> RepoResult<Vec<ServiceOrderLog>> {
            sqlx::query_as::<_, ServiceOrderLog>(
                "SELECT id, order_id, kind, body, created_by, created_at \
                 FROM service_order_logs WHERE order_id = $1 ORDER BY created_at DESC",
            )
            .bind(order_id)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)
        }
    }

    #[async_trait]
    impl PhotoRepo for PgRepo {
        async fn add_photo(
            &self,
            order_id: Id,
            hash: &str,
            mime: &str,
        ) -> RepoResult<ServiceOrderPhoto> {
            sqlx::query_as::<_, ServiceOrderPhoto>(
                "INSERT INTO service_order_photos (order_id, hash, mime) VALUES ($1, $2, $3) \
                 RETURNING id, order_id, hash, mime, created_at",
            )
            .bind(order_id)
            .bind(hash)
            .bind(mime)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)
        }

        async fn photos_for_order(&self, order_id: Id) -> RepoResult<Vec<ServiceOrderPhoto>> {
            sqlx::query_as::<_, ServiceOrderPhoto>(
                "SELECT id, order_id, hash, mime, created_at FROM service_order_photos \
                 WHERE order_id = $1 ORDER BY created_at DESC",
            )
            .bind(order_id)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{NaiveDate, Utc};
use futures_util::TryStreamExt as _;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{Auth, Role};
use crate::checklist::service_packages;
use crate::dashboard::{invalidate_dashboard_cache, staff_dashboard_counts};
use crate::error::ApiError;
use crate::eta::{classify, EtaMeta};
use crate::lifecycle::{OrderEdit, OrderLifecycle};
use crate::loyalty::loyalty_stats;
use crate::models::*;
use crate::protocol::{ProtocolData, ProtocolRenderer};
use crate::rate_limit::RateLimiterFacade;
use crate::repo::{
    BikeRepo, CustomerRepo, LogRepo, OrderRepo, PhotoRepo, Repo, TicketRepo,
};
use crate::require_role;
use crate::search::smart_search;
use crate::storage::{content_hash, PhotoStore, PhotoStoreError};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(web::resource("/panel").route(web::get().to(staff_panel)))
            .service(web::resource("/dashboard").route(web::get().to(staff_dashboard)))
            .service(web::resource("/packages").route(web::get().to(list_packages)))
            .service(
                web::resource("/customers")
                    .route(web::get().to(list_customers))
                    .route(web::post().to(create_customer)),
            )
            .service(web::resource("/customers/{id}").route(web::get().to(get_customer)))
            .service(web::resource("/customers/{id}/link").route(web::post().to(link_customer)))
            .service(web::resource("/bikes").route(web::post().to(create_bike)))
            .service(web::resource("/orders").route(web::post().to(create_order)))
            .service(
                web::resource("/orders/{id}")
                    .route(web::get().to(get_order_detail))
                    .route(web::patch().to(update_order)),
            )
            .service(web::resource("/orders/{id}/status").route(web::post().to(set_order_status)))
            .service(web::resource("/orders/{id}/package").route(web::post().to(apply_package)))
            .service(web::resource("/orders/{id}/invite").route(web::post().to(invite_portal)))
            .service(web::resource("/orders/{id}/sms").route(web::post().to(send_sms)))
            .service(web::resource("/orders/{id}/protocol").route(web::get().to(download_protocol)))
            .service(
                web::resource("/orders/{id}/protocol-email")
                    .route(web::post().to(email_protocol)),
            )
            .service(
                web::resource("/orders/{id}/photos")
                    .route(web::get().to(list_photos))
                    .route(web::post().to(upload_photo)),
            )
            .service(web::resource("/intake").route(web::post().to(order_intake)))
            .service(web::resource("/tickets").route(web::get().to(list_tickets)))
            .service(web::resource("/tickets/{id}").route(web::get().to(get_ticket)))
            .service(web::resource("/tickets/{id}/status").route(web::post().to(set_ticket_status)))
            .service(
                web::resource("/tickets/{id}/messages").route(web::post().to(staff_ticket_reply)),
            )
            .service(web::resource("/my/orders").route(web::get().to(my_orders)))
            .service(web::resource("/my/bikes").route(web::get().to(my_bikes)))
            .service(web::resource("/my/loyalty").route(web::get().to(my_loyalty)))
            .service(web::resource("/my/tickets").route(web::get().to(my_tickets)))
            .service(
                web::resource("/my/orders/{id}/tickets").route(web::post().to(my_open_ticket)),
            )
            .service(web::resource("/my/tickets/{id}").route(web::get().to(my_ticket_thread)))
            .service(
                web::resource("/my/tickets/{id}/messages").route(web::post().to(my_ticket_reply)),
            ),
    );
    // Public fetch route (no /api/v1 prefix so <img src="/photos/{hash}"> works)
    cfg.route("/photos/{hash}", web::get().to(get_photo));
}

#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<OrderLifecycle>,
    pub photo_store: Arc<dyn PhotoStore>,
    pub renderer: Arc<dyn ProtocolRenderer>,
    pub rate: RateLimiterFacade,
    pub dashboard_ttl: Duration,
    pub portal_url: String,
}

impl AppState {
    fn repo(&self) -> &dyn Repo {
        self.lifecycle.repo()
    }
}

fn client_ip(req: &HttpRequest) -> String {
    req.connection_info().realip_remote_addr().unwrap_or("unknown").to_string()
}

// ---------------- Staff panel and dashboard -----------------------

#[derive(Debug, Deserialize)]
pub struct PanelQuery {
    /// "active" (default) or "completed"
    pub tab: Option<String>,
    pub status: Option<String>,
    /// Restrict to orders completed on this day (YYYY-MM-DD).
    pub done_on: Option<NaiveDate>,
    /// "1" restricts to orders with a ticket waiting on staff.
    pub waiting: Option<String>,
    pub q: Option<String>,
    /// 1-based page; out-of-range values clamp to the nearest valid page.
    pub page: Option<usize>,
}

const PANEL_PAGE_SIZE: usize = 50;

/// Slice out one page, clamping the requested page into the valid range so a
/// stale link past the end still shows the last page instead of nothing.
fn page_slice<T>(rows: Vec<T>, page: usize, per_page: usize) -> Vec<T> {
    if rows.is_empty() {
        return rows;
    }
    let last = rows.len().div_ceil(per_page);
    let page = page.clamp(1, last);
    rows.into_iter().skip((page - 1) * per_page).take(per_page).collect()
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PanelRowView {
    pub order: ServiceOrder,
    pub bike: Bike,
    pub customer: CustomerProfile,
    pub eta: EtaMeta,
    pub has_waiting_ticket: bool,
}

fn row_view(row: PanelRow, today: NaiveDate) -> PanelRowView {
    let eta = classify(row.order.promised_date, row.order.completed_at.is_some(), today);
    PanelRowView {
        eta,
        order: row.order,
        bike: row.bike,
        customer: row.customer,
        has_waiting_ticket: row.has_waiting_ticket,
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/panel",
    params(
        ("tab" = Option<String>, Query, description = "active (default) or completed"),
        ("status" = Option<String>, Query, description = "Filter by order status"),
        ("done_on" = Option<String>, Query, description = "Orders completed on this day"),
        ("waiting" = Option<String>, Query, description = "1: only orders with waiting tickets"),
        ("q" = Option<String>, Query, description = "Smart search query"),
        ("page" = Option<usize>, Query, description = "1-based page, 50 rows per page")
    ),
    responses(
        (status = 200, description = "Panel rows", body = [PanelRowView]),
        (status = 403, description = "Staff only")
    )
)]
pub async fn staff_panel(
    auth: Auth,
    data: web::Data<AppState>,
    query: web::Query<PanelQuery>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Staff);
    let query = query.into_inner();
    let tab = match query.tab.as_deref() {
        Some("completed") => Some(PanelTab::Completed),
        _ => Some(PanelTab::Active),
    };
    let status = match query.status.as_deref() {
        Some(raw) if !raw.is_empty() => Some(
            OrderStatus::parse(raw)
                .ok_or_else(|| ApiError::Validation(format!("unknown status '{raw}'")))?,
        ),
        _ => None,
    };
    let filter = PanelFilter {
        tab,
        status,
        done_on: query.done_on,
        waiting_tickets_only: query.waiting.as_deref() == Some("1"),
    };
    let mut rows = data.repo().panel_rows(filter).await?;
    if let Some(q) = query.q.as_deref() {
        if !q.trim().is_empty() {
            rows = smart_search(rows, q);
        }
    }
    let rows = page_slice(rows, query.page.unwrap_or(1), PANEL_PAGE_SIZE);
    let today = Utc::now().date_naive();
    let views: Vec<PanelRowView> = rows.into_iter().map(|r| row_view(r, today)).collect();
    Ok(HttpResponse::Ok().json(views))
}

#[utoipa::path(
    get,
    path = "/api/v1/dashboard",
    responses(
        (status = 200, description = "KPI counters", body = crate::dashboard::DashboardCounts),
        (status = 403, description = "Staff only")
    )
)]
pub async fn staff_dashboard(
    auth: Auth,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Staff);
    let counts = staff_dashboard_counts(
        data.repo(),
        data.lifecycle.cache(),
        Utc::now().date_naive(),
        data.dashboard_ttl,
    )
    .await?;
    Ok(HttpResponse::Ok().json(counts))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PackageView {
    pub key: &'static str,
    pub label: &'static str,
    pub price: String,
    pub work_done: &'static str,
}

pub async fn list_packages(auth: Auth) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Staff);
    let packages: Vec<PackageView> = service_packages()
        .iter()
        .map(|p| PackageView {
            key: p.key,
            label: p.label,
            price: p.price.to_string(),
            work_done: p.work_done,
        })
        .collect();
    Ok(HttpResponse::Ok().json(packages))
}

// ---------------- Customers and bikes -----------------------------

pub async fn list_customers(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Staff);
    let customers = data.repo().list_customers().await?;
    Ok(HttpResponse::Ok().json(customers))
}

#[utoipa::path(
    post,
    path = "/api/v1/customers",
    request_body = NewCustomer,
    responses(
        (status = 201, description = "Customer created", body = CustomerProfile),
        (status = 422, description = "Validation failed"),
        (status = 403, description = "Staff only")
    )
)]
pub async fn create_customer(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewCustomer>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Staff);
    let new = payload.into_inner();
    if new.full_name.trim().is_empty() && new.email.trim().is_empty() {
        return Err(ApiError::Validation("name or email is required".to_string()));
    }
    if !new.email.trim().is_empty() {
        if let Some(existing) = data.repo().find_customer_by_email(&new.email).await? {
            // Dedup on the email natural key instead of creating a twin.
            return Ok(HttpResponse::Ok().json(existing));
        }
    }
    let customer = data.repo().create_customer(new).await?;
    Ok(HttpResponse::Created().json(customer))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CustomerDetail {
    pub customer: CustomerProfile,
    pub bikes: Vec<Bike>,
    pub orders: Vec<ServiceOrder>,
    pub loyalty: crate::loyalty::LoyaltyStats,
}

pub async fn get_customer(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Staff);
    let id = path.into_inner();
    let customer = data.repo().get_customer(id).await?;
    let bikes = data.repo().bikes_for_customer(id).await?;
    let orders = data.repo().orders_for_customer(id).await?;
    let loyalty = loyalty_stats(data.repo().total_paid_for_customer(id).await?);
    Ok(HttpResponse::Ok().json(CustomerDetail { customer, bikes, orders, loyalty }))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LinkRequest {
    pub user_sub: String,
}

/// Attach a portal login to an existing customer profile.
pub async fn link_customer(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<LinkRequest>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Staff);
    let sub = payload.user_sub.trim();
    if sub.is_empty() {
        return Err(ApiError::Validation("user_sub must not be empty".to_string()));
    }
    let customer = data.repo().link_customer_user(path.into_inner(), sub).await?;
    Ok(HttpResponse::Ok().json(customer))
}

pub async fn create_bike(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewBike>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Staff);
    let bike = data.repo().create_bike(payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(bike))
}

// ---------------- Orders ------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = NewOrder,
    responses(
        (status = 201, description = "Order created", body = ServiceOrder),
        (status = 404, description = "Bike not found"),
        (status = 403, description = "Staff only")
    )
)]
pub async fn create_order(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewOrder>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Staff);
    let order = data.repo().create_order(payload.into_inner()).await?;
    invalidate_dashboard_cache(data.lifecycle.cache()).await;
    Ok(HttpResponse::Created().json(order))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderDetail {
    pub order: ServiceOrder,
    pub bike: Bike,
    pub customer: CustomerProfile,
    pub eta: EtaMeta,
    pub tickets: Vec<Ticket>,
    pub logs: Vec<ServiceOrderLog>,
    pub photos: Vec<ServiceOrderPhoto>,
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Id, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with joined context", body = OrderDetail),
        (status = 404, description = "Order not found")
    )
)]
pub async fn get_order_detail(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Staff);
    let id = path.into_inner();
    let ctx = data.repo().get_order_context(id).await?;
    let eta = classify(
        ctx.order.promised_date,
        ctx.order.completed_at.is_some(),
        Utc::now().date_naive(),
    );
    let tickets = data.repo().tickets_for_order(id).await?;
    let logs = data.repo().logs_for_order(id).await?;
    let photos = data.repo().photos_for_order(id).await?;
    Ok(HttpResponse::Ok().json(OrderDetail {
        order: ctx.order,
        bike: ctx.bike,
        customer: ctx.customer,
        eta,
        tickets,
        logs,
        photos,
    }))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OrderEditRequest {
    pub status: Option<String>,
    /// Raw form value; decimal comma accepted.
    pub price: Option<String>,
    pub issue_description: Option<String>,
    pub work_done: Option<String>,
    /// Empty string clears the promised date.
    pub promised_date: Option<String>,
    /// Keys of ticked checklist items. Absent leaves the checklist untouched.
    pub checklist: Option<Vec<String>>,
}

fn parse_edit(req: OrderEditRequest) -> Result<OrderEdit, ApiError> {
    let status = req
        .status
        .as_deref()
        .map(|raw| {
            OrderStatus::parse(raw)
                .ok_or_else(|| ApiError::Validation(format!("unknown status '{raw}'")))
        })
        .transpose()?;
    let promised_date = req
        .promised_date
        .as_deref()
        .map(|raw| {
            let raw = raw.trim();
            if raw.is_empty() {
                Ok(None)
            } else {
                NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .map(Some)
                    .map_err(|_| ApiError::Validation(format!("invalid date '{raw}'")))
            }
        })
        .transpose()?;
    Ok(OrderEdit {
        status,
        price: req.price,
        issue_description: req.issue_description,
        work_done: req.work_done,
        promised_date,
        checklist_keys: req.checklist,
    })
}

#[utoipa::path(
    patch,
    path = "/api/v1/orders/{id}",
    request_body = OrderEditRequest,
    params(("id" = Id, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order updated", body = ServiceOrder),
        (status = 422, description = "Validation failed, nothing written"),
        (status = 404, description = "Order not found")
    )
)]
pub async fn update_order(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<OrderEditRequest>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Staff);
    let edit = parse_edit(payload.into_inner())?;
    let order =
        data.lifecycle.apply_edit(path.into_inner(), edit, Some(auth.sub())).await?;
    Ok(HttpResponse::Ok().json(order))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StatusRequest {
    pub status: String,
}

pub async fn set_order_status(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<StatusRequest>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Staff);
    let status = OrderStatus::parse(&payload.status)
        .ok_or_else(|| ApiError::Validation(format!("unknown status '{}'", payload.status)))?;
    let order = data.lifecycle.set_status(path.into_inner(), status, Some(auth.sub())).await?;
    Ok(HttpResponse::Ok().json(order))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PackageRequest {
    pub key: String,
}

pub async fn apply_package(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<PackageRequest>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Staff);
    let order = data.lifecycle.apply_package(path.into_inner(), &payload.key).await?;
    Ok(HttpResponse::Ok().json(order))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SentResponse {
    pub sent: bool,
}

pub async fn invite_portal(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Staff);
    let id = path.into_inner();
    let order = data.repo().get_order(id).await?;
    let url =
        format!("{}/my/orders?order={}", data.portal_url, urlencoding::encode(&order.code()));
    let sent = data.lifecycle.invite_customer_portal(id, &url, Some(auth.sub())).await?;
    Ok(HttpResponse::Ok().json(SentResponse { sent }))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SmsRequest {
    pub text: String,
}

pub async fn send_sms(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<SmsRequest>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Staff);
    let sent = data.lifecycle.send_sms(path.into_inner(), &payload.text, Some(auth.sub())).await?;
    Ok(HttpResponse::Ok().json(SentResponse { sent }))
}

pub async fn download_protocol(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Staff);
    let ctx = data.repo().get_order_context(path.into_inner()).await?;
    let bytes = data.renderer.render(&ProtocolData::from_context(&ctx));
    let filename = format!("protocol-{}.{}", ctx.order.code(), data.renderer.file_extension());
    Ok(HttpResponse::Ok()
        .insert_header(("Content-Type", data.renderer.content_type()))
        .insert_header((
            "Content-Disposition",
            format!("attachment; filename=\"{filename}\""),
        ))
        .body(bytes))
}

pub async fn email_protocol(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Staff);
    let sent = data
        .lifecycle
        .send_protocol_email(path.into_inner(), data.renderer.as_ref(), Some(auth.sub()))
        .await?;
    Ok(HttpResponse::Ok().json(SentResponse { sent }))
}

// ---------------- Order intake ------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct IntakeRequest {
    pub full_name: String,
    pub email: String,
    pub phone_number: String,
    pub brand: String,
    pub model: String,
    #[serde(default)]
    pub serial_number: String,
    pub issue_description: String,
    #[serde(default)]
    pub service_code: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IntakeResponse {
    pub customer: CustomerProfile,
    pub bike: Bike,
    pub order: ServiceOrder,
}

/// One-shot intake: dedup the customer on email, register the bike and open
/// the order.
#[utoipa::path(
    post,
    path = "/api/v1/intake",
    request_body = IntakeRequest,
    responses(
        (status = 201, description = "Order opened", body = IntakeResponse),
        (status = 422, description = "Validation failed"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn order_intake(
    req: HttpRequest,
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<IntakeRequest>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Staff);
    if !data.rate.allow_intake(&client_ip(&req)) {
        return Ok(HttpResponse::TooManyRequests().finish());
    }
    let intake = payload.into_inner();
    if intake.issue_description.trim().is_empty() {
        return Err(ApiError::Validation("issue description is required".to_string()));
    }
    if intake.email.trim().is_empty() && intake.phone_number.trim().is_empty() {
        return Err(ApiError::Validation("email or phone number is required".to_string()));
    }

    // Dedup on email first, then on phone for walk-ins without one.
    let mut customer = None;
    if !intake.email.trim().is_empty() {
        customer = data.repo().find_customer_by_email(&intake.email).await?;
    }
    if customer.is_none() && !intake.phone_number.trim().is_empty() {
        customer = data.repo().find_customer_by_phone(intake.phone_number.trim()).await?;
    }
    let customer = match customer {
        Some(existing) => existing,
        None => {
            data.repo()
                .create_customer(NewCustomer {
                    full_name: intake.full_name,
                    email: intake.email,
                    phone_number: intake.phone_number,
                })
                .await?
        }
    };
    let bike = data
        .repo()
        .create_bike(NewBike {
            customer_id: customer.id,
            brand: intake.brand,
            model: intake.model,
            serial_number: intake.serial_number,
        })
        .await?;
    let order = data
        .repo()
        .create_order(NewOrder {
            bike_id: bike.id,
            issue_description: intake.issue_description,
            service_code: intake.service_code,
        })
        .await?;
    invalidate_dashboard_cache(data.lifecycle.cache()).await;
    Ok(HttpResponse::Created().json(IntakeResponse { customer, bike, order }))
}

// ---------------- Photos ------------------------------------------

const PHOTO_SIZE_LIMIT: usize = 10 * 1024 * 1024; // 10 MB

const ALLOWED_MIME: &[&str] = &["image/png", "image/jpeg", "image/gif", "image/webp"];

#[derive(Debug, Serialize, ToSchema)]
pub struct PhotoUploadResponse {
    pub hash: String,
    pub mime: String,
    pub size: usize,
    pub duplicate: bool, // true when upload was a duplicate (idempotent)
}

pub async fn list_photos(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Staff);
    let photos = data.repo().photos_for_order(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(photos))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/photos",
    params(("id" = Id, Path, description = "Order id")),
    responses(
        (status = 201, description = "Photo stored (new)", body = PhotoUploadResponse),
        (status = 200, description = "Photo already existed (idempotent)", body = PhotoUploadResponse),
        (status = 415, description = "Unsupported media type"),
        (status = 413, description = "Payload too large")
    )
)]
pub async fn upload_photo(
    req: HttpRequest,
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    use actix_web::http::StatusCode;
    require_role!(auth, Role::Staff);
    if !data.rate.allow_photo(&client_ip(&req)) {
        return Ok(HttpResponse::TooManyRequests().finish());
    }
    let order_id = path.into_inner();
    // 404 before we bother reading the body.
    data.repo().get_order(order_id).await?;

    let mut bytes: Vec<u8> = Vec::new();
    while let Some(field) = payload.try_next().await.map_err(|e| {
        log::error!("multipart error: {e}");
        ApiError::Internal
    })? {
        if field.content_disposition().get_name() != Some("file") {
            continue;
        }
        let mut field_stream = field;
        while let Some(chunk) = field_stream.try_next().await.map_err(|e| {
            log::error!("stream read error: {e}");
            ApiError::Internal
        })? {
            if bytes.len() + chunk.len() > PHOTO_SIZE_LIMIT {
                return Ok(HttpResponse::build(StatusCode::PAYLOAD_TOO_LARGE).finish());
            }
            bytes.extend_from_slice(&chunk);
        }
        let hash = content_hash(&bytes);
        let mime = infer::get(&bytes)
            .map(|t| t.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        if !ALLOWED_MIME.contains(&mime.as_str()) {
            return Ok(HttpResponse::UnsupportedMediaType().finish());
        }
        let (status_code, duplicate) = match data.photo_store.save(&hash, &mime, &bytes).await {
            Ok(()) => (StatusCode::CREATED, false),
            Err(PhotoStoreError::Duplicate) => (StatusCode::OK, true),
            Err(e) => {
                log::error!("photo store save error: {e}");
                return Err(ApiError::Internal);
            }
        };
        // Same bytes may legitimately belong to a second order.
        let already_linked = data
            .repo()
            .photos_for_order(order_id)
            .await?
            .iter()
            .any(|p| p.hash == hash);
        if !already_linked {
            data.repo().add_photo(order_id, &hash, &mime).await?;
        }
        let resp = PhotoUploadResponse { hash, mime, size: bytes.len(), duplicate };
        return Ok(HttpResponse::build(status_code).json(resp));
    }
    Err(ApiError::BadRequest)
}

/// Serve a stored photo by hash.
pub async fn get_photo(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let hash = path.into_inner();
    if hash.len() < 2 {
        return Err(ApiError::NotFound);
    }
    match data.photo_store.load(&hash).await {
        Ok((bytes, mime)) => {
            Ok(HttpResponse::Ok().insert_header(("Content-Type", mime)).body(bytes))
        }
        Err(PhotoStoreError::NotFound) => Err(ApiError::NotFound),
        Err(e) => {
            log::error!("photo store load error: {e}");
            Err(ApiError::Internal)
        }
    }
}

// ---------------- Staff tickets -----------------------------------

#[derive(Debug, Deserialize)]
pub struct TicketListQuery {
    pub status: Option<String>,
    pub q: Option<String>,
}

pub async fn list_tickets(
    auth: Auth,
    data: web::Data<AppState>,
    query: web::Query<TicketListQuery>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Staff);
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|raw| {
            TicketStatus::parse(raw)
                .ok_or_else(|| ApiError::Validation(format!("unknown status '{raw}'")))
        })
        .transpose()?;
    let mut tickets = data.repo().list_tickets(status).await?;
    if let Some(q) = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let needle = q.to_lowercase();
        tickets.retain(|t| {
            [
                t.ticket.subject.as_str(),
                t.ticket.message.as_str(),
                t.customer_name.as_str(),
                t.customer_email.as_str(),
                t.order_code.as_str(),
            ]
            .iter()
            .any(|f| f.to_lowercase().contains(&needle))
        });
    }
    Ok(HttpResponse::Ok().json(tickets))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TicketThread {
    pub ticket: Ticket,
    pub messages: Vec<TicketMessage>,
}

pub async fn get_ticket(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Staff);
    let id = path.into_inner();
    let ticket = data.repo().get_ticket(id).await?;
    let messages = data.repo().ticket_messages(id).await?;
    Ok(HttpResponse::Ok().json(TicketThread { ticket, messages }))
}

pub async fn set_ticket_status(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<StatusRequest>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Staff);
    let status = TicketStatus::parse(&payload.status)
        .ok_or_else(|| ApiError::Validation(format!("unknown status '{}'", payload.status)))?;
    let ticket = data.repo().set_ticket_status(path.into_inner(), status).await?;
    invalidate_dashboard_cache(data.lifecycle.cache()).await;
    Ok(HttpResponse::Ok().json(ticket))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TicketMessageRequest {
    pub message: String,
}

/// Staff reply: the ball moves to the customer's court.
pub async fn staff_ticket_reply(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<TicketMessageRequest>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Staff);
    let id = path.into_inner();
    let body = payload.message.trim().to_string();
    if body.is_empty() {
        return Err(ApiError::Validation("message must not be empty".to_string()));
    }
    let msg = data
        .repo()
        .append_ticket_message(id, MessageRole::Admin, Some(auth.sub().to_string()), body)
        .await?;
    data.repo().set_ticket_status(id, TicketStatus::WaitingCustomer).await?;
    invalidate_dashboard_cache(data.lifecycle.cache()).await;
    Ok(HttpResponse::Created().json(msg))
}

// ---------------- Customer portal ---------------------------------

async fn portal_customer(data: &AppState, auth: &Auth) -> Result<CustomerProfile, ApiError> {
    data.repo()
        .find_customer_by_user(auth.sub())
        .await?
        .ok_or(ApiError::NotFound)
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MyOrderView {
    pub order: ServiceOrder,
    pub eta: EtaMeta,
}

#[utoipa::path(
    get,
    path = "/api/v1/my/orders",
    responses(
        (status = 200, description = "The caller's service orders", body = [MyOrderView]),
        (status = 404, description = "No customer profile linked to this login")
    )
)]
pub async fn my_orders(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Customer | Role::Staff);
    let customer = portal_customer(&data, &auth).await?;
    let orders = data.repo().orders_for_customer(customer.id).await?;
    let today = Utc::now().date_naive();
    let views: Vec<MyOrderView> = orders
        .into_iter()
        .map(|order| MyOrderView {
            eta: classify(order.promised_date, order.completed_at.is_some(), today),
            order,
        })
        .collect();
    Ok(HttpResponse::Ok().json(views))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MyBikeView {
    pub bike: Bike,
    pub last_order: Option<ServiceOrder>,
}

pub async fn my_bikes(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Customer | Role::Staff);
    let customer = portal_customer(&data, &auth).await?;
    let bikes = data.repo().bikes_for_customer(customer.id).await?;
    let mut views = Vec::with_capacity(bikes.len());
    for bike in bikes {
        let last_order = data.repo().latest_order_for_bike(bike.id).await?;
        views.push(MyBikeView { bike, last_order });
    }
    Ok(HttpResponse::Ok().json(views))
}

pub async fn my_loyalty(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Customer | Role::Staff);
    let customer = portal_customer(&data, &auth).await?;
    let stats = loyalty_stats(data.repo().total_paid_for_customer(customer.id).await?);
    Ok(HttpResponse::Ok().json(stats))
}

pub async fn my_tickets(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Customer | Role::Staff);
    let customer = portal_customer(&data, &auth).await?;
    let tickets = data.repo().tickets_for_customer(customer.id).await?;
    Ok(HttpResponse::Ok().json(tickets))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct NewTicketRequest {
    pub subject: String,
    pub message: String,
}

async fn order_belongs_to(data: &AppState, order_id: Id, customer_id: Id) -> Result<(), ApiError> {
    let ctx = data.repo().get_order_context(order_id).await?;
    if ctx.customer.id != customer_id {
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

pub async fn my_open_ticket(
    req: HttpRequest,
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<NewTicketRequest>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Customer | Role::Staff);
    if !data.rate.allow_ticket(&client_ip(&req)) {
        return Ok(HttpResponse::TooManyRequests().finish());
    }
    let customer = portal_customer(&data, &auth).await?;
    let order_id = path.into_inner();
    order_belongs_to(&data, order_id, customer.id).await?;
    let order = data.repo().get_order(order_id).await?;
    let mut subject = payload.subject.trim().to_string();
    if subject.is_empty() {
        subject = format!("Question about service #{}", order.code());
    }
    let message = payload.message.trim().to_string();
    if message.is_empty() {
        return Err(ApiError::Validation("message must not be empty".to_string()));
    }
    let ticket = data
        .repo()
        .create_ticket(order_id, subject, message, TicketStatus::WaitingAdmin)
        .await?;
    invalidate_dashboard_cache(data.lifecycle.cache()).await;
    Ok(HttpResponse::Created().json(ticket))
}

async fn owned_ticket(data: &AppState, auth: &Auth, ticket_id: Id) -> Result<Ticket, ApiError> {
    let customer = portal_customer(data, auth).await?;
    let ticket = data.repo().get_ticket(ticket_id).await?;
    order_belongs_to(data, ticket.order_id, customer.id).await?;
    Ok(ticket)
}

pub async fn my_ticket_thread(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Customer | Role::Staff);
    let ticket = owned_ticket(&data, &auth, path.into_inner()).await?;
    let messages = data.repo().ticket_messages(ticket.id).await?;
    Ok(HttpResponse::Ok().json(TicketThread { ticket, messages }))
}

/// Customer reply: the ball moves back to staff.
pub async fn my_ticket_reply(
    req: HttpRequest,
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<TicketMessageRequest>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Customer | Role::Staff);
    if !data.rate.allow_ticket(&client_ip(&req)) {
        return Ok(HttpResponse::TooManyRequests().finish());
    }
    let ticket = owned_ticket(&data, &auth, path.into_inner()).await?;
    if ticket.status == TicketStatus::Closed {
        return Err(ApiError::Validation("ticket is closed".to_string()));
    }
    let body = payload.message.trim().to_string();
    if body.is_empty() {
        return Err(ApiError::Validation("message must not be empty".to_string()));
    }
    let msg = data
        .repo()
        .append_ticket_message(
            ticket.id,
            MessageRole::Customer,
            Some(auth.sub().to_string()),
            body,
        )
        .await?;
    data.repo().set_ticket_status(ticket.id, TicketStatus::WaitingAdmin).await?;
    invalidate_dashboard_cache(data.lifecycle.cache()).await;
    Ok(HttpResponse::Created().json(msg))
}

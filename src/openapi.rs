use crate::models::{
    Bike, CustomerProfile, LogKind, MessageRole, NewBike, NewCustomer, NewOrder, OrderStatus,
    ServiceOrder, ServiceOrderLog, ServiceOrderPhoto, Ticket, TicketMessage, TicketStatus,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::staff_panel,
        crate::routes::staff_dashboard,
        crate::routes::create_customer,
        crate::routes::create_order,
        crate::routes::get_order_detail,
        crate::routes::update_order,
        crate::routes::order_intake,
        crate::routes::upload_photo,
        crate::routes::my_orders,
    ),
    components(schemas(
        CustomerProfile, NewCustomer, Bike, NewBike, ServiceOrder, NewOrder,
        OrderStatus, Ticket, TicketStatus, TicketMessage, MessageRole,
        ServiceOrderLog, LogKind, ServiceOrderPhoto,
        crate::dashboard::DashboardCounts,
        crate::loyalty::LoyaltyStats,
        crate::eta::EtaMeta, crate::eta::EtaSeverity,
        crate::checklist::Checklist,
        crate::repo::TicketOverview,
        crate::routes::PanelRowView, crate::routes::OrderDetail,
        crate::routes::OrderEditRequest, crate::routes::StatusRequest,
        crate::routes::PackageRequest, crate::routes::SmsRequest,
        crate::routes::IntakeRequest, crate::routes::IntakeResponse,
        crate::routes::PhotoUploadResponse, crate::routes::SentResponse,
        crate::routes::NewTicketRequest, crate::routes::TicketMessageRequest,
        crate::routes::MyOrderView, crate::routes::MyBikeView,
        crate::routes::CustomerDetail,
    )),
    tags(
        (name = "panel", description = "Staff panel and dashboard"),
        (name = "orders", description = "Service order lifecycle"),
        (name = "tickets", description = "Customer tickets"),
        (name = "portal", description = "Customer self-service"),
    )
)]
pub struct ApiDoc;

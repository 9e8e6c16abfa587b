use blackbike::models::*;
use blackbike::repo::inmem::InMemRepo;
use blackbike::repo::{
    BikeRepo, CustomerRepo, LogRepo, OrderChanges, OrderRepo, Repo, RepoError, TicketRepo,
};
use chrono::Utc;
use rust_decimal::Decimal;

async fn seed(repo: &dyn Repo) -> (CustomerProfile, Bike, ServiceOrder) {
    let customer = repo
        .create_customer(NewCustomer {
            full_name: "Jana Kovacova".into(),
            email: "Jana@Example.COM".into(),
            phone_number: "0905 111 222".into(),
        })
        .await
        .unwrap();
    let bike = repo
        .create_bike(NewBike {
            customer_id: customer.id,
            brand: "Canyon".into(),
            model: "Spectral".into(),
            serial_number: "SN-1".into(),
        })
        .await
        .unwrap();
    let order = repo
        .create_order(NewOrder {
            bike_id: bike.id,
            issue_description: "creaking bottom bracket".into(),
            service_code: "ABC-7".into(),
        })
        .await
        .unwrap();
    (customer, bike, order)
}

#[tokio::test]
async fn customer_email_is_normalized_and_deduped() {
    let repo = InMemRepo::ephemeral();
    let (customer, _, _) = seed(&repo).await;
    assert_eq!(customer.email, "jana@example.com");

    let found = repo.find_customer_by_email("  JANA@example.com ").await.unwrap();
    assert_eq!(found.unwrap().id, customer.id);
    assert!(repo.find_customer_by_email("nobody@example.com").await.unwrap().is_none());
}

#[tokio::test]
async fn new_orders_start_clean() {
    let repo = InMemRepo::ephemeral();
    let (_, _, order) = seed(&repo).await;
    assert_eq!(order.status, OrderStatus::New);
    assert_eq!(order.price, Decimal::ZERO);
    assert!(order.completed_at.is_none());
    assert!(order.promised_date.is_none());
    assert_eq!(order.code(), "ABC-7");
}

#[tokio::test]
async fn creating_against_missing_parents_fails() {
    let repo = InMemRepo::ephemeral();
    let bike = repo
        .create_bike(NewBike {
            customer_id: 999,
            brand: "X".into(),
            model: "Y".into(),
            serial_number: String::new(),
        })
        .await;
    assert!(matches!(bike, Err(RepoError::NotFound)));

    let order = repo
        .create_order(NewOrder {
            bike_id: 999,
            issue_description: "x".into(),
            service_code: String::new(),
        })
        .await;
    assert!(matches!(order, Err(RepoError::NotFound)));
}

#[tokio::test]
async fn update_order_can_clear_promised_date() {
    let repo = InMemRepo::ephemeral();
    let (_, _, order) = seed(&repo).await;
    let day = chrono::NaiveDate::from_ymd_opt(2025, 6, 20).unwrap();

    let updated = repo
        .update_order(order.id, OrderChanges { promised_date: Some(Some(day)), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(updated.promised_date, Some(day));

    let cleared = repo
        .update_order(order.id, OrderChanges { promised_date: Some(None), ..Default::default() })
        .await
        .unwrap();
    assert!(cleared.promised_date.is_none());
}

#[tokio::test]
async fn panel_rows_filter_by_tab_status_and_waiting_tickets() {
    let repo = InMemRepo::ephemeral();
    let (_, bike, active) = seed(&repo).await;
    let done = repo
        .create_order(NewOrder {
            bike_id: bike.id,
            issue_description: "flat tyre".into(),
            service_code: String::new(),
        })
        .await
        .unwrap();
    repo.update_order(
        done.id,
        OrderChanges { status: Some((OrderStatus::Done, Some(Utc::now()))), ..Default::default() },
    )
    .await
    .unwrap();

    let active_rows = repo
        .panel_rows(PanelFilter { tab: Some(PanelTab::Active), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(active_rows.len(), 1);
    assert_eq!(active_rows[0].order.id, active.id);

    let completed_rows = repo
        .panel_rows(PanelFilter { tab: Some(PanelTab::Completed), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(completed_rows.len(), 1);
    assert_eq!(completed_rows[0].order.id, done.id);

    let done_today = repo
        .panel_rows(PanelFilter {
            tab: Some(PanelTab::Completed),
            done_on: Some(Utc::now().date_naive()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(done_today.len(), 1);

    // No waiting tickets yet.
    let waiting = repo
        .panel_rows(PanelFilter { waiting_tickets_only: true, ..Default::default() })
        .await
        .unwrap();
    assert!(waiting.is_empty());

    repo.create_ticket(active.id, "rattling".into(), "still rattles".into(), TicketStatus::Open)
        .await
        .unwrap();
    let waiting = repo
        .panel_rows(PanelFilter { waiting_tickets_only: true, ..Default::default() })
        .await
        .unwrap();
    assert_eq!(waiting.len(), 1);
    assert!(waiting[0].has_waiting_ticket);
    assert!(waiting[0].ticket_texts.iter().any(|t| t == "rattling"));
}

#[tokio::test]
async fn ticket_replies_touch_updated_at_and_feed_the_backlog() {
    let repo = InMemRepo::ephemeral();
    let (_, _, order) = seed(&repo).await;
    let ticket = repo
        .create_ticket(order.id, "question".into(), "when is it done?".into(), TicketStatus::Open)
        .await
        .unwrap();

    assert_eq!(repo.count_tickets_waiting_on_staff().await.unwrap(), 1);
    assert_eq!(repo.count_tickets_open().await.unwrap(), 1);

    let before = repo.get_ticket(ticket.id).await.unwrap().updated_at;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    repo.append_ticket_message(ticket.id, MessageRole::Admin, Some("staff:1".into()), "tomorrow".into())
        .await
        .unwrap();
    let after = repo.get_ticket(ticket.id).await.unwrap().updated_at;
    assert!(after > before);

    repo.set_ticket_status(ticket.id, TicketStatus::WaitingCustomer).await.unwrap();
    assert_eq!(repo.count_tickets_waiting_on_staff().await.unwrap(), 0);
    assert_eq!(repo.count_tickets_open().await.unwrap(), 1);

    repo.set_ticket_status(ticket.id, TicketStatus::Closed).await.unwrap();
    assert_eq!(repo.count_tickets_open().await.unwrap(), 0);

    let messages = repo.ticket_messages(ticket.id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, MessageRole::Admin);
}

#[tokio::test]
async fn stats_counters_track_order_state() {
    let repo = InMemRepo::ephemeral();
    let (_, bike, first) = seed(&repo).await;
    let second = repo
        .create_order(NewOrder {
            bike_id: bike.id,
            issue_description: "worn chain".into(),
            service_code: String::new(),
        })
        .await
        .unwrap();

    assert_eq!(repo.count_unfinished_with_status(OrderStatus::New).await.unwrap(), 2);
    assert_eq!(repo.count_not_done().await.unwrap(), 2);

    repo.update_order(
        first.id,
        OrderChanges { status: Some((OrderStatus::InProgress, None)), ..Default::default() },
    )
    .await
    .unwrap();
    assert_eq!(repo.count_unfinished_with_status(OrderStatus::New).await.unwrap(), 1);
    assert_eq!(repo.count_unfinished_with_status(OrderStatus::InProgress).await.unwrap(), 1);

    repo.update_order(
        second.id,
        OrderChanges {
            status: Some((OrderStatus::Done, Some(Utc::now()))),
            price: Some(Decimal::new(6900, 2)),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let today = Utc::now().date_naive();
    assert_eq!(repo.count_completed_on(today).await.unwrap(), 1);
    assert_eq!(repo.count_completed_since(today).await.unwrap(), 1);
    assert_eq!(repo.count_not_done().await.unwrap(), 1);

    let spans = repo.recent_completed_spans(200).await.unwrap();
    assert_eq!(spans.len(), 1);
    assert!(spans[0].1 >= spans[0].0);
}

#[tokio::test]
async fn completed_orders_sum_into_the_loyalty_total() {
    let repo = InMemRepo::ephemeral();
    let (customer, bike, order) = seed(&repo).await;

    // Open orders do not count.
    repo.update_order(
        order.id,
        OrderChanges { price: Some(Decimal::new(2900, 2)), ..Default::default() },
    )
    .await
    .unwrap();
    assert_eq!(repo.total_paid_for_customer(customer.id).await.unwrap(), Decimal::ZERO);

    repo.update_order(
        order.id,
        OrderChanges { status: Some((OrderStatus::Done, Some(Utc::now()))), ..Default::default() },
    )
    .await
    .unwrap();
    assert_eq!(
        repo.total_paid_for_customer(customer.id).await.unwrap(),
        Decimal::new(2900, 2)
    );

    let latest = repo.latest_order_for_bike(bike.id).await.unwrap();
    assert_eq!(latest.unwrap().id, order.id);
}

#[tokio::test]
#[serial_test::serial]
async fn snapshot_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("BB_DATA_DIR", dir.path());

    let repo = InMemRepo::new();
    let (customer, _, order) = seed(&repo).await;
    drop(repo);

    let reloaded = InMemRepo::new();
    let again = reloaded.get_order(order.id).await.unwrap();
    assert_eq!(again.issue_description, "creaking bottom bracket");
    assert_eq!(reloaded.get_customer(customer.id).await.unwrap().email, "jana@example.com");

    std::env::remove_var("BB_DATA_DIR");
}

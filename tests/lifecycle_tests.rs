use std::sync::{Arc, Mutex};
use std::time::Duration;

use blackbike::cache::InMemoryCache;
use blackbike::dashboard::staff_dashboard_counts;
use blackbike::lifecycle::{OrderEdit, OrderLifecycle};
use blackbike::models::*;
use blackbike::notify::{Notifier, NotifyJob};
use blackbike::protocol::TextProtocolRenderer;
use blackbike::repo::inmem::InMemRepo;
use blackbike::repo::{BikeRepo, CustomerRepo, LogRepo, OrderRepo};
use chrono::Utc;
use rust_decimal::Decimal;

#[derive(Default)]
struct RecordingNotifier(Mutex<Vec<NotifyJob>>);

impl RecordingNotifier {
    fn jobs(&self) -> Vec<NotifyJob> {
        self.0.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn enqueue(&self, job: NotifyJob) -> bool {
        self.0.lock().unwrap().push(job);
        true
    }
}

struct Harness {
    repo: Arc<InMemRepo>,
    lifecycle: OrderLifecycle,
    notifier: Arc<RecordingNotifier>,
}

async fn harness_with_email(email: &str) -> (Harness, ServiceOrder) {
    let repo = Arc::new(InMemRepo::ephemeral());
    let cache = Arc::new(InMemoryCache::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let lifecycle =
        OrderLifecycle::new(repo.clone(), cache, notifier.clone());

    let customer = repo
        .create_customer(NewCustomer {
            full_name: "Peter Novak".into(),
            email: email.into(),
            phone_number: "0907 333 444".into(),
        })
        .await
        .unwrap();
    let bike = repo
        .create_bike(NewBike {
            customer_id: customer.id,
            brand: "Trek".into(),
            model: "Marlin".into(),
            serial_number: String::new(),
        })
        .await
        .unwrap();
    let order = repo
        .create_order(NewOrder {
            bike_id: bike.id,
            issue_description: "brakes rubbing".into(),
            service_code: String::new(),
        })
        .await
        .unwrap();
    (Harness { repo, lifecycle, notifier }, order)
}

#[tokio::test]
async fn first_done_sets_completed_at_and_emails_once() {
    let (h, order) = harness_with_email("peter@example.com").await;

    let done = h.lifecycle.set_status(order.id, OrderStatus::Done, Some("staff:1")).await.unwrap();
    assert_eq!(done.status, OrderStatus::Done);
    let completed_at = done.completed_at.expect("completed_at set on first DONE");

    let jobs = h.notifier.jobs();
    assert_eq!(jobs.len(), 1);
    assert!(matches!(&jobs[0], NotifyJob::Email { to, .. } if to == &vec!["peter@example.com".to_string()]));
    let logs = h.repo.logs_for_order(order.id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].kind, LogKind::EmailDone);
    assert_eq!(logs[0].created_by.as_deref(), Some("staff:1"));

    // Saving DONE again must not re-stamp or re-send.
    let again = h.lifecycle.set_status(order.id, OrderStatus::Done, Some("staff:1")).await.unwrap();
    assert_eq!(again.completed_at, Some(completed_at));
    assert_eq!(h.notifier.jobs().len(), 1);
    assert_eq!(h.repo.logs_for_order(order.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn leaving_done_reopens_the_order() {
    let (h, order) = harness_with_email("peter@example.com").await;
    h.lifecycle.set_status(order.id, OrderStatus::Done, None).await.unwrap();

    let reopened =
        h.lifecycle.set_status(order.id, OrderStatus::InProgress, None).await.unwrap();
    assert_eq!(reopened.status, OrderStatus::InProgress);
    assert!(reopened.completed_at.is_none());

    // Completing again is a fresh first-DONE.
    let done = h.lifecycle.set_status(order.id, OrderStatus::Done, None).await.unwrap();
    assert!(done.completed_at.is_some());
    assert_eq!(h.notifier.jobs().len(), 2);
}

#[tokio::test]
async fn no_email_on_file_skips_both_mail_and_log() {
    let (h, order) = harness_with_email("").await;
    let done = h.lifecycle.set_status(order.id, OrderStatus::Done, None).await.unwrap();
    assert!(done.completed_at.is_some());
    assert!(h.notifier.jobs().is_empty());
    assert!(h.repo.logs_for_order(order.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_price_aborts_the_whole_edit() {
    let (h, order) = harness_with_email("peter@example.com").await;
    let edit = OrderEdit {
        status: Some(OrderStatus::Done),
        price: Some("not-a-number".into()),
        ..Default::default()
    };
    let err = h.lifecycle.apply_edit(order.id, edit, None).await;
    assert!(err.is_err());

    // Nothing was written, nothing was sent.
    let unchanged = h.repo.get_order(order.id).await.unwrap();
    assert_eq!(unchanged.status, OrderStatus::New);
    assert!(unchanged.completed_at.is_none());
    assert!(h.notifier.jobs().is_empty());
}

#[tokio::test]
async fn price_accepts_decimal_comma() {
    let (h, order) = harness_with_email("peter@example.com").await;
    let edit = OrderEdit { price: Some("49,90".into()), ..Default::default() };
    let updated = h.lifecycle.apply_edit(order.id, edit, None).await.unwrap();
    assert_eq!(updated.price, Decimal::new(4990, 2));
}

#[tokio::test]
async fn checklist_is_only_replaced_when_present() {
    let (h, order) = harness_with_email("peter@example.com").await;

    let edit = OrderEdit {
        checklist_keys: Some(vec!["brakes".into(), "chain".into()]),
        ..Default::default()
    };
    let updated = h.lifecycle.apply_edit(order.id, edit, None).await.unwrap();
    assert!(updated.checklist.brakes);
    assert!(updated.checklist.chain);

    // An edit without the checklist field leaves it alone.
    let edit = OrderEdit { work_done: Some("trued rear wheel".into()), ..Default::default() };
    let updated = h.lifecycle.apply_edit(order.id, edit, None).await.unwrap();
    assert!(updated.checklist.brakes);
    assert_eq!(updated.work_done, "trued rear wheel");

    // An empty checklist field clears every tick.
    let edit = OrderEdit { checklist_keys: Some(vec![]), ..Default::default() };
    let updated = h.lifecycle.apply_edit(order.id, edit, None).await.unwrap();
    assert!(!updated.checklist.brakes);
    assert!(!updated.checklist.chain);
}

#[tokio::test]
async fn package_overwrites_price_work_and_checklist() {
    let (h, order) = harness_with_email("peter@example.com").await;
    let edit = OrderEdit {
        price: Some("5.00".into()),
        work_done: Some("old notes".into()),
        checklist_keys: Some(vec!["cleaning".into()]),
        ..Default::default()
    };
    h.lifecycle.apply_edit(order.id, edit, None).await.unwrap();

    let updated = h.lifecycle.apply_package(order.id, "basic").await.unwrap();
    assert_eq!(updated.price, Decimal::new(2900, 2));
    assert!(updated.work_done.starts_with("Basic bike check"));
    assert!(updated.checklist.brakes);
    assert!(!updated.checklist.cleaning); // the old tick is gone

    assert!(h.lifecycle.apply_package(order.id, "no-such-package").await.is_err());
}

#[tokio::test]
async fn sms_and_protocol_email_land_in_the_audit_trail() {
    let (h, order) = harness_with_email("peter@example.com").await;

    assert!(h.lifecycle.send_sms(order.id, "bike is ready", Some("staff:1")).await.unwrap());
    assert!(h
        .lifecycle
        .send_protocol_email(order.id, &TextProtocolRenderer, Some("staff:1"))
        .await
        .unwrap());
    assert!(h
        .lifecycle
        .invite_customer_portal(order.id, "http://localhost/my", Some("staff:1"))
        .await
        .unwrap());

    let kinds: Vec<LogKind> =
        h.repo.logs_for_order(order.id).await.unwrap().iter().map(|l| l.kind).collect();
    assert!(kinds.contains(&LogKind::Sms));
    assert!(kinds.contains(&LogKind::EmailProtocol));
    assert!(kinds.contains(&LogKind::EmailInvite));

    // Blank SMS text is rejected before the queue and leaves no log.
    assert!(!h.lifecycle.send_sms(order.id, "   ", None).await.unwrap());
    assert_eq!(h.repo.logs_for_order(order.id).await.unwrap().len(), 3);
}

#[tokio::test]
async fn dashboard_reflects_mutations_within_one_read() {
    let repo = Arc::new(InMemRepo::ephemeral());
    let cache = Arc::new(InMemoryCache::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let lifecycle = OrderLifecycle::new(repo.clone(), cache.clone(), notifier);

    let customer = repo
        .create_customer(NewCustomer {
            full_name: "A".into(),
            email: "a@example.com".into(),
            phone_number: String::new(),
        })
        .await
        .unwrap();
    let bike = repo
        .create_bike(NewBike {
            customer_id: customer.id,
            brand: "B".into(),
            model: "M".into(),
            serial_number: String::new(),
        })
        .await
        .unwrap();
    let order = repo
        .create_order(NewOrder {
            bike_id: bike.id,
            issue_description: "x".into(),
            service_code: String::new(),
        })
        .await
        .unwrap();

    let today = Utc::now().date_naive();
    let ttl = Duration::from_secs(3600);
    let before = staff_dashboard_counts(repo.as_ref(), cache.as_ref(), today, ttl).await.unwrap();
    assert_eq!(before.orders_new, 1);
    assert_eq!(before.orders_done_today, 0);

    // A long TTL would serve the stale snapshot forever; the version bump from
    // the lifecycle must make the very next read recompute.
    lifecycle.set_status(order.id, OrderStatus::Done, None).await.unwrap();
    let after = staff_dashboard_counts(repo.as_ref(), cache.as_ref(), today, ttl).await.unwrap();
    assert_eq!(after.orders_new, 0);
    assert_eq!(after.orders_done_today, 1);
    assert_eq!(after.completed_last_7_days, 1);

    // Unchanged state is served from cache and stays consistent.
    let cached = staff_dashboard_counts(repo.as_ref(), cache.as_ref(), today, ttl).await.unwrap();
    assert_eq!(cached, after);
}

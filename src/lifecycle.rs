use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use log::info;
use rust_decimal::Decimal;

use crate::cache::CacheBackend;
use crate::checklist::{find_package, Checklist, ChecklistItem};
use crate::dashboard::invalidate_dashboard_cache;
use crate::error::ApiError;
use crate::models::*;
use crate::notify::{
    send_email_safely, send_email_with_attachment_safely, send_sms_safely, Notifier,
};
use crate::protocol::{ProtocolData, ProtocolRenderer};
use crate::repo::{LogRepo, OrderChanges, OrderRepo, Repo};

/// Staff edit of a service order. Absent fields are left untouched; the
/// checklist is replaced only when `checklist_keys` is present at all, so a
/// request that does not carry the checkbox group cannot wipe recorded work.
#[derive(Debug, Clone, Default)]
pub struct OrderEdit {
    pub status: Option<OrderStatus>,
    /// Raw form value; decimal comma accepted.
    pub price: Option<String>,
    pub issue_description: Option<String>,
    pub work_done: Option<String>,
    /// `Some(None)` clears the promised date.
    pub promised_date: Option<Option<NaiveDate>>,
    /// Keys of ticked checklist items; unknown keys are ignored.
    pub checklist_keys: Option<Vec<String>>,
}

impl OrderEdit {
    pub fn status_only(status: OrderStatus) -> Self {
        Self { status: Some(status), ..Default::default() }
    }
}

/// All mutations of a service order funnel through here so the status ⟺
/// completed_at invariant, the completion side effects and the dashboard
/// invalidation cannot be bypassed by an individual handler.
pub struct OrderLifecycle {
    repo: Arc<dyn Repo>,
    cache: Arc<dyn CacheBackend>,
    notifier: Arc<dyn Notifier>,
}

fn parse_price(raw: &str) -> Result<Decimal, ApiError> {
    let normalized = raw.trim().replace(',', ".");
    let price = Decimal::from_str(&normalized)
        .map_err(|_| ApiError::Validation(format!("invalid price '{raw}'")))?;
    if price < Decimal::ZERO {
        return Err(ApiError::Validation("price must not be negative".to_string()));
    }
    Ok(price.round_dp(2))
}

fn checklist_from_keys(keys: &[String]) -> Checklist {
    let items: Vec<ChecklistItem> = ChecklistItem::ALL
        .iter()
        .copied()
        .filter(|item| keys.iter().any(|k| k == item.key()))
        .collect();
    Checklist::from_items(&items)
}

impl OrderLifecycle {
    pub fn new(
        repo: Arc<dyn Repo>,
        cache: Arc<dyn CacheBackend>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { repo, cache, notifier }
    }

    pub fn repo(&self) -> &dyn Repo {
        self.repo.as_ref()
    }

    pub fn cache(&self) -> &dyn CacheBackend {
        self.cache.as_ref()
    }

    /// Apply a staff edit. Validation happens up front against the current
    /// row; on any validation error nothing is written.
    pub async fn apply_edit(
        &self,
        order_id: Id,
        edit: OrderEdit,
        actor: Option<&str>,
    ) -> Result<ServiceOrder, ApiError> {
        let current = self.repo.get_order(order_id).await?;

        let price = edit.price.as_deref().map(parse_price).transpose()?;

        let mut first_done = false;
        let status = edit.status.map(|new_status| {
            let completed_at: Option<DateTime<Utc>> = match (current.status, new_status) {
                (OrderStatus::Done, OrderStatus::Done) => current.completed_at,
                (_, OrderStatus::Done) => {
                    first_done = true;
                    Some(Utc::now())
                }
                // Leaving DONE reopens the order.
                (OrderStatus::Done, _) => None,
                _ => current.completed_at,
            };
            (new_status, completed_at)
        });

        let changes = OrderChanges {
            status,
            price,
            issue_description: edit.issue_description,
            work_done: edit.work_done,
            promised_date: edit.promised_date,
            checklist: edit.checklist_keys.as_deref().map(checklist_from_keys),
        };
        let updated = self.repo.update_order(order_id, changes).await?;

        if first_done {
            self.completion_side_effects(order_id, actor).await?;
        }
        invalidate_dashboard_cache(self.cache.as_ref()).await;
        Ok(updated)
    }

    pub async fn set_status(
        &self,
        order_id: Id,
        status: OrderStatus,
        actor: Option<&str>,
    ) -> Result<ServiceOrder, ApiError> {
        self.apply_edit(order_id, OrderEdit::status_only(status), actor).await
    }

    /// Overwrite price, work description and checklist with a predefined
    /// package. Deliberately destructive, matching how the workshop uses it.
    pub async fn apply_package(
        &self,
        order_id: Id,
        package_key: &str,
    ) -> Result<ServiceOrder, ApiError> {
        let package = find_package(package_key)
            .ok_or_else(|| ApiError::Validation(format!("unknown service package '{package_key}'")))?;
        let changes = OrderChanges {
            price: Some(package.price),
            work_done: Some(package.work_done.to_string()),
            checklist: Some(Checklist::from_items(package.checklist_items)),
            ..Default::default()
        };
        let updated = self.repo.update_order(order_id, changes).await?;
        invalidate_dashboard_cache(self.cache.as_ref()).await;
        Ok(updated)
    }

    /// First transition into DONE: email the customer a completion summary and
    /// record it in the order's audit trail. Both are skipped when the
    /// customer has no email address on file.
    async fn completion_side_effects(
        &self,
        order_id: Id,
        actor: Option<&str>,
    ) -> Result<(), ApiError> {
        let ctx = self.repo.get_order_context(order_id).await?;
        if ctx.customer.email.is_empty() {
            info!("order {order_id} done, customer has no email, skipping notification");
            return Ok(());
        }
        let subject = format!("Your bike is ready — order {}", ctx.order.code());
        let body = format!(
            "Hello {},\n\nyour {} is serviced and ready for pickup.\n\n\
             Order: {}\nPrice: {} €\n\nWork carried out:\n{}\n\nChecklist:\n{}\n",
            ctx.customer.display_name(),
            ctx.bike.display_name(),
            ctx.order.code(),
            ctx.order.price,
            ctx.order.work_done,
            ctx.order.checklist.summary_text(),
        );
        let sent =
            send_email_safely(self.notifier.as_ref(), &subject, &body, &[ctx.customer.email.clone()]);
        if sent {
            self.repo
                .append_log(
                    order_id,
                    LogKind::EmailDone,
                    format!("Completion email sent to {}", ctx.customer.email),
                    actor.map(str::to_string),
                )
                .await?;
        }
        Ok(())
    }

    /// Email the customer an invite to the self-service portal.
    pub async fn invite_customer_portal(
        &self,
        order_id: Id,
        portal_url: &str,
        actor: Option<&str>,
    ) -> Result<bool, ApiError> {
        let ctx = self.repo.get_order_context(order_id).await?;
        if ctx.customer.email.is_empty() {
            return Ok(false);
        }
        let subject = "Track your bike repair online".to_string();
        let body = format!(
            "Hello {},\n\nyou can follow the progress of order {} here:\n{}\n",
            ctx.customer.display_name(),
            ctx.order.code(),
            portal_url,
        );
        let sent =
            send_email_safely(self.notifier.as_ref(), &subject, &body, &[ctx.customer.email.clone()]);
        if sent {
            self.repo
                .append_log(
                    order_id,
                    LogKind::EmailInvite,
                    format!("Portal invite sent to {}", ctx.customer.email),
                    actor.map(str::to_string),
                )
                .await?;
        }
        Ok(sent)
    }

    /// Queue a manual SMS to the order's customer and log it.
    pub async fn send_sms(
        &self,
        order_id: Id,
        text: &str,
        actor: Option<&str>,
    ) -> Result<bool, ApiError> {
        let ctx = self.repo.get_order_context(order_id).await?;
        let sent = send_sms_safely(self.notifier.as_ref(), &ctx.customer.phone_number, text);
        if sent {
            let body = format!("To {}: {}", ctx.customer.phone_number.trim(), text.trim());
            self.repo
                .append_log(order_id, LogKind::Sms, body, actor.map(str::to_string))
                .await?;
        }
        Ok(sent)
    }

    /// Render the service protocol and email it as an attachment.
    pub async fn send_protocol_email(
        &self,
        order_id: Id,
        renderer: &dyn ProtocolRenderer,
        actor: Option<&str>,
    ) -> Result<bool, ApiError> {
        let ctx = self.repo.get_order_context(order_id).await?;
        if ctx.customer.email.is_empty() {
            return Ok(false);
        }
        let data = ProtocolData::from_context(&ctx);
        let bytes = renderer.render(&data);
        let filename = format!("protocol-{}.{}", ctx.order.code(), renderer.file_extension());
        let subject = format!("Service protocol for order {}", ctx.order.code());
        let body = format!(
            "Hello {},\n\nattached is the service protocol for order {}.\n",
            ctx.customer.display_name(),
            ctx.order.code(),
        );
        let sent = send_email_with_attachment_safely(
            self.notifier.as_ref(),
            &subject,
            &body,
            &[ctx.customer.email.clone()],
            &filename,
            bytes,
        );
        if sent {
            self.repo
                .append_log(
                    order_id,
                    LogKind::EmailProtocol,
                    format!("Protocol emailed to {}", ctx.customer.email),
                    actor.map(str::to_string),
                )
                .await?;
        }
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_accepts_decimal_comma_and_rejects_junk() {
        assert_eq!(parse_price("69,50").unwrap(), Decimal::new(6950, 2));
        assert_eq!(parse_price(" 29.00 ").unwrap(), Decimal::new(2900, 2));
        assert!(parse_price("abc").is_err());
        assert!(parse_price("-5").is_err());
    }

    #[test]
    fn checklist_keys_ignore_unknown_entries() {
        let cl = checklist_from_keys(&["brakes".into(), "warp_drive".into(), "chain".into()]);
        assert!(cl.brakes);
        assert!(cl.chain);
        assert!(!cl.wheels);
    }
}

use crate::notifications::NotificationKind;
use crate::AppContext;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
struct SendParams {
    #[serde(rename = "userId")]
    user_id: i64,
    title: String,
    message: String,
    #[serde(rename = "type")]
    kind: NotificationKind,
    #[serde(rename = "relatedId")]
    related_id: Option<i64>,
}

#[derive(Deserialize)]
struct ListParams {
    #[serde(rename = "userId")]
    user_id: i64,
    #[serde(rename = "unreadOnly", default)]
    unread_only: bool,
    limit: Option<i64>,
}

#[derive(Deserialize)]
struct UserIdParams {
    #[serde(rename = "userId")]
    user_id: i64,
}

#[derive(Deserialize)]
struct NotificationIdParams {
    #[serde(rename = "notificationId")]
    notification_id: i64,
    #[serde(rename = "userId")]
    user_id: i64,
}

pub async fn send(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: SendParams = serde_json::from_value(params)?;
    let id = ctx
        .notifier
        .notify(p.user_id, &p.title, &p.message, p.kind, p.related_id)
        .await?;
    Ok(json!({ "notificationId": id }))
}

pub async fn list(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: ListParams = serde_json::from_value(params)?;
    let limit = p.limit.unwrap_or(50).min(200);
    let rows = ctx.notifier.list(p.user_id, p.unread_only, limit).await?;
    Ok(json!(rows))
}

pub async fn unread_count(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: UserIdParams = serde_json::from_value(params)?;
    let count = ctx.notifier.unread_count(p.user_id).await?;
    Ok(json!({ "count": count }))
}

pub async fn mark_read(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: NotificationIdParams = serde_json::from_value(params)?;
    ctx.notifier.mark_read(p.notification_id, p.user_id).await?;
    Ok(json!({ "ok": true }))
}

pub async fn mark_all_read(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: UserIdParams = serde_json::from_value(params)?;
    let marked = ctx.notifier.mark_all_read(p.user_id).await?;
    Ok(json!({ "marked": marked }))
}

pub async fn delete(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: NotificationIdParams = serde_json::from_value(params)?;
    ctx.notifier.delete(p.notification_id, p.user_id).await?;
    Ok(json!({ "ok": true }))
}

pub async fn scan_deadlines(_params: Value, ctx: &AppContext) -> Result<Value> {
    let created = ctx.notifier.scan_deadlines().await?;
    Ok(json!({ "created": created }))
}

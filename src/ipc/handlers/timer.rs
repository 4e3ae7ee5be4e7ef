use crate::timeclock::{EntryFilter, SummaryPeriod};
use crate::AppContext;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
struct StartParams {
    #[serde(rename = "userId")]
    user_id: i64,
    #[serde(rename = "taskId")]
    task_id: i64,
    comment: Option<String>,
}

#[derive(Deserialize)]
struct UserIdParams {
    #[serde(rename = "userId")]
    user_id: i64,
}

#[derive(Deserialize)]
struct StopParams {
    #[serde(rename = "userId")]
    user_id: i64,
    comment: Option<String>,
}

#[derive(Deserialize)]
struct EntriesParams {
    #[serde(rename = "userId")]
    user_id: i64,
    #[serde(flatten)]
    filter: EntryFilter,
}

#[derive(Deserialize)]
struct SummaryParams {
    #[serde(rename = "userId")]
    user_id: i64,
    period: SummaryPeriod,
}

pub async fn start(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: StartParams = serde_json::from_value(params)?;
    let entry_id = ctx
        .timeclock
        .start(p.user_id, p.task_id, p.comment.as_deref())
        .await?;
    Ok(json!({ "entryId": entry_id }))
}

pub async fn pause(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: UserIdParams = serde_json::from_value(params)?;
    let view = ctx.timeclock.pause(p.user_id).await?;
    Ok(serde_json::to_value(view)?)
}

pub async fn stop(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: StopParams = serde_json::from_value(params)?;
    let view = ctx.timeclock.stop(p.user_id, p.comment.as_deref()).await?;
    Ok(serde_json::to_value(view)?)
}

pub async fn active(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: UserIdParams = serde_json::from_value(params)?;
    let view = ctx.timeclock.active_entry(p.user_id).await?;
    Ok(serde_json::to_value(view)?)
}

pub async fn entries(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: EntriesParams = serde_json::from_value(params)?;
    let rows = ctx.timeclock.list_entries(p.user_id, p.filter).await?;
    Ok(json!(rows))
}

pub async fn summary(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: SummaryParams = serde_json::from_value(params)?;
    let summary = ctx.timeclock.summary(p.user_id, p.period).await?;
    Ok(serde_json::to_value(summary)?)
}

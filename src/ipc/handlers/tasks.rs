use crate::error::EngineError;
use crate::tasks::{NewTask, TaskFilter, TaskPatch};
use crate::AppContext;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
struct UpdateParams {
    #[serde(rename = "taskId")]
    task_id: i64,
    #[serde(rename = "userId")]
    user_id: i64,
    #[serde(flatten)]
    patch: TaskPatch,
}

#[derive(Deserialize)]
struct TaskIdParams {
    #[serde(rename = "taskId")]
    task_id: i64,
    #[serde(rename = "userId")]
    user_id: i64,
}

pub async fn create(params: Value, ctx: &AppContext) -> Result<Value> {
    let new: NewTask = serde_json::from_value(params)?;
    let task_id = ctx.tasks.create(new).await?;
    Ok(json!({ "taskId": task_id }))
}

pub async fn update(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: UpdateParams = serde_json::from_value(params)?;
    ctx.tasks.update(p.task_id, p.user_id, p.patch).await?;
    Ok(json!({ "ok": true }))
}

pub async fn delete(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: TaskIdParams = serde_json::from_value(params)?;
    let outcome = ctx.tasks.delete(p.task_id, p.user_id).await?;
    Ok(json!({ "outcome": outcome }))
}

pub async fn get(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: TaskIdParams = serde_json::from_value(params)?;
    let task = ctx
        .tasks
        .get(p.task_id, p.user_id)
        .await?
        .ok_or_else(|| EngineError::not_found("task not found"))?;
    Ok(serde_json::to_value(task)?)
}

pub async fn list(params: Value, ctx: &AppContext) -> Result<Value> {
    let filter: TaskFilter = if params.is_null() {
        TaskFilter::default()
    } else {
        serde_json::from_value(params)?
    };
    let tasks = ctx.tasks.list(filter).await?;
    Ok(json!(tasks))
}

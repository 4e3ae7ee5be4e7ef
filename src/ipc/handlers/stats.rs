use crate::AppContext;
use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;

#[derive(Deserialize, Default)]
struct StatsParams {
    #[serde(rename = "userId")]
    user_id: Option<i64>,
}

pub async fn tasks(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: StatsParams = if params.is_null() {
        StatsParams::default()
    } else {
        serde_json::from_value(params)?
    };
    let report = ctx.stats.task_stats(p.user_id).await?;
    Ok(serde_json::to_value(report)?)
}

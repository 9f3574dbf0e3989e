use axum::{extract::State, http::StatusCode, response::Json};
use chrono::Utc;
use serde_json::{json, Map, Value};

use crate::state::AppState;

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let memory = read_memory_usage().await;
    (
        StatusCode::OK,
        Json(json!({
            "status": "OK",
            "timestamp": Utc::now().to_rfc3339(),
            "uptime": state.started_at.elapsed().as_secs_f64(),
            "memory": memory,
            "version": env!("CARGO_PKG_VERSION"),
            "platform": format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
        })),
    )
}

/// Resident and peak memory in bytes, from `/proc/self/status`. `null` where
/// procfs is unavailable.
async fn read_memory_usage() -> Value {
    match tokio::fs::read_to_string("/proc/self/status").await {
        Ok(status) => parse_proc_status(&status),
        Err(_) => Value::Null,
    }
}

fn parse_proc_status(status: &str) -> Value {
    let mut memory = Map::new();
    for line in status.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let field = match key {
            "VmRSS" => "rss",
            "VmHWM" => "peakRss",
            "VmSize" => "virtual",
            _ => continue,
        };
        let kib = rest
            .split_whitespace()
            .next()
            .and_then(|value| value.parse::<u64>().ok());
        if let Some(kib) = kib {
            memory.insert(field.to_string(), json!(kib * 1024));
        }
    }
    Value::Object(memory)
}

//! IPC protocol definitions (JSON messages)

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Request {
    Ping,
    GetSnapshot,
    GetTotalBandwidth,
    GetTopProcesses { params: TopProcessesParams },
    GetRecommendations,
    GetDailySummary { params: DateParams },
    GetAvailableDates,
    AggregateDate { params: DateParams },
    SetThreshold { params: ThresholdParams },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopProcessesParams {
    pub n: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateParams {
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdParams {
    pub bytes_per_second: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Pong,
    Response { data: serde_json::Value },
    Update { data: UpdateData },
}

/// Pushed to connected clients after every sampling tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateData {
    pub taken_at: i64,
    pub process_count: usize,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
}

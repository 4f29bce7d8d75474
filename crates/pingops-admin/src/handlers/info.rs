use std::sync::Arc;

use axum::{Json, extract::State};

use crate::{
    AdminSys,
    handlers::ApiError,
    types::{AdminInfo, JobCounts},
};

pub async fn server_info(State(admin): State<Arc<AdminSys>>) -> Result<Json<AdminInfo>, ApiError> {
    let jobs = admin.jobs().list()?;
    let finished = jobs.iter().filter(|job| job.state.is_terminal()).count();

    Ok(Json(AdminInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: admin.uptime_seconds(),
        boot_time: admin.boot_time(),
        jobs: JobCounts {
            total: jobs.len(),
            active: jobs.len() - finished,
            finished,
        },
    }))
}

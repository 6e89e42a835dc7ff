use chrono::Utc;
use sea_orm::{DatabaseConnection, Set};
use tracing::{error, info};
use uuid::Uuid;

use crate::db::entities::job;
use crate::db::enums::{JobStatus, JobType};
use crate::db::services::job_service as job_db;
use crate::web::error::AppError;
use crate::web::models::{CreateJobRequest, JobsQuery, JobsResponse, Pagination};

pub const DEFAULT_PAGE_SIZE: u64 = 15;
pub const MAX_PAGE_SIZE: u64 = 100;
pub const DEFAULT_JOB_NAME: &str = "Job Monitor";

/// Turns the raw query values into `(page_size, page)`.
/// Absent or zero values fall back to the defaults.
pub fn parse_pagination(query: &JobsQuery) -> Result<(u64, u64), AppError> {
    let page = match query.page.as_deref().map(str::trim) {
        None | Some("") => 1,
        Some(raw) => raw.parse::<i64>().map_err(|_| AppError::InvalidPage)?,
    };
    let page_size = match query.page_size.as_deref().map(str::trim) {
        None | Some("") => 0,
        Some(raw) => raw.parse::<i64>().map_err(|_| AppError::InvalidPageSize)?,
    };

    if page < 1 {
        return Err(AppError::InvalidPage);
    }
    if page_size < 0 || page_size as u64 > MAX_PAGE_SIZE {
        return Err(AppError::InvalidPageSize);
    }
    let page_size = if page_size == 0 {
        DEFAULT_PAGE_SIZE
    } else {
        page_size as u64
    };
    Ok((page_size, page as u64))
}

/// One page of the user's jobs. A page past the end is empty, not an error.
pub async fn get_jobs(
    db: &DatabaseConnection,
    user_id: i32,
    page_size: u64,
    page: u64,
) -> Result<JobsResponse, AppError> {
    let total_rows = job_db::count_jobs_for_user(db, user_id)
        .await
        .inspect_err(|e| error!(error = %e, user_id, "Error counting jobs."))?;
    let total_pages = total_rows.div_ceil(page_size);

    let jobs = if page > total_pages {
        Vec::new()
    } else {
        job_db::get_jobs_for_user(db, user_id, page_size, (page - 1) * page_size)
            .await
            .inspect_err(|e| error!(error = %e, user_id, page, "Error loading jobs."))?
    };

    Ok(JobsResponse {
        jobs,
        pagination: Pagination {
            page,
            page_size,
            total_rows,
            total_pages,
        },
    })
}

pub async fn get_job(db: &DatabaseConnection, user_id: i32, job_id: &str) -> Result<job::Model, AppError> {
    let found = job_db::get_job_by_id(db, job_id)
        .await
        .inspect_err(|e| error!(error = %e, job_id, "Error loading job."))?
        .ok_or_else(|| AppError::NotFound(format!("job {job_id}")))?;

    if found.user_id != user_id {
        return Err(AppError::Forbidden);
    }
    Ok(found)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub async fn create_job(
    db: &DatabaseConnection,
    user_id: i32,
    req: CreateJobRequest,
) -> Result<job::Model, AppError> {
    let job_type = req
        .job_type
        .trim()
        .parse::<JobType>()
        .map_err(|_| AppError::invalid_fields(["job_type"]))?;

    let cron_expression = non_blank(req.cron_expression);
    let cron_expression_timezone = non_blank(req.cron_expression_timezone);

    if job_type == JobType::Cron {
        let mut missing = Vec::new();
        if cron_expression.is_none() {
            missing.push("cron_expression");
        }
        if cron_expression_timezone.is_none() {
            missing.push("cron_expression_timezone");
        }
        if !missing.is_empty() {
            return Err(AppError::invalid_fields(missing));
        }
    }

    let name = match req.name.trim() {
        "" => DEFAULT_JOB_NAME.to_string(),
        trimmed => trimmed.to_string(),
    };

    let now = Utc::now();
    let new_job = job::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        user_id: Set(user_id),
        created_at: Set(now),
        updated_at: Set(now),
        name: Set(name),
        job_type: Set(job_type),
        active: Set(req.active.unwrap_or(true)),
        status: Set(JobStatus::Unknown),
        cron_expression: Set(cron_expression),
        cron_expression_timezone: Set(cron_expression_timezone),
        detected_interval_minutes: Set(None),
    };

    let created = job_db::insert_job(db, new_job)
        .await
        .inspect_err(|e| error!(error = %e, user_id, "Error creating job."))?;
    info!(user_id, job_id = %created.id, "Job created.");
    Ok(created)
}

use sl_api_types::{DispositionRequest, DispositionResponse};
use sl_core::types::{ReviewState, TaskId};

use super::ApiClient;

/// Push a review disposition for the unit `task_id` produced.
pub async fn dispose(api: &ApiClient, task_id: &str, state: ReviewState) -> anyhow::Result<bool> {
    let body = DispositionRequest {
        task_id: TaskId::from(task_id),
        state,
    };
    let resp: DispositionResponse = api.post(&["review", "disposition"], &body).await?;
    if resp.changed {
        println!("Review unit for {task_id} is now {state:?}.");
    } else {
        println!("Review unit for {task_id} already {state:?}; nothing changed.");
    }
    Ok(resp.changed)
}

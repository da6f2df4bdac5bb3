// Jaskier Shared Pattern — wiki
//
// Wiki generation task (§4.10): a long-running job whose steps 1-4 are
// pre-saga and steps 5-6 run as a saga with compensation.

use serde_json::{json, Value};

use crate::models::Job;
use crate::saga::{self, SagaState, SagaStep};
use crate::state::{AppState, Dependencies};

#[derive(Clone)]
pub struct ExtractedFile {
    pub path: String,
    pub content: String,
}

pub async fn run(state: &AppState, job: &Job) -> Result<Value, String> {
    let project_id = job.project_id.clone();

    // 1. Fetch all documents for the project from the vector store.
    let documents = state
        .deps
        .vector_store
        .post("/query", &json!({ "collection": project_id, "query_texts": [""], "n_results": 10_000 }))
        .await
        .map_err(|e| format!("fetch documents failed: {e}"))?;

    let docs = documents
        .get("documents")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    // 2-3. Invoke the (external, opaque) extractor, producing files and
    // relationships. The extractor itself is a non-goal; the core treats
    // it as an opaque (documents) -> (files, relationships) operation.
    let (files_to_write, relationships) = extract(&docs);

    // 4. Write relationships to the graph store. No HTTP contract for a
    // graph store is given in the outbound interfaces (§6) — relationship
    // persistence is itself outside this core's modeled collaborators, so
    // this step is recorded but not dispatched over the network. It is
    // idempotent on the graph target and runs ahead of the saga either way.
    tracing::info!(
        "wiki[{}]: {} relationship(s) extracted for project {}",
        job.job_id, relationships.len(), project_id
    );

    // 5-6. Saga: save files (compensate: delete files), create snapshot
    // (compensate: delete snapshot).
    let deps = state.deps.clone();
    let files_created = files_to_write.len();

    let save_files_step = {
        let deps = deps.clone();
        let project_id = project_id.clone();
        let files = files_to_write.clone();
        SagaStep::new(
            "save_files",
            move || {
                let deps = deps.clone();
                let project_id = project_id.clone();
                let files = files.clone();
                Box::pin(save_files(deps, project_id, files))
            },
            {
                let deps = deps.clone();
                let project_id = project_id.clone();
                move |value| {
                    let deps = deps.clone();
                    let project_id = project_id.clone();
                    Box::pin(delete_files(deps, project_id, value))
                }
            },
        )
    };

    let create_snapshot_step = {
        let deps = deps.clone();
        let project_id = project_id.clone();
        let user_id = job.user_id.clone();
        SagaStep::new(
            "create_snapshot",
            move || {
                let deps = deps.clone();
                let project_id = project_id.clone();
                let user_id = user_id.clone();
                Box::pin(create_snapshot(deps, project_id, user_id))
            },
            {
                let deps = deps.clone();
                let project_id = project_id.clone();
                move |value| {
                    let deps = deps.clone();
                    let project_id = project_id.clone();
                    Box::pin(delete_snapshot(deps, project_id, value))
                }
            },
        )
    };

    let status = saga::run(format!("wiki-{}", job.job_id), vec![save_files_step, create_snapshot_step]).await;

    match status.state {
        SagaState::Committed => Ok(json!({
            "files_created": files_created,
            "relationships_extracted": relationships.len(),
        })),
        SagaState::RolledBack => Err(status.error.unwrap_or_else(|| "saga rolled back".to_string())),
        SagaState::Failed => Err(format!(
            "saga compensation failed, operator intervention required: {}",
            status.error.unwrap_or_default()
        )),
    }
}

async fn save_files(
    deps: std::sync::Arc<Dependencies>,
    project_id: String,
    files: Vec<ExtractedFile>,
) -> Result<saga::StepValue, String> {
    let mut ids = Vec::new();
    for file in &files {
        let resp = deps
            .file_store
            .post("/save_file", &json!({ "project_id": project_id, "file_path": file.path, "content": file.content }))
            .await
            .map_err(|e| format!("save_file failed for {}: {e}", file.path))?;
        let file_id = resp.get("file_id").and_then(|v| v.as_str()).unwrap_or(&file.path).to_string();
        ids.push(file_id);
    }
    Ok(Box::new(ids))
}

async fn delete_files(deps: std::sync::Arc<Dependencies>, project_id: String, value: saga::StepValue) -> Result<(), String> {
    let ids = *value.downcast::<Vec<String>>().map_err(|_| "bad step value".to_string())?;
    for file_id in ids {
        if let Err(e) = deps.file_store.delete(&format!("/file/{project_id}/{file_id}")).await {
            tracing::error!("wiki: compensation delete_file failed for {}: {}", file_id, e);
        }
    }
    Ok(())
}

async fn create_snapshot(deps: std::sync::Arc<Dependencies>, project_id: String, user_id: String) -> Result<saga::StepValue, String> {
    let resp = deps
        .snapshot_store
        .post(&format!("/snapshot/{project_id}"), &json!({ "user_id": user_id, "message": "wiki generation" }))
        .await
        .map_err(|e| format!("create_snapshot failed: {e}"))?;
    let snapshot_id = resp.get("snapshot_id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    Ok(Box::new(snapshot_id))
}

async fn delete_snapshot(deps: std::sync::Arc<Dependencies>, project_id: String, value: saga::StepValue) -> Result<(), String> {
    let snapshot_id = *value.downcast::<String>().map_err(|_| "bad step value".to_string())?;
    if let Err(e) = deps.snapshot_store.delete(&format!("/snapshot/{project_id}/{snapshot_id}")).await {
        tracing::error!("wiki: compensation delete_snapshot failed: {}", e);
    }
    Ok(())
}

/// Opaque extractor stand-in: the real entity/relationship extraction
/// heuristics are a non-goal (spec §1). This produces one file per
/// retrieved document; real deployments swap in the actual extractor
/// behind this same signature.
fn extract(docs: &[Value]) -> (Vec<ExtractedFile>, Vec<Value>) {
    let files = docs
        .iter()
        .enumerate()
        .map(|(i, doc)| ExtractedFile {
            path: format!("page-{i}.md"),
            content: doc.as_str().unwrap_or_default().to_string(),
        })
        .collect();
    (files, Vec::new())
}

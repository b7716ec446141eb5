use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::classes::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::students::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::periods::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::assessments::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::records::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::skills::try_handle(state, &req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}

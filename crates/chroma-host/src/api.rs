//! HTTP/JSON Interface
//!
//! The routes the browser UI consumes. Every handler borrows the shared
//! device client, so commands serialize onto the link in arrival order.

use crate::device_client::DeviceClient;
use crate::state::{StatusResponse, StepJson};
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use anyhow::Result;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

/// Shared state for all API handlers.
pub struct AppState {
    pub client: Arc<tokio::sync::Mutex<DeviceClient>>,
}

/// Form body of `POST /api/manual/valves`.
#[derive(Debug, Deserialize)]
pub struct ValvesForm {
    pub reagent_valve_id: u8,
    pub column_valve_id: u8,
}

/// Form body of `POST /api/manual/pump`.
#[derive(Debug, Deserialize)]
pub struct PumpForm {
    pub pump_cmd: f32,
    pub acceleration: f32,
}

fn link_error(e: anyhow::Error) -> HttpResponse {
    error!("device link error: {:#}", e);
    HttpResponse::InternalServerError().body(format!("{:#}", e))
}

async fn get_status(state: web::Data<AppState>) -> impl Responder {
    match state.client.lock().await.device_state().await {
        Ok(s) => HttpResponse::Ok().json(StatusResponse::from(s)),
        Err(e) => link_error(e),
    }
}

async fn post_valves(state: web::Data<AppState>, form: web::Form<ValvesForm>) -> impl Responder {
    info!(
        reagent = form.reagent_valve_id,
        column = form.column_valve_id,
        "manual valve change"
    );
    match state
        .client
        .lock()
        .await
        .set_valves(form.reagent_valve_id, form.column_valve_id)
        .await
    {
        Ok(()) => HttpResponse::Ok().body("OK"),
        Err(e) => link_error(e),
    }
}

async fn post_pump(state: web::Data<AppState>, form: web::Form<PumpForm>) -> impl Responder {
    info!(
        flow = form.pump_cmd,
        accel = form.acceleration,
        "manual pump command"
    );
    match state
        .client
        .lock()
        .await
        .set_pump(form.pump_cmd, form.acceleration)
        .await
    {
        Ok(()) => HttpResponse::Ok().body("OK"),
        Err(e) => link_error(e),
    }
}

async fn post_program_upload(
    state: web::Data<AppState>,
    steps: web::Json<Vec<StepJson>>,
) -> impl Responder {
    let binary: Vec<_> = steps.iter().map(StepJson::to_step).collect();
    info!(steps = binary.len(), "program upload");
    match state.client.lock().await.upload_program(&binary).await {
        Ok(()) => HttpResponse::Ok().body("OK"),
        Err(e) => link_error(e),
    }
}

async fn post_program_run(state: web::Data<AppState>) -> impl Responder {
    match state.client.lock().await.execute_program().await {
        Ok(()) => HttpResponse::Ok().body("OK"),
        Err(e) => link_error(e),
    }
}

async fn post_program_stop(state: web::Data<AppState>) -> impl Responder {
    match state.client.lock().await.abort_program().await {
        Ok(()) => HttpResponse::Ok().body("OK"),
        Err(e) => link_error(e),
    }
}

async fn get_program(state: web::Data<AppState>) -> impl Responder {
    match state.client.lock().await.program().await {
        Ok(steps) => {
            let json: Vec<StepJson> = steps.iter().map(StepJson::from_step).collect();
            HttpResponse::Ok().json(json)
        }
        Err(e) => link_error(e),
    }
}

/// Binds and starts the API server; the returned future drives it.
pub fn start_api_server(port: u16, state: AppState) -> Result<actix_web::dev::Server> {
    let data = web::Data::new(state);
    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .route("/api/status", web::get().to(get_status))
            .route("/api/manual/valves", web::post().to(post_valves))
            .route("/api/manual/pump", web::post().to(post_pump))
            .route("/api/program/upload", web::post().to(post_program_upload))
            .route("/api/program/run", web::post().to(post_program_run))
            .route("/api/program/stop", web::post().to(post_program_stop))
            .route("/api/program/get", web::get().to(get_program))
    })
    .bind(("0.0.0.0", port))?
    .run();
    Ok(server)
}

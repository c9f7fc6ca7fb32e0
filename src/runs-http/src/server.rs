// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::net::SocketAddr;
use std::sync::Arc;

use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use tokio::signal;
use tracing::info;

use runs_core::EnablementEngine;

use crate::api;

/// Serve the control endpoints on `addr` until Ctrl+C.
pub async fn serve(addr: SocketAddr, engine: Arc<EnablementEngine>) -> std::io::Result<()> {
    let server = build_server(addr, engine)?;
    let handle = server.handle();
    tokio::spawn(async move {
        let _ = signal::ctrl_c().await;
        info!("Shutting down http server");
        handle.stop(false).await;
    });
    info!("http server listening on {}", addr);
    server.await
}

pub fn build_server(addr: SocketAddr, engine: Arc<EnablementEngine>) -> std::io::Result<Server> {
    let engine = web::Data::new(engine);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(engine.clone())
            .configure(api::configure)
    })
    .shutdown_timeout(1)
    .disable_signals()
    .bind(addr)?
    .run();
    Ok(server)
}

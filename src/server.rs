//! Service host: request pipeline, listener and lifecycle.

use std::{any::Any, net::SocketAddr};

use axum::{
    body::Body,
    http::{header, Response, StatusCode},
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::catch_panic::{CatchPanicLayer, ResponseForPanic};

use crate::{
    config::{Configuration, DOWNSTREAM_BASE_ADDRESS, SERVER_ADDRESS},
    endpoints,
    error::{Error, Result},
    middleware::{propagate_trace_identifier_layer, set_trace_identifier_layer, RequestLoggingLayer},
    options::{HostOs, TelemetryPlan},
    role::ServiceRole,
    setup::TelemetryBuilder,
};

/// Listen address used when `Server:Address` is not configured.
pub fn default_address(role: ServiceRole) -> &'static str {
    match role {
        ServiceRole::LoggingWeb => "0.0.0.0:5000",
        ServiceRole::LoggingDownstream => "0.0.0.0:5001",
    }
}

pub fn listen_address(configuration: &Configuration, role: ServiceRole) -> Result<SocketAddr> {
    let address = configuration
        .get_non_blank(SERVER_ADDRESS)
        .unwrap_or_else(|| default_address(role).to_string());
    address.trim().parse().map_err(|_| Error::Address(address))
}

/// Builds the request pipeline, outermost layer first:
/// error boundary, trace identifier, request logging, router.
pub fn app(development: bool) -> Router {
    endpoints::router().layer(
        ServiceBuilder::new()
            .layer(CatchPanicLayer::custom(ErrorPage { development }))
            .layer(set_trace_identifier_layer())
            .layer(propagate_trace_identifier_layer())
            .layer(RequestLoggingLayer),
    )
}

/// Turns an unhandled handler panic into a 500 response. The panic message
/// is only exposed in development.
#[derive(Debug, Clone, Copy)]
pub struct ErrorPage {
    development: bool,
}

impl ResponseForPanic for ErrorPage {
    type ResponseBody = Body;

    fn response_for_panic(
        &mut self,
        err: Box<dyn Any + Send + 'static>,
    ) -> Response<Self::ResponseBody> {
        let message = panic_message(err.as_ref());
        tracing::error!(
            panic = %message,
            "An unhandled error has occurred while executing the request"
        );

        let body = if self.development {
            format!("Unhandled error: {message}")
        } else {
            "Internal Server Error".to_string()
        };

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }
}

fn panic_message(err: &(dyn Any + Send)) -> &str {
    if let Some(message) = err.downcast_ref::<String>() {
        message
    } else if let Some(message) = err.downcast_ref::<&str>() {
        message
    } else {
        "unknown panic"
    }
}

/// Loads configuration, installs telemetry and serves until shutdown.
pub async fn run(role: ServiceRole) -> Result<()> {
    let configuration = Configuration::load()?;
    let plan = TelemetryPlan::resolve(&configuration, HostOs::current());

    let mut telemetry = TelemetryBuilder::new(role).with_log_level(configuration.log_level());
    // the custom channel has to be registered before the generic setup
    if let Some(channel) = plan.channel {
        telemetry = telemetry.with_channel(channel);
    }
    let telemetry = telemetry.add_telemetry(plan.options).install()?;

    tracing::debug!("Configuring services");
    if role == ServiceRole::LoggingWeb {
        if let Some(base_address) = configuration.get_non_blank(DOWNSTREAM_BASE_ADDRESS) {
            tracing::info!(%base_address, "downstream service configured");
        }
    }

    tracing::debug!("Configuring request pipeline");
    let app = app(configuration.is_development());

    let address = listen_address(&configuration, role)?;
    let listener = TcpListener::bind(address).await?;
    tracing::info!(
        role = role.role_name(),
        address = %listener.local_addr()?,
        environment = %configuration.environment(),
        "starting server"
    );

    let served = serve(listener, app).await;
    tracing::info!("server stopped");
    telemetry.shutdown();

    served
}

pub async fn serve(listener: TcpListener, app: Router) -> Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!(%error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}

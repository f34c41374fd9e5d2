//! End-to-end checks over a real socket. Log output is covered by unit tests,
//! these focus on observable behavior (status codes and headers).

use std::{ffi::OsString, net::SocketAddr};

use config::Config;
use request_telemetry::{
    config::{environment_variables, settings_str, Configuration},
    options::{HostOs, TelemetryPlan, TelemetryOptions},
    server,
    setup::TelemetryBuilder,
    ServiceRole,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

async fn start_service(development: bool) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, server::app(development)).await.unwrap();
    });

    addr
}

async fn get(addr: SocketAddr, path: &str, headers: &[(&str, &str)]) -> String {
    let mut socket = TcpStream::connect(addr).await.unwrap();
    let mut request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n");
    for (name, value) in headers {
        request.push_str(&format!("{name}: {value}\r\n"));
    }
    request.push_str("\r\n");
    socket.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    socket.read_to_string(&mut response).await.unwrap();
    response
}

fn header<'a>(response: &'a str, name: &str) -> Option<&'a str> {
    response
        .lines()
        .take_while(|line| !line.is_empty())
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case(name))
        .map(|(_, value)| value.trim())
}

#[tokio::test]
async fn severity_endpoints_accept() {
    let addr = start_service(false).await;

    for severity in ["trace", "debug", "information", "warning", "error", "critical"] {
        let response = get(addr, &format!("/log/{severity}"), &[]).await;

        assert!(response.starts_with("HTTP/1.1 202 Accepted"), "{severity}: {response}");
        assert!(header(&response, "x-request-id").is_some(), "{severity}");
    }
}

#[tokio::test]
async fn inbound_trace_identifier_is_echoed() {
    let addr = start_service(false).await;

    let response = get(addr, "/log/debug", &[("x-request-id", "0HLCALLER:00000002")]).await;

    assert_eq!(header(&response, "x-request-id"), Some("0HLCALLER:00000002"));
}

#[tokio::test]
async fn throw_uses_host_error_response() {
    let addr = start_service(false).await;

    let response = get(addr, "/log/throw", &[]).await;

    assert!(response.starts_with("HTTP/1.1 500 Internal Server Error"), "{response}");
    assert!(response.ends_with("Internal Server Error"));
    assert!(!response.contains("I'm throwing!"));

    // the service keeps serving after an unhandled error
    let response = get(addr, "/log/information", &[]).await;
    assert!(response.starts_with("HTTP/1.1 202 Accepted"));
}

#[tokio::test]
async fn throw_in_development_shows_error_detail() {
    let addr = start_service(true).await;

    let response = get(addr, "/log/throw", &[]).await;

    assert!(response.contains("I'm throwing!"), "{response}");
}

#[test]
fn settings_file_drives_telemetry_registration() {
    let settings = r#"
        [ApplicationInsights]
        ApplicationVersion = "test-local"
        EnableAdaptiveSampling = "False"
        InstrumentationKey = "from-file"

        [ApplicationInsights.TelemetryChannel]
        DeveloperMode = true
        StorageFolder = "/var/tmp/telemetry"
    "#;
    let vars = [(
        OsString::from("APPLICATIONINSIGHTS__INSTRUMENTATIONKEY"),
        OsString::from("instrumentation-key"),
    )];
    let configuration = Configuration::from_builder(
        Config::builder()
            .add_source(settings_str(settings))
            .add_source(environment_variables(vars)),
    )
    .unwrap();

    let plan = TelemetryPlan::resolve(&configuration, HostOs::Other);
    let channel = plan.channel.clone().expect("custom channel");

    let builder = TelemetryBuilder::new(ServiceRole::LoggingWeb)
        .with_channel(channel.clone())
        .add_telemetry(plan.options.clone());

    assert_eq!(builder.channel(), Some(&channel));
    assert_eq!(
        builder.options(),
        Some(&TelemetryOptions {
            application_version: "test-local".to_string(),
            enable_adaptive_sampling: false,
            instrumentation_key: Some("instrumentation-key".to_string()),
            developer_mode: Some(true),
            ..TelemetryOptions::default()
        })
    );
}

mod common;

use std::time::Duration;

use dicom_ul::pdu::Pdu;
use dimse::association::PRIVATE_SHUTDOWN_SOP_CLASS;
use printscp::config::{Config, ConfigError};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

fn load_config_from_str(toml: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(toml).expect("TOML parse error");
    config.validate()?;
    Ok(config)
}

fn free_port() -> u16 {
    // Pick a free local port by binding to port 0 first
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephem port");
    listener.local_addr().unwrap().port()
}

async fn wait_until_listening(port: u16) {
    let addr = format!("127.0.0.1:{}", port);
    let mut last_err: Option<std::io::Error> = None;
    for _ in 0..30 {
        match TcpStream::connect(&addr).await {
            Ok(_) => return,
            Err(e) => last_err = Some(e),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("Failed to connect to print SCP on {}: {:?}", addr, last_err);
}

#[tokio::test]
async fn print_scp_starts_and_writes_dimse_logs() {
    let port = free_port();
    let log_dir = tempfile::tempdir().unwrap();
    let toml = format!(
        r#"
        [scp]
        local_aet = "PRINT_SCP"
        bind_addr = "127.0.0.1"
        port = {port}

        [logging]
        dimse_log_dir = "{dir}"

        [storage]
        backend = "memory"

        [printers.film]
        medium_types = ["BLUE FILM"]
        "#,
        port = port,
        dir = log_dir.path().display()
    );
    let config = load_config_from_str(&toml).expect("valid config");

    let shutdown = CancellationToken::new();
    let server = tokio::spawn(printscp::run(config, None, shutdown.clone()));
    wait_until_listening(port).await;

    let addr = format!("127.0.0.1:{}", port).parse().unwrap();
    let (pdus, reply) = common::associate(addr, "MODALITY").await;
    match &reply {
        Pdu::AssociationAC(ac) => {
            assert!(!ac.presentation_contexts.is_empty());
            assert_eq!(ac.called_ae_title.trim(), "PRINT_SCP");
        }
        other => panic!("expected A-ASSOCIATE-AC, got {:?}", other),
    }
    assert!(matches!(common::release(pdus).await, Some(Pdu::ReleaseRP)));

    let mut written = 0;
    for _ in 0..50 {
        written = std::fs::read_dir(log_dir.path()).unwrap().count();
        if written > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(written, 1, "one DIMSE log per association");

    shutdown.cancel();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_association_stops_the_scp() {
    let mut config = common::loopback_config(4);
    config.allow_shutdown = true;
    let scp = common::start_scp(config).await;

    let (_pdus, reply) =
        common::associate_with(scp.addr, "ADMIN", &[PRIVATE_SHUTDOWN_SOP_CLASS]).await;
    assert!(matches!(reply, Pdu::AssociationRJ(_)));

    tokio::time::timeout(Duration::from_secs(5), scp.handle)
        .await
        .expect("SCP stopped")
        .unwrap()
        .unwrap();
    assert!(scp.shutdown.is_cancelled());
}

#[test]
fn unknown_printer_is_rejected_before_binding() {
    let config = load_config_from_str(
        r#"
        [storage]
        backend = "memory"

        [printers.film]
        max_copies = 3
        "#,
    )
    .unwrap();
    assert!(printscp::build_scp(&config, Some("paper")).is_err());
    assert!(printscp::build_scp(&config, None).is_ok());
}

#[tokio::test]
async fn shutdown_waits_for_running_associations() {
    let mut scp = common::start_scp(common::loopback_config(4)).await;

    let (pdus, reply) = common::associate(scp.addr, "MODALITY").await;
    assert!(matches!(reply, Pdu::AssociationAC(_)));

    scp.shutdown.cancel();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!scp.handle.is_finished(), "SCP returned with an association running");

    // the running association is still served to its end
    assert!(matches!(common::release(pdus).await, Some(Pdu::ReleaseRP)));
    tokio::time::timeout(Duration::from_secs(5), &mut scp.handle)
        .await
        .expect("SCP stopped after the association ended")
        .unwrap()
        .unwrap();
    assert_eq!(scp.limiter.active(), 0);
}

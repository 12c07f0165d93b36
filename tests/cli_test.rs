use std::net::TcpListener;
use std::process::Command;

fn netprobe(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_netprobe"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to launch netprobe")
}

#[test]
fn test_help_exits_zero() {
    let out = netprobe(&["-h"]);
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("--udp"));
}

#[test]
fn test_role_is_required() {
    assert!(!netprobe(&[]).status.success());
}

#[test]
fn test_invalid_ip_literal_fails() {
    let out = netprobe(&["-c", "not-an-ip"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Configuration error"));
}

#[test]
fn test_ipv4_literal_rejected_with_ipv6_flag() {
    let out = netprobe(&["-6", "-c", "127.0.0.1"]);
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn test_connect_failure_exits_nonzero() {
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
        .to_string();
    let out = netprobe(&["-c", "127.0.0.1", "-p", &port, "-n", "3", "-q"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Error:"));
}

#[test]
fn test_server_bind_conflict_exits_nonzero() {
    let taken = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port().to_string();
    let out = netprobe(&["-s", "--bind", "127.0.0.1", "-p", &port, "-q"]);
    assert_eq!(out.status.code(), Some(1));
}

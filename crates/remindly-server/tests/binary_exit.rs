use std::net::TcpListener;
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

fn run_binary(envs: &[(&str, String)]) -> ExitStatus {
    let dir = tempfile::tempdir().expect("tmp dir");
    let mut command = Command::new(env!("CARGO_BIN_EXE_remindly-server"));
    command
        .current_dir(dir.path())
        .env_remove("RUST_LOG")
        .env("REMINDLY_CONFIG", dir.path().join("absent.toml"))
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    for (key, value) in envs {
        command.env(key, value);
    }
    let mut child = command.spawn().expect("spawn server");

    let deadline = Instant::now() + Duration::from_secs(20);
    loop {
        if let Some(status) = child.try_wait().expect("wait server") {
            return status;
        }
        if Instant::now() > deadline {
            let _ = child.kill();
            panic!("server did not exit");
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

#[test]
fn bind_failure_exits_non_zero() {
    let taken = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = taken.local_addr().expect("addr").port();

    let status = run_binary(&[
        ("REMINDLY__SERVER__HOST", "127.0.0.1".to_string()),
        ("REMINDLY__SERVER__PORT", port.to_string()),
    ]);

    assert_eq!(status.code(), Some(1));
    drop(taken);
}

#[test]
fn invalid_config_exits_with_code_2() {
    let status = run_binary(&[("REMINDLY__DELIVERY__SWEEP_INTERVAL_SECS", "0".to_string())]);
    assert_eq!(status.code(), Some(2));
}

//! Integration tests for the seglogd HTTP surface: health/readiness, the
//! produce/consume API, safe startup checks, and graceful shutdown.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

const BASE_PORT: u16 = 19610;
const STARTUP_WAIT_MS: u64 = 800;
const SHUTDOWN_WAIT_MS: u64 = 3000;

/// Run seglogd in a subprocess with the given args. Returns (success, stdout, stderr).
fn run_seglogd(args: &[&str]) -> (bool, String, String) {
    let exe = env!("CARGO_BIN_EXE_seglogd");
    let out = Command::new(exe).args(args).output().expect("run seglogd");
    let stdout = String::from_utf8_lossy(&out.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&out.stderr).into_owned();
    (out.status.success(), stdout, stderr)
}

/// Start seglogd in the background; returns the child process. Caller must kill it.
fn start_seglogd_background(data_dir: &str, bind: &str) -> Child {
    let exe = env!("CARGO_BIN_EXE_seglogd");
    Command::new(exe)
        .args(["--no-config", "--data-dir", data_dir, "--http-bind", bind])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn seglogd")
}

/// Issue a raw HTTP/1.0 request; returns (status_line, body).
fn http_request(port: u16, request: &str) -> Option<(String, String)> {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).ok()?;
    stream.set_read_timeout(Some(Duration::from_secs(2))).ok()?;
    stream.write_all(request.as_bytes()).ok()?;
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).ok()?;
    let s = String::from_utf8_lossy(&buf).into_owned();
    let mut lines = s.lines();
    let status = lines.next()?.to_string();
    let body = lines
        .skip_while(|l| !l.is_empty())
        .skip(1)
        .collect::<Vec<_>>()
        .join("\n");
    Some((status, body))
}

fn http_get(port: u16, path: &str) -> Option<(String, String)> {
    http_request(
        port,
        &format!("GET {} HTTP/1.0\r\nHost: 127.0.0.1\r\n\r\n", path),
    )
}

fn http_post(port: u16, path: &str, body: &[u8]) -> Option<(String, String)> {
    let mut request = format!(
        "POST {} HTTP/1.0\r\nHost: 127.0.0.1\r\nContent-Length: {}\r\n\r\n",
        path,
        body.len()
    )
    .into_bytes();
    request.extend_from_slice(body);

    let mut stream = TcpStream::connect(("127.0.0.1", port)).ok()?;
    stream.set_read_timeout(Some(Duration::from_secs(2))).ok()?;
    stream.write_all(&request).ok()?;
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).ok()?;
    let s = String::from_utf8_lossy(&buf).into_owned();
    let mut lines = s.lines();
    let status = lines.next()?.to_string();
    let body = lines
        .skip_while(|l| !l.is_empty())
        .skip(1)
        .collect::<Vec<_>>()
        .join("\n");
    Some((status, body))
}

#[cfg(unix)]
fn sigterm(child: &Child) {
    let pid = child.id() as i32;
    let _ = Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .status();
}

// ---------- Safe startup (adversarial) ----------

#[test]
fn data_dir_as_file_fails_startup() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file_as_data_dir = dir.path().join("file_not_dir");
    std::fs::write(&file_as_data_dir, b"x").expect("write file");
    let (ok, _stdout, stderr) = run_seglogd(&[
        "--no-config",
        "--data-dir",
        file_as_data_dir.to_str().unwrap(),
    ]);
    assert!(!ok, "data_dir as file should fail");
    assert!(
        stderr.contains("data_dir")
            && (stderr.contains("cannot be created") || stderr.contains("not writable")),
        "stderr: {}",
        stderr
    );
}

// ---------- Health / readiness endpoints ----------

#[test]
fn healthz_and_readyz_return_200_when_running() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data_dir = dir.path().join("data");
    std::fs::create_dir_all(&data_dir).expect("create data_dir");
    let port = BASE_PORT;
    let mut child =
        start_seglogd_background(data_dir.to_str().unwrap(), &format!("127.0.0.1:{}", port));
    thread::sleep(Duration::from_millis(STARTUP_WAIT_MS));

    let healthz = http_get(port, "/healthz");
    let readyz = http_get(port, "/readyz");
    let unknown = http_get(port, "/nonexistent");
    let _ = child.kill();
    let _ = child.wait();

    let (status, _) = healthz.expect("healthz reachable");
    assert!(status.contains("200"), "healthz: {}", status);
    let (status, _) = readyz.expect("readyz reachable");
    assert!(status.contains("200"), "readyz: {}", status);
    let (status, _) = unknown.expect("unknown path reachable");
    assert!(status.contains("404"), "unknown path: {}", status);
}

// ---------- Produce / consume ----------

#[test]
fn produce_then_consume_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data_dir = dir.path().join("data");
    std::fs::create_dir_all(&data_dir).expect("create data_dir");
    let port = BASE_PORT + 1;
    let mut child =
        start_seglogd_background(data_dir.to_str().unwrap(), &format!("127.0.0.1:{}", port));
    thread::sleep(Duration::from_millis(STARTUP_WAIT_MS));

    let first = http_post(port, "/produce", b"first record");
    let second = http_post(port, "/produce", b"second record");
    let consumed = http_get(port, "/consume?offset=1");
    let missing = http_get(port, "/consume?offset=99");
    let bad = http_get(port, "/consume");
    let _ = child.kill();
    let _ = child.wait();

    let (status, body) = first.expect("produce reachable");
    assert!(status.contains("200"), "produce: {}", status);
    assert_eq!(body.trim(), "0");

    let (status, body) = second.expect("produce reachable");
    assert!(status.contains("200"), "produce: {}", status);
    assert_eq!(body.trim(), "1");

    let (status, body) = consumed.expect("consume reachable");
    assert!(status.contains("200"), "consume: {}", status);
    assert_eq!(body, "second record");

    let (status, _) = missing.expect("consume reachable");
    assert!(status.contains("404"), "out-of-range consume: {}", status);

    let (status, _) = bad.expect("consume reachable");
    assert!(status.contains("400"), "missing offset param: {}", status);
}

// ---------- Graceful shutdown ----------

/// After graceful SIGTERM the log is closed (store flushed, index truncated),
/// so a second run on the same data_dir must still serve the produced records.
#[cfg(unix)]
#[test]
fn graceful_shutdown_persists_records_across_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data_dir = dir.path().join("data");
    std::fs::create_dir_all(&data_dir).expect("create data_dir");

    let port = BASE_PORT + 2;
    let mut child =
        start_seglogd_background(data_dir.to_str().unwrap(), &format!("127.0.0.1:{}", port));
    thread::sleep(Duration::from_millis(STARTUP_WAIT_MS));

    let produced = http_post(port, "/produce", b"durable payload");
    assert!(
        produced.map_or(false, |(status, _)| status.contains("200")),
        "produce must succeed before shutdown"
    );

    sigterm(&child);
    let (tx, rx) = std::sync::mpsc::channel();
    let _ = thread::spawn(move || {
        let code = child.wait().ok().and_then(|s| s.code());
        let _ = tx.send(code);
    });
    let exit_code = rx
        .recv_timeout(Duration::from_millis(SHUTDOWN_WAIT_MS))
        .expect("daemon should exit after SIGTERM");
    assert_eq!(exit_code, Some(0), "graceful SIGTERM should exit 0");

    // Second run: same data_dir, fresh port.
    let port2 = BASE_PORT + 3;
    let mut child2 =
        start_seglogd_background(data_dir.to_str().unwrap(), &format!("127.0.0.1:{}", port2));
    thread::sleep(Duration::from_millis(STARTUP_WAIT_MS));

    let consumed = http_get(port2, "/consume?offset=0");
    let _ = child2.kill();
    let _ = child2.wait();

    let (status, body) = consumed.expect("consume reachable after restart");
    assert!(status.contains("200"), "consume after restart: {}", status);
    assert_eq!(body, "durable payload");
}

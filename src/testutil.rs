//! Helpers shared by the module tests: a one-shot HTTP responder and fake
//! engine scripts.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

/// Serve one canned HTTP response on a local port and return the URL to hit.
/// The full request is read first so the client never sees a reset mid-send.
pub fn one_shot_server(status_line: &str, body: &str) -> String {
    let (url, _request) = capturing_one_shot_server(status_line, body);
    url
}

/// Like [`one_shot_server`], but also hands back the raw request text so a
/// test can assert on headers and body.
pub fn capturing_one_shot_server(status_line: &str, body: &str) -> (String, mpsc::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let response = format!(
        "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let (request_tx, request_rx) = mpsc::channel();

    std::thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            let mut expected = None;
            loop {
                match stream.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    Err(_) => break,
                }
                if expected.is_none() {
                    if let Some(pos) = find_header_end(&buf) {
                        let headers = String::from_utf8_lossy(&buf[..pos]);
                        let length = headers
                            .lines()
                            .find_map(|line| {
                                let (name, value) = line.split_once(':')?;
                                name.eq_ignore_ascii_case("content-length")
                                    .then(|| value.trim().parse::<usize>().ok())?
                            })
                            .unwrap_or(0);
                        expected = Some(pos + 4 + length);
                    }
                }
                if let Some(total) = expected {
                    if buf.len() >= total {
                        break;
                    }
                }
            }
            // Hand the request over before responding so it is always
            // available once the client call returns.
            let _ = request_tx.send(String::from_utf8_lossy(&buf).into_owned());
            let _ = stream.write_all(response.as_bytes());
        }
    });

    (format!("http://{addr}/transcribe"), request_rx)
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Write an executable shell script into `dir` and return its path.
#[cfg(unix)]
pub fn write_script(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-engine.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

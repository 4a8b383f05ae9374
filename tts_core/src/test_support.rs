//! Raw TCP stand-in for VOICEVOX, for body failures wiremock cannot produce.

use std::time::Duration;

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

/// The only body chunk `/synthesis` sends before misbehaving.
pub(crate) const FIRST_CHUNK: &[u8] = b"RIFF\x24\x00\x00\x00WAVE";

/// What `/synthesis` does once [`FIRST_CHUNK`] is on the wire.
#[derive(Debug, Clone, Copy)]
pub(crate) enum AfterFirstChunk {
    /// Keep the connection open and send nothing more.
    Stall,
    /// Close the socket before the chunked body is terminated.
    Hangup,
}

/// Serve `/audio_query` normally and `/synthesis` with a broken body.
/// Returns the base url.
pub(crate) async fn spawn_broken_upstream(after: AfterFirstChunk) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(handle(socket, after));
        }
    });
    format!("http://{addr}")
}

async fn handle(mut socket: TcpStream, after: AfterFirstChunk) {
    let Some(request_line) = read_request(&mut socket).await else {
        return;
    };

    if request_line.starts_with("POST /audio_query") {
        let body = r#"{"accent_phrases":[],"speedScale":1.0}"#;
        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        let _ = socket.write_all(response.as_bytes()).await;
        return;
    }

    let mut response =
        b"HTTP/1.1 200 OK\r\ncontent-type: audio/wav\r\ntransfer-encoding: chunked\r\n\r\n".to_vec();
    response.extend_from_slice(format!("{:x}\r\n", FIRST_CHUNK.len()).as_bytes());
    response.extend_from_slice(FIRST_CHUNK);
    response.extend_from_slice(b"\r\n");
    let _ = socket.write_all(&response).await;
    let _ = socket.flush().await;

    match after {
        AfterFirstChunk::Stall => tokio::time::sleep(Duration::from_secs(30)).await,
        AfterFirstChunk::Hangup => {
            let _ = socket.shutdown().await;
        }
    }
}

/// Read one request (head and `content-length` body); returns its request line.
async fn read_request(socket: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);

        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..end]).into_owned();
        let body_len = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.trim()
                    .eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())?
            })
            .unwrap_or(0);
        if buf.len() >= end + 4 + body_len {
            return head.lines().next().map(str::to_string);
        }
    }
}

// NOTE: every test will complain about the functions it doesn't use
#![allow(unused)]

use std::{
    io::{Read, Write},
    net::TcpListener,
    path::PathBuf,
    process::Stdio,
    sync::OnceLock,
    thread,
};

/// Returns cargo's tmpdir
pub fn cargo_tmpdir() -> PathBuf {
    PathBuf::from(option_env!("CARGO_TARGET_TMPDIR").expect("no cargo tmpdir???"))
}

/// Answers exactly one http request with `status` and `body`, then closes. Returns the
/// URL to request.
pub fn serve_once(status: &'static str, body: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("could not bind");
    let port = listener.local_addr().expect("has an address").port();

    thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("could not accept");

        let mut request = Vec::new();
        let mut buf = [0; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => return,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }

        let header = format!(
            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let _ = stream.write_all(header.as_bytes());
        let _ = stream.write_all(&body);
        let _ = stream.flush();
    });

    format!("http://127.0.0.1:{port}/talk.mkv")
}

/// A 9 second, 10 fps video showing three solid colors for three seconds each: red,
/// blue and white. `None` if the ffmpeg binary isn't available.
pub fn three_slide_video() -> Option<PathBuf> {
    static VIDEO: OnceLock<Option<PathBuf>> = OnceLock::new();
    VIDEO
        .get_or_init(|| {
            let tmpvideo = cargo_tmpdir().join("three_slides.mkv");
            std::fs::remove_file(&tmpvideo).ok();
            let status = std::process::Command::new("ffmpeg")
                .args([
                    "-y",
                    "-filter_complex",
                    "color=c=red:s=160x120:d=3:r=10[a];\
                     color=c=blue:s=160x120:d=3:r=10[b];\
                     color=c=white:s=160x120:d=3:r=10[c];\
                     [a][b][c]concat=n=3:v=1:a=0,format=yuv420p",
                    tmpvideo.to_str().expect("no probs, probably"),
                ])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .stdin(Stdio::null())
                .status();

            match status {
                Ok(status) if status.success() => Some(tmpvideo),
                _ => {
                    eprintln!("ffmpeg is not available, skipping");
                    None
                }
            }
        })
        .clone()
}

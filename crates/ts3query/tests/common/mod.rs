#![allow(dead_code)]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};

pub const GREETING: &str = "TS3\n\rWelcome to the TeamSpeak 3 ServerQuery interface.\n\r";

/// A single-connection query server driven by a reply function.
///
/// The handler sees each command line without its delimiter and returns the
/// wire text to send back, or `None` to hang up. Blank keepalive lines and
/// `quit` are handled here.
pub struct FakeQueryServer {
    addr: String,
    handle: JoinHandle<Vec<String>>,
}

impl FakeQueryServer {
    pub fn start<H>(handler: H) -> Self
    where
        H: FnMut(&str) -> Option<String> + Send + 'static,
    {
        Self::start_with_banner("", handler)
    }

    /// Like [`start`](Self::start) but sends `banner` right after the
    /// greeting, before any command arrives.
    pub fn start_with_banner<H>(banner: &str, mut handler: H) -> Self
    where
        H: FnMut(&str) -> Option<String> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
        let addr = listener
            .local_addr()
            .expect("listener should have an address")
            .to_string();
        let banner = banner.to_string();

        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("client should connect");
            let mut writer = stream.try_clone().expect("stream should clone");
            writer
                .write_all(format!("{GREETING}{banner}").as_bytes())
                .expect("greeting should send");

            let mut reader = BufReader::new(stream);
            let mut seen = Vec::new();
            loop {
                let mut raw = Vec::new();
                match reader.read_until(b'\r', &mut raw) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
                let line = String::from_utf8_lossy(&raw).trim().to_string();
                if line.is_empty() {
                    continue;
                }
                if line == "quit" {
                    break;
                }
                seen.push(line.clone());
                match handler(&line) {
                    Some(reply) => {
                        if writer.write_all(reply.as_bytes()).is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            seen
        });

        Self { addr, handle }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Wait for the connection to end and return the commands received.
    pub fn finish(self) -> Vec<String> {
        self.handle.join().expect("server thread should not panic")
    }
}

/// Wire text for a response: body lines followed by the outcome.
pub fn reply(body: &[&str], id: u32, msg: &str) -> String {
    let mut out = String::new();
    for line in body {
        out.push_str(line);
        out.push_str("\n\r");
    }
    out.push_str(&format!("error id={id} msg={msg}\n\r"));
    out
}

pub fn ok(body: &[&str]) -> String {
    reply(body, 0, "ok")
}

/// Value of `key=` in a compiled command line.
pub fn param<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let prefix = format!("{key}=");
    line.split(' ')
        .find_map(|token| token.strip_prefix(prefix.as_str()))
}

/// A data-channel server that accepts `connections` clients in turn.
///
/// Each client's key (of `key_len` bytes) and stream are passed to
/// `handler`; whatever it returns is collected.
pub fn file_server<T, H>(connections: usize, key_len: usize, mut handler: H) -> (u16, JoinHandle<Vec<T>>)
where
    T: Send + 'static,
    H: FnMut(usize, Vec<u8>, &mut TcpStream) -> T + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("file listener should bind");
    let port = listener
        .local_addr()
        .expect("file listener should have an address")
        .port();
    let handle = thread::spawn(move || {
        let mut results = Vec::new();
        for index in 0..connections {
            let (mut stream, _) = listener.accept().expect("data client should connect");
            let mut key = vec![0u8; key_len];
            stream.read_exact(&mut key).expect("key should arrive first");
            results.push(handler(index, key, &mut stream));
        }
        results
    });
    (port, handle)
}

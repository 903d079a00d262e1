//! C3: the MPD connection wrapper.
//!
//! A blocking `std::net::TcpStream` transport with `issue_command`/
//! `reconnect`/`reconnect_until_success` and a line-reading loop with
//! binary-chunk support for `readpicture`/`albumart`. The idle loop needs a
//! single OS thread with explicit, bounded suspension points (socket poll up
//! to 50ms, queue shift with timeout) and no locks on MPD state, which is a
//! blocking-thread contract rather than a cooperative-task one, so the
//! transport follows suit. `TcpStream::peek` gives the non-consuming
//! "is an idle event pending yet" check without reaching for raw `poll(2)`.
use crate::error::MpdError;
use crate::mpd::types::MpdResponse;
use crate::mpd::wire::{parse_ack_line, parse_line};
use log::{debug, error, info, warn};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

/// Idle subsystems we subscribe to — every one spec.md §4.5 dispatches on.
pub const IDLE_SUBSYSTEMS: &str =
    "idle database stored_playlist queue player mixer output options update";

pub struct MpdClient {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    host: String,
    port: u16,
    password: Option<String>,
    pub server_version: (u32, u32, u32),
}

impl MpdClient {
    pub fn connect(host: &str, port: u16, password: Option<&str>) -> Result<Self, MpdError> {
        let stream = TcpStream::connect((host, port)).map_err(|e| MpdError::Connect {
            host: host.to_owned(),
            port,
            source: e,
        })?;
        stream.set_nodelay(true).ok();
        let writer = stream.try_clone()?;
        let mut reader = BufReader::new(stream);

        let mut hello = String::new();
        reader.read_line(&mut hello)?;
        let server_version = parse_hello(&hello)?;

        let mut client = MpdClient {
            reader,
            writer,
            host: host.to_owned(),
            port,
            password: password.map(|s| s.to_owned()),
            server_version,
        };
        if let Some(pw) = &client.password.clone() {
            client.issue_command(&format!("password {pw}"))?;
        }
        info!("Connected to MPD {host}:{port}, server version {server_version:?}");
        Ok(client)
    }

    pub fn reconnect(&mut self) -> Result<(), MpdError> {
        let fresh = MpdClient::connect(&self.host, self.port, self.password.as_deref())?;
        *self = fresh;
        Ok(())
    }

    /// Blocks, retrying every 5s, until a new connection succeeds.
    pub fn reconnect_until_success(&mut self) {
        loop {
            match self.reconnect() {
                Ok(()) => {
                    info!("Reconnect to MPD succeeded");
                    return;
                }
                Err(e) => {
                    error!("Reconnect failed: {e}, retrying in 5s");
                    std::thread::sleep(Duration::from_secs(5));
                }
            }
        }
    }

    /// Sends `cmd` and reads the full response (blocks until `OK`/`ACK`).
    pub fn issue_command(&mut self, cmd: &str) -> Result<MpdResponse, MpdError> {
        debug!("-> {cmd}");
        self.writer.write_all(cmd.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        let resp = read_response(&mut self.reader)?;
        debug!("<- {} fields", resp.fields.len());
        Ok(resp)
    }

    /// Runs several commands as one atomic command list.
    pub fn command_list(&mut self, cmds: &[&str]) -> Result<(), MpdError> {
        self.writer.write_all(b"command_list_begin\n")?;
        for c in cmds {
            self.writer.write_all(c.as_bytes())?;
            self.writer.write_all(b"\n")?;
        }
        self.writer.write_all(b"command_list_end\n")?;
        self.writer.flush()?;
        read_response(&mut self.reader)?;
        Ok(())
    }

    /// Enters MPD's `idle` state: writes the command but does not read a
    /// reply. The connection is now blocked from MPD's point of view
    /// until either an event fires or [`MpdClient::finish_idle`] sends
    /// `noidle`.
    pub fn start_idle(&mut self, subsystems: &str) -> Result<(), MpdError> {
        self.writer.write_all(b"idle ")?;
        self.writer.write_all(subsystems.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Leaves idle: sends `noidle` and reads whatever reply follows,
    /// whether that is the response to `noidle` itself (no event was
    /// pending) or the idle command's own `changed: ...` lines (an event
    /// raced the `noidle`). Either way exactly one `MpdResponse` comes
    /// back before the next command may be issued.
    pub fn finish_idle(&mut self) -> Result<MpdResponse, MpdError> {
        self.writer.write_all(b"noidle\n")?;
        self.writer.flush()?;
        read_response(&mut self.reader)
    }

    /// Returns `true` once the idle socket has data pending, without
    /// consuming it and without blocking longer than `timeout`. This is
    /// the "MPD socket poll (up to 50 ms)" suspension point from spec.md
    /// §5.
    pub fn poll_readable(&self, timeout: Duration) -> Result<bool, MpdError> {
        self.writer.set_read_timeout(Some(timeout)).ok();
        let mut buf = [0u8; 1];
        match self.writer.peek(&mut buf) {
            Ok(n) => Ok(n > 0),
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                Ok(false)
            }
            Err(e) => Err(MpdError::Io(e)),
        }
    }

    /// Reads a full binary resource that MPD streams in chunks (the
    /// `albumart`/`readpicture` protocol): repeated `cmd <uri> <offset>`
    /// calls until the accumulated bytes reach the advertised `size`.
    /// Grounded in the teacher's `stateserver::update_album_art`.
    pub fn read_binary_chunked(
        &mut self,
        command: &str,
        uri: &str,
    ) -> Result<Option<(Vec<u8>, String)>, MpdError> {
        let mut offset: u64 = 0;
        let mut out = Vec::new();
        let mut mime_type = String::new();
        loop {
            let resp = self.issue_command(&format!("{command} \"{uri}\" {offset}"))?;
            let Some(binary) = &resp.binary else {
                return Ok(None);
            };
            if let Some(mt) = resp.first("type") {
                mime_type = mt.to_owned();
            }
            let size: u64 = resp
                .first("size")
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| MpdError::Protocol("missing size field".into()))?;
            let binary_size = binary.len() as u64;
            out.extend_from_slice(binary);
            offset += binary_size;
            if offset >= size || binary_size == 0 {
                break;
            }
        }
        if out.is_empty() {
            Ok(None)
        } else {
            Ok(Some((out, mime_type)))
        }
    }
}

fn parse_hello(line: &str) -> Result<(u32, u32, u32), MpdError> {
    let line = line.trim();
    let ver = line
        .strip_prefix("OK MPD ")
        .ok_or_else(|| MpdError::Protocol(format!("unexpected hello: {line:?}")))?;
    let mut parts = ver.split('.');
    let major = parts.next().unwrap_or("0").parse().unwrap_or(0);
    let minor = parts.next().unwrap_or("0").parse().unwrap_or(0);
    let patch = parts.next().unwrap_or("0").parse().unwrap_or(0);
    Ok((major, minor, patch))
}

/// Checks the connected server is at least 0.21.0.
pub fn version_at_least(version: (u32, u32, u32), floor: (u32, u32, u32)) -> bool {
    version >= floor
}

fn read_response(r: &mut BufReader<TcpStream>) -> Result<MpdResponse, MpdError> {
    let mut fields = Vec::new();
    let mut binary = None;
    let mut buf = String::new();

    loop {
        buf.clear();
        let n = r.read_line(&mut buf)?;
        if n == 0 {
            return Err(MpdError::Protocol("connection closed by MPD".into()));
        }
        if buf.starts_with("OK") {
            break;
        }
        if buf.starts_with("ACK") {
            let ack = parse_ack_line(&buf)?;
            warn!("MPD ACK: {ack}");
            return Err(MpdError::Ack(ack));
        }

        let (name, value) = parse_line(&buf)?;
        let (name, value) = (name.to_owned(), value.to_owned());

        if name == "binary" {
            let len: usize = value
                .parse()
                .map_err(|_| MpdError::Protocol("bad binary length".into()))?;
            let mut chunk = vec![0u8; len];
            r.read_exact(&mut chunk)?;
            binary = Some(chunk);
            fields.push((name, value));
            // trailing newline after the binary payload
            let mut nl = [0u8; 1];
            r.read_exact(&mut nl)?;
            // and the closing OK
            buf.clear();
            r.read_line(&mut buf)?;
            if !buf.starts_with("OK") {
                return Err(MpdError::Protocol(format!(
                    "expected OK after binary chunk, got {buf:?}"
                )));
            }
            break;
        }
        fields.push((name, value));
    }

    Ok(MpdResponse { fields, binary })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_parses_version() {
        assert_eq!(parse_hello("OK MPD 0.23.5\n").unwrap(), (0, 23, 5));
    }

    #[test]
    fn version_floor() {
        assert!(!version_at_least((0, 20, 0), (0, 21, 0)));
        assert!(version_at_least((0, 21, 0), (0, 21, 0)));
        assert!(version_at_least((1, 0, 0), (0, 21, 0)));
    }
}

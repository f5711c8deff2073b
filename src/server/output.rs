use crate::local_logger::suspend_progress_bar;
use crate::prelude::*;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// Target of the server output records
pub const SERVER_TARGET: &str = "server";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    fn log_prefix(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "",
            OutputStream::Stderr => "[stderr] ",
        }
    }
}

/// Log every line of `reader` and forward it to `lines`.
///
/// The stream is drained until it closes, even once nobody listens to `lines` anymore, so that
/// the server never blocks on a full pipe.
pub fn pipe_lines<R>(reader: R, stream: OutputStream, lines: UnboundedSender<String>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let prefix = stream.log_prefix();
        let mut reader = BufReader::new(reader);
        let mut buffer = Vec::new();

        loop {
            buffer.clear();
            match reader.read_until(b'\n', &mut buffer).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buffer);
                    let line = line.trim_end_matches(['\n', '\r']);
                    suspend_progress_bar(|| trace!(target: SERVER_TARGET, "{prefix}{line}"));
                    let _ = lines.send(line.to_owned());
                }
                Err(err) => {
                    debug!("Stopped reading server {stream:?}: {err}");
                    break;
                }
            }
        }
    })
}

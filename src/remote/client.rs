//! Blocking client for the 3D application's control socket.
//!
//! One request per line out, one response per line back; every command is
//! acknowledged before the next is sent. Script bodies larger than the
//! channel's command-length limit are submitted as sequential chunks.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info};
use serde_json::Value;

use crate::remote::protocol::{Request, Response};
use crate::scene::script::{SceneScript, MAX_COMMAND_BYTES};

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub host: String,
    pub port: u16,
    pub max_command_bytes: usize,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9876,
            max_command_bytes: MAX_COMMAND_BYTES,
            // Renders can take minutes; writes should not.
            read_timeout: Duration::from_secs(300),
            write_timeout: Duration::from_secs(30),
        }
    }
}

pub struct RemoteClient {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
    config: RemoteConfig,
}

impl RemoteClient {
    pub fn connect(config: RemoteConfig) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        let stream = TcpStream::connect(&addr)
            .with_context(|| format!("failed to connect to the 3D application at {addr}"))?;
        stream
            .set_read_timeout(Some(config.read_timeout))
            .context("failed to set read timeout")?;
        stream
            .set_write_timeout(Some(config.write_timeout))
            .context("failed to set write timeout")?;
        let reader = BufReader::new(stream.try_clone().context("failed to clone stream")?);
        info!("connected to {addr}");
        Ok(Self {
            stream,
            reader,
            config,
        })
    }

    fn send(&mut self, request: &Request) -> Result<Response> {
        let mut line = serde_json::to_string(request).context("failed to encode request")?;
        line.push('\n');
        self.stream
            .write_all(line.as_bytes())
            .context("failed to send request")?;
        self.stream.flush().context("failed to flush request")?;

        let mut reply = String::new();
        let n = self
            .reader
            .read_line(&mut reply)
            .context("failed to read response")?;
        if n == 0 {
            anyhow::bail!("connection closed by the 3D application");
        }
        debug!("response: {}", reply.trim_end());
        serde_json::from_str(reply.trim_end()).context("malformed response")
    }

    pub fn ping(&mut self) -> Result<()> {
        self.send(&Request::Ping)?.into_result().map(|_| ())
    }

    pub fn execute(&mut self, code: &str) -> Result<Option<Value>> {
        self.send(&Request::execute_code(code))?.into_result()
    }

    /// Submit a scene script as acknowledged chunks. Returns the number of
    /// chunks sent; a remote failure aborts the submission with the chunk
    /// index and the application's raw error.
    pub fn submit_script(&mut self, script: &SceneScript) -> Result<usize> {
        let chunks = script.chunks(self.config.max_command_bytes);
        let total = chunks.len();
        for (i, chunk) in chunks.iter().enumerate() {
            debug!("submitting chunk {}/{} ({} bytes)", i + 1, total, chunk.len());
            self.execute(chunk)
                .with_context(|| format!("script chunk {}/{} failed", i + 1, total))?;
        }
        info!("submitted {total} script chunks");
        Ok(total)
    }

    pub fn render_to(&mut self, path: &str) -> Result<()> {
        self.send(&Request::render(path))?.into_result().map(|_| ())
    }
}

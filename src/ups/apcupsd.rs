//! apcupsd network information server (NIS) client.
//! Sends the `status` command over TCP and collects the length-prefixed reply records.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::trace;

use crate::config::types::UpsSettings;
use crate::error::SampleError;
use crate::ups::parser::parse_status;
use crate::ups::UpsSource;

/// Upper bound on the number of records in one status reply.
const MAX_RECORDS: usize = 512;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ApcupsdClient {
    addr: String,
    timeout: Duration,
}

impl ApcupsdClient {
    pub fn new(settings: &UpsSettings) -> Self {
        Self {
            addr: format!("{}:{}", settings.host, settings.port),
            timeout: Duration::try_from_secs_f64(settings.timeout).unwrap_or(DEFAULT_TIMEOUT),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Fetch the raw status text (one `KEY : value` line per record).
    pub async fn fetch_raw(&self) -> Result<String, SampleError> {
        tokio::time::timeout(self.timeout, self.exchange("status"))
            .await
            .map_err(|_| SampleError::Timeout(self.timeout.as_secs_f64()))?
    }

    async fn exchange(&self, command: &str) -> Result<String, SampleError> {
        let mut stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|source| SampleError::Unreachable { addr: self.addr.clone(), source })?;

        trace!("Sending '{}' to apcupsd at {}", command, self.addr);
        let mut request = Vec::with_capacity(command.len() + 2);
        request.extend_from_slice(&(command.len() as u16).to_be_bytes());
        request.extend_from_slice(command.as_bytes());
        stream.write_all(&request).await.map_err(|e| self.io_error(e))?;

        let mut raw = String::new();
        for _ in 0..MAX_RECORDS {
            let len = stream.read_u16().await.map_err(|e| self.io_error(e))? as usize;
            if len == 0 {
                trace!("apcupsd reply complete ({} bytes)", raw.len());
                return Ok(raw);
            }
            let mut record = vec![0u8; len];
            stream.read_exact(&mut record).await.map_err(|e| self.io_error(e))?;
            raw.push_str(&String::from_utf8_lossy(&record));
            if !raw.ends_with('\n') {
                raw.push('\n');
            }
        }

        Err(SampleError::Malformed(format!("reply exceeded {} records without terminator", MAX_RECORDS)))
    }

    fn io_error(&self, e: std::io::Error) -> SampleError {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            SampleError::Malformed("connection closed mid-reply".to_string())
        } else {
            SampleError::Unreachable { addr: self.addr.clone(), source: e }
        }
    }
}

#[async_trait]
impl UpsSource for ApcupsdClient {
    async fn status_fields(&self) -> Result<BTreeMap<String, String>, SampleError> {
        let raw = self.fetch_raw().await?;
        let fields = parse_status(&raw);
        if fields.is_empty() {
            return Err(SampleError::Malformed("empty status reply".to_string()));
        }
        Ok(fields)
    }
}

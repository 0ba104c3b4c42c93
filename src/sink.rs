//! Graphite plaintext protocol writer.

use crate::error::Result;
use crate::metrics::MetricPoint;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

pub struct GraphiteSink {
    addr: String,
}

impl GraphiteSink {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    /// Opens one connection, writes every point as `<stat> <value> <timestamp>\n` and closes it.
    pub async fn send(&self, points: &[MetricPoint]) -> Result<()> {
        tracing::info!(addr = %self.addr, count = points.len(), "Start sending points to graphite...");
        let mut stream = TcpStream::connect(&self.addr).await?;

        for point in points {
            tracing::debug!("{}", point);
            stream.write_all(format!("{}\n", point).as_bytes()).await?;
        }
        stream.shutdown().await?;

        tracing::info!("Finished sending points to graphite.");
        Ok(())
    }
}

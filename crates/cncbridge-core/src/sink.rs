// ── Record sink ──
//
// Single writer for the shared line-delimited output stream. Sessions send
// records over an mpsc channel; the task exits once every sender is gone.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::warn;

use crate::model::OutputRecord;

/// Write each received record as one JSON line, flushing after every line.
/// Write failures are logged and the record dropped.
pub async fn sink_task<W>(mut rx: mpsc::Receiver<OutputRecord>, mut out: W)
where
    W: AsyncWrite + Unpin + Send,
{
    while let Some(record) = rx.recv().await {
        let mut line = match record.to_line() {
            Ok(line) => line,
            Err(e) => {
                warn!(device = %record.name, error = %e, "record serialization failed");
                continue;
            }
        };
        line.push('\n');

        if let Err(e) = write_line(&mut out, &line).await {
            warn!(device = %record.name, error = %e, "record write failed");
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(out: &mut W, line: &str) -> std::io::Result<()> {
    out.write_all(line.as_bytes()).await?;
    out.flush().await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::Device;

    #[tokio::test]
    async fn writes_one_line_per_record() {
        let device = Device {
            name: "M1".into(),
            address: "10.0.0.5".into(),
            port: 8193,
            delay_ms: 10,
            tags_pack_name: "basic".into(),
        };
        let (tx, rx) = mpsc::channel(4);
        let (writer, mut reader) = tokio::io::duplex(4096);

        let task = tokio::spawn(sink_task(rx, writer));
        tx.send(OutputRecord::power_off(&device)).await.unwrap();
        tx.send(OutputRecord::powered(&device)).await.unwrap();
        drop(tx);
        task.await.unwrap();

        let mut text = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut reader, &mut text)
            .await
            .unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(r#""power_on":0}"#));
        assert!(lines[1].ends_with(r#""power_on":1}"#));
    }

    #[tokio::test]
    async fn line_is_newline_terminated_json() {
        let device = Device {
            name: "M2".into(),
            address: "10.0.0.6".into(),
            port: 8193,
            delay_ms: 10,
            tags_pack_name: "basic".into(),
        };
        let out = tokio_test::io::Builder::new()
            .write(b"{\"name\":\"M2\",\"address\":\"10.0.0.6\",\"port\":8193,\"power_on\":0}\n")
            .build();
        let (tx, rx) = mpsc::channel(1);
        tx.send(OutputRecord::power_off(&device)).await.unwrap();
        drop(tx);

        sink_task(rx, out).await;
    }
}
